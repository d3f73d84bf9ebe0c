/*!
Sorties airctrl types pour les tests

Formats observés sur AC2729 / AC3829 : une ligne `[clé] description: valeur`
par champ, ordre variable selon le firmware.
*/

/// Statut complet d'un humidificateur/purificateur AC2729
pub fn status_output(device_id: &str) -> String {
    format!(
        "\
[name]      Name: Bedroom
[type]      Type: AC2729
[modelid]   ModelId: AC2729/10
[swversion] Version: 0.2.1
[om]        Fan speed: 2
[pwr]       Power: ON
[cl]        Child lock: False
[aqil]      Light brightness: 100
[uil]       Buttons light: 1
[mode]      Mode: M
[func]      Function: PH
[rhset]     Target humidity: 50
[rh]        Humidity: 41
[temp]      Temperature: 22
[pm25]      PM25: 4
[iaql]      Allergen index: 1
[ddp]       Used index: PM2.5
[err]       Error: 0
[wl]        Water level: 100
[fltt1]     HEPA filter type: A3
[fltt2]     Active carbon filter type: C7
[fltsts0]   Pre-filter and Wick: clean in 134 hours
[fltsts1]   HEPA filter: replace in 4184 hours
[fltsts2]   Active carbon filter: replace in 2264 hours
[wicksts]   Wick filter: replace in 2688 hours
[range]     Range: MarsLE
[Runtime]   Runtime: 2.4 hours
[WifiVersion] WifiVersion: AWS_Philips_AIR@62.1
[ProductId] ProductId: 85bc26fae62611e8a1e3061302926720
[DeviceId]  DeviceId: {device_id}
[StatusType] StatusType: status
[ConnectType] ConnectType: Online
"
    )
}

/// Firmware sans humidificateur ni identifiants réseau
pub fn partial_output(device_id: &str) -> String {
    format!(
        "\
[pwr]       Power: OFF
[om]        Fan speed: s
[mode]      Mode: S
[pm25]      PM25: 12
[DeviceId]  DeviceId: {device_id}
"
    )
}

/// Sortie sans DeviceId (handshake incomplet)
pub fn anonymous_output() -> String {
    "[pwr]       Power: ON\n[pm25]      PM25: 7\n".to_string()
}

/// Réponse `--debug` quand le purificateur n'a pas acquitté la requête
pub const SEND_FAILED_OUTPUT: &str = "DEBUG:root:sending request\nrequest failed, no ack\n";

/// Réponse `--debug` d'une commande acceptée
pub const COMMAND_OK_OUTPUT: &str = "DEBUG:root:sending request\nDEBUG:root:ack received\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_carry_device_id() {
        assert!(status_output("AA11").contains("[DeviceId]  DeviceId: AA11"));
        assert!(partial_output("BB22").contains("DeviceId: BB22"));
        assert!(!anonymous_output().contains("DeviceId"));
        assert!(SEND_FAILED_OUTPUT.contains("failed"));
        assert!(!COMMAND_OK_OUTPUT.contains("failed"));
    }
}
