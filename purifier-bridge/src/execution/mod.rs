//! airctrl execution for the bridge
//!
//! Handles invocation of the external control binary:
//! - argv built as `--ipaddr <host> --protocol coap <args...>` (no shell)
//! - bounded timeout, child killed when it expires
//! - bounded resend loop for commands the purifier reports as failed

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

/// Marker airctrl prints when the purifier dropped the request.
const SEND_FAILED_MARKER: &str = "failed";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid arguments {args:?}: {source}")]
    Arguments {
        args: String,
        #[source]
        source: shell_words::ParseError,
    },
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("exit code {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("device reported send failure after {0} attempts")]
    SendFailed(u32),
}

/// Successful airctrl run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub output: String,
    pub execution_time_ms: u128,
}

/// Executes airctrl (or a stand-in) against one purifier host.
#[async_trait]
pub trait DeviceProxy: Send + Sync {
    /// `args` is appended verbatim after the protocol selector; empty means status query.
    async fn execute(&self, host: &str, args: &str) -> Result<ExecutionResult, ProxyError>;
}

#[async_trait]
impl<T: DeviceProxy + ?Sized> DeviceProxy for std::sync::Arc<T> {
    async fn execute(&self, host: &str, args: &str) -> Result<ExecutionResult, ProxyError> {
        (**self).execute(host, args).await
    }
}

/// Argument string for a command fragment: fragment plus the debug flag.
pub fn command_args(fragment: &str) -> String {
    format!("{fragment} --debug")
}

/// Real airctrl process runner
#[derive(Debug, Clone)]
pub struct AirCtrl {
    binary: String,
    timeout: Duration,
}

impl AirCtrl {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn argv(host: &str, args: &str) -> Result<Vec<String>, ProxyError> {
        let mut argv = vec![
            "--ipaddr".to_string(),
            host.to_string(),
            "--protocol".to_string(),
            "coap".to_string(),
        ];
        let extra = shell_words::split(args).map_err(|source| ProxyError::Arguments {
            args: args.to_string(),
            source,
        })?;
        argv.extend(extra);
        Ok(argv)
    }
}

#[async_trait]
impl DeviceProxy for AirCtrl {
    async fn execute(&self, host: &str, args: &str) -> Result<ExecutionResult, ProxyError> {
        let start_time = Instant::now();
        let argv = Self::argv(host, args)?;
        debug!("Executing {} {}", self.binary, argv.join(" "));

        let output = tokio::time::timeout(
            self.timeout,
            AsyncCommand::new(&self.binary)
                .args(&argv)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ProxyError::Timeout(self.timeout))?
        .map_err(|source| ProxyError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        let execution_time_ms = start_time.elapsed().as_millis();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!("{} exit={:?} stderr={}", self.binary, output.status.code(), stderr);
            return Err(ProxyError::NonZeroExit {
                code: output.status.code(),
                stderr,
            });
        }

        Ok(ExecutionResult {
            output: String::from_utf8_lossy(&output.stdout).into_owned(),
            execution_time_ms,
        })
    }
}

/// Bounded resend policy for device commands
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run a command, resending while the call errors or the device reports a
    /// send failure, at most `max_attempts` times in total.
    pub async fn run<P: DeviceProxy + ?Sized>(
        &self,
        proxy: &P,
        host: &str,
        args: &str,
    ) -> Result<ExecutionResult, ProxyError> {
        let mut attempt = 1;
        loop {
            let last = attempt >= self.max_attempts;
            match proxy.execute(host, args).await {
                Ok(result) if !result.output.contains(SEND_FAILED_MARKER) => return Ok(result),
                Ok(_) if last => return Err(ProxyError::SendFailed(attempt)),
                Err(e) if last => return Err(e),
                Ok(_) => warn!("{}: request send failed (attempt {}), resending", host, attempt),
                Err(e) => warn!("{}: {} (attempt {}), resending", host, e, attempt),
            }
            attempt += 1;
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, ()>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<&str, ()>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| r.map(String::from)).collect()),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl DeviceProxy for Scripted {
        async fn execute(&self, _host: &str, _args: &str) -> Result<ExecutionResult, ProxyError> {
            *self.calls.lock() += 1;
            match self.replies.lock().pop_front() {
                Some(Ok(output)) => Ok(ExecutionResult { output, execution_time_ms: 1 }),
                _ => Err(ProxyError::NonZeroExit { code: Some(1), stderr: String::new() }),
            }
        }
    }

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_argv_layout() {
        let argv = AirCtrl::argv("192.168.1.20", &command_args("--mode M --om 1")).unwrap();
        assert_eq!(
            argv,
            vec!["--ipaddr", "192.168.1.20", "--protocol", "coap", "--mode", "M", "--om", "1", "--debug"]
        );
        assert_eq!(AirCtrl::argv("h", "").unwrap().len(), 4);
        assert!(matches!(AirCtrl::argv("h", "\"unterminated"), Err(ProxyError::Arguments { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_captures_stdout() {
        let proxy = AirCtrl::new("echo", Duration::from_secs(5));
        let result = proxy.execute("10.0.0.9", "--pwr 1 --debug").await.unwrap();
        assert_eq!(result.output.trim(), "--ipaddr 10.0.0.9 --protocol coap --pwr 1 --debug");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_non_zero_exit() {
        let proxy = AirCtrl::new("false", Duration::from_secs(5));
        let err = proxy.execute("10.0.0.9", "").await.unwrap_err();
        assert!(matches!(err, ProxyError::NonZeroExit { .. }));
    }

    #[tokio::test]
    async fn test_execute_spawn_error() {
        let proxy = AirCtrl::new("/nonexistent/airctrl", Duration::from_secs(5));
        let err = proxy.execute("10.0.0.9", "").await.unwrap_err();
        assert!(matches!(err, ProxyError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-airctrl");
        std::fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let proxy = AirCtrl::new(script.to_string_lossy(), Duration::from_millis(300));
        let started = Instant::now();
        let err = proxy.execute("10.0.0.9", "").await.unwrap_err();
        assert!(matches!(err, ProxyError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_retry_stops_on_success() {
        let proxy = Scripted::new(vec![Ok("request failed"), Ok("[pwr] Power: ON")]);
        let result = fast(3).run(&proxy, "h", "--pwr 1 --debug").await.unwrap();
        assert_eq!(result.output, "[pwr] Power: ON");
        assert_eq!(*proxy.calls.lock(), 2);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let proxy = Scripted::new(vec![Ok("failed"), Ok("failed"), Ok("failed"), Ok("ok")]);
        let err = fast(3).run(&proxy, "h", "--pwr 1 --debug").await.unwrap_err();
        assert!(matches!(err, ProxyError::SendFailed(3)));
        assert_eq!(*proxy.calls.lock(), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_last_error() {
        let proxy = Scripted::new(vec![Err(()), Err(())]);
        let err = fast(2).run(&proxy, "h", "").await.unwrap_err();
        assert!(matches!(err, ProxyError::NonZeroExit { .. }));
        assert_eq!(*proxy.calls.lock(), 2);
    }

    #[tokio::test]
    async fn test_single_attempt_policy() {
        let proxy = Scripted::new(vec![Err(()), Ok("ok")]);
        assert!(RetryPolicy::new(0, Duration::ZERO).run(&proxy, "h", "").await.is_err());
        assert_eq!(*proxy.calls.lock(), 1);
    }
}
