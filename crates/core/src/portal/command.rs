//! Portal session driven by an external automation helper.
//!
//! The helper is a long-lived child process that owns the browser. Requests
//! and responses are single JSON objects, one per line:
//!
//! ```text
//! > {"op":"select_option","level":"district","label":"Pune"}
//! < {"ok":true}
//! > {"op":"dropdown_options","level":"taluka"}
//! < {"ok":true,"options":["--Select Taluka--","Haveli","Mulshi"]}
//! ```
//!
//! The first exchange is `{"op":"hello"}`; a helper that does not answer it
//! is treated as unavailable.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use super::config::DriverConfig;
use super::error::PortalError;
use super::traits::PortalSession;
use super::types::DropdownLevel;

const PLACEHOLDER_PREFIX: &str = "--Select";

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DriverRequest<'a> {
    Hello,
    OpenSearchPage,
    DropdownOptions { level: DropdownLevel },
    SelectOption { level: DropdownLevel, label: &'a str },
    EnterDocNumber { doc_number: u32 },
    SolveCaptcha,
    SubmitForm,
    DownloadResults,
    Shutdown,
}

impl DriverRequest<'_> {
    fn op(&self) -> &'static str {
        match self {
            DriverRequest::Hello => "hello",
            DriverRequest::OpenSearchPage => "open_search_page",
            DriverRequest::DropdownOptions { .. } => "dropdown_options",
            DriverRequest::SelectOption { .. } => "select_option",
            DriverRequest::EnterDocNumber { .. } => "enter_doc_number",
            DriverRequest::SolveCaptcha => "solve_captcha",
            DriverRequest::SubmitForm => "submit_form",
            DriverRequest::DownloadResults => "download_results",
            DriverRequest::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct DriverResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

struct DriverIo {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl DriverIo {
    async fn exchange(&mut self, request: &DriverRequest<'_>) -> Result<DriverResponse, PortalError> {
        let mut line =
            serde_json::to_string(request).map_err(|e| PortalError::Protocol(e.to_string()))?;
        line.push('\n');

        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| PortalError::DriverUnavailable(format!("write to driver failed: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| PortalError::DriverUnavailable(format!("write to driver failed: {}", e)))?;

        loop {
            match self.stdout.next_line().await {
                Ok(Some(reply)) if reply.trim().is_empty() => continue,
                Ok(Some(reply)) => {
                    return serde_json::from_str(&reply).map_err(|e| {
                        PortalError::Protocol(format!("unreadable reply {:?}: {}", reply, e))
                    })
                }
                Ok(None) => {
                    return Err(PortalError::DriverUnavailable(
                        "driver closed its output".to_string(),
                    ))
                }
                Err(e) => {
                    return Err(PortalError::DriverUnavailable(format!(
                        "read from driver failed: {}",
                        e
                    )))
                }
            }
        }
    }
}

/// [`PortalSession`] backed by a helper process.
///
/// Requests are serialized through a mutex. A write or read failure, or a
/// request that outlives the timeout, marks the session broken: every later
/// call fails fast and [`is_available`](PortalSession::is_available) turns
/// false.
pub struct CommandSession {
    program: PathBuf,
    timeout_secs: u64,
    io: Mutex<DriverIo>,
    broken: AtomicBool,
}

impl CommandSession {
    /// Start the helper and complete the handshake.
    pub async fn spawn(config: &DriverConfig) -> Result<Self, PortalError> {
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PortalError::DriverUnavailable(format!(
                        "driver program not found: {}",
                        config.program.display()
                    ))
                } else {
                    PortalError::DriverUnavailable(format!(
                        "failed to start {}: {}",
                        config.program.display(),
                        e
                    ))
                }
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            PortalError::DriverUnavailable("driver stdin was not captured".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            PortalError::DriverUnavailable("driver stdout was not captured".to_string())
        })?;

        let session = Self {
            program: config.program.clone(),
            timeout_secs: config.timeout_secs,
            io: Mutex::new(DriverIo {
                child,
                stdin,
                stdout: BufReader::new(stdout).lines(),
            }),
            broken: AtomicBool::new(false),
        };

        let hello = session.request(&DriverRequest::Hello).await.map_err(|e| {
            PortalError::DriverUnavailable(format!("driver handshake failed: {}", e))
        })?;
        if !hello.ok {
            return Err(PortalError::DriverUnavailable(format!(
                "driver refused handshake: {}",
                hello.error.unwrap_or_else(|| "no reason given".to_string())
            )));
        }

        info!("Portal driver started: {}", session.program.display());
        Ok(session)
    }

    /// Ask the helper to exit and wait for it.
    pub async fn shutdown(&self) {
        if !self.broken.load(Ordering::SeqCst) {
            if let Err(e) = self.request(&DriverRequest::Shutdown).await {
                debug!("Driver shutdown request failed: {}", e);
            }
        }
        self.broken.store(true, Ordering::SeqCst);

        let mut io = self.io.lock().await;
        match timeout(Duration::from_secs(5), io.child.wait()).await {
            Ok(Ok(status)) => debug!("Portal driver exited: {}", status),
            _ => {
                let _ = io.child.kill().await;
            }
        }
    }

    async fn request(&self, request: &DriverRequest<'_>) -> Result<DriverResponse, PortalError> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(PortalError::DriverUnavailable(format!(
                "driver {} is no longer running",
                self.program.display()
            )));
        }

        let mut io = self.io.lock().await;
        match timeout(Duration::from_secs(self.timeout_secs), io.exchange(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                if e.is_fatal() {
                    self.broken.store(true, Ordering::SeqCst);
                }
                Err(e)
            }
            Err(_) => {
                // the reply may still arrive and desynchronize the stream
                self.broken.store(true, Ordering::SeqCst);
                let _ = io.child.start_kill();
                Err(PortalError::Timeout {
                    timeout_secs: self.timeout_secs,
                })
            }
        }
    }

    /// Send `request`; `None` unless the helper answered `ok`.
    async fn call(&self, request: DriverRequest<'_>) -> Option<DriverResponse> {
        match self.request(&request).await {
            Ok(response) if response.ok => Some(response),
            Ok(response) => {
                debug!(
                    "Driver rejected {}: {}",
                    request.op(),
                    response.error.as_deref().unwrap_or("no reason given")
                );
                None
            }
            Err(e) => {
                warn!("Driver request {} failed: {}", request.op(), e);
                None
            }
        }
    }
}

#[async_trait]
impl PortalSession for CommandSession {
    async fn open_search_page(&self) -> bool {
        self.call(DriverRequest::OpenSearchPage).await.is_some()
    }

    async fn dropdown_options(&self, level: DropdownLevel) -> Vec<String> {
        self.call(DriverRequest::DropdownOptions { level })
            .await
            .map(|response| clean_options(response.options))
            .unwrap_or_default()
    }

    async fn select_option(&self, level: DropdownLevel, label: &str) -> bool {
        self.call(DriverRequest::SelectOption { level, label })
            .await
            .is_some()
    }

    async fn enter_doc_number(&self, doc_number: u32) -> bool {
        self.call(DriverRequest::EnterDocNumber { doc_number })
            .await
            .is_some()
    }

    async fn solve_captcha(&self) -> String {
        self.call(DriverRequest::SolveCaptcha)
            .await
            .and_then(|response| response.text)
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    }

    async fn submit_form(&self) -> bool {
        self.call(DriverRequest::SubmitForm).await.is_some()
    }

    async fn download_results(&self) -> u32 {
        self.call(DriverRequest::DownloadResults)
            .await
            .and_then(|response| response.count)
            .unwrap_or(0)
    }

    fn is_available(&self) -> bool {
        !self.broken.load(Ordering::SeqCst)
    }
}

/// Trim labels and drop blanks and "--Select ...--" placeholders.
fn clean_options(options: Vec<String>) -> Vec<String> {
    options
        .into_iter()
        .map(|option| option.trim().to_string())
        .filter(|option| !option.is_empty() && !option.starts_with(PLACEHOLDER_PREFIX))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let line = serde_json::to_string(&DriverRequest::SelectOption {
            level: DropdownLevel::District,
            label: "Pune",
        })
        .unwrap();
        assert_eq!(line, r#"{"op":"select_option","level":"district","label":"Pune"}"#);

        let line = serde_json::to_string(&DriverRequest::Hello).unwrap();
        assert_eq!(line, r#"{"op":"hello"}"#);
    }

    #[test]
    fn test_clean_options() {
        let cleaned = clean_options(vec![
            "--Select Year--".to_string(),
            " 2024 ".to_string(),
            String::new(),
            "2023".to_string(),
        ]);
        assert_eq!(cleaned, ["2024", "2023"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let config = DriverConfig {
            program: PathBuf::from("/nonexistent/igr-driver"),
            args: Vec::new(),
            timeout_secs: 5,
        };
        let err = CommandSession::spawn(&config).await.err().unwrap();
        assert!(err.is_fatal());
    }
}

#[cfg(all(test, unix))]
mod driver_tests {
    use super::*;

    const FAKE_DRIVER: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *'"op":"dropdown_options"'*) echo '{"ok":true,"options":["--Select Year--","2024"," 2023 "]}' ;;
    *'"op":"solve_captcha"'*) echo '{"ok":true,"text":" AB12 "}' ;;
    *'"op":"submit_form"'*) echo '{"ok":false,"error":"search button missing"}' ;;
    *'"op":"download_results"'*) echo '{"ok":true,"count":4}' ;;
    *'"op":"shutdown"'*) echo '{"ok":true}'; exit 0 ;;
    *) echo '{"ok":true}' ;;
  esac
done
"#;

    fn sh(script: &str, timeout_secs: u64) -> DriverConfig {
        DriverConfig {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            timeout_secs,
        }
    }

    #[tokio::test]
    async fn test_session_round_trips() {
        let session = CommandSession::spawn(&sh(FAKE_DRIVER, 5)).await.unwrap();

        assert!(session.open_search_page().await);
        assert_eq!(
            session.dropdown_options(DropdownLevel::Year).await,
            ["2024", "2023"]
        );
        assert!(session.select_option(DropdownLevel::Year, "2024").await);
        assert!(session.enter_doc_number(3).await);
        assert_eq!(session.solve_captcha().await, "AB12");
        assert!(!session.submit_form().await);
        assert_eq!(session.download_results().await, 4);
        assert!(session.is_available());

        session.shutdown().await;
        assert!(!session.is_available());
        assert!(!session.open_search_page().await);
    }

    #[tokio::test]
    async fn test_silent_helper_fails_handshake() {
        let err = CommandSession::spawn(&sh("exit 0", 5)).await.err().unwrap();
        assert!(matches!(err, PortalError::DriverUnavailable(_)));
    }

    #[tokio::test]
    async fn test_timeout_marks_session_broken() {
        let script = r#"read -r line; echo '{"ok":true}'; sleep 30"#;
        let session = CommandSession::spawn(&sh(script, 1)).await.unwrap();

        assert!(!session.open_search_page().await);
        assert!(!session.is_available());
    }

    #[tokio::test]
    async fn test_garbage_reply_is_not_fatal() {
        let script = r#"read -r line; echo '{"ok":true}'; read -r line; echo 'Traceback (most recent call last)'; read -r line; echo '{"ok":true}'; sleep 5"#;
        let session = CommandSession::spawn(&sh(script, 5)).await.unwrap();

        assert!(!session.open_search_page().await);
        assert!(session.is_available());
        assert!(session.open_search_page().await);
    }
}
