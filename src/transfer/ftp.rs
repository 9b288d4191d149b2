//! Retrieval through the system ftp client

use super::parser::check_transcript;
use super::traits::{FetchReport, LayoutHints, Transfer};
use crate::config::{RetryConfig, TransferConfig};
use crate::error::{Error, Result};
use crate::record::validate_dataset_name;
use crate::retry::with_retry;
use crate::types::{Dsorg, Volume};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Transfer driving the system `ftp` client
///
/// Each fetch runs one client session fed a command script on stdin:
///
/// - `binary` transfer, `cd ..` to leave the user prefix
/// - `quote site rdw` for variable record formats (tape: `READTAPEFORMAT=V`)
/// - PS and tape datasets: `get`
/// - PO datasets: `mget` of every member into a directory named after the dataset
/// - VSAM clusters: `get` of the flat file they were unloaded to (`<prefix><DSN>`)
///
/// Transient failures (421/425/426 replies, dropped connections) are retried per
/// [`RetryConfig`].
///
/// # Examples
///
/// ```no_run
/// use dsmig::transfer::{FtpTransfer, LayoutHints, Transfer};
/// use std::path::{Path, PathBuf};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ftp = FtpTransfer::new(PathBuf::from("/usr/bin/ftp"), "10.0.0.5")
///     .with_credentials("USER1", "secret");
/// ftp.fetch("HLQ.DATA", &LayoutHints::default(), Path::new("datasets")).await?;
/// # Ok(())
/// # }
/// ```
pub struct FtpTransfer {
    binary_path: PathBuf,
    host: String,
    credentials: Option<(String, String)>,
    vsam_prefix: Option<String>,
    retry: RetryConfig,
}

impl FtpTransfer {
    /// Create a transfer with an explicit client path
    pub fn new(binary_path: PathBuf, host: impl Into<String>) -> Self {
        Self {
            binary_path,
            host: host.into(),
            credentials: None,
            vsam_prefix: None,
            retry: RetryConfig::default(),
        }
    }

    /// Attempt to find ftp in PATH
    pub fn from_path(host: impl Into<String>) -> Option<Self> {
        which::which("ftp").ok().map(|path| Self::new(path, host))
    }

    /// Build from configuration
    ///
    /// Fails when no host is configured or no client can be found.
    pub fn from_config(config: &TransferConfig, retry: &RetryConfig) -> Result<Self> {
        let host = config
            .host
            .clone()
            .filter(|host| !host.trim().is_empty())
            .ok_or_else(|| Error::config("transfer.host", "no host to retrieve from"))?;

        let binary_path = match &config.ftp_path {
            Some(path) => path.clone(),
            None => which::which("ftp").map_err(|_| {
                Error::NotSupported(
                    "ftp client not found in PATH; set transfer.ftp_path".to_string(),
                )
            })?,
        };

        let mut transfer = Self::new(binary_path, host).with_retry(retry.clone());
        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            transfer = transfer.with_credentials(user, password);
        }
        if let Some(prefix) = &config.vsam_prefix {
            transfer = transfer.with_vsam_prefix(prefix);
        }
        Ok(transfer)
    }

    /// Log in explicitly instead of relying on `.netrc`
    pub fn with_credentials(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    /// Prefix of the flat files VSAM clusters were unloaded to
    pub fn with_vsam_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.vsam_prefix = Some(prefix.into());
        self
    }

    /// Retry behavior for transient failures
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Command script for one dataset
    pub(crate) fn script(
        &self,
        dataset: &str,
        hints: &LayoutHints,
        destination: &Path,
    ) -> Result<String> {
        validate_dataset_name(dataset)?;
        let plan = Plan::for_dataset(dataset, hints, self.vsam_prefix.as_deref())?;

        let mut script = String::new();
        if let Some((user, password)) = &self.credentials {
            let _ = writeln!(script, "user {user} {password}");
        }
        script.push_str("binary\n");
        script.push_str("cd ..\n");
        if hints.is_tape() {
            script.push_str("quote SITE RDW READTAPEFORMAT=V\n");
        } else if hints.recfm.is_some_and(|recfm| recfm.is_variable()) {
            script.push_str("quote site rdw\n");
        }

        match plan {
            Plan::Get { remote } => {
                let _ = writeln!(script, "lcd {}", destination.display());
                let _ = writeln!(script, "get '{remote}' {dataset}");
            }
            Plan::Members => {
                let _ = writeln!(script, "lcd {}", destination.join(dataset).display());
                let _ = writeln!(script, "cd '{dataset}'");
                script.push_str("mget *\n");
            }
        }
        script.push_str("quit\n");
        Ok(script)
    }

    async fn run_session(&self, dataset: &str, script: &str) -> Result<()> {
        let mut command = Command::new(&self.binary_path);
        command.arg("-i").arg("-v");
        if self.credentials.is_some() {
            command.arg("-n");
        }
        let mut child = command
            .arg(&self.host)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute ftp: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(script.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| Error::ExternalTool(format!("ftp did not finish: {}", e)))?;

        check_transcript(&output.stdout, &output.stderr, output.status.success()).map_err(
            |reason| Error::Transfer {
                dataset: dataset.to_string(),
                reason,
            },
        )
    }
}

/// How a dataset is pulled down
#[derive(Debug, PartialEq, Eq)]
enum Plan {
    /// One file, fetched under the given remote name
    Get { remote: String },
    /// Every member of a library
    Members,
}

impl Plan {
    fn for_dataset(dataset: &str, hints: &LayoutHints, vsam_prefix: Option<&str>) -> Result<Self> {
        match &hints.volume {
            Some(Volume::Pseudo) | Some(Volume::Migrated) => {
                return Err(Error::NotSupported(format!(
                    "{dataset} is on a {} volume",
                    hints.volume.as_ref().map(|v| v.code()).unwrap_or_default()
                )));
            }
            _ => {}
        }

        match hints.dsorg {
            Some(Dsorg::Ps) => Ok(Plan::Get {
                remote: dataset.to_string(),
            }),
            None if hints.is_tape() => Ok(Plan::Get {
                remote: dataset.to_string(),
            }),
            Some(Dsorg::Po) => Ok(Plan::Members),
            Some(Dsorg::Vsam) => {
                let prefix = vsam_prefix.ok_or_else(|| Error::Transfer {
                    dataset: dataset.to_string(),
                    reason: "VSAM retrieval needs transfer.vsam_prefix".to_string(),
                })?;
                Ok(Plan::Get {
                    remote: format!("{prefix}{dataset}"),
                })
            }
            Some(Dsorg::Gdg) => Err(Error::NotSupported(format!(
                "{dataset} is a GDG base; retrieve its generations instead"
            ))),
            None => Err(Error::Transfer {
                dataset: dataset.to_string(),
                reason: "DSORG is blank".to_string(),
            }),
        }
    }
}

#[async_trait]
impl Transfer for FtpTransfer {
    async fn fetch(
        &self,
        dataset: &str,
        hints: &LayoutHints,
        destination: &Path,
    ) -> Result<FetchReport> {
        let script = self.script(dataset, hints, destination)?;
        let local_path = destination.join(dataset);

        tokio::fs::create_dir_all(destination).await?;
        if hints.dsorg == Some(Dsorg::Po) {
            tokio::fs::create_dir_all(&local_path).await?;
        }

        with_retry(&self.retry, || self.run_session(dataset, &script)).await?;

        let (bytes, members) = local_size(&local_path).await?;
        tracing::debug!(dataset, bytes, path = %local_path.display(), "ftp fetch complete");
        Ok(FetchReport {
            local_path,
            bytes,
            members,
        })
    }

    fn name(&self) -> &'static str {
        "ftp"
    }
}

/// Size of a fetched file, or total size and count of a member directory
async fn local_size(path: &Path) -> Result<(u64, Option<usize>)> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_dir() {
        return Ok((metadata.len(), None));
    }
    let mut total = 0;
    let mut members = 0;
    let mut entries = tokio::fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if metadata.is_file() {
            total += metadata.len();
            members += 1;
        }
    }
    Ok((total, Some(members)))
}
