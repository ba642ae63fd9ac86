//! Isolated subprocess execution.
//!
//! Every run gets a freshly created private output directory whose path is
//! passed to the collector through one environment variable. The subprocess
//! inherits the rest of the agent's environment, its output is captured in
//! memory, and it runs in its own process group so that the whole group can
//! be killed when the deadline expires or the run is cancelled.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, ExecutionConfig};
use crate::definition::CollectorDefinition;
use crate::state::RunStateCache;

use super::error::CollectError;
use super::lock::RunLock;

/// Maximum number of captured stderr bytes kept for diagnostics.
pub const MAX_STDERR_BYTES: usize = 4096;

/// Runs collector commands in isolated output directories.
#[derive(Debug, Clone)]
pub struct Executor {
    collections_dir: PathBuf,
    execution: ExecutionConfig,
    state: RunStateCache,
    cancel: CancellationToken,
}

impl Executor {
    /// Create an executor writing output directories under `collections_dir`.
    pub fn new(
        collections_dir: impl Into<PathBuf>,
        execution: ExecutionConfig,
        state: RunStateCache,
    ) -> Self {
        Self {
            collections_dir: collections_dir.into(),
            execution,
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// Create an executor from application configuration.
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.paths.collections_dir,
            config.execution.clone(),
            RunStateCache::from_config(&config.paths),
        )
    }

    /// Kill running commands when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run-state cache updated after successful collections.
    pub fn state(&self) -> &RunStateCache {
        &self.state
    }

    /// Deadline for `definition`: its own timeout, else the configured default.
    pub fn effective_timeout(&self, definition: &CollectorDefinition) -> Duration {
        definition.timeout.unwrap_or(self.execution.timeout)
    }

    /// Create a private output directory for one run of `definition`.
    ///
    /// The name is `<id>-<unix seconds>-<random suffix>`, so directories sort
    /// by start time and two runs within one second never share a directory.
    ///
    /// # Errors
    /// Returns `CollectError::DirectoryCreateFailed` on any filesystem error.
    pub fn create_output_directory(
        &self,
        definition: &CollectorDefinition,
    ) -> Result<PathBuf, CollectError> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let name = format!(
            "{}-{}-{}",
            definition.id,
            Utc::now().timestamp(),
            &suffix[..8]
        );
        let path = std::path::absolute(self.collections_dir.join(name))
            .map_err(|source| CollectError::DirectoryCreateFailed {
                path: self.collections_dir.clone(),
                source,
            })?;

        create_private_dir(&self.collections_dir, &path, self.execution.directory_mode).map_err(
            |source| {
                tracing::error!(id = %definition.id, path = %path.display(), error = %source, "Cannot create collection directory");
                CollectError::DirectoryCreateFailed {
                    path: path.clone(),
                    source,
                }
            },
        )?;

        tracing::debug!(path = %path.display(), "Generated collection directory");
        Ok(path)
    }

    /// Acquire the run lock for `definition`.
    ///
    /// # Errors
    /// `CollectError::AlreadyRunning` while another run of the collector holds it.
    pub fn lock(&self, definition: &CollectorDefinition) -> Result<RunLock, CollectError> {
        RunLock::acquire(self.state.dir(), &definition.id)
    }

    /// Acquire the run lock, running unlocked when the lock file is unusable.
    ///
    /// The lock lives in the run-state cache, whose failures never stop a
    /// collection. Only contention with another run is an error.
    ///
    /// # Errors
    /// `CollectError::AlreadyRunning` while another run of the collector holds it.
    pub fn try_lock(
        &self,
        definition: &CollectorDefinition,
    ) -> Result<Option<RunLock>, CollectError> {
        match self.lock(definition) {
            Ok(lock) => Ok(Some(lock)),
            Err(CollectError::Lock { id, source }) => {
                tracing::warn!(id = %id, dir = %self.state.dir().display(), error = %source, "Cannot lock collector, running without lock");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Run `definition` in a new output directory and return its path.
    ///
    /// On failure the directory is removed before the error is returned.
    pub async fn run(&self, definition: &CollectorDefinition) -> Result<PathBuf, CollectError> {
        let _lock = self.try_lock(definition)?;
        let directory = self.create_output_directory(definition)?;

        match self.execute(definition, &directory).await {
            Ok(()) => Ok(directory),
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir_all(&directory) {
                    tracing::warn!(path = %directory.display(), error = %cleanup, "Didn't wipe collection directory");
                }
                Err(e)
            }
        }
    }

    /// Run `definition` against an existing output directory while `_lock` is held.
    ///
    /// `_lock` is `None` when [`try_lock`](Self::try_lock) could not use the
    /// lock file. The caller owns `directory` and is responsible for removing it.
    pub async fn collect_into(
        &self,
        definition: &CollectorDefinition,
        directory: &Path,
        _lock: Option<&RunLock>,
    ) -> Result<(), CollectError> {
        self.execute(definition, directory).await
    }

    async fn execute(
        &self,
        definition: &CollectorDefinition,
        directory: &Path,
    ) -> Result<(), CollectError> {
        let argv = definition.argv();
        let Some((program, args)) = argv.split_first() else {
            return Err(CollectError::ExecutionFailed {
                id: definition.id.clone(),
                reason: "empty command".to_string(),
                stderr: String::new(),
            });
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env(&self.execution.env_var, directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        self.apply_identity(definition, &mut cmd);

        let timeout = self.effective_timeout(definition);
        tracing::debug!(
            id = %definition.id,
            command = %definition.command,
            directory = %directory.display(),
            timeout = %humantime::format_duration(timeout),
            "Executing collector"
        );

        let child = cmd.spawn().map_err(|e| {
            tracing::error!(id = %definition.id, program = %program, error = %e, "Could not launch collector");
            CollectError::ExecutionFailed {
                id: definition.id.clone(),
                reason: format!("cannot launch '{}': {}", program, e),
                stderr: String::new(),
            }
        })?;
        let pid = child.id();

        let start = Instant::now();
        let output = tokio::select! {
            output = child.wait_with_output() => output,
            _ = tokio::time::sleep(timeout) => {
                kill_process_group(pid);
                tracing::error!(id = %definition.id, timeout = %humantime::format_duration(timeout), "Collector timed out");
                return Err(CollectError::Timeout { id: definition.id.clone(), timeout });
            }
            _ = self.cancel.cancelled() => {
                kill_process_group(pid);
                tracing::warn!(id = %definition.id, "Collector cancelled");
                return Err(CollectError::Cancelled { id: definition.id.clone() });
            }
        };

        let output = output.map_err(|e| CollectError::ExecutionFailed {
            id: definition.id.clone(),
            reason: format!("cannot wait for collector: {}", e),
            stderr: String::new(),
        })?;

        let stderr = tail_lossy(&output.stderr, MAX_STDERR_BYTES);
        if !output.status.success() {
            tracing::error!(
                id = %definition.id,
                status = %output.status,
                stderr = %stderr,
                "Could not run collector"
            );
            return Err(CollectError::ExecutionFailed {
                id: definition.id.clone(),
                reason: output.status.to_string(),
                stderr,
            });
        }

        tracing::debug!(
            id = %definition.id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "Collector finished"
        );

        if let Err(e) = self.state.record_run(&definition.id, Utc::now()) {
            tracing::error!(id = %definition.id, error = %e, "Cannot update collection timestamp");
        }
        Ok(())
    }

    fn apply_identity(&self, definition: &CollectorDefinition, cmd: &mut Command) {
        if definition.uid.is_none() && definition.gid.is_none() {
            return;
        }
        if !self.execution.enforce_identity {
            tracing::debug!(id = %definition.id, uid = ?definition.uid, gid = ?definition.gid, "Identity is advisory, not applied");
            return;
        }
        #[cfg(unix)]
        {
            if let Some(gid) = definition.gid {
                cmd.gid(gid);
            }
            if let Some(uid) = definition.uid {
                cmd.uid(uid);
            }
        }
        #[cfg(not(unix))]
        let _ = cmd;
    }
}

fn create_private_dir(parent: &Path, path: &Path, mode: u32) -> std::io::Result<()> {
    std::fs::create_dir_all(parent)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

        // create, not create_all: an existing directory is never reused
        std::fs::DirBuilder::new().mode(mode).create(path)?;
        // The umask may have dropped bits from `mode`
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }

    #[cfg(not(unix))]
    {
        let _ = mode;
        std::fs::create_dir(path)
    }
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    // SAFETY: killpg only sends a signal; the group was created for our own child.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc != 0 {
        tracing::debug!(pid, error = %std::io::Error::last_os_error(), "killpg failed");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Last `max` bytes of `bytes` as lossy UTF-8, trimmed.
fn tail_lossy(bytes: &[u8], max: usize) -> String {
    let start = bytes.len().saturating_sub(max);
    let text = String::from_utf8_lossy(&bytes[start..]);
    let text = text.trim();
    if start > 0 {
        format!("...{}", text)
    } else {
        text.to_string()
    }
}
