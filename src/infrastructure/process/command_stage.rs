use crate::domain::pipeline::manifest::{ManifestHeader, ManifestStatus, read_manifest};
use crate::domain::pipeline::run::StageKind;
use crate::domain::pipeline::stage::StageOutcome;
use crate::domain::ports::ExternalStage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Environment variable telling the child where to write its manifest.
pub const MANIFEST_ENV: &str = "AUTOTUNE_MANIFEST";

/// Maximum characters of captured output carried in a diagnostic.
const DIAGNOSTIC_TAIL_CHARS: usize = 2000;

/// External stage run as `sh -c <command>`.
///
/// The child is killed when the returned future is dropped, so the runner's
/// timeout and shutdown handling terminate it.
pub struct CommandStage {
    kind: StageKind,
    command: String,
    workdir: PathBuf,
    manifest_path: PathBuf,
}

impl CommandStage {
    pub fn new(
        kind: StageKind,
        command: impl Into<String>,
        workdir: impl Into<PathBuf>,
        manifest_path: impl Into<PathBuf>,
    ) -> Self {
        let workdir = workdir.into();
        let manifest_path = manifest_path.into();
        let manifest_path = if manifest_path.is_absolute() {
            manifest_path
        } else {
            workdir.join(manifest_path)
        };
        Self {
            kind,
            command: command.into(),
            workdir,
            manifest_path,
        }
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    fn remove_stale_manifest(&self) -> Result<()> {
        match std::fs::remove_file(&self.manifest_path) {
            Ok(()) => {
                debug!("Removed stale manifest {:?}", self.manifest_path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove stale manifest {}", self.manifest_path.display())
            }),
        }
    }

    fn read_status(&self) -> StageOutcome {
        match read_manifest::<ManifestHeader>(&self.manifest_path) {
            Ok(header) if header.status == ManifestStatus::Succeeded => {
                let outcome = StageOutcome::success(self.manifest_path.clone());
                match header.diagnostic {
                    Some(d) => outcome.with_diagnostic(d),
                    None => outcome,
                }
            }
            Ok(header) => StageOutcome::failure(
                header
                    .diagnostic
                    .unwrap_or_else(|| "stage reported failure".to_string()),
            ),
            Err(e) => StageOutcome::failure(format!(
                "exited successfully but left no valid manifest: {:#}",
                e
            )),
        }
    }
}

#[async_trait]
impl ExternalStage for CommandStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn run(&self) -> Result<StageOutcome> {
        self.remove_stale_manifest()?;
        if let Some(dir) = self.manifest_path.parent() {
            std::fs::create_dir_all(dir).context("Failed to create manifest directory")?;
        }

        info!("Running {} stage: {}", self.kind, self.command);
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.workdir)
            .env(MANIFEST_ENV, &self.manifest_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so pipelines and wrapper scripts die with the stage.
        #[cfg(unix)]
        command.process_group(0);

        let child = command
            .spawn()
            .with_context(|| format!("Failed to launch {} stage", self.kind))?;
        let group = ProcessGroupGuard::new(child.id());
        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to wait for {} stage", self.kind))?;
        group.disarm();

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("{} stdout:\n{}", self.kind, stdout);
        if !stderr.trim().is_empty() {
            debug!("{} stderr:\n{}", self.kind, stderr);
        }

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            warn!("{} stage exited with status {}", self.kind, code);
            return Ok(StageOutcome::failure(format!(
                "exit status {}: {}",
                code,
                tail(if stderr.trim().is_empty() { &stdout } else { &stderr })
            )));
        }

        Ok(self.read_status())
    }
}

/// Kills the stage's whole process group when dropped before the stage exits.
///
/// `kill_on_drop` only reaches the `sh` process; its own children would
/// otherwise outlive a timed-out or cancelled stage.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created for this stage.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc == 0 {
        debug!("Killed stage process group {}", pgid);
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

fn tail(text: &str) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= DIAGNOSTIC_TAIL_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(count - DIAGNOSTIC_TAIL_CHARS).collect();
    format!("...{}", tail)
}
