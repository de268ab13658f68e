use crate::domain::pipeline::run::PipelineRun;
use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Append-only JSON Lines log of finished pipeline runs.
pub struct RunHistory {
    file_path: PathBuf,
}

impl RunHistory {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn append(&self, run: &PipelineRun) -> Result<()> {
        if let Some(dir) = self.file_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).context("Failed to create run history directory")?;
        }
        let line = serde_json::to_string(run).context("Failed to serialize pipeline run")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .with_context(|| format!("Failed to open {}", self.file_path.display()))?;
        writeln!(file, "{}", line).context("Failed to append pipeline run")?;
        Ok(())
    }

    /// Most recent runs last. Lines that fail to parse are skipped.
    pub fn recent(&self, limit: usize) -> Result<Vec<PipelineRun>> {
        if !self.file_path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to read {}", self.file_path.display()))?;
        let runs: Vec<PipelineRun> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        let skip = runs.len().saturating_sub(limit);
        Ok(runs.into_iter().skip(skip).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pipeline::run::RunOutcome;

    #[test]
    fn test_append_and_read_back() {
        let temp_dir = std::env::temp_dir().join(format!(
            "autotune_test_{}_history",
            std::process::id()
        ));
        let history = RunHistory::new(temp_dir.join("nested").join("runs.jsonl"));

        for _ in 0..3 {
            let mut run = PipelineRun::new();
            run.abort("disk full").unwrap();
            history.append(&run).unwrap();
        }

        let recent = history.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].outcome(), Some(RunOutcome::Failed));
        fs::remove_dir_all(temp_dir).ok();
    }
}
