use std::path::PathBuf;

/// Typed result of one external stage.
///
/// Success is read from the stage's manifest `status` field, never inferred
/// from the artifact merely existing.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub succeeded: bool,
    pub artifact: Option<PathBuf>,
    pub diagnostic: Option<String>,
}

impl StageOutcome {
    pub fn success(artifact: PathBuf) -> Self {
        Self {
            succeeded: true,
            artifact: Some(artifact),
            diagnostic: None,
        }
    }

    pub fn failure(diagnostic: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            artifact: None,
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }
}
