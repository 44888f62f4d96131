use thiserror::Error;

/// Which transform hook failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformStage {
    PreProcess,
    PostProcess,
}

impl std::fmt::Display for TransformStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformStage::PreProcess => write!(f, "pre-processing"),
            TransformStage::PostProcess => write!(f, "post-processing"),
        }
    }
}

/// Failures inside the grading harness.
///
/// None of these escape the public grading API: they end up as the `error`
/// field of a `TestResult` or as the tip list of a `PerformanceReport`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradeError {
    /// No entry-point pattern matched; carries the head of the offending source
    #[error("Could not find a function declaration in code: {snippet}")]
    NameResolution { snippet: String },

    #[error("{0}")]
    Compilation(String),

    #[error("{0}")]
    Invocation(String),

    #[error("Error in {stage}: {message}")]
    Transform {
        stage: TransformStage,
        message: String,
    },

    #[error("Execution timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    #[error("Error during analysis: {0}")]
    Analysis(String),

    /// The sandbox itself could not be set up
    #[error("Script engine unavailable: {0}")]
    Engine(String),
}

impl From<rquickjs::Error> for GradeError {
    fn from(err: rquickjs::Error) -> Self {
        GradeError::Engine(err.to_string())
    }
}

pub type GradeResult<T> = Result<T, GradeError>;
