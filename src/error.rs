use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failures at the reasoning-service boundary
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Reasoning service request failed: {0}")]
    Request(String),

    #[error("Authentication failed for {provider}: {message}")]
    Auth { provider: String, message: String },

    #[error("Empty response from reasoning service")]
    EmptyResponse,

    #[error("Execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process failed with exit code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },
}

impl ServiceError {
    /// Credential and configuration failures never succeed on retry
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ServiceError::Auth { .. })
    }
}

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Failed to parse response as JSON after {attempts} attempts: {reason}")]
    Unparsable { attempts: usize, reason: String },
}

/// Structural problems in a decomposed task graph
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("Decomposition returned no tasks")]
    NoTasks,

    #[error("Task is missing required field '{field}': {task}")]
    MissingField { field: &'static str, task: String },

    #[error("Duplicate task id '{0}'")]
    DuplicateId(String),

    #[error("Circular dependency detected at task '{0}'")]
    CircularDependency(String),

    #[error("Task {task} has invalid dependency: {dependency}")]
    DanglingDependency { task: String, dependency: String },
}

/// Why a pipeline stage fell back to its deterministic output
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Parse(#[from] ParserError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Raised when a run observes its cancellation token
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Execution cancelled by user")]
pub struct ExecutionCancelled;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Cancelled(#[from] ExecutionCancelled),

    #[error("Task graph is not executable: {0}")]
    Graph(#[from] GraphError),

    #[error("Worker for task {task} panicked: {message}")]
    TaskPanicked { task: String, message: String },
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to create output directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Failed to write report: {0}")]
    WriteReport(std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Failed to read checkpoint '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write checkpoint: {0}")]
    Write(#[from] std::io::Error),

    #[error("Malformed checkpoint: {0}")]
    Malformed(#[from] serde_json::Error),
}
