/// Core data model for the sandbox execution pipeline.
///
/// These types flow in one direction — Dispatcher -> Language Runner ->
/// Stager + Prelude -> Process Runner -> Output Capture -> RunResult — and
/// are never mutated after construction once they cross a component
/// boundary.
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SandboxError>;

/// The two interpreters the sandbox knows how to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Node,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Node => "nodejs",
        }
    }

    /// Map an MCP tool name to the language it runs, if any.
    pub fn from_tool_name(tool: &str) -> Option<Self> {
        match tool {
            "run_python_code" => Some(Language::Python),
            "run_nodejs_code" => Some(Language::Node),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options that vary the sandbox policy for a single request. Immutable
/// for the lifetime of the request.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct RunnerOptions {
    #[serde(default)]
    pub enable_network: bool,
}

/// A single code-execution request, owned by exactly one language runner.
#[derive(Clone, Debug)]
pub struct RunRequest {
    pub language: Language,
    pub source_code: Vec<u8>,
    pub preload: Vec<u8>,
    pub options: RunnerOptions,
    pub deadline: Duration,
}

impl RunRequest {
    pub fn new(language: Language, source_code: impl Into<Vec<u8>>, deadline: Duration) -> Self {
        Self {
            language,
            source_code: source_code.into(),
            preload: Vec::new(),
            options: RunnerOptions::default(),
            deadline,
        }
    }

    pub fn with_preload(mut self, preload: impl Into<Vec<u8>>) -> Self {
        self.preload = preload.into();
        self
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }
}

/// The outcome of exactly one RunRequest. Produced exactly once.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub code: i32,
    pub message: String,
    pub stdout: String,
    pub stderr: String,
}

impl RunResult {
    pub fn success(stdout: String, stderr: String) -> Self {
        Self {
            code: 0,
            message: String::new(),
            stdout,
            stderr,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    pub fn from_error(err: &SandboxError, stdout: String, stderr: String) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            stdout,
            stderr,
        }
    }
}

/// Stable error kinds mapped to the exit codes in the external interface.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("required filesystem path missing: {0}")]
    FsMissing(String),

    #[error("failed to spawn interpreter: {0}")]
    SpawnFailed(String),

    #[error("execution timed out after {deadline:?}")]
    Timeout {
        deadline: Duration,
        /// Whatever the child had written before the kill signal went
        /// out — a timeout still reports partial output, per the
        /// external interface's `TIMEOUT` contract.
        stdout: String,
        stderr: String,
    },

    #[error("process terminated by seccomp filter: {0}")]
    SeccompViolation(String),

    #[error("failed to capture child output: {0}")]
    CaptureError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("namespace isolation error: {0}")]
    Namespace(String),
}

impl SandboxError {
    /// Stable numeric code surfaced in the `error` field of a tool result.
    pub fn code(&self) -> i32 {
        match self {
            SandboxError::BadRequest(_) => -400,
            SandboxError::UnsupportedLanguage(_) => -400,
            SandboxError::FsMissing(_) => -500,
            SandboxError::SpawnFailed(_) => -500,
            SandboxError::Timeout { .. } => -408,
            SandboxError::SeccompViolation(_) => -403,
            SandboxError::CaptureError(_) => -500,
            SandboxError::Io(_) => -500,
            SandboxError::Config(_) => -500,
            SandboxError::Namespace(_) => -500,
        }
    }
}

/// Reported by the `health_check` tool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub service: String,
    pub status: String,
    pub runtime: String,
    pub config: String,
}

/// One installed package, as reported by `list_python_dependencies`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DependencyEntry {
    pub name: String,
    pub version: String,
}

/// Published by the dependency ticker, served by the dependency tools.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DependencySnapshot {
    pub dependencies: Vec<DependencyEntry>,
}
