use std::fmt;

use anyhow::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppErrorKind {
    /// Contradictory or malformed options, rejected before any tool runs.
    Config,
    /// Neither a filename nor a cache-management action was given.
    MissingInput,
    ToolNotFound,
    ToolFailed,
    /// Registry entry exists but its frames are gone. Downgraded to a cache miss.
    CacheCorrupt,
    /// A configuration was fingerprinted twice. Always a bug.
    FingerprintGuard,
}

impl AppErrorKind {
    pub fn is_user_facing(self) -> bool {
        matches!(
            self,
            Self::Config | Self::MissingInput | Self::ToolNotFound | Self::ToolFailed
        )
    }
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub code: &'static str,
    pub message: String,
    pub kind: AppErrorKind,
}

impl AppError {
    fn new(kind: AppErrorKind, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            kind,
        }
    }

    pub fn config(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Config, code, message)
    }

    pub fn missing_input(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::MissingInput, "E_MISSING_INPUT", message)
    }

    pub fn tool_not_found(tool: &str, remediation: &str) -> Self {
        Self::new(
            AppErrorKind::ToolNotFound,
            "E_TOOL_NOT_FOUND",
            format!(
                "The command {tool} was not found. {remediation}\nIf it is installed but still not found, check your PATH."
            ),
        )
    }

    pub fn tool_failed(tool: &str, diagnostics: impl AsRef<str>) -> Self {
        let diagnostics = diagnostics.as_ref().trim();
        let message = if diagnostics.is_empty() {
            format!("{tool} failed")
        } else {
            format!("{tool} failed: {diagnostics}")
        };
        Self::new(AppErrorKind::ToolFailed, "E_TOOL_FAILED", message)
    }

    pub fn cache_corrupt(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::CacheCorrupt, "E_CACHE_CORRUPT", message)
    }

    pub fn fingerprint_guard() -> Self {
        Self::new(
            AppErrorKind::FingerprintGuard,
            "E_ALREADY_FINGERPRINTED",
            "configuration already carries a fingerprint; refusing to hash it again",
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

pub fn find_app_error(error: &Error) -> Option<&AppError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<AppError>())
}
