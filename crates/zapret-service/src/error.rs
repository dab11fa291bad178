use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Service control is not supported on this platform")]
    Unsupported,

    #[error("{api} failed with code {code}")]
    Win32 { api: &'static str, code: u32 },

    #[error("Service {name} is not installed")]
    NotInstalled { name: String },

    #[error("Access denied while trying to {operation}")]
    AccessDenied { operation: &'static str },

    #[error("Service control task failed: {details}")]
    Task { details: String },
}

impl ServiceError {
    #[must_use]
    pub fn task<E: std::fmt::Display>(error: E) -> Self {
        Self::Task {
            details: error.to_string(),
        }
    }
}
