/// Errors from platform operations.
///
/// The HTTP client maps transport failures and non-success statuses into
/// these variants. `NotFound` is the one callers branch on: teardown treats
/// it as "already gone".
#[derive(thiserror::Error, Debug)]
pub enum SandboxError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("provision failed: {0}")]
    Provision(String),

    #[error("exec failed: {0}")]
    Exec(String),

    #[error("serialization: {0}")]
    Serde(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SandboxError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SandboxError::NotFound(_))
    }
}
