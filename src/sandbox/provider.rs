use async_trait::async_trait;

use super::error::SandboxError;
use super::output::ExecOutput;
use super::types::{
    ExecRequest, Lookup, Sandbox, SandboxCreateRequest, Volume, VolumeCreateRequest,
};

/// Sandbox lifecycle and command execution on a remote platform.
///
/// Deletion is asynchronous on the platform side: `delete` returning `Ok`
/// only means the request was accepted. Use `get` to observe completion.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create_sandbox(&self, req: &SandboxCreateRequest) -> Result<Sandbox, SandboxError>;

    /// Look a sandbox up by name. Never errors; failures surface as
    /// `Lookup::Transient`.
    async fn get_sandbox(&self, name: &str) -> Lookup<Sandbox>;

    async fn delete_sandbox(&self, name: &str) -> Result<(), SandboxError>;

    /// Run a shell command inside the sandbox, capturing combined output.
    async fn exec(&self, sandbox: &str, req: ExecRequest) -> Result<ExecOutput, SandboxError>;
}

/// Volume lifecycle on a remote platform.
#[async_trait]
pub trait VolumeProvider: Send + Sync {
    async fn create_volume(&self, req: &VolumeCreateRequest) -> Result<Volume, SandboxError>;

    /// Fails with `SandboxError::NotFound` if the volume does not exist.
    async fn delete_volume(&self, name: &str) -> Result<(), SandboxError>;
}

/// Both halves of the platform. Blanket-implemented.
pub trait Platform: SandboxProvider + VolumeProvider {}

impl<T: SandboxProvider + VolumeProvider> Platform for T {}
