pub mod error;
pub mod output;
pub mod platform;
pub mod provider;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use error::SandboxError;
pub use output::ExecOutput;
pub use platform::PlatformClient;
pub use provider::{Platform, SandboxProvider};
pub use types::*;
