//! Best-effort teardown of everything a scenario run may have created.
//!
//! Resources are registered before the first remote mutation, so a run that
//! aborts halfway still tears down the whole plan. Every registered resource
//! gets exactly one delete attempt; a failed or redundant delete never stops
//! the remaining ones.

use crate::sandbox::Platform;

use super::poller::{PollPolicy, wait_for_sandbox_deletion};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Sandbox {
        name: String,
        /// Poll for absence after the delete is accepted.
        confirm_deletion: bool,
    },
    Volume(String),
}

impl Resource {
    pub fn name(&self) -> &str {
        match self {
            Resource::Sandbox { name, .. } => name,
            Resource::Volume(name) => name,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Resource::Sandbox { .. } => "sandbox",
            Resource::Volume(_) => "volume",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub deleted: Vec<String>,
    pub already_gone: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Deleted, but absence could not be confirmed within the poll budget.
    pub unconfirmed: Vec<String>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.unconfirmed.is_empty()
    }
}

/// Ordered list of resources to delete when the scenario ends.
#[derive(Debug, Clone, Default)]
pub struct Teardown {
    resources: Vec<Resource>,
    poll: PollPolicy,
}

impl Teardown {
    pub fn new(poll: PollPolicy) -> Self {
        Self {
            resources: Vec::new(),
            poll,
        }
    }

    pub fn register(&mut self, resource: Resource) {
        if !self.resources.contains(&resource) {
            self.resources.push(resource);
        }
    }

    #[cfg(test)]
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Delete every registered resource in registration order. Never fails.
    pub async fn run<P: Platform + ?Sized>(&self, platform: &P) -> TeardownReport {
        let mut report = TeardownReport::default();

        for resource in &self.resources {
            let name = resource.name().to_string();
            let result = match resource {
                Resource::Sandbox { name, .. } => platform.delete_sandbox(name).await,
                Resource::Volume(name) => platform.delete_volume(name).await,
            };

            match result {
                Ok(()) => {
                    tracing::info!(kind = resource.kind(), resource = %name, "deleted");
                    if let Resource::Sandbox {
                        confirm_deletion: true,
                        ..
                    } = resource
                    {
                        if !wait_for_sandbox_deletion(platform, &name, &self.poll).await {
                            tracing::warn!(resource = %name, "deletion not confirmed during cleanup");
                            report.unconfirmed.push(name.clone());
                        }
                    }
                    report.deleted.push(name);
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!(kind = resource.kind(), resource = %name, "already gone");
                    report.already_gone.push(name);
                }
                Err(e) => {
                    tracing::warn!(
                        kind = resource.kind(),
                        resource = %name,
                        error = %e,
                        "cleanup delete failed"
                    );
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        report
    }
}
