//! Turns "delete accepted" into "delete completed" by probing a lookup
//! until the resource is gone or the attempt budget runs out.

use std::future::Future;
use std::time::Duration;

use crate::sandbox::{Lookup, SandboxProvider};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// What a transient lookup failure means while waiting for absence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransientPolicy {
    /// Any failed lookup confirms absence.
    #[default]
    TreatAsAbsent,
    /// A failed lookup proves nothing; it consumes an attempt and we probe again.
    CountAsAttempt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub transient: TransientPolicy,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_INTERVAL,
            transient: TransientPolicy::default(),
        }
    }
}

/// Probe `lookup` until it reports the resource absent.
///
/// Returns `true` as soon as absence is observed, without sleeping.
/// Returns `false` after `max_attempts` probes that all saw the resource;
/// absence is never assumed on timeout.
pub async fn wait_for_absence<T, F, Fut>(name: &str, policy: &PollPolicy, mut lookup: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Lookup<T>>,
{
    tracing::info!(resource = %name, "waiting for deletion to fully complete");
    let mut attempts = 0;

    while attempts < policy.max_attempts {
        match lookup().await {
            Lookup::NotFound => {
                tracing::info!(resource = %name, attempts, "fully deleted");
                return true;
            }
            Lookup::Transient(error) => match policy.transient {
                TransientPolicy::TreatAsAbsent => {
                    tracing::warn!(
                        resource = %name,
                        error = %error,
                        "lookup failed, treating resource as deleted"
                    );
                    return true;
                }
                TransientPolicy::CountAsAttempt => {
                    attempts += 1;
                    tracing::warn!(
                        resource = %name,
                        error = %error,
                        attempt = attempts,
                        max_attempts = policy.max_attempts,
                        "lookup failed, probing again"
                    );
                    tokio::time::sleep(policy.interval).await;
                }
            },
            Lookup::Found(_) => {
                attempts += 1;
                tracing::info!(
                    resource = %name,
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    "still exists, waiting"
                );
                tokio::time::sleep(policy.interval).await;
            }
        }
    }

    tracing::warn!(resource = %name, attempts, "timeout waiting for deletion to complete");
    false
}

/// `wait_for_absence` against a sandbox lookup.
pub async fn wait_for_sandbox_deletion<P: SandboxProvider + ?Sized>(
    provider: &P,
    name: &str,
    policy: &PollPolicy,
) -> bool {
    wait_for_absence(name, policy, || provider.get_sandbox(name)).await
}
