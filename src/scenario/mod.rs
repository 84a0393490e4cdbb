//! Volume persistence scenario.
//!
//! Writes a line to a volume through one sandbox, deletes that sandbox,
//! waits until the platform confirms it is gone, mounts the same volume in a
//! fresh sandbox at a different path and reads the line back.
//!
//! Steps run strictly in order: the second sandbox is only created after the
//! first one is confirmed absent, so the two never hold the volume together.

pub mod cleanup;
pub mod commands;
pub mod naming;
pub mod poller;

use std::fmt;
use std::panic::AssertUnwindSafe;

use anyhow::{Context, Result};
use futures::FutureExt;
use tracing::Instrument;

use crate::sandbox::{
    ExecOutput, ExecRequest, Lookup, Platform, SandboxCreateRequest, VolumeBinding,
    VolumeCreateRequest,
};

use cleanup::{Resource, Teardown, TeardownReport};
use naming::ResourceNames;
use poller::{PollPolicy, wait_for_sandbox_deletion};

pub const DEFAULT_CONTENT: &str = "Hello from sandbox!";
pub const DEFAULT_FILE_NAME: &str = "test-file.txt";
pub const DEFAULT_FIRST_MOUNT: &str = "/persistent-data";
pub const DEFAULT_SECOND_MOUNT: &str = "/data";
pub const DEFAULT_MEMORY_MB: u32 = 2048;
pub const DEFAULT_VOLUME_SIZE_MB: u32 = 1024;

/// Last state the scenario reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    VolumeCreated,
    FirstSandboxCreated,
    FirstWriteDone,
    FirstReadVerified,
    FirstSandboxDeleted,
    FirstDeletionConfirmed,
    SecondSandboxCreated,
    SecondReadVerified,
    Compared,
}

impl Stage {
    /// Number of the transition that enters this stage; `Init` is 0.
    pub fn step(self) -> u8 {
        match self {
            Stage::Init => 0,
            Stage::VolumeCreated => 1,
            Stage::FirstSandboxCreated => 2,
            Stage::FirstWriteDone => 3,
            Stage::FirstReadVerified => 4,
            Stage::FirstSandboxDeleted => 5,
            Stage::FirstDeletionConfirmed => 6,
            Stage::SecondSandboxCreated => 7,
            Stage::SecondReadVerified => 8,
            Stage::Compared => 9,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::VolumeCreated => "volume-created",
            Stage::FirstSandboxCreated => "first-sandbox-created",
            Stage::FirstWriteDone => "first-write-done",
            Stage::FirstReadVerified => "first-read-verified",
            Stage::FirstSandboxDeleted => "first-sandbox-deleted",
            Stage::FirstDeletionConfirmed => "first-deletion-confirmed",
            Stage::SecondSandboxCreated => "second-sandbox-created",
            Stage::SecondReadVerified => "second-read-verified",
            Stage::Compared => "compared",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The second sandbox read back exactly what the first one wrote.
    Success,
    /// The scenario completed but the content differs.
    Mismatch { expected: String, actual: String },
    /// A step failed; the remaining steps were skipped.
    Aborted { stage: Stage, error: String },
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: Outcome,
    pub reached: Stage,
    pub teardown: TeardownReport,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Process exit status: 0 only on success.
    pub fn exit_status(&self) -> u8 {
        if self.passed() { 0 } else { 1 }
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub names: ResourceNames,
    pub volume_display_name: String,
    pub volume_size_mb: u32,
    pub image: String,
    pub memory_mb: u32,
    pub region: Option<String>,
    pub first_mount: String,
    pub second_mount: String,
    pub file_name: String,
    pub content: String,
    pub poll: PollPolicy,
}

impl ScenarioConfig {
    pub fn new(names: ResourceNames, image: impl Into<String>) -> Self {
        Self {
            names,
            volume_display_name: "Test Persistence Volume".into(),
            volume_size_mb: DEFAULT_VOLUME_SIZE_MB,
            image: image.into(),
            memory_mb: DEFAULT_MEMORY_MB,
            region: None,
            first_mount: DEFAULT_FIRST_MOUNT.into(),
            second_mount: DEFAULT_SECOND_MOUNT.into(),
            file_name: DEFAULT_FILE_NAME.into(),
            content: DEFAULT_CONTENT.into(),
            poll: PollPolicy::default(),
        }
    }
}

pub struct Scenario {
    config: ScenarioConfig,
}

impl Scenario {
    pub fn new(config: ScenarioConfig) -> Self {
        Self { config }
    }

    /// The teardown plan: both sandboxes, then the volume. Only the second
    /// sandbox's deletion is awaited; the first is already confirmed gone on
    /// the success path.
    pub fn teardown(&self) -> Teardown {
        let names = &self.config.names;
        let mut teardown = Teardown::new(self.config.poll);
        teardown.register(Resource::Sandbox {
            name: names.first_sandbox.clone(),
            confirm_deletion: false,
        });
        teardown.register(Resource::Sandbox {
            name: names.second_sandbox.clone(),
            confirm_deletion: true,
        });
        teardown.register(Resource::Volume(names.volume.clone()));
        teardown
    }

    /// Run every step, then tear down regardless of how the steps ended.
    pub async fn run<P: Platform + ?Sized>(&self, platform: &P) -> RunReport {
        let names = &self.config.names;
        let span = tracing::info_span!(
            "scenario",
            volume = %names.volume,
            first = %names.first_sandbox,
            second = %names.second_sandbox,
        );

        async {
            let teardown = self.teardown();
            let mut reached = Stage::Init;

            let result = AssertUnwindSafe(self.execute(platform, &mut reached))
                .catch_unwind()
                .await;

            let outcome = match result {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    let error = format!("{e:#}");
                    tracing::error!(stage = %reached, error = %error, "scenario failed");
                    Outcome::Aborted {
                        stage: reached,
                        error,
                    }
                }
                Err(panic) => {
                    let error = panic_message(panic.as_ref());
                    tracing::error!(stage = %reached, error = %error, "scenario panicked");
                    Outcome::Aborted {
                        stage: reached,
                        error,
                    }
                }
            };

            tracing::info!("cleaning up");
            let teardown = teardown.run(platform).await;
            if !teardown.is_clean() {
                tracing::warn!(
                    failed = teardown.failed.len(),
                    unconfirmed = teardown.unconfirmed.len(),
                    "cleanup incomplete"
                );
            }

            RunReport {
                outcome,
                reached,
                teardown,
            }
        }
        .instrument(span)
        .await
    }

    async fn execute<P: Platform + ?Sized>(&self, platform: &P, reached: &mut Stage) -> Result<Outcome> {
        let cfg = &self.config;
        let names = &cfg.names;
        let first_file = commands::file_path(&cfg.first_mount, &cfg.file_name);

        tracing::info!(step = Stage::VolumeCreated.step(), volume = %names.volume, size_mb = cfg.volume_size_mb, "creating volume");
        let volume = platform
            .create_volume(
                &VolumeCreateRequest::new(&names.volume, &cfg.volume_display_name, cfg.volume_size_mb)
                    .with_region(cfg.region.clone()),
            )
            .await
            .context("failed to create volume")?;
        tracing::info!(volume = %volume.metadata.name, "volume created");
        *reached = Stage::VolumeCreated;

        tracing::info!(step = Stage::FirstSandboxCreated.step(), sandbox = %names.first_sandbox, mount = %cfg.first_mount, "creating sandbox with volume");
        let first = platform
            .create_sandbox(&self.sandbox_request(&names.first_sandbox, &cfg.first_mount))
            .await
            .with_context(|| format!("failed to create sandbox {}", names.first_sandbox))?;
        tracing::info!(sandbox = %first.name(), "sandbox created");
        self.check_region(platform, &names.first_sandbox).await;
        *reached = Stage::FirstSandboxCreated;

        tracing::info!(step = Stage::FirstWriteDone.step(), path = %first_file, "writing file to volume");
        exec(platform, &names.first_sandbox, &commands::write_line(&cfg.content, &first_file)).await?;
        *reached = Stage::FirstWriteDone;

        tracing::info!(step = Stage::FirstReadVerified.step(), "reading file from volume in first sandbox");
        let first_content = self
            .inspect(platform, &names.first_sandbox, &cfg.first_mount, false)
            .await?;
        tracing::info!(content = %first_content, "file content");
        *reached = Stage::FirstReadVerified;

        tracing::info!(step = Stage::FirstSandboxDeleted.step(), sandbox = %names.first_sandbox, "deleting first sandbox");
        platform
            .delete_sandbox(&names.first_sandbox)
            .await
            .with_context(|| format!("failed to delete sandbox {}", names.first_sandbox))?;
        *reached = Stage::FirstSandboxDeleted;

        tracing::info!(step = Stage::FirstDeletionConfirmed.step(), sandbox = %names.first_sandbox, "waiting for deletion to complete");
        if !wait_for_sandbox_deletion(platform, &names.first_sandbox, &cfg.poll).await {
            anyhow::bail!(
                "timeout waiting for sandbox {} deletion to complete",
                names.first_sandbox
            );
        }
        *reached = Stage::FirstDeletionConfirmed;

        tracing::info!(step = Stage::SecondSandboxCreated.step(), sandbox = %names.second_sandbox, mount = %cfg.second_mount, "creating new sandbox with same volume");
        let second = platform
            .create_sandbox(&self.sandbox_request(&names.second_sandbox, &cfg.second_mount))
            .await
            .with_context(|| format!("failed to create sandbox {}", names.second_sandbox))?;
        tracing::info!(sandbox = %second.name(), "sandbox created");
        self.check_region(platform, &names.second_sandbox).await;
        *reached = Stage::SecondSandboxCreated;

        tracing::info!(step = Stage::SecondReadVerified.step(), "reading file from volume in second sandbox");
        let second_content = self
            .inspect(platform, &names.second_sandbox, &cfg.second_mount, true)
            .await?;
        tracing::info!(content = %second_content, "file content from new sandbox");
        *reached = Stage::SecondReadVerified;

        *reached = Stage::Compared;
        if second_content == cfg.content {
            tracing::info!(
                step = Stage::Compared.step(),
                original = %cfg.content,
                persisted = %second_content,
                "volume data persisted across sandbox recreations"
            );
            Ok(Outcome::Success)
        } else {
            tracing::error!(
                step = Stage::Compared.step(),
                expected = %cfg.content,
                got = %second_content,
                "volume data did not persist correctly"
            );
            Ok(Outcome::Mismatch {
                expected: cfg.content.clone(),
                actual: second_content,
            })
        }
    }

    fn sandbox_request(&self, name: &str, mount: &str) -> SandboxCreateRequest {
        let cfg = &self.config;
        SandboxCreateRequest::new(name, &cfg.image, cfg.memory_mb)
            .with_region(cfg.region.clone())
            .with_volume(VolumeBinding::writable(&cfg.names.volume, mount))
    }

    /// Diagnostic listings of the mount, then the file content exactly as
    /// written. The identity check is only useful where permissions are in
    /// question.
    async fn inspect<P: Platform + ?Sized>(
        &self,
        platform: &P,
        sandbox: &str,
        mount: &str,
        identity: bool,
    ) -> Result<String> {
        let path = commands::file_path(mount, &self.config.file_name);

        let mount_info = exec(platform, sandbox, &commands::mount_grep(mount)).await?;
        if mount_info.is_empty() {
            tracing::warn!(sandbox = %sandbox, mount = %mount, "no mount found");
        } else {
            tracing::debug!(sandbox = %sandbox, mount_info = %mount_info, "mount info");
        }

        let listing = exec(platform, sandbox, &commands::list_dir(mount)).await?;
        tracing::debug!(sandbox = %sandbox, mount = %mount, listing = %listing, "directory listing");

        let existence = exec(platform, sandbox, &commands::exists(&path)).await?;
        tracing::info!(sandbox = %sandbox, path = %path, check = %existence, "file existence check");

        let details = exec(platform, sandbox, &commands::details(&path)).await?;
        tracing::debug!(sandbox = %sandbox, details = %details, "file details");

        if identity {
            let user = exec(platform, sandbox, &commands::identity()).await?;
            tracing::debug!(sandbox = %sandbox, user = %user, "current user and groups");
        }

        let content = exec_output(platform, sandbox, &commands::read(&path)).await?;
        Ok(commands::written_content(content.raw()).to_string())
    }

    /// Log the region the platform placed the sandbox in. Never fails.
    async fn check_region<P: Platform + ?Sized>(&self, platform: &P, sandbox: &str) {
        let Some(expected) = self.config.region.as_deref() else {
            return;
        };
        match platform.get_sandbox(sandbox).await {
            Lookup::Found(sbx) => match sbx.region() {
                Some(actual) if actual == expected => {
                    tracing::info!(sandbox = %sandbox, region = %actual, "region verified");
                }
                actual => {
                    tracing::warn!(
                        sandbox = %sandbox,
                        expected = %expected,
                        actual = ?actual,
                        "region mismatch"
                    );
                }
            },
            Lookup::NotFound => {
                tracing::warn!(sandbox = %sandbox, "sandbox not visible right after creation");
            }
            Lookup::Transient(error) => {
                tracing::warn!(sandbox = %sandbox, error = %error, "region check skipped");
            }
        }
    }
}

/// Run a blocking command.
async fn exec_output<P: Platform + ?Sized>(
    platform: &P,
    sandbox: &str,
    command: &str,
) -> Result<ExecOutput> {
    let output = platform
        .exec(sandbox, ExecRequest::blocking(command))
        .await
        .with_context(|| format!("command failed in {sandbox}: {command}"))?;
    if let Some(code) = output.exit_code().filter(|c| *c != 0) {
        tracing::debug!(
            sandbox = %sandbox,
            command = %command,
            exit_code = code,
            status = ?output.status(),
            "non-zero exit"
        );
    }
    Ok(output)
}

/// Run a blocking command and return its trimmed output.
async fn exec<P: Platform + ?Sized>(platform: &P, sandbox: &str, command: &str) -> Result<String> {
    Ok(exec_output(platform, sandbox, command).await?.text())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}
