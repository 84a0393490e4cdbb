use serde::{Deserialize, Serialize};

// ── Metadata ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Metadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
        }
    }
}

// ── Volumes ─────────────────────────────────────────────────────────

/// Volume specification. `size` is in MB.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Resource the volume is attached to, e.g. "sandbox:first-sandbox".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeCreateRequest {
    pub metadata: Metadata,
    pub spec: VolumeSpec,
}

impl VolumeCreateRequest {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, size_mb: u32) -> Self {
        Self {
            metadata: Metadata {
                name: name.into(),
                display_name: Some(display_name.into()),
            },
            spec: VolumeSpec {
                size: Some(size_mb),
                ..Default::default()
            },
        }
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.spec.region = region;
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Volume {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: VolumeSpec,
    #[serde(default)]
    pub status: Option<String>,
}

// ── Sandboxes ───────────────────────────────────────────────────────

/// How a volume is exposed inside a sandbox's filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeBinding {
    pub name: String,
    pub mount_path: String,
    #[serde(default)]
    pub read_only: bool,
}

impl VolumeBinding {
    pub fn writable(volume: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            name: volume.into(),
            mount_path: mount_path.into(),
            read_only: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Runtime {
    #[serde(default)]
    pub image: String,
    /// Memory in MB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct SandboxSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxCreateRequest {
    pub metadata: Metadata,
    pub spec: SandboxSpec,
}

impl SandboxCreateRequest {
    pub fn new(name: impl Into<String>, image: impl Into<String>, memory_mb: u32) -> Self {
        Self {
            metadata: Metadata::named(name),
            spec: SandboxSpec {
                region: None,
                runtime: Runtime {
                    image: image.into(),
                    memory: Some(memory_mb),
                },
                volumes: Vec::new(),
            },
        }
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.spec.region = region;
        self
    }

    pub fn with_volume(mut self, binding: VolumeBinding) -> Self {
        self.spec.volumes.push(binding);
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Sandbox {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: SandboxSpec,
    #[serde(default)]
    pub status: Option<String>,
}

impl Sandbox {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn region(&self) -> Option<&str> {
        self.spec.region.as_deref()
    }
}

// ── Lookup ──────────────────────────────────────────────────────────

/// Outcome of looking a resource up by name.
///
/// `Transient` covers everything that is neither a definite hit nor a
/// definite 404: transport errors, 5xx, unparseable bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    Transient(String),
}

// ── Exec ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecRequest {
    pub command: String,
    pub wait_for_completion: bool,
}

impl ExecRequest {
    /// A command that blocks until the process exits.
    pub fn blocking(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            wait_for_completion: true,
        }
    }
}
