//! In-memory platform used by tests.
//!
//! Volumes hold files keyed by path relative to the mount point, so a file
//! written through one sandbox is visible through any other sandbox that
//! mounts the same volume, at whatever path. Deleted sandboxes linger for a
//! configurable number of lookups before disappearing. Writes go through
//! `printf '%s\n'`, so stored content is the unquoted argument verbatim.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;

use super::error::SandboxError;
use super::output::{ExecOutput, ProcessResponse};
use super::provider::{SandboxProvider, VolumeProvider};
use super::types::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateVolume(String),
    DeleteVolume(String),
    CreateSandbox(String),
    GetSandbox(String),
    DeleteSandbox(String),
    Exec(String, String),
}

#[derive(Debug)]
struct FakeSandbox {
    sandbox: Sandbox,
    /// `Some(n)`: delete accepted, still visible for `n` more lookups.
    deleting: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    volumes: HashMap<String, HashMap<String, String>>,
    sandboxes: HashMap<String, FakeSandbox>,
    calls: Vec<Call>,
    transient_gets: usize,
}

#[derive(Debug, Default)]
pub struct FakePlatform {
    state: StdMutex<State>,
    deletion_lag: usize,
    stuck: HashSet<String>,
    fail_create_volume: bool,
    fail_delete: HashSet<String>,
    fail_exec_containing: Option<String>,
    panic_exec_containing: Option<String>,
    wipe_volumes_on_delete: bool,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deleted sandboxes keep answering lookups for `lag` more times.
    pub fn with_deletion_lag(mut self, lag: usize) -> Self {
        self.deletion_lag = lag;
        self
    }

    /// The named sandbox never disappears after delete.
    pub fn with_stuck_deletion(mut self, name: &str) -> Self {
        self.stuck.insert(name.to_string());
        self
    }

    pub fn with_failing_volume_create(mut self) -> Self {
        self.fail_create_volume = true;
        self
    }

    /// Delete of the named sandbox or volume fails with a backend error.
    pub fn with_failing_delete(mut self, name: &str) -> Self {
        self.fail_delete.insert(name.to_string());
        self
    }

    pub fn with_failing_exec(mut self, needle: &str) -> Self {
        self.fail_exec_containing = Some(needle.to_string());
        self
    }

    pub fn with_panicking_exec(mut self, needle: &str) -> Self {
        self.panic_exec_containing = Some(needle.to_string());
        self
    }

    /// Volumes lose their content when any sandbox mounting them is deleted.
    pub fn with_volatile_volumes(mut self) -> Self {
        self.wipe_volumes_on_delete = true;
        self
    }

    /// The next `n` lookups fail transiently.
    pub fn with_transient_gets(self, n: usize) -> Self {
        self.state.lock().unwrap().transient_gets = n;
        self
    }

    /// Seed a sandbox that the platform already knows about.
    pub fn with_existing_sandbox(self, name: &str) -> Self {
        self.state.lock().unwrap().sandboxes.insert(
            name.to_string(),
            FakeSandbox {
                sandbox: Sandbox {
                    metadata: Metadata::named(name),
                    ..Default::default()
                },
                deleting: None,
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls().iter().filter(|c| *c == call).count()
    }

    pub fn sandbox_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().sandboxes.contains_key(name)
    }

    pub fn volume_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().volumes.contains_key(name)
    }
}

fn record(state: &mut State, call: Call) {
    state.calls.push(call);
}

/// Resolve an absolute path to `(volume, relative path)` through the
/// sandbox's bindings, preferring the longest matching mount path.
fn resolve(sandbox: &Sandbox, path: &str) -> Option<(String, String)> {
    sandbox
        .spec
        .volumes
        .iter()
        .filter_map(|b| {
            let mount = b.mount_path.trim_end_matches('/');
            let rest = path.strip_prefix(mount)?;
            if !rest.is_empty() && !rest.starts_with('/') {
                return None;
            }
            Some((mount.len(), b.name.clone(), rest.trim_start_matches('/').to_string()))
        })
        .max_by_key(|(len, _, _)| *len)
        .map(|(_, vol, rel)| (vol, rel))
}

/// Undo `sh` single-quoting: a run of `'...'` segments joined by `\'`.
fn unquote(word: &str) -> Option<String> {
    let mut out = String::new();
    let mut rest = word;
    while !rest.is_empty() {
        if let Some(tail) = rest.strip_prefix("\\'") {
            out.push('\'');
            rest = tail;
        } else {
            let body = rest.strip_prefix('\'')?;
            let end = body.find('\'')?;
            out.push_str(&body[..end]);
            rest = &body[end + 1..];
        }
    }
    Some(out)
}

fn run_command(state: &mut State, sandbox: &Sandbox, command: &str) -> String {
    if let Some(rest) = command.strip_prefix("printf '%s\\n' ") {
        if let Some(idx) = rest.rfind(" > ") {
            let path = &rest[idx + 3..];
            let Some(content) = unquote(&rest[..idx]) else {
                return "sh: syntax error: unterminated quoted string".into();
            };
            if let Some((vol, rel)) = resolve(sandbox, path) {
                if let Some(files) = state.volumes.get_mut(&vol) {
                    files.insert(rel, format!("{content}\n"));
                    return String::new();
                }
            }
            return format!("sh: can't create {path}: Read-only file system");
        }
    }

    let read = |path: &str| -> Option<String> {
        let (vol, rel) = resolve(sandbox, path)?;
        state.volumes.get(&vol)?.get(&rel).cloned()
    };

    if let Some(path) = command.strip_prefix("cat ") {
        return read(path)
            .unwrap_or_else(|| format!("cat: can't open '{path}': No such file or directory"));
    }

    if let Some(rest) = command.strip_prefix("test -f ") {
        let path = rest.split_whitespace().next().unwrap_or_default();
        return if read(path).is_some() {
            "File exists".into()
        } else {
            "File does not exist".into()
        };
    }

    if let Some(rest) = command.strip_prefix("ls -la ") {
        let path = rest.split_whitespace().next().unwrap_or_default();
        if path.ends_with('/') {
            let Some((vol, _)) = resolve(sandbox, path) else {
                return format!("ls: {path}: No such file or directory");
            };
            let mut names: Vec<String> = state
                .volumes
                .get(&vol)
                .map(|files| files.keys().cloned().collect())
                .unwrap_or_default();
            names.sort();
            let mut lines = vec!["total 0".to_string()];
            lines.extend(names.iter().map(|n| format!("-rw-r--r-- 1 root root {n}")));
            return lines.join("\n");
        }
        return match read(path) {
            Some(content) => format!("-rw-r--r-- 1 root root {} {path}", content.len()),
            None => "Cannot access file".into(),
        };
    }

    if let Some(rest) = command.strip_prefix("mount | grep ") {
        return sandbox
            .spec
            .volumes
            .iter()
            .filter(|b| b.mount_path.contains(rest))
            .map(|b| format!("{} on {} type ext4 (rw)", b.name, b.mount_path))
            .collect::<Vec<_>>()
            .join("\n");
    }

    if command == "whoami && groups" {
        return "root\nroot".into();
    }

    String::new()
}

#[async_trait]
impl VolumeProvider for FakePlatform {
    async fn create_volume(&self, req: &VolumeCreateRequest) -> Result<Volume, SandboxError> {
        let mut state = self.state.lock().unwrap();
        record(&mut state, Call::CreateVolume(req.name().to_string()));
        if self.fail_create_volume {
            return Err(SandboxError::Provision("volume quota exceeded".into()));
        }
        if state.volumes.contains_key(req.name()) {
            return Err(SandboxError::Provision(format!(
                "volume {} already exists",
                req.name()
            )));
        }
        state.volumes.insert(req.name().to_string(), HashMap::new());
        Ok(Volume {
            metadata: req.metadata.clone(),
            spec: req.spec.clone(),
            status: Some("READY".into()),
        })
    }

    async fn delete_volume(&self, name: &str) -> Result<(), SandboxError> {
        let mut state = self.state.lock().unwrap();
        record(&mut state, Call::DeleteVolume(name.to_string()));
        if self.fail_delete.contains(name) {
            return Err(SandboxError::Backend(format!("volume delete returned 500: {name}")));
        }
        match state.volumes.remove(name) {
            Some(_) => Ok(()),
            None => Err(SandboxError::NotFound(format!("volume {name}"))),
        }
    }
}

#[async_trait]
impl SandboxProvider for FakePlatform {
    async fn create_sandbox(&self, req: &SandboxCreateRequest) -> Result<Sandbox, SandboxError> {
        let mut state = self.state.lock().unwrap();
        record(&mut state, Call::CreateSandbox(req.name().to_string()));
        if state.sandboxes.contains_key(req.name()) {
            return Err(SandboxError::Provision(format!(
                "sandbox {} already exists",
                req.name()
            )));
        }
        for binding in &req.spec.volumes {
            if !state.volumes.contains_key(&binding.name) {
                return Err(SandboxError::Provision(format!(
                    "volume {} not found",
                    binding.name
                )));
            }
        }
        let sandbox = Sandbox {
            metadata: req.metadata.clone(),
            spec: req.spec.clone(),
            status: Some("DEPLOYED".into()),
        };
        state.sandboxes.insert(
            req.name().to_string(),
            FakeSandbox {
                sandbox: sandbox.clone(),
                deleting: None,
            },
        );
        Ok(sandbox)
    }

    async fn get_sandbox(&self, name: &str) -> Lookup<Sandbox> {
        let mut state = self.state.lock().unwrap();
        record(&mut state, Call::GetSandbox(name.to_string()));
        if state.transient_gets > 0 {
            state.transient_gets -= 1;
            return Lookup::Transient("sandbox get returned 503 Service Unavailable".into());
        }
        let stuck = self.stuck.contains(name);
        let Some(entry) = state.sandboxes.get_mut(name) else {
            return Lookup::NotFound;
        };
        let deleting = entry.deleting;
        match deleting {
            None => Lookup::Found(entry.sandbox.clone()),
            Some(_) if stuck => Lookup::Found(entry.sandbox.clone()),
            Some(0) => {
                state.sandboxes.remove(name);
                Lookup::NotFound
            }
            Some(n) => {
                entry.deleting = Some(n - 1);
                Lookup::Found(entry.sandbox.clone())
            }
        }
    }

    async fn delete_sandbox(&self, name: &str) -> Result<(), SandboxError> {
        let mut state = self.state.lock().unwrap();
        record(&mut state, Call::DeleteSandbox(name.to_string()));
        if self.fail_delete.contains(name) {
            return Err(SandboxError::Backend(format!("sandbox delete returned 500: {name}")));
        }
        let lag = self.deletion_lag;
        let mounted: Vec<String> = match state.sandboxes.get_mut(name) {
            Some(entry) if entry.deleting.is_none() => {
                entry.deleting = Some(lag);
                entry.sandbox.spec.volumes.iter().map(|b| b.name.clone()).collect()
            }
            Some(_) => Vec::new(),
            None => return Err(SandboxError::NotFound(format!("sandbox {name}"))),
        };
        if self.wipe_volumes_on_delete {
            for vol in mounted {
                if let Some(files) = state.volumes.get_mut(&vol) {
                    files.clear();
                }
            }
        }
        Ok(())
    }

    async fn exec(&self, sandbox: &str, req: ExecRequest) -> Result<ExecOutput, SandboxError> {
        if let Some(needle) = &self.panic_exec_containing {
            if req.command.contains(needle.as_str()) {
                panic!("exec transport crashed on {needle}");
            }
        }
        let mut state = self.state.lock().unwrap();
        record(&mut state, Call::Exec(sandbox.to_string(), req.command.clone()));
        if let Some(needle) = &self.fail_exec_containing {
            if req.command.contains(needle.as_str()) {
                return Err(SandboxError::Exec(format!("process exec returned 502: {needle}")));
            }
        }
        let target = match state.sandboxes.get(sandbox) {
            Some(entry) if entry.deleting.is_none() => entry.sandbox.clone(),
            _ => return Err(SandboxError::NotFound(format!("sandbox {sandbox}"))),
        };
        let logs = run_command(&mut state, &target, &req.command);
        Ok(ExecOutput::Structured(ProcessResponse {
            logs: Some(logs),
            exit_code: Some(0),
            status: Some("completed".into()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unquote_reverses_shell_quoting() {
        assert_eq!(unquote("'plain'").as_deref(), Some("plain"));
        assert_eq!(unquote(r"'it'\''s'").as_deref(), Some("it's"));
        assert_eq!(unquote(r"'-n C:\new'").as_deref(), Some(r"-n C:\new"));
        assert_eq!(unquote("'open"), None);
    }
}
