//! HTTP client for the sandbox platform API.
//!
//! Control plane (`BL_API_URL`): POST /volumes, DELETE /volumes/{name},
//! POST /sandboxes, GET /sandboxes/{name}, DELETE /sandboxes/{name}.
//! Data plane (`BL_RUN_URL`): POST /{workspace}/sandboxes/{name}/process.

use async_trait::async_trait;
use reqwest::RequestBuilder;

use crate::config::PlatformConfig;
use crate::sandbox::error::SandboxError;
use crate::sandbox::output::ExecOutput;
use crate::sandbox::provider::{SandboxProvider, VolumeProvider};
use crate::sandbox::types::*;

const API_KEY_HEADER: &str = "X-Blaxel-Api-Key";
const WORKSPACE_HEADER: &str = "X-Blaxel-Workspace";

/// HTTP client for the platform REST API.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    api_base_url: String,
    run_base_url: String,
    workspace: String,
    api_key: String,
    client: reqwest::Client,
}

impl PlatformClient {
    pub fn new(config: &PlatformConfig, client: reqwest::Client) -> Self {
        Self {
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            run_base_url: config.run_base_url.trim_end_matches('/').to_string(),
            workspace: config.workspace.clone(),
            api_key: config.api_key.clone(),
            client,
        }
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(API_KEY_HEADER, &self.api_key)
            .header(WORKSPACE_HEADER, &self.workspace)
    }

    fn sandbox_url(&self, name: &str) -> String {
        format!("{}/sandboxes/{}", self.api_base_url, name)
    }

    fn volume_url(&self, name: &str) -> String {
        format!("{}/volumes/{}", self.api_base_url, name)
    }

    fn process_url(&self, sandbox: &str) -> String {
        format!(
            "{}/{}/sandboxes/{}/process",
            self.run_base_url, self.workspace, sandbox
        )
    }
}

#[async_trait]
impl VolumeProvider for PlatformClient {
    async fn create_volume(&self, req: &VolumeCreateRequest) -> Result<Volume, SandboxError> {
        let url = format!("{}/volumes", self.api_base_url);

        tracing::info!(
            volume = %req.name(),
            size_mb = req.spec.size,
            "creating volume"
        );

        let resp = self
            .authed(self.client.post(&url))
            .json(req)
            .send()
            .await
            .map_err(|e| SandboxError::Provision(format!("volume create failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SandboxError::Provision(format!(
                "volume create returned {status}: {body}"
            )));
        }

        resp.json::<Volume>()
            .await
            .map_err(|e| SandboxError::Serde(format!("failed to parse volume response: {e}")))
    }

    async fn delete_volume(&self, name: &str) -> Result<(), SandboxError> {
        let url = self.volume_url(name);

        tracing::info!(volume = %name, "deleting volume");

        let resp = self
            .authed(self.client.delete(&url))
            .send()
            .await
            .map_err(|e| SandboxError::Backend(format!("volume delete failed: {e}")))?;

        if resp.status().as_u16() == 404 {
            return Err(SandboxError::NotFound(format!("volume {name}")));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SandboxError::Backend(format!(
                "volume delete returned {status}: {body}"
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl SandboxProvider for PlatformClient {
    async fn create_sandbox(&self, req: &SandboxCreateRequest) -> Result<Sandbox, SandboxError> {
        let url = format!("{}/sandboxes", self.api_base_url);

        tracing::info!(
            sandbox = %req.name(),
            image = %req.spec.runtime.image,
            volumes = req.spec.volumes.len(),
            "creating sandbox"
        );

        let resp = self
            .authed(self.client.post(&url))
            .json(req)
            .send()
            .await
            .map_err(|e| SandboxError::Provision(format!("sandbox create failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SandboxError::Provision(format!(
                "sandbox create returned {status}: {body}"
            )));
        }

        resp.json::<Sandbox>()
            .await
            .map_err(|e| SandboxError::Serde(format!("failed to parse sandbox response: {e}")))
    }

    async fn get_sandbox(&self, name: &str) -> Lookup<Sandbox> {
        let resp = match self.authed(self.client.get(self.sandbox_url(name))).send().await {
            Ok(resp) => resp,
            Err(e) => return Lookup::Transient(format!("sandbox get failed: {e}")),
        };

        if resp.status().as_u16() == 404 {
            return Lookup::NotFound;
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Lookup::Transient(format!("sandbox get returned {status}: {body}"));
        }

        let body = resp.text().await.unwrap_or_default();
        found_from_body(name, &body)
    }

    async fn delete_sandbox(&self, name: &str) -> Result<(), SandboxError> {
        tracing::info!(sandbox = %name, "deleting sandbox");

        let resp = self
            .authed(self.client.delete(self.sandbox_url(name)))
            .send()
            .await
            .map_err(|e| SandboxError::Backend(format!("sandbox delete failed: {e}")))?;

        if resp.status().as_u16() == 404 {
            return Err(SandboxError::NotFound(format!("sandbox {name}")));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SandboxError::Backend(format!(
                "sandbox delete returned {status}: {body}"
            )));
        }

        Ok(())
    }

    async fn exec(&self, sandbox: &str, req: ExecRequest) -> Result<ExecOutput, SandboxError> {
        tracing::debug!(sandbox = %sandbox, command = %req.command, "exec");

        let resp = self
            .authed(self.client.post(self.process_url(sandbox)))
            .json(&req)
            .send()
            .await
            .map_err(|e| SandboxError::Exec(format!("process exec failed: {e}")))?;

        if resp.status().as_u16() == 404 {
            return Err(SandboxError::NotFound(format!("sandbox {sandbox}")));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(SandboxError::Exec(format!(
                "process exec returned {status}: {body}"
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| SandboxError::Exec(format!("failed to read process output: {e}")))?;

        Ok(ExecOutput::from_body(&body))
    }
}

/// A successful lookup means the sandbox exists, even when its body is not
/// the shape we expect.
fn found_from_body(name: &str, body: &str) -> Lookup<Sandbox> {
    match serde_json::from_str::<Sandbox>(body) {
        Ok(sandbox) => Lookup::Found(sandbox),
        Err(e) => {
            tracing::error!(
                sandbox = %name,
                error = %e,
                "unreadable sandbox response, treating sandbox as present"
            );
            Lookup::Found(Sandbox {
                metadata: Metadata::named(name),
                ..Default::default()
            })
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
