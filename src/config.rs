use std::fmt;

use crate::sandbox::SandboxError;

/// Target platform environment, selected by `BL_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Prod,
    Dev,
}

/// Per-environment defaults. Update when new regions become available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentProfile {
    pub regions: &'static [&'static str],
    pub default_region: &'static str,
    pub image: &'static str,
    pub api_base_url: &'static str,
    pub run_base_url: &'static str,
}

const PROD: EnvironmentProfile = EnvironmentProfile {
    regions: &["us-west-2"],
    default_region: "us-west-2",
    image: "blaxel/prod-base:latest",
    api_base_url: "https://api.blaxel.ai/v0",
    run_base_url: "https://run.blaxel.ai",
};

const DEV: EnvironmentProfile = EnvironmentProfile {
    regions: &["eu-west-1"],
    default_region: "eu-west-1",
    image: "blaxel/dev-base:latest",
    api_base_url: "https://api.blaxel.dev/v0",
    run_base_url: "https://run.blaxel.dev",
};

impl Environment {
    /// Only `dev` selects the dev profile; anything else is prod.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("dev") => Environment::Dev,
            _ => Environment::Prod,
        }
    }

    pub fn profile(self) -> &'static EnvironmentProfile {
        match self {
            Environment::Prod => &PROD,
            Environment::Dev => &DEV,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Prod => write!(f, "prod"),
            Environment::Dev => write!(f, "dev"),
        }
    }
}

/// Connection settings for the platform client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub api_base_url: String,
    pub run_base_url: String,
    pub workspace: String,
    pub api_key: String,
}

/// Harness configuration loaded from environment variables.
pub struct Config {
    pub environment: Environment,
    pub api_base_url: String,
    pub run_base_url: String,
    pub workspace: Option<String>,
    pub api_key: Option<String>,
    pub region: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_raw_values(
            std::env::var("BL_ENV").ok().as_deref(),
            std::env::var("BL_API_URL").ok().as_deref(),
            std::env::var("BL_RUN_URL").ok().as_deref(),
            std::env::var("BL_WORKSPACE").ok().as_deref(),
            std::env::var("BL_API_KEY").ok().as_deref(),
            std::env::var("BL_REGION").ok().as_deref(),
        )
    }

    /// Build a Config from raw string values (as they would come from env vars).
    /// Used directly in tests to avoid mutating process-global environment.
    pub fn from_raw_values(
        environment: Option<&str>,
        api_base_url: Option<&str>,
        run_base_url: Option<&str>,
        workspace: Option<&str>,
        api_key: Option<&str>,
        region: Option<&str>,
    ) -> Self {
        let non_empty = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(String::from);

        let environment = Environment::parse(environment);
        let profile = environment.profile();

        Config {
            environment,
            api_base_url: non_empty(api_base_url)
                .unwrap_or_else(|| profile.api_base_url.to_string()),
            run_base_url: non_empty(run_base_url)
                .unwrap_or_else(|| profile.run_base_url.to_string()),
            workspace: non_empty(workspace),
            api_key: non_empty(api_key),
            region: non_empty(region).unwrap_or_else(|| profile.default_region.to_string()),
        }
    }

    pub fn image(&self) -> &'static str {
        self.environment.profile().image
    }

    /// Client settings, or a config error naming the first missing credential.
    pub fn platform(&self) -> Result<PlatformConfig, SandboxError> {
        let workspace = self
            .workspace
            .clone()
            .ok_or_else(|| SandboxError::Config("BL_WORKSPACE is not set".into()))?;
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| SandboxError::Config("BL_API_KEY is not set".into()))?;
        Ok(PlatformConfig {
            api_base_url: self.api_base_url.clone(),
            run_base_url: self.run_base_url.clone(),
            workspace,
            api_key,
        })
    }
}
