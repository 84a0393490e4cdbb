/// Names of the three resources one run creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub volume: String,
    pub first_sandbox: String,
    pub second_sandbox: String,
}

impl ResourceNames {
    /// The well-known names. Two concurrent runs with these collide.
    pub fn fixed() -> Self {
        Self {
            volume: "test-persistence-volume".into(),
            first_sandbox: "first-sandbox".into(),
            second_sandbox: "second-sandbox".into(),
        }
    }

    /// Fixed names with a per-run suffix appended.
    pub fn with_suffix(suffix: &str) -> Self {
        let fixed = Self::fixed();
        Self {
            volume: format!("{}-{suffix}", fixed.volume),
            first_sandbox: format!("{}-{suffix}", fixed.first_sandbox),
            second_sandbox: format!("{}-{suffix}", fixed.second_sandbox),
        }
    }

    pub fn unique() -> Self {
        Self::with_suffix(&unique_id())
    }
}

/// Unix seconds followed by five random lowercase alphanumerics.
pub fn unique_id() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}{}", chrono::Utc::now().timestamp(), &random[..5])
}
