use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::gateway::ExistingContainer;
use crate::provider::{KeySpec, ProviderKind};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySettings {
    #[serde(default)]
    pub provider_kind: ProviderKind,
    #[serde(default)]
    pub key_spec: KeySpec,
    /// Route provider failures to the log. Off means they are dropped.
    #[serde(default = "default_true")]
    pub report_provider_errors: bool,
    #[serde(default)]
    pub existing_container: ExistingContainer,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            provider_kind: ProviderKind::default(),
            key_spec: KeySpec::default(),
            report_provider_errors: true,
            existing_container: ExistingContainer::default(),
        }
    }
}

/// Reads settings from `path`. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> anyhow::Result<GatewaySettings> {
    if !path.exists() {
        return Ok(GatewaySettings::default());
    }
    let bytes = fs::read(path).with_context(|| format!("read settings {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse settings {}", path.display()))
}

pub fn save_settings(path: &Path, settings: &GatewaySettings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(settings)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
