use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "REASSESSD_CONFIG";
pub const EXPORT_DIR_ENV: &str = "REASSESSD_EXPORT_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Where `<page>.export` writes when the request names no directory.
    pub export_dir: PathBuf,
    /// Re-assessment fee per subject when the schedule has no entry.
    pub default_fee: f64,
    /// Subject name (case-insensitive) to fee.
    pub fee_schedule: BTreeMap<String, f64>,
    /// How long the UI keeps the payment confirmation on screen.
    pub payment_dismiss_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            export_dir: std::env::temp_dir().join("reassessd-exports"),
            default_fee: 100.0,
            fee_schedule: BTreeMap::new(),
            payment_dismiss_ms: 3000,
        }
    }
}

impl Config {
    /// Defaults, overlaid by the JSON file named in `REASSESSD_CONFIG`, then by
    /// `REASSESSD_EXPORT_DIR`.
    pub fn load() -> anyhow::Result<Config> {
        let mut cfg = match std::env::var_os(CONFIG_ENV) {
            Some(p) if !p.is_empty() => Config::from_path(Path::new(&p))?,
            _ => Config::default(),
        };
        if let Some(dir) = std::env::var_os(EXPORT_DIR_ENV).filter(|d| !d.is_empty()) {
            cfg.export_dir = PathBuf::from(dir);
        }
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.to_string_lossy()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("config {} is invalid JSON", path.to_string_lossy()))
    }

    pub fn fee_for(&self, subject: &str) -> f64 {
        let key = subject.trim();
        self.fee_schedule
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(key))
            .map(|(_, v)| *v)
            .unwrap_or(self.default_fee)
    }
}
