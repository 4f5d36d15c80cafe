use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FexConfig {
    /// Base URL of the field-execution backend.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    /// Agent identifier this device operates as.
    pub agent: String,
    /// Cap on best-effort location capture, in seconds.
    #[serde(default = "default_location_timeout_secs")]
    pub location_timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://localhost:8080".into()
}

fn default_location_timeout_secs() -> u64 {
    5
}

/// Load and parse a TOML config file.
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)?;
    let config: T = toml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fex_config() {
        let toml_str = r#"
backend_url = "https://sfa.example.com/api"
agent = "agent-17"
location_timeout_secs = 3
"#;
        let config: FexConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend_url, "https://sfa.example.com/api");
        assert_eq!(config.agent, "agent-17");
        assert_eq!(config.location_timeout_secs, 3);
    }

    #[test]
    fn fex_config_defaults() {
        let toml_str = r#"agent = "agent-17""#;
        let config: FexConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend_url, "http://localhost:8080");
        assert_eq!(config.location_timeout_secs, 5);
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, r#"agent = "agent-3""#).unwrap();
        let config: FexConfig = load_config(&path).unwrap();
        assert_eq!(config.agent, "agent-3");
    }
}
