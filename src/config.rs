use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Address;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ConfigFormat {
    Auto,
    Toml,
    Yaml,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {format:?} config: {details}")]
    Parse {
        format: ConfigFormat,
        details: String,
    },
    #[error("configuration invalid: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub status: StatusSection,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct RegistrySection {
    /// Target contract; resolved from the ledger client when absent.
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default = "default_record_label")]
    pub record_label: String,
    #[serde(default)]
    pub secondary_public_value: u64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            contract_address: None,
            record_label: default_record_label(),
            secondary_public_value: 0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct StatusSection {
    #[serde(default = "default_success_dismiss_ms")]
    pub success_dismiss_ms: u64,
    #[serde(default = "default_error_dismiss_ms")]
    pub error_dismiss_ms: u64,
}

impl Default for StatusSection {
    fn default() -> Self {
        Self {
            success_dismiss_ms: default_success_dismiss_ms(),
            error_dismiss_ms: default_error_dismiss_ms(),
        }
    }
}

impl StatusSection {
    pub fn success_dismiss(&self) -> Duration {
        Duration::from_millis(self.success_dismiss_ms)
    }

    pub fn error_dismiss(&self) -> Duration {
        Duration::from_millis(self.error_dismiss_ms)
    }
}

fn default_record_label() -> String {
    "Drug Molecule Data".to_string()
}

const fn default_success_dismiss_ms() -> u64 {
    2_000
}

const fn default_error_dismiss_ms() -> u64 {
    3_000
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.record_label.trim().is_empty() {
            return Err(ConfigError::Validation("record label must not be empty".into()));
        }
        if let Some(address) = &self.registry.contract_address {
            if !address.is_well_formed() {
                return Err(ConfigError::Validation(format!(
                    "contract address {address} is not a 0x-prefixed 20-byte hex string"
                )));
            }
        }
        if self.status.success_dismiss_ms == 0 || self.status.error_dismiss_ms == 0 {
            return Err(ConfigError::Validation(
                "status dismiss delays must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn sample() -> Self {
        Self {
            registry: RegistrySection {
                contract_address: Some(Address::from("0x5fbdb2315678afecb367f032d93f642f64180aa3")),
                ..RegistrySection::default()
            },
            status: StatusSection::default(),
        }
    }
}

pub fn load_config(path: &Path, format: ConfigFormat) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let format = resolve_format(path, format);
    let config = parse_config(&contents, format)?;
    config.validate()?;
    Ok(config)
}

/// Parse `contents` in `format`. `Auto` accepts TOML first and falls back to
/// YAML, reporting both failures when neither fits.
pub fn parse_config(contents: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    match format {
        ConfigFormat::Toml => toml::from_str(contents).map_err(|err| ConfigError::Parse {
            format,
            details: err.to_string(),
        }),
        ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|err| ConfigError::Parse {
            format,
            details: err.to_string(),
        }),
        ConfigFormat::Auto => match toml::from_str::<Config>(contents) {
            Ok(config) => Ok(config),
            Err(toml_err) => serde_yaml::from_str(contents).map_err(|yaml_err| ConfigError::Parse {
                format,
                details: format!("not TOML ({toml_err}) and not YAML ({yaml_err})"),
            }),
        },
    }
}

/// Explicit formats win; otherwise the extension decides, and an unknown
/// extension is left to content sniffing.
fn resolve_format(path: &Path, format: ConfigFormat) -> ConfigFormat {
    if format != ConfigFormat::Auto {
        return format;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => ConfigFormat::Toml,
        Some("yaml" | "yml") => ConfigFormat::Yaml,
        _ => ConfigFormat::Auto,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.registry.record_label, "Drug Molecule Data");
        assert_eq!(config.registry.secondary_public_value, 0);
        assert_eq!(config.status.success_dismiss(), Duration::from_secs(2));
        assert_eq!(config.status.error_dismiss(), Duration::from_secs(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_malformed_contract_address() {
        let mut config = Config::sample();
        config.registry.contract_address = Some(Address::from("0x1234"));
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_zero_dismiss_delay() {
        let mut config = Config::sample();
        config.status.error_dismiss_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn parses_toml_config() {
        let contents = r#"
            [registry]
            contract-address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
            record-label = "Kinase inhibitors"

            [status]
            success-dismiss-ms = 1500
        "#;
        let config = parse_config(contents, ConfigFormat::Toml).unwrap();
        assert_eq!(config.registry.record_label, "Kinase inhibitors");
        assert_eq!(config.status.success_dismiss_ms, 1_500);
        assert_eq!(config.status.error_dismiss_ms, 3_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_yaml_config() {
        let contents = r#"
            registry:
              secondary-public-value: 7
            status:
              error-dismiss-ms: 4000
        "#;
        let config = parse_config(contents, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.registry.secondary_public_value, 7);
        assert_eq!(config.registry.contract_address, None);
        assert_eq!(config.status.error_dismiss_ms, 4_000);
    }

    #[test]
    fn resolves_format_from_extension() {
        assert_eq!(resolve_format(Path::new("a.yml"), ConfigFormat::Auto), ConfigFormat::Yaml);
        assert_eq!(resolve_format(Path::new("a.conf"), ConfigFormat::Auto), ConfigFormat::Auto);
        assert_eq!(resolve_format(Path::new("a.toml"), ConfigFormat::Yaml), ConfigFormat::Yaml);
    }

    #[test]
    fn auto_format_sniffs_content() {
        let toml = "[status]\nerror-dismiss-ms = 5000\n";
        assert_eq!(parse_config(toml, ConfigFormat::Auto).unwrap().status.error_dismiss_ms, 5_000);

        let yaml = "registry:\n  record-label: Antivirals\n";
        assert_eq!(parse_config(yaml, ConfigFormat::Auto).unwrap().registry.record_label, "Antivirals");

        let err = parse_config("[registry\n- nope: [", ConfigFormat::Auto).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { format: ConfigFormat::Auto, .. }));
    }
}
