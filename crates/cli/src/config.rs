use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CliConfig {
    /// Version the store is migrated to.
    #[serde(default = "default_current_version")]
    pub current_version: String,
    pub store_path: PathBuf,
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub host: HostConfig,
    pub logging: LoggingConfig,
}

fn default_current_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ResourcesConfig {
    pub tmp_base: Option<PathBuf>,
    pub fonts_source: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HostConfig {
    #[serde(default = "true_default")]
    pub dependencies_supported: bool,
    #[serde(default)]
    pub plugin_path: String,
    #[serde(default)]
    pub abspath: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub pretty_links: bool,
    /// Country code → (state code → state name).
    #[serde(default)]
    pub regions: BTreeMap<String, BTreeMap<String, String>>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            dependencies_supported: true,
            plugin_path: String::new(),
            abspath: None,
            currency: None,
            pretty_links: false,
            regions: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
    pub format: LoggingFormatConfig,
    pub levels: LoggingLevelsConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingFormatConfig {
    pub show_time: bool,
    pub show_file: bool,
    pub show_line: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingLevelsConfig {
    pub debug: bool,
    pub info: bool,
    pub warning: bool,
    pub error: bool,
    pub critical: bool,
}

impl LoggingLevelsConfig {
    /// The most verbose enabled level as an `EnvFilter` directive.
    pub fn directive(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.info {
            "info"
        } else if self.warning {
            "warn"
        } else if self.error || self.critical {
            "error"
        } else {
            "off"
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct RedactionConfig {
    #[serde(default = "true_default")]
    pub enabled: bool,
    #[serde(default)]
    pub patterns: Vec<RedactionPattern>,
}

fn true_default() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RedactionPattern {
    pub name: String,
    pub regex: String,
    pub placeholder: String,
}

/// `name` next to the CLI manifest when present, else relative to the
/// working directory (running from the workspace root).
fn locate(base_path: &Path, name: &str) -> PathBuf {
    if base_path.join(name).exists() {
        base_path.join(name)
    } else {
        Path::new("crates").join("cli").join(name)
    }
}

/// Load the layered configuration. `extra` is an operator-supplied file
/// applied after the shipped and local files but before the environment.
pub fn load_config(extra: Option<&Path>) -> Result<CliConfig, ConfigError> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let base_path = Path::new(&manifest_dir);

    let mut builder = Config::builder()
        // Shipped defaults (mandatory)
        .add_source(File::from(locate(base_path, "settingsctl.yaml")).required(true))
        .add_source(File::from(locate(base_path, "production.yaml")).required(false))
        // Local override
        .add_source(File::from(locate(base_path, ".settingsctl.yaml")).required(false));

    if let Some(path) = extra {
        builder = builder.add_source(File::from(path).required(true));
    }

    // Nested env vars like SETTINGSCTL__HOST__CURRENCY=INR
    builder
        .add_source(Environment::with_prefix("SETTINGSCTL").separator("__"))
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    struct EnvGuard(&'static str);

    impl EnvGuard {
        fn new(key: &'static str, val: &str) -> Self {
            env::set_var(key, val);
            Self(key)
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            env::remove_var(self.0);
        }
    }

    #[test]
    #[serial]
    fn test_load_config() {
        let config = load_config(None);
        assert!(config.is_ok(), "Failed to load config: {:?}", config.err());

        let config = config.unwrap();
        assert_eq!(config.store_path, PathBuf::from("settings.json"));
        assert!(config.host.dependencies_supported);
        assert!(config.logging.redaction.enabled);
    }

    #[test]
    #[serial]
    fn test_current_version_defaults_to_package_version() {
        let config = load_config(None).unwrap();
        assert_eq!(config.current_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    #[serial]
    fn test_env_var_override_precedence() {
        let _guard = EnvGuard::new("SETTINGSCTL__HOST__CURRENCY", "INR");
        let config = load_config(None).expect("Should load config");
        assert_eq!(config.host.currency.as_deref(), Some("INR"));
    }

    #[test]
    #[serial]
    fn test_type_coercion_boolean() {
        let _guard = EnvGuard::new("SETTINGSCTL__HOST__PRETTY_LINKS", "true");
        let config = load_config(None).unwrap();
        assert!(config.host.pretty_links);
    }

    #[test]
    #[serial]
    fn test_extra_file_overrides_defaults() {
        let path = env::temp_dir().join(format!("settingsctl_test_{}.yaml", std::process::id()));
        std::fs::write(&path, "store_path: /srv/shop/settings.json\ncurrent_version: \"3.0.0\"\n").unwrap();
        let config = load_config(Some(&path));
        std::fs::remove_file(&path).unwrap();

        let config = config.unwrap();
        assert_eq!(config.store_path, PathBuf::from("/srv/shop/settings.json"));
        assert_eq!(config.current_version, "3.0.0");
    }

    #[test]
    fn test_level_directive_picks_most_verbose() {
        let levels = LoggingLevelsConfig {
            debug: false,
            info: true,
            warning: true,
            error: true,
            critical: true,
        };
        assert_eq!(levels.directive(), "info");
        let quiet = LoggingLevelsConfig {
            debug: false,
            info: false,
            warning: false,
            error: false,
            critical: false,
        };
        assert_eq!(quiet.directive(), "off");
    }
}
