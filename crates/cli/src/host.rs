//! Host callbacks for a store migrated outside its host application.

use crate::config::HostConfig;
use migration_engine::traits::{HostHooks, StoreResult};
use std::collections::BTreeMap;

/// Answers host queries from configuration. Side-effecting callbacks have
/// no host to reach, so they are logged for the operator to follow up.
pub struct ConfigHooks {
    config: HostConfig,
}

impl ConfigHooks {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }
}

impl HostHooks for ConfigHooks {
    fn dependencies_supported(&self) -> bool {
        self.config.dependencies_supported
    }

    fn plugin_path(&self) -> String {
        self.config.plugin_path.clone()
    }

    fn abspath(&self) -> Option<String> {
        self.config.abspath.clone()
    }

    fn shop_currency(&self) -> Option<String> {
        self.config.currency.clone()
    }

    fn pretty_links_enabled(&self) -> bool {
        self.config.pretty_links
    }

    fn states(&self, country: &str) -> Option<BTreeMap<String, String>> {
        self.config
            .regions
            .iter()
            .find(|(code, _)| code.eq_ignore_ascii_case(country))
            .map(|(_, states)| {
                states
                    .iter()
                    .map(|(code, name)| (code.to_uppercase(), name.clone()))
                    .collect()
            })
    }

    fn migrate_template_paths(&self) -> StoreResult<()> {
        tracing::info!("host action required: migrate template paths to template ids");
        Ok(())
    }

    fn schedule_yearly_reset_numbers(&self) -> StoreResult<()> {
        tracing::info!("host action required: schedule the yearly number reset");
        Ok(())
    }

    fn notify_new_install(&self) -> StoreResult<()> {
        tracing::info!("new install");
        Ok(())
    }

    fn request_rewrite_flush(&self) -> StoreResult<()> {
        tracing::info!("host action required: flush rewrite rules");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_lookup_ignores_case() {
        let mut config = HostConfig::default();
        config.regions.insert(
            "us".into(),
            BTreeMap::from([("ny".to_string(), "New York".to_string())]),
        );
        let hooks = ConfigHooks::new(config);

        let states = hooks.states("US").unwrap();
        assert_eq!(states.get("NY").map(String::as_str), Some("New York"));
        assert!(hooks.states("CA").is_none());
    }

    #[test]
    fn test_defaults_from_config() {
        let hooks = ConfigHooks::new(HostConfig::default());
        assert!(hooks.dependencies_supported());
        assert!(!hooks.pretty_links_enabled());
        assert_eq!(hooks.document_slugs(), vec!["invoice", "packing-slip"]);
    }
}
