//! Client configuration.
//!
//! Defaults target the hosted service. Hosts can deserialize a
//! `ClientConfig` from their own configuration files or read it from the
//! environment with [`ClientConfig::from_env`].

use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://crm.zoho.com/crm/private";

/// Name sent as the `assignTo` option when converting leads.
pub const DEFAULT_SERVICE_NAME: &str = "ZohoCRM";

pub const BASE_URL_VAR: &str = "CRM_BASE_URL";
pub const SERVICE_NAME_VAR: &str = "CRM_SERVICE_NAME";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix under which the `xml/` and `json/` endpoint trees live.
    pub base_url: String,
    pub service_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl ClientConfig {
    /// Read `CRM_BASE_URL` and `CRM_SERVICE_NAME`, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            base_url: lookup(BASE_URL_VAR)
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.base_url),
            service_name: lookup(SERVICE_NAME_VAR)
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.service_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_overrides_defaults() {
        let config = ClientConfig::from_lookup(|key| match key {
            BASE_URL_VAR => Some("http://localhost:3000/crm/private".to_string()),
            _ => None,
        });
        assert_eq!(config.base_url, "http://localhost:3000/crm/private");
        assert_eq!(config.service_name, DEFAULT_SERVICE_NAME);
    }

    #[test]
    fn empty_values_fall_back_to_defaults() {
        let config = ClientConfig::from_lookup(|_| Some(String::new()));
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: ClientConfig = serde_json::from_str(r#"{"service_name":"Acme"}"#).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.service_name, "Acme");
    }
}
