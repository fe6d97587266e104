//! Application configuration loaded from `config.json`
//!
//! Every field has a default so a missing or unreadable file degrades to a
//! usable (if credential-less) configuration instead of aborting startup.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Username for the shop login form
    #[serde(default)]
    pub user_name: String,
    /// Password for the shop login form
    #[serde(default)]
    pub password: String,
    /// Authenticated storefront, serves login and per-SKU stock pages
    #[serde(default = "default_shop_url")]
    pub shop_url: String,
    /// Public catalog, serves the search grid with brand and prices
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Pre-shared Basic token expected on `/api/*` requests
    #[serde(default)]
    pub api_token: String,
    /// Listen address for the HTTP API
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Path to the discount-ratio file, re-read on every batch
    #[serde(default = "default_discount_path")]
    pub discount_config_path: String,
}

fn default_shop_url() -> String {
    "https://shop.ktw.co.th".to_string()
}

fn default_base_url() -> String {
    "https://ktw.co.th".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_discount_path() -> String {
    "xconfig.json".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_name: String::new(),
            password: String::new(),
            shop_url: default_shop_url(),
            base_url: default_base_url(),
            api_token: String::new(),
            bind_addr: default_bind_addr(),
            discount_config_path: default_discount_path(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from the given path, falling back to defaults if
    /// the file is missing or malformed.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    error!("Failed to parse config {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = AppConfig::load("does-not-exist.json");
        assert_eq!(config.shop_url, "https://shop.ktw.co.th");
        assert_eq!(config.base_url, "https://ktw.co.th");
        assert!(config.user_name.is_empty());
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_fields() {
        let config: AppConfig =
            serde_json::from_str(r#"{"user_name":"shop_manager1","password":"secret"}"#).unwrap();
        assert_eq!(config.user_name, "shop_manager1");
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.discount_config_path, "xconfig.json");
    }
}
