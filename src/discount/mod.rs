//! Brand-based discount normalization
//!
//! Prices come off the page as localized strings ("฿1,250.00"). The
//! normalizer strips currency markup, applies a per-brand ratio from
//! `xconfig.json`, and hands back a string again: a clean decimal when the
//! discount was computed, the untouched input when it could not be parsed.
//! Keeping the string-in/string-out shape lets callers tell the two cases
//! apart without a separate error channel.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info, warn};

/// Discount ratios, re-read from disk at the start of every batch
#[derive(Debug, Clone, Deserialize)]
pub struct DiscountConfig {
    /// Brand (lower-cased) to ratio; brands not listed use the default
    #[serde(rename = "SP_BRAND_DC_RATIO")]
    pub brand_ratios: Option<HashMap<String, f64>>,
    /// Ratio applied to any brand missing from the map
    #[serde(rename = "OTHER_BRAND_DC_RATIO")]
    pub default_ratio: Option<f64>,
}

impl DiscountConfig {
    /// No-discount configuration used when the file cannot be read
    pub fn permissive() -> Self {
        Self {
            brand_ratios: Some(HashMap::new()),
            default_ratio: Some(1.0),
        }
    }

    /// Reads the ratio file, degrading to [`DiscountConfig::permissive`] on
    /// any read or parse failure. The batch proceeds either way.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path).map_err(anyhow::Error::from).and_then(|raw| {
            serde_json::from_str::<Self>(&raw).map_err(anyhow::Error::from)
        }) {
            Ok(config) => {
                info!("Loaded discount config from {}", path.display());
                config
            }
            Err(e) => {
                error!("Failed to load discount config {}: {}", path.display(), e);
                Self::permissive()
            }
        }
    }
}

/// Applies the brand discount to a raw scraped price string.
///
/// Empty input yields `"0.0"`; unparsable input is echoed back unmodified;
/// a missing config section skips discounting entirely.
pub fn apply_discount(raw_price: &str, brand: &str, config: &DiscountConfig) -> String {
    if raw_price.is_empty() {
        warn!("Invalid price value: {:?}", raw_price);
        return "0.0".to_string();
    }

    let cleaned = raw_price
        .replace('฿', "")
        .replace("THB", "")
        .replace(',', "");
    let Ok(price) = cleaned.trim().parse::<f64>() else {
        error!("Could not parse price '{}', passing through", raw_price);
        return raw_price.to_string();
    };

    let normalized_brand = {
        let trimmed = brand.trim().to_lowercase();
        if trimmed.is_empty() {
            "unknown".to_string()
        } else {
            trimmed
        }
    };

    let (Some(brand_ratios), Some(default_ratio)) =
        (config.brand_ratios.as_ref(), config.default_ratio)
    else {
        warn!("Missing required config keys: SP_BRAND_DC_RATIO or OTHER_BRAND_DC_RATIO");
        return format_price(price);
    };

    let ratio = brand_ratios
        .get(&normalized_brand)
        .copied()
        .unwrap_or(default_ratio);
    let discounted = (price * ratio * 100.0).round() / 100.0;
    format_price(discounted)
}

/// Formats a price the way the API has always emitted it: shortest decimal
/// form with at least one fractional digit ("900.0", "111.11").
fn format_price(value: f64) -> String {
    let repr = value.to_string();
    if repr.contains('.') {
        repr
    } else {
        format!("{repr}.0")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(brands: &[(&str, f64)], default_ratio: f64) -> DiscountConfig {
        DiscountConfig {
            brand_ratios: Some(
                brands
                    .iter()
                    .map(|(b, r)| (b.to_string(), *r))
                    .collect(),
            ),
            default_ratio: Some(default_ratio),
        }
    }

    #[test]
    fn discounts_localized_price_for_known_brand() {
        let cfg = config(&[("acme", 0.9)], 1.0);
        assert_eq!(apply_discount("฿1,000.00", "Acme", &cfg), "900.0");
    }

    #[test]
    fn unknown_brand_uses_default_ratio() {
        let cfg = config(&[("acme", 0.9)], 0.95);
        assert_eq!(apply_discount("100", "Unknown", &cfg), "95.0");
    }

    #[test]
    fn empty_brand_is_treated_as_unknown() {
        let cfg = config(&[("unknown", 0.5)], 1.0);
        assert_eq!(apply_discount("200", "", &cfg), "100.0");
    }

    #[test]
    fn unparsable_price_passes_through_unchanged() {
        let cfg = config(&[("acme", 0.9)], 1.0);
        assert_eq!(apply_discount("N/A", "Acme", &cfg), "N/A");
    }

    #[test]
    fn empty_price_yields_zero() {
        let cfg = config(&[], 1.0);
        assert_eq!(apply_discount("", "Acme", &cfg), "0.0");
    }

    #[test]
    fn missing_config_section_skips_discount() {
        let cfg = DiscountConfig {
            brand_ratios: None,
            default_ratio: Some(0.5),
        };
        assert_eq!(apply_discount("THB 1,500.50", "Acme", &cfg), "1500.5");
    }

    #[test]
    fn rounds_to_two_decimals() {
        let cfg = config(&[("acme", 0.333)], 1.0);
        assert_eq!(apply_discount("100", "acme", &cfg), "33.3");
        let cfg = config(&[("acme", 0.3333)], 1.0);
        assert_eq!(apply_discount("100", "acme", &cfg), "33.33");
    }

    #[test]
    fn permissive_config_applies_no_discount() {
        let cfg = DiscountConfig::permissive();
        assert_eq!(apply_discount("฿750.00", "Anybrand", &cfg), "750.0");
    }

    #[test]
    fn unreadable_file_degrades_to_permissive() {
        let cfg = DiscountConfig::load_or_default("no-such-xconfig.json");
        assert_eq!(cfg.default_ratio, Some(1.0));
        assert!(cfg.brand_ratios.as_ref().is_some_and(HashMap::is_empty));
    }
}
