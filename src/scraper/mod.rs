//! Concurrent per-SKU fetch orchestration
//!
//! One authenticated session is established before fan-out and shared
//! read-only by every task, so no task ever re-authenticates mid-batch.
//! Tasks run with bounded concurrency and collect in completion order; a
//! failed fetch degrades to a zero-valued record, so every requested SKU
//! comes back exactly once.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::{error, info};

use crate::discount::{self, DiscountConfig};
use crate::extract::{self, SearchInfo};
use crate::models::ProductRecord;
use crate::session::Session;

/// Seam between the HTTP route layer and the scraping pipeline.
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// Fetches all SKUs with bounded concurrency. An authentication failure
    /// fails the whole batch and yields an empty list.
    async fn fetch_all(&self, skus: &[String], max_concurrency: usize) -> Vec<ProductRecord>;

    /// Fetches a single SKU; `None` means the session could not be
    /// established.
    async fn fetch_one(&self, sku: &str) -> Option<ProductRecord>;

    /// Explicit login attempt, as triggered by `POST /login`.
    async fn login(&self) -> bool;
}

pub struct StockScraper {
    session: Arc<Session>,
    discount_config_path: PathBuf,
}

impl StockScraper {
    pub fn new(session: Arc<Session>, discount_config_path: impl Into<PathBuf>) -> Self {
        Self {
            session,
            discount_config_path: discount_config_path.into(),
        }
    }

    /// Fetches, extracts, and normalizes one SKU against an already-valid
    /// session. Transport and parse failures degrade at the smallest scope
    /// that can absorb them, so this never fails outright.
    pub async fn check_stock(&self, sku: &str, discount: &DiscountConfig) -> ProductRecord {
        let product_url = format!("{}/ktw/th/THB/p/{}", self.session.shop_url(), sku);
        info!("Checking stock for SKU: {}", sku);

        let html = match self.session.get(&product_url).await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(html) => html,
                Err(e) => {
                    error!("Failed to read product page for SKU {}: {}", sku, e);
                    return ProductRecord::unavailable(sku);
                }
            },
            Ok(response) => {
                error!(
                    "Failed to get product page for SKU {}: {}",
                    sku,
                    response.status()
                );
                return ProductRecord::unavailable(sku);
            }
            Err(e) => {
                error!("Failed to get product page for SKU {}: {}", sku, e);
                return ProductRecord::unavailable(sku);
            }
        };

        let stock_quantity = extract::stock_quantity(&html);
        let info = self.search_info(sku).await;
        let sale_price = discount::apply_discount(&info.sale_price, &info.brand, discount);

        ProductRecord::new(sku, info.brand, stock_quantity, sale_price, info.regular_price)
    }

    /// Brand and prices from the public search grid; failures degrade to
    /// empty fields rather than touching the rest of the record.
    async fn search_info(&self, sku: &str) -> SearchInfo {
        let search_url = format!(
            "{}/search/?searchType=All&viewType=grid&text={}",
            self.session.base_url(),
            urlencoding::encode(sku)
        );
        info!("Fetching product data for SKU {} from search page", sku);

        let html = match self.session.get(&search_url).await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(html) => html,
                Err(e) => {
                    error!("Failed to read search page for SKU {}: {}", sku, e);
                    return SearchInfo::default();
                }
            },
            Ok(response) => {
                error!(
                    "Failed to get search page for SKU {}: {}",
                    sku,
                    response.status()
                );
                return SearchInfo::default();
            }
            Err(e) => {
                error!("Failed to get search page for SKU {}: {}", sku, e);
                return SearchInfo::default();
            }
        };

        extract::search_result(&html, sku)
    }
}

#[async_trait]
impl ProductSource for StockScraper {
    async fn fetch_all(&self, skus: &[String], max_concurrency: usize) -> Vec<ProductRecord> {
        if !self.session.ensure_authenticated().await {
            error!("Login failed, aborting batch of {} SKUs", skus.len());
            return Vec::new();
        }

        // One snapshot per batch, shared read-only by every task
        let discount = DiscountConfig::load_or_default(&self.discount_config_path);

        info!(
            "Fetching {} SKUs with up to {} concurrent requests",
            skus.len(),
            max_concurrency
        );

        // Each task owns its SKU; only the discount snapshot is shared
        let records: Vec<ProductRecord> = stream::iter(skus.iter().cloned())
            .map(|sku| {
                let discount = &discount;
                async move { self.check_stock(&sku, discount).await }
            })
            .buffer_unordered(max_concurrency.max(1))
            .collect()
            .await;

        info!("Batch complete: {} records", records.len());
        records
    }

    async fn fetch_one(&self, sku: &str) -> Option<ProductRecord> {
        if !self.session.ensure_authenticated().await {
            error!("Login failed, cannot fetch SKU {}", sku);
            return None;
        }

        let discount = DiscountConfig::load_or_default(&self.discount_config_path);
        Some(self.check_stock(sku, &discount).await)
    }

    async fn login(&self) -> bool {
        self.session.login().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    /// Scraper wired to a closed local port: every fetch fails fast with a
    /// connection refusal, exercising the degradation paths without any
    /// external network.
    fn unreachable_scraper() -> StockScraper {
        let config = AppConfig {
            shop_url: "http://127.0.0.1:9".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            ..AppConfig::default()
        };
        let session = Arc::new(Session::new(&config).unwrap());
        StockScraper::new(session, "no-such-xconfig.json")
    }

    #[tokio::test]
    async fn auth_failure_fails_whole_batch_with_empty_list() {
        let scraper = unreachable_scraper();
        let skus = vec!["K100".to_string(), "K200".to_string(), "K300".to_string()];
        let records = scraper.fetch_all(&skus, 4).await;
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn unreachable_product_page_degrades_to_zero_record() {
        let scraper = unreachable_scraper();
        let record = scraper
            .check_stock("K100", &DiscountConfig::permissive())
            .await;
        assert_eq!(record, ProductRecord::unavailable("K100"));
    }
}
