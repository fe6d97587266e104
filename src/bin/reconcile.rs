//! Reconciles a reference CSV export against the stock API
//!
//! Treats the API as a black box: reads expected rows from a CSV, fetches the
//! same SKUs in batches over `POST /api/products`, compares field by field
//! with numeric normalization, and writes a per-field mismatch report.
//!
//! Configuration comes from the environment (a `.env` file works):
//! `RECONCILE_API_URL`, `RECONCILE_USERNAME`, `RECONCILE_PASSWORD`,
//! `RECONCILE_CSV`, `RECONCILE_BATCH_SIZE`.

use std::collections::HashMap;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Local;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

/// Row shape shared by the reference CSV and the API's product records
#[derive(Debug, Clone, Default, Deserialize)]
struct ProductRow {
    sku: String,
    #[serde(default)]
    brand: String,
    #[serde(default)]
    stock_quantity: String,
    #[serde(default)]
    stock_status: String,
    #[serde(default)]
    sale_price: String,
    #[serde(default)]
    regular_price: String,
}

/// Product record as returned by the API
#[derive(Debug, Clone, Deserialize)]
struct ApiProduct {
    sku: String,
    brand: String,
    stock_quantity: u32,
    stock_status: u8,
    sale_price: String,
    regular_price: String,
}

#[derive(Debug, Deserialize)]
struct ProductsResponse {
    products: Vec<ApiProduct>,
}

/// One line of the mismatch report
#[derive(Debug, Serialize)]
struct ReportRow {
    sku: String,
    mismatch_details: String,
    csv_brand: String,
    csv_stock_quantity: String,
    csv_stock_status: String,
    csv_sale_price: String,
    csv_regular_price: String,
    api_brand: String,
    api_stock_quantity: String,
    api_stock_status: String,
    api_sale_price: String,
    api_regular_price: String,
}

struct ReconcileConfig {
    api_base_url: String,
    username: String,
    password: String,
    csv_path: String,
    batch_size: usize,
}

impl ReconcileConfig {
    fn from_env() -> Self {
        let env_or = |key: &str, default: &str| {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };
        Self {
            api_base_url: env_or("RECONCILE_API_URL", "http://127.0.0.1:5000"),
            username: env_or("RECONCILE_USERNAME", ""),
            password: env_or("RECONCILE_PASSWORD", ""),
            csv_path: env_or("RECONCILE_CSV", "products.csv"),
            batch_size: env_or("RECONCILE_BATCH_SIZE", "10")
                .parse()
                .unwrap_or(10)
                .max(1),
        }
    }

    fn auth_header(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {token}")
    }
}

/// Normalizes a numeric field the way both sides may format it: commas
/// stripped, parsed as a float, re-rendered. Unparsable values compare as-is.
fn normalize_numeric(value: &str) -> String {
    let cleaned = value.replace(',', "");
    match cleaned.trim().parse::<f64>() {
        Ok(number) => {
            let repr = number.to_string();
            if repr.contains('.') {
                repr
            } else {
                format!("{repr}.0")
            }
        }
        Err(_) => value.trim().to_string(),
    }
}

/// Compares one expected row against the API record, returning one
/// "field: CSV=x API=y" entry per differing field.
fn compare(expected: &ProductRow, actual: &ApiProduct) -> Vec<String> {
    let api_fields = [
        ("brand", actual.brand.clone()),
        ("stock_quantity", actual.stock_quantity.to_string()),
        ("stock_status", actual.stock_status.to_string()),
        ("sale_price", actual.sale_price.clone()),
        ("regular_price", actual.regular_price.clone()),
    ];
    let csv_fields = [
        ("brand", expected.brand.clone()),
        ("stock_quantity", expected.stock_quantity.clone()),
        ("stock_status", expected.stock_status.clone()),
        ("sale_price", expected.sale_price.clone()),
        ("regular_price", expected.regular_price.clone()),
    ];

    let mut mismatches = Vec::new();
    for ((field, csv_value), (_, api_value)) in csv_fields.iter().zip(api_fields.iter()) {
        let numeric = matches!(*field, "sale_price" | "regular_price" | "stock_quantity");
        let (lhs, rhs) = if numeric {
            (normalize_numeric(csv_value), normalize_numeric(api_value))
        } else {
            (csv_value.trim().to_string(), api_value.trim().to_string())
        };
        if lhs != rhs {
            mismatches.push(format!("{field}: CSV={csv_value} API={api_value}"));
        }
    }
    mismatches
}

fn read_expected(path: &str) -> Result<Vec<ProductRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open CSV {path}"))?;
    let mut rows = Vec::new();
    for result in reader.deserialize::<ProductRow>() {
        match result {
            Ok(row) if !row.sku.is_empty() => rows.push(row),
            Ok(_) => warn!("Skipping row with no SKU"),
            Err(e) => warn!("Skipping unreadable CSV row: {}", e),
        }
    }
    info!("Successfully read {} products from CSV", rows.len());
    Ok(rows)
}

async fn fetch_batch(
    client: &Client,
    config: &ReconcileConfig,
    skus: &[String],
) -> HashMap<String, ApiProduct> {
    let url = format!("{}/api/products", config.api_base_url);
    info!("Calling bulk API with {} SKUs", skus.len());

    let payload = json!({
        "sku_ids": skus,
        "max_workers": skus.len().min(10),
    });

    let response = match client
        .post(&url)
        .header("Authorization", config.auth_header())
        .json(&payload)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            error!("Error calling API for batch request: {}", e);
            return HashMap::new();
        }
    };

    if !response.status().is_success() {
        error!("API error for batch request: status {}", response.status());
        return HashMap::new();
    }

    match response.json::<ProductsResponse>().await {
        Ok(body) => body
            .products
            .into_iter()
            .map(|product| (product.sku.to_uppercase(), product))
            .collect(),
        Err(e) => {
            error!("Error decoding batch response: {}", e);
            HashMap::new()
        }
    }
}

fn report_row(expected: &ProductRow, actual: Option<&ApiProduct>, details: &[String]) -> ReportRow {
    ReportRow {
        sku: expected.sku.clone(),
        mismatch_details: details.join("; "),
        csv_brand: expected.brand.clone(),
        csv_stock_quantity: expected.stock_quantity.clone(),
        csv_stock_status: expected.stock_status.clone(),
        csv_sale_price: expected.sale_price.clone(),
        csv_regular_price: expected.regular_price.clone(),
        api_brand: actual.map(|p| p.brand.clone()).unwrap_or_default(),
        api_stock_quantity: actual
            .map(|p| p.stock_quantity.to_string())
            .unwrap_or_default(),
        api_stock_status: actual
            .map(|p| p.stock_status.to_string())
            .unwrap_or_default(),
        api_sale_price: actual.map(|p| p.sale_price.clone()).unwrap_or_default(),
        api_regular_price: actual
            .map(|p| p.regular_price.clone())
            .unwrap_or_default(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = ReconcileConfig::from_env();
    info!(
        "Starting verification against {} (batch size {})",
        config.api_base_url, config.batch_size
    );

    let expected = read_expected(&config.csv_path)?;
    let client = Client::new();

    let all_skus: Vec<String> = expected.iter().map(|row| row.sku.to_uppercase()).collect();
    let mut api_products: HashMap<String, ApiProduct> = HashMap::new();
    let total_batches = all_skus.len().div_ceil(config.batch_size);

    for (batch_num, batch) in all_skus.chunks(config.batch_size).enumerate() {
        info!(
            "Processing batch {}/{}: {} SKUs",
            batch_num + 1,
            total_batches,
            batch.len()
        );
        api_products.extend(fetch_batch(&client, &config, batch).await);
    }

    let mut mismatched_rows = Vec::new();
    for row in &expected {
        match api_products.get(&row.sku.to_uppercase()) {
            Some(actual) => {
                let details = compare(row, actual);
                if !details.is_empty() {
                    mismatched_rows.push(report_row(row, Some(actual), &details));
                }
            }
            None => {
                warn!("No API data returned for SKU {}", row.sku);
                mismatched_rows.push(report_row(
                    row,
                    None,
                    &["all: No API data returned".to_string()],
                ));
            }
        }
    }

    let total = expected.len();
    let mismatches = mismatched_rows.len();
    info!("Verification completed: {} products processed", total);
    info!("Matched: {}, Mismatches: {}", total - mismatches, mismatches);

    if mismatched_rows.is_empty() {
        info!("No mismatches found, no report to generate");
        println!("All {total} products matched");
        return Ok(());
    }

    let report_path = format!(
        "mismatch_report_{}.csv",
        Local::now().format("%Y%m%d_%H%M%S")
    );
    let mut writer =
        csv::Writer::from_path(&report_path).context("Failed to create mismatch report")?;
    for row in &mismatched_rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Mismatch report saved to {}", report_path);

    println!("\nVerification Summary:");
    println!("Total products processed: {total}");
    println!("Products matched: {}", total - mismatches);
    println!("Products with mismatches: {mismatches}");
    println!("Mismatch report saved to: {report_path}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_product() -> ApiProduct {
        ApiProduct {
            sku: "K100".to_string(),
            brand: "Makita".to_string(),
            stock_quantity: 15,
            stock_status: 1,
            sale_price: "900.0".to_string(),
            regular_price: "1000.0".to_string(),
        }
    }

    fn csv_row() -> ProductRow {
        ProductRow {
            sku: "K100".to_string(),
            brand: "Makita".to_string(),
            stock_quantity: "15".to_string(),
            stock_status: "1".to_string(),
            sale_price: "900".to_string(),
            regular_price: "1,000.00".to_string(),
        }
    }

    #[test]
    fn numeric_normalization_equates_formatting_variants() {
        assert_eq!(normalize_numeric("1,000"), "1000.0");
        assert_eq!(normalize_numeric("1000.0"), "1000.0");
        assert_eq!(normalize_numeric("900"), normalize_numeric("900.0"));
        assert_eq!(normalize_numeric("N/A"), "N/A");
    }

    #[test]
    fn matching_rows_produce_no_mismatches() {
        assert!(compare(&csv_row(), &api_product()).is_empty());
    }

    #[test]
    fn differing_fields_are_reported_individually() {
        let mut expected = csv_row();
        expected.brand = "Bosch".to_string();
        expected.sale_price = "850".to_string();

        let details = compare(&expected, &api_product());
        assert_eq!(details.len(), 2);
        assert!(details[0].starts_with("brand:"));
        assert!(details[1].starts_with("sale_price:"));
    }

    #[test]
    fn stock_status_is_compared_verbatim() {
        let mut expected = csv_row();
        expected.stock_status = "1.0".to_string();
        // Numeric normalization applies to quantities and prices only
        assert_eq!(compare(&expected, &api_product()).len(), 1);
    }
}
