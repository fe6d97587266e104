//! Data models for scraped product data and API payloads

use serde::{Deserialize, Serialize};

/// Per-SKU result of one fetch-and-extract pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub sku: String,
    pub brand: String,
    pub stock_quantity: u32,
    /// 1 iff `stock_quantity > 0`
    pub stock_status: u8,
    /// Discounted price as a decimal string, the original scraped string if
    /// it could not be parsed, or "0.0" when the fetch failed entirely
    pub sale_price: String,
    pub regular_price: String,
}

impl ProductRecord {
    pub fn new(
        sku: impl Into<String>,
        brand: String,
        stock_quantity: u32,
        sale_price: String,
        regular_price: String,
    ) -> Self {
        Self {
            sku: sku.into(),
            brand,
            stock_quantity,
            stock_status: u8::from(stock_quantity > 0),
            sale_price,
            regular_price,
        }
    }

    /// Degraded record standing in for a failed fetch
    pub fn unavailable(sku: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            brand: String::new(),
            stock_quantity: 0,
            stock_status: 0,
            sale_price: "0.0".to_string(),
            regular_price: String::new(),
        }
    }
}

/// Body of `POST /api/products`
#[derive(Debug, Deserialize)]
pub struct ProductsRequest {
    pub sku_ids: Vec<String>,
    pub max_workers: Option<usize>,
}

/// Response of `POST /api/products`
#[derive(Debug, Serialize)]
pub struct ProductsResponse {
    pub products: Vec<ProductRecord>,
    pub count: usize,
    pub processing_time: f64,
}

/// Response of `GET /api/product/{sku}`
#[derive(Debug, Serialize)]
pub struct SingleProductResponse {
    pub product: ProductRecord,
    pub processing_time: f64,
}

/// 401 body emitted by the token-auth middleware
#[derive(Debug, Serialize)]
pub struct UnauthorizedBody {
    pub message: String,
    pub error: String,
}

/// Response of `POST /login`
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub status: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_status_follows_quantity() {
        let in_stock = ProductRecord::new("K123", String::new(), 3, "0.0".into(), String::new());
        assert_eq!(in_stock.stock_status, 1);

        let out_of_stock =
            ProductRecord::new("K123", String::new(), 0, "0.0".into(), String::new());
        assert_eq!(out_of_stock.stock_status, 0);
    }

    #[test]
    fn unavailable_record_is_zero_valued() {
        let record = ProductRecord::unavailable("K999-X");
        assert_eq!(record.sku, "K999-X");
        assert_eq!(record.brand, "");
        assert_eq!(record.stock_quantity, 0);
        assert_eq!(record.stock_status, 0);
        assert_eq!(record.sale_price, "0.0");
        assert_eq!(record.regular_price, "");
    }
}
