//! Tolerant extraction of product fields from fetched storefront HTML
//!
//! Page markup varies per product, so every lookup is optional: an absent
//! element degrades to an empty string or zero, never an error. Parsing is
//! synchronous over the already-fetched text; `scraper::Html` is not `Send`
//! and must not live across an await point.

use scraper::{Html, Selector};

/// Header label of the stock-count column on the product page (Thai, "in stock")
const STOCK_HEADER_LABEL: &str = "ในสต๊อก";

/// Column used when no header carries [`STOCK_HEADER_LABEL`]
const DEFAULT_STOCK_COLUMN: usize = 1;

/// Brand and price fields pulled from one search-results grid item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchInfo {
    pub brand: String,
    pub sale_price: String,
    pub regular_price: String,
}

/// Extracts brand and prices for `sku` from a search-results page.
///
/// Grid items are scanned in document order; the first item whose SKU label
/// contains `sku` as a substring wins. Missing fields stay empty.
pub fn search_result(html: &str, sku: &str) -> SearchInfo {
    let document = Html::parse_document(html);

    let item_selector = Selector::parse(".grid-item").unwrap();
    let sku_selector = Selector::parse(".grid-item__sku").unwrap();
    let brand_selector = Selector::parse(".grid-item__brand").unwrap();
    let sale_price_selector = Selector::parse(".grid-item__saleprice").unwrap();
    let regular_price_selector = Selector::parse(".grid-item__wasprice").unwrap();

    for item in document.select(&item_selector) {
        let matches_sku = item
            .select(&sku_selector)
            .next()
            .is_some_and(|el| el.text().collect::<String>().trim().contains(sku));
        if !matches_sku {
            continue;
        }

        let text_of = |selector: &Selector| {
            item.select(selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default()
        };

        return SearchInfo {
            brand: text_of(&brand_selector),
            sale_price: text_of(&sale_price_selector),
            regular_price: text_of(&regular_price_selector),
        };
    }

    SearchInfo::default()
}

/// Sums the stock counts across all location rows of the product page's
/// stock table.
///
/// The stock column is found by scanning header cells for the Thai "in
/// stock" label, defaulting to the second column. Each row contributes the
/// last whitespace-delimited token of the target cell if it parses as an
/// integer; anything else contributes zero. A missing table yields zero and
/// the total saturates rather than overflowing.
pub fn stock_quantity(html: &str) -> u32 {
    let document = Html::parse_document(html);

    let table_selector = Selector::parse("div.table-responsive.stock-striped table").unwrap();
    let header_selector = Selector::parse("th").unwrap();
    let row_selector = Selector::parse("tr").unwrap();
    let cell_selector = Selector::parse("td").unwrap();

    let Some(table) = document.select(&table_selector).next() else {
        return 0;
    };

    let stock_index = table
        .select(&header_selector)
        .position(|header| {
            header
                .text()
                .collect::<String>()
                .trim()
                .contains(STOCK_HEADER_LABEL)
        })
        .unwrap_or(DEFAULT_STOCK_COLUMN);

    let mut total = 0u32;
    for row in table.select(&row_selector) {
        let cells: Vec<_> = row.select(&cell_selector).collect();
        if let Some(cell) = cells.get(stock_index) {
            let text = cell.text().collect::<String>();
            if let Some(last) = text.split_whitespace().last() {
                if let Ok(count) = last.parse::<u32>() {
                    total = total.saturating_add(count);
                }
            }
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock_page(header: &str, rows: &[&str]) -> String {
        let body: String = rows
            .iter()
            .map(|value| format!("<tr><td>Bangkok</td><td>{value}</td></tr>"))
            .collect();
        format!(
            "<html><body><div class=\"table-responsive stock-striped\"><table>\
             <tr><th>สาขา</th><th>{header}</th></tr>{body}</table></div></body></html>"
        )
    }

    const SEARCH_PAGE: &str = r#"
        <div class="grid-item">
            <div class="grid-item__sku">รหัส KTW-100-A</div>
            <div class="grid-item__brand">Makita</div>
            <div class="grid-item__saleprice">฿1,250.00</div>
            <div class="grid-item__wasprice">฿1,500.00</div>
        </div>
        <div class="grid-item">
            <div class="grid-item__sku">KTW-200-B</div>
            <div class="grid-item__brand">Bosch</div>
            <div class="grid-item__saleprice">฿900.00</div>
        </div>
    "#;

    #[test]
    fn sums_numeric_rows_and_skips_garbage() {
        let html = stock_page("ในสต๊อก", &["10", "abc", "5"]);
        assert_eq!(stock_quantity(&html), 15);
    }

    #[test]
    fn takes_last_whitespace_token_of_cell() {
        let html = stock_page("ในสต๊อก", &["มากกว่า 20", "ชิ้น 7"]);
        assert_eq!(stock_quantity(&html), 27);
    }

    #[test]
    fn unlabeled_header_defaults_to_second_column() {
        let html = stock_page("Quantity", &["4", "6"]);
        assert_eq!(stock_quantity(&html), 10);
    }

    #[test]
    fn huge_totals_saturate_instead_of_overflowing() {
        let html = stock_page("ในสต๊อก", &["4000000000", "4000000000"]);
        assert_eq!(stock_quantity(&html), u32::MAX);
    }

    #[test]
    fn missing_table_yields_zero() {
        assert_eq!(stock_quantity("<html><body><p>no stock</p></body></html>"), 0);
    }

    #[test]
    fn short_rows_are_skipped() {
        let html = "<html><body><div class=\"table-responsive stock-striped\"><table>\
             <tr><th>สาขา</th><th>ในสต๊อก</th></tr>\
             <tr><td>lone cell</td></tr>\
             <tr><td>Bangkok</td><td>12</td></tr></table></div></body></html>";
        assert_eq!(stock_quantity(html), 12);
    }

    #[test]
    fn matches_sku_as_substring_in_document_order() {
        let info = search_result(SEARCH_PAGE, "KTW-100");
        assert_eq!(info.brand, "Makita");
        assert_eq!(info.sale_price, "฿1,250.00");
        assert_eq!(info.regular_price, "฿1,500.00");
    }

    #[test]
    fn missing_field_stays_empty() {
        let info = search_result(SEARCH_PAGE, "KTW-200-B");
        assert_eq!(info.brand, "Bosch");
        assert_eq!(info.sale_price, "฿900.00");
        assert_eq!(info.regular_price, "");
    }

    #[test]
    fn no_match_yields_all_empty() {
        assert_eq!(search_result(SEARCH_PAGE, "KTW-999"), SearchInfo::default());
    }

    #[test]
    fn first_matching_item_wins() {
        let html = r#"
            <div class="grid-item">
                <div class="grid-item__sku">KTW-300</div>
                <div class="grid-item__brand">First</div>
            </div>
            <div class="grid-item">
                <div class="grid-item__sku">KTW-300</div>
                <div class="grid-item__brand">Second</div>
            </div>
        "#;
        assert_eq!(search_result(html, "KTW-300").brand, "First");
    }
}
