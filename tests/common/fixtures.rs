//! Fixture payloads shaped like ProPublica API responses

use serde_json::{json, Value};

/// A search-result organization (EIN as a JSON number)
pub fn search_result(ein: u64, name: &str, city: &str, state: &str) -> Value {
    json!({
        "ein": ein,
        "strein": format!("{:02}-{:07}", ein / 10_000_000, ein % 10_000_000),
        "name": name,
        "sub_name": name,
        "city": city,
        "state": state,
        "ntee_code": "P20",
        "score": 42.5
    })
}

/// A page of `n` search results with consecutive EINs starting at `first_ein`
pub fn search_page(first_ein: u64, n: usize) -> Vec<Value> {
    (0..n as u64)
        .map(|i| {
            let ein = first_ein + i;
            search_result(ein, &format!("Nonprofit {}", ein), "Portland", "OR")
        })
        .collect()
}

/// The `organization` object of a detail response (EIN as a string)
pub fn organization_detail(ein: &str, name: &str) -> Value {
    json!({
        "id": 1,
        "ein": ein,
        "name": name,
        "address": "1 Main St",
        "city": "Albany",
        "state": "NY",
        "zipcode": "12207",
        "subsection_code": 3
    })
}
