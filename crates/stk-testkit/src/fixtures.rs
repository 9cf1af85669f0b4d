//! Canned payloads and a small seeded catalogue.

use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::memory::MemoryGateway;

/// A product payload that passes validation.
pub fn product_payload(name: &str, price: f64, stock: i64) -> Value {
    json!({
        "name": name,
        "description": format!("{name}, made fresh to order"),
        "price": price,
        "stock": stock,
    })
}

/// `{customerName, items: [{productId, quantity}, ...]}`.
pub fn order_payload(customer_name: &str, items: &[(i64, i64)]) -> Value {
    let items: Vec<Value> = items
        .iter()
        .map(|&(product_id, quantity)| json!({ "productId": product_id, "quantity": quantity }))
        .collect();
    json!({ "customerName": customer_name, "items": items })
}

/// Ids of the products created by [`seed_menu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Menu {
    /// "Burger Classic", 12.50, stock 10.
    pub burger: i64,
    /// "Frites maison", 3.50, stock 3.
    pub fries: i64,
}

pub async fn seed_menu(gateway: &MemoryGateway) -> Menu {
    Menu {
        burger: gateway
            .seed_product("Burger Classic", Decimal::new(1250, 2), 10)
            .await,
        fries: gateway
            .seed_product("Frites maison", Decimal::new(350, 2), 3)
            .await,
    }
}
