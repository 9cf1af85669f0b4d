//! Inbound payload validation.
//!
//! Callers hand the repositories weakly-typed JSON. Each payload shape is
//! described by a table of [`FieldRule`]s evaluated in order; the first
//! failing field is reported as [`StoreError::Validation`]. Nothing here
//! touches the store.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};
use stk_db::StoreError;
use stk_schemas::{
    OrderDraft, OrderFilters, OrderItemDraft, OrderStatus, Pagination, ProductDraft,
    ProductFilters, MAX_PAGE_LIMIT,
};

/// Constraint applied to one field of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// JSON string with at least `min_len` characters.
    Text { min_len: usize },
    /// JSON number `>= min`; when `integer` is set the value must be whole.
    Number { min: i64, integer: bool },
    /// Non-negative amount that fits `numeric(14, 4)`: at most
    /// [`MAX_PRICE_SCALE`] decimal places and below [`PRICE_CEILING`].
    Price,
}

/// Decimal places the price columns keep.
pub const MAX_PRICE_SCALE: u32 = 4;
/// Exclusive upper bound of the price columns (ten integer digits).
pub const PRICE_CEILING: i64 = 10_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub field: &'static str,
    pub rule: Rule,
}

const fn text(field: &'static str, min_len: usize) -> FieldRule {
    FieldRule {
        field,
        rule: Rule::Text { min_len },
    }
}

const fn number(field: &'static str, min: i64, integer: bool) -> FieldRule {
    FieldRule {
        field,
        rule: Rule::Number { min, integer },
    }
}

const fn price(field: &'static str) -> FieldRule {
    FieldRule {
        field,
        rule: Rule::Price,
    }
}

pub const PRODUCT_RULES: &[FieldRule] = &[
    text("name", 5),
    text("description", 10),
    price("price"),
    number("stock", 0, true),
];

pub const ORDER_RULES: &[FieldRule] = &[text("customerName", 2)];

pub const ORDER_ITEM_RULES: &[FieldRule] = &[number("productId", 1, true), number("quantity", 1, true)];

/// A value that passed its rule.
#[derive(Debug, Clone, PartialEq)]
enum Checked {
    Text(String),
    Number(Decimal),
}

/// Field values in rule order, keyed by field name.
#[derive(Debug, Default)]
struct Fields {
    values: Vec<(String, Checked)>,
}

impl Fields {
    fn take(&mut self, field: &str) -> Result<Checked, StoreError> {
        let idx = self
            .values
            .iter()
            .position(|(name, _)| name == field)
            .ok_or_else(|| StoreError::validation(field, "is required"))?;
        Ok(self.values.remove(idx).1)
    }

    fn text(&mut self, field: &str) -> Result<String, StoreError> {
        match self.take(field)? {
            Checked::Text(s) => Ok(s),
            Checked::Number(_) => Err(StoreError::validation(field, "must be a string")),
        }
    }

    fn decimal(&mut self, field: &str) -> Result<Decimal, StoreError> {
        match self.take(field)? {
            Checked::Number(n) => Ok(n),
            Checked::Text(_) => Err(StoreError::validation(field, "must be a number")),
        }
    }

    fn int(&mut self, field: &str) -> Result<i64, StoreError> {
        let n = self.decimal(field)?;
        i64::try_from(n).map_err(|_| StoreError::validation(field, "is out of range"))
    }
}

/// Evaluate `rules` against the object `obj`. `prefix` is prepended to field
/// names in error messages (e.g. `items[2].`).
fn check_fields(
    obj: &Map<String, Value>,
    rules: &[FieldRule],
    prefix: &str,
) -> Result<Fields, StoreError> {
    let mut fields = Fields::default();
    for FieldRule { field, rule } in rules {
        let name = format!("{prefix}{field}");
        let value = match obj.get(*field) {
            None | Some(Value::Null) => {
                return Err(StoreError::validation(name, "is required"));
            }
            Some(v) => v,
        };
        let checked = match *rule {
            Rule::Text { min_len } => {
                let s = value
                    .as_str()
                    .ok_or_else(|| StoreError::validation(&name, "must be a string"))?;
                if s.chars().count() < min_len {
                    return Err(StoreError::validation(
                        name,
                        format!("must be at least {min_len} characters"),
                    ));
                }
                Checked::Text(s.to_string())
            }
            Rule::Number { min, integer } => {
                let n = as_decimal(value)
                    .ok_or_else(|| StoreError::validation(&name, "must be a number"))?;
                if n < Decimal::from(min) {
                    return Err(StoreError::validation(name, format!("must be >= {min}")));
                }
                if integer && !n.fract().is_zero() {
                    return Err(StoreError::validation(name, "must be an integer"));
                }
                Checked::Number(n)
            }
            Rule::Price => {
                let n = as_decimal(value)
                    .ok_or_else(|| StoreError::validation(&name, "must be a number"))?;
                check_price(&name, n)?;
                Checked::Number(n)
            }
        };
        fields.values.push((field.to_string(), checked));
    }
    Ok(fields)
}

/// A price must be storable exactly: no rounding, no overflow.
pub fn check_price(field: &str, n: Decimal) -> Result<(), StoreError> {
    if n < Decimal::ZERO {
        return Err(StoreError::validation(field, "must be >= 0"));
    }
    if n >= Decimal::from(PRICE_CEILING) {
        return Err(StoreError::validation(
            field,
            format!("must be below {PRICE_CEILING}"),
        ));
    }
    if n.normalize().scale() > MAX_PRICE_SCALE {
        return Err(StoreError::validation(
            field,
            format!("must have at most {MAX_PRICE_SCALE} decimal places"),
        ));
    }
    Ok(())
}

/// JSON numbers only; strings holding digits are rejected.
fn as_decimal(value: &Value) -> Option<Decimal> {
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(i) = n.as_i64() {
        return Some(Decimal::from(i));
    }
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn as_object<'a>(payload: &'a Value, what: &str) -> Result<&'a Map<String, Value>, StoreError> {
    payload
        .as_object()
        .ok_or_else(|| StoreError::validation(what, "must be an object"))
}

/// Check `{name, description, price, stock}`.
pub fn validate_product(payload: &Value) -> Result<ProductDraft, StoreError> {
    let obj = as_object(payload, "product")?;
    let mut fields = check_fields(obj, PRODUCT_RULES, "")?;
    Ok(ProductDraft {
        name: fields.text("name")?,
        description: fields.text("description")?,
        price: fields.decimal("price")?,
        stock: fields.int("stock")?,
    })
}

/// Check `{customerName, items: [{productId, quantity}, ..]}`.
pub fn validate_order(payload: &Value) -> Result<OrderDraft, StoreError> {
    let obj = as_object(payload, "order")?;
    let mut fields = check_fields(obj, ORDER_RULES, "")?;
    let customer_name = fields.text("customerName")?;

    let items = match obj.get("items") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        Some(Value::Array(_)) => {
            return Err(StoreError::validation("items", "must contain at least one item"))
        }
        None | Some(Value::Null) => return Err(StoreError::validation("items", "is required")),
        Some(_) => return Err(StoreError::validation("items", "must be an array")),
    };

    let mut drafts = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let prefix = format!("items[{i}].");
        let item_obj = item
            .as_object()
            .ok_or_else(|| StoreError::validation(format!("items[{i}]"), "must be an object"))?;
        let mut fields = check_fields(item_obj, ORDER_ITEM_RULES, &prefix)?;
        drafts.push(OrderItemDraft {
            product_id: fields.int("productId")?,
            quantity: fields.int("quantity")?,
        });
    }

    Ok(OrderDraft {
        customer_name,
        items: drafts,
    })
}

pub fn validate_id(field: &str, id: i64) -> Result<i64, StoreError> {
    if id <= 0 {
        return Err(StoreError::validation(field, "must be a positive integer"));
    }
    Ok(id)
}

pub fn validate_quantity(quantity: i64) -> Result<i64, StoreError> {
    if quantity <= 0 {
        return Err(StoreError::validation("quantity", "must be a positive integer"));
    }
    Ok(quantity)
}

pub fn validate_pagination(p: Pagination) -> Result<Pagination, StoreError> {
    if p.limit < 1 || p.limit > MAX_PAGE_LIMIT {
        return Err(StoreError::validation(
            "limit",
            format!("must be an integer between 1 and {MAX_PAGE_LIMIT}"),
        ));
    }
    if p.page < 1 {
        return Err(StoreError::validation("page", "must be a positive integer"));
    }
    if (p.page - 1).checked_mul(p.limit).is_none() {
        return Err(StoreError::validation("page", "is out of range"));
    }
    Ok(p)
}

/// Exact match against the four lifecycle spellings.
pub fn parse_status(status: &str) -> Result<OrderStatus, StoreError> {
    OrderStatus::parse(status).ok_or_else(|| {
        StoreError::validation(
            "status",
            format!("invalid status `{status}`; allowed: {}", OrderStatus::allowed_list()),
        )
    })
}

pub fn validate_product_filters(f: &ProductFilters) -> Result<(), StoreError> {
    if f.min_price.is_some_and(|p| p < Decimal::ZERO) {
        return Err(StoreError::validation("min_price", "must be >= 0"));
    }
    if f.max_price.is_some_and(|p| p < Decimal::ZERO) {
        return Err(StoreError::validation("max_price", "must be >= 0"));
    }
    if let (Some(min), Some(max)) = (f.min_price, f.max_price) {
        if min > max {
            return Err(StoreError::validation("min_price", "must not exceed max_price"));
        }
    }
    Ok(())
}

pub fn validate_order_filters(f: &OrderFilters) -> Result<(), StoreError> {
    if let (Some(start), Some(end)) = (f.start_date, f.end_date) {
        if start > end {
            return Err(StoreError::validation("start_date", "must not be after end_date"));
        }
    }
    Ok(())
}
