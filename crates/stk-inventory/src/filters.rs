//! Dynamic WHERE clauses for the search operations.
//!
//! Conditions are joined with `and`; every value becomes a numbered
//! placeholder, so user text never reaches the SQL string.

use stk_db::{SqlValue, Statement};
use stk_schemas::{OrderFilters, Pagination, ProductFilters};

use crate::sql::{ORDER_COLUMNS, PRODUCT_COLUMNS};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    conditions: Vec<String>,
    params: Vec<SqlValue>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `<expr> <op> $n` binding `value` to the next placeholder.
    pub fn push(&mut self, expr: &str, op: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.params.push(value.into());
        let n = self.params.len();
        self.conditions.push(format!("{expr} {op} ${n}"));
        self
    }

    /// Add a condition with no bound value.
    pub fn push_literal(&mut self, condition: &str) -> &mut Self {
        self.conditions.push(condition.to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// ` where a and b`, or an empty string when there are no conditions.
    pub fn sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" where {}", self.conditions.join(" and "))
        }
    }

    /// `select count(*) as n from <table> [where ..]`.
    pub fn count_statement(&self, table: &str) -> Statement {
        let sql = format!("select count(*) as n from {table}{}", self.sql());
        self.bind_all(Statement::new(sql))
    }

    /// Newest-first page of `columns` from `table`; limit and offset follow
    /// the filter placeholders.
    pub fn page_statement(&self, columns: &str, table: &str, page: Pagination) -> Statement {
        let n = self.params.len();
        let sql = format!(
            "select {columns} from {table}{} order by created_at desc, id desc limit ${} offset ${}",
            self.sql(),
            n + 1,
            n + 2
        );
        self.bind_all(Statement::new(sql))
            .bind(page.limit)
            .bind(page.offset())
    }

    fn bind_all(&self, statement: Statement) -> Statement {
        self.params
            .iter()
            .cloned()
            .fold(statement, |s, v| s.bind(v))
    }
}

/// `%text%` with LIKE wildcards in `text` escaped (backslash is the default
/// escape character in PostgreSQL).
pub fn contains_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('%');
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

pub fn product_where(f: &ProductFilters) -> WhereClause {
    let mut w = WhereClause::new();
    if let Some(name) = f.name.as_deref().filter(|s| !s.is_empty()) {
        w.push("name", "ilike", contains_pattern(name));
    }
    if let Some(min) = f.min_price {
        w.push("price", ">=", min);
    }
    if let Some(max) = f.max_price {
        w.push("price", "<=", max);
    }
    if f.in_stock {
        w.push_literal("stock > 0");
    }
    w
}

pub fn order_where(f: &OrderFilters) -> WhereClause {
    let mut w = WhereClause::new();
    if let Some(name) = f.customer_name.as_deref().filter(|s| !s.is_empty()) {
        w.push("customer_name", "ilike", contains_pattern(name));
    }
    if let Some(status) = f.status {
        w.push("status", "=", status.as_str());
    }
    if let Some(start) = f.start_date {
        w.push("created_at", ">=", start);
    }
    if let Some(end) = f.end_date {
        w.push("created_at", "<=", end);
    }
    w
}

pub(crate) fn product_page(f: &ProductFilters, page: Pagination) -> (Statement, Statement) {
    let w = product_where(f);
    (
        w.count_statement("products"),
        w.page_statement(PRODUCT_COLUMNS, "products", page),
    )
}

pub(crate) fn order_page(f: &OrderFilters, page: Pagination) -> (Statement, Statement) {
    let w = order_where(f);
    (
        w.count_statement("orders"),
        w.page_statement(ORDER_COLUMNS, "orders", page),
    )
}
