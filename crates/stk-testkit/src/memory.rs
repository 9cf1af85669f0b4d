//! In-memory gateway for offline scenario tests.
//!
//! Implements the gateway contract over plain maps:
//! - One transaction at a time. A transaction holds the table mutex for its
//!   whole life, which gives every row the exclusion a `for update` lock
//!   would (coarser, never weaker).
//! - Rollback restores a snapshot taken at begin. Dropping a session without
//!   committing (error, panic, cancelled future) rolls back as well.
//! - Every statement, begin, commit, rollback and release is counted, and
//!   every statement is logged with its parameters.
//! - Failures can be injected on the n-th execution of a statement or on
//!   the next commit.
//!
//! Only the statements in [`stk_inventory::sql`] are understood; anything
//! else (e.g. a dynamic search) fails with a `statement` error.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use stk_db::{
    Gateway, QueryOutput, Row, Session, SqlValue, Statement, StoreError, StoreOp, UnitOfWork,
};
use stk_inventory::sql;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ProductRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRow {
    pub id: i64,
    pub customer_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub order_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price_at_order: Decimal,
}

/// Committed state of the three tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tables {
    pub products: BTreeMap<i64, ProductRow>,
    pub orders: BTreeMap<i64, OrderRow>,
    pub order_items: Vec<ItemRow>,
    last_product_id: i64,
    last_order_id: i64,
    ticks: i64,
}

impl Tables {
    /// Strictly increasing timestamps so newest-first ordering is deterministic.
    fn now(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        Utc.timestamp_opt(1_700_000_000, 0)
            .single()
            .unwrap_or_else(Utc::now)
            + Duration::seconds(self.ticks)
    }

    pub fn stock_of(&self, product_id: i64) -> Option<i64> {
        self.products.get(&product_id).map(|p| p.stock)
    }

    pub fn items_of(&self, order_id: i64) -> Vec<&ItemRow> {
        self.order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Store interactions observed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub queries: usize,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    /// Sessions handed back, whatever the outcome.
    pub releases: usize,
}

impl CallStats {
    /// Every begun transaction has been released.
    pub fn balanced(&self) -> bool {
        self.begins == self.releases && self.begins == self.commits + self.rollbacks
    }
}

#[derive(Debug)]
struct FailPoint {
    sql: String,
    /// Executions of `sql` still allowed to succeed.
    skip: usize,
}

#[derive(Debug, Default)]
struct Shared {
    queries: AtomicUsize,
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    releases: AtomicUsize,
    log: StdMutex<Vec<Statement>>,
    fail_point: StdMutex<Option<FailPoint>>,
    fail_commit: AtomicBool,
}

impl Shared {
    fn record(&self, statement: &Statement) -> Result<(), StoreError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        debug!(sql = statement.sql(), params = ?statement.params(), "memory statement");
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(statement.clone());

        let mut fp = self
            .fail_point
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(point) = fp.as_mut() {
            if point.sql == statement.sql() {
                if point.skip == 0 {
                    *fp = None;
                    return Err(StoreError::transaction(
                        StoreOp::Statement,
                        "injected statement failure",
                    ));
                }
                point.skip -= 1;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    tables: Arc<Mutex<Tables>>,
    shared: Arc<Shared>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a product directly, bypassing validation and counters.
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i64) -> i64 {
        let mut t = self.tables.lock().await;
        t.last_product_id += 1;
        let id = t.last_product_id;
        let now = t.now();
        t.products.insert(
            id,
            ProductRow {
                id,
                name: name.to_string(),
                description: format!("{name} (seeded fixture)"),
                price,
                stock,
                created_at: now,
                updated_at: now,
            },
        );
        id
    }

    /// Copy of the committed tables. Waits for any open transaction.
    pub async fn snapshot(&self) -> Tables {
        self.tables.lock().await.clone()
    }

    pub async fn stock_of(&self, product_id: i64) -> Option<i64> {
        self.tables.lock().await.stock_of(product_id)
    }

    pub fn stats(&self) -> CallStats {
        CallStats {
            queries: self.shared.queries.load(Ordering::SeqCst),
            begins: self.shared.begins.load(Ordering::SeqCst),
            commits: self.shared.commits.load(Ordering::SeqCst),
            rollbacks: self.shared.rollbacks.load(Ordering::SeqCst),
            releases: self.shared.releases.load(Ordering::SeqCst),
        }
    }

    /// Every statement executed so far, in order.
    pub fn statements(&self) -> Vec<Statement> {
        self.shared
            .log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Statements whose SQL is exactly `sql`, in execution order.
    pub fn statements_for(&self, sql: &str) -> Vec<Statement> {
        self.statements()
            .into_iter()
            .filter(|s| s.sql() == sql)
            .collect()
    }

    /// Fail the `nth` (1-based) upcoming execution of `sql`.
    pub fn fail_on(&self, sql: &str, nth: usize) {
        *self
            .shared
            .fail_point
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(FailPoint {
            sql: sql.to_string(),
            skip: nth.saturating_sub(1),
        });
    }

    /// Make the next commit fail; the transaction is rolled back.
    pub fn fail_next_commit(&self) {
        self.shared.fail_commit.store(true, Ordering::SeqCst);
    }
}

pub struct MemorySession {
    tables: OwnedMutexGuard<Tables>,
    /// State at begin; `None` once committed.
    snapshot: Option<Tables>,
    shared: Arc<Shared>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.tables = snapshot;
            self.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
        self.shared.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn query(&mut self, statement: Statement) -> Result<QueryOutput, StoreError> {
        self.shared.record(&statement)?;
        execute(&mut self.tables, &statement)
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    type Session = MemorySession;

    async fn query(&self, statement: Statement) -> Result<QueryOutput, StoreError> {
        self.shared.record(&statement)?;
        let mut tables = self.tables.lock().await;
        execute(&mut tables, &statement)
    }

    async fn transaction<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut Self::Session) -> UnitOfWork<'s, T> + Send,
    {
        let tables = Arc::clone(&self.tables).lock_owned().await;
        self.shared.begins.fetch_add(1, Ordering::SeqCst);
        let snapshot = tables.clone();
        let mut session = MemorySession {
            tables,
            snapshot: Some(snapshot),
            shared: Arc::clone(&self.shared),
        };

        let value = work(&mut session).await?;

        if self.shared.fail_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::transaction(
                StoreOp::Commit,
                "injected commit failure",
            ));
        }
        session.snapshot = None;
        self.shared.commits.fetch_add(1, Ordering::SeqCst);
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Statement interpreter
// ---------------------------------------------------------------------------

fn param(st: &Statement, idx: usize) -> Result<&SqlValue, StoreError> {
    st.param(idx).ok_or_else(|| {
        StoreError::transaction(
            StoreOp::Statement,
            format!("missing parameter ${} for `{}`", idx + 1, st.sql()),
        )
    })
}

fn int(st: &Statement, idx: usize) -> Result<i64, StoreError> {
    param(st, idx)?
        .as_int()
        .ok_or_else(|| type_error(st, idx, "int"))
}

fn text(st: &Statement, idx: usize) -> Result<String, StoreError> {
    param(st, idx)?
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| type_error(st, idx, "text"))
}

fn decimal(st: &Statement, idx: usize) -> Result<Decimal, StoreError> {
    param(st, idx)?
        .as_decimal()
        .ok_or_else(|| type_error(st, idx, "decimal"))
}

fn type_error(st: &Statement, idx: usize, expected: &str) -> StoreError {
    StoreError::transaction(
        StoreOp::Statement,
        format!("parameter ${} of `{}` is not {expected}", idx + 1, st.sql()),
    )
}

fn constraint(msg: impl Into<String>) -> StoreError {
    StoreError::transaction(StoreOp::Statement, msg.into())
}

/// Store `value` the way a `numeric(14, 4)` column does: rounded to four
/// places, overflow when ten integer digits are not enough.
fn numeric_14_4(value: Decimal) -> Result<Decimal, StoreError> {
    let stored = value.round_dp(4);
    if stored.abs() >= Decimal::from(10_000_000_000_i64) {
        return Err(constraint("numeric field overflow"));
    }
    Ok(stored)
}

fn product_row(p: &ProductRow) -> Row {
    Row::new()
        .with("id", p.id)
        .with("name", p.name.as_str())
        .with("description", p.description.as_str())
        .with("price", p.price)
        .with("stock", p.stock)
        .with("created_at", p.created_at)
        .with("updated_at", p.updated_at)
}

fn order_row(o: &OrderRow) -> Row {
    Row::new()
        .with("id", o.id)
        .with("customer_name", o.customer_name.as_str())
        .with("status", o.status.as_str())
        .with("created_at", o.created_at)
        .with("updated_at", o.updated_at)
}

fn count_row(n: usize) -> QueryOutput {
    QueryOutput::from_rows(vec![Row::new().with("n", n as i64)])
}

fn page<'a, T: 'a>(
    rows: impl Iterator<Item = &'a T>,
    key: impl Fn(&T) -> (DateTime<Utc>, i64),
    st: &Statement,
    to_row: impl Fn(&T) -> Row,
) -> Result<QueryOutput, StoreError> {
    let limit = usize::try_from(int(st, 0)?).unwrap_or(0);
    let offset = usize::try_from(int(st, 1)?).unwrap_or(0);
    let mut all: Vec<&T> = rows.collect();
    all.sort_by_key(|r| std::cmp::Reverse(key(*r)));
    Ok(QueryOutput::from_rows(
        all.into_iter().skip(offset).take(limit).map(to_row).collect(),
    ))
}

fn execute(t: &mut Tables, st: &Statement) -> Result<QueryOutput, StoreError> {
    match st.sql() {
        // -- products ------------------------------------------------------
        sql::INSERT_PRODUCT => {
            let (price, stock) = (numeric_14_4(decimal(st, 2)?)?, int(st, 3)?);
            if price < Decimal::ZERO || stock < 0 {
                return Err(constraint("products check constraint violated"));
            }
            t.last_product_id += 1;
            let id = t.last_product_id;
            let now = t.now();
            t.products.insert(
                id,
                ProductRow {
                    id,
                    name: text(st, 0)?,
                    description: text(st, 1)?,
                    price,
                    stock,
                    created_at: now,
                    updated_at: now,
                },
            );
            Ok(QueryOutput::from_rows(vec![Row::new().with("id", id)]))
        }
        sql::SELECT_PRODUCT_BY_ID | sql::LOCK_PRODUCT_BY_ID => {
            let id = int(st, 0)?;
            Ok(QueryOutput::from_rows(
                t.products.get(&id).map(product_row).into_iter().collect(),
            ))
        }
        sql::UPDATE_PRODUCT => {
            let id = int(st, 0)?;
            let (name, description, price, stock) =
                (text(st, 1)?, text(st, 2)?, numeric_14_4(decimal(st, 3)?)?, int(st, 4)?);
            if price < Decimal::ZERO || stock < 0 {
                return Err(constraint("products check constraint violated"));
            }
            let now = t.now();
            match t.products.get_mut(&id) {
                Some(p) => {
                    p.name = name;
                    p.description = description;
                    p.price = price;
                    p.stock = stock;
                    p.updated_at = now;
                    Ok(QueryOutput::affected(1))
                }
                None => Ok(QueryOutput::affected(0)),
            }
        }
        sql::DEBIT_STOCK | sql::CREDIT_STOCK => {
            let (id, qty) = (int(st, 0)?, int(st, 1)?);
            let delta = if st.sql() == sql::DEBIT_STOCK {
                qty.checked_neg()
                    .ok_or_else(|| constraint("bigint out of range"))?
            } else {
                qty
            };
            let now = t.now();
            let Some(p) = t.products.get_mut(&id) else {
                return Ok(QueryOutput::default());
            };
            let stock = p
                .stock
                .checked_add(delta)
                .ok_or_else(|| constraint("bigint out of range"))?;
            if stock < 0 {
                return Err(constraint("products.stock check constraint violated"));
            }
            p.stock = stock;
            p.updated_at = now;
            Ok(QueryOutput {
                rows: vec![Row::new().with("stock", stock)],
                rows_affected: 1,
            })
        }
        sql::COUNT_ACTIVE_ORDER_REFS => {
            let id = int(st, 0)?;
            let n = t
                .order_items
                .iter()
                .filter(|i| i.product_id == id)
                .filter(|i| {
                    t.orders
                        .get(&i.order_id)
                        .is_some_and(|o| o.status == "pending" || o.status == "processing")
                })
                .count();
            Ok(count_row(n))
        }
        sql::COUNT_ORDER_REFS => {
            let id = int(st, 0)?;
            Ok(count_row(
                t.order_items.iter().filter(|i| i.product_id == id).count(),
            ))
        }
        sql::DELETE_PRODUCT => {
            let id = int(st, 0)?;
            if t.order_items.iter().any(|i| i.product_id == id) {
                return Err(constraint("order_items.product_id foreign key violated"));
            }
            let n = u64::from(t.products.remove(&id).is_some());
            Ok(QueryOutput::affected(n))
        }
        sql::COUNT_PRODUCTS => Ok(count_row(t.products.len())),
        sql::SELECT_PRODUCTS_PAGE => page(
            t.products.values(),
            |p: &ProductRow| (p.created_at, p.id),
            st,
            product_row,
        ),

        // -- orders --------------------------------------------------------
        sql::INSERT_ORDER => {
            let (customer_name, status) = (text(st, 0)?, text(st, 1)?);
            t.last_order_id += 1;
            let id = t.last_order_id;
            let now = t.now();
            t.orders.insert(
                id,
                OrderRow {
                    id,
                    customer_name,
                    status,
                    created_at: now,
                    updated_at: now,
                },
            );
            Ok(QueryOutput::from_rows(vec![Row::new().with("id", id)]))
        }
        sql::INSERT_ORDER_ITEM => {
            let item = ItemRow {
                order_id: int(st, 0)?,
                product_id: int(st, 1)?,
                quantity: int(st, 2)?,
                unit_price_at_order: numeric_14_4(decimal(st, 3)?)?,
            };
            if !t.orders.contains_key(&item.order_id) || !t.products.contains_key(&item.product_id)
            {
                return Err(constraint("order_items foreign key violated"));
            }
            if item.quantity <= 0 {
                return Err(constraint("order_items.quantity check constraint violated"));
            }
            t.order_items.push(item);
            Ok(QueryOutput::affected(1))
        }
        sql::SELECT_ORDER_BY_ID => {
            let id = int(st, 0)?;
            Ok(QueryOutput::from_rows(
                t.orders.get(&id).map(order_row).into_iter().collect(),
            ))
        }
        sql::SELECT_ORDER_LINES => {
            let id = int(st, 0)?;
            let mut items = t.items_of(id);
            items.sort_by_key(|i| i.product_id);
            let rows = items
                .into_iter()
                .filter_map(|i| {
                    let p = t.products.get(&i.product_id)?;
                    Some(
                        Row::new()
                            .with("product_id", i.product_id)
                            .with("name", p.name.as_str())
                            .with("price", p.price)
                            .with("unit_price_at_order", i.unit_price_at_order)
                            .with("quantity", i.quantity)
                            .with("total_price", p.price * Decimal::from(i.quantity)),
                    )
                })
                .collect();
            Ok(QueryOutput::from_rows(rows))
        }
        sql::LOCK_ORDER_STATUS => {
            let id = int(st, 0)?;
            Ok(QueryOutput::from_rows(
                t.orders
                    .get(&id)
                    .map(|o| Row::new().with("status", o.status.as_str()))
                    .into_iter()
                    .collect(),
            ))
        }
        sql::UPDATE_ORDER_STATUS => {
            let (id, status) = (int(st, 0)?, text(st, 1)?);
            let now = t.now();
            match t.orders.get_mut(&id) {
                Some(o) => {
                    o.status = status;
                    o.updated_at = now;
                    Ok(QueryOutput::affected(1))
                }
                None => Ok(QueryOutput::affected(0)),
            }
        }
        sql::SELECT_ORDER_ITEMS => {
            let id = int(st, 0)?;
            let rows = t
                .items_of(id)
                .into_iter()
                .map(|i| {
                    Row::new()
                        .with("product_id", i.product_id)
                        .with("quantity", i.quantity)
                })
                .collect();
            Ok(QueryOutput::from_rows(rows))
        }
        sql::DELETE_ORDER_ITEMS => {
            let id = int(st, 0)?;
            let before = t.order_items.len();
            t.order_items.retain(|i| i.order_id != id);
            Ok(QueryOutput::affected((before - t.order_items.len()) as u64))
        }
        sql::DELETE_ORDER => {
            let id = int(st, 0)?;
            let removed = t.orders.remove(&id).is_some();
            if removed {
                t.order_items.retain(|i| i.order_id != id);
            }
            Ok(QueryOutput::affected(u64::from(removed)))
        }
        sql::ORDER_TOTAL => {
            let id = int(st, 0)?;
            let lines: Vec<Decimal> = t
                .items_of(id)
                .into_iter()
                .filter_map(|i| {
                    t.products
                        .get(&i.product_id)
                        .map(|p| p.price * Decimal::from(i.quantity))
                })
                .collect();
            let total = if lines.is_empty() {
                SqlValue::Null
            } else {
                SqlValue::Decimal(lines.into_iter().sum())
            };
            Ok(QueryOutput::from_rows(vec![Row::new().with("total", total)]))
        }
        sql::COUNT_ORDERS => Ok(count_row(t.orders.len())),
        sql::SELECT_ORDERS_PAGE => page(
            t.orders.values(),
            |o: &OrderRow| (o.created_at, o.id),
            st,
            order_row,
        ),

        other => Err(StoreError::transaction(
            StoreOp::Statement,
            format!("memory gateway does not understand `{other}`"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn committed_work_is_kept_failed_work_is_undone() {
        let gw = MemoryGateway::new();
        let id = gw.seed_product("Burger Classic", Decimal::new(1250, 2), 10).await;

        gw.transaction(move |s| {
            Box::pin(async move {
                s.query(Statement::new(sql::DEBIT_STOCK).bind(id).bind(3_i64))
                    .await?;
                Ok::<_, StoreError>(())
            })
        })
        .await
        .unwrap();
        assert_eq!(gw.stock_of(id).await, Some(7));

        let err = gw
            .transaction(move |s| {
                Box::pin(async move {
                    s.query(Statement::new(sql::DEBIT_STOCK).bind(id).bind(2_i64))
                        .await?;
                    Err::<(), _>(StoreError::Conflict("abort".into()))
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(gw.stock_of(id).await, Some(7));

        let stats = gw.stats();
        assert_eq!(stats.begins, 2);
        assert_eq!(stats.commits, 1);
        assert_eq!(stats.rollbacks, 1);
        assert!(stats.balanced());
    }

    #[tokio::test]
    async fn negative_stock_is_refused_like_the_check_constraint() {
        let gw = MemoryGateway::new();
        let id = gw.seed_product("Frites maison", Decimal::new(350, 2), 1).await;
        let err = gw
            .query(Statement::new(sql::DEBIT_STOCK).bind(id).bind(2_i64))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Transaction { op: StoreOp::Statement, .. }));
        assert_eq!(gw.stock_of(id).await, Some(1));
    }

    #[tokio::test]
    async fn stock_overflow_is_a_store_error_not_a_panic() {
        let gw = MemoryGateway::new();
        let id = gw.seed_product("Frites maison", Decimal::new(350, 2), 1).await;
        let err = gw
            .query(Statement::new(sql::CREDIT_STOCK).bind(id).bind(i64::MAX))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bigint out of range"));
        assert_eq!(gw.stock_of(id).await, Some(1));
    }

    #[tokio::test]
    async fn prices_are_stored_like_numeric_14_4() {
        let gw = MemoryGateway::new();
        let insert = |price: Decimal| {
            Statement::new(sql::INSERT_PRODUCT)
                .bind("Burger Classic")
                .bind("Steak, cheddar, salade")
                .bind(price)
                .bind(1_i64)
        };

        let err = gw
            .query(insert(Decimal::from(1_000_000_000_000_i64)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("numeric field overflow"));

        gw.query(insert(Decimal::new(999_999, 5))).await.unwrap();
        let snap = gw.snapshot().await;
        let stored = snap.products.values().next().map(|p| p.price);
        assert_eq!(stored, Some(Decimal::new(10, 0)));
    }

    #[tokio::test]
    async fn unknown_statement_is_an_error() {
        let gw = MemoryGateway::new();
        let err = gw
            .query(Statement::new("select * from products where name ilike $1").bind("%x%"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not understand"));
    }

    #[tokio::test]
    async fn injected_failure_hits_the_requested_execution() {
        let gw = MemoryGateway::new();
        gw.fail_on(sql::COUNT_PRODUCTS, 2);
        assert!(gw.query(Statement::new(sql::COUNT_PRODUCTS)).await.is_ok());
        assert!(gw.query(Statement::new(sql::COUNT_PRODUCTS)).await.is_err());
        assert!(gw.query(Statement::new(sql::COUNT_PRODUCTS)).await.is_ok());
    }
}
