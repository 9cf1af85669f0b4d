//! Order repository.
//!
//! Creation and deletion move stock between products and orders, so both
//! run as a single transaction that locks every product row they touch.
//! Locks are always taken in ascending product id: two orders over
//! overlapping product sets queue on the same first row instead of
//! deadlocking on each other.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;
use stk_db::{Entity, Gateway, Row, Session, Statement, StoreError};
use stk_schemas::{
    OrderDetail, OrderDraft, OrderFilters, OrderItemDraft, OrderLine, OrderStatus, OrderSummary,
    Page, Pagination,
};
use tracing::{debug, info};

use crate::filters;
use crate::lifecycle::{self, TransitionPolicy};
use crate::sql;
use crate::stock::{
    count_from, credit, debit, ensure_available, fetch_page, lock_product, returned_id,
};
use crate::validation::{
    parse_status, validate_id, validate_order, validate_order_filters, validate_pagination,
};

pub struct OrderRepository<G> {
    gateway: Arc<G>,
    policy: TransitionPolicy,
}

impl<G> Clone for OrderRepository<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            policy: self.policy,
        }
    }
}

impl<G: Gateway> OrderRepository<G> {
    /// Repository with the permissive status policy.
    pub fn new(gateway: Arc<G>) -> Self {
        Self::with_policy(gateway, TransitionPolicy::default())
    }

    pub fn with_policy(gateway: Arc<G>, policy: TransitionPolicy) -> Self {
        Self { gateway, policy }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Structural check of a `{customerName, items}` payload.
    pub fn validate(&self, payload: &Value) -> Result<OrderDraft, StoreError> {
        validate_order(payload)
    }

    /// Place an order: lock, check, insert, debit. All or nothing.
    ///
    /// Returns the new order id. Nothing is sent to the store when the
    /// payload is invalid.
    pub async fn create(&self, payload: &Value) -> Result<i64, StoreError> {
        let draft = validate_order(payload)?;
        let demand = aggregate(&draft.items)?;
        let lines = draft.items.len();

        let order_id = self
            .gateway
            .transaction(move |session| Box::pin(place_order(session, draft, demand)))
            .await?;
        info!(order_id, lines, "order created");
        Ok(order_id)
    }

    /// The order with its lines priced at the current product price.
    pub async fn find_by_id(&self, id: i64) -> Result<Option<OrderDetail>, StoreError> {
        validate_id("id", id)?;
        let out = self
            .gateway
            .query(Statement::new(sql::SELECT_ORDER_BY_ID).bind(id))
            .await?;
        let Some(row) = out.first() else {
            return Ok(None);
        };
        let order = order_from_row(row)?;

        let out = self
            .gateway
            .query(Statement::new(sql::SELECT_ORDER_LINES).bind(id))
            .await?;
        let items = out
            .rows
            .iter()
            .map(line_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(OrderDetail { order, items }))
    }

    /// Set the order status. `status` must be one of the four lifecycle
    /// spellings; anything else fails before the store is touched.
    ///
    /// Returns whether a row was updated. Under [`TransitionPolicy::Strict`]
    /// the current status is locked and an illegal move is a `Conflict`.
    pub async fn update_status(&self, id: i64, status: &str) -> Result<bool, StoreError> {
        validate_id("id", id)?;
        let target = parse_status(status)?;
        let policy = self.policy;

        let updated = self
            .gateway
            .transaction(move |session| Box::pin(set_status(session, id, target, policy)))
            .await?;
        if updated {
            info!(order_id = id, status = %target, policy = policy.as_str(), "order status updated");
        } else {
            debug!(order_id = id, "status update matched no order");
        }
        Ok(updated)
    }

    /// Delete a pending order and put its quantities back in stock.
    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        validate_id("id", id)?;
        let credited = self
            .gateway
            .transaction(move |session| Box::pin(remove_order(session, id)))
            .await?;
        info!(order_id = id, products = credited, "order deleted, stock re-credited");
        Ok(())
    }

    /// Newest-first listing of every order.
    pub async fn find_all(&self, pagination: Pagination) -> Result<Page<OrderSummary>, StoreError> {
        let pagination = validate_pagination(pagination)?;
        let count = Statement::new(sql::COUNT_ORDERS);
        let page = Statement::new(sql::SELECT_ORDERS_PAGE)
            .bind(pagination.limit)
            .bind(pagination.offset());
        fetch_page(&*self.gateway, count, page, pagination, order_from_row).await
    }

    pub async fn find_by_status(
        &self,
        status: &str,
        pagination: Pagination,
    ) -> Result<Page<OrderSummary>, StoreError> {
        let status = parse_status(status)?;
        let filters = OrderFilters {
            status: Some(status),
            ..OrderFilters::default()
        };
        self.search(&filters, pagination).await
    }

    /// Orders whose customer name contains `customer_name`, ignoring case.
    pub async fn find_by_customer(
        &self,
        customer_name: &str,
        pagination: Pagination,
    ) -> Result<Page<OrderSummary>, StoreError> {
        if customer_name.is_empty() {
            return Err(StoreError::validation("customer_name", "is required"));
        }
        let filters = OrderFilters {
            customer_name: Some(customer_name.to_string()),
            ..OrderFilters::default()
        };
        self.search(&filters, pagination).await
    }

    pub async fn search(
        &self,
        filters: &OrderFilters,
        pagination: Pagination,
    ) -> Result<Page<OrderSummary>, StoreError> {
        validate_order_filters(filters)?;
        let pagination = validate_pagination(pagination)?;
        let (count, page) = filters::order_page(filters, pagination);
        fetch_page(&*self.gateway, count, page, pagination, order_from_row).await
    }

    /// Sum of `price * quantity` at the current product prices; zero for an
    /// order without lines (or an unknown id).
    pub async fn calculate_total(&self, id: i64) -> Result<Decimal, StoreError> {
        validate_id("id", id)?;
        let out = self
            .gateway
            .query(Statement::new(sql::ORDER_TOTAL).bind(id))
            .await?;
        match out.first() {
            Some(row) => Ok(row.opt_decimal("total")?.unwrap_or(Decimal::ZERO)),
            None => Ok(Decimal::ZERO),
        }
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let out = self.gateway.query(Statement::new(sql::COUNT_ORDERS)).await?;
        count_from(&out.rows)
    }
}

/// Total requested quantity per product, keyed (and therefore iterated) in
/// ascending product id.
fn aggregate(items: &[OrderItemDraft]) -> Result<BTreeMap<i64, i64>, StoreError> {
    let mut demand = BTreeMap::new();
    for item in items {
        let total: &mut i64 = demand.entry(item.product_id).or_insert(0);
        *total = total
            .checked_add(item.quantity)
            .ok_or_else(|| StoreError::validation("items", "quantity overflow"))?;
    }
    Ok(demand)
}

// ---------------------------------------------------------------------------
// Units of work
// ---------------------------------------------------------------------------

async fn place_order<S: Session + ?Sized>(
    session: &mut S,
    draft: OrderDraft,
    demand: BTreeMap<i64, i64>,
) -> Result<i64, StoreError> {
    // 1. Lock every product in ascending id and check the combined demand.
    let mut unit_prices = BTreeMap::new();
    for (&product_id, &requested) in &demand {
        let product = lock_product(session, product_id)
            .await?
            .ok_or_else(|| StoreError::not_found(Entity::Product, product_id))?;
        ensure_available(&product, requested)?;
        unit_prices.insert(product_id, product.price);
    }

    // 2. Order row.
    let out = session
        .query(
            Statement::new(sql::INSERT_ORDER)
                .bind(draft.customer_name)
                .bind(OrderStatus::Pending.as_str()),
        )
        .await?;
    let order_id = returned_id(&out.rows)?;

    // 3. One item row and one debit per requested line, in product order.
    let mut items = draft.items;
    items.sort_by_key(|item| item.product_id);
    for item in items {
        let price = unit_prices
            .get(&item.product_id)
            .copied()
            .ok_or_else(|| StoreError::not_found(Entity::Product, item.product_id))?;
        session
            .query(
                Statement::new(sql::INSERT_ORDER_ITEM)
                    .bind(order_id)
                    .bind(item.product_id)
                    .bind(item.quantity)
                    .bind(price),
            )
            .await?;
        let remaining = debit(session, item.product_id, item.quantity).await?;
        debug!(order_id, product_id = item.product_id, remaining, "stock debited");
    }

    Ok(order_id)
}

async fn set_status<S: Session + ?Sized>(
    session: &mut S,
    id: i64,
    target: OrderStatus,
    policy: TransitionPolicy,
) -> Result<bool, StoreError> {
    if policy == TransitionPolicy::Strict {
        let Some(current) = locked_status(session, id).await? else {
            return Ok(false);
        };
        policy
            .check(current, target)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
    }
    let out = session
        .query(
            Statement::new(sql::UPDATE_ORDER_STATUS)
                .bind(id)
                .bind(target.as_str()),
        )
        .await?;
    Ok(out.rows_affected > 0)
}

/// Returns the number of products whose stock was credited.
async fn remove_order<S: Session + ?Sized>(session: &mut S, id: i64) -> Result<usize, StoreError> {
    let status = locked_status(session, id)
        .await?
        .ok_or_else(|| StoreError::not_found(Entity::Order, id))?;
    if !lifecycle::is_deletable(status) {
        return Err(StoreError::Conflict(format!(
            "only pending orders may be deleted (order {id} is {status})"
        )));
    }

    let out = session
        .query(Statement::new(sql::SELECT_ORDER_ITEMS).bind(id))
        .await?;
    let mut returned: BTreeMap<i64, i64> = BTreeMap::new();
    for row in &out.rows {
        *returned.entry(row.int("product_id")?).or_insert(0) += row.int("quantity")?;
    }

    session
        .query(Statement::new(sql::DELETE_ORDER_ITEMS).bind(id))
        .await?;
    session
        .query(Statement::new(sql::DELETE_ORDER).bind(id))
        .await?;

    for (&product_id, &quantity) in &returned {
        credit(session, product_id, quantity).await?;
    }
    Ok(returned.len())
}

async fn locked_status<S: Session + ?Sized>(
    session: &mut S,
    id: i64,
) -> Result<Option<OrderStatus>, StoreError> {
    let out = session
        .query(Statement::new(sql::LOCK_ORDER_STATUS).bind(id))
        .await?;
    out.first().map(|row| status_from_row(row, "status")).transpose()
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

fn status_from_row(row: &Row, column: &str) -> Result<OrderStatus, StoreError> {
    let raw = row.text(column)?;
    OrderStatus::parse(&raw).ok_or_else(|| {
        StoreError::transaction(
            stk_db::StoreOp::Decode,
            format!("unknown order status `{raw}`"),
        )
    })
}

pub(crate) fn order_from_row(row: &Row) -> Result<OrderSummary, StoreError> {
    Ok(OrderSummary {
        id: row.int("id")?,
        customer_name: row.text("customer_name")?,
        status: status_from_row(row, "status")?,
        created_at: row.timestamp("created_at")?,
        updated_at: row.timestamp("updated_at")?,
    })
}

fn line_from_row(row: &Row) -> Result<OrderLine, StoreError> {
    Ok(OrderLine {
        product_id: row.int("product_id")?,
        name: row.text("name")?,
        price: row.decimal("price")?,
        unit_price_at_order: row.decimal("unit_price_at_order")?,
        quantity: row.int("quantity")?,
        total_price: row.decimal("total_price")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demand_is_summed_per_product_in_ascending_order() {
        let items = [
            OrderItemDraft {
                product_id: 9,
                quantity: 1,
            },
            OrderItemDraft {
                product_id: 3,
                quantity: 2,
            },
            OrderItemDraft {
                product_id: 9,
                quantity: 4,
            },
        ];
        let demand = aggregate(&items).unwrap();
        assert_eq!(demand.into_iter().collect::<Vec<_>>(), vec![(3, 2), (9, 5)]);
    }

    #[test]
    fn demand_overflow_is_a_validation_error() {
        let items = [
            OrderItemDraft {
                product_id: 1,
                quantity: i64::MAX,
            },
            OrderItemDraft {
                product_id: 1,
                quantity: 1,
            },
        ];
        assert!(matches!(
            aggregate(&items),
            Err(StoreError::Validation { .. })
        ));
    }

    #[test]
    fn unknown_stored_status_is_a_decode_error() {
        let row = Row::new().with("status", "shipped");
        assert!(matches!(
            status_from_row(&row, "status"),
            Err(StoreError::Transaction {
                op: stk_db::StoreOp::Decode,
                ..
            })
        ));
    }
}
