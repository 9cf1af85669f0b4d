//! Stock repository: product rows and their stock counter.
//!
//! Stock only changes inside a transaction, after the product row has been
//! locked with [`sql::LOCK_PRODUCT_BY_ID`]. The session-level helpers here
//! (`lock_product`, `debit`, `credit`) are shared with the order repository
//! so both paths mutate stock the same way.

use std::sync::Arc;

use serde_json::Value;
use stk_db::{Entity, Gateway, Row, Session, Statement, StoreError};
use stk_schemas::{Page, Pagination, Product, ProductDraft, ProductFilters};
use tracing::info;

use crate::filters;
use crate::sql;
use crate::validation::{
    validate_id, validate_pagination, validate_product, validate_product_filters,
    validate_quantity,
};

pub struct StockRepository<G> {
    gateway: Arc<G>,
}

impl<G> Clone for StockRepository<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
        }
    }
}

impl<G: Gateway> StockRepository<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Structural check of a `{name, description, price, stock}` payload.
    pub fn validate(&self, payload: &Value) -> Result<ProductDraft, StoreError> {
        validate_product(payload)
    }

    pub async fn create(&self, payload: &Value) -> Result<i64, StoreError> {
        let draft = validate_product(payload)?;
        let id = self
            .gateway
            .transaction(move |session| Box::pin(insert_product(session, draft)))
            .await?;
        info!(product_id = id, "product created");
        Ok(id)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Product>, StoreError> {
        validate_id("id", id)?;
        let out = self
            .gateway
            .query(Statement::new(sql::SELECT_PRODUCT_BY_ID).bind(id))
            .await?;
        out.first().map(product_from_row).transpose()
    }

    /// Locking read. `session` must belong to a transaction the caller owns;
    /// the lock is held until that transaction ends.
    pub async fn find_by_id_for_update(
        session: &mut G::Session,
        id: i64,
    ) -> Result<Option<Product>, StoreError> {
        validate_id("id", id)?;
        lock_product(session, id).await
    }

    /// Lock the product and take `quantity` off its stock. Returns the
    /// remaining stock.
    pub async fn update_stock(&self, id: i64, quantity: i64) -> Result<i64, StoreError> {
        validate_id("id", id)?;
        validate_quantity(quantity)?;
        let remaining = self
            .gateway
            .transaction(move |session| {
                Box::pin(async move {
                    let product = lock_product(session, id)
                        .await?
                        .ok_or_else(|| StoreError::not_found(Entity::Product, id))?;
                    ensure_available(&product, quantity)?;
                    debit(session, id, quantity).await
                })
            })
            .await?;
        info!(product_id = id, quantity, remaining, "stock debited");
        Ok(remaining)
    }

    /// Lock the product and add `quantity` to its stock. Returns the new stock.
    pub async fn restock(&self, id: i64, quantity: i64) -> Result<i64, StoreError> {
        validate_id("id", id)?;
        validate_quantity(quantity)?;
        let stock = self
            .gateway
            .transaction(move |session| {
                Box::pin(async move {
                    lock_product(session, id)
                        .await?
                        .ok_or_else(|| StoreError::not_found(Entity::Product, id))?;
                    credit(session, id, quantity).await
                })
            })
            .await?;
        info!(product_id = id, quantity, stock, "stock credited");
        Ok(stock)
    }

    /// Full replace of every product field.
    pub async fn update(&self, id: i64, payload: &Value) -> Result<(), StoreError> {
        validate_id("id", id)?;
        let draft = validate_product(payload)?;
        self.gateway
            .transaction(move |session| Box::pin(replace_product(session, id, draft)))
            .await?;
        info!(product_id = id, "product updated");
        Ok(())
    }

    /// Remove a product nothing references any more.
    ///
    /// The product row is locked first, so no order can start referencing it
    /// between the reference checks and the delete.
    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        validate_id("id", id)?;
        self.gateway
            .transaction(move |session| Box::pin(delete_product(session, id)))
            .await?;
        info!(product_id = id, "product deleted");
        Ok(())
    }

    pub async fn search(
        &self,
        filters: &ProductFilters,
        pagination: Pagination,
    ) -> Result<Page<Product>, StoreError> {
        validate_product_filters(filters)?;
        let pagination = validate_pagination(pagination)?;
        let (count, page) = filters::product_page(filters, pagination);
        fetch_page(&*self.gateway, count, page, pagination, product_from_row).await
    }

    /// Newest-first listing of every product.
    pub async fn find_all(&self, pagination: Pagination) -> Result<Page<Product>, StoreError> {
        let pagination = validate_pagination(pagination)?;
        let count = Statement::new(sql::COUNT_PRODUCTS);
        let page = Statement::new(sql::SELECT_PRODUCTS_PAGE)
            .bind(pagination.limit)
            .bind(pagination.offset());
        fetch_page(&*self.gateway, count, page, pagination, product_from_row).await
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let out = self.gateway.query(Statement::new(sql::COUNT_PRODUCTS)).await?;
        count_from(&out.rows)
    }

    /// Non-locking probe: is there at least `quantity` in stock right now?
    pub async fn check_stock(&self, id: i64, quantity: i64) -> Result<bool, StoreError> {
        validate_quantity(quantity)?;
        let product = self
            .find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::not_found(Entity::Product, id))?;
        Ok(product.stock >= quantity)
    }
}

// ---------------------------------------------------------------------------
// Units of work
// ---------------------------------------------------------------------------

async fn insert_product<S: Session + ?Sized>(
    session: &mut S,
    draft: ProductDraft,
) -> Result<i64, StoreError> {
    let out = session
        .query(
            Statement::new(sql::INSERT_PRODUCT)
                .bind(draft.name)
                .bind(draft.description)
                .bind(draft.price)
                .bind(draft.stock),
        )
        .await?;
    returned_id(&out.rows)
}

async fn replace_product<S: Session + ?Sized>(
    session: &mut S,
    id: i64,
    draft: ProductDraft,
) -> Result<(), StoreError> {
    lock_product(session, id)
        .await?
        .ok_or_else(|| StoreError::not_found(Entity::Product, id))?;
    session
        .query(
            Statement::new(sql::UPDATE_PRODUCT)
                .bind(id)
                .bind(draft.name)
                .bind(draft.description)
                .bind(draft.price)
                .bind(draft.stock),
        )
        .await?;
    Ok(())
}

async fn delete_product<S: Session + ?Sized>(session: &mut S, id: i64) -> Result<(), StoreError> {
    lock_product(session, id)
        .await?
        .ok_or_else(|| StoreError::not_found(Entity::Product, id))?;

    let active = session
        .query(Statement::new(sql::COUNT_ACTIVE_ORDER_REFS).bind(id))
        .await?;
    if count_from(&active.rows)? > 0 {
        return Err(StoreError::Conflict(format!(
            "product {id} is referenced by pending or processing orders"
        )));
    }

    let any = session
        .query(Statement::new(sql::COUNT_ORDER_REFS).bind(id))
        .await?;
    if count_from(&any.rows)? > 0 {
        return Err(StoreError::Conflict(format!(
            "product {id} is referenced by past orders"
        )));
    }

    session
        .query(Statement::new(sql::DELETE_PRODUCT).bind(id))
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Session-level helpers
// ---------------------------------------------------------------------------

pub(crate) async fn lock_product<S: Session + ?Sized>(
    session: &mut S,
    id: i64,
) -> Result<Option<Product>, StoreError> {
    let out = session
        .query(Statement::new(sql::LOCK_PRODUCT_BY_ID).bind(id))
        .await?;
    out.first().map(product_from_row).transpose()
}

pub(crate) fn ensure_available(product: &Product, requested: i64) -> Result<(), StoreError> {
    if product.stock < requested {
        return Err(StoreError::InsufficientStock {
            product_id: product.id,
            name: product.name.clone(),
            available: product.stock,
            requested,
        });
    }
    Ok(())
}

/// Caller must hold the row lock and have checked availability.
pub(crate) async fn debit<S: Session + ?Sized>(
    session: &mut S,
    id: i64,
    quantity: i64,
) -> Result<i64, StoreError> {
    let out = session
        .query(Statement::new(sql::DEBIT_STOCK).bind(id).bind(quantity))
        .await?;
    remaining_stock(id, &out.rows)
}

pub(crate) async fn credit<S: Session + ?Sized>(
    session: &mut S,
    id: i64,
    quantity: i64,
) -> Result<i64, StoreError> {
    let out = session
        .query(Statement::new(sql::CREDIT_STOCK).bind(id).bind(quantity))
        .await?;
    remaining_stock(id, &out.rows)
}

fn remaining_stock(id: i64, rows: &[Row]) -> Result<i64, StoreError> {
    match rows.first() {
        Some(row) => row.int("stock"),
        None => Err(StoreError::not_found(Entity::Product, id)),
    }
}

/// Run the count statement, then the page statement unless the count is zero.
pub(crate) async fn fetch_page<G, T>(
    gateway: &G,
    count: Statement,
    page: Statement,
    pagination: Pagination,
    decode: fn(&Row) -> Result<T, StoreError>,
) -> Result<Page<T>, StoreError>
where
    G: Gateway,
{
    let total = count_from(&gateway.query(count).await?.rows)?;
    if total == 0 {
        return Ok(Page::empty(pagination));
    }
    let out = gateway.query(page).await?;
    let items = out.rows.iter().map(decode).collect::<Result<Vec<_>, _>>()?;
    Ok(Page::new(items, total, pagination))
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

pub(crate) fn product_from_row(row: &Row) -> Result<Product, StoreError> {
    Ok(Product {
        id: row.int("id")?,
        name: row.text("name")?,
        description: row.text("description")?,
        price: row.decimal("price")?,
        stock: row.int("stock")?,
        created_at: row.timestamp("created_at")?,
        updated_at: row.timestamp("updated_at")?,
    })
}

/// `n` from a `select count(*) as n` result.
pub(crate) fn count_from(rows: &[Row]) -> Result<i64, StoreError> {
    match rows.first() {
        Some(row) => row.int("n"),
        None => Ok(0),
    }
}

pub(crate) fn returned_id(rows: &[Row]) -> Result<i64, StoreError> {
    match rows.first() {
        Some(row) => row.int("id"),
        None => Err(StoreError::transaction(
            stk_db::StoreOp::Decode,
            "insert returned no id",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn product(stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: 2,
            name: "Frites maison".into(),
            description: "Pommes de terre fraiches".into(),
            price: Decimal::new(350, 2),
            stock,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn shortfall_reports_available_and_requested() {
        match ensure_available(&product(3), 5).unwrap_err() {
            StoreError::InsufficientStock {
                product_id,
                available,
                requested,
                ..
            } => {
                assert_eq!(product_id, 2);
                assert_eq!(available, 3);
                assert_eq!(requested, 5);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(ensure_available(&product(5), 5).is_ok());
    }

    #[test]
    fn product_row_decodes() {
        let now = Utc::now();
        let row = Row::new()
            .with("id", 9_i64)
            .with("name", "Burger Classic")
            .with("description", "Steak, cheddar, salade")
            .with("price", Decimal::new(1250, 2))
            .with("stock", 4_i64)
            .with("created_at", now)
            .with("updated_at", now);
        let p = product_from_row(&row).unwrap();
        assert_eq!(p.id, 9);
        assert_eq!(p.stock, 4);
        assert_eq!(p.price, Decimal::new(1250, 2));
    }

    #[test]
    fn count_of_empty_result_is_zero() {
        assert_eq!(count_from(&[]).unwrap(), 0);
        assert_eq!(count_from(&[Row::new().with("n", 7_i64)]).unwrap(), 7);
    }
}
