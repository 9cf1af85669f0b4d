//! Scenario: stock repository operations (in-memory store)
//!
//! # Invariants under test
//!
//! 1. Create/update/find round-trip the validated fields.
//! 2. `update_stock` refuses to go below zero; `restock` adds.
//! 3. Listing is newest-first with correct page metadata.
//! 4. `calculate_total` of an order without lines is zero.
//! 5. A page number whose offset cannot be represented, or a price the
//!    store cannot hold exactly, is a validation error raised before any
//!    store call.

use std::sync::Arc;

use rust_decimal::Decimal;
use stk_db::StoreError;
use stk_inventory::{OrderRepository, StockRepository};
use stk_schemas::Pagination;
use stk_testkit::{product_payload, CallStats, MemoryGateway};

#[tokio::test]
async fn create_update_and_read_back() -> anyhow::Result<()> {
    let gw = Arc::new(MemoryGateway::new());
    let stock = StockRepository::new(Arc::clone(&gw));

    let id = stock
        .create(&product_payload("Burger Classic", 12.5, 10))
        .await?;
    let p = stock.find_by_id(id).await?.expect("product exists");
    assert_eq!(p.name, "Burger Classic");
    assert_eq!(p.price, Decimal::new(125, 1));
    assert_eq!(p.stock, 10);

    stock
        .update(id, &product_payload("Burger Double", 15.0, 4))
        .await?;
    let p = stock.find_by_id(id).await?.expect("product exists");
    assert_eq!(p.name, "Burger Double");
    assert_eq!(p.stock, 4);
    assert!(p.updated_at > p.created_at);

    let err = stock
        .update(id + 1, &product_payload("Burger Double", 15.0, 4))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn debit_and_restock() -> anyhow::Result<()> {
    let gw = Arc::new(MemoryGateway::new());
    let stock = StockRepository::new(Arc::clone(&gw));
    let id = gw
        .seed_product("Frites maison", Decimal::new(350, 2), 3)
        .await;

    assert!(stock.check_stock(id, 3).await?);
    assert!(!stock.check_stock(id, 4).await?);

    assert_eq!(stock.update_stock(id, 2).await?, 1);
    let err = stock.update_stock(id, 2).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientStock {
            available: 1,
            requested: 2,
            ..
        }
    ));
    assert_eq!(gw.stock_of(id).await, Some(1));

    assert_eq!(stock.restock(id, 9).await?, 10);
    assert!(matches!(
        stock.restock(id + 1, 1).await.unwrap_err(),
        StoreError::NotFound { .. }
    ));
    Ok(())
}

#[tokio::test]
async fn listing_is_newest_first_and_paged() -> anyhow::Result<()> {
    let gw = Arc::new(MemoryGateway::new());
    let stock = StockRepository::new(Arc::clone(&gw));

    let mut ids = Vec::new();
    for n in 0..5 {
        ids.push(
            stock
                .create(&product_payload(&format!("Plat numero {n}"), 9.9, n))
                .await?,
        );
    }

    let first = stock.find_all(Pagination::new(2, 1)).await?;
    assert_eq!(first.total, 5);
    assert_eq!(first.max_page, 3);
    assert!(first.has_next);
    let first_ids: Vec<i64> = first.items.iter().map(|p| p.id).collect();
    assert_eq!(first_ids, vec![ids[4], ids[3]]);

    let last = stock.find_all(Pagination::new(2, 3)).await?;
    assert_eq!(last.items.len(), 1);
    assert_eq!(last.items[0].id, ids[0]);
    assert!(!last.has_next);

    assert_eq!(stock.count().await?, 5);
    assert!(stock.find_all(Pagination::new(0, 1)).await.is_err());
    Ok(())
}

#[tokio::test]
async fn empty_store_lists_nothing_and_totals_zero() -> anyhow::Result<()> {
    let gw = Arc::new(MemoryGateway::new());
    let orders = OrderRepository::new(Arc::clone(&gw));

    let page = orders.find_all(Pagination::default()).await?;
    assert!(page.items.is_empty());
    assert_eq!(page.max_page, 0);
    assert_eq!(orders.calculate_total(42).await?, Decimal::ZERO);
    assert_eq!(orders.count().await?, 0);
    Ok(())
}

#[tokio::test]
async fn out_of_range_page_and_price_never_reach_the_store() -> anyhow::Result<()> {
    let gw = Arc::new(MemoryGateway::new());
    let stock = StockRepository::new(Arc::clone(&gw));
    let orders = OrderRepository::new(Arc::clone(&gw));

    let err = stock
        .find_all(Pagination::new(200, i64::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation { ref field, .. } if field == "page"));
    assert!(orders
        .find_all(Pagination::new(50, i64::MAX))
        .await
        .is_err());

    for price in [1e12, 9.99999] {
        let err = stock
            .create(&product_payload("Burger Classic", price, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { ref field, .. } if field == "price"));
    }

    assert_eq!(gw.stats(), CallStats::default());
    Ok(())
}
