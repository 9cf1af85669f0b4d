/// Migrating twice must be idempotent.
///
/// DB-backed test, skipped if STK_DATABASE_URL is not set.
#[tokio::test]
async fn migrate_idempotent_on_clean_db() -> anyhow::Result<()> {
    let url = match std::env::var(stk_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: STK_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;

    stk_db::migrate(&pool).await?;
    stk_db::migrate(&pool).await?;

    let st = stk_db::status(&pool).await?;
    assert!(st.ok);
    assert!(st.has_products_table);
    assert!(st.has_orders_table);

    Ok(())
}
