use anyhow::Result;
use serde_json::json;
use stk_schemas::ProductFilters;

use super::{load_payload, print_json, Context};
use crate::ProductCmd;

pub async fn run(ctx: &Context, cmd: ProductCmd) -> Result<()> {
    match cmd {
        ProductCmd::Create { payload } => {
            let id = ctx.stock.create(&load_payload(&payload)?).await?;
            print_json(&json!({ "id": id }))
        }
        ProductCmd::Get { id } => match ctx.stock.find_by_id(id).await? {
            Some(product) => print_json(&product),
            None => anyhow::bail!("product {id} not found"),
        },
        ProductCmd::List { page } => {
            let page = ctx.stock.find_all(ctx.pagination(&page)).await?;
            print_json(&page)
        }
        ProductCmd::Search {
            name,
            min_price,
            max_price,
            in_stock,
            page,
        } => {
            let filters = ProductFilters {
                name,
                min_price,
                max_price,
                in_stock,
            };
            let page = ctx.stock.search(&filters, ctx.pagination(&page)).await?;
            print_json(&page)
        }
        ProductCmd::Update { id, payload } => {
            ctx.stock.update(id, &load_payload(&payload)?).await?;
            print_json(&json!({ "id": id, "updated": true }))
        }
        ProductCmd::Delete { id } => {
            ctx.stock.delete(id).await?;
            print_json(&json!({ "id": id, "deleted": true }))
        }
        ProductCmd::Restock { id, quantity } => {
            let stock = ctx.stock.restock(id, quantity).await?;
            print_json(&json!({ "id": id, "stock": stock }))
        }
        ProductCmd::Debit { id, quantity } => {
            let stock = ctx.stock.update_stock(id, quantity).await?;
            print_json(&json!({ "id": id, "stock": stock }))
        }
    }
}
