use anyhow::Result;
use serde_json::json;
use stk_inventory::validation::parse_status;
use stk_schemas::OrderFilters;

use super::{load_payload, print_json, Context};
use crate::OrderCmd;

pub async fn run(ctx: &Context, cmd: OrderCmd) -> Result<()> {
    match cmd {
        OrderCmd::Create { payload } => {
            let id = ctx.orders.create(&load_payload(&payload)?).await?;
            print_json(&json!({ "id": id, "status": "pending" }))
        }
        OrderCmd::Get { id } => match ctx.orders.find_by_id(id).await? {
            Some(order) => {
                let total = order.total();
                let total_at_order = order.total_at_order();
                let mut out = serde_json::to_value(&order)?;
                out["total"] = json!(total);
                out["total_at_order"] = json!(total_at_order);
                print_json(&out)
            }
            None => anyhow::bail!("order {id} not found"),
        },
        OrderCmd::List {
            customer,
            status,
            from,
            to,
            page,
        } => {
            let filters = OrderFilters {
                customer_name: customer,
                status: status.as_deref().map(parse_status).transpose()?,
                start_date: from,
                end_date: to,
            };
            let pagination = ctx.pagination(&page);
            let page = if filters == OrderFilters::default() {
                ctx.orders.find_all(pagination).await?
            } else {
                ctx.orders.search(&filters, pagination).await?
            };
            print_json(&page)
        }
        OrderCmd::Status { id, status } => {
            let updated = ctx.orders.update_status(id, &status).await?;
            if !updated {
                anyhow::bail!("order {id} not found");
            }
            print_json(&json!({ "id": id, "status": status }))
        }
        OrderCmd::Delete { id } => {
            ctx.orders.delete(id).await?;
            print_json(&json!({ "id": id, "deleted": true }))
        }
        OrderCmd::Total { id } => {
            let total = ctx.orders.calculate_total(id).await?;
            print_json(&json!({ "id": id, "total": total }))
        }
    }
}
