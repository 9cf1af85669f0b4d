use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

mod commands;

#[derive(Parser)]
#[command(name = "stk")]
#[command(about = "Stock and order engine CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (base -> env -> local).
    /// Without any, built-in defaults are used.
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,

        /// Fail instead of warn when the config carries keys nothing reads.
        #[arg(long, default_value_t = false)]
        strict_keys: bool,
    },

    /// Product and stock commands
    Product {
        #[command(subcommand)]
        cmd: ProductCmd,
    },

    /// Order commands
    Order {
        #[command(subcommand)]
        cmd: OrderCmd,
    },
}

#[derive(Subcommand)]
pub enum DbCmd {
    Status,
    /// Apply embedded SQL migrations.
    Migrate,
}

/// JSON payload given inline or from a file.
#[derive(clap::Args)]
pub struct PayloadArgs {
    /// Payload JSON string
    #[arg(long, conflicts_with = "payload_file")]
    payload: Option<String>,

    /// Path to a payload JSON file
    #[arg(long = "payload-file", conflicts_with = "payload")]
    payload_file: Option<String>,
}

#[derive(clap::Args)]
pub struct PageArgs {
    /// Page size (defaults to pagination.default_limit)
    #[arg(long)]
    limit: Option<i64>,

    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    page: i64,
}

#[derive(Subcommand)]
pub enum ProductCmd {
    /// Create a product from `{name, description, price, stock}`.
    Create {
        #[command(flatten)]
        payload: PayloadArgs,
    },
    Get {
        #[arg(long)]
        id: i64,
    },
    /// Newest-first listing.
    List {
        #[command(flatten)]
        page: PageArgs,
    },
    Search {
        /// Case-insensitive substring of the name
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        min_price: Option<Decimal>,
        #[arg(long)]
        max_price: Option<Decimal>,
        /// Only products with stock > 0
        #[arg(long, default_value_t = false)]
        in_stock: bool,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Replace every field of a product.
    Update {
        #[arg(long)]
        id: i64,
        #[command(flatten)]
        payload: PayloadArgs,
    },
    Delete {
        #[arg(long)]
        id: i64,
    },
    /// Add quantity to stock.
    Restock {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        quantity: i64,
    },
    /// Take quantity off stock.
    Debit {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        quantity: i64,
    },
}

#[derive(Subcommand)]
pub enum OrderCmd {
    /// Place an order from `{customerName, items: [{productId, quantity}]}`.
    Create {
        #[command(flatten)]
        payload: PayloadArgs,
    },
    Get {
        #[arg(long)]
        id: i64,
    },
    /// Newest-first listing, optionally filtered.
    List {
        #[arg(long)]
        customer: Option<String>,
        /// pending | processing | completed | cancelled
        #[arg(long)]
        status: Option<String>,
        /// RFC 3339, inclusive
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// RFC 3339, inclusive
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Set the order status.
    Status {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        status: String,
    },
    /// Delete a pending order and re-credit its stock.
    Delete {
        #[arg(long)]
        id: i64,
    },
    /// Current-price total of an order.
    Total {
        #[arg(long)]
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    let config_paths = cli.config_paths;

    match cli.cmd {
        Commands::Db { cmd } => {
            let ctx = commands::Context::load(&config_paths).await?;
            let result = match cmd {
                DbCmd::Status => {
                    let s = stk_db::status(ctx.gateway.pool()).await?;
                    println!(
                        "db_ok={} has_products_table={} has_orders_table={}",
                        s.ok, s.has_products_table, s.has_orders_table
                    );
                    Ok(())
                }
                DbCmd::Migrate => {
                    stk_db::migrate(ctx.gateway.pool()).await?;
                    println!("migrations_applied=true");
                    Ok(())
                }
            };
            ctx.gateway.close().await;
            result
        }

        Commands::ConfigHash { paths, strict_keys } => {
            commands::config_hash(&paths, strict_keys)
        }

        Commands::Product { cmd } => {
            let ctx = commands::Context::load(&config_paths).await?;
            let result = commands::product::run(&ctx, cmd).await;
            ctx.gateway.close().await;
            result
        }

        Commands::Order { cmd } => {
            let ctx = commands::Context::load(&config_paths).await?;
            let result = commands::order::run(&ctx, cmd).await;
            ctx.gateway.close().await;
            result
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
