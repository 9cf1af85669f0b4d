//! Offline test support: an in-memory [`stk_db::Gateway`] and payload fixtures.

pub mod fixtures;
pub mod memory;

pub use fixtures::{order_payload, product_payload, seed_menu, Menu};
pub use memory::{CallStats, ItemRow, MemoryGateway, MemorySession, OrderRow, ProductRow, Tables};
