//! Stock and order repositories over a [`stk_db::Gateway`].
//!
//! [`StockRepository`] owns product rows and their stock counter;
//! [`OrderRepository`] coordinates locked product rows, order rows and order
//! lines inside one transaction. Both take the gateway at construction and
//! validate every inbound payload before touching it.

pub mod filters;
pub mod lifecycle;
pub mod orders;
pub mod sql;
pub mod stock;
pub mod validation;

pub use lifecycle::{TransitionError, TransitionPolicy};
pub use orders::OrderRepository;
pub use stock::StockRepository;
