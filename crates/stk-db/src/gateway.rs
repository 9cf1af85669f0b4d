//! Transactional store gateway contract.
//!
//! # Contract
//! - [`Gateway::query`] runs one statement on a pooled connection and gives
//!   the connection back before returning.
//! - [`Gateway::transaction`] acquires one connection, begins, hands a
//!   [`Session`] to the unit of work, then commits on `Ok` or rolls back on
//!   `Err`. The connection is released on every exit path; implementations
//!   must also roll back if the unit of work panics or its future is dropped.
//! - A `Session` only exposes `query`. Nested transactions cannot be opened
//!   from inside a unit of work; callers pass the session down instead.
//! - No retries happen at this layer.

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::error::StoreError;
use crate::statement::{QueryOutput, Statement};

/// Future returned by a unit of work borrowing its session for `'s`.
pub type UnitOfWork<'s, T> = BoxFuture<'s, Result<T, StoreError>>;

/// A connection bound to one open transaction.
#[async_trait]
pub trait Session: Send {
    async fn query(&mut self, statement: Statement) -> Result<QueryOutput, StoreError>;
}

#[async_trait]
pub trait Gateway: Send + Sync {
    type Session: Session;

    async fn query(&self, statement: Statement) -> Result<QueryOutput, StoreError>;

    async fn transaction<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send,
        F: for<'s> FnOnce(&'s mut Self::Session) -> UnitOfWork<'s, T> + Send;
}
