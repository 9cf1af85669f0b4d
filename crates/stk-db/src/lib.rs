//! Transactional store gateway.
//!
//! Repositories talk to storage only through [`Gateway`]: standalone
//! statements via `query`, multi-statement units of work via `transaction`.
//! [`PgGateway`] is the PostgreSQL implementation; the pool it owns is created
//! by the caller at start-up and closed at shutdown.

pub mod error;
pub mod gateway;
pub mod statement;

mod pg;

pub use error::{BoxError, Entity, StoreError, StoreOp};
pub use gateway::{Gateway, Session, UnitOfWork};
pub use pg::{migrate, status, DbStatus, PgGateway, PgSession, PoolSettings, ENV_DB_URL};
pub use statement::{QueryOutput, Row, SqlValue, Statement};
