use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Kind of row a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Product,
    Order,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Product => f.write_str("product"),
            Entity::Order => f.write_str("order"),
        }
    }
}

/// Store step that failed inside the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Connect,
    Begin,
    Commit,
    Rollback,
    Statement,
    Decode,
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StoreOp::Connect => "connect",
            StoreOp::Begin => "begin",
            StoreOp::Commit => "commit",
            StoreOp::Rollback => "rollback",
            StoreOp::Statement => "statement",
            StoreOp::Decode => "decode",
        };
        f.write_str(s)
    }
}

/// Every failure the core can report.
///
/// `Validation` is always raised before the gateway is touched. The other
/// variants leave persisted state exactly as it was before the call: the
/// enclosing transaction has been rolled back by the time the caller sees them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },

    #[error(
        "insufficient stock for product {product_id} ({name}): available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: i64,
        name: String,
        available: i64,
        requested: i64,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store failure during {op}: {source}")]
    Transaction {
        op: StoreOp,
        #[source]
        source: BoxError,
    },
}

impl StoreError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: Entity, id: i64) -> Self {
        StoreError::NotFound { entity, id }
    }

    pub fn transaction(op: StoreOp, source: impl Into<BoxError>) -> Self {
        StoreError::Transaction {
            op,
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_field_and_quantities() {
        let e = StoreError::validation("name", "must be at least 5 characters");
        assert_eq!(e.to_string(), "invalid name: must be at least 5 characters");

        let e = StoreError::InsufficientStock {
            product_id: 2,
            name: "Frites maison".to_string(),
            available: 3,
            requested: 5,
        };
        assert!(e.to_string().contains("available 3, requested 5"));

        let e = StoreError::not_found(Entity::Order, 42);
        assert_eq!(e.to_string(), "order 42 not found");
    }

    #[test]
    fn transaction_error_keeps_source() {
        let e = StoreError::transaction(StoreOp::Commit, "connection reset");
        assert_eq!(e.to_string(), "store failure during commit: connection reset");
        assert!(std::error::Error::source(&e).is_some());
    }
}
