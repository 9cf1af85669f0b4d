//! Order lifecycle.
//!
//! # State diagram
//!
//! ```text
//!   create()
//!   ───────► Pending ──────► Processing ──────► Completed (term.)
//!               │
//!               └──────────► Cancelled (term.)
//! ```
//!
//! Deletion is gated on `Pending` regardless of policy. Status updates are
//! gated by [`TransitionPolicy`]: `Permissive` accepts any of the four
//! values from any state, `Strict` only follows the arrows above (plus
//! same-state updates, which are no-ops on the state).

use serde::{Deserialize, Serialize};
use stk_schemas::OrderStatus;

/// How `update_status` treats the current state of the order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Any destination from any source.
    #[default]
    Permissive,
    /// Only the edges of the lifecycle diagram.
    Strict,
}

impl TransitionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionPolicy::Permissive => "permissive",
            TransitionPolicy::Strict => "strict",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "permissive" => Some(TransitionPolicy::Permissive),
            "strict" => Some(TransitionPolicy::Strict),
            _ => None,
        }
    }

    /// Whether moving `from -> to` is allowed under this policy.
    pub fn check(&self, from: OrderStatus, to: OrderStatus) -> Result<(), TransitionError> {
        match self {
            TransitionPolicy::Permissive => Ok(()),
            TransitionPolicy::Strict if from == to || is_edge(from, to) => Ok(()),
            TransitionPolicy::Strict => Err(TransitionError { from, to }),
        }
    }
}

fn is_edge(from: OrderStatus, to: OrderStatus) -> bool {
    use stk_schemas::OrderStatus::*;
    matches!(
        (from, to),
        (Pending, Processing) | (Pending, Cancelled) | (Processing, Completed)
    )
}

/// Statuses reachable in one strict step from `from`.
pub fn next_states(from: OrderStatus) -> Vec<OrderStatus> {
    OrderStatus::ALL
        .into_iter()
        .filter(|to| is_edge(from, *to))
        .collect()
}

/// Returns `true` if no strict transition leaves `status`.
pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(status, OrderStatus::Completed | OrderStatus::Cancelled)
}

/// Only pending orders may be deleted (and have their stock re-credited).
pub fn is_deletable(status: OrderStatus) -> bool {
    status == OrderStatus::Pending
}

/// Rejected status change under [`TransitionPolicy::Strict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal order transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}
