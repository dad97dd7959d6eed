// Error taxonomy for the compliance ledger
//
// ComplianceError covers programming/data errors and infrastructure failures.
// Business-rule rejections ("non-positive balance", "negative aggregate
// balance", ...) are NOT errors: callers branch on them routinely, so they
// travel as RejectReason values inside the engines' outcome types.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComplianceError {
    /// Non-finite or out-of-range numeric argument. Raised before any
    /// computation or I/O; no partial state change.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Zero baseline in a percent-difference calculation.
    #[error("baseline cannot be zero when calculating percent difference")]
    DivisionByZero,

    /// Referenced route or record is absent.
    #[error("{0}")]
    NotFound(String),

    /// A collaborator write or read did not complete. Surfaced as-is; the
    /// core performs no retries.
    #[error("persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),
}

/// Why a policy check turned a request down. An expected, first-class
/// outcome - the engines return these inside `accepted: false` results
/// instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
    /// Banking requires an actual surplus in the current evaluation.
    NonPositiveBalance { balance: f64 },

    /// Requested amount exceeds historical-plus-current surplus.
    ExceedsAvailableSurplus { requested: f64, available: f64 },

    /// Pool creation with no members.
    EmptyPool,

    /// Sum of member balances is negative; no partial pool is formed.
    NegativeAggregateBalance { total: f64 },

    /// Requested routes with no stored reading for the period.
    MissingReadings { route_ids: Vec<String> },

    /// Allocation would leave a deficit member worse than it entered.
    DeficitWorsened { route_id: String },

    /// Allocation would push a surplus member below zero.
    SurplusWentNegative { route_id: String },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::NonPositiveBalance { balance } => write!(
                f,
                "non-positive balance: compliance balance is {balance} (must be > 0 to bank)"
            ),
            RejectReason::ExceedsAvailableSurplus {
                requested,
                available,
            } => write!(
                f,
                "exceeds available surplus: cannot bank {requested} (available {available})"
            ),
            RejectReason::EmptyPool => write!(f, "pool must have at least one member"),
            RejectReason::NegativeAggregateBalance { total } => write!(
                f,
                "negative aggregate balance: pool total compliance balance is {total}"
            ),
            RejectReason::MissingReadings { route_ids } => write!(
                f,
                "no compliance data for routes: {}",
                route_ids.join(", ")
            ),
            RejectReason::DeficitWorsened { route_id } => write!(
                f,
                "pool allocation failed: deficit member {route_id} would exit worse"
            ),
            RejectReason::SurplusWentNegative { route_id } => write!(
                f,
                "pool allocation failed: surplus member {route_id} would exit negative"
            ),
        }
    }
}
