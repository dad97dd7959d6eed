// Domain records
//
// Strongly-typed read model for everything the engines exchange with the
// persistence layer. Numeric parsing/validation happens once, at the store
// edge - never inside the engines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A shipping route in scope of the scheme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub origin: String,
    pub destination: String,
    pub distance_km: Option<f64>,
}

/// One fuel/intensity measurement epoch for one route.
///
/// Immutable once fetched for a computation. Stored uniquely per
/// (route_id, period).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityReading {
    pub route_id: String,
    /// Fuel consumption in tonnes (or the agreed input unit).
    pub fuel_consumption: f64,
    /// Measured intensity in gCO2e/MJ.
    pub actual_intensity: f64,
    /// Compliance period, e.g. "2025".
    pub period: String,
}

/// Append-only ledger row: a committed decision to carry `amount` of
/// surplus forward. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankEntry {
    pub id: String,
    pub route_id: String,
    pub amount: f64,
    pub period: String,
    pub created_at: DateTime<Utc>,
}

/// A named collective of routes for a period. Membership is ordered and
/// fixed at creation; there is no add/remove mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub name: String,
    pub member_route_ids: Vec<String>,
}
