// Configuration - regulatory constants and process settings
//
// The engines never read free-floating globals: every constructor takes an
// EngineConfig, so tests can swap the target or the conversion factor without
// touching shared state.

use std::path::PathBuf;

/// Regulatory target intensity for the 2025 period, in gCO2e/MJ.
pub const TARGET_INTENSITY_2025: f64 = 89.3368;

/// Energy released per unit of fuel, in MJ (energy in scope = fuel * this).
pub const MJ_PER_FUEL_UNIT: f64 = 41_000.0;

/// Tunables shared by the accounting engines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Target intensity a route is assessed against, gCO2e/MJ.
    pub target_intensity: f64,
    /// Conversion factor from fuel units to MJ of energy in scope.
    pub energy_factor: f64,
}

impl EngineConfig {
    pub fn new(target_intensity: f64, energy_factor: f64) -> Self {
        EngineConfig {
            target_intensity,
            energy_factor,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            target_intensity: TARGET_INTENSITY_2025,
            energy_factor: MJ_PER_FUEL_UNIT,
        }
    }
}

/// Process-level settings for the CLI and the server, loaded from
/// environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Address to bind the HTTP server.
    pub bind_addr: String,
}

impl ProcessConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let db_path = std::env::var("COMPLIANCE_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("compliance.db"));

        let bind_addr = std::env::var("COMPLIANCE_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        ProcessConfig { db_path, bind_addr }
    }
}
