// Route comparison - actual vs baseline intensity

use std::sync::Arc;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::ComplianceError;
use crate::math;
use crate::ports::RouteStore;

/// Request to compare a measured intensity against a baseline.
#[derive(Debug, Clone)]
pub struct ComparisonRequest {
    pub route_id: String,
    pub actual_intensity: f64,
    /// When omitted, the route must exist and the baseline falls back to
    /// the configured regulatory target.
    pub baseline_intensity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub actual_intensity: f64,
    pub baseline_intensity: f64,
    pub percent_difference: f64,
    pub compliant: bool,
}

pub struct ComparisonEngine {
    config: EngineConfig,
    routes: Arc<dyn RouteStore>,
}

impl ComparisonEngine {
    pub fn new(config: EngineConfig, routes: Arc<dyn RouteStore>) -> Self {
        ComparisonEngine { config, routes }
    }

    pub fn compare(
        &self,
        request: &ComparisonRequest,
    ) -> Result<ComparisonReport, ComplianceError> {
        let baseline = match request.baseline_intensity {
            Some(baseline) => baseline,
            None => {
                if self.routes.route_by_id(&request.route_id)?.is_none() {
                    return Err(ComplianceError::NotFound(format!(
                        "Route not found: {}",
                        request.route_id
                    )));
                }
                // No per-route baseline is stored; the regulatory target
                // stands in.
                self.config.target_intensity
            }
        };

        let percent_difference = math::percent_difference(request.actual_intensity, baseline)?;

        Ok(ComparisonReport {
            actual_intensity: request.actual_intensity,
            baseline_intensity: baseline,
            percent_difference,
            // Compliance means the measured intensity does not exceed the
            // baseline.
            compliant: request.actual_intensity <= baseline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::types::Route;

    fn engine_with_route(route_id: Option<&str>) -> ComparisonEngine {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        if let Some(id) = route_id {
            store
                .upsert_route(&Route {
                    id: id.to_string(),
                    origin: "Rotterdam".to_string(),
                    destination: "Singapore".to_string(),
                    distance_km: None,
                })
                .unwrap();
        }
        ComparisonEngine::new(EngineConfig::new(100.0, 1.0), store)
    }

    #[test]
    fn test_explicit_baseline() {
        let engine = engine_with_route(None);
        let report = engine
            .compare(&ComparisonRequest {
                route_id: "r-1".to_string(),
                actual_intensity: 75.0,
                baseline_intensity: Some(50.0),
            })
            .unwrap();

        assert!((report.percent_difference - 50.0).abs() < 1e-9);
        assert!(!report.compliant); // 75 > 50
    }

    #[test]
    fn test_baseline_defaults_to_target_for_known_route() {
        let engine = engine_with_route(Some("r-1"));
        let report = engine
            .compare(&ComparisonRequest {
                route_id: "r-1".to_string(),
                actual_intensity: 90.0,
                baseline_intensity: None,
            })
            .unwrap();

        assert_eq!(report.baseline_intensity, 100.0);
        assert!(report.compliant); // 90 <= 100
        assert!((report.percent_difference + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_route_without_baseline_is_not_found() {
        let engine = engine_with_route(None);
        let result = engine.compare(&ComparisonRequest {
            route_id: "r-404".to_string(),
            actual_intensity: 90.0,
            baseline_intensity: None,
        });

        assert!(matches!(result, Err(ComplianceError::NotFound(_))));
    }

    #[test]
    fn test_equal_intensities_are_compliant_with_zero_difference() {
        let engine = engine_with_route(None);
        let report = engine
            .compare(&ComparisonRequest {
                route_id: "r-1".to_string(),
                actual_intensity: 89.3368,
                baseline_intensity: Some(89.3368),
            })
            .unwrap();

        assert_eq!(report.percent_difference, 0.0);
        assert!(report.compliant);
    }

    #[test]
    fn test_zero_baseline_fails() {
        let engine = engine_with_route(None);
        let result = engine.compare(&ComparisonRequest {
            route_id: "r-1".to_string(),
            actual_intensity: 10.0,
            baseline_intensity: Some(0.0),
        });

        assert!(matches!(result, Err(ComplianceError::DivisionByZero)));
    }
}
