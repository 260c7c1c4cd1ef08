//! Stress hydrique par sous-bassin (Aqueduct)
//!
//! Chaque sous-bassin intersecté est une unité d'analyse pondérée par sa
//! surface. Les deux indicateurs sont agrégés séparément: un sous-bassin
//! sentinelle pour l'un peut contribuer à l'autre.

use serde::Serialize;
use tracing::debug;
use zonal::estimators::round_to;
use zonal::{aggregate_categorized, Aggregate, AnalysisUnit, CategoryTable, RegionGeometry};
use zonal::{DROUGHT_RISK, WATER_STRESS};

use crate::backend::AnalyticsBackend;
use crate::error::{ErrorTally, ExtractError, FailureKind};
use crate::reducer::ZonalReducer;

pub const SOURCE: &str = "WRI Aqueduct 4.0";
pub const COLLECTION: &str = "WRI/Aqueduct_Water_Risk/V4/baseline_annual";

const BWS_FIELD: &str = "bws_raw";
const DRR_FIELD: &str = "drr_raw";
const AREA_FIELD: &str = "area_km2";

/// Un indicateur agrégé sur les sous-bassins
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSummary {
    pub value: Option<f64>,
    pub category: Option<&'static str>,
    pub contributing_units: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_available_reason: Option<&'static str>,
}

impl From<Aggregate> for IndicatorSummary {
    fn from(aggregate: Aggregate) -> Self {
        Self {
            value: aggregate.value.map(|v| round_to(v, 4)),
            category: aggregate.category,
            contributing_units: aggregate.contributing_units,
            not_available_reason: aggregate.reason.map(|r| r.describe()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WaterStressDataset {
    pub source: String,
    pub sub_basins_count: usize,
    pub baseline_water_stress: IndicatorSummary,
    pub drought_risk: IndicatorSummary,
    pub data_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub errors: ErrorTally,
}

pub async fn extract<B: AnalyticsBackend>(
    reducer: &ZonalReducer<B>,
    region: &RegionGeometry,
) -> Result<WaterStressDataset, ExtractError> {
    let features = reducer
        .unit_features(COLLECTION, region.bounds(), AREA_FIELD)
        .await
        .map_err(ExtractError::from_backend)?;
    debug!(region = %region.id(), sub_basins = features.len(), "Sub-basins intersected");

    let bws_units: Vec<AnalysisUnit> = features.iter().map(|f| f.unit(BWS_FIELD)).collect();
    let drr_units: Vec<AnalysisUnit> = features.iter().map(|f| f.unit(DRR_FIELD)).collect();

    let mut errors = ErrorTally::default();
    let bws = summarize(&bws_units, &WATER_STRESS, &mut errors);
    let drr = summarize(&drr_units, &DROUGHT_RISK, &mut errors);

    let data_available = bws.value.is_some() || drr.value.is_some();
    let note = if features.is_empty() {
        Some("No Aqueduct sub-basins intersect this area".to_string())
    } else if !data_available {
        Some("No water stress data".to_string())
    } else {
        None
    };

    Ok(WaterStressDataset {
        source: SOURCE.to_string(),
        sub_basins_count: features.len(),
        baseline_water_stress: bws,
        drought_risk: drr,
        data_available,
        note,
        errors,
    })
}

fn summarize(units: &[AnalysisUnit], table: &CategoryTable, errors: &mut ErrorTally) -> IndicatorSummary {
    let aggregate = aggregate_categorized(units, table);
    if let Some(reason) = aggregate.reason {
        errors.record(
            FailureKind::NoDataAvailable,
            format!("{}: {}", table.name, reason.describe()),
        );
    }
    aggregate.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::testing::{unit_square, ScriptedBackend};
    use serde_json::json;

    #[tokio::test]
    async fn test_weighted_sub_basins() {
        let backend = ScriptedBackend::default().with_features(vec![
            json!({ "bws_raw": 0.1, "drr_raw": 0.5, "area_km2": 10.0 }),
            json!({ "bws_raw": 0.3, "drr_raw": -9999, "area_km2": 30.0 }),
            json!({ "bws_raw": -9999, "drr_raw": 0.7, "area_km2": 10.0 }),
        ]);
        let reducer = ZonalReducer::new(backend);

        let result = extract(&reducer, &unit_square()).await.unwrap();
        assert_eq!(result.sub_basins_count, 3);
        assert_eq!(result.baseline_water_stress.value, Some(0.25));
        assert_eq!(result.baseline_water_stress.category, Some("Medium-High"));
        assert_eq!(result.baseline_water_stress.contributing_units, 2);
        assert_eq!(result.drought_risk.value, Some(0.6));
        assert_eq!(result.drought_risk.category, Some("Medium-High"));
        assert!(result.data_available);
        assert_eq!(result.errors.total(), 0);
    }

    #[tokio::test]
    async fn test_default_area_weight() {
        let backend = ScriptedBackend::default().with_features(vec![
            json!({ "bws_raw": 0.1 }),
            json!({ "bws_raw": 0.3 }),
        ]);
        let reducer = ZonalReducer::new(backend);

        let result = extract(&reducer, &unit_square()).await.unwrap();
        assert_eq!(result.baseline_water_stress.value, Some(0.2));
        assert_eq!(result.drought_risk.value, None);
        assert!(result.data_available);
    }

    #[tokio::test]
    async fn test_zero_area_unit_has_no_weight() {
        let backend = ScriptedBackend::default().with_features(vec![json!({
            "bws_raw": 0.5, "drr_raw": 0.5, "area_km2": 0.0
        })]);
        let reducer = ZonalReducer::new(backend);

        let result = extract(&reducer, &unit_square()).await.unwrap();
        assert_eq!(result.baseline_water_stress.value, None);
        assert_eq!(
            result.baseline_water_stress.not_available_reason,
            Some("valid units have zero total area weight")
        );
        assert_eq!(result.drought_risk.value, None);
    }

    #[tokio::test]
    async fn test_zero_or_sentinel_area_does_not_dilute() {
        let backend = ScriptedBackend::default().with_features(vec![
            json!({ "bws_raw": 0.1, "area_km2": 10.0 }),
            json!({ "bws_raw": 0.9, "area_km2": 0.0 }),
            json!({ "bws_raw": 0.7, "area_km2": -9999 }),
            json!({ "bws_raw": 0.5, "area_km2": -3.0 }),
        ]);
        let reducer = ZonalReducer::new(backend);

        let result = extract(&reducer, &unit_square()).await.unwrap();
        assert_eq!(result.baseline_water_stress.value, Some(0.1));
        assert_eq!(result.baseline_water_stress.contributing_units, 1);
    }

    #[tokio::test]
    async fn test_null_area_defaults_to_unit_weight() {
        let backend = ScriptedBackend::default().with_features(vec![
            json!({ "bws_raw": 0.1, "area_km2": null }),
            json!({ "bws_raw": 0.3, "area_km2": 1.0 }),
        ]);
        let reducer = ZonalReducer::new(backend);

        let result = extract(&reducer, &unit_square()).await.unwrap();
        assert_eq!(result.baseline_water_stress.value, Some(0.2));
        assert_eq!(result.baseline_water_stress.contributing_units, 2);
    }

    #[tokio::test]
    async fn test_no_units_vs_all_sentinel() {
        let reducer = ZonalReducer::new(ScriptedBackend::default().with_features(vec![]));
        let none = extract(&reducer, &unit_square()).await.unwrap();
        assert!(!none.data_available);
        assert_eq!(
            none.baseline_water_stress.not_available_reason,
            Some("no analysis units intersect this area")
        );

        let reducer = ZonalReducer::new(
            ScriptedBackend::default().with_features(vec![json!({ "bws_raw": -9999, "drr_raw": -9999 })]),
        );
        let sentinel = extract(&reducer, &unit_square()).await.unwrap();
        assert!(!sentinel.data_available);
        assert_eq!(sentinel.baseline_water_stress.value, None);
        assert_eq!(
            sentinel.baseline_water_stress.not_available_reason,
            Some("all intersecting units carry the no-data sentinel")
        );
        assert_eq!(sentinel.errors.count(FailureKind::NoDataAvailable), 2);
    }

    #[tokio::test]
    async fn test_backend_error_propagates() {
        let backend = ScriptedBackend {
            features: Some(Err(BackendError::Transport("reset".into()))),
            ..Default::default()
        };
        let reducer = ZonalReducer::new(backend);
        let err = extract(&reducer, &unit_square()).await.unwrap_err();
        assert!(matches!(err, ExtractError::Backend(_)));
    }
}
