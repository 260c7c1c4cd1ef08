//! Occupation du sol (ESA WorldCover) et mangroves

use std::collections::BTreeMap;

use serde::Serialize;
use zonal::estimators::round_to;
use zonal::RegionGeometry;

use crate::backend::{AnalyticsBackend, DataSource};
use crate::error::{ErrorTally, ExtractError, FailureKind};
use crate::reducer::{UnitConversion, ZonalReducer};

pub const SOURCE: &str = "ESA WorldCover 2021";
pub const IMAGE: &str = "ESA/WorldCover/v200/2021";
const CLASS_BAND: &str = "Map";
const SCALE: f64 = 10.0;

pub const MANGROVE_CLASS: i64 = 95;
pub const HERBACEOUS_WETLAND_CLASS: i64 = 90;
/// En dessous, aucune mangrove n'est considérée détectée (km²)
const MIN_MANGROVE_KM2: f64 = 0.01;

/// Classes WorldCover
pub const CLASSES: &[(i64, &str)] = &[
    (10, "Tree cover"),
    (20, "Shrubland"),
    (30, "Grassland"),
    (40, "Cropland"),
    (50, "Built-up"),
    (60, "Bare/sparse vegetation"),
    (70, "Snow and ice"),
    (80, "Permanent water bodies"),
    (90, "Herbaceous wetland"),
    (95, "Mangroves"),
    (100, "Moss and lichen"),
];

pub fn class_name(class: i64) -> Option<&'static str> {
    CLASSES.iter().find(|(c, _)| *c == class).map(|(_, n)| *n)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassArea {
    pub class_id: i64,
    pub area_km2: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LandCoverDataset {
    pub source: String,
    pub resolution_m: f64,
    pub classes: BTreeMap<String, ClassArea>,
    pub total_km2: f64,
    pub data_available: bool,
    pub errors: ErrorTally,
}

#[derive(Debug, Clone, Serialize)]
pub struct MangroveDataset {
    pub source: String,
    pub resolution_m: f64,
    pub data_available: bool,
    pub mangrove_extent_km2: f64,
    pub herbaceous_wetland_km2: Option<f64>,
    pub total_wetland_km2: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub errors: ErrorTally,
}

/// Surface (km²) par classe dans la région
async fn class_areas<B: AnalyticsBackend>(
    reducer: &ZonalReducer<B>,
    region: &RegionGeometry,
) -> Result<Vec<(i64, f64)>, ExtractError> {
    reducer
        .grouped_sum(
            &DataSource::pixel_area(),
            &DataSource::new(IMAGE, CLASS_BAND),
            region.bounds(),
            UnitConversion::SquareMetersToKm2,
            SCALE,
        )
        .await
        .map_err(ExtractError::from_backend)
}

pub async fn extract_land_cover<B: AnalyticsBackend>(
    reducer: &ZonalReducer<B>,
    region: &RegionGeometry,
) -> Result<LandCoverDataset, ExtractError> {
    let groups = class_areas(reducer, region).await?;
    let mut errors = ErrorTally::default();
    let mut classes = BTreeMap::new();
    let mut total = 0.0;

    for (class, area_km2) in groups {
        let Some(name) = class_name(class) else {
            errors.record(FailureKind::PartialFieldMissing, format!("unknown class {}", class));
            continue;
        };
        total += area_km2;
        classes.insert(
            name.to_string(),
            ClassArea {
                class_id: class,
                area_km2: round_to(area_km2, 2),
            },
        );
    }

    if classes.is_empty() {
        errors.record(FailureKind::NoDataAvailable, "no land cover pixels");
    }

    Ok(LandCoverDataset {
        source: SOURCE.to_string(),
        resolution_m: SCALE,
        data_available: !classes.is_empty(),
        classes,
        total_km2: round_to(total, 2),
        errors,
    })
}

pub async fn extract_mangroves<B: AnalyticsBackend>(
    reducer: &ZonalReducer<B>,
    region: &RegionGeometry,
) -> Result<MangroveDataset, ExtractError> {
    let groups = class_areas(reducer, region).await?;
    let mut errors = ErrorTally::default();

    let area_of = |class: i64| {
        groups
            .iter()
            .filter(|(c, _)| *c == class)
            .map(|(_, a)| *a)
            .sum::<f64>()
    };
    let mangrove_km2 = round_to(area_of(MANGROVE_CLASS), 4);

    if mangrove_km2 < MIN_MANGROVE_KM2 {
        errors.record(FailureKind::NoDataAvailable, "no mangrove pixels");
        return Ok(MangroveDataset {
            source: SOURCE.to_string(),
            resolution_m: SCALE,
            data_available: false,
            mangrove_extent_km2: 0.0,
            herbaceous_wetland_km2: None,
            total_wetland_km2: None,
            note: Some(format!(
                "No mangrove pixels detected (class {}) within boundary",
                MANGROVE_CLASS
            )),
            errors,
        });
    }

    let wetland_km2 = round_to(area_of(HERBACEOUS_WETLAND_CLASS), 4);
    Ok(MangroveDataset {
        source: SOURCE.to_string(),
        resolution_m: SCALE,
        data_available: true,
        mangrove_extent_km2: mangrove_km2,
        herbaceous_wetland_km2: Some(wetland_km2),
        total_wetland_km2: Some(round_to(mangrove_km2 + wetland_km2, 4)),
        note: None,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{unit_square, ScriptedBackend};

    #[tokio::test]
    async fn test_land_cover_classes() {
        let backend = ScriptedBackend::default().with_groups(&[
            (10, 12_345_678.0),
            (40, 2_000_000.0),
            (95, 500_000.0),
            (255, 1.0),
        ]);
        let reducer = ZonalReducer::new(backend);

        let result = extract_land_cover(&reducer, &unit_square()).await.unwrap();
        assert!(result.data_available);
        assert_eq!(result.classes["Tree cover"].area_km2, 12.35);
        assert_eq!(result.classes["Cropland"].class_id, 40);
        assert_eq!(result.classes["Mangroves"].area_km2, 0.5);
        assert_eq!(result.total_km2, 14.85);
        assert_eq!(result.errors.count(FailureKind::PartialFieldMissing), 1);
    }

    #[tokio::test]
    async fn test_land_cover_empty() {
        let reducer = ZonalReducer::new(ScriptedBackend::default().with_groups(&[]));
        let result = extract_land_cover(&reducer, &unit_square()).await.unwrap();
        assert!(!result.data_available);
        assert!(result.classes.is_empty());
    }

    #[tokio::test]
    async fn test_mangroves_detected() {
        let backend = ScriptedBackend::default().with_groups(&[(95, 3_250_000.0), (90, 1_000_000.0), (10, 9e9)]);
        let reducer = ZonalReducer::new(backend);

        let result = extract_mangroves(&reducer, &unit_square()).await.unwrap();
        assert!(result.data_available);
        assert_eq!(result.mangrove_extent_km2, 3.25);
        assert_eq!(result.herbaceous_wetland_km2, Some(1.0));
        assert_eq!(result.total_wetland_km2, Some(4.25));
    }

    #[tokio::test]
    async fn test_mangroves_below_threshold() {
        let backend = ScriptedBackend::default().with_groups(&[(95, 5_000.0), (90, 2_000_000.0)]);
        let reducer = ZonalReducer::new(backend);

        let result = extract_mangroves(&reducer, &unit_square()).await.unwrap();
        assert!(!result.data_available);
        assert_eq!(result.mangrove_extent_km2, 0.0);
        assert_eq!(result.errors.count(FailureKind::NoDataAvailable), 1);
    }

    #[test]
    fn test_class_names() {
        assert_eq!(class_name(95), Some("Mangroves"));
        assert_eq!(class_name(100), Some("Moss and lichen"));
        assert_eq!(class_name(0), None);
    }
}
