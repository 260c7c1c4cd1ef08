//! Biomasse aérienne (GEDI L4A)
//!
//! GEDI échantillonne le sol le long de ses orbites: la couverture varie
//! d'une région à l'autre et une absence d'observation est un résultat
//! légitime.

use serde::Serialize;
use zonal::estimators::round_to;
use zonal::{RegionGeometry, Statistic};

use crate::backend::{AnalyticsBackend, DataSource};
use crate::error::{ErrorTally, ExtractError, FailureKind};
use crate::reducer::{ReducerSpec, UnitConversion, ZonalReducer};

pub const SOURCE: &str = "NASA GEDI L4A (Aboveground Biomass Density)";
pub const COLLECTION: &str = "LARSE/GEDI/GEDI04_A_002_MONTHLY";
const BAND: &str = "agbd";
/// Empreinte GEDI (m)
const FOOTPRINT_SCALE: f64 = 25.0;
const AREA_SCALE: f64 = 100.0;

#[derive(Debug, Clone, Serialize)]
pub struct BiomassDataset {
    pub source: String,
    pub resolution: String,
    pub data_available: bool,
    /// Densité de biomasse (Mg/ha)
    pub agbd_mean_mg_ha: Option<f64>,
    pub agbd_max_mg_ha: Option<f64>,
    pub agbd_std_mg_ha: Option<f64>,
    pub sampled_pixels: Option<u64>,
    pub area_ha: Option<f64>,
    /// Stock de carbone aérien estimé (Mt)
    pub total_carbon_estimate_mt: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub errors: ErrorTally,
}

pub async fn extract<B: AnalyticsBackend>(
    reducer: &ZonalReducer<B>,
    region: &RegionGeometry,
) -> Result<BiomassDataset, ExtractError> {
    use Statistic::*;

    let mut errors = ErrorTally::default();
    let source = DataSource::new(COLLECTION, BAND);
    let spec = ReducerSpec::new(&[Mean, Max, StdDev, Count], UnitConversion::Identity);
    let stats = reducer
        .reduce(region.bounds(), &source, &spec, FOOTPRINT_SCALE)
        .await
        .map_err(ExtractError::from_backend)?
        .stats;

    let observed = stats.count.is_some_and(|c| c > 0.0) && stats.mean.is_some();
    if !observed {
        errors.record(FailureKind::NoDataAvailable, "no GEDI observations");
        return Ok(BiomassDataset {
            source: SOURCE.to_string(),
            resolution: "25m footprints".to_string(),
            data_available: false,
            agbd_mean_mg_ha: None,
            agbd_max_mg_ha: None,
            agbd_std_mg_ha: None,
            sampled_pixels: None,
            area_ha: None,
            total_carbon_estimate_mt: None,
            note: Some("No GEDI observations for this area".to_string()),
            errors,
        });
    }

    for stat in [Max, StdDev] {
        if stats.get(stat).is_none() {
            errors.record(FailureKind::PartialFieldMissing, format!("{}_{}", BAND, stat.backend_name()));
        }
    }

    // Surface de la région: somme des surfaces de pixels
    let area_spec = ReducerSpec::new(&[Sum], UnitConversion::SquareMetersToHectares);
    let area_ha = match reducer
        .reduce(region.bounds(), &DataSource::pixel_area(), &area_spec, AREA_SCALE)
        .await
    {
        Ok(reduction) => reduction.stats.sum.filter(|a| *a > 0.0),
        Err(e) if e.is_region_fatal() => return Err(ExtractError::RegionFatal(e)),
        Err(e) => {
            errors.record(FailureKind::TransientBackendError, format!("pixel area: {}", e));
            None
        }
    };
    if area_ha.is_none() {
        errors.record(FailureKind::PartialFieldMissing, "region area");
    }

    let total_carbon = match (stats.mean, area_ha) {
        (Some(mean), Some(area)) => Some((mean * area / 1000.0).round()),
        _ => None,
    };

    Ok(BiomassDataset {
        source: SOURCE.to_string(),
        resolution: "25m footprints".to_string(),
        data_available: true,
        agbd_mean_mg_ha: stats.mean.map(|v| round_to(v, 2)),
        agbd_max_mg_ha: stats.max.map(|v| round_to(v, 2)),
        agbd_std_mg_ha: stats.std_dev.map(|v| round_to(v, 2)),
        sampled_pixels: stats.count.map(|c| c as u64),
        area_ha: area_ha.map(f64::round),
        total_carbon_estimate_mt: total_carbon,
        note: None,
        errors,
    })
}
