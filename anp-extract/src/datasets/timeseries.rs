//! Série annuelle de température échantillonnée sur la grille de la frontière
//!
//! La grille est calculée une fois par région; chaque année est une requête
//! d'échantillonnage dont le vecteur de réponse suit l'ordre des points.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;
use zonal::estimators::round_to;
use zonal::{sample_grid, RegionGeometry};

use crate::backend::{AnalyticsBackend, DataSource};
use crate::builder::HISTORICAL;
use crate::config::TimeseriesConfig;
use crate::error::{ErrorTally, ExtractError, FailureKind};
use crate::reducer::{UnitConversion, ZonalReducer};

#[derive(Debug, Clone, Serialize)]
pub struct TimeseriesDataset {
    pub model: String,
    pub band: String,
    pub grid_resolution_deg: f64,
    pub bbox: [f64; 4],
    /// Points [lon, lat]
    pub points: Vec<[f64; 2]>,
    /// Empreinte de la grille, pour réutiliser un échantillonnage
    pub fingerprint: String,
    /// Année → scénario
    pub scenarios: BTreeMap<String, String>,
    /// Année → °C par point (ou null)
    pub years: BTreeMap<String, Vec<Option<f64>>>,
    pub data_available: bool,
    pub errors: ErrorTally,
}

pub async fn extract<B: AnalyticsBackend>(
    reducer: &ZonalReducer<B>,
    region: &RegionGeometry,
    config: &TimeseriesConfig,
) -> Result<TimeseriesDataset, ExtractError> {
    let grid = sample_grid(region, config.resolution_deg)?;
    let mut errors = ErrorTally::default();
    let mut years = BTreeMap::new();
    let mut scenarios = BTreeMap::new();
    let mut attempted = 0;

    let schedule = config
        .historical
        .years()
        .map(|y| (y, HISTORICAL))
        .chain(config.future.years().map(|y| (y, config.future_scenario.as_str())));

    for (year, scenario) in schedule {
        attempted += 1;
        let source = DataSource::new(&config.collection, &config.band)
            .with_models(std::slice::from_ref(&config.model))
            .with_scenario(scenario)
            .with_year(year);

        match reducer
            .sample(&grid, &source, UnitConversion::KelvinToCelsius, config.scale_m)
            .await
        {
            Ok(values) => {
                if values.iter().all(Option::is_none) {
                    errors.record(FailureKind::NoDataAvailable, format!("{}: all points empty", year));
                }
                years.insert(
                    year.to_string(),
                    values.into_iter().map(|v| v.map(|t| round_to(t, 2))).collect(),
                );
                scenarios.insert(year.to_string(), scenario.to_string());
            }
            Err(e) if e.is_region_fatal() => return Err(ExtractError::RegionFatal(e)),
            Err(e) => {
                warn!(region = %region.id(), year, error = %e, "Year sampling failed");
                errors.record(FailureKind::TransientBackendError, format!("{}: {}", year, e));
            }
        }
    }

    if years.is_empty() {
        return Err(ExtractError::NothingRetrieved { attempted });
    }

    let data_available = years.values().flatten().any(Option::is_some);
    Ok(TimeseriesDataset {
        model: config.model.clone(),
        band: config.band.clone(),
        grid_resolution_deg: grid.resolution,
        bbox: grid.bbox,
        points: grid.points,
        fingerprint: grid.fingerprint,
        scenarios,
        years,
        data_available,
        errors,
    })
}
