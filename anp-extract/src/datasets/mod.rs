//! Jeux de données extraits par région
//!
//! Le jeu climatique passe par `ClimateBuilder`; les autres sont des
//! extracteurs en une passe. Chaque jeu définit aussi son prédicat
//! d'idempotence: un résultat déjà stocké qui le satisfait n'est pas
//! réextrait.

pub mod biomass;
pub mod land_cover;
pub mod timeseries;
pub mod water_stress;

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use zonal::RegionGeometry;

use crate::backend::AnalyticsBackend;
use crate::builder::ClimateBuilder;
use crate::config::ExtractConfig;
use crate::error::{ErrorTally, ExtractError};
use crate::reducer::ZonalReducer;

/// Type de jeu de données
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum DatasetKind {
    /// Projections climatiques scénario × période
    Climate,
    /// Stress hydrique et risque de sécheresse par sous-bassin
    WaterStress,
    /// Biomasse aérienne
    Biomass,
    /// Occupation du sol par classe
    LandCover,
    /// Étendue de mangroves
    Mangroves,
    /// Série annuelle de température échantillonnée
    Timeseries,
}

impl DatasetKind {
    /// Clé du jeu dans l'enregistrement d'une région
    pub fn key(self) -> &'static str {
        match self {
            DatasetKind::Climate => "climate_projections",
            DatasetKind::WaterStress => "water_stress",
            DatasetKind::Biomass => "gedi_biomass",
            DatasetKind::LandCover => "land_cover",
            DatasetKind::Mangroves => "mangroves",
            DatasetKind::Timeseries => "climate_timeseries",
        }
    }

    /// Étiquette de source enregistrée avec le résultat
    pub fn source_tag(self, config: &ExtractConfig) -> String {
        match self {
            DatasetKind::Climate | DatasetKind::Timeseries => config.climate.source.clone(),
            DatasetKind::WaterStress => water_stress::SOURCE.to_string(),
            DatasetKind::Biomass => biomass::SOURCE.to_string(),
            DatasetKind::LandCover | DatasetKind::Mangroves => land_cover::SOURCE.to_string(),
        }
    }

    /// Le résultat stocké rend une nouvelle extraction inutile
    pub fn is_present(self, stored: &Value, config: &ExtractConfig) -> bool {
        match self {
            DatasetKind::Climate => {
                let probe = &config.climate.complete_when;
                stored["scenarios"][&probe.scenario]["periods"][&probe.period].is_object()
            }
            DatasetKind::WaterStress => stored.is_object() && stored.get("error").is_none(),
            _ => stored["data_available"] == Value::Bool(true),
        }
    }

    /// Vérifie un résultat fraîchement extrait avant de le déclarer complet
    pub fn is_complete(self, data: &Value, config: &ExtractConfig) -> bool {
        match self {
            DatasetKind::Climate => self.is_present(data, config),
            _ => data.is_object(),
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Résultat d'extraction prêt à stocker
#[derive(Debug, Clone)]
pub struct DatasetOutput {
    pub data: Value,
    pub data_available: bool,
    pub errors: ErrorTally,
}

impl DatasetOutput {
    fn encode<T: Serialize>(value: &T, data_available: bool, errors: ErrorTally) -> Result<Self, ExtractError> {
        let data = serde_json::to_value(value).map_err(|e| ExtractError::Encode(e.to_string()))?;
        Ok(Self {
            data,
            data_available,
            errors,
        })
    }
}

/// Extrait un jeu de données pour une région
pub async fn extract<B: AnalyticsBackend>(
    kind: DatasetKind,
    reducer: &ZonalReducer<B>,
    region: &RegionGeometry,
    config: &ExtractConfig,
) -> Result<DatasetOutput, ExtractError> {
    match kind {
        DatasetKind::Climate => {
            let dataset = ClimateBuilder::new(reducer, &config.climate, region).run().await?;
            DatasetOutput::encode(&dataset, dataset.data_available, dataset.errors.clone())
        }
        DatasetKind::WaterStress => {
            let dataset = water_stress::extract(reducer, region).await?;
            DatasetOutput::encode(&dataset, dataset.data_available, dataset.errors.clone())
        }
        DatasetKind::Biomass => {
            let dataset = biomass::extract(reducer, region).await?;
            DatasetOutput::encode(&dataset, dataset.data_available, dataset.errors.clone())
        }
        DatasetKind::LandCover => {
            let dataset = land_cover::extract_land_cover(reducer, region).await?;
            DatasetOutput::encode(&dataset, dataset.data_available, dataset.errors.clone())
        }
        DatasetKind::Mangroves => {
            let dataset = land_cover::extract_mangroves(reducer, region).await?;
            DatasetOutput::encode(&dataset, dataset.data_available, dataset.errors.clone())
        }
        DatasetKind::Timeseries => {
            let dataset = timeseries::extract(reducer, region, &config.timeseries).await?;
            DatasetOutput::encode(&dataset, dataset.data_available, dataset.errors.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_climate_predicate_needs_probe_cell() {
        let config = ExtractConfig::from_preset("ssr").unwrap();
        let done = json!({ "scenarios": { "ssp245": { "periods": { "2041-2070": {} } } } });
        let partial = json!({ "scenarios": { "ssp245": { "periods": { "2011-2040": {} } } } });
        assert!(DatasetKind::Climate.is_present(&done, &config));
        assert!(!DatasetKind::Climate.is_present(&partial, &config));
        assert!(!DatasetKind::Climate.is_present(&Value::Null, &config));
    }

    #[test]
    fn test_single_pass_predicates() {
        let config = ExtractConfig::from_preset("ssr").unwrap();
        assert!(DatasetKind::Biomass.is_present(&json!({ "data_available": true }), &config));
        assert!(!DatasetKind::Biomass.is_present(&json!({ "data_available": false }), &config));
        assert!(!DatasetKind::Mangroves.is_present(&Value::Null, &config));

        // Stress hydrique: "pas de donnée" est un résultat valide
        let no_data = json!({ "data_available": false, "note": "No water stress data" });
        assert!(DatasetKind::WaterStress.is_present(&no_data, &config));
        assert!(!DatasetKind::WaterStress.is_present(&json!({ "error": "boom" }), &config));
    }

    #[test]
    fn test_keys() {
        assert_eq!(DatasetKind::Climate.to_string(), "climate_projections");
        assert_eq!(DatasetKind::Biomass.key(), "gedi_biomass");
    }
}
