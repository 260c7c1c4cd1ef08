//! Capacité "backend d'analyse" consommée par l'adaptateur de réduction
//!
//! Le backend effectue les réductions spatiales sur ses propres rasters et
//! couches vectorielles. Quatre primitives seulement:
//! - `reduce_region`: statistiques d'une bande sur une géométrie
//! - `sample_points`: valeur d'une bande en chaque point
//! - `intersecting_features`: propriétés des entités vectorielles intersectées
//! - `grouped_sum`: somme d'une bande regroupée par classe
//!
//! Seul `ZonalReducer` appelle ces primitives.

pub mod http;

use async_trait::async_trait;
use geo::Polygon;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zonal::Statistic;

use crate::error::BackendError;

pub use http::{BackendConfig, HttpBackend};

/// Source raster nommée: collection + bande + filtre.
///
/// Une collection filtrée est réduite à sa moyenne temporelle côté backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub collection: String,
    pub band: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    /// Date de début incluse (YYYY-MM-DD)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// Date de fin incluse (YYYY-MM-DD)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl DataSource {
    pub fn new(collection: &str, band: &str) -> Self {
        Self {
            collection: collection.to_string(),
            band: band.to_string(),
            models: Vec::new(),
            scenario: None,
            start: None,
            end: None,
        }
    }

    /// Surface de chaque pixel (m²)
    pub fn pixel_area() -> Self {
        Self::new("pixelArea", "area")
    }

    pub fn with_models(mut self, models: &[String]) -> Self {
        self.models = models.to_vec();
        self
    }

    pub fn with_scenario(mut self, scenario: &str) -> Self {
        self.scenario = Some(scenario.to_string());
        self
    }

    pub fn with_dates(mut self, start: &str, end: &str) -> Self {
        self.start = Some(start.to_string());
        self.end = Some(end.to_string());
        self
    }

    /// Année civile complète
    pub fn with_year(self, year: i32) -> Self {
        self.with_dates(&format!("{}-01-01", year), &format!("{}-12-31", year))
    }
}

/// Géométrie GeoJSON envoyée au backend
pub fn to_geojson(polygon: &Polygon) -> geojson::Geometry {
    geojson::Geometry::new(geojson::Value::from(polygon))
}

#[derive(Debug, Clone, Serialize)]
pub struct ReduceRequest {
    pub geometry: geojson::Geometry,
    pub source: DataSource,
    pub reducers: Vec<Statistic>,
    pub scale: f64,
    pub max_pixels: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleRequest {
    pub source: DataSource,
    /// Points [lon, lat], l'ordre de la réponse suit celui-ci
    pub points: Vec<[f64; 2]>,
    pub scale: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureRequest {
    pub collection: String,
    pub geometry: geojson::Geometry,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupedSumRequest {
    /// Bande sommée (typiquement la surface des pixels)
    pub source: DataSource,
    /// Bande de classes servant au regroupement
    pub group_by: DataSource,
    pub geometry: geojson::Geometry,
    pub scale: f64,
    pub max_pixels: f64,
}

/// Une classe et la somme associée
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassSum {
    pub class: i64,
    pub sum: f64,
}

/// Réponse brute d'une réduction: clé → nombre | null
pub type RawReply = Map<String, Value>;

/// Backend d'analyse distant
#[async_trait]
pub trait AnalyticsBackend: Send + Sync {
    async fn reduce_region(&self, request: &ReduceRequest) -> Result<RawReply, BackendError>;

    async fn sample_points(&self, request: &SampleRequest) -> Result<Vec<Value>, BackendError>;

    async fn intersecting_features(
        &self,
        request: &FeatureRequest,
    ) -> Result<Vec<Map<String, Value>>, BackendError>;

    async fn grouped_sum(&self, request: &GroupedSumRequest) -> Result<Vec<ClassSum>, BackendError>;
}
