//! Adaptateur de réduction zonale
//!
//! Couche de traduction entre les composants d'extraction et le backend:
//! - construit les requêtes (géométrie, source, statistiques, échelle)
//! - normalise les clés de réponse (`<bande>_<stat>` ou `<bande>` seule)
//! - convertit sentinelles, `null` et valeurs non finies en "pas de donnée"
//! - applique les conversions d'unités, pour qu'aucune unité brute du backend
//!   ne sorte d'ici

use geo::Polygon;
use serde_json::{Map, Value};
use tracing::debug;
use zonal::{AnalysisUnit, SamplePointSet, Statistic, ZonalStats, SENTINEL};

use crate::backend::{
    to_geojson, AnalyticsBackend, DataSource, FeatureRequest, GroupedSumRequest, ReduceRequest,
    SampleRequest,
};
use crate::error::BackendError;

/// Plafond de pixels par réduction
pub const MAX_PIXELS: f64 = 1e9;

const SECONDS_PER_DAY: f64 = 86_400.0;
const DAYS_PER_YEAR: f64 = 365.0;

/// Conversion d'unités appliquée aux valeurs du backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitConversion {
    #[default]
    Identity,
    /// K → °C (décalage, sans effet sur l'écart-type et le nombre)
    KelvinToCelsius,
    /// kg m⁻² s⁻¹ → mm/jour
    FluxToDailyMm,
    /// kg m⁻² s⁻¹ → mm/an
    FluxToAnnualMm,
    FractionToPercent,
    SquareMetersToKm2,
    SquareMetersToHectares,
}

impl UnitConversion {
    pub fn apply(self, stat: Statistic, value: f64) -> f64 {
        if stat == Statistic::Count {
            return value;
        }
        match self {
            UnitConversion::Identity => value,
            UnitConversion::KelvinToCelsius => match stat {
                Statistic::StdDev => value,
                _ => value - 273.15,
            },
            UnitConversion::FluxToDailyMm => value * SECONDS_PER_DAY,
            UnitConversion::FluxToAnnualMm => value * SECONDS_PER_DAY * DAYS_PER_YEAR,
            UnitConversion::FractionToPercent => value * 100.0,
            UnitConversion::SquareMetersToKm2 => value / 1e6,
            UnitConversion::SquareMetersToHectares => value / 1e4,
        }
    }
}

/// Statistiques demandées et conversion à appliquer
#[derive(Debug, Clone, PartialEq)]
pub struct ReducerSpec {
    pub stats: Vec<Statistic>,
    pub conversion: UnitConversion,
}

impl ReducerSpec {
    pub fn new(stats: &[Statistic], conversion: UnitConversion) -> Self {
        Self {
            stats: stats.to_vec(),
            conversion,
        }
    }
}

/// Résultat normalisé d'une réduction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reduction {
    pub stats: ZonalStats,
    /// Statistiques demandées mais absentes de la réponse
    pub missing: Vec<Statistic>,
}

impl Reduction {
    /// Aucun pixel: aucune statistique disponible
    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

/// Entité vectorielle intersectée, propriétés normalisées
#[derive(Debug, Clone, PartialEq)]
pub struct UnitFeature {
    pub id: Option<String>,
    pub area_km2: f64,
    pub properties: Map<String, Value>,
}

impl UnitFeature {
    /// Unité d'analyse pour un indicateur donné
    pub fn unit(&self, field: &str) -> AnalysisUnit {
        AnalysisUnit {
            id: self.id.clone(),
            raw_value: self.properties.get(field).and_then(Value::as_f64),
            area_km2: self.area_km2,
        }
    }
}

/// Adaptateur unique vers le backend
pub struct ZonalReducer<B> {
    backend: B,
    sentinels: Vec<f64>,
}

impl<B: AnalyticsBackend> ZonalReducer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            sentinels: vec![SENTINEL],
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Réduction d'une bande sur une géométrie
    pub async fn reduce(
        &self,
        geometry: &Polygon,
        source: &DataSource,
        spec: &ReducerSpec,
        scale: f64,
    ) -> Result<Reduction, BackendError> {
        let request = ReduceRequest {
            geometry: to_geojson(geometry),
            source: source.clone(),
            reducers: spec.stats.clone(),
            scale,
            max_pixels: MAX_PIXELS,
        };
        let reply = self.backend.reduce_region(&request).await?;

        let mut reduction = Reduction::default();
        for &stat in &spec.stats {
            let raw = lookup(&reply, &source.band, stat, spec.stats.len() == 1);
            match raw {
                Some(v) => {
                    let value = self.normalize(v).map(|v| spec.conversion.apply(stat, v));
                    reduction.stats.set(stat, value);
                }
                None => reduction.missing.push(stat),
            }
        }

        if !reduction.missing.is_empty() {
            debug!(
                band = %source.band,
                missing = ?reduction.missing,
                "Reduction returned a subset of the requested statistics"
            );
        }
        Ok(reduction)
    }

    /// Valeur de la source en chaque point, dans l'ordre des points
    pub async fn sample(
        &self,
        points: &SamplePointSet,
        source: &DataSource,
        conversion: UnitConversion,
        scale: f64,
    ) -> Result<Vec<Option<f64>>, BackendError> {
        if points.is_empty() {
            return Ok(Vec::new());
        }
        let request = SampleRequest {
            source: source.clone(),
            points: points.points.clone(),
            scale,
        };
        let values = self.backend.sample_points(&request).await?;
        if values.len() != points.len() {
            return Err(BackendError::Decode(format!(
                "sampled {} values for {} points",
                values.len(),
                points.len()
            )));
        }
        Ok(values
            .iter()
            .map(|v| self.normalize(v).map(|v| conversion.apply(Statistic::Mean, v)))
            .collect())
    }

    /// Entités d'une collection vectorielle intersectant la géométrie.
    ///
    /// Les champs numériques sentinelles deviennent `null`. Une surface
    /// absente vaut 1 km²; une surface nulle, négative ou sentinelle rend
    /// l'unité non contributive.
    pub async fn unit_features(
        &self,
        collection: &str,
        geometry: &Polygon,
        area_field: &str,
    ) -> Result<Vec<UnitFeature>, BackendError> {
        let request = FeatureRequest {
            collection: collection.to_string(),
            geometry: to_geojson(geometry),
        };
        let features = self.backend.intersecting_features(&request).await?;

        Ok(features
            .into_iter()
            .map(|mut properties| {
                let area_km2 = match properties.get(area_field) {
                    None | Some(Value::Null) => 1.0,
                    Some(area) => self.normalize(area).unwrap_or(0.0),
                };
                for value in properties.values_mut() {
                    if value.is_number() && self.normalize(value).is_none() {
                        *value = Value::Null;
                    }
                }
                let id = properties.get("id").and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                });
                UnitFeature {
                    id,
                    area_km2,
                    properties,
                }
            })
            .collect())
    }

    /// Somme de `source` regroupée par classe de `group_by`, convertie
    pub async fn grouped_sum(
        &self,
        source: &DataSource,
        group_by: &DataSource,
        geometry: &Polygon,
        conversion: UnitConversion,
        scale: f64,
    ) -> Result<Vec<(i64, f64)>, BackendError> {
        let request = GroupedSumRequest {
            source: source.clone(),
            group_by: group_by.clone(),
            geometry: to_geojson(geometry),
            scale,
            max_pixels: MAX_PIXELS,
        };
        let groups = self.backend.grouped_sum(&request).await?;
        Ok(groups
            .into_iter()
            .filter(|g| g.sum.is_finite() && !self.sentinels.contains(&g.sum))
            .map(|g| (g.class, conversion.apply(Statistic::Sum, g.sum)))
            .collect())
    }

    fn normalize(&self, value: &Value) -> Option<f64> {
        value
            .as_f64()
            .filter(|v| v.is_finite() && !self.sentinels.contains(v))
    }
}

/// Clé `<bande>_<stat>`, ou `<bande>` seule pour un réducteur unique
fn lookup<'a>(reply: &'a Map<String, Value>, band: &str, stat: Statistic, single: bool) -> Option<&'a Value> {
    let suffixed = format!("{}_{}", band, stat.backend_name());
    reply.get(&suffixed).or_else(|| {
        if single {
            reply.get(band)
        } else {
            None
        }
    })
}
