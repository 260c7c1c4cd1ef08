//! Construction du jeu climatique scénario × période
//!
//! Par région: `Uninitialized → BaselineComputed → ScenarioInProgress* → Complete`.
//!
//! La période de référence est réduite une seule fois puis partagée (`Arc`)
//! par toutes les cellules futures: chaque écart est calculé contre la même
//! instance. L'échec d'une bande pour une cellule met ses champs à `None` et
//! le calcul continue; seule une erreur fatale pour la région (géométrie
//! refusée par le backend) interrompt la matrice.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};
use zonal::estimators::{
    absolute_delta, consecutive_dry_days, days_delta, frost_days, percent_delta, round_to,
    tropical_nights,
};
use zonal::{RegionGeometry, Statistic, ZonalStats, PRECIP_DROUGHT_RISK};

use crate::backend::{AnalyticsBackend, DataSource};
use crate::config::{ClimateConfig, PeriodSpec, ScenarioSpec};
use crate::error::{ErrorTally, ExtractError, FailureKind};
use crate::reducer::{ReducerSpec, UnitConversion, ZonalReducer};

/// Scénario des simulations historiques
pub const HISTORICAL: &str = "historical";

const DAYS_PER_YEAR: f64 = 365.0;

/// État du constructeur pour une région
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderState {
    Uninitialized,
    BaselineComputed,
    ScenarioInProgress { scenario: String },
    Complete,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemperatureIndicators {
    pub mean_c: Option<f64>,
    pub min_c: Option<f64>,
    pub max_c: Option<f64>,
    pub std_c: Option<f64>,
    /// Moyenne des maxima journaliers
    pub daily_max_mean_c: Option<f64>,
    /// Moyenne des minima journaliers
    pub daily_min_mean_c: Option<f64>,
    pub tropical_nights_est: Option<u32>,
    pub frost_days_est: Option<u32>,
}

impl TemperatureIndicators {
    fn from_stats(tas: &ZonalStats, tasmax: &ZonalStats, tasmin: &ZonalStats) -> Self {
        let daily_min_mean_c = tasmin.mean.map(|v| round_to(v, 2));
        Self {
            mean_c: tas.mean.map(|v| round_to(v, 2)),
            min_c: tas.min.map(|v| round_to(v, 2)),
            max_c: tas.max.map(|v| round_to(v, 2)),
            std_c: tas.std_dev.map(|v| round_to(v, 2)),
            daily_max_mean_c: tasmax.mean.map(|v| round_to(v, 2)),
            daily_min_mean_c,
            tropical_nights_est: tropical_nights(daily_min_mean_c),
            frost_days_est: frost_days(daily_min_mean_c),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PrecipitationIndicators {
    pub daily_mean_mm: Option<f64>,
    pub annual_mm: Option<f64>,
    pub consecutive_dry_days_est: Option<u32>,
    pub drought_risk: Option<&'static str>,
}

impl PrecipitationIndicators {
    fn from_stats(pr: &ZonalStats) -> Self {
        Self {
            daily_mean_mm: pr.mean.map(|v| round_to(v, 2)),
            annual_mm: pr.mean.map(|v| round_to(v * DAYS_PER_YEAR, 1)),
            consecutive_dry_days_est: consecutive_dry_days(pr.mean),
            drought_risk: pr.mean.and_then(|v| PRECIP_DROUGHT_RISK.classify(v)),
        }
    }
}

/// Humidité du sol (kg/m²)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SoilMoistureIndicators {
    pub mean_kg_m2: Option<f64>,
    pub std_kg_m2: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunoffIndicators {
    pub annual_mm: Option<f64>,
}

/// Indicateurs d'une période (référence ou future)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodIndicators {
    pub temperature: TemperatureIndicators,
    pub precipitation: PrecipitationIndicators,
    pub soil_moisture: SoilMoistureIndicators,
    pub runoff: RunoffIndicators,
}

/// Période de référence d'une région, calculée une fois
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Baseline {
    pub period: String,
    pub name: String,
    #[serde(flatten)]
    pub indicators: PeriodIndicators,
}

/// Écarts d'une cellule par rapport à la référence
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Deltas {
    pub temperature_change_c: Option<f64>,
    pub temperature_max_change_c: Option<f64>,
    pub temperature_min_change_c: Option<f64>,
    pub precipitation_change_mm: Option<f64>,
    pub precipitation_change_percent: Option<f64>,
    pub soil_moisture_change_percent: Option<f64>,
    pub runoff_change_percent: Option<f64>,
    pub tropical_nights_change: Option<i64>,
    pub dry_days_change: Option<i64>,
}

impl Deltas {
    pub fn between(future: &PeriodIndicators, baseline: &Baseline) -> Self {
        let base = &baseline.indicators;
        let (ft, bt) = (&future.temperature, &base.temperature);
        let (fp, bp) = (&future.precipitation, &base.precipitation);
        Self {
            temperature_change_c: absolute_delta(ft.mean_c, bt.mean_c, 2),
            temperature_max_change_c: absolute_delta(ft.daily_max_mean_c, bt.daily_max_mean_c, 2),
            temperature_min_change_c: absolute_delta(ft.daily_min_mean_c, bt.daily_min_mean_c, 2),
            precipitation_change_mm: absolute_delta(fp.annual_mm, bp.annual_mm, 2),
            precipitation_change_percent: percent_delta(fp.annual_mm, bp.annual_mm, 1),
            soil_moisture_change_percent: percent_delta(
                future.soil_moisture.mean_kg_m2,
                base.soil_moisture.mean_kg_m2,
                1,
            ),
            runoff_change_percent: percent_delta(future.runoff.annual_mm, base.runoff.annual_mm, 1),
            tropical_nights_change: days_delta(ft.tropical_nights_est, bt.tropical_nights_est),
            dry_days_change: days_delta(fp.consecutive_dry_days_est, bp.consecutive_dry_days_est),
        }
    }
}

/// Cellule (scénario, période future)
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioPeriodRecord {
    pub scenario: String,
    pub period: String,
    pub name: String,
    #[serde(flatten)]
    pub indicators: PeriodIndicators,
    pub changes: Deltas,
    #[serde(skip)]
    baseline: Arc<Baseline>,
}

impl ScenarioPeriodRecord {
    /// Référence contre laquelle les écarts ont été calculés
    pub fn baseline(&self) -> &Arc<Baseline> {
        &self.baseline
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioRecord {
    pub description: String,
    pub periods: BTreeMap<String, ScenarioPeriodRecord>,
}

/// Jeu climatique complet d'une région
#[derive(Debug, Clone, Serialize)]
pub struct ClimateDataset {
    pub source: String,
    pub methodology: String,
    pub models_used: Vec<String>,
    pub scale_m: f64,
    pub time_periods: BTreeMap<String, String>,
    #[serde(serialize_with = "serialize_baseline")]
    pub reference: Arc<Baseline>,
    pub scenarios: BTreeMap<String, ScenarioRecord>,
    pub data_available: bool,
    pub errors: ErrorTally,
}

impl ClimateDataset {
    pub fn cell(&self, scenario: &str, period: &str) -> Option<&ScenarioPeriodRecord> {
        self.scenarios.get(scenario)?.periods.get(period)
    }
}

fn serialize_baseline<S: Serializer>(baseline: &Arc<Baseline>, s: S) -> Result<S::Ok, S::Error> {
    baseline.as_ref().serialize(s)
}

/// Constructeur de la matrice climatique pour une région
pub struct ClimateBuilder<'a, B> {
    reducer: &'a ZonalReducer<B>,
    config: &'a ClimateConfig,
    region: &'a RegionGeometry,
    state: BuilderState,
    baseline: Option<Arc<Baseline>>,
    scenarios: BTreeMap<String, ScenarioRecord>,
    tally: ErrorTally,
    requests: usize,
    responses: usize,
    with_values: usize,
}

impl<'a, B: AnalyticsBackend> ClimateBuilder<'a, B> {
    pub fn new(reducer: &'a ZonalReducer<B>, config: &'a ClimateConfig, region: &'a RegionGeometry) -> Self {
        Self {
            reducer,
            config,
            region,
            state: BuilderState::Uninitialized,
            baseline: None,
            scenarios: BTreeMap::new(),
            tally: ErrorTally::default(),
            requests: 0,
            responses: 0,
            with_values: 0,
        }
    }

    pub fn state(&self) -> &BuilderState {
        &self.state
    }

    /// Référence de la région; calculée au premier appel seulement
    pub async fn baseline(&mut self) -> Result<Arc<Baseline>, ExtractError> {
        if let Some(baseline) = &self.baseline {
            return Ok(Arc::clone(baseline));
        }

        let period = &self.config.baseline;
        debug!(region = %self.region.id(), period = %period.id, "Computing baseline");
        let indicators = self.period_indicators(HISTORICAL, period).await?;
        let baseline = Arc::new(Baseline {
            period: period.id.clone(),
            name: period.name.clone(),
            indicators,
        });

        self.baseline = Some(Arc::clone(&baseline));
        self.state = BuilderState::BaselineComputed;
        Ok(baseline)
    }

    /// Calcule une cellule (scénario, période) contre la référence partagée
    pub async fn build_cell(
        &mut self,
        scenario: &ScenarioSpec,
        period: &PeriodSpec,
    ) -> Result<&ScenarioPeriodRecord, ExtractError> {
        let baseline = self.baseline().await?;
        self.state = BuilderState::ScenarioInProgress {
            scenario: scenario.id.clone(),
        };

        let indicators = self.period_indicators(&scenario.id, period).await?;
        let changes = Deltas::between(&indicators, &baseline);
        let record = ScenarioPeriodRecord {
            scenario: scenario.id.clone(),
            period: period.id.clone(),
            name: period.name.clone(),
            indicators,
            changes,
            baseline,
        };

        let entry = self
            .scenarios
            .entry(scenario.id.clone())
            .or_insert_with(|| ScenarioRecord {
                description: scenario.description.clone(),
                periods: BTreeMap::new(),
            });
        entry.periods.insert(period.id.clone(), record);
        Ok(&entry.periods[&period.id])
    }

    /// Parcourt toute la matrice puis termine
    pub async fn run(mut self) -> Result<ClimateDataset, ExtractError> {
        let config = self.config;
        self.baseline().await?;
        for scenario in &config.scenarios {
            for period in &config.periods {
                self.build_cell(scenario, period).await?;
                info!(
                    region = %self.region.id(),
                    scenario = %scenario.id,
                    period = %period.id,
                    "Cell computed"
                );
            }
        }
        self.finish()
    }

    /// Assemble le jeu; échoue si aucune requête n'a abouti
    pub fn finish(mut self) -> Result<ClimateDataset, ExtractError> {
        if self.responses == 0 {
            return Err(ExtractError::NothingRetrieved {
                attempted: self.requests,
            });
        }
        let reference = match self.baseline.take() {
            Some(baseline) => baseline,
            None => {
                return Err(ExtractError::NothingRetrieved {
                    attempted: self.requests,
                })
            }
        };
        self.state = BuilderState::Complete;

        let config = self.config;
        let time_periods = std::iter::once(&config.baseline)
            .chain(&config.periods)
            .map(|p| (p.id.clone(), p.name.clone()))
            .collect();

        Ok(ClimateDataset {
            source: config.source.clone(),
            methodology: config.methodology.clone(),
            models_used: config.models.clone(),
            scale_m: config.scale_m,
            time_periods,
            reference,
            scenarios: self.scenarios,
            data_available: self.with_values > 0,
            errors: self.tally,
        })
    }

    async fn period_indicators(
        &mut self,
        scenario: &str,
        period: &PeriodSpec,
    ) -> Result<PeriodIndicators, ExtractError> {
        use Statistic::*;
        use UnitConversion::*;

        let spread = [Mean, Min, Max, StdDev];
        let tas = self.fetch("tas", scenario, period, ReducerSpec::new(&spread, KelvinToCelsius)).await?;
        let tasmax = self.fetch("tasmax", scenario, period, ReducerSpec::new(&[Mean], KelvinToCelsius)).await?;
        let tasmin = self.fetch("tasmin", scenario, period, ReducerSpec::new(&[Mean], KelvinToCelsius)).await?;
        let pr = self.fetch("pr", scenario, period, ReducerSpec::new(&[Mean], FluxToDailyMm)).await?;
        let mrso = self.fetch("mrso", scenario, period, ReducerSpec::new(&[Mean, StdDev], Identity)).await?;
        let mrro = self.fetch("mrro", scenario, period, ReducerSpec::new(&[Mean], FluxToAnnualMm)).await?;

        Ok(PeriodIndicators {
            temperature: TemperatureIndicators::from_stats(&tas, &tasmax, &tasmin),
            precipitation: PrecipitationIndicators::from_stats(&pr),
            soil_moisture: SoilMoistureIndicators {
                mean_kg_m2: mrso.mean.map(|v| round_to(v, 2)),
                std_kg_m2: mrso.std_dev.map(|v| round_to(v, 2)),
            },
            runoff: RunoffIndicators {
                annual_mm: mrro.mean.map(|v| round_to(v, 1)),
            },
        })
    }

    /// Une bande pour une cellule; les échecs locaux deviennent des champs vides
    async fn fetch(
        &mut self,
        band: &str,
        scenario: &str,
        period: &PeriodSpec,
        spec: ReducerSpec,
    ) -> Result<ZonalStats, ExtractError> {
        let source = DataSource::new(&self.config.collection, band)
            .with_models(&self.config.models)
            .with_scenario(scenario)
            .with_dates(&period.start, &period.end);
        let label = format!("{} {}/{}", band, scenario, period.id);

        self.requests += 1;
        match self
            .reducer
            .reduce(self.region.bounds(), &source, &spec, self.config.scale_m)
            .await
        {
            Ok(reduction) => {
                self.responses += 1;
                if reduction.is_empty() {
                    self.tally.record(FailureKind::NoDataAvailable, label);
                } else {
                    self.with_values += 1;
                    for stat in &spec.stats {
                        if reduction.stats.get(*stat).is_none() {
                            self.tally.record(
                                FailureKind::PartialFieldMissing,
                                format!("{} {}", label, stat.backend_name()),
                            );
                        }
                    }
                }
                Ok(reduction.stats)
            }
            Err(e) if e.is_region_fatal() => Err(ExtractError::RegionFatal(e)),
            Err(e) => {
                warn!(region = %self.region.id(), request = %label, error = %e, "Band request failed");
                self.tally
                    .record(FailureKind::TransientBackendError, format!("{}: {}", label, e));
                Ok(ZonalStats::default())
            }
        }
    }
}
