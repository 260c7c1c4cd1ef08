//! Configuration des extractions
//!
//! Une configuration décrit la matrice climatique (modèles, période de
//! référence, périodes futures, scénarios), la série temporelle échantillonnée
//! et les réglages du batch. Elle se charge depuis un fichier JSON ou depuis
//! un preset embarqué (`ssr`, `quick`).

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractConfig {
    pub climate: ClimateConfig,
    pub timeseries: TimeseriesConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Matrice modèle × scénario × période
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClimateConfig {
    /// Collection raster du backend
    pub collection: String,
    /// Étiquette de source enregistrée avec le résultat
    pub source: String,
    #[serde(default)]
    pub methodology: String,
    /// Modèles moyennés en ensemble
    pub models: Vec<String>,
    /// Échelle de réduction (m)
    pub scale_m: f64,
    /// Période de référence (scénario historique)
    pub baseline: PeriodSpec,
    /// Périodes futures
    pub periods: Vec<PeriodSpec>,
    pub scenarios: Vec<ScenarioSpec>,
    /// Cellule dont la présence rend un enregistrement "complet"
    pub complete_when: CompletenessProbe,
}

/// Fenêtre temporelle nommée
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PeriodSpec {
    pub id: String,
    pub name: String,
    /// Date de début (YYYY-MM-DD, incluse)
    pub start: String,
    /// Date de fin (YYYY-MM-DD, incluse)
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScenarioSpec {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CompletenessProbe {
    pub scenario: String,
    pub period: String,
}

/// Série temporelle échantillonnée sur la grille de la frontière
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeseriesConfig {
    pub collection: String,
    pub model: String,
    pub band: String,
    /// Pas de la grille (degrés)
    pub resolution_deg: f64,
    pub scale_m: f64,
    pub historical: YearRange,
    pub future: YearRange,
    pub future_scenario: String,
}

/// Plage d'années `start..=end` par pas de `step`
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
    pub step: u32,
}

impl YearRange {
    pub fn years(&self) -> impl Iterator<Item = i32> {
        (self.start..=self.end).step_by(self.step.max(1) as usize)
    }
}

/// Réglages du batch
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Pause minimale entre deux régions (ms)
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
    /// Délai maximal par région à la première tentative (s)
    #[serde(default = "default_region_timeout_secs")]
    pub region_timeout_secs: u64,
    /// Facteur appliqué au délai à chaque nouvelle tentative
    #[serde(default = "default_retry_multiplier")]
    pub retry_timeout_multiplier: u32,
}

fn default_rate_limit_ms() -> u64 {
    2000
}

fn default_region_timeout_secs() -> u64 {
    300
}

fn default_retry_multiplier() -> u32 {
    2
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            rate_limit_ms: default_rate_limit_ms(),
            region_timeout_secs: default_region_timeout_secs(),
            retry_timeout_multiplier: default_retry_multiplier(),
        }
    }
}

impl BatchConfig {
    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn region_timeout(&self) -> Duration {
        Duration::from_secs(self.region_timeout_secs)
    }
}

impl ExtractConfig {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "ssr" => Self::load_embedded(include_str!("presets/ssr.json")),
            "quick" => Self::load_embedded(include_str!("presets/quick.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: ssr, quick", preset),
        }
    }

    /// Preset si le nom est connu, sinon chemin vers un fichier JSON
    pub fn resolve(spec: &str) -> Result<Self> {
        match spec {
            "ssr" | "quick" => Self::from_preset(spec),
            path => Self::load(Path::new(path)),
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse embedded config")?;
        config.validate()?;
        Ok(config)
    }

    /// Vérifie la cohérence de la matrice
    pub fn validate(&self) -> Result<()> {
        let climate = &self.climate;
        if climate.models.is_empty() {
            anyhow::bail!("Config declares no climate model");
        }
        if climate.scenarios.is_empty() || climate.periods.is_empty() {
            anyhow::bail!("Config declares an empty scenario × period matrix");
        }
        if !(climate.scale_m > 0.0) || !(self.timeseries.scale_m > 0.0) {
            anyhow::bail!("Reduction scale must be positive");
        }
        if !(self.timeseries.resolution_deg > 0.0) {
            anyhow::bail!("Timeseries resolution must be positive");
        }
        if self.timeseries.historical.step == 0 || self.timeseries.future.step == 0 {
            anyhow::bail!("Timeseries year step must be at least 1");
        }

        let mut period_ids = HashSet::new();
        for period in &climate.periods {
            if period.id == climate.baseline.id {
                anyhow::bail!("Period {} duplicates the baseline id", period.id);
            }
            if !period_ids.insert(period.id.as_str()) {
                anyhow::bail!("Duplicate period id: {}", period.id);
            }
        }

        let mut scenario_ids = HashSet::new();
        for scenario in &climate.scenarios {
            if !scenario_ids.insert(scenario.id.as_str()) {
                anyhow::bail!("Duplicate scenario id: {}", scenario.id);
            }
        }

        let probe = &climate.complete_when;
        if !scenario_ids.contains(probe.scenario.as_str()) || !period_ids.contains(probe.period.as_str())
        {
            anyhow::bail!(
                "Completeness probe {}/{} is not part of the matrix",
                probe.scenario,
                probe.period
            );
        }

        Ok(())
    }
}
