//! # anp-extract
//!
//! Extraction reprenable d'indicateurs climatiques et environnementaux pour
//! des aires protégées, depuis un backend d'analyse distant.
//!
//! ## Features
//!
//! - Matrice climatique modèle × scénario × période avec référence unique
//! - Stress hydrique par sous-bassins, biomasse, occupation du sol, mangroves
//! - Séries annuelles de température échantillonnées sur la frontière
//! - Campagnes séquentielles avec délai, pause entre régions et reprise
//! - Avancement persistant: une interruption ne perd que la région en cours

pub mod backend;
pub mod builder;
pub mod config;
pub mod datasets;
pub mod error;
pub mod orchestrator;
pub mod reducer;
pub mod registry;
pub mod report;
pub mod sink;

#[cfg(test)]
mod testing;

pub use backend::{AnalyticsBackend, BackendConfig, DataSource, HttpBackend};
pub use builder::{Baseline, ClimateBuilder, ClimateDataset, ScenarioPeriodRecord};
pub use config::ExtractConfig;
pub use datasets::DatasetKind;
pub use error::{BackendError, ErrorTally, ExtractError, FailureKind};
pub use orchestrator::{BatchOptions, Orchestrator, ProgressStore, RegionState};
pub use reducer::{UnitConversion, ZonalReducer};
pub use registry::{DirectoryRegistry, RegionEntry, RegionRegistry};
pub use report::{BatchReport, BatchStatus};
pub use sink::{JsonFileSink, ResultSink};
