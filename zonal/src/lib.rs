//! # zonal
//!
//! Briques de calcul pour les statistiques zonales d'aires protégées.
//!
//! ## Features
//!
//! - Échantillonnage déterministe d'une frontière sur une grille régulière
//! - Agrégation pondérée par surface de plusieurs unités d'analyse, avec
//!   exclusion des sentinelles "pas de donnée"
//! - Tables de catégories ordinales (stress hydrique, risque de sécheresse)
//! - Estimateurs empiriques (nuits tropicales, jours de gel, jours secs)
//! - Types `geo` pour l'interopérabilité avec l'écosystème Rust géospatial
//!
//! ## Usage
//!
//! ```rust
//! use zonal::{aggregate, sample_grid, AnalysisUnit, RegionGeometry};
//!
//! let square = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
//! let region = RegionGeometry::from_rings("demo", Some(&square), Some(&square)).unwrap();
//! let grid = sample_grid(&region, 0.5).unwrap();
//! assert_eq!(grid.len(), 9);
//!
//! let units = [AnalysisUnit::new(Some(10.0), 1.0), AnalysisUnit::new(Some(20.0), 3.0)];
//! assert_eq!(aggregate(&units).value, Some(17.5));
//! ```

pub mod aggregate;
pub mod category;
pub mod error;
pub mod estimators;
pub mod sampling;
pub mod types;

pub use aggregate::{aggregate, aggregate_categorized, Aggregate, AnalysisUnit, NotAvailableReason, SENTINEL};
pub use category::{CategoryTable, DROUGHT_RISK, PRECIP_DROUGHT_RISK, WATER_STRESS};
pub use error::ZonalError;
pub use sampling::{sample_grid, sample_ring, SamplePointSet};
pub use types::{RegionGeometry, Statistic, ZonalStats};
