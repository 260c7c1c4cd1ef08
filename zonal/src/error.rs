//! Types d'erreurs pour le crate zonal

use thiserror::Error;

/// Erreurs pouvant survenir lors de la préparation géométrique d'une région
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ZonalError {
    /// Géométrie absente ou dégénérée (moins de 3 sommets distincts)
    #[error("Malformed input for {region}: {reason}")]
    MalformedInput { region: String, reason: String },

    /// Résolution de grille nulle, négative ou non finie
    #[error("Invalid grid resolution: {0}")]
    InvalidResolution(f64),

    /// Grille trop dense pour être échantillonnée
    #[error("Sample grid too large: {cells} cells (max {max})")]
    GridTooLarge { cells: usize, max: usize },
}

impl ZonalError {
    /// Crée une erreur d'entrée malformée avec contexte
    pub fn malformed(region: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            region: region.into(),
            reason: reason.into(),
        }
    }
}
