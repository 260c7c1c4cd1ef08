//! Erreurs d'extraction et classification des échecs
//!
//! - `BackendError`: échec d'un appel au backend d'analyse
//! - `FailureKind` / `ErrorTally`: chaque échec absorbé (champ ou cellule)
//!   est classé et compté, jamais ignoré silencieusement
//! - `ExtractError`: échec au niveau de la région entière

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zonal::ZonalError;

/// Nombre maximal de messages conservés dans un décompte
const MAX_TALLY_MESSAGES: usize = 20;

/// Erreurs d'appel au backend d'analyse
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// Erreur réseau ou de connexion
    #[error("Transport error: {0}")]
    Transport(String),

    /// Réponse non-2xx du backend
    #[error("Backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Le backend refuse la géométrie de la région
    #[error("Backend rejected geometry: {0}")]
    InvalidGeometry(String),

    /// Réponse illisible
    #[error("Invalid backend reply: {0}")]
    Decode(String),

    /// Délai dépassé
    #[error("Backend request timed out after {0:?}")]
    Timeout(Duration),
}

impl BackendError {
    /// Erreur qui condamne toute la région (et non une seule cellule)
    pub fn is_region_fatal(&self) -> bool {
        matches!(self, BackendError::InvalidGeometry(_))
    }
}

/// Classe d'échec absorbé pendant une extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Géométrie absente ou dégénérée
    MalformedInput,
    /// Résultat légitimement vide (aucun pixel, aucune unité)
    NoDataAvailable,
    /// Erreur réseau / backend sur une bande ou une cellule
    TransientBackendError,
    /// Statistique absente d'une réduction par ailleurs réussie
    PartialFieldMissing,
}

/// Décompte des échecs absorbés, par classe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorTally {
    pub malformed_input: usize,
    pub no_data_available: usize,
    pub transient_backend_error: usize,
    pub partial_field_missing: usize,
    /// Premiers messages de diagnostic
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl ErrorTally {
    /// Enregistre un échec avec son contexte
    pub fn record(&mut self, kind: FailureKind, detail: impl Into<String>) {
        *self.slot(kind) += 1;
        if self.messages.len() < MAX_TALLY_MESSAGES {
            self.messages.push(format!("{:?}: {}", kind, detail.into()));
        }
    }

    pub fn count(&self, kind: FailureKind) -> usize {
        match kind {
            FailureKind::MalformedInput => self.malformed_input,
            FailureKind::NoDataAvailable => self.no_data_available,
            FailureKind::TransientBackendError => self.transient_backend_error,
            FailureKind::PartialFieldMissing => self.partial_field_missing,
        }
    }

    pub fn total(&self) -> usize {
        self.malformed_input
            + self.no_data_available
            + self.transient_backend_error
            + self.partial_field_missing
    }

    /// Ajoute les compteurs d'un autre décompte (les messages ne sont pas fusionnés)
    pub fn merge(&mut self, other: &ErrorTally) {
        self.malformed_input += other.malformed_input;
        self.no_data_available += other.no_data_available;
        self.transient_backend_error += other.transient_backend_error;
        self.partial_field_missing += other.partial_field_missing;
    }

    fn slot(&mut self, kind: FailureKind) -> &mut usize {
        match kind {
            FailureKind::MalformedInput => &mut self.malformed_input,
            FailureKind::NoDataAvailable => &mut self.no_data_available,
            FailureKind::TransientBackendError => &mut self.transient_backend_error,
            FailureKind::PartialFieldMissing => &mut self.partial_field_missing,
        }
    }
}

/// Échec d'extraction pour une région entière
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Géométrie inutilisable: la région est ignorée, pas réessayée
    #[error(transparent)]
    Malformed(#[from] ZonalError),

    /// Erreur backend fatale pour la région
    #[error("Region-fatal backend error: {0}")]
    RegionFatal(BackendError),

    /// Échec de l'unique requête d'un extracteur en une passe
    #[error("Backend request failed: {0}")]
    Backend(BackendError),

    /// Aucune bande n'a pu être récupérée
    #[error("No data retrieved: {attempted} requests failed")]
    NothingRetrieved { attempted: usize },

    /// Sérialisation du résultat impossible
    #[error("Failed to encode result: {0}")]
    Encode(String),
}

impl ExtractError {
    /// La région doit être marquée ignorée plutôt qu'en échec
    pub fn is_skip(&self) -> bool {
        matches!(self, ExtractError::Malformed(_))
    }

    /// Classe l'échec d'une requête qui n'a pas de repli
    pub fn from_backend(err: BackendError) -> Self {
        if err.is_region_fatal() {
            ExtractError::RegionFatal(err)
        } else {
            ExtractError::Backend(err)
        }
    }
}
