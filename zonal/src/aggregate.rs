//! Agrégation pondérée de plusieurs unités d'analyse (sous-bassins, ...)
//!
//! Une région peut intersecter zéro, une ou plusieurs unités. Chaque unité
//! porte une valeur brute et un poids (surface en km²). La valeur agrégée est
//! la moyenne pondérée des unités valides; une sentinelle "pas de donnée"
//! n'entre jamais dans les sommes.

use serde::{Deserialize, Serialize};

use crate::category::CategoryTable;

/// Valeur réservée "pas de donnée" des jeux vectoriels
pub const SENTINEL: f64 = -9999.0;

/// Vrai si la valeur brute est une vraie mesure
pub fn is_valid_raw(value: f64) -> bool {
    value.is_finite() && value != SENTINEL
}

/// Une unité d'analyse intersectant la région
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisUnit {
    /// Identifiant de l'unité (si connu)
    pub id: Option<String>,
    /// Valeur brute de l'indicateur (`None` si absente de la source)
    pub raw_value: Option<f64>,
    /// Poids surfacique (km²)
    pub area_km2: f64,
}

impl AnalysisUnit {
    pub fn new(raw_value: Option<f64>, area_km2: f64) -> Self {
        Self {
            id: None,
            raw_value,
            area_km2,
        }
    }

    /// Valeur utilisable dans la moyenne pondérée
    fn contribution(&self) -> Option<(f64, f64)> {
        let value = self.raw_value.filter(|v| is_valid_raw(*v))?;
        let weight = self.area_km2;
        if weight.is_finite() && weight > 0.0 {
            Some((value, weight))
        } else {
            None
        }
    }
}

/// Raison pour laquelle aucune valeur agrégée n'est disponible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotAvailableReason {
    /// Aucune unité n'intersecte la région
    NoIntersectingUnits,
    /// Des unités intersectent mais toutes portent la sentinelle
    AllSentinel,
    /// Des valeurs valides existent mais leur poids total est nul
    ZeroWeight,
}

impl NotAvailableReason {
    /// Message lisible pour les rapports
    pub fn describe(self) -> &'static str {
        match self {
            NotAvailableReason::NoIntersectingUnits => "no analysis units intersect this area",
            NotAvailableReason::AllSentinel => "all intersecting units carry the no-data sentinel",
            NotAvailableReason::ZeroWeight => "valid units have zero total area weight",
        }
    }
}

/// Résultat de l'agrégation pondérée
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregate {
    /// Moyenne pondérée (`None` si indisponible, jamais 0 par défaut)
    pub value: Option<f64>,
    /// Catégorie ordinale de la valeur (si une table est fournie)
    pub category: Option<&'static str>,
    /// Nombre d'unités ayant contribué
    pub contributing_units: usize,
    /// Somme des poids contributifs (km²)
    pub total_weight: f64,
    /// Raison de l'indisponibilité
    pub reason: Option<NotAvailableReason>,
}

impl Aggregate {
    fn not_available(reason: NotAvailableReason) -> Self {
        Self {
            value: None,
            category: None,
            contributing_units: 0,
            total_weight: 0.0,
            reason: Some(reason),
        }
    }
}

/// Moyenne pondérée par la surface des unités valides
pub fn aggregate(units: &[AnalysisUnit]) -> Aggregate {
    if units.is_empty() {
        return Aggregate::not_available(NotAvailableReason::NoIntersectingUnits);
    }

    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    let mut contributing = 0;
    let mut any_valid_value = false;

    for unit in units {
        if unit.raw_value.is_some_and(is_valid_raw) {
            any_valid_value = true;
        }
        if let Some((value, weight)) = unit.contribution() {
            weighted_sum += value * weight;
            weight_sum += weight;
            contributing += 1;
        }
    }

    if !any_valid_value {
        return Aggregate::not_available(NotAvailableReason::AllSentinel);
    }
    if weight_sum <= 0.0 {
        return Aggregate::not_available(NotAvailableReason::ZeroWeight);
    }

    Aggregate {
        value: Some(weighted_sum / weight_sum),
        category: None,
        contributing_units: contributing,
        total_weight: weight_sum,
        reason: None,
    }
}

/// Agrège puis classe la valeur dans une table de catégories
pub fn aggregate_categorized(units: &[AnalysisUnit], table: &CategoryTable) -> Aggregate {
    let mut result = aggregate(units);
    result.category = result.value.and_then(|v| table.classify(v));
    result
}
