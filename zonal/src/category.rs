//! Tables de catégories ordinales
//!
//! Une table est une suite de bornes supérieures strictement croissantes.
//! La première borne telle que `valeur < borne` donne le libellé; au-delà de
//! la dernière borne, le libellé final s'applique. Les intervalles sont donc
//! semi-ouverts `[b(i-1), b(i))`, sans trou ni recouvrement, et une valeur
//! égale à une borne tombe dans la bande supérieure.

/// Table de catégories (borne supérieure exclusive, libellé)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryTable {
    pub name: &'static str,
    pub bands: &'static [(f64, &'static str)],
    pub top: &'static str,
}

impl CategoryTable {
    /// Classe une valeur; `None` pour une valeur non finie
    pub fn classify(&self, value: f64) -> Option<&'static str> {
        if value.is_nan() {
            return None;
        }
        Some(
            self.bands
                .iter()
                .find(|(upper, _)| value < *upper)
                .map(|(_, label)| *label)
                .unwrap_or(self.top),
        )
    }

    /// Les bornes sont finies et strictement croissantes
    pub fn is_partition(&self) -> bool {
        self.bands.iter().all(|(b, _)| b.is_finite())
            && self.bands.windows(2).all(|w| w[0].0 < w[1].0)
    }

    /// Libellés dans l'ordre croissant
    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.bands.iter().map(|(_, l)| *l).chain(std::iter::once(self.top))
    }
}

/// Stress hydrique de base (ratio prélèvements / ressource disponible)
pub const WATER_STRESS: CategoryTable = CategoryTable {
    name: "baseline_water_stress",
    bands: &[
        (0.1, "Low"),
        (0.2, "Low-Medium"),
        (0.4, "Medium-High"),
        (0.8, "High"),
    ],
    top: "Extremely High",
};

/// Risque de sécheresse (sévérité pondérée par la probabilité, 0-1)
pub const DROUGHT_RISK: CategoryTable = CategoryTable {
    name: "drought_risk",
    bands: &[
        (0.2, "Low"),
        (0.4, "Low-Medium"),
        (0.6, "Medium"),
        (0.8, "Medium-High"),
    ],
    top: "High",
};

/// Risque de sécheresse déduit de la précipitation moyenne (mm/jour).
/// Ordre inversé: moins de pluie, risque plus élevé.
pub const PRECIP_DROUGHT_RISK: CategoryTable = CategoryTable {
    name: "precipitation_drought_risk",
    bands: &[
        (1.0, "Very High"),
        (2.0, "High"),
        (4.0, "Medium"),
        (6.0, "Low-Medium"),
    ],
    top: "Low",
};
