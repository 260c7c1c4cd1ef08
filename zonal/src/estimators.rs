//! Estimateurs empiriques d'indicateurs dérivés
//!
//! Approximations linéaires par morceaux, sans dérivation publiée: les points
//! de rupture sont conservés tels quels pour rester compatibles avec les
//! extractions existantes. Ce ne sont pas des modèles physiques validés.
//!
//! Toute entrée absente ou non finie donne `None`: aucun indicateur n'est
//! fabriqué à partir d'une valeur par défaut.

/// Nombre annuel estimé de nuits tropicales (minimum > 20 °C)
/// depuis la température minimale moyenne (°C).
pub fn tropical_nights(mean_min_temp_c: Option<f64>) -> Option<u32> {
    let t = mean_min_temp_c.filter(|t| t.is_finite())?;
    let days = if t < 10.0 {
        0.0
    } else if t < 15.0 {
        (t - 10.0) * 6.0
    } else if t < 20.0 {
        30.0 + (t - 15.0) * 18.0
    } else if t < 25.0 {
        120.0 + (t - 20.0) * 26.0
    } else {
        250.0 + (t - 25.0) * 20.0
    };
    Some(floor_days(days))
}

/// Nombre annuel estimé de jours de gel (minimum < 0 °C)
/// depuis la température minimale moyenne (°C).
pub fn frost_days(mean_min_temp_c: Option<f64>) -> Option<u32> {
    let t = mean_min_temp_c.filter(|t| t.is_finite())?;
    let days = if t > 10.0 {
        0.0
    } else if t > 5.0 {
        (10.0 - t) * 3.0
    } else if t > 0.0 {
        15.0 + (5.0 - t) * 10.0
    } else if t > -5.0 {
        65.0 + (0.0 - t) * 15.0
    } else {
        140.0 + (-5.0 - t) * 10.0
    };
    Some(floor_days(days))
}

/// Nombre maximal estimé de jours secs consécutifs depuis la précipitation
/// journalière moyenne (mm/jour). Une précipitation nulle ou négative est
/// une entrée invalide, pas "zéro jour sec".
pub fn consecutive_dry_days(mean_daily_precip_mm: Option<f64>) -> Option<u32> {
    let p = mean_daily_precip_mm.filter(|p| p.is_finite() && *p > 0.0)?;
    let days = if p < 1.0 {
        90.0
    } else if p < 2.0 {
        90.0 - p * 30.0
    } else if p < 5.0 {
        60.0 - (p - 2.0) * 10.0
    } else if p < 10.0 {
        30.0 - (p - 5.0) * 3.0
    } else {
        15.0
    };
    Some(floor_days(days))
}

fn floor_days(days: f64) -> u32 {
    days.floor().max(0.0) as u32
}

/// Arrondi à `decimals` décimales
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Écart absolu futur − référence, arrondi
pub fn absolute_delta(future: Option<f64>, baseline: Option<f64>, decimals: u32) -> Option<f64> {
    match (future, baseline) {
        (Some(f), Some(b)) if f.is_finite() && b.is_finite() => Some(round_to(f - b, decimals)),
        _ => None,
    }
}

/// Écart relatif (futur − référence) / référence × 100, arrondi.
/// Indéfini si la référence est nulle ou si une valeur manque.
pub fn percent_delta(future: Option<f64>, baseline: Option<f64>, decimals: u32) -> Option<f64> {
    match (future, baseline) {
        (Some(f), Some(b)) if f.is_finite() && b.is_finite() && b != 0.0 => {
            Some(round_to((f - b) / b * 100.0, decimals))
        }
        _ => None,
    }
}

/// Écart entre deux comptes de jours estimés
pub fn days_delta(future: Option<u32>, baseline: Option<u32>) -> Option<i64> {
    Some(i64::from(future?) - i64::from(baseline?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tropical_nights_pieces() {
        assert_eq!(tropical_nights(None), None);
        assert_eq!(tropical_nights(Some(5.0)), Some(0));
        assert_eq!(tropical_nights(Some(12.5)), Some(15));
        assert_eq!(tropical_nights(Some(15.0)), Some(30));
        assert_eq!(tropical_nights(Some(20.0)), Some(120));
        assert_eq!(tropical_nights(Some(22.0)), Some(172));
        assert_eq!(tropical_nights(Some(25.0)), Some(250));
        assert_eq!(tropical_nights(Some(26.5)), Some(280));
    }

    #[test]
    fn test_tropical_nights_floors() {
        // 30 + 0.55 * 18 = 39.9
        assert_eq!(tropical_nights(Some(15.55)), Some(39));
    }

    #[test]
    fn test_frost_days_pieces() {
        assert_eq!(frost_days(None), None);
        assert_eq!(frost_days(Some(12.0)), Some(0));
        assert_eq!(frost_days(Some(10.0)), Some(0));
        assert_eq!(frost_days(Some(8.0)), Some(6));
        assert_eq!(frost_days(Some(5.0)), Some(15));
        assert_eq!(frost_days(Some(0.0)), Some(65));
        assert_eq!(frost_days(Some(-2.0)), Some(95));
        assert_eq!(frost_days(Some(-5.0)), Some(140));
        assert_eq!(frost_days(Some(-7.0)), Some(160));
    }

    #[test]
    fn test_consecutive_dry_days_pieces() {
        assert_eq!(consecutive_dry_days(None), None);
        assert_eq!(consecutive_dry_days(Some(0.0)), None);
        assert_eq!(consecutive_dry_days(Some(-1.0)), None);
        assert_eq!(consecutive_dry_days(Some(0.5)), Some(90));
        assert_eq!(consecutive_dry_days(Some(1.0)), Some(60));
        assert_eq!(consecutive_dry_days(Some(1.5)), Some(45));
        assert_eq!(consecutive_dry_days(Some(3.0)), Some(50));
        assert_eq!(consecutive_dry_days(Some(6.0)), Some(27));
        assert_eq!(consecutive_dry_days(Some(12.0)), Some(15));
    }

    #[test]
    fn test_non_finite_inputs() {
        assert_eq!(tropical_nights(Some(f64::NAN)), None);
        assert_eq!(frost_days(Some(f64::INFINITY)), None);
        assert_eq!(consecutive_dry_days(Some(f64::NAN)), None);
    }

    #[test]
    fn test_deltas() {
        assert_eq!(absolute_delta(Some(23.456), Some(21.0), 2), Some(2.46));
        assert_eq!(absolute_delta(None, Some(21.0), 2), None);
        assert_eq!(percent_delta(Some(900.0), Some(1000.0), 1), Some(-10.0));
        assert_eq!(percent_delta(Some(5.0), Some(0.0), 1), None);
        assert_eq!(percent_delta(Some(5.0), None, 1), None);
        assert_eq!(days_delta(Some(120), Some(150)), Some(-30));
        assert_eq!(days_delta(None, Some(150)), None);
    }
}
