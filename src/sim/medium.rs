//! Shared radio medium: propagation loss between node positions.
//!
//! The driver needs a concrete receive-power model to run at all, so this
//! implements the model `original_source/examples/cottoncandy-sim.cc`
//! actually configures: `ns3::LogDistancePropagationLossModel` with
//! `pathLossExponent = 3.76` and a 1-meter reference loss of 7.7 dB, plus
//! log-normal shadowing on top (sampled per link, not baked into the mean
//! path loss) the way `LogDistancePropagationLossModel` composes with a
//! `RandomPropagationLossModel` in ns-3.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::tracker::Position;

/// Log-distance path-loss model, grounded on the ns-3 driver's
/// `LogDistancePropagationLossModel` configuration.
#[derive(Copy, Clone, Debug)]
pub struct Medium {
    pub path_loss_exponent: f64,
    pub reference_distance_m: f64,
    pub reference_loss_db: f64,
    /// Standard deviation, in dB, of the per-link log-normal shadowing term.
    /// Zero disables shadowing and makes `rx_power_dbm` a pure function of
    /// distance.
    pub shadowing_sigma_db: f64,
}

impl Default for Medium {
    fn default() -> Self {
        Medium {
            path_loss_exponent: 3.76,
            reference_distance_m: 1.0,
            reference_loss_db: 7.7,
            shadowing_sigma_db: 0.0,
        }
    }
}

impl Medium {
    pub fn distance_m(a: Position, b: Position) -> f64 {
        ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
    }

    /// Path loss in dB at `distance_m`, clamped to the reference loss for
    /// anything at or inside the reference distance. Does not include
    /// shadowing: callers that want the mean path loss (e.g. the channel
    /// selector's interference estimate) go through this; callers modeling
    /// one concrete reception go through `rx_power_dbm`.
    pub fn path_loss_db(&self, distance_m: f64) -> f64 {
        if distance_m <= self.reference_distance_m {
            return self.reference_loss_db;
        }
        self.reference_loss_db
            + 10.0 * self.path_loss_exponent * (distance_m / self.reference_distance_m).log10()
    }

    /// Received power at `distance_m`, given `tx_power_dbm`, including one
    /// freshly sampled log-normal shadowing draw. `shadowing_sigma_db ==
    /// 0.0` (the default) makes this deterministic.
    pub fn rx_power_dbm(&self, tx_power_dbm: i16, distance_m: f64, rng: &mut impl Rng) -> i16 {
        let shadowing = Normal::new(0.0_f64, self.shadowing_sigma_db)
            .expect("shadowing_sigma_db must be >= 0")
            .sample(rng);
        (tx_power_dbm as f64 - self.path_loss_db(distance_m) - shadowing).round() as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rng() -> rand::rngs::StdRng {
        use rand::SeedableRng;
        rand::rngs::StdRng::seed_from_u64(0)
    }

    #[test]
    fn rx_power_falls_off_with_distance() {
        let medium = Medium::default();
        let mut rng = test_rng();
        let near = medium.rx_power_dbm(17, 100.0, &mut rng);
        let far = medium.rx_power_dbm(17, 10_000.0, &mut rng);
        assert!(far < near);
    }

    #[test]
    fn within_reference_distance_uses_reference_loss() {
        let medium = Medium::default();
        assert_eq!(medium.path_loss_db(0.5), medium.reference_loss_db);
        assert_eq!(medium.path_loss_db(1.0), medium.reference_loss_db);
    }

    #[test]
    fn distance_is_euclidean() {
        let a = Position { x: 0.0, y: 0.0 };
        let b = Position { x: 3.0, y: 4.0 };
        assert_eq!(Medium::distance_m(a, b), 5.0);
    }

    #[test]
    fn zero_sigma_shadowing_is_deterministic() {
        let medium = Medium::default();
        let mut rng = test_rng();
        let a = medium.rx_power_dbm(14, 500.0, &mut rng);
        let b = medium.rx_power_dbm(14, 500.0, &mut rng);
        assert_eq!(a, b);
    }

    #[test]
    fn nonzero_sigma_shadowing_perturbs_rx_power() {
        let medium = Medium {
            shadowing_sigma_db: 6.0,
            ..Medium::default()
        };
        let mut rng = test_rng();
        let samples: Vec<i16> = (0..20).map(|_| medium.rx_power_dbm(14, 500.0, &mut rng)).collect();
        assert!(samples.iter().any(|&v| v != samples[0]));
    }
}
