//! Gaussian range perturbation for simulated range sensors.

use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::StandardNormal;

/// Adds zero-mean Gaussian error of a fixed standard deviation to ranges.
///
/// Seed 0 draws from entropy; any other seed replays the same error sequence.
#[derive(Clone)]
pub struct RangeNoise {
    rng: SmallRng,
    std_dev: f32,
}

impl RangeNoise {
    pub fn new(seed: u64, std_dev: f32) -> Self {
        let rng = match seed {
            0 => SmallRng::from_entropy(),
            s => SmallRng::seed_from_u64(s),
        };
        Self { rng, std_dev }
    }

    #[inline]
    pub fn std_dev(&self) -> f32 {
        self.std_dev
    }

    /// Range with one error sample added; exact when the deviation is zero
    #[inline]
    pub fn perturb(&mut self, range: f32) -> f32 {
        if self.std_dev <= 0.0 {
            return range;
        }
        let z: f32 = self.rng.sample(StandardNormal);
        range + z * self.std_dev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_sensors_agree() {
        let mut front = RangeNoise::new(11, 0.02);
        let mut replay = RangeNoise::new(11, 0.02);
        let ranges: Vec<f32> = (1..50).map(|i| i as f32 * 0.1).collect();

        let a: Vec<f32> = ranges.iter().map(|&r| front.perturb(r)).collect();
        let b: Vec<f32> = ranges.iter().map(|&r| replay.perturb(r)).collect();
        assert_eq!(a, b);
        assert!(a.iter().zip(&ranges).any(|(noisy, r)| noisy != r));
    }

    #[test]
    fn test_noiseless_range_is_exact() {
        let mut noise = RangeNoise::new(7, 0.0);
        assert_eq!(noise.perturb(4.25), 4.25);
        assert_eq!(noise.perturb(0.0), 0.0);
    }

    #[test]
    fn test_error_statistics() {
        let mut noise = RangeNoise::new(3, 0.5);
        let n = 5000;
        let errors: Vec<f32> = (0..n).map(|_| noise.perturb(10.0) - 10.0).collect();
        let mean = errors.iter().sum::<f32>() / n as f32;
        let var = errors.iter().map(|e| (e - mean).powi(2)).sum::<f32>() / n as f32;
        assert!(mean.abs() < 0.05, "mean = {}", mean);
        assert!((var.sqrt() - noise.std_dev()).abs() < 0.05);
    }
}
