//! Random-number helpers layered over [`rand::RngCore`].
//!
//! Every stochastic operator in the workspace takes `&mut dyn RngCore`; this
//! trait gives those call sites a small vocabulary of draws that never panic
//! on degenerate ranges.

use rand::{Rng, RngCore};

/// Convenience draws available on any random number generator.
pub trait RandomSource: RngCore {
    /// Uniform sample in `[0, 1)`.
    fn uniform(&mut self) -> f32 {
        self.random::<f32>()
    }

    /// Bernoulli trial. Probabilities outside `[0, 1]` saturate.
    fn chance(&mut self, probability: f32) -> bool {
        if probability <= 0.0 || probability.is_nan() {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        self.uniform() < probability
    }

    /// Uniform sample in `[lo, hi)`; returns `lo` when the range is empty.
    fn between(&mut self, lo: f32, hi: f32) -> f32 {
        if hi <= lo || hi.is_nan() || lo.is_nan() {
            return lo;
        }
        self.random_range(lo..hi)
    }

    /// Uniform integer in `[lo, hi]`; returns `lo` when `hi < lo`.
    fn int_between(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        self.random_range(lo..=hi)
    }

    /// Uniform index into a collection of `len` items.
    fn pick_index(&mut self, len: usize) -> Option<usize> {
        if len == 0 {
            None
        } else {
            Some(self.random_range(0..len))
        }
    }

    /// Standard normal sample (Box-Muller).
    fn gaussian(&mut self) -> f32 {
        const TWO_PI: f32 = std::f32::consts::TAU;
        let u1 = self.uniform().clamp(f32::MIN_POSITIVE, 1.0);
        let u2 = self.uniform();
        (-2.0 * u1.ln()).sqrt() * (TWO_PI * u2).cos()
    }
}

impl<R: RngCore + ?Sized> RandomSource for R {}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn degenerate_ranges_do_not_panic() {
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(rng.between(2.0, 2.0), 2.0);
        assert_eq!(rng.between(3.0, 1.0), 3.0);
        assert_eq!(rng.int_between(5, 5), 5);
        assert_eq!(rng.int_between(5, 1), 5);
        assert_eq!(rng.pick_index(0), None);
        assert!(!rng.chance(0.0));
        assert!(!rng.chance(-1.0));
        assert!(rng.chance(1.0));
        assert!(rng.chance(7.0));
    }

    #[test]
    fn draws_stay_in_range() {
        let mut rng = SmallRng::seed_from_u64(0xDEADBEEF);
        let dyn_rng: &mut dyn RngCore = &mut rng;
        for _ in 0..1_000 {
            let u = dyn_rng.uniform();
            assert!((0.0..1.0).contains(&u));
            let v = dyn_rng.between(-0.5, 0.5);
            assert!((-0.5..0.5).contains(&v));
            let i = dyn_rng.int_between(1, 4);
            assert!((1..=4).contains(&i));
            assert!(dyn_rng.pick_index(3).expect("index") < 3);
            assert!(dyn_rng.gaussian().is_finite());
        }
    }

    #[test]
    fn seeded_sources_are_deterministic() {
        let mut a = SmallRng::seed_from_u64(42);
        let mut b = SmallRng::seed_from_u64(42);
        let draws_a: Vec<f32> = (0..16).map(|_| a.uniform()).collect();
        let draws_b: Vec<f32> = (0..16).map(|_| b.uniform()).collect();
        assert_eq!(draws_a, draws_b);
    }
}
