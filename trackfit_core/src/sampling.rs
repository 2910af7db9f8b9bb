//! The "SAMPLING" Layer - Minimal Point Set Draws
//!
//! Each sampler draws the handful of hit indices needed to define one
//! candidate pattern. Four strategies are available:
//! 1. Uniform draw without replacement
//! 2. Gaussian proximity to the first drawn hit
//! 3. Charge-weighted rejection sampling
//! 4. Charge-weighted and Gaussian proximity combined
//!
//! Every strategy returns distinct indices and terminates after a bounded
//! number of rejections per index.

use crate::hit::Hit;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Rejections tolerated per index by the Gaussian sampler.
pub const GAUSSIAN_MAX_RETRIES: usize = 20;

/// Rejections tolerated per index by the charge-weighted samplers.
pub const CHARGE_MAX_RETRIES: usize = 30;

// ============================================================================
// SAMPLE METHOD
// ============================================================================

/// Sampling strategy selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleMethod {
    Uniform,
    Gaussian,
    ChargeWeighted,
    WeightedGaussian,
}

impl SampleMethod {
    /// Builds the sampler for this method over `hits`.
    ///
    /// `sigma` is the proximity scale used by the Gaussian strategies.
    pub fn build<'a>(&self, hits: &'a [Hit], sigma: f64) -> Box<dyn HitSampler + 'a> {
        match self {
            SampleMethod::Uniform => Box::new(UniformSampler::new(hits)),
            SampleMethod::Gaussian => Box::new(GaussianSampler::new(hits, sigma)),
            SampleMethod::ChargeWeighted => Box::new(ChargeWeightedSampler::new(hits)),
            SampleMethod::WeightedGaussian => Box::new(WeightedGaussianSampler::new(hits, sigma)),
        }
    }

    pub fn all() -> Vec<SampleMethod> {
        vec![
            SampleMethod::Uniform,
            SampleMethod::Gaussian,
            SampleMethod::ChargeWeighted,
            SampleMethod::WeightedGaussian,
        ]
    }
}

impl fmt::Display for SampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SampleMethod::Uniform => "uniform",
            SampleMethod::Gaussian => "gaussian",
            SampleMethod::ChargeWeighted => "charge_weighted",
            SampleMethod::WeightedGaussian => "weighted_gaussian",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for SampleMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "uniform" => Ok(SampleMethod::Uniform),
            "gaussian" => Ok(SampleMethod::Gaussian),
            "charge_weighted" | "weighted" => Ok(SampleMethod::ChargeWeighted),
            "weighted_gaussian" => Ok(SampleMethod::WeightedGaussian),
            _ => Err(format!("Unknown sample method: {}", s)),
        }
    }
}

// ============================================================================
// SAMPLER TRAIT
// ============================================================================

/// Draws distinct hit indices from a fixed hit cloud.
pub trait HitSampler: Send + Sync {
    fn method(&self) -> SampleMethod;

    /// Returns `count` distinct indices, or `None` if the cloud is smaller
    /// than `count`.
    fn sample(&self, rng: &mut dyn RngCore, count: usize) -> Option<Vec<usize>>;
}

/// Uniform index among those not yet chosen.
fn draw_unchosen(rng: &mut dyn RngCore, len: usize, chosen: &[usize]) -> usize {
    let mut taken = chosen.to_vec();
    taken.sort_unstable();

    let mut index = rng.gen_range(0..len - taken.len());
    for &t in &taken {
        if index >= t {
            index += 1;
        }
    }
    index
}

/// Draws `count` distinct indices, accepting each candidate through
/// `accept` until `max_retries` rejections have piled up for that slot.
fn draw_with_rejection<F>(
    rng: &mut dyn RngCore,
    len: usize,
    count: usize,
    max_retries: usize,
    mut accept: F,
) -> Vec<usize>
where
    F: FnMut(&mut dyn RngCore, &[usize], usize) -> bool,
{
    let mut chosen = Vec::with_capacity(count);
    while chosen.len() < count {
        let mut rejections = 0;
        loop {
            let candidate = draw_unchosen(rng, len, &chosen);
            if rejections >= max_retries || accept(rng, &chosen, candidate) {
                chosen.push(candidate);
                break;
            }
            rejections += 1;
        }
    }
    chosen
}

/// `exp(-(d / sigma)^2)` acceptance against the first drawn hit.
fn accept_near(
    rng: &mut dyn RngCore,
    hits: &[Hit],
    first: usize,
    candidate: usize,
    sigma: f64,
) -> bool {
    let distance = (hits[candidate].position() - hits[first].position()).norm();
    rng.gen::<f64>() < (-(distance / sigma).powi(2)).exp()
}

/// Charge statistics used by the weighted strategies.
#[derive(Debug, Clone)]
struct ChargeProfile {
    average: f64,
    enabled: bool,
}

impl ChargeProfile {
    fn new(hits: &[Hit]) -> Self {
        let total: f64 = hits.iter().map(Hit::charge).sum();
        let enabled = total > 0.0 && total.is_finite() && !hits.is_empty();
        Self {
            average: if enabled { total / hits.len() as f64 } else { 0.0 },
            enabled,
        }
    }

    /// Accepts a hit when its charge beats a uniform draw on `[0, 2 * average)`.
    /// Without any charge every hit is accepted.
    fn accept(&self, rng: &mut dyn RngCore, hit: &Hit) -> bool {
        if !self.enabled {
            return true;
        }
        hit.charge() >= rng.gen::<f64>() * 2.0 * self.average
    }
}

// ============================================================================
// STRATEGIES
// ============================================================================

pub struct UniformSampler<'a> {
    hits: &'a [Hit],
}

impl<'a> UniformSampler<'a> {
    pub fn new(hits: &'a [Hit]) -> Self {
        Self { hits }
    }
}

impl HitSampler for UniformSampler<'_> {
    fn method(&self) -> SampleMethod {
        SampleMethod::Uniform
    }

    fn sample(&self, rng: &mut dyn RngCore, count: usize) -> Option<Vec<usize>> {
        if self.hits.len() < count {
            return None;
        }
        Some(rand::seq::index::sample(rng, self.hits.len(), count).into_vec())
    }
}

/// Favours hits close to the first drawn hit.
pub struct GaussianSampler<'a> {
    hits: &'a [Hit],
    sigma: f64,
}

impl<'a> GaussianSampler<'a> {
    pub fn new(hits: &'a [Hit], sigma: f64) -> Self {
        Self { hits, sigma }
    }
}

impl HitSampler for GaussianSampler<'_> {
    fn method(&self) -> SampleMethod {
        SampleMethod::Gaussian
    }

    fn sample(&self, rng: &mut dyn RngCore, count: usize) -> Option<Vec<usize>> {
        if self.hits.len() < count {
            return None;
        }
        Some(draw_with_rejection(
            rng,
            self.hits.len(),
            count,
            GAUSSIAN_MAX_RETRIES,
            |rng, chosen, candidate| match chosen.first() {
                None => true,
                Some(&first) => accept_near(rng, self.hits, first, candidate, self.sigma),
            },
        ))
    }
}

/// Favours high-charge hits.
pub struct ChargeWeightedSampler<'a> {
    hits: &'a [Hit],
    profile: ChargeProfile,
}

impl<'a> ChargeWeightedSampler<'a> {
    pub fn new(hits: &'a [Hit]) -> Self {
        Self {
            hits,
            profile: ChargeProfile::new(hits),
        }
    }
}

impl HitSampler for ChargeWeightedSampler<'_> {
    fn method(&self) -> SampleMethod {
        SampleMethod::ChargeWeighted
    }

    fn sample(&self, rng: &mut dyn RngCore, count: usize) -> Option<Vec<usize>> {
        if self.hits.len() < count {
            return None;
        }
        Some(draw_with_rejection(
            rng,
            self.hits.len(),
            count,
            CHARGE_MAX_RETRIES,
            |rng, _, candidate| self.profile.accept(rng, &self.hits[candidate]),
        ))
    }
}

/// Both acceptance tests must pass for every hit after the first.
pub struct WeightedGaussianSampler<'a> {
    hits: &'a [Hit],
    sigma: f64,
    profile: ChargeProfile,
}

impl<'a> WeightedGaussianSampler<'a> {
    pub fn new(hits: &'a [Hit], sigma: f64) -> Self {
        Self {
            hits,
            sigma,
            profile: ChargeProfile::new(hits),
        }
    }
}

impl HitSampler for WeightedGaussianSampler<'_> {
    fn method(&self) -> SampleMethod {
        SampleMethod::WeightedGaussian
    }

    fn sample(&self, rng: &mut dyn RngCore, count: usize) -> Option<Vec<usize>> {
        if self.hits.len() < count {
            return None;
        }
        Some(draw_with_rejection(
            rng,
            self.hits.len(),
            count,
            CHARGE_MAX_RETRIES,
            |rng, chosen, candidate| {
                let charged = self.profile.accept(rng, &self.hits[candidate]);
                match chosen.first() {
                    None => charged,
                    Some(&first) => {
                        charged && accept_near(rng, self.hits, first, candidate, self.sigma)
                    }
                }
            },
        ))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    fn line_hits(n: usize, charge: impl Fn(usize) -> f64) -> Vec<Hit> {
        (0..n)
            .map(|i| Hit::new(i, Vector3::new(i as f64, 0.0, 2.0 * i as f64), charge(i)))
            .collect()
    }

    #[test]
    fn test_too_few_hits_returns_none() {
        let hits = line_hits(2, |_| 1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for method in SampleMethod::all() {
            let sampler = method.build(&hits, 30.0);
            assert!(sampler.sample(&mut rng, 3).is_none(), "{} should refuse", method);
            assert_eq!(sampler.sample(&mut rng, 2).map(|s| s.len()), Some(2));
        }
    }

    #[test]
    fn test_exhaustive_draw_returns_every_index() {
        // Drawing the whole cloud must still terminate with distinct indices
        let hits = line_hits(5, |i| i as f64);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for method in SampleMethod::all() {
            let sampler = method.build(&hits, 0.001);
            let mut drawn = sampler.sample(&mut rng, 5).unwrap();
            drawn.sort_unstable();
            assert_eq!(drawn, vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_gaussian_prefers_nearby_hits() {
        // Two clusters 1000 units apart
        let hits: Vec<Hit> = (0..100)
            .map(|i| {
                let offset = if i < 50 { 0.0 } else { 1000.0 };
                Hit::new(i, Vector3::new(offset + (i % 50) as f64 * 0.1, 0.0, 0.0), 1.0)
            })
            .collect();
        let sampler = SampleMethod::Gaussian.build(&hits, 30.0);
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let same_cluster = (0..200)
            .filter(|_| {
                let pair = sampler.sample(&mut rng, 2).unwrap();
                (pair[0] < 50) == (pair[1] < 50)
            })
            .count();
        assert!(same_cluster >= 190, "only {} of 200 pairs stayed local", same_cluster);
    }

    #[test]
    fn test_charge_weighted_prefers_heavy_hits() {
        let hits = line_hits(100, |i| if i == 42 { 1000.0 } else { 1.0 });
        let sampler = SampleMethod::ChargeWeighted.build(&hits, 30.0);
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let with_heavy = (0..500)
            .filter(|_| sampler.sample(&mut rng, 2).unwrap().contains(&42))
            .count();
        // A uniform draw would include it about 2% of the time
        assert!(with_heavy > 50, "heavy hit drawn only {} times", with_heavy);
    }

    #[test]
    fn test_zero_charge_accepts_everything() {
        let hits = line_hits(10, |_| 0.0);
        let sampler = SampleMethod::WeightedGaussian.build(&hits, 30.0);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let drawn = sampler.sample(&mut rng, 3).unwrap();
        assert_eq!(drawn.iter().collect::<HashSet<_>>().len(), 3);
    }

    proptest! {
        #[test]
        fn prop_samples_are_distinct_and_in_range(
            len in 3usize..60,
            count in 1usize..4,
            seed in any::<u64>(),
            method_index in 0usize..4,
        ) {
            let hits = line_hits(len, |i| (i % 7) as f64);
            let method = SampleMethod::all()[method_index];
            let sampler = method.build(&hits, 30.0);
            let mut rng = ChaCha8Rng::seed_from_u64(seed);

            let drawn = sampler.sample(&mut rng, count).unwrap();
            prop_assert_eq!(drawn.len(), count);
            prop_assert!(drawn.iter().all(|&i| i < len));
            prop_assert_eq!(drawn.iter().collect::<HashSet<_>>().len(), count);
        }
    }
}
