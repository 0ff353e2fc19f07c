//! Seeded parameter samplers.
//!
//! A [`ParamsSampler`] is a description (space, mode, seed); calling
//! [`ParamsSampler::samples`] starts a single pass over it. Two passes built
//! from equal samplers with an explicit seed yield the same sequence.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use ds_types::{DiagnosticKind, Diagnostics, DsResult, SamplingError};

use crate::search::{ParameterSet, SearchSpace};

/// Largest cross product sampled without replacement. Bigger finite grids
/// are sampled with replacement even when `n_iter` covers them.
pub const MAX_ENUMERABLE_GRID: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingMode {
    /// `n_iter` random draws.
    Random { n_iter: usize },
    /// The whole cross product in order, `repeat` times.
    Grid { repeat: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamsSampler {
    space: SearchSpace,
    mode: SamplingMode,
    seed: Option<u64>,
}

impl ParamsSampler {
    /// Random sampler drawing `n_iter` parameter sets.
    pub fn random(space: SearchSpace, n_iter: usize, seed: Option<u64>) -> DsResult<Self> {
        space.validate()?;
        Ok(Self {
            space,
            mode: SamplingMode::Random { n_iter },
            seed,
        })
    }

    /// Exhaustive sampler over a finite space.
    pub fn grid(space: SearchSpace, repeat: usize) -> DsResult<Self> {
        space.validate()?;
        if space.grid_size().is_none() {
            return Err(SamplingError::InvalidGrid {
                message: "grid sampling needs every parameter to be a finite list or integer range"
                    .to_string(),
            }
            .into());
        }
        Ok(Self {
            space,
            mode: SamplingMode::Grid { repeat },
            seed: None,
        })
    }

    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    pub fn mode(&self) -> SamplingMode {
        self.mode
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Number of parameter sets a pass yields.
    pub fn len(&self) -> usize {
        match self.mode {
            SamplingMode::Random { n_iter } => n_iter,
            SamplingMode::Grid { repeat } => self.space.grid_size().unwrap_or(0).saturating_mul(repeat),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a pass. The sampling policy is decided here and reported to
    /// `diagnostics`.
    pub fn samples(&self, diagnostics: &mut Diagnostics) -> Samples {
        let seed = match (self.mode, self.seed) {
            (_, Some(seed)) => seed,
            // Grid passes never draw from the generator.
            (SamplingMode::Grid { .. }, None) => 0,
            (SamplingMode::Random { .. }, None) => {
                let seed = rand::rng().random::<u64>();
                diagnostics.push(DiagnosticKind::GeneratedSeed { seed });
                seed
            }
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let limit = self.len();

        let plan = match (self.mode, self.space.grid_size()) {
            (SamplingMode::Grid { .. }, Some(total)) => {
                diagnostics.push(DiagnosticKind::SampledParameters {
                    sampled: total.min(limit),
                    total,
                });
                Plan::Sequential { total }
            }
            (SamplingMode::Random { n_iter }, Some(total))
                if n_iter >= total && total <= MAX_ENUMERABLE_GRID =>
            {
                diagnostics.push(DiagnosticKind::SamplingWithoutReplacement { total });
                diagnostics.push(DiagnosticKind::SampledParameters {
                    sampled: n_iter.min(total),
                    total,
                });
                let mut order: Vec<usize> = (0..total).collect();
                order.shuffle(&mut rng);
                Plan::Permutation { order, cursor: 0 }
            }
            (SamplingMode::Random { n_iter }, Some(total)) if n_iter < total => {
                diagnostics.push(DiagnosticKind::SamplingWithReplacement {
                    reason: format!("{n_iter} draws do not cover the grid of {total} points"),
                });
                Plan::Independent
            }
            (_, Some(total)) => {
                diagnostics.push(DiagnosticKind::SamplingWithReplacement {
                    reason: format!("grid of {total} points is too large to enumerate"),
                });
                Plan::Independent
            }
            (_, None) => {
                let reason = match self.space.parameters.iter().find(|p| !p.kind.is_finite()) {
                    Some(param) => format!("parameter '{}' is continuous", param.name),
                    None => "grid size overflows".to_string(),
                };
                diagnostics.push(DiagnosticKind::SamplingWithReplacement { reason });
                Plan::Independent
            }
        };

        tracing::debug!("Sampling {} parameter sets with seed {}", limit, seed);
        Samples {
            space: self.space.clone(),
            rng,
            plan,
            emitted: 0,
            limit,
        }
    }
}

enum Plan {
    Sequential { total: usize },
    Permutation { order: Vec<usize>, cursor: usize },
    Independent,
}

/// One pass over a sampler.
pub struct Samples {
    space: SearchSpace,
    rng: ChaCha8Rng,
    plan: Plan,
    emitted: usize,
    limit: usize,
}

impl Iterator for Samples {
    type Item = ParameterSet;

    fn next(&mut self) -> Option<ParameterSet> {
        if self.emitted >= self.limit {
            return None;
        }
        let params = match &mut self.plan {
            Plan::Sequential { total } => self.space.point_at(self.emitted % (*total).max(1)),
            Plan::Permutation { order, cursor } => {
                if *cursor == order.len() {
                    // Past the cross product: continue with a fresh permutation.
                    order.shuffle(&mut self.rng);
                    *cursor = 0;
                }
                let index = order.get(*cursor).copied().unwrap_or(0);
                *cursor += 1;
                self.space.point_at(index)
            }
            Plan::Independent => self.space.sample_one(&mut self.rng),
        };
        self.emitted += 1;
        Some(params)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.limit - self.emitted;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Samples {}
