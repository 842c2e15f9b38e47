// This file is part of Demand-Core.
// Copyright © 2022, 2023, 2024, 2025 André de Palma, Lucas Javaudin
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Parallel execution of a task over contiguous partitions of a collection.
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use anyhow::{anyhow, bail, Context, Result};
use log::warn;
use rand::{RngCore, SeedableRng};
use rand_xorshift::XorShiftRng;
use rayon::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ConfigurationError;

/// What to do when the task of a partition fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum FailurePolicy {
    /// The phase fails if any partition fails.
    #[default]
    FailFast,
    /// Failures are logged and counted, the results of the other partitions are kept.
    Tolerate,
}

/// Information given to the task of a partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionContext {
    /// Index of the partition.
    pub index: usize,
    /// Seed of the partition's random-number generator.
    pub seed: u64,
}

impl PartitionContext {
    /// Returns a new random-number generator for the partition.
    pub fn rng(&self) -> XorShiftRng {
        XorShiftRng::seed_from_u64(self.seed)
    }
}

/// Failure of the task of a partition.
#[derive(Debug, Error)]
#[error("Partition {index} failed: {error:#}")]
pub struct PartitionError {
    pub index: usize,
    pub error: anyhow::Error,
}

/// Failure of a whole phase.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("{} partition(s) failed during phase `{phase}`", .errors.len())]
    PartitionsFailed {
        phase: String,
        errors: Vec<PartitionError>,
    },
}

/// Results of a phase.
#[derive(Debug)]
pub struct PhaseOutput<R> {
    /// Results of the partitions that succeeded, in partition order.
    pub results: Vec<R>,
    /// Number of partitions that failed (always 0 with [FailurePolicy::FailFast]).
    pub nb_failed: usize,
}

/// Returns the size of the partitions of a collection of `n` items.
pub fn partition_size(n: usize, nb_partitions: usize) -> usize {
    n.div_ceil(nb_partitions.max(1)).max(1)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Runs tasks over contiguous partitions of a collection on a dedicated thread pool.
#[derive(Debug)]
pub struct PartitionedExecutor {
    pool: rayon::ThreadPool,
    nb_partitions: usize,
    policy: FailurePolicy,
}

impl PartitionedExecutor {
    /// Creates an executor with `nb_threads` worker threads (0 for one per core).
    pub fn new(nb_threads: usize, nb_partitions: usize, policy: FailurePolicy) -> Result<Self> {
        if nb_partitions == 0 {
            bail!("The number of partitions must be positive");
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(nb_threads)
            .thread_name(|i| format!("demand-worker-{i}"))
            .build()
            .context("Failed to build the thread pool")?;
        Ok(PartitionedExecutor {
            pool,
            nb_partitions,
            policy,
        })
    }

    pub fn nb_partitions(&self) -> usize {
        self.nb_partitions
    }

    pub fn nb_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs a closure inside the thread pool of the executor.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }

    /// Runs `task` on each partition of `items` and waits for all the partitions to finish.
    ///
    /// One seed per partition is drawn from `master`, on the calling thread, before any task
    /// starts. Exactly `nb_partitions` seeds are drawn, even when there are fewer items than
    /// partitions, so the state of `master` afterwards only depends on its state before.
    ///
    /// A task that returns an error or panics is reported as a [PartitionError].
    pub fn run<T, R, F>(
        &self,
        phase: &str,
        items: &mut [T],
        master: &mut impl RngCore,
        task: F,
    ) -> Result<PhaseOutput<R>, PhaseError>
    where
        T: Send,
        R: Send,
        F: Fn(&mut [T], &PartitionContext) -> Result<R> + Sync,
    {
        let seeds: Vec<u64> = (0..self.nb_partitions).map(|_| master.next_u64()).collect();
        let chunk_size = partition_size(items.len(), self.nb_partitions);
        let outcomes: Vec<Result<R, PartitionError>> = self.pool.install(|| {
            items
                .par_chunks_mut(chunk_size)
                .zip(seeds.par_iter())
                .enumerate()
                .map(|(index, (chunk, &seed))| {
                    let ctx = PartitionContext { index, seed };
                    match panic::catch_unwind(AssertUnwindSafe(|| task(chunk, &ctx))) {
                        Ok(Ok(result)) => Ok(result),
                        Ok(Err(error)) => Err(PartitionError { index, error }),
                        Err(payload) => Err(PartitionError {
                            index,
                            error: anyhow!("Task panicked: {}", panic_message(payload.as_ref())),
                        }),
                    }
                })
                .collect()
        });
        let mut results = Vec::with_capacity(outcomes.len());
        let mut errors = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(r) => results.push(r),
                Err(e) => errors.push(e),
            }
        }
        if errors.is_empty() {
            return Ok(PhaseOutput {
                results,
                nb_failed: 0,
            });
        }
        // Invalid inputs are never tolerated.
        let has_configuration_error = errors
            .iter()
            .any(|e| e.error.chain().any(|c| c.is::<ConfigurationError>()));
        match self.policy {
            FailurePolicy::FailFast => Err(PhaseError::PartitionsFailed {
                phase: phase.to_owned(),
                errors,
            }),
            FailurePolicy::Tolerate if has_configuration_error => {
                Err(PhaseError::PartitionsFailed {
                    phase: phase.to_owned(),
                    errors,
                })
            }
            FailurePolicy::Tolerate => {
                for e in errors.iter() {
                    warn!("Phase `{phase}`: {e}");
                }
                Ok(PhaseOutput {
                    results,
                    nb_failed: errors.len(),
                })
            }
        }
    }
}
