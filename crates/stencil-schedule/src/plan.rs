//! Phase planning.
//!
//! Groups block analyses into ordered phases. Blocks in one phase have no
//! dependency on each other in either direction, so they may run at the same
//! time; every dependency points at an earlier phase.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::analysis::BlockAnalysis;

/// A set of blocks that run together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPhase {
    pub index: usize,
    /// Ordered by block id.
    pub blocks: Vec<BlockAnalysis>,
}

impl ExecutionPhase {
    /// More than one block and no barrier.
    pub fn can_parallelize(&self) -> bool {
        self.blocks.len() > 1 && !self.has_barrier()
    }

    pub fn has_barrier(&self) -> bool {
        self.blocks.iter().any(|block| block.is_barrier)
    }

    pub fn block_ids(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks.iter().map(|block| block.block_id)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Ordered phases covering every block exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    pub phases: Vec<ExecutionPhase>,
    pub total_blocks: usize,
    /// Blocks in phases of more than one block.
    pub parallelizable_blocks: usize,
}

impl ExecutionPlan {
    fn from_phases(phases: Vec<ExecutionPhase>) -> Self {
        let total_blocks = phases.iter().map(ExecutionPhase::len).sum();
        let parallelizable_blocks = phases
            .iter()
            .filter(|phase| phase.len() > 1)
            .map(ExecutionPhase::len)
            .sum();
        Self {
            phases,
            total_blocks,
            parallelizable_blocks,
        }
    }

    /// Share of blocks in multi-block phases, `0.0` for an empty plan.
    pub fn parallelization_ratio(&self) -> f64 {
        if self.total_blocks == 0 {
            0.0
        } else {
            self.parallelizable_blocks as f64 / self.total_blocks as f64
        }
    }

    /// Index of the phase holding `block_id`.
    pub fn phase_of(&self, block_id: usize) -> Option<usize> {
        self.phases
            .iter()
            .find(|phase| phase.block_ids().any(|id| id == block_id))
            .map(|phase| phase.index)
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} blocks in {} phases, {} parallelizable ({:.0}%)",
            self.total_blocks,
            self.phases.len(),
            self.parallelizable_blocks,
            self.parallelization_ratio() * 100.0
        )
    }
}

/// Greedy phase builder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler;

impl Scheduler {
    pub fn new() -> Self {
        Self
    }

    /// Build the plan. Analyses may come in any order; ids define the order.
    pub fn plan(&self, mut analyses: Vec<BlockAnalysis>) -> ExecutionPlan {
        analyses.sort_by_key(|analysis| analysis.block_id);
        let mut pending = analyses;
        let mut phases = Vec::new();

        while !pending.is_empty() {
            let mut chosen = Vec::new();

            for candidate in 0..pending.len() {
                if self.admits(&pending, &chosen, candidate) {
                    chosen.push(candidate);
                }
            }

            if chosen.is_empty() {
                // Unreachable under the dependency rules; keeps the loop finite.
                warn!(block = pending[0].block_id, "no block admitted, scheduling alone");
                chosen.push(0);
            }

            let mut blocks = Vec::with_capacity(chosen.len());
            for index in chosen.into_iter().rev() {
                blocks.push(pending.remove(index));
            }
            blocks.reverse();

            let phase = ExecutionPhase {
                index: phases.len(),
                blocks,
            };
            debug!(
                phase = phase.index,
                blocks = ?phase.block_ids().collect::<Vec<_>>(),
                parallel = phase.can_parallelize(),
                "planned phase"
            );
            phases.push(phase);
        }

        ExecutionPlan::from_phases(phases)
    }

    /// Whether `pending[candidate]` may join the phase holding `chosen`.
    fn admits(&self, pending: &[BlockAnalysis], chosen: &[usize], candidate: usize) -> bool {
        let block = &pending[candidate];

        // Earlier blocks left out of this phase must run first, in both
        // directions of dependency.
        let blocked_by_earlier = pending[..candidate]
            .iter()
            .enumerate()
            .filter(|(index, _)| !chosen.contains(index))
            .any(|(_, earlier)| block.depends_on(earlier) || earlier.depends_on(block));
        if blocked_by_earlier {
            return false;
        }

        chosen.iter().all(|&index| {
            let member = &pending[index];
            !block.depends_on(member) && !member.depends_on(block)
        })
    }
}
