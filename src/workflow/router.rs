// SPDX-License-Identifier: MIT

//! Routing decisions and the bounded quality loop
//!
//! A `Router` maps state to a decision label; the conditional edge owning it
//! maps the label to the next node. `LoopGuard` caps how many times a cycle
//! may run and is consulted both by the router and by the engine before the
//! guarded node is scheduled.

use crate::workflow::state::WorkflowState;
use std::fmt;

/// Default cap on revision rounds
pub const MAX_FIXES: u32 = 3;

/// Pure decision function over the state
pub trait Router: Send + Sync {
    fn route(&self, state: &WorkflowState) -> &'static str;
}

/// Caps the iterations of a cycle by reading a counter from the state
#[derive(Clone, Copy)]
pub struct LoopGuard {
    limit: u32,
    counter: fn(&WorkflowState) -> u32,
}

impl fmt::Debug for LoopGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopGuard")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

impl LoopGuard {
    pub fn new(limit: u32, counter: fn(&WorkflowState) -> u32) -> Self {
        Self { limit, counter }
    }

    /// Guard over `fix_num`
    pub fn fix_budget(max_fixes: u32) -> Self {
        Self::new(max_fixes, |state| state.fix_num)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn used(&self, state: &WorkflowState) -> u32 {
        (self.counter)(state)
    }

    /// Whether one more iteration is allowed
    pub fn allows(&self, state: &WorkflowState) -> bool {
        self.used(state) < self.limit
    }
}

/// Outcome of routing after a quality review
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityDecision {
    /// Send the draft back for another revision round
    Revise,
    /// Stop the loop; the run ends
    Finish,
}

impl QualityDecision {
    pub const REVISE: &'static str = "revise";
    pub const FINISH: &'static str = "finish";

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityDecision::Revise => Self::REVISE,
            QualityDecision::Finish => Self::FINISH,
        }
    }
}

/// Routes after `quality_checker`: revise while a revision request is
/// outstanding and the fix budget allows it, otherwise finish.
#[derive(Debug, Clone, Copy)]
pub struct QualityRouter {
    guard: LoopGuard,
}

impl QualityRouter {
    pub fn new(guard: LoopGuard) -> Self {
        Self { guard }
    }

    pub fn decide(&self, state: &WorkflowState) -> QualityDecision {
        if state.needs_revision() && self.guard.allows(state) {
            QualityDecision::Revise
        } else {
            QualityDecision::Finish
        }
    }
}

impl Router for QualityRouter {
    fn route(&self, state: &WorkflowState) -> &'static str {
        let decision = self.decide(state);
        if decision == QualityDecision::Finish && state.needs_revision() {
            log::warn!(
                "Fix budget spent ({} of {}), finishing with revision still requested",
                self.guard.used(state),
                self.guard.limit()
            );
        }
        decision.as_str()
    }
}
