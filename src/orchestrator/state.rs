use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;
use crate::plan::Plan;

/// The orchestrator's state machine phase (§3/§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    AwaitingTask,
    Planning,
    Executing,
    Replanning,
    Finalizing,
    Terminal,
}

/// A dispatched-instruction fingerprint used by the loop guard: three
/// identical consecutive triples force a replan before a fourth identical
/// dispatch happens (§4.3 edge case).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchFingerprint {
    pub agent_name: String,
    pub instruction: String,
    pub step_index: usize,
}

/// Everything the Orchestrator owns for the lifetime of one session
/// (§3 "OrchestratorState"). The Plan, if any, lives here too — the
/// Scheduler only ever borrows it read-only.
#[derive(Debug, Clone)]
pub struct OrchestratorState {
    pub phase: Phase,
    pub plan: Option<Plan>,
    pub step_index: usize,
    pub step_attempts: u32,
    pub replan_count: u32,
    pub transcript: Vec<ChatMessage>,
    pub pending_followup: Option<ChatMessage>,
    recent_dispatches: VecDeque<DispatchFingerprint>,
    next_seq: u64,
}

impl OrchestratorState {
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitingTask,
            plan: None,
            step_index: 0,
            step_attempts: 0,
            replan_count: 0,
            transcript: Vec::new(),
            pending_followup: None,
            recent_dispatches: VecDeque::with_capacity(3),
            next_seq: 0,
        }
    }

    pub fn push_transcript(&mut self, mut message: ChatMessage) {
        message.seq = self.next_seq;
        self.next_seq += 1;
        self.transcript.push(message);
    }

    pub fn reset_for_new_plan(&mut self, plan: Plan) {
        self.plan = Some(plan);
        self.step_index = 0;
        self.step_attempts = 0;
        self.recent_dispatches.clear();
    }

    /// Records a dispatch fingerprint and reports whether the *previous*
    /// three dispatches were all identical to this one — i.e. this would
    /// be the fourth identical dispatch in a row.
    pub fn record_dispatch_and_check_loop(&mut self, fingerprint: DispatchFingerprint) -> bool {
        let repeats_all_three = self.recent_dispatches.len() == 3 && self.recent_dispatches.iter().all(|d| *d == fingerprint);
        if self.recent_dispatches.len() == 3 {
            self.recent_dispatches.pop_front();
        }
        self.recent_dispatches.push_back(fingerprint);
        repeats_all_three
    }
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self::new()
    }
}
