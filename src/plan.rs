use either::Either;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::team::Team;

/// The shared fields of every step, sentinel or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCore {
    pub title: String,
    pub details: String,
    pub agent_name: String,
}

/// Either an exact repeat count or a natural-language predicate. Reuses
/// `either`, already part of the dependency stack, instead of a bespoke
/// two-variant enum.
pub type Condition = Either<u32, String>;

/// One step of a plan: an ordinary turn, or a sentinel that polls a
/// condition on a cadence (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Step {
    Plan(StepCore),
    Sentinel {
        core: StepCore,
        sleep_duration_seconds: u32,
        condition: Condition,
    },
}

impl Step {
    pub fn core(&self) -> &StepCore {
        match self {
            Step::Plan(core) => core,
            Step::Sentinel { core, .. } => core,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, Step::Sentinel { .. })
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("needs_plan is true but the plan has no steps")]
    NeedsPlanWithoutSteps,
    #[error("needs_plan is false but response text is empty")]
    DirectAnswerWithoutResponse,
    #[error("step {index} references unknown agent '{agent_name}'")]
    UnknownAgent { index: usize, agent_name: String },
    #[error("sentinel step {index} has a non-positive sleep_duration_seconds")]
    NonPositiveSleepDuration { index: usize },
}

/// Either a direct `response` to the user (no plan needed) or an ordered
/// sequence of steps to execute (§3 "Plan"). Immutable once constructed;
/// replanning produces a brand new value rather than mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub task: String,
    pub plan_summary: String,
    pub needs_plan: bool,
    pub response: String,
    pub steps: Vec<Step>,
}

impl Plan {
    /// Validates the cross-field invariants from §3 and the "unknown
    /// agent" edge case from §4.3, given the team the plan was built for.
    pub fn validate(&self, team: &Team) -> Result<(), PlanError> {
        if self.needs_plan {
            if self.steps.is_empty() {
                return Err(PlanError::NeedsPlanWithoutSteps);
            }
        } else if self.response.trim().is_empty() {
            return Err(PlanError::DirectAnswerWithoutResponse);
        }

        for (index, step) in self.steps.iter().enumerate() {
            let agent_name = &step.core().agent_name;
            if !team.has_agent(agent_name) {
                return Err(PlanError::UnknownAgent { index, agent_name: agent_name.clone() });
            }
            if let Step::Sentinel { sleep_duration_seconds, .. } = step {
                if *sleep_duration_seconds == 0 {
                    return Err(PlanError::NonPositiveSleepDuration { index });
                }
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn is_sentinel(&self, index: usize) -> bool {
        self.step(index).is_some_and(Step::is_sentinel)
    }

    /// Renders the plan for embedding into a prompt (§4.2).
    pub fn pretty(&self) -> String {
        if !self.needs_plan {
            return format!("(no plan needed)\n{}", self.response);
        }
        let mut out = format!("Task: {}\nSummary: {}\n", self.task, self.plan_summary);
        for (i, step) in self.steps.iter().enumerate() {
            let core = step.core();
            out.push_str(&format!("{}. [{}] {} - {}\n", i + 1, core.agent_name, core.title, core.details));
            if let Step::Sentinel { sleep_duration_seconds, condition, .. } = step {
                let condition_text = match condition {
                    Either::Left(count) => format!("repeat {count} times"),
                    Either::Right(text) => format!("until: {text}"),
                };
                out.push_str(&format!("   (sentinel, sleep {sleep_duration_seconds}s, {condition_text})\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::AgentDescriptor;

    fn team() -> Team {
        Team::new(vec![
            AgentDescriptor::new("web_surfer", "browses the web"),
            AgentDescriptor::new("coder_agent", "writes and runs code"),
        ])
        .unwrap()
    }

    #[test]
    fn direct_answer_plan_is_valid_without_steps() {
        let plan = Plan {
            task: "paraphrase".into(),
            plan_summary: String::new(),
            needs_plan: false,
            response: "A swift brown fox leaps over a sluggish dog.".into(),
            steps: vec![],
        };
        assert!(plan.validate(&team()).is_ok());
    }

    #[test]
    fn plan_referencing_unknown_agent_is_rejected() {
        let plan = Plan {
            task: "do it".into(),
            plan_summary: "one step".into(),
            needs_plan: true,
            response: String::new(),
            steps: vec![Step::Plan(StepCore {
                title: "t".into(),
                details: "d".into(),
                agent_name: "mystery_agent".into(),
            })],
        };
        assert!(matches!(plan.validate(&team()), Err(PlanError::UnknownAgent { .. })));
    }

    #[test]
    fn sentinel_step_with_zero_sleep_is_rejected() {
        let plan = Plan {
            task: "watch".into(),
            plan_summary: "sentinel".into(),
            needs_plan: true,
            response: String::new(),
            steps: vec![Step::Sentinel {
                core: StepCore { title: "t".into(), details: "d".into(), agent_name: "web_surfer".into() },
                sleep_duration_seconds: 0,
                condition: Either::Left(5),
            }],
        };
        assert!(matches!(plan.validate(&team()), Err(PlanError::NonPositiveSleepDuration { index: 0 })));
    }

    #[test]
    fn is_sentinel_reflects_step_kind() {
        let plan = Plan {
            task: "t".into(),
            plan_summary: String::new(),
            needs_plan: true,
            response: String::new(),
            steps: vec![
                Step::Plan(StepCore { title: "a".into(), details: "b".into(), agent_name: "web_surfer".into() }),
                Step::Sentinel {
                    core: StepCore { title: "a".into(), details: "b".into(), agent_name: "web_surfer".into() },
                    sleep_duration_seconds: 30,
                    condition: Either::Left(5),
                },
            ],
        };
        assert!(!plan.is_sentinel(0));
        assert!(plan.is_sentinel(1));
    }
}
