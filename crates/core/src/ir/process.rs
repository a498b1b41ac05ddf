//! Long-running processes and schedules.

use serde::{Deserialize, Serialize};

use super::expressions::{ConditionExpr, Duration};
use super::fields::FieldSpec;
use super::llm::RetryPolicy;
use crate::error::Location;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityEvent {
    Created,
    Updated,
    Deleted,
    /// `status -> confirmed`, optionally `status draft -> confirmed`
    StatusChanged {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        to: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessTrigger {
    Entity { entity: String, event: EntityEvent },
    Signal { name: String },
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub name: String,
    /// Step to continue with, or `complete`/`fail`
    pub next: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanTaskSpec {
    pub surface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_role: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outcomes: Vec<TaskOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessStepKind {
    Service { service: String },
    WaitFor { signal: String },
    HumanTask(HumanTaskSpec),
    Subprocess { process: String },
    Parallel { steps: Vec<ProcessStep> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStep {
    pub name: String,
    pub kind: ProcessStepKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_timeout: Option<String>,
}

impl ProcessStep {
    pub fn new(name: impl Into<String>, kind: ProcessStepKind) -> Self {
        ProcessStep {
            name: name.into(),
            kind,
            condition: None,
            timeout: None,
            retry: None,
            on_success: None,
            on_failure: None,
            on_timeout: None,
        }
    }

    /// This step followed by every nested parallel branch, depth first.
    pub fn flatten(&self) -> Vec<&ProcessStep> {
        let mut out = vec![self];
        if let ProcessStepKind::Parallel { steps } = &self.kind {
            for s in steps {
                out.extend(s.flatten());
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationSpec {
    pub name: String,
    pub service: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    Skip,
    Queue,
    Cancel,
    Allow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Story names this process implements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub implements: Vec<String>,
    pub trigger: ProcessTrigger,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<FieldSpec>,
    pub steps: Vec<ProcessStep>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compensations: Vec<CompensationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    pub overlap: OverlapPolicy,
}

impl ProcessSpec {
    pub fn all_steps(&self) -> Vec<&ProcessStep> {
        self.steps.iter().flat_map(|s| s.flatten()).collect()
    }

    pub fn get_step(&self, name: &str) -> Option<&ProcessStep> {
        self.all_steps().into_iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleTiming {
    Cron { expression: String },
    Interval { every: Duration },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub timing: ScheduleTiming,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default)]
    pub catch_up: bool,
    pub overlap: OverlapPolicy,
    pub steps: Vec<ProcessStep>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_steps_flatten_depth_first() {
        let inner = ProcessStep::new(
            "notify",
            ProcessStepKind::Parallel {
                steps: vec![
                    ProcessStep::new(
                        "email",
                        ProcessStepKind::Service {
                            service: "send_email".into(),
                        },
                    ),
                    ProcessStep::new(
                        "sms",
                        ProcessStepKind::Service {
                            service: "send_sms".into(),
                        },
                    ),
                ],
            },
        );
        let names: Vec<&str> = inner.flatten().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["notify", "email", "sms"]);
    }
}
