//! Diagnostics surfaced as status conditions and events

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::resource::{KubeObject, ResourceId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ProblemSeverity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for ProblemSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProblemSeverity::Error => "Error",
            ProblemSeverity::Warning => "Warning",
            ProblemSeverity::Info => "Info",
        };
        f.write_str(s)
    }
}

/// Reason code used for the event/condition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ProblemReason {
    Rejected,
    NoIngressMasterFound,
    NoVirtualServerFound,
    Ignored,
}

impl fmt::Display for ProblemReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProblemReason::Rejected => "Rejected",
            ProblemReason::NoIngressMasterFound => "NoIngressMasterFound",
            ProblemReason::NoVirtualServerFound => "NoVirtualServerFound",
            ProblemReason::Ignored => "Ignored",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConfigurationProblem {
    pub object: KubeObject,
    pub severity: ProblemSeverity,
    pub reason: ProblemReason,
    pub message: String,
}

impl ConfigurationProblem {
    pub fn new(
        object: KubeObject,
        severity: ProblemSeverity,
        reason: ProblemReason,
        message: impl Into<String>,
    ) -> Self {
        Self {
            object,
            severity,
            reason,
            message: message.into(),
        }
    }

    pub fn rejected(object: KubeObject, severity: ProblemSeverity, message: impl Into<String>) -> Self {
        Self::new(object, severity, ProblemReason::Rejected, message)
    }

    /// Same diagnosis, ignoring the object snapshot
    fn same_diagnosis(&self, other: &ConfigurationProblem) -> bool {
        self.severity == other.severity && self.reason == other.reason && self.message == other.message
    }
}

/// Remembers what was reported per object and emits only what changed
#[derive(Debug, Default)]
pub struct ProblemReporter {
    reported: BTreeMap<ResourceId, ConfigurationProblem>,
}

impl ProblemReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the recorded problems with `current`, returning new or changed ones
    /// in object order. Objects absent from `current` are forgotten.
    pub fn report(&mut self, current: BTreeMap<ResourceId, ConfigurationProblem>) -> Vec<ConfigurationProblem> {
        let fresh = current
            .iter()
            .filter(|(id, problem)| {
                self.reported
                    .get(*id)
                    .map_or(true, |previous| !previous.same_diagnosis(problem))
            })
            .map(|(_, problem)| problem.clone())
            .collect();

        self.reported = current;
        fresh
    }

    /// Last reported problem for an object
    pub fn get(&self, id: &ResourceId) -> Option<&ConfigurationProblem> {
        self.reported.get(id)
    }

    pub fn len(&self) -> usize {
        self.reported.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reported.is_empty()
    }
}
