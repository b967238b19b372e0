//! Job-key identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one orchestrated job: a `(project, scenario)` pair.
///
/// Used as the key into the process registry and to derive the
/// deterministic analysis container name. The `Display` form is the
/// registry key string, e.g. `"p12 s34"`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub project_id: u64,
    pub scenario_id: u64,
}

impl JobKey {
    pub fn new(project_id: u64, scenario_id: u64) -> Self {
        Self {
            project_id,
            scenario_id,
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{} s{}", self.project_id, self.scenario_id)
    }
}
