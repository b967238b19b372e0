//! Project, scenario, and stored-file models.
//!
//! These mirror what the external record store persists. The orchestrator
//! only reads them; creation and editing happen elsewhere.

use serde::{Deserialize, Serialize};

/// Setting key: timestamp (ms) of the last result generation, `"0"` if never.
pub const SETTING_RES_GEN_AT: &str = "res_gen_at";
/// Setting key: whether road-network editing is active for the scenario.
pub const SETTING_RN_ACTIVE_EDITING: &str = "rn_active_editing";
/// Setting key: timestamp (ms) of the last road-network modification.
pub const SETTING_RN_UPDATED_AT: &str = "rn_updated_at";

/// Stored-file kind: the scenario's road network export.
pub const FILE_ROAD_NETWORK: &str = "road-network";
/// Stored-file kinds holding generated analysis results.
pub const RESULT_FILE_KINDS: [&str; 3] = ["results-csv", "results-json", "results-geojson"];

/// Lifecycle status of a project.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    /// Still being set up; scenarios cannot run analyses yet.
    Pending,

    /// Fully set up and usable.
    Active,
}

/// A project as read from the record store.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub status: ProjectStatus,
}

/// A scenario as read from the record store.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Scenario {
    pub id: u64,
    pub project_id: u64,
    pub name: String,

    /// Administrative areas selected for analysis. A generation job
    /// requires at least one selection.
    pub admin_areas: Vec<String>,
}

/// Metadata record for a blob stored in the object store.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileRecord {
    pub id: u64,
    pub project_id: u64,
    pub scenario_id: u64,

    /// File kind, e.g. [`FILE_ROAD_NETWORK`] or one of [`RESULT_FILE_KINDS`].
    pub kind: String,

    /// Path of the blob inside the object store.
    pub path: String,
}
