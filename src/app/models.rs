use serde::Serialize;
use std::path::PathBuf;

/// Where an entry in the plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// A top-level folder found under `default_src`.
    Implicit,
    /// An `[[items]]` entry in the config file.
    Declared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "pattern")]
pub enum EntryState {
    Enabled,
    Disabled,
    Excluded(String),
}

/// One implicit or declared item after destination resolution.
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub origin: Origin,
    #[serde(flatten)]
    pub state: EntryState,
    /// Source of the entry the destination was inherited from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<PathBuf>,
}

/// A fully computed source/destination pair ready for the copy tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTask {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Sub-paths of `source` handled elsewhere (own task or disabled).
    pub skip: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub default_src: PathBuf,
    pub default_dest: PathBuf,
    pub entries: Vec<PlanEntry>,
    pub tasks: Vec<ResolvedTask>,
}
