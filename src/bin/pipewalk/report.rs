use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StatsReport {
    pub vertices: usize,
    pub edges: usize,
    /// Edge count per label.
    pub labels: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub struct VertexEntry {
    pub id: u64,
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degree: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PathsReport {
    pub from: u64,
    pub to: u64,
    pub paths: Vec<Vec<u64>>,
}
