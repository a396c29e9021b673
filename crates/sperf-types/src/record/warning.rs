use crate::{FileId, NodeId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A record that could not be parsed. Parsing continues after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub file: FileId,
    pub node: NodeId,
    pub path: PathBuf,
    /// 1-based line number (0 when the failure is not tied to a line)
    pub line: u64,
    pub reason: String,
}
