use std::path::PathBuf;

/// One stack frame, in COBOL coordinates when a mapping exists and raw C
/// coordinates otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub level: u64,
    pub address: String,
    pub function: String,
    pub file: PathBuf,
    pub file_basename: String,
    pub line: u64,
}
