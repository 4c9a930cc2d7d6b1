//! COBOL<->C source map.
//!
//! The COBOL compiler annotates the C it generates with marker comments
//! tying every statement and data item back to its COBOL origin. This
//! module scans those files (following `#include` directives recursively)
//! and indexes the correspondences both ways. Expected scale is thousands
//! of entries; plain vectors and hash maps are enough.

use crate::debugger::error::Error;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Component, Path, PathBuf};

/// `/* Generated from hello.cbl */`
static GENERATED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/\*\s*Generated from\s+([^*]+?)\s*\*/").unwrap());

/// `/* Line: 10 ... : hello.cbl */` — the COBOL path is the last
/// colon-separated field, when present.
static LINE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/\*\s*Line:\s*(\d+)([^*]*)\*/").unwrap());

/// `static cob_u8_t b_9[8] ... /* WS-COUNT */`
static VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)static\s+cob_u8_t\s+([A-Za-z_][A-Za-z0-9_]*).*/\*\s*([^*\s]+)\s*\*/")
        .unwrap()
});

static INCLUDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*#include\s+"([^"]+)""#).unwrap());

/// One line correspondence. Identity is `(cobol_file, cobol_line)`; for a
/// given COBOL coordinate there is at most one current C coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry {
    pub cobol_file: PathBuf,
    pub cobol_line: u64,
    pub c_file: PathBuf,
    pub c_line: u64,
}

#[derive(Debug, Default)]
pub struct SourceMap {
    cwd: PathBuf,
    lines: Vec<LineEntry>,
    cobol_by_c_name: HashMap<String, String>,
    c_by_cobol_name: HashMap<String, String>,
}

impl SourceMap {
    /// Scan the generated C file of every COBOL source in `sources`
    /// (`X.cbl` -> `X.c`, relative paths resolved against `cwd`).
    pub fn build(
        cwd: impl Into<PathBuf>,
        sources: &[impl AsRef<Path>],
    ) -> Result<Self, Error> {
        let mut map = SourceMap {
            cwd: cwd.into(),
            ..Default::default()
        };
        let mut visited = HashSet::new();
        for source in sources {
            let c_file = map.absolute(source.as_ref().with_extension("c"));
            map.scan_file(&c_file, &mut visited)?;
        }
        log::debug!(
            target: "mapper",
            "source map ready: {} line entries, {} variables",
            map.lines.len(),
            map.cobol_by_c_name.len()
        );
        Ok(map)
    }

    fn scan_file(&mut self, c_file: &Path, visited: &mut HashSet<PathBuf>) -> Result<(), Error> {
        if !visited.insert(c_file.to_path_buf()) {
            return Ok(());
        }

        let reader = BufReader::new(File::open(c_file)?);
        let mut current_cobol: Option<PathBuf> = None;

        for (idx, line) in reader.lines().enumerate() {
            let lineno = idx as u64 + 1;
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    log::warn!(
                        target: "mapper",
                        "skipping unreadable line {}:{lineno}: {err}",
                        c_file.display()
                    );
                    continue;
                }
            };

            if let Some(caps) = GENERATED.captures(&line) {
                current_cobol = Some(self.absolute(caps[1].trim()));
            } else if let Some(caps) = LINE_MARKER.captures(&line) {
                let cobol_line: u64 = match caps[1].parse() {
                    Ok(n) => n,
                    Err(_) => continue,
                };
                let inline = caps[2]
                    .rsplit_once(':')
                    .map(|(_, path)| path.trim())
                    .filter(|path| !path.is_empty())
                    .map(|path| self.absolute(path));
                if let Some(cobol_file) = inline.or_else(|| current_cobol.clone()) {
                    // The marker is the comment immediately preceding the
                    // statement it describes.
                    self.push_line(LineEntry {
                        cobol_file,
                        cobol_line,
                        c_file: c_file.to_path_buf(),
                        c_line: lineno + 2,
                    });
                }
            } else if let Some(caps) = VARIABLE.captures(&line) {
                let c_name = caps[1].to_string();
                let cobol_name = caps[2].to_string();
                self.cobol_by_c_name.insert(c_name.clone(), cobol_name.clone());
                self.c_by_cobol_name.insert(cobol_name, c_name);
            } else if let Some(caps) = INCLUDE.captures(&line) {
                let included = self.resolve_include(c_file, &caps[1]);
                self.scan_file(&included, visited)?;
            }
        }

        Ok(())
    }

    fn push_line(&mut self, entry: LineEntry) {
        // Consecutive markers for the same COBOL statement keep the last
        // C position seen.
        if let Some(last) = self.lines.last_mut() {
            if last.cobol_file == entry.cobol_file && last.cobol_line == entry.cobol_line {
                *last = entry;
                return;
            }
        }
        self.lines.push(entry);
    }

    /// C coordinate for a COBOL file+line, or `None` when unmapped.
    /// Later entries shadow earlier ones for the same COBOL coordinate.
    pub fn c_for_line(&self, cobol_file: impl AsRef<Path>, cobol_line: u64) -> Option<&LineEntry> {
        let cobol_file = self.absolute(cobol_file);
        self.lines
            .iter()
            .rev()
            .find(|e| e.cobol_line == cobol_line && e.cobol_file == cobol_file)
    }

    /// COBOL coordinate for a C file+line, or `None` when unmapped.
    pub fn cobol_for_line(&self, c_file: impl AsRef<Path>, c_line: u64) -> Option<&LineEntry> {
        let c_file = self.absolute(c_file);
        self.lines
            .iter()
            .rev()
            .find(|e| e.c_line == c_line && e.c_file == c_file)
    }

    pub fn has_c_name(&self, c_name: &str) -> bool {
        self.cobol_by_c_name.contains_key(c_name)
    }

    pub fn cobol_name_for(&self, c_name: &str) -> Option<&str> {
        self.cobol_by_c_name.get(c_name).map(String::as_str)
    }

    /// Mangled C identifier for a COBOL data item. ASCII double quotes are
    /// stripped from the query first (UIs quote watch expressions).
    pub fn c_name_for(&self, cobol_name: &str) -> Option<&str> {
        let stripped = cobol_name.replace('"', "");
        self.c_by_cobol_name.get(&stripped).map(String::as_str)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn variable_count(&self) -> usize {
        self.cobol_by_c_name.len()
    }

    /// Resolve relative paths against the map's working directory and
    /// normalize lexically (queried files need not exist on disk).
    pub fn absolute(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        };
        normalize(&joined)
    }

    fn resolve_include(&self, including: &Path, rel: &str) -> PathBuf {
        let rel = Path::new(rel);
        if rel.is_absolute() {
            return normalize(rel);
        }
        match including.parent() {
            Some(dir) => normalize(&dir.join(rel)),
            None => self.absolute(rel),
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
