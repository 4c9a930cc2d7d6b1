use std::collections::HashMap;
use std::path::PathBuf;

/// A breakpoint requested by the UI. Either *raw* (opaque location string
/// passed to gdb verbatim) or *mapped* (COBOL file+line resolved through
/// the source map).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Breakpoint {
    pub file: Option<PathBuf>,
    pub line: Option<u64>,
    pub raw: Option<String>,
    pub condition: Option<String>,
    pub count_condition: Option<String>,
}

impl Breakpoint {
    pub fn at_line(file: impl Into<PathBuf>, line: u64) -> Self {
        Breakpoint {
            file: Some(file.into()),
            line: Some(line),
            ..Default::default()
        }
    }

    pub fn at_raw(location: impl Into<String>) -> Self {
        Breakpoint {
            raw: Some(location.into()),
            ..Default::default()
        }
    }

    /// Two breakpoints denote the same location regardless of conditions.
    /// Raw locations compare by the raw string alone, so a canonical
    /// record (raw plus back-translated coordinates) still matches the
    /// original request.
    fn same_location(&self, other: &Breakpoint) -> bool {
        match (&self.raw, &other.raw) {
            (Some(a), Some(b)) => a == b,
            (None, None) => self.file == other.file && self.line == other.line,
            _ => false,
        }
    }
}

/// Bidirectional mapping between live breakpoints and gdb numbers.
#[derive(Debug, Default)]
pub struct BreakpointTable {
    by_number: HashMap<u64, Breakpoint>,
}

impl BreakpointTable {
    pub fn insert(&mut self, number: u64, bp: Breakpoint) {
        self.by_number.insert(number, bp);
    }

    pub fn number_of(&self, bp: &Breakpoint) -> Option<u64> {
        self.by_number
            .iter()
            .find(|(_, candidate)| candidate.same_location(bp))
            .map(|(number, _)| *number)
    }

    pub fn contains(&self, bp: &Breakpoint) -> bool {
        self.number_of(bp).is_some()
    }

    pub fn remove(&mut self, number: u64) -> Option<Breakpoint> {
        self.by_number.remove(&number)
    }

    pub fn clear(&mut self) {
        self.by_number.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &Breakpoint)> {
        self.by_number.iter().map(|(number, bp)| (*number, bp))
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_table_identity_ignores_condition() {
        let mut table = BreakpointTable::default();
        let mut bp = Breakpoint::at_line("/abs/hello.cbl", 10);
        bp.condition = Some("x > 0".to_string());
        table.insert(1, bp);

        let same_place = Breakpoint::at_line("/abs/hello.cbl", 10);
        assert_eq!(table.number_of(&same_place), Some(1));
        assert!(table.contains(&same_place));
        assert!(!table.contains(&Breakpoint::at_line("/abs/hello.cbl", 11)));
        assert!(!table.contains(&Breakpoint::at_raw("main")));

        assert!(table.remove(1).is_some());
        assert!(table.is_empty());
    }
}
