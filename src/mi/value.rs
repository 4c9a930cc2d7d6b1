//! Tree of values carried by a single MI record.
//!
//! GDB/MI results are built from three shapes: C-strings, lists and keyed
//! tuples. Tuples preserve insertion order and may carry duplicate keys
//! (GDB emits `frame={…}` repeatedly inside `stack=[…]`), so they are kept
//! as pair sequences rather than maps.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    List(Vec<Value>),
    Tuple(Vec<(String, Value)>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_str().and_then(|s| s.parse().ok())
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Tuple(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Access a nested value by dotted path.
    ///
    /// Plain segments select the first matching key of a tuple, numeric
    /// segments index a list. A `@`-prefixed segment selects the first
    /// alternative of a duplicated key inside a list of keyed tuples
    /// (`stack=[frame={…},frame={…}]` is addressed as `stack.@frame`).
    pub fn path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.') {
            current = current.step(segment)?;
        }
        Some(current)
    }

    /// All alternatives for a `@`-style duplicated key. Non-list values
    /// and plain paths degrade to a zero- or one-element vector.
    pub fn path_all(&self, path: &str) -> Vec<&Value> {
        let Some((head, last)) = path.rsplit_once('.') else {
            return self.step_all(path);
        };
        match self.path(head) {
            Some(v) => v.step_all(last),
            None => Vec::new(),
        }
    }

    pub fn str_at(&self, path: &str) -> Option<&str> {
        self.path(path).and_then(Value::as_str)
    }

    pub fn u64_at(&self, path: &str) -> Option<u64> {
        self.path(path).and_then(Value::as_u64)
    }

    fn step(&self, segment: &str) -> Option<&Value> {
        self.step_all(segment).into_iter().next()
    }

    fn step_all(&self, segment: &str) -> Vec<&Value> {
        if let Some(key) = segment.strip_prefix('@') {
            return self.alternatives(key);
        }
        match self {
            Value::Tuple(pairs) => pairs
                .iter()
                .find(|(k, _)| k == segment)
                .map(|(_, v)| v)
                .into_iter()
                .collect(),
            Value::List(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get(idx))
                .into_iter()
                .collect(),
            Value::String(_) => Vec::new(),
        }
    }

    fn alternatives(&self, key: &str) -> Vec<&Value> {
        match self {
            // [frame={…},frame={…}] parses into one-pair tuples.
            Value::List(items) => items
                .iter()
                .flat_map(|item| match item {
                    Value::Tuple(pairs) => pairs
                        .iter()
                        .filter(|(k, _)| k == key)
                        .map(|(_, v)| v)
                        .collect(),
                    _ => Vec::new(),
                })
                .collect(),
            Value::Tuple(pairs) => pairs
                .iter()
                .filter(|(k, _)| k == key)
                .map(|(_, v)| v)
                .collect(),
            Value::String(_) => Vec::new(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{s}\""),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Tuple(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}
