//! GDB/MI v2 protocol records.
//!
//! One logical output line parses into a [`Record`]: an optional command
//! token, an optional result record and a list of out-of-band records.

pub mod parser;
pub mod value;

pub use parser::parse_line;
pub use value::Value;

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

impl FromStr for ResultClass {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "done" => Ok(ResultClass::Done),
            "running" => Ok(ResultClass::Running),
            "connected" => Ok(ResultClass::Connected),
            "error" => Ok(ResultClass::Error),
            "exit" => Ok(ResultClass::Exit),
            _ => Err(()),
        }
    }
}

/// Stream record type, conveyed to the UI verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Console,
    Target,
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    Exec,
    Status,
    Notify,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub class: ResultClass,
    pub results: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsyncRecord {
    pub kind: AsyncKind,
    pub class: String,
    pub results: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRecord {
    pub kind: StreamKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutOfBand {
    Stream(StreamRecord),
    Async(AsyncRecord),
}

/// One parsed MI output line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    pub token: Option<u64>,
    pub result: Option<ResultRecord>,
    pub out_of_band: Vec<OutOfBand>,
}

impl Record {
    pub fn class(&self) -> Option<ResultClass> {
        self.result.as_ref().map(|r| r.class)
    }

    /// The root results tuple of the result record, when present.
    pub fn values(&self) -> Option<&Value> {
        self.result.as_ref().map(|r| &r.results)
    }

    /// Access a result value by dotted path (see [`Value::path`]).
    pub fn result(&self, path: &str) -> Option<&Value> {
        self.result.as_ref().and_then(|r| r.results.path(path))
    }

    pub fn result_str(&self, path: &str) -> Option<&str> {
        self.result(path).and_then(Value::as_str)
    }

    pub fn result_u64(&self, path: &str) -> Option<u64> {
        self.result(path).and_then(Value::as_u64)
    }

    pub fn streams(&self) -> impl Iterator<Item = &StreamRecord> {
        self.out_of_band.iter().filter_map(|oob| match oob {
            OutOfBand::Stream(s) => Some(s),
            _ => None,
        })
    }

    pub fn asyncs(&self) -> impl Iterator<Item = &AsyncRecord> {
        self.out_of_band.iter().filter_map(|oob| match oob {
            OutOfBand::Async(a) => Some(a),
            _ => None,
        })
    }
}
