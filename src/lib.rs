//! Core of a COBOL source-level debugger adapter.
//!
//! The crate mediates between a debugger UI that thinks in COBOL source
//! coordinates and gdb (driven over its MI v2 protocol), which thinks in
//! the C sources generated by the COBOL compiler. It compiles the sources,
//! builds a [`mapper::SourceMap`] from the marker comments in the generated
//! C, opens an [`session::MiSession`] against the executable and translates
//! breakpoints, frames and variables in both directions on every
//! [`debugger::Debugger`] operation.
//!
//! The UI protocol front-end is the host's concern: it drives the facade
//! and consumes [`event::Event`]s from the receiver returned by
//! [`debugger::Debugger::new`].

pub mod debugger;
pub mod event;
pub mod mapper;
pub mod mi;
pub mod session;

pub use debugger::{Breakpoint, Debugger, LaunchOptions};
pub use event::{Channel, Event};
