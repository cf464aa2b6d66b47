//! Cross-process signaling between the control process and recorder workers.
//!
//! Communication is one-directional and limited to one-shot flags: the parent
//! sets `stop`, the worker sets `ready`, `failed`, or `first_event`.

pub mod flag;

pub use flag::SharedFlag;
