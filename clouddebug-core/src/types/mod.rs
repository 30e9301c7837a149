//! Cloud Debugger wire types
//!
//! JSON shapes exchanged with the debugger service. Field names follow the REST API.

mod breakpoint;
mod debuggee;

pub use breakpoint::*;
pub use debuggee::*;
