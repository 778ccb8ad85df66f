//! Progress reporting module
//!
//! Shows the tuning loop's iteration count and current state on the terminal.

mod reporter;

pub use reporter::*;
