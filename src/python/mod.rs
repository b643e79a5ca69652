#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Everything that knows it is talking to CPython.

/// Driver message types.
pub mod protocol;
/// Interpreter discovery and command construction.
pub mod util;
/// Python value model.
pub mod value;

pub use protocol::ProbeCall;
pub use value::{CallOutcome, FunctionValue, OpaqueValue, Value, ValueKind};

/// Script run with `python -c`: compiles the submission, executes it in a
/// fresh `__main__` module, snapshots the bindings, performs probe calls and
/// writes a JSON report.
pub const DRIVER_SOURCE: &str = include_str!("driver.py");
