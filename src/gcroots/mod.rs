//! Module for turning `gcroot` output into a DGML graph.
//!
//! The `gcroot` command of the SOS debugger extension prints the chain of references that keeps
//! an object alive, starting at a GC root:
//!
//! ```text
//!     ->  000001DE8B4520D0 System.Windows.Threading.Dispatcher
//!     ->  000001DE8B4A1B28 System.Collections.Generic.List`1[[System.Object, System.Private.CoreLib]]
//! ```
//!
//! leakdiag doesn't do anything other than:
//! - read the log and pick up every `->` line with a 16 character hexadecimal address.
//! - create a node per address, and a link from the previous address in the chain to it.
//! - write the nodes and links as a DGML `DirectedGraph` document.
//!
mod structs;
mod functions;

pub use structs::*;
pub use functions::*;
