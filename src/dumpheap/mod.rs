//! Module for comparing `dumpheap -stat` output.
//!
//! The `dumpheap -stat` command of the SOS debugger extension prints one line per type on the heap:
//!
//! ```text
//!               MT    Count    TotalSize Class Name
//! 00007ff80d35b350        1           24 System.Threading.Tasks.SynchronizationContextAwaitTaskContinuation+<>c
//! ```
//!
//! The method table (MT) is the identity of a type.
//! Three dumps are read: a baseline, one before and one after a test scenario.
//! The baseline is subtracted from the before and after dumps, and whatever is left with a positive count
//! is written to CSV, largest count first, so types that keep growing stand out.
//!
mod structs;
mod functions;

pub use structs::*;
pub use functions::*;
