//! leakdiag: offline helpers for chasing memory leaks with the SOS debugger extension.
//!
//! - [gcroots]: turn `gcroot` output into a DGML graph of the reference chain.
//! - [dumpheap]: subtract a baseline `dumpheap -stat` from two later ones and write the growth as CSV.
//!
#[macro_use]
extern crate serde_derive;

pub mod gcroots;
pub mod dumpheap;
pub mod utility;
