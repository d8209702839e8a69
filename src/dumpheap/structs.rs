//! The structs
//!
use indexmap::IndexMap;
use serde::Serializer;

/// A single `dumpheap -stat` line.
///
/// The field order is the CSV column order.
/// Count and total size are signed: after subtracting a baseline they can drop below zero.
#[derive(Serialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct HeapInfo {
    pub count: i64,
    pub total_size: i64,
    pub mt: String,
    #[serde(serialize_with = "quoted")]
    pub class_name: String,
}

/// All heap lines of a dump, keyed by method table, in the order of the dump.
#[derive(Debug, Default)]
pub struct HeapDump {
    pub heapinfo: IndexMap<String, HeapInfo>,
}

/// The class name is always written between double quotes, embedded quotes are doubled.
fn quoted<S: Serializer>(
    value: &str,
    serializer: S,
) -> Result<S::Ok, S::Error>
{
    serializer.serialize_str(&format!("\"{}\"", value.replace('"', "\"\"")))
}
