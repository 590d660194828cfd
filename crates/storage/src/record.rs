use serde_json::Value;

/// One row of a collection: a mapping of column name to scalar/null value.
///
/// The storage layer is schema-free; typed views deserialize a `Record` into
/// their own per-collection struct at the call site.
pub type Record = serde_json::Map<String, Value>;

/// Read a column from a record, treating an absent column as null.
pub fn record_column<'a>(record: &'a Record, column: &str) -> &'a Value {
    record.get(column).unwrap_or(&Value::Null)
}
