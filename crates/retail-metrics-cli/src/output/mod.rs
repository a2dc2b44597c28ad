pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Fields that hold a command's main record list.
const RECORD_FIELDS: [&str; 4] = ["records", "lines", "rows", "members"];

/// The record list a tabular formatter should render: the result itself when
/// it is an array, otherwise its first record-list field.
pub(crate) fn primary_records(result: &Value) -> Option<&[Value]> {
    match result {
        Value::Array(arr) => Some(arr),
        Value::Object(map) => RECORD_FIELDS.iter().find_map(|f| match map.get(*f) {
            Some(Value::Array(arr)) => Some(arr.as_slice()),
            _ => None,
        }),
        _ => None,
    }
}

/// Union of keys across records, in first-seen order.
pub(crate) fn record_headers(records: &[Value]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for record in records {
        if let Value::Object(map) = record {
            for key in map.keys() {
                if !headers.iter().any(|h| h == key) {
                    headers.push(key.clone());
                }
            }
        }
    }
    headers
}
