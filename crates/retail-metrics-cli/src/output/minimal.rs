use serde_json::Value;

/// Print just the headline figure from the output.
///
/// Looks for well-known fields in priority order (descending into `totals`
/// for a full report), falls back to a row count for record lists, then to
/// the first field of the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let priority_keys = [
        "total_profit",
        "total_revenue",
        "lines_analysed",
        "lines_derived",
    ];

    if let Value::Array(arr) = result_obj {
        println!("{} rows", arr.len());
        return;
    }

    if let Value::Object(map) = result_obj {
        let scopes = [map.get("totals"), Some(result_obj)];
        for scope in scopes.into_iter().flatten() {
            for key in &priority_keys {
                if let Some(val) = scope.get(*key) {
                    if !val.is_null() {
                        println!("{}", format_minimal(val));
                        return;
                    }
                }
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
