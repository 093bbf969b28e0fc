//! Search, CSV export and JSON import for record lists.

use crate::error::{Error, Result};
use crate::record::{Record, RESERVED_KEYS};
use serde_json::Value;

/// Records with any string or number field containing `query`, ignoring
/// case. A blank query keeps everything.
pub fn filter<'a>(records: &'a [Record], query: &str) -> Vec<&'a Record> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return records.iter().collect();
    }
    records
        .iter()
        .filter(|r| {
            r.fields.values().any(|v| match v {
                Value::String(s) => s.to_lowercase().contains(&needle),
                Value::Number(n) => n.to_string().contains(&needle),
                _ => false,
            })
        })
        .collect()
}

/// Write records as CSV. Columns are `id`, then the payload keys, then
/// `created_date` and `updated_date`. Payload keys follow the first record
/// that has them; keys new to a record are taken in that record's key
/// order, which is alphabetical. Nested values are written as JSON text;
/// missing ones as empty cells.
pub fn to_csv(records: &[Record]) -> Result<String> {
    let mut keys: Vec<&str> = Vec::new();
    for record in records {
        for key in record.fields.keys() {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
    }

    let mut out = csv::Writer::from_writer(Vec::new());
    let header = std::iter::once("id")
        .chain(keys.iter().copied())
        .chain(["created_date", "updated_date"]);
    out.write_record(header).map_err(csv_error)?;

    for record in records {
        let flat = record.to_value();
        let row = std::iter::once("id")
            .chain(keys.iter().copied())
            .chain(["created_date", "updated_date"])
            .map(|key| cell(flat.get(key)));
        out.write_record(row).map_err(csv_error)?;
    }

    let bytes = out
        .into_inner()
        .map_err(|e| Error::Serialize(format!("csv: {e}")))?;
    String::from_utf8(bytes).map_err(|e| Error::Serialize(format!("csv: {e}")))
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn csv_error(e: csv::Error) -> Error {
    Error::Serialize(format!("csv: {e}"))
}

/// Parse an import file for `entity`: either a JSON array of records or a
/// whole exported dataset (`{"<entity>": [..], ..}`), of which only
/// `entity`'s list is taken.
///
/// Entries that carry a complete `id`/`created_date`/`updated_date` triple
/// keep it; any other object becomes a fresh record for `entity`.
pub fn parse_import(bytes: &[u8], entity: &str) -> Result<Vec<Record>> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| Error::BadInput(format!("import: {e}")))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut dataset) => match dataset.remove(entity) {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(Error::BadInput(format!("import: `{entity}` is not a list")));
            }
            None => return Ok(Vec::new()),
        },
        _ => {
            return Err(Error::BadInput(
                "import: expected a list of records or a dataset object".into(),
            ))
        }
    };
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| import_one(entity, i, item))
        .collect()
}

fn import_one(entity: &str, index: usize, item: Value) -> Result<Record> {
    let Value::Object(fields) = item else {
        return Err(Error::BadInput(format!("import: entry {index} is not an object")));
    };
    if RESERVED_KEYS.iter().all(|k| fields.contains_key(*k)) {
        if let Ok(record) = serde_json::from_value::<Record>(Value::Object(fields.clone())) {
            return Ok(record);
        }
    }
    Ok(Record::create(entity, fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        Record::create("companies", v.as_object().cloned().unwrap())
    }

    #[test]
    fn filter_matches_strings_and_numbers_case_insensitively() {
        let records = vec![
            record(json!({"name": "Acme Gaming", "seats": 40})),
            record(json!({"name": "Other", "city": "Cluj"})),
        ];
        assert_eq!(filter(&records, "acme").len(), 1);
        assert_eq!(filter(&records, "CLUJ").len(), 1);
        assert_eq!(filter(&records, "40").len(), 1);
        assert_eq!(filter(&records, "  ").len(), 2);
        assert!(filter(&records, "missing").is_empty());
    }

    #[test]
    fn csv_columns_follow_first_seen_order() {
        let records = vec![
            record(json!({"name": "Acme", "tags": ["a"]})),
            record(json!({"email": "x@y.z", "name": "B, Inc"})),
        ];
        let csv = to_csv(&records).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some("id,name,tags,email,created_date,updated_date")
        );
        let first = lines.next().unwrap();
        assert!(first.contains(",Acme,"));
        assert!(first.contains(r#""[""a""]""#));
        let second = lines.next().unwrap();
        assert!(second.contains(r#""B, Inc""#));
        assert!(second.contains("x@y.z"));
    }

    #[test]
    fn csv_keys_within_one_record_are_alphabetical() {
        let records = vec![record(json!({"zone": "B", "name": "Acme", "address": "Main 1"}))];
        let csv = to_csv(&records).unwrap();
        assert_eq!(
            csv.lines().next(),
            Some("id,address,name,zone,created_date,updated_date")
        );
    }
}
