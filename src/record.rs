//! The generic entity record and everything every store does to it the same
//! way: id synthesis, timestamps, shallow merge, sorting.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};

/// Arbitrary record payload.
pub type Fields = Map<String, Value>;

/// Every entity's records, keyed by entity name.
pub type Dataset = BTreeMap<String, Vec<Record>>;

/// Keys owned by the store; stripped from incoming payloads.
pub const RESERVED_KEYS: [&str; 3] = ["id", "created_date", "updated_date"];

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// One stored entity instance.
///
/// Serialises flat: `{"id": …, …fields, "created_date": …, "updated_date": …}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Assigned at creation, never changes.
    pub id: String,
    /// Everything else the caller stored.
    #[serde(flatten)]
    pub fields: Fields,
    /// Set once at creation.
    #[serde(with = "timestamp")]
    pub created_date: DateTime<Utc>,
    /// Bumped on every write.
    #[serde(with = "timestamp")]
    pub updated_date: DateTime<Utc>,
}

impl Record {
    /// A new record for `entity` with a fresh id and both timestamps set to
    /// now. Reserved keys in `fields` are dropped.
    pub fn create(entity: &str, fields: Fields) -> Self {
        let now = now();
        Self {
            id: generate_id(entity),
            fields: strip_reserved(fields),
            created_date: now,
            updated_date: now,
        }
    }

    /// Shallow-merge `patch` over the record. Keys absent from the patch keep
    /// their value, `id` and `created_date` never change, and `updated_date`
    /// always moves forward.
    pub fn apply(&mut self, patch: Fields) {
        for (key, value) in strip_reserved(patch) {
            self.fields.insert(key, value);
        }
        self.updated_date = next_timestamp(self.updated_date);
    }

    /// Payload field by name. The reserved keys are not payload fields.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Payload field as a string slice, when it is one.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// The record as one flat JSON object.
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 3);
        map.insert("id".into(), Value::String(self.id.clone()));
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.clone());
        }
        map.insert("created_date".into(), Value::String(format_time(self.created_date)));
        map.insert("updated_date".into(), Value::String(format_time(self.updated_date)));
        Value::Object(map)
    }

    fn sort_value(&self, field: &str) -> SortValue<'_> {
        match field {
            "id" => SortValue::Text(&self.id),
            "created_date" => SortValue::Time(self.created_date),
            "updated_date" => SortValue::Time(self.updated_date),
            other => match self.fields.get(other) {
                Some(v) => SortValue::Json(v),
                None => SortValue::Missing,
            },
        }
    }
}

/// `<entity>-<unix millis>-<9 random base36 chars>`.
pub fn generate_id(entity: &str) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{entity}-{}-{suffix}", Utc::now().timestamp_millis())
}

/// Drop the store-owned keys from a payload.
pub fn strip_reserved(mut fields: Fields) -> Fields {
    for key in RESERVED_KEYS {
        fields.remove(key);
    }
    fields
}

/// Now, or one microsecond after `prev` when the clock has not moved past it.
fn next_timestamp(prev: DateTime<Utc>) -> DateTime<Utc> {
    let now = now();
    if now > prev {
        now
    } else {
        prev + Duration::microseconds(1)
    }
}

static LAST_MICROS: AtomicI64 = AtomicI64::new(0);

// Microsecond clock that never repeats within the process, so creation
// order is also timestamp order.
fn now() -> DateTime<Utc> {
    let wall = Utc::now().timestamp_micros();
    let mut last = LAST_MICROS.load(AtomicOrdering::Relaxed);
    loop {
        let next = wall.max(last + 1);
        match LAST_MICROS.compare_exchange_weak(
            last,
            next,
            AtomicOrdering::Relaxed,
            AtomicOrdering::Relaxed,
        ) {
            Ok(_) => {
                return DateTime::from_timestamp_micros(next)
                    .unwrap_or_else(|| Utc::now().trunc_subsecs(6))
            }
            Err(seen) => last = seen,
        }
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_time(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

/// Field to sort a listing by. A leading `-` means descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Field name, e.g. `created_date` or `name`.
    pub field: String,
    /// Largest first when set.
    pub descending: bool,
}

impl SortKey {
    /// Parse `"name"` or `"-created_date"`. Blank input means "no sort".
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (field, descending) = match raw.strip_prefix('-') {
            Some(rest) => (rest, true),
            None => (raw, false),
        };
        if field.is_empty() {
            return None;
        }
        Some(Self {
            field: field.to_string(),
            descending,
        })
    }

    /// Compare two records under this key. Records missing the field go
    /// last in either direction, so they stay at the tail whichever way the
    /// list is sorted and the comparison remains a total order, as
    /// `sort_by` requires. Present values of different JSON kinds order by
    /// kind.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let (a, b) = (a.sort_value(&self.field), b.sort_value(&self.field));
        match (&a, &b) {
            (SortValue::Missing, SortValue::Missing) => Ordering::Equal,
            (SortValue::Missing, _) => Ordering::Greater,
            (_, SortValue::Missing) => Ordering::Less,
            _ if self.descending => a.cmp_present(&b).reverse(),
            _ => a.cmp_present(&b),
        }
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.descending {
            write!(f, "-{}", self.field)
        } else {
            f.write_str(&self.field)
        }
    }
}

/// Stable sort; records whose values compare equal keep their order.
pub fn sort_records(records: &mut [Record], key: &SortKey) {
    records.sort_by(|a, b| key.compare(a, b));
}

enum SortValue<'a> {
    Text(&'a str),
    Time(DateTime<Utc>),
    Json(&'a Value),
    Missing,
}

impl SortValue<'_> {
    fn cmp_present(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Time(a), SortValue::Time(b)) => a.cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Json(a), SortValue::Json(b)) => cmp_json(a, b),
            _ => Ordering::Equal,
        }
    }
}

// Values of different JSON kinds order by kind (bool < number < string) so
// the comparison stays a total order; null, arrays and objects are all equal.
fn cmp_json(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

fn kind_rank(v: &Value) -> u8 {
    match v {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Null | Value::Array(_) | Value::Object(_) => 3,
    }
}
