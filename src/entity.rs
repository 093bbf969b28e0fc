//! Entity registry: the names served on the wire, their light schemas, and
//! the typed view over a stored record.

use crate::error::{Error, Result};
use crate::record::{Fields, Record};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const STATUS: &[&str] = &["active", "inactive"];
const ROLES: &[&str] = &["admin", "manager", "operator", "user"];

/// One entity name and the checks the document store applies to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDef {
    /// Wire name, e.g. `slotMachines`.
    pub name: &'static str,
    /// Fields that must be present as non-empty strings on create.
    pub required: &'static [&'static str],
    /// Fields restricted to a fixed set of string values.
    pub enums: &'static [(&'static str, &'static [&'static str])],
}

/// Every entity the application knows about.
pub const ENTITIES: &[EntityDef] = &[
    EntityDef { name: "companies", required: &["name"], enums: &[("status", STATUS)] },
    EntityDef { name: "locations", required: &["name"], enums: &[("status", STATUS)] },
    EntityDef { name: "providers", required: &["name"], enums: &[("status", STATUS)] },
    EntityDef { name: "cabinets", required: &[], enums: &[] },
    EntityDef { name: "gameMixes", required: &[], enums: &[] },
    EntityDef { name: "platforms", required: &[], enums: &[] },
    EntityDef { name: "slotMachines", required: &[], enums: &[] },
    EntityDef { name: "invoices", required: &[], enums: &[] },
    EntityDef { name: "metrology", required: &[], enums: &[] },
    EntityDef { name: "metrologyApprovals", required: &[], enums: &[] },
    EntityDef { name: "metrologyCommissions", required: &[], enums: &[] },
    EntityDef { name: "metrologyAuthorities", required: &[], enums: &[] },
    EntityDef { name: "metrologySoftware", required: &[], enums: &[] },
    EntityDef { name: "jackpots", required: &[], enums: &[] },
    EntityDef { name: "users", required: &["username", "email"], enums: &[("role", ROLES)] },
];

/// Registry entry for `name`.
pub fn lookup(name: &str) -> Option<&'static EntityDef> {
    ENTITIES.iter().find(|def| def.name == name)
}

/// Registry entry for `name`, or [`Error::UnknownEntity`].
pub fn require(name: &str) -> Result<&'static EntityDef> {
    lookup(name).ok_or_else(|| Error::UnknownEntity(name.to_string()))
}

impl EntityDef {
    /// Check a create payload (`partial == false`) or an update patch
    /// (`partial == true`, only the keys present are checked).
    pub fn validate(&self, fields: &Fields, partial: bool) -> Result<()> {
        for &key in self.required {
            match fields.get(key) {
                None if partial => {}
                Some(Value::String(s)) if !s.trim().is_empty() => {}
                _ => {
                    return Err(Error::BadInput(format!(
                        "{}: `{key}` is required and must be a non-empty string",
                        self.name
                    )))
                }
            }
        }
        for &(key, allowed) in self.enums {
            match fields.get(key) {
                None | Some(Value::Null) => {}
                Some(Value::String(s)) if allowed.contains(&s.as_str()) => {}
                Some(other) => {
                    return Err(Error::BadInput(format!(
                        "{}: `{key}` must be one of {allowed:?}, got {other}",
                        self.name
                    )))
                }
            }
        }
        Ok(())
    }
}

/// A typed record shape bound to one entity name.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Wire name used for routes, storage keys and ids.
    const NAME: &'static str;
}

/// A typed payload plus the fields the store owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored<T> {
    /// Record id.
    pub id: String,
    /// The entity payload.
    #[serde(flatten)]
    pub data: T,
    /// Creation time.
    pub created_date: DateTime<Utc>,
    /// Last write time.
    pub updated_date: DateTime<Utc>,
}

impl<T: Entity> Stored<T> {
    /// View an untyped record as `T`.
    pub fn from_record(record: Record) -> Result<Self> {
        let data = serde_json::from_value(Value::Object(record.fields))
            .map_err(|e| Error::Deserialize(format!("{}: {e}", T::NAME)))?;
        Ok(Self {
            id: record.id,
            data,
            created_date: record.created_date,
            updated_date: record.updated_date,
        })
    }
}

/// Serialise any payload into the untyped field map the stores take.
pub fn to_fields<P: Serialize + ?Sized>(payload: &P) -> Result<Fields> {
    match serde_json::to_value(payload).map_err(|e| Error::Serialize(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(Error::BadInput(format!("payload must be a JSON object, got {other}"))),
    }
}
