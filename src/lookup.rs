//! Relationship lookups over a loaded dataset.
//!
//! Records point at each other with plain string ids. [`Lookup`] resolves
//! those ids against sibling lists for display, answering `"N/A"` for
//! anything it cannot resolve.

use crate::record::{Dataset, Record};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

/// Placeholder for unresolved references.
pub const NOT_AVAILABLE: &str = "N/A";

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

/// Read-only view for resolving references between entities.
#[derive(Debug, Clone, Copy)]
pub struct Lookup<'a> {
    data: &'a Dataset,
}

impl<'a> Lookup<'a> {
    /// Lookups over `data`.
    pub fn new(data: &'a Dataset) -> Self {
        Self { data }
    }

    /// Record `id` of `entity`.
    pub fn find(&self, entity: &str, id: &str) -> Option<&'a Record> {
        self.data.get(entity)?.iter().find(|r| r.id == id)
    }

    fn records(&self, entity: &str) -> &'a [Record] {
        self.data.get(entity).map(Vec::as_slice).unwrap_or_default()
    }

    fn text(&self, entity: &str, id: &str, field: &str) -> String {
        self.find(entity, id)
            .and_then(|r| non_empty(r.str_field(field)))
            .unwrap_or(NOT_AVAILABLE)
            .to_string()
    }

    /// Name of the company that owns the location.
    pub fn company_name(&self, location_id: &str) -> String {
        match self
            .find("locations", location_id)
            .and_then(|loc| loc.str_field("company_id"))
        {
            Some(company_id) => self.text("companies", company_id, "name"),
            None => NOT_AVAILABLE.to_string(),
        }
    }

    /// Location name.
    pub fn location_name(&self, location_id: &str) -> String {
        self.text("locations", location_id, "name")
    }

    /// `"<city>, <address>"` of a location.
    pub fn full_address(&self, location_id: &str) -> String {
        match self.find("locations", location_id) {
            Some(loc) => format!(
                "{}, {}",
                loc.str_field("city").unwrap_or_default(),
                loc.str_field("address").unwrap_or_default()
            ),
            None => NOT_AVAILABLE.to_string(),
        }
    }

    /// Provider name, falling back to the machine's own manufacturer text.
    pub fn provider_name(&self, provider_id: &str, manufacturer: Option<&str>) -> String {
        self.find("providers", provider_id)
            .and_then(|p| non_empty(p.str_field("name")))
            .or_else(|| non_empty(manufacturer))
            .unwrap_or(NOT_AVAILABLE)
            .to_string()
    }

    /// Cabinet name.
    pub fn cabinet_name(&self, cabinet_id: &str) -> String {
        self.text("cabinets", cabinet_id, "name")
    }

    /// Cabinet model designation.
    pub fn cabinet_model(&self, cabinet_id: &str) -> String {
        self.text("cabinets", cabinet_id, "model")
    }

    /// Game mix name.
    pub fn game_mix_name(&self, game_mix_id: &str) -> String {
        self.text("gameMixes", game_mix_id, "name")
    }

    /// Name of the platform whose `serial_numbers` list the machine.
    pub fn platform_name(&self, serial: &str) -> String {
        self.records("platforms")
            .iter()
            .find(|p| lists_serial(p, serial))
            .and_then(|p| non_empty(p.str_field("name")))
            .unwrap_or(NOT_AVAILABLE)
            .to_string()
    }

    /// Number of the invoice that covers the machine, matched either by a
    /// single `serial_number` or by membership in `serial_numbers`.
    pub fn invoice_number(&self, serial: &str) -> String {
        self.invoice_for_slot(serial)
            .and_then(|inv| non_empty(inv.str_field("invoice_number")))
            .unwrap_or(NOT_AVAILABLE)
            .to_string()
    }

    /// The invoice record itself; see [`invoice_number`](Self::invoice_number).
    pub fn invoice_for_slot(&self, serial: &str) -> Option<&'a Record> {
        self.records("invoices")
            .iter()
            .find(|inv| inv.str_field("serial_number") == Some(serial) || lists_serial(inv, serial))
    }

    /// Metrology certificates that cover the machine, by `serial_number` or
    /// by membership in `serial_numbers`.
    pub fn metrology_for_slot(&self, serial: &str) -> Vec<&'a Record> {
        self.records("metrology")
            .iter()
            .filter(|m| m.str_field("serial_number") == Some(serial) || lists_serial(m, serial))
            .collect()
    }

    /// Type approval whose `serial_numbers` list the machine.
    pub fn approval_for_slot(&self, serial: &str) -> Option<&'a Record> {
        self.records("metrologyApprovals")
            .iter()
            .find(|a| lists_serial(a, serial))
    }

    /// Commission whose `serial_numbers` list the machine.
    pub fn commission_for_slot(&self, serial: &str) -> Option<&'a Record> {
        self.records("metrologyCommissions")
            .iter()
            .find(|c| lists_serial(c, serial))
    }

    /// Software entries whose `serial_numbers` list the machine.
    pub fn metrology_software_for_slot(&self, serial: &str) -> Vec<&'a Record> {
        self.records("metrologySoftware")
            .iter()
            .filter(|s| lists_serial(s, serial))
            .collect()
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

fn lists_serial(record: &Record, serial: &str) -> bool {
    match record.field("serial_numbers") {
        Some(Value::Array(items)) => items.iter().any(|v| v.as_str() == Some(serial)),
        Some(Value::String(list)) => list.split(',').any(|s| s.trim() == serial),
        _ => false,
    }
}

/// Whole days from `today` until `expiry`, rounded up; negative once
/// expired. Absent or unparsable dates count as 0.
///
/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC).
pub fn days_until_expiry(expiry: Option<&str>, today: DateTime<Utc>) -> i64 {
    let Some(expiry) = expiry.and_then(parse_date) else {
        return 0;
    };
    let millis = (expiry - today).num_milliseconds();
    -(-millis).div_euclid(DAY_MILLIS)
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// Number of games in a game mix: the length of a list, or the count of
/// non-blank names in comma-separated text.
pub fn game_count(games: Option<&Value>) -> usize {
    match games {
        Some(Value::Array(items)) => items.len(),
        Some(Value::String(list)) => list.split(',').filter(|g| !g.trim().is_empty()).count(),
        _ => 0,
    }
}
