//! Typed shapes for each entity.
//!
//! Every field is optional because the stores accept partial payloads and
//! older data files carry whatever the forms of the day wrote. Keys a struct
//! does not name survive in `extra`.
//!
//! Text fields take numbers and booleans as their string form and read any
//! other JSON kind as absent. Fields that different forms saved in different
//! shapes (`serial_numbers`, amounts, `games`) stay raw [`Value`]s, so a
//! record never fails to load because of them.

use crate::entity::Entity;
use crate::record::Fields;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Items of a list-or-text field: array elements that are strings, or the
/// trimmed non-blank parts of comma-separated text.
pub fn list_items(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(list)) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// A number stored either as JSON number or as numeric text.
pub fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// An operating company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Company {
    /// Display name; required on create.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Trade register number.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub registration_number: Option<String>,
    /// Fiscal code.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub tax_number: Option<String>,
    /// Contact email.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Contact phone.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Postal address.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// `active` or `inactive`.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Keys not named above.
    #[serde(flatten)]
    pub extra: Fields,
}

impl Entity for Company {
    const NAME: &'static str = "companies";
}

/// A gaming hall.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Display name; required on create.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Owning company.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    /// Street address.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// City.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Country.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// `active` or `inactive`.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Keys not named above.
    #[serde(flatten)]
    pub extra: Fields,
}

impl Entity for Location {
    const NAME: &'static str = "locations";
}

/// A machine supplier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    /// Display name; required on create.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Manufacturer the provider distributes.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Person to call.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub contact_person: Option<String>,
    /// Contact email.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Contact phone.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// `active` or `inactive`.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Keys not named above.
    #[serde(flatten)]
    pub extra: Fields,
}

impl Entity for Provider {
    const NAME: &'static str = "providers";
}

/// A cabinet model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cabinet {
    /// Display name.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Model designation.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Supplying provider.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// `active` or `inactive`.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Keys not named above.
    #[serde(flatten)]
    pub extra: Fields,
}

impl Entity for Cabinet {
    const NAME: &'static str = "cabinets";
}

/// A named set of games. `games` is either an array of names or one
/// comma-separated string, depending on which form saved it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameMix {
    /// Display name.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Supplying provider.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Game names, list or comma-separated text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub games: Option<Value>,
    /// `active` or `inactive`.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Keys not named above.
    #[serde(flatten)]
    pub extra: Fields,
}

impl GameMix {
    /// The game names whichever way they were saved.
    pub fn game_names(&self) -> Vec<String> {
        list_items(self.games.as_ref())
    }
}

impl Entity for GameMix {
    const NAME: &'static str = "gameMixes";
}

/// A game platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Platform {
    /// Display name.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Supplying provider.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// `active` or `inactive`.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Keys not named above.
    #[serde(flatten)]
    pub extra: Fields,
}

impl Entity for Platform {
    const NAME: &'static str = "platforms";
}

/// One slot machine on a location floor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotMachine {
    /// Manufacturer serial.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    /// Supplying provider.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Cabinet model.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub cabinet_id: Option<String>,
    /// Installed game mix.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub game_mix_id: Option<String>,
    /// Game platform.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<String>,
    /// Location it stands in.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    /// Free-text manufacturer when no provider is linked.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Operating status.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Keys not named above.
    #[serde(flatten)]
    pub extra: Fields,
}

impl Entity for SlotMachine {
    const NAME: &'static str = "slotMachines";
}

/// A purchase or rental invoice covering one or more machines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Invoice number as printed.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    /// Billed company.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    /// Covered machines, list or comma-separated text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_numbers: Option<Value>,
    /// Total, number or numeric text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Value>,
    /// ISO currency code.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Issue date.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,
    /// Payment due date.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    /// Payment status.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Keys not named above.
    #[serde(flatten)]
    pub extra: Fields,
}

impl Invoice {
    /// Covered serials whichever way they were saved.
    pub fn serials(&self) -> Vec<String> {
        list_items(self.serial_numbers.as_ref())
    }

    /// [`amount`](Self::amount) as a number, if it reads as one.
    pub fn amount_value(&self) -> Option<f64> {
        number(self.amount.as_ref())
    }
}

impl Entity for Invoice {
    const NAME: &'static str = "invoices";
}

/// A metrology certificate for one machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrology {
    /// Certified machine.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    /// Certificate number as printed.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub certificate_number: Option<String>,
    /// Issuing authority.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub authority_id: Option<String>,
    /// Issue date.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,
    /// Date after which the certificate lapses.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    /// Certificate status.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Keys not named above.
    #[serde(flatten)]
    pub extra: Fields,
}

impl Entity for Metrology {
    const NAME: &'static str = "metrology";
}

/// A type approval for a cabinet and game mix combination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetrologyApproval {
    /// Display name.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Approving authority.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub authority_id: Option<String>,
    /// Supplying provider.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Cabinet model.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub cabinet_id: Option<String>,
    /// Installed game mix.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub game_mix_id: Option<String>,
    /// Keys not named above, `serial_numbers` among them.
    #[serde(flatten)]
    pub extra: Fields,
}

impl Entity for MetrologyApproval {
    const NAME: &'static str = "metrologyApprovals";
}

/// A commissioning of machines by an inspection committee.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetrologyCommission {
    /// Display name.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Date of the inspection.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub commission_date: Option<String>,
    /// Date after which it lapses.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<String>,
    /// Commissioned machines, list or comma-separated text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_numbers: Option<Value>,
    /// Keys not named above.
    #[serde(flatten)]
    pub extra: Fields,
}

impl MetrologyCommission {
    /// Commissioned serials whichever way they were saved.
    pub fn serials(&self) -> Vec<String> {
        list_items(self.serial_numbers.as_ref())
    }
}

impl Entity for MetrologyCommission {
    const NAME: &'static str = "metrologyCommissions";
}

/// A body that issues certificates and approvals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetrologyAuthority {
    /// Display name.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Postal address.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Person to call.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub contact_person: Option<String>,
    /// Contact email.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Contact phone.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Keys not named above.
    #[serde(flatten)]
    pub extra: Fields,
}

impl Entity for MetrologyAuthority {
    const NAME: &'static str = "metrologyAuthorities";
}

/// A certified software version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetrologySoftware {
    /// Display name.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Version text; numeric versions are read as their string form.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Supplying provider.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Cabinet model.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub cabinet_id: Option<String>,
    /// Keys not named above, `serial_numbers` among them.
    #[serde(flatten)]
    pub extra: Fields,
}

impl Entity for MetrologySoftware {
    const NAME: &'static str = "metrologySoftware";
}

/// A jackpot, linked to a location or a single machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Jackpot {
    /// Display name.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Kind of jackpot.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub jackpot_type: Option<String>,
    /// Location it stands in.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    /// Machine the jackpot is tied to.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    /// Current pot, number or numeric text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_amount: Option<Value>,
    /// Pot ceiling, number or numeric text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<Value>,
    /// Jackpot status.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Keys not named above.
    #[serde(flatten)]
    pub extra: Fields,
}

impl Jackpot {
    /// [`current_amount`](Self::current_amount) as a number.
    pub fn current(&self) -> Option<f64> {
        number(self.current_amount.as_ref())
    }

    /// [`max_amount`](Self::max_amount) as a number.
    pub fn max(&self) -> Option<f64> {
        number(self.max_amount.as_ref())
    }
}

impl Entity for Jackpot {
    const NAME: &'static str = "jackpots";
}

/// A user profile. The password hash stays server-side and never appears
/// here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Login name; required on create.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Login email; required on create.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Given name.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// `admin`, `manager`, `operator` or `user`.
    #[serde(default, deserialize_with = "text", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Location ids, list or comma-separated text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_locations: Option<Value>,
    /// Keys not named above.
    #[serde(flatten)]
    pub extra: Fields,
}

impl User {
    /// Assigned location ids whichever way they were saved.
    pub fn locations(&self) -> Vec<String> {
        list_items(self.assigned_locations.as_ref())
    }
}

impl Entity for User {
    const NAME: &'static str = "users";
}
