// s2-protocol: S2 flexibility-protocol wire types and validation.
//
// Every S2 message is a JSON object with a top-level `message_type` field
// used for discriminated deserialization.  The `S2Message` enum covers the
// common messages plus the FRBC control family; everything else is reported
// as an unknown message type by the validator.

use serde::{Deserialize, Serialize};

pub mod frbc;
pub mod validate;

pub use frbc::*;
pub use validate::{ValidationDetails, ValidationErrorDetail, parse_message, raw_message_type};

use chrono::{DateTime, Utc};

/// The protocol version this implementation speaks.
pub const S2_VERSION: &str = "0.0.1-beta";

// ---------------------------------------------------------------------------
// Origin side
// ---------------------------------------------------------------------------

/// Which side of a session a message (or connection) originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OriginType {
    #[serde(rename = "CEM")]
    Cem,
    #[serde(rename = "RM")]
    Rm,
}

impl OriginType {
    pub fn reverse(self) -> Self {
        match self {
            OriginType::Cem => OriginType::Rm,
            OriginType::Rm => OriginType::Cem,
        }
    }

    pub fn is_cem(self) -> bool {
        matches!(self, OriginType::Cem)
    }

    pub fn is_rm(self) -> bool {
        matches!(self, OriginType::Rm)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OriginType::Cem => "CEM",
            OriginType::Rm => "RM",
        }
    }
}

impl std::fmt::Display for OriginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Control types
// ---------------------------------------------------------------------------

/// S2 control types, with their wire spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlType {
    #[serde(rename = "NO_SELECTION")]
    NoSelection,
    #[serde(rename = "NOT_CONTROLABLE")]
    NoControl,
    #[serde(rename = "FILL_RATE_BASED_CONTROL")]
    Frbc,
    #[serde(rename = "DEMAND_DRIVEN_BASED_CONTROL")]
    Ddbc,
    #[serde(rename = "POWER_PROFILE_BASED_CONTROL")]
    Ppbc,
    #[serde(rename = "OPERATION_MODE_BASED_CONTROL")]
    Ombc,
    #[serde(rename = "POWER_ENVELOPE_BASED_CONTROL")]
    Pebc,
}

impl ControlType {
    pub fn wire_name(self) -> &'static str {
        match self {
            ControlType::NoSelection => "NO_SELECTION",
            ControlType::NoControl => "NOT_CONTROLABLE",
            ControlType::Frbc => "FILL_RATE_BASED_CONTROL",
            ControlType::Ddbc => "DEMAND_DRIVEN_BASED_CONTROL",
            ControlType::Ppbc => "POWER_PROFILE_BASED_CONTROL",
            ControlType::Ombc => "OPERATION_MODE_BASED_CONTROL",
            ControlType::Pebc => "POWER_ENVELOPE_BASED_CONTROL",
        }
    }
}

/// Control types an emulated CEM may select, in descending priority.
pub const SUPPORTED_CONTROL_TYPES: &[ControlType] = &[
    ControlType::Frbc,
    ControlType::NoSelection,
    ControlType::NoControl,
];

// ---------------------------------------------------------------------------
// Shared sub-types
// ---------------------------------------------------------------------------

/// A closed numeric range, used for fill levels and fill rates alike.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericalRange {
    pub start_of_range: f64,
    pub end_of_range: f64,
}

impl NumericalRange {
    pub fn new(start_of_range: f64, end_of_range: f64) -> Self {
        Self {
            start_of_range,
            end_of_range,
        }
    }

    /// Half-open containment, matching how the FRBC strategy resolves the
    /// active element for a fill level.
    pub fn contains(&self, value: f64) -> bool {
        self.start_of_range <= value && value < self.end_of_range
    }

    /// Iterate `start..=end` in `step` increments; the end value is always
    /// yielded last even when the step does not divide the range evenly.
    pub fn inclusive_steps(start: f64, end: f64, step: f64) -> impl Iterator<Item = f64> {
        let mut i: u64 = 0;
        let mut done = false;
        std::iter::from_fn(move || {
            if done {
                return None;
            }
            let value = start + i as f64 * step;
            if value < end {
                i += 1;
                Some(value)
            } else {
                done = true;
                Some(end)
            }
        })
    }
}

/// A measured power value for one commodity quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerValue {
    pub commodity_quantity: String,
    pub value: f64,
}

/// One element of a power forecast; `duration` is in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerForecastElement {
    pub duration: u64,
    pub power_values: Vec<PowerForecastValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerForecastValue {
    pub commodity_quantity: String,
    pub value_expected: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_upper_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_lower_limit: Option<f64>,
}

/// Per-message acknowledgement statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReceptionStatusValues {
    Ok,
    InvalidData,
    InvalidMessage,
    InvalidContent,
    TemporaryError,
    PermanentError,
}

// ---------------------------------------------------------------------------
// Common messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub message_id: String,
    pub role: OriginType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_protocol_versions: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeResponse {
    pub message_id: String,
    pub selected_protocol_version: String,
}

/// S2's per-message acknowledgement.  Carries no `message_id` of its own on
/// the wire; it references the acknowledged message instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceptionStatus {
    pub subject_message_id: String,
    pub status: ReceptionStatusValues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectControlType {
    pub message_id: String,
    pub control_type: ControlType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceManagerDetails {
    pub message_id: String,
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction_processing_delay: Option<u64>,
    pub available_control_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provides_forecast: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provides_power_measurement_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerMeasurement {
    pub message_id: String,
    pub measurement_timestamp: DateTime<Utc>,
    pub values: Vec<PowerValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerForecast {
    pub message_id: String,
    pub start_time: DateTime<Utc>,
    pub elements: Vec<PowerForecastElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionStatusUpdate {
    pub message_id: String,
    pub instruction_id: String,
    pub status_type: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevokeObject {
    pub message_id: String,
    pub object_type: String,
    pub object_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub message_id: String,
    pub request: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_label: Option<String>,
}

// ---------------------------------------------------------------------------
// The discriminated message enum
// ---------------------------------------------------------------------------

/// All S2 messages this analyzer can promote to a typed value.
///
/// The variant tag is the wire `message_type`; FRBC subtypes keep their
/// dotted wire names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type")]
pub enum S2Message {
    Handshake(Handshake),
    HandshakeResponse(HandshakeResponse),
    ReceptionStatus(ReceptionStatus),
    SelectControlType(SelectControlType),
    ResourceManagerDetails(ResourceManagerDetails),
    PowerMeasurement(PowerMeasurement),
    PowerForecast(PowerForecast),
    InstructionStatusUpdate(InstructionStatusUpdate),
    RevokeObject(RevokeObject),
    SessionRequest(SessionRequest),
    #[serde(rename = "FRBC.SystemDescription")]
    FrbcSystemDescription(FrbcSystemDescription),
    #[serde(rename = "FRBC.ActuatorStatus")]
    FrbcActuatorStatus(FrbcActuatorStatus),
    #[serde(rename = "FRBC.StorageStatus")]
    FrbcStorageStatus(FrbcStorageStatus),
    #[serde(rename = "FRBC.FillLevelTargetProfile")]
    FrbcFillLevelTargetProfile(FrbcFillLevelTargetProfile),
    #[serde(rename = "FRBC.LeakageBehaviour")]
    FrbcLeakageBehaviour(FrbcLeakageBehaviour),
    #[serde(rename = "FRBC.UsageForecast")]
    FrbcUsageForecast(FrbcUsageForecast),
    #[serde(rename = "FRBC.Instruction")]
    FrbcInstruction(FrbcInstruction),
    #[serde(rename = "FRBC.TimerStatus")]
    FrbcTimerStatus(FrbcTimerStatus),
}

impl S2Message {
    /// The wire `message_type` for this message.
    pub fn type_name(&self) -> &'static str {
        match self {
            S2Message::Handshake(_) => "Handshake",
            S2Message::HandshakeResponse(_) => "HandshakeResponse",
            S2Message::ReceptionStatus(_) => "ReceptionStatus",
            S2Message::SelectControlType(_) => "SelectControlType",
            S2Message::ResourceManagerDetails(_) => "ResourceManagerDetails",
            S2Message::PowerMeasurement(_) => "PowerMeasurement",
            S2Message::PowerForecast(_) => "PowerForecast",
            S2Message::InstructionStatusUpdate(_) => "InstructionStatusUpdate",
            S2Message::RevokeObject(_) => "RevokeObject",
            S2Message::SessionRequest(_) => "SessionRequest",
            S2Message::FrbcSystemDescription(_) => "FRBC.SystemDescription",
            S2Message::FrbcActuatorStatus(_) => "FRBC.ActuatorStatus",
            S2Message::FrbcStorageStatus(_) => "FRBC.StorageStatus",
            S2Message::FrbcFillLevelTargetProfile(_) => "FRBC.FillLevelTargetProfile",
            S2Message::FrbcLeakageBehaviour(_) => "FRBC.LeakageBehaviour",
            S2Message::FrbcUsageForecast(_) => "FRBC.UsageForecast",
            S2Message::FrbcInstruction(_) => "FRBC.Instruction",
            S2Message::FrbcTimerStatus(_) => "FRBC.TimerStatus",
        }
    }
}
