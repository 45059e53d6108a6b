//! Typed parse + validation of raw S2 payloads.
//!
//! Resolution happens in two steps, like the wire format suggests: read the
//! `message_type` discriminator, then deserialize the matching body.  The
//! two-step form keeps JSON paths in error reports precise.  The analyzer
//! never blocks forwarding on validation: a failed parse produces a
//! [`ValidationDetails`] that travels with the message instead.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Handshake, HandshakeResponse, InstructionStatusUpdate, PowerForecast, PowerMeasurement,
    ReceptionStatus, ResourceManagerDetails, RevokeObject, S2Message, SelectControlType,
    SessionRequest,
};
use crate::frbc::{
    FrbcActuatorStatus, FrbcFillLevelTargetProfile, FrbcInstruction, FrbcLeakageBehaviour,
    FrbcStorageStatus, FrbcSystemDescription, FrbcTimerStatus, FrbcUsageForecast,
};

/// One validation failure, with the JSON path it occurred at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Coarse error class: `missing`, `type_error`, `unknown_message_type`,
    /// or `validation_error`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Dotted JSON path to the offending value (empty at the root).
    pub loc: String,
    pub msg: String,
}

/// Summary plus individual errors for a payload that failed to validate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationDetails {
    pub msg: String,
    pub errors: Vec<ValidationErrorDetail>,
}

/// Best-effort extraction of the `message_type` field from a raw payload.
pub fn raw_message_type(raw: &serde_json::Value) -> Option<String> {
    raw.get("message_type")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
}

/// Parse a raw JSON payload into a typed S2 message.
pub fn parse_message(raw: &serde_json::Value) -> Result<S2Message, ValidationDetails> {
    let Some(message_type) = raw_message_type(raw) else {
        return Err(details(
            "Unknown",
            vec![ValidationErrorDetail {
                kind: "missing".to_owned(),
                loc: String::new(),
                msg: "missing field `message_type`".to_owned(),
            }],
        ));
    };

    let result = match message_type.as_str() {
        "Handshake" => body::<Handshake>(raw).map(S2Message::Handshake),
        "HandshakeResponse" => body::<HandshakeResponse>(raw).map(S2Message::HandshakeResponse),
        "ReceptionStatus" => body::<ReceptionStatus>(raw).map(S2Message::ReceptionStatus),
        "SelectControlType" => body::<SelectControlType>(raw).map(S2Message::SelectControlType),
        "ResourceManagerDetails" => {
            body::<ResourceManagerDetails>(raw).map(S2Message::ResourceManagerDetails)
        }
        "PowerMeasurement" => body::<PowerMeasurement>(raw).map(S2Message::PowerMeasurement),
        "PowerForecast" => body::<PowerForecast>(raw).map(S2Message::PowerForecast),
        "InstructionStatusUpdate" => {
            body::<InstructionStatusUpdate>(raw).map(S2Message::InstructionStatusUpdate)
        }
        "RevokeObject" => body::<RevokeObject>(raw).map(S2Message::RevokeObject),
        "SessionRequest" => body::<SessionRequest>(raw).map(S2Message::SessionRequest),
        "FRBC.SystemDescription" => {
            body::<FrbcSystemDescription>(raw).map(S2Message::FrbcSystemDescription)
        }
        "FRBC.ActuatorStatus" => {
            body::<FrbcActuatorStatus>(raw).map(S2Message::FrbcActuatorStatus)
        }
        "FRBC.StorageStatus" => body::<FrbcStorageStatus>(raw).map(S2Message::FrbcStorageStatus),
        "FRBC.FillLevelTargetProfile" => {
            body::<FrbcFillLevelTargetProfile>(raw).map(S2Message::FrbcFillLevelTargetProfile)
        }
        "FRBC.LeakageBehaviour" => {
            body::<FrbcLeakageBehaviour>(raw).map(S2Message::FrbcLeakageBehaviour)
        }
        "FRBC.UsageForecast" => body::<FrbcUsageForecast>(raw).map(S2Message::FrbcUsageForecast),
        "FRBC.Instruction" => body::<FrbcInstruction>(raw).map(S2Message::FrbcInstruction),
        "FRBC.TimerStatus" => body::<FrbcTimerStatus>(raw).map(S2Message::FrbcTimerStatus),
        other => Err(ValidationErrorDetail {
            kind: "unknown_message_type".to_owned(),
            loc: "message_type".to_owned(),
            msg: format!("there is no schema for message type `{other}`"),
        }),
    };

    result.map_err(|error| details(&message_type, vec![error]))
}

fn details(message_type: &str, errors: Vec<ValidationErrorDetail>) -> ValidationDetails {
    ValidationDetails {
        msg: format!("Failed to validate S2 message of type {message_type}"),
        errors,
    }
}

fn body<T: DeserializeOwned>(raw: &serde_json::Value) -> Result<T, ValidationErrorDetail> {
    match serde_path_to_error::deserialize::<_, T>(raw.clone()) {
        Ok(value) => Ok(value),
        Err(err) => {
            let loc = match err.path().to_string() {
                path if path == "." => String::new(),
                path => path,
            };
            let msg = err.inner().to_string();
            Err(ValidationErrorDetail {
                kind: classify(&msg),
                loc,
                msg,
            })
        }
    }
}

fn classify(msg: &str) -> String {
    if msg.starts_with("missing field") {
        "missing".to_owned()
    } else if msg.starts_with("invalid type") || msg.starts_with("invalid value") {
        "type_error".to_owned()
    } else if msg.starts_with("unknown variant") {
        "unknown_message_type".to_owned()
    } else {
        "validation_error".to_owned()
    }
}
