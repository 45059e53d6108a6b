//! Fill-Rate-Based Control message bodies.
//!
//! Durations follow the units the wire actually uses: milliseconds for
//! usage-forecast and power-forecast elements, seconds for fill-level
//! target-profile elements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::NumericalRange;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcSystemDescription {
    pub message_id: String,
    pub valid_from: DateTime<Utc>,
    pub actuators: Vec<FrbcActuatorDescription>,
    pub storage: FrbcStorageDescription,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcActuatorDescription {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_commodities: Option<Vec<String>>,
    pub operation_modes: Vec<FrbcOperationMode>,
    #[serde(default)]
    pub transitions: Vec<FrbcTransition>,
    #[serde(default)]
    pub timers: Vec<FrbcTimer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcOperationMode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_label: Option<String>,
    pub elements: Vec<FrbcOperationModeElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abnormal_condition_only: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcOperationModeElement {
    pub fill_level_range: NumericalRange,
    pub fill_rate: NumericalRange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_ranges: Option<Vec<PowerRange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_costs: Option<NumericalRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerRange {
    pub start_of_range: f64,
    pub end_of_range: f64,
    pub commodity_quantity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcTransition {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub start_timers: Vec<String>,
    #[serde(default)]
    pub blocking_timers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_costs: Option<f64>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abnormal_condition_only: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcTimer {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_label: Option<String>,
    /// Milliseconds.
    pub duration: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcStorageDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_level_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provides_leakage_behaviour: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provides_fill_level_target_profile: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provides_usage_forecast: Option<bool>,
    pub fill_level_range: NumericalRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcActuatorStatus {
    pub message_id: String,
    pub actuator_id: String,
    pub active_operation_mode_id: String,
    pub operation_mode_factor: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_operation_mode_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcStorageStatus {
    pub message_id: String,
    pub present_fill_level: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcFillLevelTargetProfile {
    pub message_id: String,
    pub start_time: DateTime<Utc>,
    pub elements: Vec<FrbcFillLevelTargetProfileElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcFillLevelTargetProfileElement {
    /// Seconds.
    pub duration: u64,
    pub fill_level_range: NumericalRange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcLeakageBehaviour {
    pub message_id: String,
    pub valid_from: DateTime<Utc>,
    pub elements: Vec<FrbcLeakageBehaviourElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcLeakageBehaviourElement {
    pub fill_level_range: NumericalRange,
    /// Fill-level change per second while the fill level is in range.
    pub leakage_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcUsageForecast {
    pub message_id: String,
    pub start_time: DateTime<Utc>,
    pub elements: Vec<FrbcUsageForecastElement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcUsageForecastElement {
    /// Milliseconds.
    pub duration: u64,
    pub usage_rate_expected: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_rate_upper_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_rate_lower_limit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_rate_upper_95ppr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_rate_lower_95ppr: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcInstruction {
    pub message_id: String,
    pub id: String,
    pub actuator_id: String,
    pub operation_mode: String,
    pub operation_mode_factor: f64,
    pub execution_time: DateTime<Utc>,
    pub abnormal_condition: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrbcTimerStatus {
    pub message_id: String,
    pub timer_id: String,
    pub actuator_id: String,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use crate::S2Message;
    use serde_json::json;

    #[test]
    fn system_description_parses_with_defaults() {
        let raw = json!({
            "message_type": "FRBC.SystemDescription",
            "message_id": "m1",
            "valid_from": "2024-01-01T00:00:00Z",
            "actuators": [{
                "id": "a1",
                "operation_modes": [{
                    "id": "om0",
                    "elements": [{
                        "fill_level_range": {"start_of_range": 0.0, "end_of_range": 100.0},
                        "fill_rate": {"start_of_range": -5.33, "end_of_range": 5.33}
                    }]
                }]
            }],
            "storage": {
                "fill_level_range": {"start_of_range": 0.0, "end_of_range": 100.0}
            }
        });
        let parsed: S2Message = serde_json::from_value(raw).unwrap();
        match parsed {
            S2Message::FrbcSystemDescription(sd) => {
                assert_eq!(sd.actuators.len(), 1);
                assert!(sd.actuators[0].transitions.is_empty());
                assert!(sd.actuators[0].timers.is_empty());
            }
            other => panic!("expected FRBC.SystemDescription, got {other:?}"),
        }
    }

    #[test]
    fn instruction_serializes_execution_time_as_rfc3339() {
        let raw = json!({
            "message_type": "FRBC.Instruction",
            "message_id": "m1",
            "id": "i1",
            "actuator_id": "a1",
            "operation_mode": "om0",
            "operation_mode_factor": 0.5,
            "execution_time": "2024-01-01T00:00:02Z",
            "abnormal_condition": false
        });
        let parsed: S2Message = serde_json::from_value(raw.clone()).unwrap();
        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back["execution_time"], raw["execution_time"]);
    }
}
