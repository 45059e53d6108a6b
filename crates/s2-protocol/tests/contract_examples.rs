//! Contract tests against realistic wire payloads: parse, inspect, and
//! round-trip a handful of messages the way a battery RM actually sends
//! them.

use s2_protocol::{ControlType, OriginType, S2Message, parse_message};
use serde_json::json;

fn round_trip(raw: serde_json::Value) -> S2Message {
    let parsed = parse_message(&raw).unwrap_or_else(|e| panic!("parse failed: {e:?}"));
    let serialized = serde_json::to_value(&parsed).expect("serialize");
    let reparsed = parse_message(&serialized).expect("re-parse after serialize");
    assert_eq!(parsed, reparsed);
    parsed
}

#[test]
fn resource_manager_details_for_a_battery() {
    let message = round_trip(json!({
        "message_type": "ResourceManagerDetails",
        "message_id": "2d717c61-8500-4e8f-87a8-114b51acc08b",
        "resource_id": "0309eaef-4fbb-4c9c-aa90-58bde4f4b07c",
        "name": "battery1",
        "roles": [{"role": "ENERGY_STORAGE", "commodity": "ELECTRICITY"}],
        "manufacturer": "APC",
        "model": "SMT500I",
        "serial_number": "kellox",
        "firmware_version": "1.2.5",
        "instruction_processing_delay": 100,
        "available_control_types": ["FILL_RATE_BASED_CONTROL"],
        "currency": "EUR",
        "provides_forecast": false,
        "provides_power_measurement_types": ["ELECTRIC.POWER.L1"]
    }));
    let S2Message::ResourceManagerDetails(details) = message else {
        panic!("wrong variant");
    };
    assert_eq!(details.name.as_deref(), Some("battery1"));
    assert_eq!(
        details.available_control_types,
        vec![ControlType::Frbc.wire_name().to_owned()]
    );
}

#[test]
fn frbc_system_description_for_a_battery() {
    let message = round_trip(json!({
        "message_type": "FRBC.SystemDescription",
        "message_id": "e698768f-09e3-4328-9713-c2901e895492",
        "valid_from": "2024-06-01T12:00:00+00:00",
        "actuators": [{
            "id": "69cb9071-9d77-40a6-a881-df429d5f562f",
            "diagnostic_label": "charge_discharge_idle",
            "supported_commodities": ["ELECTRICITY"],
            "operation_modes": [{
                "id": "3ce97655-91a1-487f-adce-26a86e282c1f",
                "diagnostic_label": "charge_discharge_idle",
                "elements": [{
                    "fill_level_range": {"start_of_range": 0.0, "end_of_range": 100.0},
                    "fill_rate": {"start_of_range": -5.33, "end_of_range": 5.33},
                    "power_ranges": [{
                        "start_of_range": -80000.0,
                        "end_of_range": 80000.0,
                        "commodity_quantity": "ELECTRIC.POWER.L1"
                    }]
                }],
                "abnormal_condition_only": false
            }],
            "transitions": [],
            "timers": []
        }],
        "storage": {
            "diagnostic_label": "electrical battery",
            "fill_level_label": "SoC %",
            "provides_leakage_behaviour": false,
            "provides_fill_level_target_profile": false,
            "provides_usage_forecast": false,
            "fill_level_range": {"start_of_range": 0.0, "end_of_range": 100.0}
        }
    }));
    let S2Message::FrbcSystemDescription(description) = message else {
        panic!("wrong variant");
    };
    assert_eq!(description.actuators.len(), 1);
    let element = &description.actuators[0].operation_modes[0].elements[0];
    assert_eq!(element.fill_rate.start_of_range, -5.33);
    assert_eq!(
        description.storage.fill_level_label.as_deref(),
        Some("SoC %")
    );
}

#[test]
fn handshake_and_reception_status() {
    let message = round_trip(json!({
        "message_type": "Handshake",
        "message_id": "a1",
        "role": "RM",
        "supported_protocol_versions": ["0.0.1-beta"]
    }));
    let S2Message::Handshake(handshake) = message else {
        panic!("wrong variant");
    };
    assert_eq!(handshake.role, OriginType::Rm);

    let message = round_trip(json!({
        "message_type": "ReceptionStatus",
        "subject_message_id": "a1",
        "status": "OK"
    }));
    let S2Message::ReceptionStatus(status) = message else {
        panic!("wrong variant");
    };
    assert_eq!(status.subject_message_id, "a1");
}

#[test]
fn power_measurement_values() {
    let message = round_trip(json!({
        "message_type": "PowerMeasurement",
        "message_id": "c18bfa3b-7bec-46e6-b859-cb8dec5f1023",
        "measurement_timestamp": "2024-06-01T12:00:00+00:00",
        "values": [{"commodity_quantity": "ELECTRIC.POWER.L1", "value": 30.0}]
    }));
    let S2Message::PowerMeasurement(measurement) = message else {
        panic!("wrong variant");
    };
    assert_eq!(measurement.values[0].value, 30.0);
}
