//! Fill-Rate-Based Control strategy.
//!
//! Each tick the strategy works out where the fill level would drift with
//! no actuation, compares that with the active target profile, and searches
//! the reachable operation modes for the factor combination whose fill-rate
//! contribution comes closest to the required correction.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use s2_protocol::{
    FrbcActuatorDescription, FrbcActuatorStatus, FrbcFillLevelTargetProfile,
    FrbcLeakageBehaviour, FrbcOperationMode, FrbcOperationModeElement, FrbcSystemDescription,
    FrbcUsageForecast, NumericalRange, S2Message,
};

use super::ControlStrategy;

/// Grid resolution for the operation-mode-factor search.  Finer steps trade
/// tick latency for actuation accuracy.
pub const OM_STEP_RESOLUTION: f64 = 0.001;

/// Instructions are scheduled slightly into the future so the RM receives
/// them before their execution time.
const INSTRUCTION_DELAY_SECONDS: i64 = 2;

pub struct FrbcStrategy {
    device_id: String,
    system_descriptions: Vec<FrbcSystemDescription>,
    actuator_status_by_id: HashMap<String, FrbcActuatorStatus>,
    fill_level_target_profiles: Vec<FrbcFillLevelTargetProfile>,
    leakage_behaviours: Vec<FrbcLeakageBehaviour>,
    usage_forecasts: Vec<FrbcUsageForecast>,
    instructions_sent: Vec<serde_json::Value>,
    last_known_fill_level: Option<f64>,
}

impl FrbcStrategy {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            system_descriptions: Vec::new(),
            actuator_status_by_id: HashMap::new(),
            fill_level_target_profiles: Vec::new(),
            leakage_behaviours: Vec::new(),
            usage_forecasts: Vec::new(),
            instructions_sent: Vec::new(),
            last_known_fill_level: None,
        }
    }

    pub fn instructions_sent(&self) -> &[serde_json::Value] {
        &self.instructions_sent
    }

    /// The fill-level range the target profile asks for at `timestep_end`.
    ///
    /// Walks the profile's elements from its start time; when no element
    /// covers `timestep_end` the expectation degenerates to the current
    /// fill level.
    pub fn expected_fill_level_at_end_of_timestep(
        fill_level_at_start: f64,
        timestep_end: DateTime<Utc>,
        profile: &FrbcFillLevelTargetProfile,
    ) -> NumericalRange {
        let mut current_start = profile.start_time;
        for element in &profile.elements {
            let current_end = current_start + Duration::seconds(element.duration as i64);
            if current_start <= timestep_end && timestep_end < current_end {
                return element.fill_level_range;
            }
            current_start = current_end;
        }
        NumericalRange::new(fill_level_at_start, fill_level_at_start)
    }

    fn expected_usage_during_timestep(
        &self,
        timestep_start: DateTime<Utc>,
        timestep_end: DateTime<Utc>,
    ) -> f64 {
        let mut expected_usage = 0.0;
        for forecast in &self.usage_forecasts {
            let mut current_start = forecast.start_time;
            for element in &forecast.elements {
                let current_end = current_start + Duration::milliseconds(element.duration as i64);
                if current_end > timestep_start && current_start < timestep_end {
                    let overlap_start = current_start.max(timestep_start);
                    let overlap_end = current_end.min(timestep_end);
                    let overlap_seconds =
                        (overlap_end - overlap_start).num_milliseconds() as f64 / 1000.0;
                    expected_usage += overlap_seconds * element.usage_rate_expected;
                }
                current_start = current_end;
            }
        }
        expected_usage
    }

    fn expected_leakage_during_timestep(
        &self,
        fill_level_at_start: f64,
        timestep_start: DateTime<Utc>,
        timestep_end: DateTime<Utc>,
    ) -> f64 {
        let Some(behaviour) =
            latest_active(timestep_start, &self.leakage_behaviours, |b| b.valid_from)
        else {
            return 0.0;
        };
        let timestep_seconds =
            (timestep_end - timestep_start).num_milliseconds() as f64 / 1000.0;
        for element in &behaviour.elements {
            if element.fill_level_range.contains(fill_level_at_start) {
                return timestep_seconds * element.leakage_rate;
            }
        }
        0.0
    }

    /// Linear fill rate of an operation-mode element at `factor`.
    pub fn fill_rate_for_element(element: &FrbcOperationModeElement, factor: f64) -> f64 {
        let start_rate = element.fill_rate.start_of_range;
        let end_rate = element.fill_rate.end_of_range;
        start_rate + factor * (end_rate - start_rate)
    }

    fn active_element(
        fill_level: f64,
        operation_mode: &FrbcOperationMode,
    ) -> Option<&FrbcOperationModeElement> {
        operation_mode
            .elements
            .iter()
            .find(|element| element.fill_level_range.contains(fill_level))
    }

    /// The currently active operation mode plus every mode reachable by one
    /// transition.  Transition timers are not consulted.
    fn reachable_operation_modes<'a>(
        status: &FrbcActuatorStatus,
        actuator: &'a FrbcActuatorDescription,
    ) -> Vec<&'a FrbcOperationMode> {
        let by_id: HashMap<&str, &FrbcOperationMode> = actuator
            .operation_modes
            .iter()
            .map(|om| (om.id.as_str(), om))
            .collect();

        let mut reachable = Vec::new();
        if let Some(active) = by_id.get(status.active_operation_mode_id.as_str()) {
            reachable.push(*active);
        }
        for transition in &actuator.transitions {
            if transition.from == status.active_operation_mode_id {
                if let Some(om) = by_id.get(transition.to.as_str()) {
                    reachable.push(*om);
                }
            }
        }
        reachable
    }

    /// Exhaustive grid search for the `(actuator, operation mode, factor)`
    /// selection whose combined fill-rate contribution over `duration` is
    /// nearest to `actuate_fill_level`.  Ties keep the first enumerated
    /// combination.
    fn choose_operation_modes<'a>(
        &self,
        current_fill_level: f64,
        actuate_fill_level: f64,
        system: &'a FrbcSystemDescription,
        duration_seconds: f64,
    ) -> Vec<(&'a FrbcActuatorDescription, &'a FrbcOperationMode, f64)> {
        // Per actuator: candidate (om, active element, factor grid).
        let mut candidates_per_actuator = Vec::new();
        for actuator in &system.actuators {
            let Some(status) = self.actuator_status_by_id.get(&actuator.id) else {
                warn!(
                    device = %self.device_id,
                    actuator = %actuator.id,
                    "no actuator status yet; leaving actuator out of the search"
                );
                continue;
            };
            let mut candidates = Vec::new();
            for om in Self::reachable_operation_modes(status, actuator) {
                let Some(element) = Self::active_element(current_fill_level, om) else {
                    continue;
                };
                let factors: Vec<f64> = NumericalRange::inclusive_steps(
                    element.fill_level_range.start_of_range,
                    element.fill_level_range.end_of_range,
                    OM_STEP_RESOLUTION,
                )
                .collect();
                candidates.push((actuator, om, element, factors));
            }
            if !candidates.is_empty() {
                candidates_per_actuator.push(candidates);
            }
        }
        if candidates_per_actuator.is_empty() {
            return Vec::new();
        }

        let mut best: Option<(Vec<(&FrbcActuatorDescription, &FrbcOperationMode, f64)>, f64)> =
            None;
        for om_selection in Odometer::new(
            candidates_per_actuator
                .iter()
                .map(Vec::len)
                .collect::<Vec<_>>(),
        ) {
            let selection: Vec<_> = om_selection
                .iter()
                .enumerate()
                .map(|(actuator_idx, &om_idx)| &candidates_per_actuator[actuator_idx][om_idx])
                .collect();

            for factor_selection in
                Odometer::new(selection.iter().map(|c| c.3.len()).collect::<Vec<_>>())
            {
                let mut would_actuate = 0.0;
                let mut combination = Vec::with_capacity(selection.len());
                for (candidate, &factor_idx) in selection.iter().zip(&factor_selection) {
                    let (actuator, om, element, factors) = candidate;
                    let factor = factors[factor_idx];
                    would_actuate +=
                        Self::fill_rate_for_element(element, factor) * duration_seconds;
                    combination.push((*actuator, *om, factor));
                }

                let better = match &best {
                    None => true,
                    Some((_, best_actuate)) => {
                        (actuate_fill_level - would_actuate).abs()
                            < (actuate_fill_level - best_actuate).abs()
                    }
                };
                if better {
                    best = Some((combination, would_actuate));
                }
            }
        }

        best.map(|(combination, _)| combination).unwrap_or_default()
    }
}

impl ControlStrategy for FrbcStrategy {
    fn receive(&mut self, message: &S2Message) {
        match message {
            S2Message::FrbcSystemDescription(sd) => self.system_descriptions.push(sd.clone()),
            S2Message::FrbcActuatorStatus(status) => {
                self.actuator_status_by_id
                    .insert(status.actuator_id.clone(), status.clone());
            }
            S2Message::FrbcFillLevelTargetProfile(profile) => {
                self.fill_level_target_profiles.push(profile.clone());
            }
            S2Message::FrbcLeakageBehaviour(behaviour) => {
                self.leakage_behaviours.push(behaviour.clone());
            }
            S2Message::FrbcUsageForecast(forecast) => self.usage_forecasts.push(forecast.clone()),
            S2Message::FrbcStorageStatus(status) => {
                self.last_known_fill_level = Some(status.present_fill_level);
            }
            other => {
                warn!(
                    device = %self.device_id,
                    message_type = other.type_name(),
                    "FRBC strategy cannot handle this message; ignoring"
                );
            }
        }
    }

    fn tick(
        &mut self,
        timestep_start: DateTime<Utc>,
        timestep_end: DateTime<Utc>,
    ) -> Vec<serde_json::Value> {
        let system = latest_active(timestep_start, &self.system_descriptions, |sd| sd.valid_from);
        let fill_level_at_start = self.last_known_fill_level;
        let profile = latest_active(timestep_end, &self.fill_level_target_profiles, |p| {
            p.start_time
        });

        let (Some(system), Some(fill_level_at_start), Some(profile)) =
            (system, fill_level_at_start, profile)
        else {
            if system.is_none() {
                debug!(device = %self.device_id, "no active system description; skipping tick");
            }
            if self.last_known_fill_level.is_none() {
                debug!(device = %self.device_id, "no fill level known yet; skipping tick");
            }
            if profile.is_none() {
                debug!(device = %self.device_id, "no active fill level target; skipping tick");
            }
            return Vec::new();
        };

        let allowed = system.storage.fill_level_range;
        let expected = Self::expected_fill_level_at_end_of_timestep(
            fill_level_at_start,
            timestep_end,
            profile,
        );
        let target = NumericalRange::new(
            allowed.start_of_range.max(expected.start_of_range),
            allowed.end_of_range.min(expected.end_of_range),
        );

        let expected_usage = self.expected_usage_during_timestep(timestep_start, timestep_end);
        let expected_leakage = self.expected_leakage_during_timestep(
            fill_level_at_start,
            timestep_start,
            timestep_end,
        );
        let fill_level_if_idle = fill_level_at_start + expected_usage + expected_leakage;

        let actuate_fill_level = if target.contains(fill_level_if_idle) {
            0.0
        } else if fill_level_if_idle < target.start_of_range {
            target.start_of_range - fill_level_if_idle
        } else {
            target.end_of_range - fill_level_if_idle
        };

        debug!(
            device = %self.device_id,
            fill_level = fill_level_at_start,
            usage = expected_usage,
            leakage = expected_leakage,
            idle = fill_level_if_idle,
            actuate = actuate_fill_level,
            "tick"
        );

        let duration_seconds =
            (timestep_end - timestep_start).num_milliseconds() as f64 / 1000.0;
        let chosen = self.choose_operation_modes(
            fill_level_at_start,
            actuate_fill_level,
            system,
            duration_seconds,
        );

        let execution_time = timestep_start + Duration::seconds(INSTRUCTION_DELAY_SECONDS);
        let instructions: Vec<serde_json::Value> = chosen
            .into_iter()
            .map(|(actuator, om, factor)| {
                json!({
                    "message_type": "FRBC.Instruction",
                    "message_id": Uuid::new_v4().to_string(),
                    "id": Uuid::new_v4().to_string(),
                    "actuator_id": actuator.id,
                    "operation_mode": om.id,
                    "operation_mode_factor": factor,
                    "execution_time": execution_time.to_rfc3339(),
                    "abnormal_condition": false
                })
            })
            .collect();

        self.instructions_sent.extend(instructions.iter().cloned());
        instructions
    }
}

/// The youngest item whose timestamp is at or before `at`.
fn latest_active<T>(
    at: DateTime<Utc>,
    items: &[T],
    timestamp_of: impl Fn(&T) -> DateTime<Utc>,
) -> Option<&T> {
    items
        .iter()
        .filter(|item| timestamp_of(item) <= at)
        .max_by_key(|item| timestamp_of(item))
}

/// Iterates every index combination of lists with the given lengths, last
/// axis fastest, matching nested-loop enumeration order.
struct Odometer {
    lengths: Vec<usize>,
    current: Vec<usize>,
    done: bool,
}

impl Odometer {
    fn new(lengths: Vec<usize>) -> Self {
        let done = lengths.is_empty() || lengths.iter().any(|&l| l == 0);
        let current = vec![0; lengths.len()];
        Self {
            lengths,
            current,
            done,
        }
    }
}

impl Iterator for Odometer {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.current.clone();
        for axis in (0..self.lengths.len()).rev() {
            self.current[axis] += 1;
            if self.current[axis] < self.lengths[axis] {
                return Some(result);
            }
            self.current[axis] = 0;
        }
        self.done = true;
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use s2_protocol::{
        FrbcFillLevelTargetProfileElement, FrbcStorageDescription, FrbcUsageForecastElement,
    };

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2009, 10, 12, h, m, s).unwrap()
    }

    fn profile(
        start_time: DateTime<Utc>,
        elements: Vec<(u64, f64, f64)>,
    ) -> FrbcFillLevelTargetProfile {
        FrbcFillLevelTargetProfile {
            message_id: "m1".to_owned(),
            start_time,
            elements: elements
                .into_iter()
                .map(|(duration, lo, hi)| FrbcFillLevelTargetProfileElement {
                    duration,
                    fill_level_range: NumericalRange::new(lo, hi),
                })
                .collect(),
        }
    }

    #[test]
    fn expected_fill_level_uses_the_covering_element() {
        let timestep_end = at(13, 45, 0);
        let p = profile(timestep_end - Duration::seconds(10), vec![(60, 100.0, 100.0)]);
        let range = FrbcStrategy::expected_fill_level_at_end_of_timestep(85.0, timestep_end, &p);
        assert_eq!(range, NumericalRange::new(100.0, 100.0));
    }

    #[test]
    fn expected_fill_level_picks_the_second_element_when_the_first_expired() {
        let timestep_end = at(13, 45, 0);
        let p = profile(
            timestep_end - Duration::seconds(70),
            vec![(60, 100.0, 100.0), (60, 0.0, 10.0)],
        );
        let range = FrbcStrategy::expected_fill_level_at_end_of_timestep(85.0, timestep_end, &p);
        assert_eq!(range, NumericalRange::new(0.0, 10.0));
    }

    #[test]
    fn expected_fill_level_degenerates_without_a_covering_element() {
        let timestep_end = at(13, 45, 0);

        // No elements at all.
        let p = profile(timestep_end - Duration::seconds(70), vec![]);
        let range = FrbcStrategy::expected_fill_level_at_end_of_timestep(85.0, timestep_end, &p);
        assert_eq!(range, NumericalRange::new(85.0, 85.0));

        // All elements expired.
        let p = profile(
            timestep_end - Duration::seconds(130),
            vec![(60, 100.0, 100.0), (60, 0.0, 10.0)],
        );
        let range = FrbcStrategy::expected_fill_level_at_end_of_timestep(85.0, timestep_end, &p);
        assert_eq!(range, NumericalRange::new(85.0, 85.0));
    }

    #[test]
    fn fill_rate_interpolates_linearly() {
        let element = FrbcOperationModeElement {
            fill_level_range: NumericalRange::new(20.0, 30.0),
            fill_rate: NumericalRange::new(5.0, 8.0),
            power_ranges: None,
            running_costs: None,
        };
        assert_eq!(FrbcStrategy::fill_rate_for_element(&element, 0.0), 5.0);
        assert_eq!(FrbcStrategy::fill_rate_for_element(&element, 1.0), 8.0);
        assert_eq!(FrbcStrategy::fill_rate_for_element(&element, 0.5), 6.5);

        let negative = FrbcOperationModeElement {
            fill_level_range: NumericalRange::new(0.0, 100.0),
            fill_rate: NumericalRange::new(-5.33, 5.33),
            power_ranges: None,
            running_costs: None,
        };
        assert!((FrbcStrategy::fill_rate_for_element(&negative, 0.5)).abs() < 1e-9);
    }

    #[test]
    fn usage_forecast_durations_are_milliseconds() {
        let mut strategy = FrbcStrategy::new("dev");
        let start = at(13, 44, 0);
        let end = at(13, 45, 0);
        strategy.usage_forecasts.push(FrbcUsageForecast {
            message_id: "m1".to_owned(),
            start_time: start,
            elements: vec![FrbcUsageForecastElement {
                duration: 30_000,
                usage_rate_expected: -2.0,
                usage_rate_upper_limit: None,
                usage_rate_lower_limit: None,
                usage_rate_upper_95ppr: None,
                usage_rate_lower_95ppr: None,
            }],
        });
        // 30 s of overlap at -2.0 per second.
        let usage = strategy.expected_usage_during_timestep(start, end);
        assert!((usage + 60.0).abs() < 1e-9);
    }

    fn single_actuator_system(valid_from: DateTime<Utc>) -> FrbcSystemDescription {
        FrbcSystemDescription {
            message_id: "sd1".to_owned(),
            valid_from,
            actuators: vec![FrbcActuatorDescription {
                id: "a1".to_owned(),
                diagnostic_label: None,
                supported_commodities: None,
                operation_modes: vec![FrbcOperationMode {
                    id: "om0".to_owned(),
                    diagnostic_label: None,
                    elements: vec![FrbcOperationModeElement {
                        fill_level_range: NumericalRange::new(0.0, 100.0),
                        fill_rate: NumericalRange::new(-5.33, 5.33),
                        power_ranges: None,
                        running_costs: None,
                    }],
                    abnormal_condition_only: None,
                }],
                transitions: vec![],
                timers: vec![],
            }],
            storage: FrbcStorageDescription {
                diagnostic_label: None,
                fill_level_label: None,
                provides_leakage_behaviour: None,
                provides_fill_level_target_profile: None,
                provides_usage_forecast: None,
                fill_level_range: NumericalRange::new(0.0, 100.0),
            },
        }
    }

    fn bootstrap_strategy(start: DateTime<Utc>, present_fill_level: f64) -> FrbcStrategy {
        let mut strategy = FrbcStrategy::new("dev");
        strategy
            .system_descriptions
            .push(single_actuator_system(start - Duration::seconds(10)));
        strategy.actuator_status_by_id.insert(
            "a1".to_owned(),
            FrbcActuatorStatus {
                message_id: "as1".to_owned(),
                actuator_id: "a1".to_owned(),
                active_operation_mode_id: "om0".to_owned(),
                operation_mode_factor: 0.5,
                previous_operation_mode_id: None,
                transition_timestamp: None,
            },
        );
        strategy.last_known_fill_level = Some(present_fill_level);
        strategy
    }

    #[test]
    fn tick_steers_toward_the_target_fill_level() {
        let start = at(13, 44, 0);
        let end = start + Duration::seconds(60);

        let mut strategy = bootstrap_strategy(start, 85.0);
        strategy
            .fill_level_target_profiles
            .push(profile(start, vec![(60, 100.0, 100.0)]));

        let instructions = strategy.tick(start, end);
        assert_eq!(instructions.len(), 1);
        let instruction = &instructions[0];
        assert_eq!(instruction["message_type"], "FRBC.Instruction");
        assert_eq!(instruction["actuator_id"], "a1");
        assert_eq!(instruction["operation_mode"], "om0");
        assert_eq!(instruction["abnormal_condition"], false);

        // actuate = +15 over 60 s; required rate 0.25/s.  With rates in
        // [-5.33, 5.33] the best factor is (0.25 + 5.33) / 10.66 ~ 0.5234,
        // landing on the 0.523 grid point.
        let factor = instruction["operation_mode_factor"].as_f64().unwrap();
        assert!((factor - 0.523).abs() < 1e-9, "factor was {factor}");

        let execution_time = instruction["execution_time"].as_str().unwrap();
        let execution_time: DateTime<Utc> =
            DateTime::parse_from_rfc3339(execution_time).unwrap().into();
        assert_eq!(execution_time, start + Duration::seconds(2));

        assert_eq!(strategy.instructions_sent().len(), 1);
    }

    #[test]
    fn tick_aims_for_zero_rate_when_already_on_target() {
        let start = at(13, 44, 0);
        let end = start + Duration::seconds(60);

        let mut strategy = bootstrap_strategy(start, 85.0);
        strategy
            .fill_level_target_profiles
            .push(profile(start, vec![(60, 0.0, 100.0)]));

        let instructions = strategy.tick(start, end);
        assert_eq!(instructions.len(), 1);
        let factor = instructions[0]["operation_mode_factor"].as_f64().unwrap();
        // Zero fill rate sits exactly at factor 0.5.
        assert!((factor - 0.5).abs() < OM_STEP_RESOLUTION + 1e-9);
    }

    #[test]
    fn tick_without_prerequisites_emits_nothing() {
        let start = at(13, 44, 0);
        let end = start + Duration::seconds(60);

        // No storage status yet.
        let mut strategy = FrbcStrategy::new("dev");
        strategy
            .system_descriptions
            .push(single_actuator_system(start));
        strategy
            .fill_level_target_profiles
            .push(profile(start, vec![(60, 100.0, 100.0)]));
        assert!(strategy.tick(start, end).is_empty());

        // No target profile yet.
        let mut strategy = bootstrap_strategy(start, 85.0);
        assert!(strategy.tick(start, end).is_empty());
    }

    #[test]
    fn receive_tracks_storage_status_and_actuator_status() {
        let mut strategy = FrbcStrategy::new("dev");
        strategy.receive(&S2Message::FrbcStorageStatus(
            s2_protocol::FrbcStorageStatus {
                message_id: "m1".to_owned(),
                present_fill_level: 42.0,
            },
        ));
        assert_eq!(strategy.last_known_fill_level, Some(42.0));

        strategy.receive(&S2Message::FrbcActuatorStatus(FrbcActuatorStatus {
            message_id: "m2".to_owned(),
            actuator_id: "a7".to_owned(),
            active_operation_mode_id: "om1".to_owned(),
            operation_mode_factor: 0.1,
            previous_operation_mode_id: None,
            transition_timestamp: None,
        }));
        assert!(strategy.actuator_status_by_id.contains_key("a7"));
    }

    #[test]
    fn reachable_operation_modes_follow_transitions_from_the_active_mode() {
        let mut system = single_actuator_system(at(13, 0, 0));
        let actuator = &mut system.actuators[0];
        actuator.operation_modes.push(FrbcOperationMode {
            id: "om1".to_owned(),
            diagnostic_label: None,
            elements: vec![],
            abnormal_condition_only: None,
        });
        actuator.operation_modes.push(FrbcOperationMode {
            id: "om2".to_owned(),
            diagnostic_label: None,
            elements: vec![],
            abnormal_condition_only: None,
        });
        actuator.transitions.push(s2_protocol::FrbcTransition {
            id: "t1".to_owned(),
            from: "om0".to_owned(),
            to: "om1".to_owned(),
            start_timers: vec![],
            blocking_timers: vec![],
            transition_costs: None,
            transition_duration: None,
            abnormal_condition_only: None,
        });
        actuator.transitions.push(s2_protocol::FrbcTransition {
            id: "t2".to_owned(),
            from: "om1".to_owned(),
            to: "om2".to_owned(),
            start_timers: vec![],
            blocking_timers: vec![],
            transition_costs: None,
            transition_duration: None,
            abnormal_condition_only: None,
        });

        let status = FrbcActuatorStatus {
            message_id: "m1".to_owned(),
            actuator_id: "a1".to_owned(),
            active_operation_mode_id: "om0".to_owned(),
            operation_mode_factor: 0.0,
            previous_operation_mode_id: None,
            transition_timestamp: None,
        };
        let reachable = FrbcStrategy::reachable_operation_modes(&status, &system.actuators[0]);
        let ids: Vec<&str> = reachable.iter().map(|om| om.id.as_str()).collect();
        assert_eq!(ids, vec!["om0", "om1"]);
    }

    #[test]
    fn odometer_enumerates_in_nested_loop_order() {
        let combos: Vec<Vec<usize>> = Odometer::new(vec![2, 3]).collect();
        assert_eq!(
            combos,
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![0, 2],
                vec![1, 0],
                vec![1, 1],
                vec![1, 2],
            ]
        );
        assert!(Odometer::new(vec![]).next().is_none());
        assert!(Odometer::new(vec![2, 0]).next().is_none());
    }
}
