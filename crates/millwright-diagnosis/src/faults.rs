//! Rule-based fault detection for conveyor systems.
//!
//! Maps PLC tags to fault conditions with technician-friendly explanations.
//! Every rule is a declarative predicate over named tag values with literal
//! thresholds; the fault code is the join key into the knowledge base.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type TagMap = serde_json::Map<String, Value>;

/// Severity, ordered most-severe first (the sort key for fault lists).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultSeverity {
    Emergency,
    Critical,
    Warning,
    Info,
}

impl FaultSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultSeverity::Emergency => "emergency",
            FaultSeverity::Critical => "critical",
            FaultSeverity::Warning => "warning",
            FaultSeverity::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultDiagnosis {
    pub fault_code: String,
    pub severity: FaultSeverity,
    pub title: String,
    pub description: String,
    pub likely_causes: Vec<String>,
    pub suggested_checks: Vec<String>,
    pub affected_tags: Vec<String>,
    #[serde(default)]
    pub requires_maintenance: bool,
    #[serde(default)]
    pub requires_safety_review: bool,
}

impl FaultDiagnosis {
    fn new(
        fault_code: &str,
        severity: FaultSeverity,
        title: &str,
        description: String,
    ) -> Self {
        Self {
            fault_code: fault_code.to_string(),
            severity,
            title: title.to_string(),
            description,
            likely_causes: Vec::new(),
            suggested_checks: Vec::new(),
            affected_tags: Vec::new(),
            requires_maintenance: false,
            requires_safety_review: false,
        }
    }

    fn causes(mut self, causes: &[&str]) -> Self {
        self.likely_causes = causes.iter().map(|s| s.to_string()).collect();
        self
    }

    fn checks(mut self, checks: &[&str]) -> Self {
        self.suggested_checks = checks.iter().map(|s| s.to_string()).collect();
        self
    }

    fn tags(mut self, tags: &[&str]) -> Self {
        self.affected_tags = tags.iter().map(|s| s.to_string()).collect();
        self
    }

    fn maintenance(mut self) -> Self {
        self.requires_maintenance = true;
        self
    }

    fn safety_review(mut self) -> Self {
        self.requires_safety_review = true;
        self
    }
}

/// Truthiness for PLC tags: booleans as-is, numbers non-zero, strings "1"/"true".
pub fn tag_bool(tags: &TagMap, key: &str) -> bool {
    match tags.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0) != 0.0,
        Some(Value::String(s)) => s == "1" || s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

pub fn tag_f64(tags: &TagMap, key: &str) -> f64 {
    match tags.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::Bool(b)) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub fn tag_i64(tags: &TagMap, key: &str) -> i64 {
    tag_f64(tags, key) as i64
}

fn tag_str(tags: &TagMap, key: &str) -> String {
    tags.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Analyze a tag snapshot and return detected faults, most severe first.
/// Never empty: with no trigger, a single INFO `OK` or `IDLE` diagnosis is
/// emitted based on the motion flags.
pub fn detect_faults(tags: &TagMap) -> Vec<FaultDiagnosis> {
    let mut faults: Vec<FaultDiagnosis> = Vec::new();

    let motor_running = tag_bool(tags, "motor_running");
    let motor_speed = tag_i64(tags, "motor_speed");
    let motor_current = tag_f64(tags, "motor_current");
    let temperature = tag_f64(tags, "temperature");
    let pressure = tag_i64(tags, "pressure");
    let conveyor_running = tag_bool(tags, "conveyor_running");
    let conveyor_speed = tag_i64(tags, "conveyor_speed");
    let sensor_1 = tag_bool(tags, "sensor_1");
    let sensor_2 = tag_bool(tags, "sensor_2");
    let fault_alarm = tag_bool(tags, "fault_alarm");
    let e_stop = tag_bool(tags, "e_stop");
    let error_code = tag_i64(tags, "error_code");
    let error_message = tag_str(tags, "error_message");

    if e_stop {
        faults.push(
            FaultDiagnosis::new(
                "E001",
                FaultSeverity::Emergency,
                "Emergency Stop Active",
                "The emergency stop button has been pressed. All motion is halted.".into(),
            )
            .causes(&["Operator pressed E-stop button", "Safety interlock triggered"])
            .checks(&[
                "Verify area is safe before reset",
                "Check for personnel in hazard zones",
                "Inspect equipment for damage",
                "Reset E-stop and clear faults in sequence",
            ])
            .tags(&["e_stop", "motor_running", "conveyor_running"])
            .safety_review(),
        );
    }

    if motor_running && motor_current > 5.0 {
        faults.push(
            FaultDiagnosis::new(
                "M001",
                FaultSeverity::Critical,
                "Motor Overcurrent",
                format!(
                    "Motor current ({motor_current:.1}A) exceeds safe limit (5.0A)."
                ),
            )
            .causes(&[
                "Mechanical binding or jam",
                "Bearing failure",
                "Belt tension too high",
            ])
            .checks(&[
                "Check conveyor belt for jams",
                "Inspect motor bearings",
                "Verify belt tension",
                "Check motor thermal overload relay",
            ])
            .tags(&["motor_current", "motor_running"])
            .maintenance(),
        );
    }

    if temperature > 80.0 {
        faults.push(
            FaultDiagnosis::new(
                "T001",
                FaultSeverity::Critical,
                "High Temperature Alarm",
                format!("Temperature ({temperature:.1}C) exceeds safe limit (80C)."),
            )
            .causes(&[
                "Cooling fan failure",
                "Blocked ventilation",
                "Excessive motor load",
            ])
            .checks(&[
                "Check cooling fan operation",
                "Clear blocked vents",
                "Reduce motor load temporarily",
                "Allow cooldown before restart",
            ])
            .tags(&["temperature"])
            .maintenance(),
        );
    }

    if motor_running && conveyor_running && sensor_1 && sensor_2 {
        faults.push(
            FaultDiagnosis::new(
                "C001",
                FaultSeverity::Critical,
                "Conveyor Jam Detected",
                "Both part sensors are active simultaneously. Product flow is blocked.".into(),
            )
            .causes(&[
                "Product jam at transfer point",
                "Misaligned part on conveyor",
            ])
            .checks(&[
                "Clear jammed product from conveyor",
                "Check downstream equipment",
                "Verify sensor alignment",
                "Inspect guide rails",
            ])
            .tags(&["sensor_1", "sensor_2", "conveyor_running"]),
        );
    }

    if !motor_running && conveyor_speed > 0 && !e_stop {
        faults.push(
            FaultDiagnosis::new(
                "M002",
                FaultSeverity::Critical,
                "Motor Stopped Unexpectedly",
                "Motor stopped but conveyor speed setpoint is non-zero.".into(),
            )
            .causes(&[
                "Thermal overload tripped",
                "Motor contactor failure",
                "VFD fault",
            ])
            .checks(&[
                "Check motor starter/contactor",
                "Verify VFD status",
                "Check thermal overload relay",
                "Verify power at motor terminals",
            ])
            .tags(&["motor_running", "conveyor_speed"])
            .maintenance(),
        );
    }

    if pressure < 60 && motor_running {
        faults.push(
            FaultDiagnosis::new(
                "P001",
                FaultSeverity::Warning,
                "Low Pneumatic Pressure",
                format!("System pressure ({pressure} PSI) below normal (60+ PSI)."),
            )
            .causes(&[
                "Compressed air supply issue",
                "Air leak",
                "Filter or regulator clogged",
            ])
            .checks(&[
                "Check main air supply pressure",
                "Listen for air leaks",
                "Inspect air filter and regulator",
                "Verify compressor operation",
            ])
            .tags(&["pressure"]),
        );
    }

    if motor_running && motor_speed < 30 && conveyor_speed > 50 {
        faults.push(
            FaultDiagnosis::new(
                "M003",
                FaultSeverity::Warning,
                "Motor Speed Mismatch",
                format!(
                    "Motor speed ({motor_speed}%) lower than setpoint ({conveyor_speed}%)."
                ),
            )
            .causes(&["Belt slipping on pulleys", "Motor struggling under load"])
            .checks(&[
                "Check belt tension and condition",
                "Verify motor current",
                "Check VFD parameters",
                "Inspect drive components",
            ])
            .tags(&["motor_speed", "conveyor_speed"]),
        );
    }

    if temperature > 65.0 && temperature <= 80.0 {
        faults.push(
            FaultDiagnosis::new(
                "T002",
                FaultSeverity::Warning,
                "Elevated Temperature",
                format!(
                    "Temperature ({temperature:.1}C) above normal (65C). Monitor closely."
                ),
            )
            .causes(&["Heavy continuous operation", "Reduced cooling efficiency"])
            .checks(&[
                "Monitor temperature trend",
                "Ensure cooling is adequate",
                "Plan maintenance window if trend continues",
            ])
            .tags(&["temperature"]),
        );
    }

    if fault_alarm && error_code > 0 {
        let title = if error_message.is_empty() {
            format!("PLC Fault: Error Code {error_code}")
        } else {
            format!("PLC Fault: {error_message}")
        };
        faults.push(
            FaultDiagnosis::new(
                &format!("PLC{error_code:03}"),
                FaultSeverity::Critical,
                &title,
                format!("The PLC has reported fault code {error_code}."),
            )
            .causes(&["See PLC fault documentation"])
            .checks(&[
                "Review PLC fault log",
                "Check associated I/O points",
                "Verify sensor and actuator operation",
            ])
            .tags(&["fault_alarm", "error_code"])
            .maintenance(),
        );
    }

    if faults.is_empty() {
        if motor_running && conveyor_running {
            faults.push(FaultDiagnosis::new(
                "OK",
                FaultSeverity::Info,
                "System Running Normally",
                "All monitored parameters are within normal ranges.".into(),
            ));
        } else {
            faults.push(FaultDiagnosis::new(
                "IDLE",
                FaultSeverity::Info,
                "System Idle",
                "Equipment is stopped. Ready to start when commanded.".into(),
            ));
        }
    }

    faults.sort_by_key(|f| f.severity);
    faults
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags(v: Value) -> TagMap {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn e_stop_is_an_emergency() {
        let t = tags(json!({
            "motor_running": false, "conveyor_running": false,
            "e_stop": true, "motor_current": 0,
        }));
        let faults = detect_faults(&t);
        assert_eq!(faults[0].fault_code, "E001");
        assert_eq!(faults[0].severity, FaultSeverity::Emergency);
        assert!(faults[0].requires_safety_review);
    }

    #[test]
    fn overcurrent_requires_running_motor() {
        let stopped = tags(json!({"motor_running": false, "motor_current": 9.5}));
        assert!(detect_faults(&stopped).iter().all(|f| f.fault_code != "M001"));

        let running = tags(json!({"motor_running": true, "motor_current": 9.5, "pressure": 80}));
        let faults = detect_faults(&running);
        assert_eq!(faults[0].fault_code, "M001");
        assert!(faults[0].requires_maintenance);
    }

    #[test]
    fn conveyor_jam_needs_both_sensors_while_running() {
        let t = tags(json!({
            "motor_running": true, "conveyor_running": true,
            "sensor_1": 1, "sensor_2": 1, "pressure": 80,
        }));
        let codes: Vec<_> = detect_faults(&t)
            .into_iter()
            .map(|f| f.fault_code)
            .collect();
        assert!(codes.contains(&"C001".to_string()));
    }

    #[test]
    fn temperature_bands_are_disjoint() {
        let warm = tags(json!({"temperature": 70.0}));
        let codes: Vec<_> = detect_faults(&warm).into_iter().map(|f| f.fault_code).collect();
        assert!(codes.contains(&"T002".to_string()));
        assert!(!codes.contains(&"T001".to_string()));

        let hot = tags(json!({"temperature": 85.0}));
        let codes: Vec<_> = detect_faults(&hot).into_iter().map(|f| f.fault_code).collect();
        assert!(codes.contains(&"T001".to_string()));
        assert!(!codes.contains(&"T002".to_string()));
    }

    #[test]
    fn plc_error_code_formats_fault_code() {
        let t = tags(json!({"fault_alarm": true, "error_code": 7}));
        let faults = detect_faults(&t);
        assert!(faults.iter().any(|f| f.fault_code == "PLC007"));
    }

    #[test]
    fn no_triggers_yields_single_info() {
        let running = tags(json!({
            "motor_running": true, "conveyor_running": true,
            "motor_current": 2.0, "temperature": 40.0, "pressure": 90,
            "motor_speed": 60, "conveyor_speed": 60,
        }));
        let faults = detect_faults(&running);
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].fault_code, "OK");

        let idle = tags(json!({"motor_running": false, "conveyor_running": false}));
        let faults = detect_faults(&idle);
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].fault_code, "IDLE");
        assert_eq!(faults[0].severity, FaultSeverity::Info);
    }

    #[test]
    fn fault_list_is_never_empty_and_sorted_by_severity() {
        let t = tags(json!({
            "e_stop": true, "motor_running": true, "motor_current": 8.0,
            "temperature": 70.0, "pressure": 40,
        }));
        let faults = detect_faults(&t);
        assert!(!faults.is_empty());
        for pair in faults.windows(2) {
            assert!(pair[0].severity <= pair[1].severity);
        }
        assert_eq!(faults[0].severity, FaultSeverity::Emergency);
    }

    #[test]
    fn empty_tag_map_still_diagnoses() {
        let faults = detect_faults(&TagMap::new());
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].fault_code, "IDLE");
    }
}
