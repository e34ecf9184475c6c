//! Prompt assembly for LLM diagnosis.

use serde_json::Value;

use crate::faults::{FaultDiagnosis, FaultSeverity, TagMap};

pub const SYSTEM_PROMPT: &str = "\
You are Millwright, an AI assistant for industrial maintenance technicians.

Your role:
- Help diagnose equipment faults quickly
- Provide clear, actionable guidance
- Prioritize safety
- Reference real data from PLC tags
- Keep explanations concise

Equipment context:
- Allen-Bradley Micro820 PLC
- Conveyor system with motor, sensors, and pneumatics
- Standard industrial safety interlocks

Communication style:
- Direct and professional
- Use bullet points for steps
- Bold safety warnings
- Reference specific tag names and values";

/// Keys never shown in tag tables or status output.
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with('_') || matches!(key, "id" | "timestamp" | "node_id")
}

/// Technician-facing rendering: booleans (and 0/1 numbers) as ON/OFF,
/// floats to two decimals.
pub fn display_tag_value(value: &Value) -> String {
    match value {
        Value::Bool(true) => "ON".to_string(),
        Value::Bool(false) => "OFF".to_string(),
        Value::Number(n) => {
            let f = n.as_f64().unwrap_or(0.0);
            if f == 0.0 {
                "OFF".to_string()
            } else if f == 1.0 {
                "ON".to_string()
            } else if n.is_f64() {
                format!("{f:.2}")
            } else {
                n.to_string()
            }
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the structured prompt the diagnose path sends to the LLM: tag
/// table + fault table + the technician's question + response rules.
pub fn build_diagnosis_prompt(
    question: &str,
    tags: &TagMap,
    faults: &[FaultDiagnosis],
) -> String {
    let mut tag_lines: Vec<String> = Vec::new();
    let mut keys: Vec<&String> = tags.keys().collect();
    keys.sort();
    for key in keys {
        if is_reserved_key(key) {
            continue;
        }
        tag_lines.push(format!("  {}: {}", key, display_tag_value(&tags[key])));
    }
    let tag_state = tag_lines.join("\n");

    let mut fault_lines: Vec<String> = Vec::new();
    for f in faults {
        if f.severity == FaultSeverity::Info {
            continue;
        }
        fault_lines.push(format!(
            "  [{}] {}: {}",
            f.severity.as_str().to_uppercase(),
            f.fault_code,
            f.title
        ));
        fault_lines.push(format!("    {}", f.description));
        if !f.likely_causes.is_empty() {
            let causes: Vec<&str> = f.likely_causes.iter().take(3).map(String::as_str).collect();
            fault_lines.push(format!("    Causes: {}", causes.join(", ")));
        }
    }
    let fault_state = if fault_lines.is_empty() {
        "  No active faults detected".to_string()
    } else {
        fault_lines.join("\n")
    };

    format!(
        "CURRENT EQUIPMENT STATE:\n{tag_state}\n\nDETECTED FAULTS:\n{fault_state}\n\n\
         TECHNICIAN'S QUESTION:\n{question}\n\n\
         INSTRUCTIONS:\n\
         1. Answer the technician's question directly and concisely\n\
         2. Reference specific tag values when relevant\n\
         3. Provide 2-4 actionable troubleshooting steps\n\
         4. Use plain language - avoid jargon\n\
         5. If safety is a concern, mention it first\n\
         6. Keep response under 200 words\n\n\
         RESPONSE:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::detect_faults;
    use serde_json::json;

    #[test]
    fn display_values_follow_plc_conventions() {
        assert_eq!(display_tag_value(&json!(true)), "ON");
        assert_eq!(display_tag_value(&json!(0)), "OFF");
        assert_eq!(display_tag_value(&json!(1)), "ON");
        assert_eq!(display_tag_value(&json!(4.567)), "4.57");
        assert_eq!(display_tag_value(&json!(75)), "75");
    }

    #[test]
    fn reserved_keys_are_skipped() {
        assert!(is_reserved_key("id"));
        assert!(is_reserved_key("node_id"));
        assert!(is_reserved_key("_internal"));
        assert!(!is_reserved_key("motor_current"));
    }

    #[test]
    fn prompt_contains_tags_faults_and_question() {
        let tags = json!({
            "motor_running": true, "motor_current": 8.25,
            "id": 991, "timestamp": "2025-01-01T00:00:00Z",
        })
        .as_object()
        .unwrap()
        .clone();
        let faults = detect_faults(&tags);
        let prompt = build_diagnosis_prompt("Why is it drawing so much current?", &tags, &faults);

        assert!(prompt.contains("motor_current: 8.25"));
        assert!(!prompt.contains("991"));
        assert!(prompt.contains("[CRITICAL] M001"));
        assert!(prompt.contains("Why is it drawing so much current?"));
    }

    #[test]
    fn info_only_fault_list_reads_as_clear() {
        let tags = json!({"motor_running": false}).as_object().unwrap().clone();
        let faults = detect_faults(&tags);
        let prompt = build_diagnosis_prompt("status?", &tags, &faults);
        assert!(prompt.contains("No active faults detected"));
    }
}
