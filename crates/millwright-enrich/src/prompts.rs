//! Vision prompts for component enrichment.

pub const ENRICHMENT_SYSTEM_PROMPT: &str = "\
You are an expert industrial electrician analyzing a close-up photograph \
of an electrical component. Extract all visible data from the nameplate, \
terminals, and any markings. Be precise - only report what you can see.";

pub const ENRICHMENT_USER_PROMPT: &str = r#"Analyze this close-up photo of an electrical component.

Extract everything visible:
1. **Nameplate**: manufacturer, product name, part number, catalog number
2. **Ratings**: voltage, current, power, frequency, coil voltage, trip range
3. **Terminals**: numbered terminal IDs visible on the device
4. **Component type**: What kind of device is this? (contactor, overload relay, circuit breaker, VFD, motor starter, transformer, terminal block, sensor, switch, indicator, fuse, etc.)
5. **Any wiring diagram** printed on the device itself

RESPOND IN JSON ONLY:
{
  "vendor": "manufacturer name",
  "product": "product name or series",
  "part_number": "exact part/catalog number",
  "component_type": "type of device",
  "ratings": {
    "voltage": "rated voltage or null",
    "current": "rated current or null",
    "power": "rated power or null",
    "frequency": "frequency or null",
    "coil_voltage": "coil voltage or null",
    "trip_range": "overload trip range or null"
  },
  "terminals": {
    "1": {"label": "L1 or description"},
    "2": {"label": "T1 or description"}
  },
  "wiring_diagram": {
    "coil_terminals": ["A1", "A2"],
    "power_poles": [["1","2"], ["3","4"], ["5","6"]],
    "aux_contacts": [["13","14"]],
    "notes": "any diagram text"
  },
  "additional_text": "any other text visible on the component",
  "confidence": 0.8
}

IMPORTANT:
- Only report what you can actually READ on the component.
- If a field is not visible, use null.
- Terminal labels like L1/T1 are standard IEC designations."#;
