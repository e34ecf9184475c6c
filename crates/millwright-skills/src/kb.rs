//! Shared knowledge-base pathway for the diagnose and chat skills:
//! atom lookup, the Layer-0 gate, and the deterministic Sources block.
//!
//! The Sources block is always built from atom fields, never parsed out of
//! model output, so citations cannot be fabricated.

use millwright_connectors::knowledge::KbAtom;

/// Fault codes eligible for the Layer-0 short-circuit.
pub const LAYER0_FAULT_CODES: &[&str] = &["E001", "M001", "M002", "T001", "C001"];

/// Atom types that carry a directly actionable answer.
pub const ACTIONABLE_ATOM_TYPES: &[&str] =
    &["procedure", "fault_code", "checklist", "troubleshooting"];

/// Footer for replies answered straight from the KB, without an LLM call.
pub const LAYER0_FOOTER: &str = "\n\n_Layer 0 (KB direct) | 0ms_";

/// An atom is actionable when it carries concrete steps or fixes.
pub fn atom_is_actionable(atom: &KbAtom) -> bool {
    !atom.steps.is_empty() || !atom.fixes.is_empty()
}

/// The confidence gate shared by both Layer-0 paths: actionable type,
/// concrete steps/fixes, and either no score or a score above 0.85.
pub fn atom_layer0_ready(atom: &KbAtom) -> bool {
    ACTIONABLE_ATOM_TYPES.contains(&atom.atom_type.as_str())
        && atom_is_actionable(atom)
        && atom.score.is_none_or(|s| s > 0.85)
}

/// Full Layer-0 gate for the diagnose path: the fault code must also be in
/// the known-answer set.
pub fn layer0_eligible(fault_code: &str, atom: &KbAtom) -> bool {
    LAYER0_FAULT_CODES.contains(&fault_code) && atom_layer0_ready(atom)
}

/// The atom-derived answer body: title plus bulleted steps (or fixes).
pub fn atom_answer(atom: &KbAtom) -> String {
    let mut out = format!("**{}**", atom.title);
    if !atom.summary.is_empty() {
        out.push('\n');
        out.push_str(&atom.summary);
    }
    let items = if atom.steps.is_empty() {
        &atom.fixes
    } else {
        &atom.steps
    };
    for item in items {
        out.push_str("\n- ");
        out.push_str(item);
    }
    out
}

/// Deterministic Sources block from atom links/titles, deduplicated in
/// first-seen order. Empty when there are no atoms.
pub fn sources_block(atoms: &[KbAtom]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    for atom in atoms {
        let source = atom.source();
        if !source.is_empty() && !seen.contains(&source) {
            seen.push(source);
        }
    }
    if seen.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n\n**Sources:**");
    for (i, source) in seen.iter().enumerate() {
        out.push_str(&format!("\n{}. {}", i + 1, source));
    }
    out
}

/// Short "- title: summary" context lines for prompt injection.
pub fn kb_context(atoms: &[KbAtom], max_summary: usize) -> String {
    atoms
        .iter()
        .map(|atom| {
            let summary: String = atom.summary.chars().take(max_summary).collect();
            format!("- {}: {}", atom.title, summary)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
