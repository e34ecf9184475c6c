//! Knowledge-base enrichment pipeline.
//!
//! Four strictly sequential stages turn one component photo into a KB atom:
//!
//! ```text
//! [INGEST]     vision OCR: vendor, part number, terminals, ratings
//! [AUGMENT]    search the KB for matching atoms
//! [SYNTHESIZE] merge into one canonical atom; conflicts flag review
//! [UPSERT]     insert new atom or update the existing one
//! ```
//!
//! Upsert failures never propagate — the caller still gets a best-effort
//! summary to show the user.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use millwright_connectors::knowledge::{AtomUpdate, KbAtom, KnowledgeStore, Provenance};
use millwright_core::types::Intent;
use millwright_llm::provider::{ChatMessage, ImagePayload};
use millwright_llm::router::{LlmRouter, RouteRequest};

use crate::json_repair::repair_and_parse;
use crate::prompts::{ENRICHMENT_SYSTEM_PROMPT, ENRICHMENT_USER_PROMPT};

/// What the vision stage extracted from the photo.
#[derive(Debug, Clone, Default)]
pub struct VisionData {
    pub vendor: String,
    pub product: String,
    pub part_number: String,
    pub component_type: String,
    pub ratings: serde_json::Map<String, Value>,
    pub terminals: serde_json::Map<String, Value>,
    pub wiring_diagram: Value,
    pub confidence: f64,
}

impl VisionData {
    /// Build from the (repaired) model JSON. Models sometimes return a list
    /// for multi-component photos; the first element wins.
    fn from_value(value: Value) -> Self {
        let value = match value {
            Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
            other => other,
        };

        let str_field = |v: &Value, key: &str| -> String {
            v.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let map_field = |v: &Value, key: &str| -> serde_json::Map<String, Value> {
            v.get(key)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };

        let mut ratings = map_field(&value, "ratings");
        ratings.retain(|_, v| !v.is_null());

        Self {
            vendor: str_field(&value, "vendor"),
            product: str_field(&value, "product"),
            part_number: str_field(&value, "part_number"),
            component_type: str_field(&value, "component_type"),
            ratings,
            terminals: map_field(&value, "terminals"),
            wiring_diagram: value.get("wiring_diagram").cloned().unwrap_or(Value::Null),
            confidence: value
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
        }
    }
}

/// The synthesized atom plus the upsert decision inputs.
#[derive(Debug, Clone)]
pub struct AtomDraft {
    pub existing_atom_id: Option<i64>,
    pub conflict: bool,
    pub atom: KbAtom,
    pub component_type: String,
    pub terminal_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EnrichmentResult {
    pub atom_id: Option<i64>,
    pub vendor: String,
    pub product: String,
    pub part_number: String,
    pub component_type: String,
    pub is_new: bool,
    pub was_updated: bool,
    pub needs_review: bool,
    pub summary: String,
}

pub struct EnrichmentPipeline {
    router: Arc<LlmRouter>,
    kb: Option<Arc<dyn KnowledgeStore>>,
}

impl EnrichmentPipeline {
    pub fn new(router: Arc<LlmRouter>, kb: Option<Arc<dyn KnowledgeStore>>) -> Self {
        Self { router, kb }
    }

    /// Run the full four-stage pipeline on one photo.
    pub async fn enrich_from_photo(
        &self,
        image: ImagePayload,
        tag_hint: Option<&str>,
        photo_id: &str,
    ) -> EnrichmentResult {
        info!(photo_id, "enrichment: stage 1 INGEST");
        let vision = self.ingest(image, tag_hint).await;

        if vision.vendor.is_empty()
            && vision.product.is_empty()
            && vision.part_number.is_empty()
            && vision.component_type.is_empty()
        {
            warn!(photo_id, "vision extracted nothing usable; skipping KB write");
            return EnrichmentResult {
                summary: "Could not identify the component from the photo.".to_string(),
                ..Default::default()
            };
        }

        info!(photo_id, "enrichment: stage 2 AUGMENT");
        let kb_matches = self.augment(&vision).await;

        info!(photo_id, "enrichment: stage 3 SYNTHESIZE");
        let draft = synthesize(&vision, &kb_matches, photo_id);

        info!(photo_id, "enrichment: stage 4 UPSERT");
        let existing_id = draft.existing_atom_id;
        let atom_id = self.upsert(&draft).await;

        let is_new = atom_id.is_some() && existing_id.is_none();
        let was_updated = atom_id.is_some() && existing_id.is_some();

        let named = if draft.atom.product.is_empty() {
            &draft.atom.part_number
        } else {
            &draft.atom.product
        };
        let summary = if is_new {
            format!(
                "New component: {} {} ({}). Added to KB with {} terminals.",
                draft.atom.vendor, named, draft.component_type, draft.terminal_count
            )
        } else if was_updated {
            if draft.conflict {
                format!(
                    "Known component: {} {}. Conflicting data detected; flagged for review.",
                    draft.atom.vendor, named
                )
            } else {
                format!(
                    "Known component: {} {}. Updated with new photo data.",
                    draft.atom.vendor, named
                )
            }
        } else {
            format!(
                "Identified: {} {} ({}, {} terminals).",
                draft.atom.vendor, named, draft.component_type, draft.terminal_count
            )
        };
        info!(photo_id, %summary, "enrichment complete");

        EnrichmentResult {
            atom_id,
            vendor: draft.atom.vendor.clone(),
            product: draft.atom.product.clone(),
            part_number: draft.atom.part_number.clone(),
            component_type: draft.component_type,
            is_new,
            was_updated,
            needs_review: draft.conflict,
            summary,
        }
    }

    /// Stage 1: vision OCR through the routing table's enrichment route
    /// (fixed provider order). A parse failure degrades to an empty
    /// skeleton rather than aborting the pipeline.
    async fn ingest(&self, image: ImagePayload, tag_hint: Option<&str>) -> VisionData {
        let mut prompt = ENRICHMENT_USER_PROMPT.to_string();
        if let Some(hint) = tag_hint {
            if !hint.is_empty() {
                prompt.push_str(&format!("\n\nHINT: The component may be tagged as: {hint}"));
            }
        }

        let req = RouteRequest::new(Intent::KbEnrich, vec![ChatMessage::user(prompt)])
            .system_prompt(ENRICHMENT_SYSTEM_PROMPT)
            .images(vec![image])
            .max_tokens(2048);

        match self.router.route(req).await {
            Ok(resp) => match repair_and_parse(&resp.text) {
                Some(value) => VisionData::from_value(value),
                None => {
                    warn!("vision output unparseable; returning empty skeleton");
                    VisionData::default()
                }
            },
            Err(e) => {
                warn!(err = %e, "vision providers exhausted; returning empty skeleton");
                VisionData::default()
            }
        }
    }

    /// Stage 2: exact part lookup first, then full-text search.
    async fn augment(&self, vision: &VisionData) -> Vec<KbAtom> {
        let Some(kb) = &self.kb else {
            return Vec::new();
        };
        if vision.vendor.is_empty() && vision.part_number.is_empty() {
            return Vec::new();
        }

        if !vision.vendor.is_empty() && !vision.part_number.is_empty() {
            match kb.find_by_part(&vision.vendor, &vision.part_number).await {
                Ok(Some(exact)) => return vec![exact],
                Ok(None) => {}
                Err(e) => warn!(err = %e, "KB exact lookup failed"),
            }
        }

        let terms: Vec<&str> = [
            vision.vendor.as_str(),
            vision.product.as_str(),
            vision.part_number.as_str(),
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        match kb.search(&terms.join(" "), 3).await {
            Ok(atoms) => atoms,
            Err(e) => {
                warn!(err = %e, "KB augment search failed");
                Vec::new()
            }
        }
    }

    /// Stage 4: write the draft back. Failures return `None` so the
    /// enrichment summary still reaches the user.
    async fn upsert(&self, draft: &AtomDraft) -> Option<i64> {
        let Some(kb) = &self.kb else {
            warn!("no KB connector configured; skipping upsert");
            return None;
        };

        if let Some(existing_id) = draft.existing_atom_id {
            let fields = AtomUpdate {
                summary: non_empty(&draft.atom.summary),
                content: non_empty(&draft.atom.content),
                keywords: (!draft.atom.keywords.is_empty()).then(|| draft.atom.keywords.clone()),
                wiring_model: (!draft.atom.wiring_model.is_null())
                    .then(|| draft.atom.wiring_model.clone()),
                manual_refs: (!draft.atom.manual_refs.is_empty())
                    .then(|| draft.atom.manual_refs.clone()),
            };
            let provenance = draft.atom.provenance.first();
            match kb
                .update_atom(existing_id, &fields, provenance, draft.conflict)
                .await
            {
                Ok(true) => {
                    info!(atom_id = existing_id, conflict = draft.conflict, "updated KB atom");
                    Some(existing_id)
                }
                Ok(false) => {
                    warn!(atom_id = existing_id, "KB update rejected");
                    None
                }
                Err(e) => {
                    warn!(err = %e, "KB update failed");
                    None
                }
            }
        } else {
            match kb.insert_atom(&draft.atom).await {
                Ok(id) => {
                    if let Some(id) = id {
                        info!(
                            atom_id = id,
                            vendor = %draft.atom.vendor,
                            product = %draft.atom.product,
                            "created KB atom"
                        );
                    }
                    id
                }
                Err(e) => {
                    warn!(err = %e, "KB insert failed");
                    None
                }
            }
        }
    }
}

/// Stage 3: merge vision data with the best KB candidate into one atom.
///
/// Nameplate fields from vision override KB only when the vision pass
/// reported a confidence; KB terminal layouts win only when vision saw
/// none; conflicting wiring models are never auto-merged — the atom is
/// flagged for review instead.
pub fn synthesize(vision: &VisionData, kb_matches: &[KbAtom], photo_id: &str) -> AtomDraft {
    let vision_confident = vision.confidence > 0.0;

    let mut vendor = vision.vendor.clone();
    let mut product = vision.product.clone();
    let mut part_number = vision.part_number.clone();
    let mut wiring_model = vision.wiring_diagram.clone();
    if wiring_model.as_object().is_some_and(|m| m.is_empty()) {
        wiring_model = Value::Null;
    }

    let mut existing_atom_id = None;
    let mut conflict = false;
    let mut manual_refs: Vec<String> = Vec::new();
    let mut kb_keywords: Vec<String> = Vec::new();

    for kb_rec in kb_matches {
        existing_atom_id = kb_rec.atom_id;

        // nameplate fields: vision wins only when it was confident
        if vendor.is_empty() || (!vision_confident && !kb_rec.vendor.is_empty()) {
            if !kb_rec.vendor.is_empty() {
                vendor = kb_rec.vendor.clone();
            }
        }
        if product.is_empty() || (!vision_confident && !kb_rec.product.is_empty()) {
            if !kb_rec.product.is_empty() {
                product = kb_rec.product.clone();
            }
        }
        if part_number.is_empty() || (!vision_confident && !kb_rec.part_number.is_empty()) {
            if !kb_rec.part_number.is_empty() {
                part_number = kb_rec.part_number.clone();
            }
        }

        // exact-match failures on a shared identity flag review
        if !vision.vendor.is_empty()
            && !kb_rec.vendor.is_empty()
            && !vision.vendor.eq_ignore_ascii_case(&kb_rec.vendor)
        {
            conflict = true;
        }
        if !vision.part_number.is_empty()
            && !kb_rec.part_number.is_empty()
            && !vision
                .part_number
                .eq_ignore_ascii_case(&kb_rec.part_number)
        {
            conflict = true;
        }

        let kb_wiring = &kb_rec.wiring_model;
        if !kb_wiring.is_null() {
            if wiring_model.is_null() {
                // KB terminal layout fills the gap vision left
                wiring_model = kb_wiring.clone();
            } else if *kb_wiring != wiring_model {
                conflict = true;
                info!(vendor = %vendor, part_number = %part_number, "wiring model conflict");
            }
        }

        manual_refs.extend(kb_rec.manual_refs.iter().cloned());
        kb_keywords.extend(kb_rec.keywords.iter().cloned());
    }

    // keyword union, deterministic order
    let keywords: Vec<String> = [
        part_number.as_str(),
        vendor.as_str(),
        vision.component_type.as_str(),
        product.as_str(),
    ]
    .into_iter()
    .map(str::to_string)
    .chain(kb_keywords)
    .filter(|k| !k.is_empty())
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect();

    let manual_refs: Vec<String> = manual_refs
        .into_iter()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let title = if product.is_empty() {
        format!("{vendor} {part_number}").trim().to_string()
    } else {
        format!("{vendor} {product}").trim().to_string()
    };

    let provenance = Provenance {
        source: "photo_enrichment".to_string(),
        photo_id: photo_id.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    let atom = KbAtom {
        atom_type: "spec".to_string(),
        vendor: vendor.clone(),
        product: product.clone(),
        part_number: part_number.clone(),
        title,
        summary: build_summary(&vendor, &product, &part_number, &vision.component_type, &vision.ratings),
        content: build_content(vision, &vendor, &product, &part_number, &wiring_model),
        keywords,
        wiring_model,
        manual_refs,
        provenance: vec![provenance],
        needs_review: conflict,
        ..Default::default()
    };

    AtomDraft {
        existing_atom_id,
        conflict,
        atom,
        component_type: vision.component_type.clone(),
        terminal_count: vision.terminals.len(),
    }
}

/// Human-readable content block from the structured fields.
fn build_content(
    vision: &VisionData,
    vendor: &str,
    product: &str,
    part_number: &str,
    wiring_model: &Value,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !vision.component_type.is_empty() {
        parts.push(format!("Component Type: {}", vision.component_type));
    }
    if !vendor.is_empty() {
        parts.push(format!("Vendor: {vendor}"));
    }
    if !product.is_empty() {
        parts.push(format!("Product: {product}"));
    }
    if !part_number.is_empty() {
        parts.push(format!("Part Number: {part_number}"));
    }

    if !vision.ratings.is_empty() {
        parts.push(String::new());
        parts.push("Ratings:".to_string());
        for (k, v) in &vision.ratings {
            let label = k
                .split('_')
                .map(|w| {
                    let mut chars = w.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            parts.push(format!("  {}: {}", label, v.as_str().unwrap_or(&v.to_string())));
        }
    }

    if !vision.terminals.is_empty() {
        parts.push(String::new());
        parts.push("Terminal Layout:".to_string());
        for (tid, info) in &vision.terminals {
            let label = info
                .get("label")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| info.to_string());
            parts.push(format!("  Terminal {tid}: {label}"));
        }
    }

    if !wiring_model.is_null() {
        parts.push(String::new());
        parts.push("Wiring Model:".to_string());
        parts.push(serde_json::to_string_pretty(wiring_model).unwrap_or_default());
    }

    let mut content = parts.join("\n");
    content.truncate(5000);
    content
}

fn build_summary(
    vendor: &str,
    product: &str,
    part_number: &str,
    component_type: &str,
    ratings: &serde_json::Map<String, Value>,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !vendor.is_empty() {
        parts.push(vendor.to_string());
    }
    if !product.is_empty() {
        parts.push(product.to_string());
    } else if !part_number.is_empty() {
        parts.push(part_number.to_string());
    }
    if !component_type.is_empty() {
        parts.push(format!("({component_type})"));
    }
    for key in ["current", "voltage"] {
        if let Some(v) = ratings.get(key).and_then(Value::as_str) {
            parts.push(v.to_string());
        }
    }
    if parts.is_empty() {
        "Unknown component".to_string()
    } else {
        parts.join(" ")
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
