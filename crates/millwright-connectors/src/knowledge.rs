//! Knowledge-base connector — full-text and fault-code search over the
//! atom store, plus the insert/update surface the enrichment pipeline
//! writes through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::connector::{ConnectorError, ServiceConnector};

/// One unit of knowledge in the KB.
///
/// The service owns the `atom_type` vocabulary (`spec`, `fault`, `pattern`,
/// `concept`, `procedure`, `checklist`, `troubleshooting`, `fault_code`),
/// so it stays a string here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KbAtom {
    #[serde(default)]
    pub atom_id: Option<i64>,
    #[serde(default)]
    pub atom_type: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub part_number: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub content: String,
    /// Fault/error code this atom documents, when any.
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub causes: Vec<String>,
    #[serde(default)]
    pub fixes: Vec<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Structured wiring representation (nested map). Null when absent.
    #[serde(default)]
    pub wiring_model: Value,
    #[serde(default)]
    pub manual_refs: Vec<String>,
    #[serde(default)]
    pub provenance: Vec<Provenance>,
    #[serde(default)]
    pub needs_review: bool,
    /// Canonical URL for this atom, when the KB exposes one.
    #[serde(default)]
    pub link: String,
    /// Relevance score from full-text search; absent on exact lookups.
    #[serde(default)]
    pub score: Option<f64>,
}

impl KbAtom {
    /// The citation string for this atom: link when present, else title.
    pub fn source(&self) -> &str {
        if self.link.is_empty() {
            &self.title
        } else {
            &self.link
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub photo_id: String,
    pub timestamp: String,
}

/// Partial update for an existing atom; `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AtomUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wiring_model: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_refs: Option<Vec<String>>,
}

/// Read/write surface of the knowledge base.
#[async_trait]
pub trait KnowledgeStore: ServiceConnector {
    /// Full-text search ranked by relevance.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KbAtom>, ConnectorError>;

    async fn search_by_fault_code(
        &self,
        code: &str,
        limit: usize,
    ) -> Result<Vec<KbAtom>, ConnectorError>;

    async fn search_by_symptoms(
        &self,
        symptom: &str,
        limit: usize,
    ) -> Result<Vec<KbAtom>, ConnectorError>;

    async fn get_by_type(
        &self,
        atom_type: &str,
        limit: usize,
    ) -> Result<Vec<KbAtom>, ConnectorError>;

    /// Exact vendor + part-number lookup for the enrichment pipeline.
    async fn find_by_part(
        &self,
        vendor: &str,
        part_number: &str,
    ) -> Result<Option<KbAtom>, ConnectorError>;

    /// Returns the new atom id.
    async fn insert_atom(&self, atom: &KbAtom) -> Result<Option<i64>, ConnectorError>;

    async fn update_atom(
        &self,
        atom_id: i64,
        fields: &AtomUpdate,
        provenance: Option<&Provenance>,
        conflict: bool,
    ) -> Result<bool, ConnectorError>;
}

/// HTTP client for the KB service.
pub struct KnowledgeConnector {
    client: reqwest::Client,
    base_url: String,
}

impl KnowledgeConnector {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client"),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_atoms(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<KbAtom>, ConnectorError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).query(query).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ConnectorError::Api {
                connector: "knowledge",
                status,
                message,
            });
        }
        resp.json::<Vec<KbAtom>>()
            .await
            .map_err(|e| ConnectorError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ServiceConnector for KnowledgeConnector {
    fn name(&self) -> &'static str {
        "knowledge"
    }

    async fn connect(&self) -> Result<(), ConnectorError> {
        info!(url = %self.base_url, "knowledge connector targeting KB service");
        Ok(())
    }

    async fn health_check(&self) -> Value {
        let url = format!("{}/api/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let atoms = resp
                    .json::<Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("atoms").cloned());
                match atoms {
                    Some(count) => json!({"status": "healthy", "atoms": count}),
                    None => json!({"status": "healthy"}),
                }
            }
            Ok(resp) => json!({"status": "unhealthy", "code": resp.status().as_u16()}),
            Err(e) => json!({"status": "unhealthy", "error": e.to_string()}),
        }
    }
}

#[async_trait]
impl KnowledgeStore for KnowledgeConnector {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<KbAtom>, ConnectorError> {
        let preview: String = query.chars().take(80).collect();
        debug!(query = %preview, "KB full-text search");
        self.get_atoms(
            "/api/atoms/search",
            &[("q", query.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn search_by_fault_code(
        &self,
        code: &str,
        limit: usize,
    ) -> Result<Vec<KbAtom>, ConnectorError> {
        self.get_atoms(
            &format!("/api/atoms/fault-code/{code}"),
            &[("limit", limit.to_string())],
        )
        .await
    }

    async fn search_by_symptoms(
        &self,
        symptom: &str,
        limit: usize,
    ) -> Result<Vec<KbAtom>, ConnectorError> {
        self.get_atoms(
            "/api/atoms/symptoms",
            &[("q", symptom.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn get_by_type(
        &self,
        atom_type: &str,
        limit: usize,
    ) -> Result<Vec<KbAtom>, ConnectorError> {
        self.get_atoms(
            &format!("/api/atoms/type/{atom_type}"),
            &[("limit", limit.to_string())],
        )
        .await
    }

    async fn find_by_part(
        &self,
        vendor: &str,
        part_number: &str,
    ) -> Result<Option<KbAtom>, ConnectorError> {
        let atoms = self
            .get_atoms(
                "/api/atoms/part",
                &[
                    ("vendor", vendor.to_string()),
                    ("part_number", part_number.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(atoms.into_iter().next())
    }

    async fn insert_atom(&self, atom: &KbAtom) -> Result<Option<i64>, ConnectorError> {
        let url = format!("{}/api/atoms", self.base_url);
        let resp = self.client.post(&url).json(atom).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(status, "KB insert failed: {}", message);
            return Err(ConnectorError::Api {
                connector: "knowledge",
                status,
                message,
            });
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| ConnectorError::Parse(e.to_string()))?;
        Ok(body.get("atom_id").and_then(Value::as_i64))
    }

    async fn update_atom(
        &self,
        atom_id: i64,
        fields: &AtomUpdate,
        provenance: Option<&Provenance>,
        conflict: bool,
    ) -> Result<bool, ConnectorError> {
        let url = format!("{}/api/atoms/{atom_id}", self.base_url);
        let body = json!({
            "fields": fields,
            "provenance": provenance,
            "needs_review": conflict,
        });
        let resp = self.client.patch(&url).json(&body).send().await?;
        Ok(resp.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_prefers_link_over_title() {
        let mut atom = KbAtom {
            title: "E-Stop Reset Procedure".into(),
            ..Default::default()
        };
        assert_eq!(atom.source(), "E-Stop Reset Procedure");
        atom.link = "https://kb.example/atoms/17".into();
        assert_eq!(atom.source(), "https://kb.example/atoms/17");
    }

    #[test]
    fn atoms_deserialize_with_missing_fields() {
        let atom: KbAtom = serde_json::from_value(json!({
            "atom_id": 17,
            "atom_type": "procedure",
            "title": "E-Stop Reset",
            "steps": ["Verify area is safe", "Twist-release the E-stop"],
            "score": 0.93,
        }))
        .unwrap();
        assert_eq!(atom.atom_id, Some(17));
        assert_eq!(atom.steps.len(), 2);
        assert!(atom.fixes.is_empty());
        assert!(atom.wiring_model.is_null());
        assert_eq!(atom.score, Some(0.93));
    }

    #[test]
    fn atom_update_skips_unset_fields() {
        let update = AtomUpdate {
            summary: Some("new summary".into()),
            ..Default::default()
        };
        let v = serde_json::to_value(&update).unwrap();
        assert_eq!(v, json!({"summary": "new summary"}));
    }
}
