//! Submission envelope and entity field rules
//!
//! The `data` part of a `/topo-sync/` upload is parsed once here. Entity
//! fields stay an open key/value map; only the fields the bridge reasons
//! about are checked.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::db::schemas::{EntityKind, SuggestedAction};
use crate::types::{BridgeError, Result};

pub const PROPERTY_REQUIRED: &[&str] = &["lot", "nature", "type_operation"];
pub const APPLICANT_REQUIRED: &[&str] = &["cin", "nom_demandeur", "date_naissance", "titre_demandeur"];

const NATURES: &[&str] = &["Urbaine", "Suburbaine", "Rurale"];
const OPERATION_TYPES: &[&str] = &["morcellement", "immatriculation"];
const VOCATIONS: &[&str] = &["Edilitaire", "Agricole", "Forestière", "Touristique"];

/// Length of a national identity card number
pub const CIN_LENGTH: usize = 12;

/// Entity fields as submitted
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct EntityPayload(Map<String, Value>);

impl EntityPayload {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Trimmed text of a field; absent, null, blank and non-text values are `None`
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// A field counts as present unless absent, null, or a blank string
    pub fn has(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}

/// The JSON `data` part of a submission
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionEnvelope {
    pub entity_type: EntityKind,
    pub action_suggested: SuggestedAction,
    pub target_dossier_id: i64,
    pub entity_data: EntityPayload,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

impl SubmissionEnvelope {
    /// Parse and shape-check the `data` field
    pub fn parse(raw: &str) -> Result<Self> {
        let envelope: SubmissionEnvelope = serde_json::from_str(raw)
            .map_err(|e| BridgeError::ValidationFailed(format!("Invalid submission data: {}", e)))?;

        if envelope.target_dossier_id <= 0 {
            return Err(BridgeError::ValidationFailed(
                "target_dossier_id must be a positive integer".to_string(),
            ));
        }

        Ok(envelope)
    }
}

/// Fail on the first missing required field of an entity kind
pub fn check_required(kind: EntityKind, payload: &EntityPayload) -> Result<()> {
    let required = match kind {
        EntityKind::Property => PROPERTY_REQUIRED,
        EntityKind::Applicant => APPLICANT_REQUIRED,
    };

    match required.iter().find(|field| !payload.has(field)) {
        Some(field) => Err(BridgeError::ValidationFailed(format!(
            "Field '{}' is required",
            field
        ))),
        None => Ok(()),
    }
}

/// Non-fatal observations about a payload that passed `check_required`
pub fn advisory_warnings(kind: EntityKind, payload: &EntityPayload) -> Vec<String> {
    let mut warnings = Vec::new();

    match kind {
        EntityKind::Property => {
            if !payload.has("vocation") {
                warnings.push("Vocation missing (recommended)".to_string());
            }
            check_vocabulary(payload, "nature", NATURES, &mut warnings);
            check_vocabulary(payload, "type_operation", OPERATION_TYPES, &mut warnings);
            check_vocabulary(payload, "vocation", VOCATIONS, &mut warnings);
        }
        EntityKind::Applicant => {
            if let Some(cin) = payload.text("cin") {
                if !is_cin(&cin) {
                    warnings.push(format!(
                        "CIN '{}' is not a {}-digit number",
                        cin, CIN_LENGTH
                    ));
                }
            }
        }
    }

    warnings
}

fn check_vocabulary(payload: &EntityPayload, field: &str, allowed: &[&str], warnings: &mut Vec<String>) {
    if let Some(value) = payload.text(field) {
        if !allowed.contains(&value.as_str()) {
            warnings.push(format!(
                "Unexpected {} '{}' (expected one of: {})",
                field,
                value,
                allowed.join(", ")
            ));
        }
    }
}

/// Twelve ASCII digits
pub fn is_cin(value: &str) -> bool {
    value.len() == CIN_LENGTH && value.bytes().all(|b| b.is_ascii_digit())
}
