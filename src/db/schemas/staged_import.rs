//! Staged import schema
//!
//! One document per field submission. Uploaded files are embedded so the
//! import and its files land in a single insert.

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::db::mongo::IntoIndexes;

/// Collection name for staged imports
pub const STAGED_IMPORT_COLLECTION: &str = "topo_imports";

/// Kind of entity a submission carries
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[default]
    #[serde(alias = "propriete")]
    Property,
    #[serde(alias = "demandeur")]
    Applicant,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Property => "property",
            EntityKind::Applicant => "applicant",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "property" | "propriete" => Ok(EntityKind::Property),
            "applicant" | "demandeur" => Ok(EntityKind::Applicant),
            other => Err(format!("Unknown entity type: {}", other)),
        }
    }
}

/// What the submitter expects the registry to do with the entity
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SuggestedAction {
    #[default]
    Create,
    Update,
}

impl SuggestedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestedAction::Create => "create",
            SuggestedAction::Update => "update",
        }
    }
}

/// Review state of a staged import
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    #[default]
    Pending,
    Validated,
    Rejected,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Validated => "validated",
            ImportStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ImportStatus::Pending),
            "validated" => Ok(ImportStatus::Validated),
            "rejected" => Ok(ImportStatus::Rejected),
            other => Err(format!("Unknown import status: {}", other)),
        }
    }
}

/// Rule that produced a match
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    ExactLot,
    ExactCin,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::ExactLot => "exact_lot",
            MatchMethod::ExactCin => "exact_cin",
        }
    }
}

/// A stored upload belonging to one staged import
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StagedFileDoc {
    pub id: i64,

    /// Name supplied by the client; display only
    pub original_name: String,

    /// Generated `<uuid>.<ext>` name, globally unique
    pub stored_name: String,

    pub storage_path: String,

    pub mime_type: String,

    pub file_size: i64,

    pub file_extension: String,

    pub category: String,

    /// SHA-256 of the bytes on disk (hex)
    pub file_hash: String,

    pub uploaded_at: DateTime,
}

/// A field submission awaiting (or past) review
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StagedImportDoc {
    #[serde(rename = "_id")]
    pub id: i64,

    /// Fresh UUID per submission event
    pub batch_id: String,

    pub import_date: DateTime,

    pub topo_user_id: i64,

    pub topo_user_name: String,

    pub entity_type: EntityKind,

    pub action_suggested: SuggestedAction,

    pub target_dossier_id: i64,

    /// Copied from the target case at submission time
    pub target_district_id: i64,

    /// Entity fields exactly as submitted
    #[serde(default)]
    pub raw_data: Map<String, Value>,

    #[serde(default)]
    pub has_warnings: bool,

    #[serde(default)]
    pub warnings: Vec<String>,

    #[serde(default)]
    pub matched_entity_id: Option<i64>,

    #[serde(default)]
    pub match_confidence: Option<f64>,

    #[serde(default)]
    pub match_method: Option<MatchMethod>,

    pub status: ImportStatus,

    #[serde(default)]
    pub processed_at: Option<DateTime>,

    #[serde(default)]
    pub processed_by: Option<i64>,

    #[serde(default)]
    pub rejection_reason: Option<String>,

    #[serde(default)]
    pub files: Vec<StagedFileDoc>,
}

impl StagedImportDoc {
    pub fn file_by_stored_name(&self, stored_name: &str) -> Option<&StagedFileDoc> {
        self.files.iter().find(|f| f.stored_name == stored_name)
    }
}

impl IntoIndexes for StagedImportDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "status": 1, "import_date": -1 },
                Some(
                    IndexOptions::builder()
                        .name("status_date_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "target_district_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("district_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "batch_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("batch_index".to_string())
                        .build(),
                ),
            ),
            // Multikey over the embedded files; imports without files stay out
            (
                doc! { "files.stored_name": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .partial_filter_expression(doc! { "files.stored_name": { "$exists": true } })
                        .name("stored_name_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
