//! Public JSON shapes for staged imports

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::db::schemas::{CaseDoc, DistrictDoc, ImportStatus, StagedFileDoc, StagedImportDoc};
use crate::db::ImportStatRow;
use crate::matcher::MatchOutcome;

/// File entry in a submission response
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub id: i64,
    pub original_name: String,
    pub stored_name: String,
    pub file_size: i64,
    pub category: String,
    pub file_extension: String,
    pub mime_type: String,
}

impl From<&StagedFileDoc> for FileSummary {
    fn from(file: &StagedFileDoc) -> Self {
        Self {
            id: file.id,
            original_name: file.original_name.clone(),
            stored_name: file.stored_name.clone(),
            file_size: file.file_size,
            category: file.category.clone(),
            file_extension: file.file_extension.clone(),
            mime_type: file.mime_type.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchDetails {
    pub matched_entity_type: String,
    pub matched_entity_id: i64,
    pub match_confidence: f64,
    pub match_method: String,
    pub matched_entity_details: Value,
}

impl From<&MatchOutcome> for MatchDetails {
    fn from(outcome: &MatchOutcome) -> Self {
        Self {
            matched_entity_type: outcome.entity_type.as_str().to_string(),
            matched_entity_id: outcome.entity_id,
            match_confidence: outcome.confidence,
            match_method: outcome.method.as_str().to_string(),
            matched_entity_details: outcome.snapshot.clone(),
        }
    }
}

/// Body of a successful `/topo-sync/` submission
#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    pub import_id: i64,
    pub batch_id: String,
    pub entity_type: String,
    pub action_suggested: String,
    pub target_dossier_id: i64,
    pub target_district_id: i64,
    pub has_warnings: bool,
    pub warnings: Option<Vec<String>>,
    pub match_found: bool,
    pub match_details: Option<MatchDetails>,
    pub files_count: usize,
    pub files: Vec<FileSummary>,
    pub import_date: DateTime<Utc>,
}

impl SyncResponse {
    pub fn new(import: &StagedImportDoc, outcome: Option<&MatchOutcome>) -> Self {
        let files: Vec<FileSummary> = import.files.iter().map(FileSummary::from).collect();
        Self {
            success: true,
            message: "Import created".to_string(),
            import_id: import.id,
            batch_id: import.batch_id.clone(),
            entity_type: import.entity_type.as_str().to_string(),
            action_suggested: import.action_suggested.as_str().to_string(),
            target_dossier_id: import.target_dossier_id,
            target_district_id: import.target_district_id,
            has_warnings: import.has_warnings,
            warnings: non_empty(&import.warnings),
            match_found: outcome.is_some(),
            match_details: outcome.map(MatchDetails::from),
            files_count: files.len(),
            files,
            import_date: import.import_date.to_chrono(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StagingFileView {
    pub name: String,
    pub stored_name: String,
    pub size: i64,
    pub extension: String,
    pub category: String,
    pub mime_type: String,
}

impl From<&StagedFileDoc> for StagingFileView {
    fn from(file: &StagedFileDoc) -> Self {
        Self {
            name: file.original_name.clone(),
            stored_name: file.stored_name.clone(),
            size: file.file_size,
            extension: file.file_extension.clone(),
            category: file.category.clone(),
            mime_type: file.mime_type.clone(),
        }
    }
}

/// One staged import as shown to reviewers (list items and detail)
#[derive(Debug, Clone, Serialize)]
pub struct StagingItem {
    pub id: i64,
    pub batch_id: String,
    pub entity_type: String,
    pub action_suggested: String,
    pub dossier_id: i64,
    pub dossier_nom: Option<String>,
    pub dossier_numero_ouverture: Option<i64>,
    pub district_id: i64,
    pub district_nom: Option<String>,
    pub raw_data: Map<String, Value>,
    pub matched_entity_id: Option<i64>,
    pub matched_entity_details: Option<Value>,
    pub match_confidence: Option<f64>,
    pub match_method: Option<String>,
    pub has_warnings: bool,
    pub warnings: Option<Vec<String>>,
    pub files_count: usize,
    pub files: Vec<StagingFileView>,
    pub topo_user_name: String,
    pub import_date: DateTime<Utc>,
    pub status: ImportStatus,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<i64>,
    pub rejection_reason: Option<String>,
}

impl StagingItem {
    /// Assemble the view; `snapshot` is the matched record as it reads now
    pub fn new(
        import: &StagedImportDoc,
        case: Option<&CaseDoc>,
        district: Option<&DistrictDoc>,
        snapshot: Option<Value>,
    ) -> Self {
        let mut files: Vec<StagingFileView> = import.files.iter().map(StagingFileView::from).collect();
        files.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.name.cmp(&b.name)));

        Self {
            id: import.id,
            batch_id: import.batch_id.clone(),
            entity_type: import.entity_type.as_str().to_string(),
            action_suggested: import.action_suggested.as_str().to_string(),
            dossier_id: import.target_dossier_id,
            dossier_nom: case.map(|c| c.nom_dossier.clone()),
            dossier_numero_ouverture: case.map(|c| c.numero_ouverture),
            district_id: import.target_district_id,
            district_nom: district.map(|d| d.nom_district.clone()),
            raw_data: import.raw_data.clone(),
            matched_entity_id: import.matched_entity_id,
            matched_entity_details: snapshot,
            match_confidence: import.match_confidence,
            match_method: import.match_method.map(|m| m.as_str().to_string()),
            has_warnings: import.has_warnings,
            warnings: non_empty(&import.warnings),
            files_count: files.len(),
            files,
            topo_user_name: import.topo_user_name.clone(),
            import_date: import.import_date.to_chrono(),
            status: import.status,
            processed_at: import.processed_at.map(|t| t.to_chrono()),
            processed_by: import.processed_by,
            rejection_reason: import.rejection_reason.clone(),
        }
    }
}

/// Aggregate counts over the imports a caller may see
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ImportStats {
    pub total: u64,
    pub pending: u64,
    pub validated: u64,
    pub rejected: u64,
    pub with_warnings: u64,
    pub by_entity_type: BTreeMap<String, u64>,
    pub by_district: BTreeMap<String, u64>,
}

impl ImportStats {
    pub fn from_rows(rows: &[ImportStatRow]) -> Self {
        let mut stats = ImportStats::default();
        for row in rows {
            stats.total += 1;
            match row.status {
                ImportStatus::Pending => stats.pending += 1,
                ImportStatus::Validated => stats.validated += 1,
                ImportStatus::Rejected => stats.rejected += 1,
            }
            if row.has_warnings {
                stats.with_warnings += 1;
            }
            *stats
                .by_entity_type
                .entry(row.entity_type.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_district
                .entry(row.target_district_id.to_string())
                .or_default() += 1;
        }
        stats
    }
}

/// Body of a successful review decision
#[derive(Debug, Clone, Serialize)]
pub struct DecisionResponse {
    pub success: bool,
    pub message: String,
    pub import_id: i64,
    pub status: ImportStatus,
}

fn non_empty(warnings: &[String]) -> Option<Vec<String>> {
    if warnings.is_empty() {
        None
    } else {
        Some(warnings.to_vec())
    }
}
