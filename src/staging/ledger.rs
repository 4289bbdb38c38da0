//! Staging ledger
//!
//! Owns the life of a staged import:
//!
//! ```text
//! submit ──▶ pending ──accept──▶ validated
//!                    └─reject──▶ rejected
//! ```
//!
//! Both transitions happen once and are final. The pending check and the
//! status write are a single conditional update in the store, so two
//! concurrent reviewers cannot both win.

use bson::DateTime;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::artifacts::{ArtifactStore, UploadedFile, DEFAULT_CATEGORY};
use crate::auth::Principal;
use crate::db::schemas::{
    EntityKind, ImportStatus, StagedFileDoc, StagedImportDoc, SuggestedAction,
};
use crate::db::{DecisionRecord, ImportFilter, RegistryReader, StagingStore};
use crate::matcher::EntityMatcher;
use crate::staging::payload::{advisory_warnings, check_required, SubmissionEnvelope};
use crate::staging::views::{DecisionResponse, ImportStats, StagingItem, SyncResponse};
use crate::types::{BridgeError, Result};

/// Minimum length of a rejection reason, in characters after trimming
pub const MIN_REJECTION_REASON: usize = 10;

pub const DEFAULT_LIST_LIMIT: u64 = 50;
pub const MAX_LIST_LIMIT: u64 = 200;

/// Reviewer verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Accept,
    Reject,
}

/// Body of `PUT /staging/{id}/validate`
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewDecision {
    pub action: ReviewAction,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

/// Staged import listing request
#[derive(Debug, Clone)]
pub struct ListRequest {
    pub status: Option<ImportStatus>,
    pub entity_type: Option<EntityKind>,
    pub district_id: Option<i64>,
    pub limit: u64,
    pub offset: u64,
}

impl Default for ListRequest {
    fn default() -> Self {
        Self {
            status: Some(ImportStatus::Pending),
            entity_type: None,
            district_id: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

/// Bytes and metadata of a stored file ready to send
#[derive(Debug)]
pub struct FileDownload {
    pub stored_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

pub struct StagingLedger {
    registry: Arc<dyn RegistryReader>,
    store: Arc<dyn StagingStore>,
    matcher: EntityMatcher,
    artifacts: Arc<ArtifactStore>,
}

impl StagingLedger {
    pub fn new(
        registry: Arc<dyn RegistryReader>,
        store: Arc<dyn StagingStore>,
        artifacts: Arc<ArtifactStore>,
    ) -> Self {
        Self {
            matcher: EntityMatcher::new(registry.clone()),
            registry,
            store,
            artifacts,
        }
    }

    /// Record a field submission as a pending import
    pub async fn submit(
        &self,
        principal: &Principal,
        envelope: SubmissionEnvelope,
        attachments: Vec<UploadedFile>,
    ) -> Result<SyncResponse> {
        let case_id = envelope.target_dossier_id;

        let case = self
            .registry
            .case_by_id(case_id)
            .await?
            .ok_or_else(|| BridgeError::NotFound(format!("Case {} not found", case_id)))?;

        if case.is_closed() {
            return Err(BridgeError::InvalidState(
                "Cannot import into a closed case".to_string(),
            ));
        }

        let kind = envelope.entity_type;
        check_required(kind, &envelope.entity_data)?;

        let mut warnings = advisory_warnings(kind, &envelope.entity_data);
        let mut action = envelope.action_suggested;

        let outcome = self
            .matcher
            .find_match(kind, &envelope.entity_data, case_id)
            .await?;
        if let Some(found) = &outcome {
            warnings.push(found.warning.clone());
            if action == SuggestedAction::Create {
                action = SuggestedAction::Update;
            }
        }

        let import_id = self.store.next_import_id().await?;

        let files = match self.store_attachments(import_id, &attachments, &mut warnings).await {
            Ok(files) => files,
            Err(e) => {
                self.roll_back(import_id).await;
                return Err(e);
            }
        };

        let import = StagedImportDoc {
            id: import_id,
            batch_id: Uuid::new_v4().to_string(),
            import_date: DateTime::now(),
            topo_user_id: principal.id,
            topo_user_name: principal.display_name.clone(),
            entity_type: kind,
            action_suggested: action,
            target_dossier_id: case_id,
            target_district_id: case.id_district,
            raw_data: envelope.entity_data.into_fields(),
            has_warnings: !warnings.is_empty(),
            warnings,
            matched_entity_id: outcome.as_ref().map(|m| m.entity_id),
            match_confidence: outcome.as_ref().map(|m| m.confidence),
            match_method: outcome.as_ref().map(|m| m.method),
            status: ImportStatus::Pending,
            processed_at: None,
            processed_by: None,
            rejection_reason: None,
            files,
        };

        if let Err(e) = self.store.insert_import(&import).await {
            self.roll_back(import_id).await;
            return Err(e);
        }

        info!(
            import_id,
            batch_id = %import.batch_id,
            entity_type = %kind,
            case_id,
            district = import.target_district_id,
            matched = outcome.is_some(),
            files = import.files.len(),
            warnings = import.warnings.len(),
            submitted_by = %principal.display_name,
            "Staged import created"
        );

        Ok(SyncResponse::new(&import, outcome.as_ref()))
    }

    /// Store each attachment; per-file policy failures become warnings
    async fn store_attachments(
        &self,
        import_id: i64,
        attachments: &[UploadedFile],
        warnings: &mut Vec<String>,
    ) -> Result<Vec<StagedFileDoc>> {
        let mut files = Vec::with_capacity(attachments.len());

        for upload in attachments {
            let validation = ArtifactStore::validate(upload);
            if !validation.ok {
                warnings.extend(
                    validation
                        .errors
                        .iter()
                        .map(|e| format!("{}: {}", upload.original_name, e)),
                );
                continue;
            }

            let stored = match self.artifacts.store(upload, import_id).await {
                Ok(stored) => stored,
                Err(e @ (BridgeError::TooLarge(_) | BridgeError::UnsupportedType(_))) => {
                    warnings.push(format!("{}: {}", upload.original_name, e.public_message()));
                    continue;
                }
                Err(e) => return Err(e),
            };

            files.push(StagedFileDoc {
                id: self.store.next_file_id().await?,
                original_name: upload.original_name.clone(),
                stored_name: stored.stored_name,
                storage_path: stored.path.to_string_lossy().into_owned(),
                mime_type: validation.info.mime_type,
                file_size: stored.size as i64,
                file_extension: validation.info.extension,
                category: DEFAULT_CATEGORY.to_string(),
                file_hash: stored.fingerprint,
                uploaded_at: DateTime::now(),
            });
        }

        Ok(files)
    }

    async fn roll_back(&self, import_id: i64) {
        if let Err(e) = self.artifacts.discard_import(import_id).await {
            error!(import_id, error = %e, "Failed to remove files of aborted submission");
        } else {
            warn!(import_id, "Submission aborted, stored files removed");
        }
    }

    /// Accept or reject a pending import
    pub async fn decide(
        &self,
        principal: &Principal,
        import_id: i64,
        decision: ReviewDecision,
    ) -> Result<DecisionResponse> {
        principal.ensure_reviewer()?;

        let import = self.load(import_id).await?;

        if principal.home_district() != Some(import.target_district_id) {
            return Err(BridgeError::Forbidden(
                "You can only review imports of your own district".to_string(),
            ));
        }

        if import.status != ImportStatus::Pending {
            return Err(already_processed(import.status));
        }

        let (status, rejection_reason) = match decision.action {
            ReviewAction::Accept => (ImportStatus::Validated, None),
            ReviewAction::Reject => {
                let reason = decision
                    .rejection_reason
                    .filter(|r| r.trim().chars().count() >= MIN_REJECTION_REASON)
                    .ok_or_else(|| {
                        BridgeError::ValidationFailed(format!(
                            "Rejection reason required (at least {} characters)",
                            MIN_REJECTION_REASON
                        ))
                    })?;
                (ImportStatus::Rejected, Some(reason))
            }
        };

        let record = DecisionRecord {
            status,
            processed_by: principal.id,
            processed_at: DateTime::now(),
            rejection_reason,
        };

        if !self.store.apply_decision(import_id, &record).await? {
            // Another reviewer got there first
            let current = self
                .store
                .import_by_id(import_id)
                .await?
                .map(|i| i.status)
                .unwrap_or(status);
            return Err(already_processed(current));
        }

        info!(
            import_id,
            status = %status,
            reviewer = principal.id,
            district = import.target_district_id,
            "Import reviewed"
        );

        let verb = match decision.action {
            ReviewAction::Accept => "accepted",
            ReviewAction::Reject => "rejected",
        };

        Ok(DecisionResponse {
            success: true,
            message: format!("Import {}", verb),
            import_id,
            status,
        })
    }

    /// Imports visible to the caller, newest first
    pub async fn list(&self, principal: &Principal, request: ListRequest) -> Result<Vec<StagingItem>> {
        if request.limit == 0 || request.limit > MAX_LIST_LIMIT {
            return Err(BridgeError::ValidationFailed(format!(
                "limit must be between 1 and {}",
                MAX_LIST_LIMIT
            )));
        }

        let filter = ImportFilter {
            status: request.status,
            entity_type: request.entity_type,
            district: principal.district_filter(request.district_id)?,
        };

        let imports = self
            .store
            .list_imports(&filter, request.limit, request.offset)
            .await?;

        let mut items = Vec::with_capacity(imports.len());
        for import in &imports {
            items.push(self.item_view(import).await?);
        }
        Ok(items)
    }

    /// Full detail of one import
    pub async fn detail(&self, principal: &Principal, import_id: i64) -> Result<StagingItem> {
        let import = self.load(import_id).await?;
        ensure_visible(principal, &import)?;
        self.item_view(&import).await
    }

    /// Counts over the imports the caller may list
    pub async fn stats(&self, principal: &Principal) -> Result<ImportStats> {
        let district = principal.district_filter(None)?;
        let rows = self.store.stat_rows(&district).await?;
        Ok(ImportStats::from_rows(&rows))
    }

    /// Bytes of a file attached to an import
    pub async fn file(&self, principal: &Principal, import_id: i64, stored_name: &str) -> Result<FileDownload> {
        let import = self.load(import_id).await?;

        let file = import
            .file_by_stored_name(stored_name)
            .ok_or_else(|| BridgeError::NotFound("File not found".to_string()))?;

        ensure_visible(principal, &import)?;

        let bytes = self.artifacts.read(import_id, &file.stored_name).await?;

        Ok(FileDownload {
            stored_name: file.stored_name.clone(),
            mime_type: file.mime_type.clone(),
            bytes,
        })
    }

    async fn load(&self, import_id: i64) -> Result<StagedImportDoc> {
        self.store
            .import_by_id(import_id)
            .await?
            .ok_or_else(|| BridgeError::NotFound(format!("Import {} not found", import_id)))
    }

    async fn item_view(&self, import: &StagedImportDoc) -> Result<StagingItem> {
        let case = self.registry.case_by_id(import.target_dossier_id).await?;
        let district = self.registry.district_by_id(import.target_district_id).await?;
        let snapshot = self.current_snapshot(import).await?;
        Ok(StagingItem::new(import, case.as_ref(), district.as_ref(), snapshot))
    }

    /// Matched record as it reads now; `None` if it has since disappeared
    async fn current_snapshot(&self, import: &StagedImportDoc) -> Result<Option<serde_json::Value>> {
        let Some(id) = import.matched_entity_id else {
            return Ok(None);
        };

        Ok(match import.entity_type {
            EntityKind::Property => self.registry.property_by_id(id).await?.map(|p| p.snapshot()),
            EntityKind::Applicant => self.registry.applicant_by_id(id).await?.map(|a| a.snapshot()),
        })
    }
}

fn ensure_visible(principal: &Principal, import: &StagedImportDoc) -> Result<()> {
    if principal.can_view_district(import.target_district_id) {
        Ok(())
    } else {
        Err(BridgeError::Forbidden("Access denied".to_string()))
    }
}

fn already_processed(status: ImportStatus) -> BridgeError {
    BridgeError::InvalidState(format!("Import already processed (status: {})", status))
}
