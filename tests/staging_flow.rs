//! Submission, review, and visibility of staged imports

mod common;

use async_trait::async_trait;
use std::sync::Arc;

use common::*;
use topo_bridge::artifacts::{compute_fingerprint, ArtifactStore, DEFAULT_MAX_FILE_SIZE};
use topo_bridge::auth::DistrictFilter;
use topo_bridge::db::schemas::{ImportStatus, MatchMethod, StagedImportDoc};
use topo_bridge::db::{DecisionRecord, ImportFilter, ImportStatRow, MemoryStore, StagingStore};
use topo_bridge::staging::{ListRequest, ReviewAction, ReviewDecision, StagingLedger};
use topo_bridge::BridgeError;

fn accept() -> ReviewDecision {
    ReviewDecision {
        action: ReviewAction::Accept,
        rejection_reason: None,
    }
}

fn reject(reason: &str) -> ReviewDecision {
    ReviewDecision {
        action: ReviewAction::Reject,
        rejection_reason: Some(reason.to_string()),
    }
}

#[tokio::test]
async fn new_lot_is_staged_as_pending_create() {
    let fx = fixture().await;

    let response = fx
        .ledger
        .submit(&surveyor(None), property(OPEN_CASE, "A12"), vec![])
        .await
        .unwrap();

    assert!(response.success);
    assert!(!response.match_found);
    assert_eq!(response.action_suggested, "create");
    assert_eq!(response.target_district_id, 5);
    assert_eq!(response.warnings, None);

    let stored = fx.store.import_by_id(response.import_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ImportStatus::Pending);
    assert_eq!(stored.topo_user_name, "Rakoto Jean");
    assert_eq!(stored.raw_data["lot"], "A12");
}

#[tokio::test]
async fn existing_lot_turns_create_into_update() {
    let fx = fixture().await;

    let response = fx
        .ledger
        .submit(&surveyor(None), property(CASE_WITH_A12, "A12"), vec![])
        .await
        .unwrap();

    assert!(response.match_found);
    assert_eq!(response.action_suggested, "update");
    assert!(response.has_warnings);

    let details = response.match_details.unwrap();
    assert_eq!(details.matched_entity_id, 40);
    assert_eq!(details.match_confidence, 1.0);
    assert_eq!(details.match_method, "exact_lot");
    assert_eq!(details.matched_entity_details["titre"], "TN 4521");

    let stored = fx.store.import_by_id(response.import_id).await.unwrap().unwrap();
    assert_eq!(stored.match_method, Some(MatchMethod::ExactLot));
}

#[tokio::test]
async fn applicant_matches_by_cin_across_cases() {
    let fx = fixture().await;

    let response = fx
        .ledger
        .submit(&surveyor(None), applicant(OPEN_CASE, "101011000123"), vec![])
        .await
        .unwrap();

    assert_eq!(response.entity_type, "applicant");
    let details = response.match_details.unwrap();
    assert_eq!(details.matched_entity_id, 70);
    assert_eq!(details.match_method, "exact_cin");
}

#[tokio::test]
async fn malformed_cin_warns_but_is_staged() {
    let fx = fixture().await;

    let response = fx
        .ledger
        .submit(&surveyor(None), applicant(OPEN_CASE, "1010-11"), vec![])
        .await
        .unwrap();

    assert!(!response.match_found);
    assert!(response.has_warnings);
}

#[tokio::test]
async fn submission_preconditions() {
    let fx = fixture().await;
    let who = surveyor(None);

    assert!(matches!(
        fx.ledger.submit(&who, property(999, "B1"), vec![]).await,
        Err(BridgeError::NotFound(_))
    ));
    assert!(matches!(
        fx.ledger.submit(&who, property(CLOSED_CASE, "B1"), vec![]).await,
        Err(BridgeError::InvalidState(_))
    ));

    let missing_nature = envelope(serde_json::json!({
        "entity_type": "property",
        "action_suggested": "create",
        "target_dossier_id": OPEN_CASE,
        "entity_data": {"lot": "B1", "nature": "  ", "type_operation": "morcellement"}
    }));
    assert!(matches!(
        fx.ledger.submit(&who, missing_nature, vec![]).await,
        Err(BridgeError::ValidationFailed(_))
    ));

    // Nothing was staged by the failed attempts
    let all = ListRequest {
        status: None,
        ..Default::default()
    };
    assert!(fx.ledger.list(&admin(), all).await.unwrap().is_empty());
}

#[tokio::test]
async fn disallowed_files_become_warnings() {
    let fx = fixture_with(16).await;

    let response = fx
        .ledger
        .submit(
            &surveyor(None),
            property(OPEN_CASE, "C3"),
            vec![
                upload("plan.pdf", b"%PDF-1.4 plan"),
                upload("setup.exe", b"MZ"),
                upload("scan.png", b"a png that is far too large"),
            ],
        )
        .await
        .unwrap();

    assert_eq!(response.files_count, 1);
    assert_eq!(response.files[0].original_name, "plan.pdf");
    assert_eq!(response.files[0].file_extension, "pdf");

    let warnings = response.warnings.unwrap();
    assert!(warnings.iter().any(|w| w.starts_with("setup.exe: ")));
    assert!(warnings.iter().any(|w| w.starts_with("scan.png: ")));
}

#[tokio::test]
async fn stored_file_round_trips_with_fingerprint() {
    let fx = fixture().await;

    let response = fx
        .ledger
        .submit(
            &surveyor(None),
            property(OPEN_CASE, "D4"),
            vec![upload("plan.pdf", b"%PDF-1.4 plan"), upload("plan.pdf", b"%PDF-1.4 plan")],
        )
        .await
        .unwrap();

    assert_eq!(response.files_count, 2);
    assert_ne!(response.files[0].stored_name, response.files[1].stored_name);

    let stored = fx.store.import_by_id(response.import_id).await.unwrap().unwrap();
    let file = &stored.files[0];

    let download = fx
        .ledger
        .file(&reviewer(10, 5), response.import_id, &file.stored_name)
        .await
        .unwrap();
    assert_eq!(download.bytes, b"%PDF-1.4 plan");
    assert_eq!(download.mime_type, "application/pdf");
    assert_eq!(compute_fingerprint(&download.bytes), file.file_hash);

    assert!(matches!(
        fx.ledger.file(&reviewer(11, 7), response.import_id, &file.stored_name).await,
        Err(BridgeError::Forbidden(_))
    ));
    assert!(matches!(
        fx.ledger
            .file(&reviewer(10, 5), response.import_id, "0123456789abcdef0123456789abcdef.pdf")
            .await,
        Err(BridgeError::NotFound(_))
    ));

    // Bytes removed behind the ledger's back
    std::fs::remove_file(&file.storage_path).unwrap();
    assert!(matches!(
        fx.ledger.file(&reviewer(10, 5), response.import_id, &file.stored_name).await,
        Err(BridgeError::NotFound(_))
    ));
}

#[tokio::test]
async fn only_home_district_reviewers_decide() {
    let fx = fixture().await;
    let import_id = fx
        .ledger
        .submit(&surveyor(None), property(OPEN_CASE, "E5"), vec![])
        .await
        .unwrap()
        .import_id;

    for who in [reviewer(11, 7), surveyor(None), admin()] {
        assert!(matches!(
            fx.ledger.decide(&who, import_id, accept()).await,
            Err(BridgeError::Forbidden(_))
        ));
    }

    let decided = fx.ledger.decide(&reviewer(10, 5), import_id, accept()).await.unwrap();
    assert_eq!(decided.status, ImportStatus::Validated);

    let stored = fx.store.import_by_id(import_id).await.unwrap().unwrap();
    assert_eq!(stored.processed_by, Some(10));
    assert!(stored.processed_at.is_some());

    // Terminal states are final
    assert!(matches!(
        fx.ledger.decide(&reviewer(10, 5), import_id, reject("changed my mind")).await,
        Err(BridgeError::InvalidState(_))
    ));
    assert!(matches!(
        fx.ledger.decide(&reviewer(10, 5), 4242, accept()).await,
        Err(BridgeError::NotFound(_))
    ));
}

#[tokio::test]
async fn rejection_needs_a_real_reason() {
    let fx = fixture().await;
    let import_id = fx
        .ledger
        .submit(&surveyor(None), property(OPEN_CASE, "F6"), vec![])
        .await
        .unwrap()
        .import_id;
    let me = reviewer(10, 5);

    for reason in ["", "too short", "   padded    "] {
        assert!(matches!(
            fx.ledger.decide(&me, import_id, reject(reason)).await,
            Err(BridgeError::ValidationFailed(_))
        ));
    }
    assert!(matches!(
        fx.ledger
            .decide(
                &me,
                import_id,
                ReviewDecision {
                    action: ReviewAction::Reject,
                    rejection_reason: None
                }
            )
            .await,
        Err(BridgeError::ValidationFailed(_))
    ));

    let still = fx.store.import_by_id(import_id).await.unwrap().unwrap();
    assert_eq!(still.status, ImportStatus::Pending);

    let decided = fx
        .ledger
        .decide(&me, import_id, reject("Lot already registered"))
        .await
        .unwrap();
    assert_eq!(decided.status, ImportStatus::Rejected);

    let stored = fx.store.import_by_id(import_id).await.unwrap().unwrap();
    assert_eq!(stored.rejection_reason.as_deref(), Some("Lot already registered"));
}

#[tokio::test]
async fn concurrent_decisions_have_one_winner() {
    let fx = fixture().await;
    let import_id = fx
        .ledger
        .submit(&surveyor(None), property(OPEN_CASE, "G7"), vec![])
        .await
        .unwrap()
        .import_id;

    let first = reviewer(10, 5);
    let second = reviewer(12, 5);
    let (a, b) = tokio::join!(
        fx.ledger.decide(&first, import_id, accept()),
        fx.ledger.decide(&second, import_id, reject("Duplicate of an earlier import")),
    );

    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);

    let loser = if a.is_ok() { b.unwrap_err() } else { a.unwrap_err() };
    assert!(matches!(loser, BridgeError::InvalidState(_)));

    let stored = fx.store.import_by_id(import_id).await.unwrap().unwrap();
    assert_ne!(stored.status, ImportStatus::Pending);
}

#[tokio::test]
async fn list_and_stats_are_scoped_to_the_caller() {
    let fx = fixture().await;
    let who = surveyor(None);
    fx.ledger.submit(&who, property(OPEN_CASE, "H1"), vec![]).await.unwrap();
    fx.ledger.submit(&who, property(OPEN_CASE, "H2"), vec![]).await.unwrap();
    let other = fx
        .ledger
        .submit(&who, property(OTHER_DISTRICT_CASE, "H3"), vec![])
        .await
        .unwrap();

    let home = reviewer(10, 5);
    let listed = fx.ledger.list(&home, ListRequest::default()).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|i| i.district_id == 5));
    assert_eq!(listed[0].district_nom.as_deref(), Some("Ambohidratrimo"));
    // Newest first
    assert!(listed[0].id > listed[1].id);

    assert!(matches!(
        fx.ledger
            .list(
                &home,
                ListRequest {
                    district_id: Some(7),
                    ..Default::default()
                }
            )
            .await,
        Err(BridgeError::Forbidden(_))
    ));
    assert!(matches!(
        fx.ledger.detail(&home, other.import_id).await,
        Err(BridgeError::Forbidden(_))
    ));

    let restricted = surveyor(Some("[7]"));
    let seen = fx.ledger.list(&restricted, ListRequest::default()).await.unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].id, other.import_id);

    let unrestricted = surveyor(Some("garbage"));
    assert_eq!(
        fx.ledger.list(&unrestricted, ListRequest::default()).await.unwrap().len(),
        3
    );

    let stats = fx.ledger.stats(&home).await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.by_district.get("5"), Some(&2));
    assert!(stats.by_district.get("7").is_none());

    let global = fx.ledger.stats(&admin()).await.unwrap();
    assert_eq!(global.total, 3);
    assert_eq!(global.by_entity_type.get("property"), Some(&3));
}

#[tokio::test]
async fn list_filters_and_pages() {
    let fx = fixture().await;
    let who = surveyor(None);
    let first = fx.ledger.submit(&who, property(OPEN_CASE, "J1"), vec![]).await.unwrap();
    fx.ledger.submit(&who, applicant(OPEN_CASE, "101011000999"), vec![]).await.unwrap();
    fx.ledger.decide(&reviewer(10, 5), first.import_id, accept()).await.unwrap();

    let pending = fx.ledger.list(&admin(), ListRequest::default()).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].entity_type, "applicant");

    let everything = ListRequest {
        status: None,
        limit: 1,
        offset: 1,
        ..Default::default()
    };
    let page = fx.ledger.list(&admin(), everything).await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].id, first.import_id);
    assert_eq!(page[0].status, ImportStatus::Validated);

    let too_many = ListRequest {
        limit: 201,
        ..Default::default()
    };
    assert!(matches!(
        fx.ledger.list(&admin(), too_many).await,
        Err(BridgeError::ValidationFailed(_))
    ));
}

#[tokio::test]
async fn detail_rereads_the_matched_record() {
    let fx = fixture().await;
    let response = fx
        .ledger
        .submit(&surveyor(None), property(CASE_WITH_A12, "a12"), vec![])
        .await
        .unwrap();

    let detail = fx.ledger.detail(&reviewer(10, 5), response.import_id).await.unwrap();
    assert_eq!(detail.matched_entity_id, Some(40));
    assert_eq!(detail.matched_entity_details.unwrap()["id"], 40);
    assert_eq!(detail.dossier_numero_ouverture, Some(1401));
}

#[tokio::test]
async fn conditional_decision_applies_once() {
    let fx = fixture().await;
    let import_id = fx
        .ledger
        .submit(&surveyor(None), property(OPEN_CASE, "G8"), vec![])
        .await
        .unwrap()
        .import_id;

    let record = |status, processed_by| DecisionRecord {
        status,
        processed_by,
        processed_at: bson::DateTime::now(),
        rejection_reason: None,
    };

    assert!(fx
        .store
        .apply_decision(import_id, &record(ImportStatus::Validated, 10))
        .await
        .unwrap());
    assert!(!fx
        .store
        .apply_decision(import_id, &record(ImportStatus::Rejected, 12))
        .await
        .unwrap());
    assert!(!fx
        .store
        .apply_decision(9999, &record(ImportStatus::Validated, 10))
        .await
        .unwrap());

    let stored = fx.store.import_by_id(import_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ImportStatus::Validated);
    assert_eq!(stored.processed_by, Some(10));
}

/// Staging store where a rival reviewer's decision lands between a reviewer's
/// pending check and their write
struct RivalDecides {
    inner: MemoryStore,
    rival: DecisionRecord,
}

#[async_trait]
impl StagingStore for RivalDecides {
    async fn next_import_id(&self) -> topo_bridge::Result<i64> {
        self.inner.next_import_id().await
    }

    async fn next_file_id(&self) -> topo_bridge::Result<i64> {
        self.inner.next_file_id().await
    }

    async fn insert_import(&self, doc: &StagedImportDoc) -> topo_bridge::Result<()> {
        self.inner.insert_import(doc).await
    }

    async fn import_by_id(&self, id: i64) -> topo_bridge::Result<Option<StagedImportDoc>> {
        self.inner.import_by_id(id).await
    }

    async fn list_imports(
        &self,
        filter: &ImportFilter,
        limit: u64,
        offset: u64,
    ) -> topo_bridge::Result<Vec<StagedImportDoc>> {
        self.inner.list_imports(filter, limit, offset).await
    }

    async fn stat_rows(&self, district: &DistrictFilter) -> topo_bridge::Result<Vec<ImportStatRow>> {
        self.inner.stat_rows(district).await
    }

    async fn apply_decision(&self, id: i64, decision: &DecisionRecord) -> topo_bridge::Result<bool> {
        self.inner.apply_decision(id, &self.rival).await?;
        self.inner.apply_decision(id, decision).await
    }

    async fn healthy(&self) -> bool {
        true
    }
}

#[tokio::test]
async fn decision_losing_the_write_race_is_invalid_state() {
    let uploads = tempfile::TempDir::new().unwrap();
    let store = Arc::new(RivalDecides {
        inner: MemoryStore::new(),
        rival: DecisionRecord {
            status: ImportStatus::Rejected,
            processed_by: 12,
            processed_at: bson::DateTime::now(),
            rejection_reason: Some("Duplicate of an earlier import".into()),
        },
    });
    let ledger = StagingLedger::new(
        registry().await,
        Arc::clone(&store) as Arc<dyn StagingStore>,
        Arc::new(ArtifactStore::new(uploads.path(), DEFAULT_MAX_FILE_SIZE)),
    );

    let import_id = ledger
        .submit(&surveyor(None), property(OPEN_CASE, "G9"), vec![])
        .await
        .unwrap()
        .import_id;

    let err = ledger
        .decide(&reviewer(10, 5), import_id, accept())
        .await
        .unwrap_err();
    match err {
        BridgeError::InvalidState(message) => assert!(message.contains("rejected")),
        other => panic!("expected InvalidState, got {:?}", other),
    }

    let stored = store.import_by_id(import_id).await.unwrap().unwrap();
    assert_eq!(stored.status, ImportStatus::Rejected);
    assert_eq!(stored.processed_by, Some(12));
}

/// Staging store whose inserts always fail
struct FailingInserts(MemoryStore);

#[async_trait]
impl StagingStore for FailingInserts {
    async fn next_import_id(&self) -> topo_bridge::Result<i64> {
        self.0.next_import_id().await
    }

    async fn next_file_id(&self) -> topo_bridge::Result<i64> {
        self.0.next_file_id().await
    }

    async fn insert_import(&self, _doc: &StagedImportDoc) -> topo_bridge::Result<()> {
        Err(BridgeError::Database("write concern timeout".into()))
    }

    async fn import_by_id(&self, id: i64) -> topo_bridge::Result<Option<StagedImportDoc>> {
        self.0.import_by_id(id).await
    }

    async fn list_imports(
        &self,
        filter: &ImportFilter,
        limit: u64,
        offset: u64,
    ) -> topo_bridge::Result<Vec<StagedImportDoc>> {
        self.0.list_imports(filter, limit, offset).await
    }

    async fn stat_rows(&self, district: &DistrictFilter) -> topo_bridge::Result<Vec<ImportStatRow>> {
        self.0.stat_rows(district).await
    }

    async fn apply_decision(&self, id: i64, decision: &DecisionRecord) -> topo_bridge::Result<bool> {
        self.0.apply_decision(id, decision).await
    }

    async fn healthy(&self) -> bool {
        false
    }
}

#[tokio::test]
async fn failed_insert_leaves_no_files_behind() {
    let registry = registry().await;
    let uploads = tempfile::TempDir::new().unwrap();
    let artifacts = Arc::new(ArtifactStore::new(uploads.path(), DEFAULT_MAX_FILE_SIZE));
    let ledger = StagingLedger::new(
        registry,
        Arc::new(FailingInserts(MemoryStore::new())),
        artifacts,
    );

    let err = ledger
        .submit(
            &surveyor(None),
            property(OPEN_CASE, "K1"),
            vec![upload("plan.pdf", b"%PDF-1.4")],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Database(_)));
    assert_eq!(std::fs::read_dir(uploads.path()).unwrap().count(), 0);
}
