//! Shared fixtures: a small registry with two districts

#![allow(dead_code)]

use bytes::Bytes;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

use topo_bridge::artifacts::{ArtifactStore, UploadedFile, DEFAULT_MAX_FILE_SIZE};
use topo_bridge::auth::Principal;
use topo_bridge::db::schemas::{ApplicantDoc, CaseDoc, DistrictDoc, PropertyDoc};
use topo_bridge::db::{MemoryStore, StagingStore};
use topo_bridge::staging::{StagingLedger, SubmissionEnvelope};

pub const OPEN_CASE: i64 = 12;
pub const CLOSED_CASE: i64 = 13;
pub const OTHER_DISTRICT_CASE: i64 = 21;
pub const CASE_WITH_A12: i64 = 14;

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub artifacts: Arc<ArtifactStore>,
    pub ledger: StagingLedger,
    pub uploads: TempDir,
}

pub async fn registry() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());

    for (id, name) in [(5, "Ambohidratrimo"), (7, "Antsirabe I")] {
        store
            .add_district(DistrictDoc {
                id,
                nom_district: name.into(),
                id_region: None,
            })
            .await;
    }

    store.add_case(case(OPEN_CASE, 1201, "Dossier Ivato", 5, false)).await;
    store.add_case(case(CLOSED_CASE, 1301, "Dossier Talatamaty", 5, true)).await;
    store.add_case(case(CASE_WITH_A12, 1401, "Dossier Mahitsy", 5, false)).await;
    store
        .add_case(case(OTHER_DISTRICT_CASE, 2101, "Dossier Vinaninkarena", 7, false))
        .await;

    store
        .add_property(PropertyDoc {
            id: 40,
            lot: " a12 ".into(),
            titre: Some("TN 4521".into()),
            nature: Some("Urbaine".into()),
            id_dossier: CASE_WITH_A12,
            ..Default::default()
        })
        .await;

    store
        .add_applicant(
            ApplicantDoc {
                id: 70,
                cin: "101011000123".into(),
                nom_demandeur: "RASOA".into(),
                prenom_demandeur: Some("Marie".into()),
                ..Default::default()
            },
            &[OTHER_DISTRICT_CASE],
        )
        .await;

    store
}

pub async fn fixture() -> Fixture {
    fixture_with(DEFAULT_MAX_FILE_SIZE).await
}

pub async fn fixture_with(max_file_size: u64) -> Fixture {
    let store = registry().await;
    let uploads = TempDir::new().expect("temp dir");
    let artifacts = Arc::new(ArtifactStore::new(uploads.path(), max_file_size));
    let staging: Arc<dyn StagingStore> = store.clone();
    let ledger = StagingLedger::new(store.clone(), staging, artifacts.clone());

    Fixture {
        store,
        artifacts,
        ledger,
        uploads,
    }
}

fn case(id: i64, numero: i64, nom: &str, district: i64, closed: bool) -> CaseDoc {
    CaseDoc {
        id,
        nom_dossier: nom.into(),
        numero_ouverture: numero,
        commune: Some("Commune".into()),
        id_district: district,
        date_fermeture: closed.then(bson::DateTime::now),
        ..Default::default()
    }
}

pub fn surveyor(allowed: Option<&str>) -> Principal {
    Principal::field(1, "Rakoto Jean".into(), "operator".into(), allowed)
}

pub fn reviewer(id: i64, district: i64) -> Principal {
    Principal::registry(id, format!("Reviewer {}", id), "user".into(), Some(district))
}

pub fn admin() -> Principal {
    Principal::registry(99, "Central".into(), "super_admin".into(), None)
}

pub fn envelope(value: Value) -> SubmissionEnvelope {
    SubmissionEnvelope::parse(&value.to_string()).expect("valid envelope")
}

pub fn property(case_id: i64, lot: &str) -> SubmissionEnvelope {
    envelope(json!({
        "entity_type": "property",
        "action_suggested": "create",
        "target_dossier_id": case_id,
        "entity_data": {
            "lot": lot,
            "nature": "Urbaine",
            "type_operation": "morcellement",
            "vocation": "Edilitaire"
        }
    }))
}

pub fn applicant(case_id: i64, cin: &str) -> SubmissionEnvelope {
    envelope(json!({
        "entity_type": "demandeur",
        "action_suggested": "create",
        "target_dossier_id": case_id,
        "entity_data": {
            "cin": cin,
            "nom_demandeur": "RASOA",
            "date_naissance": "1985-04-12",
            "titre_demandeur": "Madame"
        }
    }))
}

pub fn upload(name: &str, bytes: &'static [u8]) -> UploadedFile {
    UploadedFile {
        original_name: name.into(),
        content_type: Some("application/pdf".into()),
        bytes: Bytes::from_static(bytes),
    }
}
