//! In-memory store
//!
//! Backs every persistence seam without MongoDB. Used by tests and by dev
//! mode when the database is unreachable. Writes take one lock, so the
//! pending check in `apply_decision` is atomic like the Mongo conditional
//! update.

use async_trait::async_trait;
use bson::DateTime;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use crate::auth::DistrictFilter;
use crate::db::schemas::{
    ApplicantDoc, CaseDoc, DistrictDoc, FieldUserDoc, ImportStatus, PropertyDoc, RegistryUserDoc,
    StagedImportDoc,
};
use crate::db::store::{
    rank_cases, CaseQuery, DecisionRecord, IdentityDirectory, ImportFilter, ImportStatRow,
    RegistryReader, StagingStore,
};
use crate::types::{BridgeError, Result};

#[derive(Default)]
struct MemoryState {
    field_users: Vec<FieldUserDoc>,
    registry_users: Vec<RegistryUserDoc>,
    districts: HashMap<i64, DistrictDoc>,
    cases: HashMap<i64, CaseDoc>,
    properties: Vec<PropertyDoc>,
    applicants: Vec<ApplicantDoc>,
    case_applicants: Vec<(i64, i64)>,
    imports: HashMap<i64, StagedImportDoc>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    import_seq: AtomicI64,
    file_seq: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_field_user(&self, user: FieldUserDoc) {
        self.state.write().await.field_users.push(user);
    }

    pub async fn add_registry_user(&self, user: RegistryUserDoc) {
        self.state.write().await.registry_users.push(user);
    }

    pub async fn add_district(&self, district: DistrictDoc) {
        self.state.write().await.districts.insert(district.id, district);
    }

    pub async fn add_case(&self, case: CaseDoc) {
        self.state.write().await.cases.insert(case.id, case);
    }

    pub async fn add_property(&self, property: PropertyDoc) {
        self.state.write().await.properties.push(property);
    }

    /// Add an applicant and link it to the given cases
    pub async fn add_applicant(&self, applicant: ApplicantDoc, case_ids: &[i64]) {
        let mut state = self.state.write().await;
        for case_id in case_ids {
            state.case_applicants.push((*case_id, applicant.id));
        }
        state.applicants.push(applicant);
    }

    /// Field user as currently stored (for asserting on login side effects)
    pub async fn field_user(&self, username: &str) -> Option<FieldUserDoc> {
        self.state
            .read()
            .await
            .field_users
            .iter()
            .find(|u| u.username == username)
            .cloned()
    }
}

#[async_trait]
impl IdentityDirectory for MemoryStore {
    async fn field_user_by_username(&self, username: &str) -> Result<Option<FieldUserDoc>> {
        Ok(self.field_user(username).await)
    }

    async fn registry_user_by_email(&self, email: &str) -> Result<Option<RegistryUserDoc>> {
        Ok(self
            .state
            .read()
            .await
            .registry_users
            .iter()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn touch_token_refresh(&self, user_id: i64, at: DateTime) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(user) = state.field_users.iter_mut().find(|u| u.id == user_id) {
            user.last_token_refresh = Some(at);
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryReader for MemoryStore {
    async fn case_by_id(&self, id: i64) -> Result<Option<CaseDoc>> {
        Ok(self.state.read().await.cases.get(&id).cloned())
    }

    async fn district_by_id(&self, id: i64) -> Result<Option<DistrictDoc>> {
        Ok(self.state.read().await.districts.get(&id).cloned())
    }

    async fn property_by_lot(&self, case_id: i64, normalized_lot: &str) -> Result<Option<PropertyDoc>> {
        Ok(self
            .state
            .read()
            .await
            .properties
            .iter()
            .find(|p| p.id_dossier == case_id && p.normalized_lot() == normalized_lot)
            .cloned())
    }

    async fn property_by_id(&self, id: i64) -> Result<Option<PropertyDoc>> {
        Ok(self
            .state
            .read()
            .await
            .properties
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn applicant_by_cin(&self, cin: &str) -> Result<Option<ApplicantDoc>> {
        Ok(self
            .state
            .read()
            .await
            .applicants
            .iter()
            .find(|a| a.cin == cin)
            .cloned())
    }

    async fn applicant_by_id(&self, id: i64) -> Result<Option<ApplicantDoc>> {
        Ok(self
            .state
            .read()
            .await
            .applicants
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn search_cases(&self, query: &CaseQuery) -> Result<Vec<CaseDoc>> {
        let needle = query.text.to_lowercase();
        let contains = |field: Option<&str>| {
            field.is_some_and(|value| value.to_lowercase().contains(&needle))
        };

        let mut cases: Vec<CaseDoc> = self
            .state
            .read()
            .await
            .cases
            .values()
            .filter(|c| query.district.matches(c.id_district))
            .filter(|c| query.include_closed || !c.is_closed())
            .filter(|c| {
                c.numero_ouverture.to_string() == query.text
                    || contains(Some(&c.nom_dossier))
                    || contains(c.commune.as_deref())
            })
            .cloned()
            .collect();

        rank_cases(&mut cases, &query.text);
        cases.truncate(query.limit);
        Ok(cases)
    }

    async fn case_counts(&self, case_id: i64) -> Result<(u64, u64)> {
        let state = self.state.read().await;
        let properties = state
            .properties
            .iter()
            .filter(|p| p.id_dossier == case_id)
            .count() as u64;
        let applicants = state
            .case_applicants
            .iter()
            .filter(|(case, _)| *case == case_id)
            .map(|(_, applicant)| *applicant)
            .collect::<HashSet<_>>()
            .len() as u64;
        Ok((properties, applicants))
    }
}

#[async_trait]
impl StagingStore for MemoryStore {
    async fn next_import_id(&self) -> Result<i64> {
        Ok(self.import_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn next_file_id(&self) -> Result<i64> {
        Ok(self.file_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn insert_import(&self, doc: &StagedImportDoc) -> Result<()> {
        let mut state = self.state.write().await;
        if state.imports.contains_key(&doc.id) {
            return Err(BridgeError::Database(format!(
                "Duplicate import id {}",
                doc.id
            )));
        }
        state.imports.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn import_by_id(&self, id: i64) -> Result<Option<StagedImportDoc>> {
        Ok(self.state.read().await.imports.get(&id).cloned())
    }

    async fn list_imports(
        &self,
        filter: &ImportFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<StagedImportDoc>> {
        let state = self.state.read().await;
        let mut imports: Vec<&StagedImportDoc> = state
            .imports
            .values()
            .filter(|i| filter.status.map_or(true, |s| i.status == s))
            .filter(|i| filter.entity_type.map_or(true, |k| i.entity_type == k))
            .filter(|i| filter.district.matches(i.target_district_id))
            .collect();

        imports.sort_by(|a, b| b.import_date.cmp(&a.import_date).then(b.id.cmp(&a.id)));

        Ok(imports
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn stat_rows(&self, district: &DistrictFilter) -> Result<Vec<ImportStatRow>> {
        Ok(self
            .state
            .read()
            .await
            .imports
            .values()
            .filter(|i| district.matches(i.target_district_id))
            .map(|i| ImportStatRow {
                status: i.status,
                entity_type: i.entity_type,
                target_district_id: i.target_district_id,
                has_warnings: i.has_warnings,
            })
            .collect())
    }

    async fn apply_decision(&self, id: i64, decision: &DecisionRecord) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.imports.get_mut(&id) {
            Some(import) if import.status == ImportStatus::Pending => {
                import.status = decision.status;
                import.processed_at = Some(decision.processed_at);
                import.processed_by = Some(decision.processed_by);
                import.rejection_reason = decision.rejection_reason.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn healthy(&self) -> bool {
        true
    }
}
