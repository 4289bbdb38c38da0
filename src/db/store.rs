//! Persistence seams
//!
//! The core talks to storage only through these traits. `MongoStore` backs
//! them in production; `MemoryStore` backs tests and dev mode.

use async_trait::async_trait;
use bson::DateTime;

use crate::auth::DistrictFilter;
use crate::db::schemas::{
    ApplicantDoc, CaseDoc, DistrictDoc, EntityKind, FieldUserDoc, ImportStatus, PropertyDoc,
    RegistryUserDoc, StagedImportDoc,
};
use crate::types::Result;

/// User lookups for both trust domains
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Field-system user by username, active or not
    async fn field_user_by_username(&self, username: &str) -> Result<Option<FieldUserDoc>>;

    /// Registry-system user by email, enabled or not
    async fn registry_user_by_email(&self, email: &str) -> Result<Option<RegistryUserDoc>>;

    /// Record a fresh login on a field-system user
    async fn touch_token_refresh(&self, user_id: i64, at: DateTime) -> Result<()>;
}

/// Case search criteria
#[derive(Debug, Clone)]
pub struct CaseQuery {
    /// Opening number (exact) or name/commune fragment (case-insensitive)
    pub text: String,
    pub district: DistrictFilter,
    pub include_closed: bool,
    /// Maximum number of cases returned
    pub limit: usize,
}

impl CaseQuery {
    /// Opening number `text` denotes, if it is one written canonically
    pub fn exact_number(&self) -> Option<i64> {
        self.text
            .parse::<i64>()
            .ok()
            .filter(|number| number.to_string() == self.text)
    }
}

/// Exact opening-number match first, then opening number descending
pub fn rank_cases(cases: &mut [CaseDoc], q: &str) {
    cases.sort_by(|a, b| {
        let a_exact = a.numero_ouverture.to_string() == q;
        let b_exact = b.numero_ouverture.to_string() == q;
        b_exact
            .cmp(&a_exact)
            .then_with(|| b.numero_ouverture.cmp(&a.numero_ouverture))
    });
}

/// Read-only access to registry records
#[async_trait]
pub trait RegistryReader: Send + Sync {
    async fn case_by_id(&self, id: i64) -> Result<Option<CaseDoc>>;

    async fn district_by_id(&self, id: i64) -> Result<Option<DistrictDoc>>;

    /// Property in `case_id` whose trimmed, upper-cased lot equals `normalized_lot`
    async fn property_by_lot(&self, case_id: i64, normalized_lot: &str) -> Result<Option<PropertyDoc>>;

    async fn property_by_id(&self, id: i64) -> Result<Option<PropertyDoc>>;

    /// Applicant with exactly this national id, in any case
    async fn applicant_by_cin(&self, cin: &str) -> Result<Option<ApplicantDoc>>;

    async fn applicant_by_id(&self, id: i64) -> Result<Option<ApplicantDoc>>;

    /// Matching cases, at most `query.limit` of them, in `rank_cases` order
    async fn search_cases(&self, query: &CaseQuery) -> Result<Vec<CaseDoc>>;

    /// (property count, distinct applicant count) of a case
    async fn case_counts(&self, case_id: i64) -> Result<(u64, u64)>;
}

/// Staged import listing criteria
#[derive(Debug, Clone)]
pub struct ImportFilter {
    /// `None` lists every status
    pub status: Option<ImportStatus>,
    pub entity_type: Option<EntityKind>,
    pub district: DistrictFilter,
}

/// Fields of an import that aggregate counts need
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ImportStatRow {
    pub status: ImportStatus,
    pub entity_type: EntityKind,
    pub target_district_id: i64,
    #[serde(default)]
    pub has_warnings: bool,
}

/// Terminal state written by a review decision
#[derive(Debug, Clone)]
pub struct DecisionRecord {
    pub status: ImportStatus,
    pub processed_by: i64,
    pub processed_at: DateTime,
    pub rejection_reason: Option<String>,
}

/// Staged import persistence
#[async_trait]
pub trait StagingStore: Send + Sync {
    async fn next_import_id(&self) -> Result<i64>;

    async fn next_file_id(&self) -> Result<i64>;

    /// Insert an import together with its embedded files
    async fn insert_import(&self, doc: &StagedImportDoc) -> Result<()>;

    async fn import_by_id(&self, id: i64) -> Result<Option<StagedImportDoc>>;

    /// Newest first
    async fn list_imports(
        &self,
        filter: &ImportFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<StagedImportDoc>>;

    async fn stat_rows(&self, district: &DistrictFilter) -> Result<Vec<ImportStatRow>>;

    /// Move a pending import to a terminal state
    ///
    /// Returns `false` when the import was no longer pending; the check and the
    /// write are one atomic step.
    async fn apply_decision(&self, id: i64, decision: &DecisionRecord) -> Result<bool>;

    /// Whether the backing database answers
    async fn healthy(&self) -> bool;
}
