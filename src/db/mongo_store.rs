//! MongoDB-backed persistence

use async_trait::async_trait;
use bson::{doc, Bson, DateTime, Document};
use futures::TryStreamExt;
use mongodb::options::FindOptions;

use crate::auth::DistrictFilter;
use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{
    ApplicantDoc, CaseApplicantLink, CaseDoc, DistrictDoc, FieldUserDoc, ImportStatus, PropertyDoc,
    RegistryUserDoc, StagedImportDoc, APPLICANT_COLLECTION, CASE_APPLICANT_COLLECTION,
    CASE_COLLECTION, DISTRICT_COLLECTION, FIELD_USER_COLLECTION, PROPERTY_COLLECTION,
    REGISTRY_USER_COLLECTION, STAGED_IMPORT_COLLECTION,
};
use crate::db::store::{
    CaseQuery, DecisionRecord, IdentityDirectory, ImportFilter, ImportStatRow, RegistryReader,
    StagingStore,
};
use crate::types::{BridgeError, Result};

const IMPORT_SEQUENCE: &str = "topo_imports";
const FILE_SEQUENCE: &str = "topo_files";

/// All collections the bridge touches
#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    field_users: MongoCollection<FieldUserDoc>,
    registry_users: MongoCollection<RegistryUserDoc>,
    districts: MongoCollection<DistrictDoc>,
    cases: MongoCollection<CaseDoc>,
    properties: MongoCollection<PropertyDoc>,
    applicants: MongoCollection<ApplicantDoc>,
    case_applicants: MongoCollection<CaseApplicantLink>,
    imports: MongoCollection<StagedImportDoc>,
}

impl MongoStore {
    /// Open every collection and apply schema indexes
    pub async fn open(client: MongoClient) -> Result<Self> {
        Ok(Self {
            field_users: client.collection(FIELD_USER_COLLECTION).await?,
            registry_users: client.collection(REGISTRY_USER_COLLECTION).await?,
            districts: client.collection(DISTRICT_COLLECTION).await?,
            cases: client.collection(CASE_COLLECTION).await?,
            properties: client.collection(PROPERTY_COLLECTION).await?,
            applicants: client.collection(APPLICANT_COLLECTION).await?,
            case_applicants: client.collection(CASE_APPLICANT_COLLECTION).await?,
            imports: client.collection(STAGED_IMPORT_COLLECTION).await?,
            client,
        })
    }
}

/// Restrict `field` of a query to a district filter
fn restrict_district(query: &mut Document, field: &str, filter: &DistrictFilter) {
    match filter {
        DistrictFilter::Any => {}
        DistrictFilter::Only(id) => {
            query.insert(field, *id);
        }
        DistrictFilter::AnyOf(ids) => {
            query.insert(field, doc! { "$in": ids.clone() });
        }
        DistrictFilter::Nothing => {
            query.insert(field, doc! { "$in": [] });
        }
    }
}

/// Escape regex metacharacters so user text matches literally
fn regex_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// District and open/closed scope shared by both case search queries
fn case_scope_filter(query: &CaseQuery) -> Document {
    let mut filter = Document::new();
    restrict_district(&mut filter, "id_district", &query.district);
    if !query.include_closed {
        filter.insert("date_fermeture", Bson::Null);
    }
    filter
}

/// Cases carrying `number` as their opening number
fn case_number_filter(query: &CaseQuery, number: i64) -> Document {
    let mut filter = case_scope_filter(query);
    filter.insert("numero_ouverture", number);
    filter
}

/// Cases whose name or commune contains the query text
fn case_text_filter(query: &CaseQuery) -> Document {
    let pattern = regex_escape(&query.text);
    let mut filter = case_scope_filter(query);
    filter.insert(
        "$or",
        vec![
            doc! { "nom_dossier": { "$regex": &pattern, "$options": "i" } },
            doc! { "commune": { "$regex": &pattern, "$options": "i" } },
        ],
    );
    filter
}

fn import_list_filter(filter: &ImportFilter) -> Document {
    let mut query = Document::new();
    if let Some(status) = filter.status {
        query.insert("status", status.as_str());
    }
    if let Some(kind) = filter.entity_type {
        query.insert("entity_type", kind.as_str());
    }
    restrict_district(&mut query, "target_district_id", &filter.district);
    query
}

#[async_trait]
impl IdentityDirectory for MongoStore {
    async fn field_user_by_username(&self, username: &str) -> Result<Option<FieldUserDoc>> {
        self.field_users.find_one(doc! { "username": username }).await
    }

    async fn registry_user_by_email(&self, email: &str) -> Result<Option<RegistryUserDoc>> {
        self.registry_users.find_one(doc! { "email": email }).await
    }

    async fn touch_token_refresh(&self, user_id: i64, at: DateTime) -> Result<()> {
        self.field_users
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "last_token_refresh": at } },
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RegistryReader for MongoStore {
    async fn case_by_id(&self, id: i64) -> Result<Option<CaseDoc>> {
        self.cases.find_one(doc! { "_id": id }).await
    }

    async fn district_by_id(&self, id: i64) -> Result<Option<DistrictDoc>> {
        self.districts.find_one(doc! { "_id": id }).await
    }

    async fn property_by_lot(&self, case_id: i64, normalized_lot: &str) -> Result<Option<PropertyDoc>> {
        self.properties
            .find_one(doc! {
                "id_dossier": case_id,
                "$expr": {
                    "$eq": [
                        { "$toUpper": { "$trim": { "input": "$lot" } } },
                        normalized_lot
                    ]
                },
            })
            .await
    }

    async fn property_by_id(&self, id: i64) -> Result<Option<PropertyDoc>> {
        self.properties.find_one(doc! { "_id": id }).await
    }

    async fn applicant_by_cin(&self, cin: &str) -> Result<Option<ApplicantDoc>> {
        self.applicants.find_one(doc! { "cin": cin }).await
    }

    async fn applicant_by_id(&self, id: i64) -> Result<Option<ApplicantDoc>> {
        self.applicants.find_one(doc! { "_id": id }).await
    }

    async fn search_cases(&self, query: &CaseQuery) -> Result<Vec<CaseDoc>> {
        let limit = query.limit as i64;

        let mut cases = match query.exact_number() {
            Some(number) => {
                let options = FindOptions::builder().limit(limit).build();
                self.cases
                    .find_many(case_number_filter(query, number), Some(options))
                    .await?
            }
            None => Vec::new(),
        };

        // Exact matches may reappear among the text matches
        let options = FindOptions::builder()
            .sort(doc! { "numero_ouverture": -1 })
            .limit(limit + cases.len() as i64)
            .build();
        let by_text = self
            .cases
            .find_many(case_text_filter(query), Some(options))
            .await?;

        for case in by_text {
            if cases.len() >= query.limit {
                break;
            }
            if !cases.iter().any(|c| c.id == case.id) {
                cases.push(case);
            }
        }

        Ok(cases)
    }

    async fn case_counts(&self, case_id: i64) -> Result<(u64, u64)> {
        let properties = self.properties.count(doc! { "id_dossier": case_id }).await?;

        let applicants = self
            .case_applicants
            .with_type::<Document>()
            .distinct("id_demandeur", doc! { "id_dossier": case_id })
            .await?
            .len() as u64;

        Ok((properties, applicants))
    }
}

#[async_trait]
impl StagingStore for MongoStore {
    async fn next_import_id(&self) -> Result<i64> {
        self.client.next_sequence(IMPORT_SEQUENCE).await
    }

    async fn next_file_id(&self) -> Result<i64> {
        self.client.next_sequence(FILE_SEQUENCE).await
    }

    async fn insert_import(&self, doc: &StagedImportDoc) -> Result<()> {
        self.imports.insert_one(doc).await
    }

    async fn import_by_id(&self, id: i64) -> Result<Option<StagedImportDoc>> {
        self.imports.find_one(doc! { "_id": id }).await
    }

    async fn list_imports(
        &self,
        filter: &ImportFilter,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<StagedImportDoc>> {
        let options = FindOptions::builder()
            .sort(doc! { "import_date": -1, "_id": -1 })
            .skip(offset)
            .limit(limit as i64)
            .build();
        self.imports
            .find_many(import_list_filter(filter), Some(options))
            .await
    }

    async fn stat_rows(&self, district: &DistrictFilter) -> Result<Vec<ImportStatRow>> {
        let mut filter = Document::new();
        restrict_district(&mut filter, "target_district_id", district);
        let options = FindOptions::builder()
            .projection(doc! {
                "status": 1,
                "entity_type": 1,
                "target_district_id": 1,
                "has_warnings": 1,
            })
            .build();

        let cursor = self
            .imports
            .with_type::<ImportStatRow>()
            .find(filter)
            .with_options(options)
            .await?;

        cursor
            .try_collect()
            .await
            .map_err(|e| BridgeError::Database(format!("Cursor failed: {}", e)))
    }

    async fn apply_decision(&self, id: i64, decision: &DecisionRecord) -> Result<bool> {
        let reason = match &decision.rejection_reason {
            Some(reason) => Bson::String(reason.clone()),
            None => Bson::Null,
        };

        let result = self
            .imports
            .update_one(
                doc! { "_id": id, "status": ImportStatus::Pending.as_str() },
                doc! {
                    "$set": {
                        "status": decision.status.as_str(),
                        "processed_at": decision.processed_at,
                        "processed_by": decision.processed_by,
                        "rejection_reason": reason,
                    }
                },
            )
            .await?;

        Ok(result.matched_count == 1)
    }

    async fn healthy(&self) -> bool {
        self.client.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_escape() {
        assert_eq!(regex_escape("A.12"), "A\\.12");
        assert_eq!(regex_escape("(x)*"), "\\(x\\)\\*");
        assert_eq!(regex_escape("Ambohidratrimo"), "Ambohidratrimo");
    }

    fn case_query(text: &str) -> CaseQuery {
        CaseQuery {
            text: text.into(),
            district: DistrictFilter::Only(5),
            include_closed: false,
            limit: 20,
        }
    }

    #[test]
    fn test_case_number_filter() {
        let filter = case_number_filter(&case_query("1042"), 1042);
        assert_eq!(filter.get_i64("numero_ouverture").unwrap(), 1042);
        assert_eq!(filter.get_i64("id_district").unwrap(), 5);
        assert_eq!(filter.get("date_fermeture"), Some(&Bson::Null));
    }

    #[test]
    fn test_case_text_filter() {
        let filter = case_text_filter(&case_query("Ivato"));
        assert_eq!(filter.get_array("$or").unwrap().len(), 2);
        assert!(filter.get("numero_ouverture").is_none());
        assert_eq!(filter.get_i64("id_district").unwrap(), 5);

        let mut closed = case_query("Ivato");
        closed.include_closed = true;
        assert!(case_text_filter(&closed).get("date_fermeture").is_none());
    }

    #[test]
    fn test_import_list_filter() {
        let filter = ImportFilter {
            status: Some(ImportStatus::Pending),
            entity_type: None,
            district: DistrictFilter::AnyOf(vec![1, 2]),
        };
        let query = import_list_filter(&filter);
        assert_eq!(query.get_str("status").unwrap(), "pending");
        assert!(query.get("entity_type").is_none());
        assert!(query.get_document("target_district_id").is_ok());
    }
}
