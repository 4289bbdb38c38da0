//! Database schemas for the bridge
//!
//! Registry documents (cases, districts, properties, applicants, users) are
//! owned by GeODOC and only read here. Staged imports and id counters are
//! written by the bridge.

mod applicant;
mod case;
mod counter;
mod district;
mod field_user;
mod property;
mod registry_user;
mod staged_import;

pub use applicant::{ApplicantDoc, CaseApplicantLink, APPLICANT_COLLECTION, CASE_APPLICANT_COLLECTION};
pub use case::{CaseDoc, CASE_COLLECTION};
pub use counter::{CounterDoc, COUNTER_COLLECTION};
pub use district::{DistrictDoc, DISTRICT_COLLECTION};
pub use field_user::{FieldUserDoc, FIELD_USER_COLLECTION};
pub use property::{PropertyDoc, PROPERTY_COLLECTION};
pub use registry_user::{RegistryUserDoc, REGISTRY_USER_COLLECTION};
pub use staged_import::{
    EntityKind, ImportStatus, MatchMethod, StagedFileDoc, StagedImportDoc, SuggestedAction,
    STAGED_IMPORT_COLLECTION,
};
