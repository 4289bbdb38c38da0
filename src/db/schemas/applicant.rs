//! Registry applicant schema
//!
//! Applicants are case-independent; `contenir` links them to the cases they
//! appear in.

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::mongo::IntoIndexes;

/// Collection name for registry applicants
pub const APPLICANT_COLLECTION: &str = "demandeurs";

/// Collection name for case ↔ applicant links
pub const CASE_APPLICANT_COLLECTION: &str = "contenir";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ApplicantDoc {
    #[serde(rename = "_id")]
    pub id: i64,

    /// National identity card number (12 digits)
    pub cin: String,

    pub nom_demandeur: String,

    #[serde(default)]
    pub prenom_demandeur: Option<String>,

    /// ISO date (YYYY-MM-DD)
    #[serde(default)]
    pub date_naissance: Option<String>,

    #[serde(default)]
    pub titre_demandeur: Option<String>,

    #[serde(default)]
    pub domiciliation: Option<String>,

    #[serde(default)]
    pub telephone: Option<String>,
}

impl ApplicantDoc {
    /// Display fields shown to reviewers next to a match
    pub fn snapshot(&self) -> Value {
        json!({
            "id": self.id,
            "cin": self.cin,
            "nom_demandeur": self.nom_demandeur,
            "prenom_demandeur": self.prenom_demandeur,
            "date_naissance": self.date_naissance,
            "titre_demandeur": self.titre_demandeur,
            "domiciliation": self.domiciliation,
            "telephone": self.telephone,
        })
    }
}

impl IntoIndexes for ApplicantDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "cin": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("cin_unique".to_string())
                    .build(),
            ),
        )]
    }
}

/// Membership of an applicant in a case
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CaseApplicantLink {
    pub id_dossier: i64,
    pub id_demandeur: i64,
}

impl IntoIndexes for CaseApplicantLink {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "id_dossier": 1, "id_demandeur": 1 },
            Some(
                IndexOptions::builder()
                    .name("dossier_demandeur_index".to_string())
                    .build(),
            ),
        )]
    }
}
