//! Registry case (dossier) schema

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for registry cases
pub const CASE_COLLECTION: &str = "dossiers";

/// A registry case grouping properties and applicants under a district
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CaseDoc {
    #[serde(rename = "_id")]
    pub id: i64,

    pub nom_dossier: String,

    /// Opening number, unique across the registry
    pub numero_ouverture: i64,

    #[serde(default)]
    pub commune: Option<String>,

    #[serde(default)]
    pub fokontany: Option<String>,

    pub id_district: i64,

    /// Set when the case is closed; closed cases accept no submissions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_fermeture: Option<DateTime>,
}

impl CaseDoc {
    pub fn is_closed(&self) -> bool {
        self.date_fermeture.is_some()
    }
}

impl IntoIndexes for CaseDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "numero_ouverture": 1 },
                Some(
                    IndexOptions::builder()
                        .name("numero_ouverture_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "id_district": 1, "date_fermeture": 1 },
                Some(
                    IndexOptions::builder()
                        .name("district_closure_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
