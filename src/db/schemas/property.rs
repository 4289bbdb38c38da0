//! Registry property schema

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::mongo::IntoIndexes;

/// Collection name for registry properties
pub const PROPERTY_COLLECTION: &str = "proprietes";

/// A registry property, always attached to one case
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PropertyDoc {
    #[serde(rename = "_id")]
    pub id: i64,

    /// Parcel lot as typed by registry staff (may carry stray spaces or case)
    pub lot: String,

    #[serde(default)]
    pub titre: Option<String>,

    #[serde(default)]
    pub proprietaire: Option<String>,

    /// Area in square metres
    #[serde(default)]
    pub contenance: Option<i64>,

    #[serde(default)]
    pub nature: Option<String>,

    #[serde(default)]
    pub vocation: Option<String>,

    #[serde(default)]
    pub type_operation: Option<String>,

    pub id_dossier: i64,
}

impl PropertyDoc {
    /// Lot in the form used for matching
    pub fn normalized_lot(&self) -> String {
        self.lot.trim().to_uppercase()
    }

    /// Display fields shown to reviewers next to a match
    pub fn snapshot(&self) -> Value {
        json!({
            "id": self.id,
            "lot": self.lot,
            "titre": self.titre,
            "proprietaire": self.proprietaire,
            "contenance": self.contenance,
            "nature": self.nature,
            "vocation": self.vocation,
            "type_operation": self.type_operation,
        })
    }
}

impl IntoIndexes for PropertyDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "id_dossier": 1, "lot": 1 },
            Some(
                IndexOptions::builder()
                    .name("dossier_lot_index".to_string())
                    .build(),
            ),
        )]
    }
}
