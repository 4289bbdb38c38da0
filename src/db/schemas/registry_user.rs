//! GeODOC (registry system) user schema

use bson::{doc, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for registry-system users
pub const REGISTRY_USER_COLLECTION: &str = "users";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RegistryUserDoc {
    #[serde(rename = "_id")]
    pub id: i64,

    pub name: String,

    pub email: String,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_role")]
    pub role: String,

    /// Home district; elevated roles may have none
    #[serde(default)]
    pub id_district: Option<i64>,

    /// Account enabled flag
    #[serde(default = "default_true")]
    pub status: bool,
}

fn default_role() -> String {
    "user".to_string()
}

fn default_true() -> bool {
    true
}

impl IntoIndexes for RegistryUserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "email": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("email_unique".to_string())
                    .build(),
            ),
        )]
    }
}
