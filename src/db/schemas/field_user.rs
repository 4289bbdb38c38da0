//! TopoManager (field system) user schema

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for field-system users
pub const FIELD_USER_COLLECTION: &str = "topo_users";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct FieldUserDoc {
    #[serde(rename = "_id")]
    pub id: i64,

    pub username: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub full_name: Option<String>,

    /// bcrypt (or PHC) hash
    pub password_hash: String,

    #[serde(default = "default_role")]
    pub role: String,

    #[serde(default = "default_true")]
    pub is_active: bool,

    /// District allow-list as stored by TopoManager: JSON text, possibly malformed
    #[serde(default)]
    pub allowed_districts: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_token_refresh: Option<DateTime>,
}

fn default_role() -> String {
    "operator".to_string()
}

fn default_true() -> bool {
    true
}

impl FieldUserDoc {
    /// Name recorded on imports this user submits
    pub fn display_name(&self) -> String {
        self.full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.username)
            .to_string()
    }
}

impl IntoIndexes for FieldUserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "username": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("username_unique".to_string())
                    .build(),
            ),
        )]
    }
}
