//! District schema

use bson::Document;
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for districts
pub const DISTRICT_COLLECTION: &str = "districts";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DistrictDoc {
    #[serde(rename = "_id")]
    pub id: i64,

    pub nom_district: String,

    #[serde(default)]
    pub id_region: Option<i64>,
}

impl IntoIndexes for DistrictDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        Vec::new()
    }
}
