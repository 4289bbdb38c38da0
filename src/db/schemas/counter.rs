//! Integer id sequences

use bson::Document;
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for id counters
pub const COUNTER_COLLECTION: &str = "counters";

/// One named sequence; `seq` is the last id handed out
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CounterDoc {
    #[serde(rename = "_id")]
    pub name: String,
    pub seq: i64,
}

impl IntoIndexes for CounterDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        Vec::new()
    }
}
