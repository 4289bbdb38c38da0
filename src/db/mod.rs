//! Database layer
//!
//! MongoDB documents, the client wrapper, and the persistence seams the core
//! is written against.

pub mod memory;
pub mod mongo;
pub mod mongo_store;
pub mod schemas;
pub mod store;

pub use memory::MemoryStore;
pub use mongo::{redact_uri, IntoIndexes, MongoClient, MongoCollection};
pub use mongo_store::MongoStore;
pub use store::{
    rank_cases, CaseQuery, DecisionRecord, IdentityDirectory, ImportFilter, ImportStatRow,
    RegistryReader, StagingStore,
};
