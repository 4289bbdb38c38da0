//! Staging of field submissions awaiting registry review

pub mod ledger;
pub mod payload;
pub mod views;

pub use ledger::{FileDownload, ListRequest, ReviewAction, ReviewDecision, StagingLedger};
pub use payload::{EntityPayload, SubmissionEnvelope};
pub use views::{DecisionResponse, ImportStats, StagingItem, SyncResponse};
