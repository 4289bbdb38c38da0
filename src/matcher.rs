//! Entity matcher
//!
//! Looks for an existing registry record that a submission most likely
//! duplicates. Exact keys only:
//!
//! - property: trimmed, upper-cased `lot`, within the target case
//! - applicant: 12-digit `cin`, across the whole registry
//!
//! A match is advisory. It is surfaced to reviewers and never blocks a
//! submission.

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::db::schemas::{EntityKind, MatchMethod};
use crate::db::RegistryReader;
use crate::staging::payload::{is_cin, EntityPayload};
use crate::types::Result;

/// Confidence reported for exact-key matches
pub const EXACT_CONFIDENCE: f64 = 1.0;

/// A detected likely duplicate
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub entity_type: EntityKind,
    pub entity_id: i64,
    pub confidence: f64,
    pub method: MatchMethod,
    /// Display fields of the matched record
    pub snapshot: Value,
    /// Warning to attach to the submission
    pub warning: String,
}

pub struct EntityMatcher {
    registry: Arc<dyn RegistryReader>,
}

impl EntityMatcher {
    pub fn new(registry: Arc<dyn RegistryReader>) -> Self {
        Self { registry }
    }

    pub async fn find_match(
        &self,
        kind: EntityKind,
        payload: &EntityPayload,
        case_id: i64,
    ) -> Result<Option<MatchOutcome>> {
        match kind {
            EntityKind::Property => self.match_property(payload, case_id).await,
            EntityKind::Applicant => self.match_applicant(payload).await,
        }
    }

    async fn match_property(&self, payload: &EntityPayload, case_id: i64) -> Result<Option<MatchOutcome>> {
        let Some(lot) = payload.text("lot").map(|l| l.to_uppercase()) else {
            return Ok(None);
        };

        let Some(property) = self.registry.property_by_lot(case_id, &lot).await? else {
            return Ok(None);
        };

        debug!(case_id, property_id = property.id, lot = %lot, "Lot matches existing property");

        Ok(Some(MatchOutcome {
            entity_type: EntityKind::Property,
            entity_id: property.id,
            confidence: EXACT_CONFIDENCE,
            method: MatchMethod::ExactLot,
            snapshot: property.snapshot(),
            warning: format!("Existing property detected (lot {})", property.lot.trim()),
        }))
    }

    async fn match_applicant(&self, payload: &EntityPayload) -> Result<Option<MatchOutcome>> {
        let Some(cin) = payload.text("cin").filter(|c| is_cin(c)) else {
            return Ok(None);
        };

        let Some(applicant) = self.registry.applicant_by_cin(&cin).await? else {
            return Ok(None);
        };

        debug!(applicant_id = applicant.id, "CIN matches existing applicant");

        Ok(Some(MatchOutcome {
            entity_type: EntityKind::Applicant,
            entity_id: applicant.id,
            confidence: EXACT_CONFIDENCE,
            method: MatchMethod::ExactCin,
            snapshot: applicant.snapshot(),
            warning: format!("Existing applicant detected (CIN: {})", cin),
        }))
    }
}
