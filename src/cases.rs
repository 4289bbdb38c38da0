//! Case (dossier) search

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::auth::{DistrictFilter, Principal, TrustDomain};
use crate::db::{CaseQuery, RegistryReader};
use crate::types::{BridgeError, Result};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const MAX_SEARCH_LIMIT: usize = 100;
const MAX_QUERY_CHARS: usize = 100;

/// Query string of `GET /dossiers/search`
#[derive(Debug, Clone, Deserialize)]
pub struct CaseSearchRequest {
    pub q: String,
    #[serde(default)]
    pub district_id: Option<i64>,
    #[serde(default)]
    pub include_closed: bool,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

impl CaseSearchRequest {
    /// Trim `q`, then check bounds
    fn validate(&mut self) -> Result<()> {
        self.q = self.q.trim().to_string();

        let chars = self.q.chars().count();
        if chars == 0 || chars > MAX_QUERY_CHARS {
            return Err(BridgeError::ValidationFailed(format!(
                "q must be between 1 and {} characters",
                MAX_QUERY_CHARS
            )));
        }
        if self.limit == 0 || self.limit > MAX_SEARCH_LIMIT {
            return Err(BridgeError::ValidationFailed(format!(
                "limit must be between 1 and {}",
                MAX_SEARCH_LIMIT
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseSearchResult {
    pub id: i64,
    pub nom_dossier: String,
    pub numero_ouverture: i64,
    pub commune: Option<String>,
    pub fokontany: Option<String>,
    pub district_id: i64,
    pub district_nom: Option<String>,
    pub is_closed: bool,
    pub proprietes_count: u64,
    pub demandeurs_count: u64,
}

pub struct CaseSearch {
    registry: Arc<dyn RegistryReader>,
}

impl CaseSearch {
    pub fn new(registry: Arc<dyn RegistryReader>) -> Self {
        Self { registry }
    }

    pub async fn search(
        &self,
        principal: &Principal,
        mut request: CaseSearchRequest,
    ) -> Result<Vec<CaseSearchResult>> {
        request.validate()?;

        // An allow-list only vetoes an explicitly requested district
        let district = match (principal.domain, request.district_id) {
            (TrustDomain::FieldSystem, None) => DistrictFilter::Any,
            (_, requested) => principal.district_filter(requested)?,
        };

        let query = CaseQuery {
            text: request.q,
            district,
            include_closed: request.include_closed,
            limit: request.limit,
        };

        let cases = self.registry.search_cases(&query).await?;

        let mut results = Vec::with_capacity(cases.len());
        for case in cases {
            let district = self.registry.district_by_id(case.id_district).await?;
            let (proprietes_count, demandeurs_count) = self.registry.case_counts(case.id).await?;
            results.push(CaseSearchResult {
                id: case.id,
                is_closed: case.is_closed(),
                nom_dossier: case.nom_dossier,
                numero_ouverture: case.numero_ouverture,
                commune: case.commune,
                fokontany: case.fokontany,
                district_id: case.id_district,
                district_nom: district.map(|d| d.nom_district),
                proprietes_count,
                demandeurs_count,
            });
        }

        Ok(results)
    }
}
