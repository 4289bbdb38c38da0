//! Resolved caller identity
//!
//! A `Principal` is rebuilt from the bearer token on every request. Its
//! `DistrictAccess` decides which districts the caller may read and whether
//! it may review staged imports.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::types::BridgeError;

/// Registry roles with country-wide read access; they never review imports
pub const ELEVATED_ROLES: &[&str] = &["super_admin", "central_user"];

/// The two independent identity domains sharing this API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrustDomain {
    /// TopoManager field collectors
    #[serde(rename = "topomanager")]
    FieldSystem,
    /// GeODOC registry staff
    #[serde(rename = "geodoc")]
    RegistrySystem,
}

impl fmt::Display for TrustDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustDomain::FieldSystem => write!(f, "field-system"),
            TrustDomain::RegistrySystem => write!(f, "registry-system"),
        }
    }
}

/// District reach of a principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistrictAccess {
    /// Field-system allow-list; an empty list places no restriction
    AllowList(Vec<i64>),
    /// Registry-system user bound to one home district
    Home(Option<i64>),
    /// Elevated registry role
    Global,
}

/// District restriction to apply to a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistrictFilter {
    Any,
    Only(i64),
    AnyOf(Vec<i64>),
    /// Matches nothing (registry user without a home district)
    Nothing,
}

impl DistrictFilter {
    pub fn matches(&self, district_id: i64) -> bool {
        match self {
            DistrictFilter::Any => true,
            DistrictFilter::Only(id) => *id == district_id,
            DistrictFilter::AnyOf(ids) => ids.contains(&district_id),
            DistrictFilter::Nothing => false,
        }
    }
}

/// Normalized identity of an authenticated caller
#[derive(Debug, Clone)]
pub struct Principal {
    pub domain: TrustDomain,
    pub id: i64,
    /// Name recorded on imports this principal submits
    pub display_name: String,
    pub role: String,
    pub access: DistrictAccess,
}

impl Principal {
    /// Build a field-system principal from its raw allow-list column
    pub fn field(id: i64, display_name: String, role: String, allowed_districts: Option<&str>) -> Self {
        let allowed = parse_allowed_districts(allowed_districts).unwrap_or_default();
        Self {
            domain: TrustDomain::FieldSystem,
            id,
            display_name,
            role,
            access: DistrictAccess::AllowList(allowed),
        }
    }

    /// Build a registry-system principal
    pub fn registry(id: i64, display_name: String, role: String, home_district: Option<i64>) -> Self {
        let access = if is_elevated_role(&role) {
            DistrictAccess::Global
        } else {
            DistrictAccess::Home(home_district)
        };
        Self {
            domain: TrustDomain::RegistrySystem,
            id,
            display_name,
            role,
            access,
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self.access, DistrictAccess::Global)
    }

    /// Home district of a non-elevated registry principal
    pub fn home_district(&self) -> Option<i64> {
        match self.access {
            DistrictAccess::Home(home) => home,
            _ => None,
        }
    }

    /// Turn a caller-requested district filter into the filter to apply
    pub fn district_filter(&self, requested: Option<i64>) -> Result<DistrictFilter, BridgeError> {
        match (&self.access, requested) {
            (DistrictAccess::Global, Some(id)) => Ok(DistrictFilter::Only(id)),
            (DistrictAccess::Global, None) => Ok(DistrictFilter::Any),

            (DistrictAccess::AllowList(allowed), Some(id)) => {
                if allowed.is_empty() || allowed.contains(&id) {
                    Ok(DistrictFilter::Only(id))
                } else {
                    Err(BridgeError::Forbidden(format!(
                        "Access denied to district {}",
                        id
                    )))
                }
            }
            (DistrictAccess::AllowList(allowed), None) => {
                if allowed.is_empty() {
                    Ok(DistrictFilter::Any)
                } else {
                    Ok(DistrictFilter::AnyOf(allowed.clone()))
                }
            }

            (DistrictAccess::Home(home), Some(id)) => {
                if *home == Some(id) {
                    Ok(DistrictFilter::Only(id))
                } else {
                    Err(BridgeError::Forbidden(
                        "Access denied to this district".to_string(),
                    ))
                }
            }
            (DistrictAccess::Home(Some(home)), None) => Ok(DistrictFilter::Only(*home)),
            (DistrictAccess::Home(None), None) => Ok(DistrictFilter::Nothing),
        }
    }

    /// Whether this principal may read records of a district
    pub fn can_view_district(&self, district_id: i64) -> bool {
        match &self.access {
            DistrictAccess::Global => true,
            DistrictAccess::AllowList(allowed) => allowed.is_empty() || allowed.contains(&district_id),
            DistrictAccess::Home(home) => *home == Some(district_id),
        }
    }

    /// Reviewer authority: non-elevated registry staff only
    pub fn ensure_reviewer(&self) -> Result<(), BridgeError> {
        if self.domain != TrustDomain::RegistrySystem {
            return Err(BridgeError::Forbidden(
                "Only GeODOC users can validate imports".to_string(),
            ));
        }
        if self.is_elevated() {
            return Err(BridgeError::Forbidden(
                "super_admin/central_user accounts cannot validate imports".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn is_elevated_role(role: &str) -> bool {
    ELEVATED_ROLES.contains(&role)
}

/// Parse the field system's stored allow-list
///
/// Absent or blank → `None`. Anything that is not a JSON array of district ids
/// degrades to an empty list; numeric strings are accepted.
pub fn parse_allowed_districts(raw: Option<&str>) -> Option<Vec<i64>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    let items = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        _ => return Some(Vec::new()),
    };

    let ids = items
        .iter()
        .filter_map(|item| match item {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .collect();

    Some(ids)
}
