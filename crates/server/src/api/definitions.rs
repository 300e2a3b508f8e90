// Access-filtered definition endpoints: jurisdictions and case types for a
// requested capability, and the search and workbasket input layouts.

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use casegate_common::{
    acl::Capability,
    catalog::{
        authorised_inputs, case_types_with_access, jurisdictions_with_access, parse_access,
        CaseTypeSummary, InputKind, JurisdictionSummary, SearchInput,
    },
    error::AccessDeniedError,
};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{cases::load_case_type, ApiState};
use crate::{
    auth::middleware::AuthenticatedUser,
    error::{ErrorCode, ServiceError},
};

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    access: Option<String>,
}

impl AccessQuery {
    fn capability(&self) -> Option<Capability> {
        self.access.as_deref().and_then(parse_access)
    }
}

pub async fn list_jurisdictions(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(query): Query<AccessQuery>,
) -> Result<Json<Vec<JurisdictionSummary>>, ServiceError> {
    let access = query.capability().ok_or_else(|| {
        ServiceError::new(
            ErrorCode::ValidationFailed,
            "access can only be 'create', 'read' or 'update'",
        )
        .with_details(serde_json::json!({ "param": "access" }))
    })?;

    let case_types = state.store.case_types(None).await.map_err(ServiceError::internal)?;
    let jurisdictions = jurisdictions_with_access(&case_types, &user.roles, access);
    if jurisdictions.is_empty() {
        debug!(user_id = %user.user_id, access = access.as_str(), "no jurisdictions granted");
        return Err(ServiceError::new(ErrorCode::NotFound, "no jurisdictions found"));
    }
    Ok(Json(jurisdictions))
}

/// An unrecognised `access` value finds nothing rather than failing
/// validation.
pub async fn list_case_types(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(jurisdiction): Path<String>,
    Query(query): Query<AccessQuery>,
) -> Result<Json<Vec<CaseTypeSummary>>, ServiceError> {
    let access = query
        .capability()
        .ok_or_else(|| ServiceError::new(ErrorCode::NotFound, "no case types found"))?;

    let case_types =
        state.store.case_types(Some(&jurisdiction)).await.map_err(ServiceError::internal)?;
    Ok(Json(case_types_with_access(&case_types, &user.roles, access)))
}

pub async fn search_inputs(
    state: State<ApiState>,
    user: Extension<AuthenticatedUser>,
    path: Path<(String, String)>,
) -> Result<Json<Vec<SearchInput>>, ServiceError> {
    inputs(state, user, path, InputKind::Search).await
}

pub async fn workbasket_inputs(
    state: State<ApiState>,
    user: Extension<AuthenticatedUser>,
    path: Path<(String, String)>,
) -> Result<Json<Vec<SearchInput>>, ServiceError> {
    inputs(state, user, path, InputKind::Workbasket).await
}

async fn inputs(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((jurisdiction, case_type_id)): Path<(String, String)>,
    kind: InputKind,
) -> Result<Json<Vec<SearchInput>>, ServiceError> {
    let case_type = load_case_type(&state, &jurisdiction, &case_type_id).await?;
    if !case_type.allows(&user.roles, Capability::Read) {
        warn!(user_id = %user.user_id, case_type = %case_type.id, ?kind, "input layout denied");
        return Err(AccessDeniedError::new(case_type.id.clone()).into());
    }
    Ok(Json(authorised_inputs(&case_type, &user.roles, kind)))
}
