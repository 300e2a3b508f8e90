// Case search and case view endpoints.
//
// Both handlers resolve the case type first, so an unknown jurisdiction or
// case type is a 404 before any access decision is made.

use std::collections::BTreeMap;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use casegate_common::{
    acl::{Capability, RoleSet},
    definition::CaseType,
    error::AccessDeniedError,
    query::{CallerScope, DefinitionCriterionFactory},
    types::{is_valid_case_reference, AccessLevel, CaseRecord, SearchMetadata, SortDirection},
    view::{filter_case_view_with_data, materialize_case_view, readable_case_data, CaseView},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::ApiState;
use crate::{
    auth::middleware::AuthenticatedUser,
    error::{ErrorCode, ServiceError},
};

/// Prefix marking a query parameter as a case field filter.
const CASE_FIELD_PREFIX: &str = "case.";

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub total: i64,
    pub page: Option<u32>,
    pub cases: Vec<CaseSummary>,
}

#[derive(Debug, Serialize)]
pub struct CaseSummary {
    pub case_reference: String,
    pub jurisdiction: String,
    pub case_type_id: String,
    pub state: String,
    pub security_classification: String,
    pub created_date: DateTime<Utc>,
    pub last_modified: Option<DateTime<Utc>>,
    pub case_fields: Map<String, Value>,
}

impl CaseSummary {
    fn project(record: CaseRecord, case_type: &CaseType, roles: &RoleSet) -> Self {
        Self {
            case_fields: readable_case_data(&record.data, case_type, roles),
            case_reference: record.reference.to_string(),
            jurisdiction: record.jurisdiction,
            case_type_id: record.case_type_id,
            state: record.state,
            security_classification: record.security_classification,
            created_date: record.created_date,
            last_modified: record.last_modified,
        }
    }
}

pub async fn search_cases(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((jurisdiction, case_type_id)): Path<(String, String)>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<Json<SearchResponse>, ServiceError> {
    let (metadata, filters) = parse_search_params(&jurisdiction, &case_type_id, params)?;
    let case_type = load_case_type(&state, &jurisdiction, &case_type_id).await?;

    if !case_type.allows(&user.roles, Capability::Read) {
        warn!(user_id = %user.user_id, case_type = %case_type.id, "case search denied");
        return Err(AccessDeniedError::new(case_type.id.clone()).into());
    }

    let caller = CallerScope {
        access_level: user.access_level(&state.unrestricted_role_prefix),
        user_id: user.user_id.clone(),
        authorized_states: case_type.authorized_states(&user.roles, Capability::Read),
    };
    let factory = DefinitionCriterionFactory::new(&case_type, &user.roles)
        .with_like_escaped_scope(state.assembler.config().wildcard_search);
    let statements = state.assembler.assemble_pair(&factory, &metadata, &filters, &caller)?;

    debug!(
        sql = %statements.rows.sql,
        parameters = statements.rows.parameters.len(),
        access_level = ?caller.access_level,
        "assembled case search"
    );

    let records = state.store.search(&statements.rows).await.map_err(ServiceError::internal)?;
    let total = state.store.count(&statements.count).await.map_err(ServiceError::internal)?;

    Ok(Json(SearchResponse {
        total,
        page: metadata.page,
        cases: records
            .into_iter()
            .map(|record| CaseSummary::project(record, &case_type, &user.roles))
            .collect(),
    }))
}

pub async fn get_case_view(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path((jurisdiction, case_type_id, reference)): Path<(String, String, String)>,
) -> Result<Json<CaseView>, ServiceError> {
    if !is_valid_case_reference(&reference) {
        return Err(ServiceError::new(
            ErrorCode::ValidationFailed,
            format!("case reference '{reference}' is not valid"),
        ));
    }
    let reference_number: i64 = reference.parse().map_err(|_| {
        ServiceError::new(ErrorCode::ValidationFailed, "case reference is out of range")
    })?;

    let case_type = load_case_type(&state, &jurisdiction, &case_type_id).await?;
    let record = state
        .store
        .case_by_reference(&jurisdiction, &case_type_id, reference_number)
        .await
        .map_err(ServiceError::internal)?
        .ok_or_else(case_not_found)?;

    let case_roles =
        state.store.case_roles(record.id, &user.user_id).await.map_err(ServiceError::internal)?;
    if case_roles.is_empty()
        && user.access_level(&state.unrestricted_role_prefix) == AccessLevel::Restricted
    {
        debug!(user_id = %user.user_id, reference = %reference, "caller not associated with case");
        return Err(case_not_found());
    }

    let mut roles = user.roles.clone();
    roles.extend(case_roles);

    let view = materialize_case_view(&record, &case_type);
    let view = filter_case_view_with_data(view, &record.data, &case_type, &roles)
        .map_err(|denied| {
            warn!(user_id = %user.user_id, case_type = %case_type.id, "case view denied");
            ServiceError::from(denied)
        })?;

    Ok(Json(view))
}

pub(super) async fn load_case_type(
    state: &ApiState,
    jurisdiction: &str,
    case_type_id: &str,
) -> Result<CaseType, ServiceError> {
    state
        .store
        .case_type(jurisdiction, case_type_id)
        .await
        .map_err(ServiceError::internal)?
        .ok_or_else(|| ServiceError::new(ErrorCode::NotFound, "case type not found"))
}

fn case_not_found() -> ServiceError {
    ServiceError::new(ErrorCode::NotFound, "case not found")
}

/// Splits query parameters into search metadata and the case field filter
/// map. Parameters that are neither, and blank values, are ignored.
fn parse_search_params(
    jurisdiction: &str,
    case_type_id: &str,
    params: BTreeMap<String, String>,
) -> Result<(SearchMetadata, BTreeMap<String, String>), ServiceError> {
    let mut metadata = SearchMetadata::new(jurisdiction, case_type_id);
    let mut filters = BTreeMap::new();

    for (key, value) in params {
        if let Some(field) = key.strip_prefix(CASE_FIELD_PREFIX) {
            if !value.trim().is_empty() {
                filters.insert(field.to_owned(), value);
            }
            continue;
        }

        let value = Some(value).filter(|value| !value.trim().is_empty());
        match key.as_str() {
            "state" => metadata.state = value,
            "case_reference" => metadata.case_reference = value,
            "created_date" => metadata.created_date = value,
            "last_modified_date" => metadata.last_modified_date = value,
            "security_classification" => metadata.security_classification = value,
            "sort_field" => metadata.sort_field = value,
            "page" => {
                metadata.page = value
                    .map(|raw| {
                        raw.trim().parse::<u32>().map_err(|_| {
                            invalid_param("page", "page must be a positive integer")
                        })
                    })
                    .transpose()?;
            }
            "sortDirection" => {
                metadata.sort_direction = value
                    .map(|raw| {
                        SortDirection::parse(&raw).ok_or_else(|| {
                            invalid_param("sortDirection", "sortDirection must be ASC or DESC")
                        })
                    })
                    .transpose()?;
            }
            _ => {}
        }
    }

    Ok((metadata, filters))
}

fn invalid_param(param: &str, message: &str) -> ServiceError {
    ServiceError::new(ErrorCode::ValidationFailed, message)
        .with_details(serde_json::json!({ "param": param }))
}
