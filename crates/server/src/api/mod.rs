pub mod cases;
pub mod definitions;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{middleware, routing::get, Router};
use casegate_common::query::{AssemblerConfig, QueryAssembler};
use tracing::info;

use crate::{
    auth::{jwt::JwtAccessTokenService, middleware::require_bearer_auth},
    config::ServerConfig,
    db::{
        migrations::run_migrations,
        pool::{check_pool_health, create_pg_pool, PoolConfig},
    },
    store::CaseStore,
};

#[derive(Clone)]
pub struct ApiState {
    store: CaseStore,
    assembler: Arc<QueryAssembler>,
    unrestricted_role_prefix: Arc<str>,
}

impl ApiState {
    pub fn new(
        store: CaseStore,
        assembler_config: AssemblerConfig,
        unrestricted_role_prefix: &str,
    ) -> Self {
        Self {
            store,
            assembler: Arc::new(QueryAssembler::new(assembler_config)),
            unrestricted_role_prefix: Arc::from(unrestricted_role_prefix),
        }
    }
}

pub async fn build_router_from_env(
    config: &ServerConfig,
    jwt_service: Arc<JwtAccessTokenService>,
) -> Result<Router> {
    let database_url = config
        .database_url
        .as_deref()
        .context("CASEGATE_DATABASE_URL must be set for the case API")?;

    let pool = create_pg_pool(database_url, PoolConfig::from_env())
        .await
        .context("failed to initialize case store pool")?;
    check_pool_health(&pool).await.context("case store health check failed")?;
    run_migrations(&pool).await?;
    info!("case store ready");

    let state = ApiState::new(
        CaseStore::Postgres(pool),
        config.assembler_config(),
        &config.unrestricted_role_prefix,
    );
    Ok(build_router_with_state(state, jwt_service))
}

pub fn build_router_with_state(state: ApiState, jwt_service: Arc<JwtAccessTokenService>) -> Router {
    Router::new()
        .route("/v1/jurisdictions", get(definitions::list_jurisdictions))
        .route("/v1/jurisdictions/{jid}/case-types", get(definitions::list_case_types))
        .route("/v1/jurisdictions/{jid}/case-types/{ctid}/inputs", get(definitions::search_inputs))
        .route(
            "/v1/jurisdictions/{jid}/case-types/{ctid}/work-basket-inputs",
            get(definitions::workbasket_inputs),
        )
        .route("/v1/jurisdictions/{jid}/case-types/{ctid}/cases", get(cases::search_cases))
        .route(
            "/v1/jurisdictions/{jid}/case-types/{ctid}/cases/{reference}",
            get(cases::get_case_view),
        )
        .route_layer(middleware::from_fn_with_state(jwt_service, require_bearer_auth))
        .with_state(state)
}
