//! HTTP surface over the command layer.

use std::{path::Path, sync::Arc};

use axum::{
    http::{header::AUTHORIZATION, HeaderMap},
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::{
    commands::{self, DomainLogic},
    ports::{
        blob_store::BlobStorePort,
        database::DatabasePort,
        identity::{IdentityPort, Principal, Role},
    },
};

pub mod dto;
pub mod errors;
pub mod routes;

use errors::ApiError;

pub struct AppState<D, B> {
    pub logic: DomainLogic<D, B>,
    pub identity: Arc<dyn IdentityPort>,
}

impl<D, B> Clone for AppState<D, B> {
    fn clone(&self) -> Self {
        Self {
            logic: self.logic.clone(),
            identity: self.identity.clone(),
        }
    }
}

pub fn router<D, B>(state: AppState<D, B>) -> Router
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    use routes::{members, products};

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/member",
            get(members::find_member::<D, B>)
                .post(members::create_member::<D, B>)
                .put(members::update_member::<D, B>)
                .delete(members::delete_member::<D, B>),
        )
        .route("/api/v1/member/points", get(members::point_history::<D, B>))
        .route(
            "/api/v1/admin/members/:member_id/points",
            post(members::grant_points::<D, B>),
        )
        .route(
            "/api/v1/products",
            get(products::list_products::<D, B>).post(products::create_product::<D, B>),
        )
        .route(
            "/api/v1/products/category/:category",
            get(products::products_by_category::<D, B>),
        )
        .route(
            "/api/v1/products/purchase",
            post(products::purchase::<D, B>),
        )
        .route(
            "/api/v1/products/quantity",
            patch(products::increase_quantity::<D, B>),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the files of a local blob store under `/static`
pub fn with_static_files(router: Router, root: impl AsRef<Path>) -> Router {
    router.nest_service("/static", ServeDir::new(root))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Resolve the caller behind the request's bearer token
pub(crate) async fn authenticate<D, B>(
    state: &AppState<D, B>,
    headers: &HeaderMap,
) -> Result<Principal, ApiError> {
    let token = extract_bearer(headers)?;
    let principal = state
        .identity
        .verify(token)
        .await
        .map_err(commands::Error::from)?;
    Ok(principal)
}

pub(crate) fn require_role(principal: &Principal, role: Role) -> Result<(), ApiError> {
    if !principal.has_role(role) {
        tracing::warn!(member_id = %principal.member_id, ?role, "missing role");
        return Err(ApiError::forbidden("missing required role"));
    }
    Ok(())
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or(ApiError::unauthorized("missing authorization header"))?;
    let header = header
        .to_str()
        .map_err(|_| ApiError::unauthorized("malformed authorization header"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::unauthorized("expected a bearer token"))?
        .trim();
    if token.is_empty() {
        return Err(ApiError::unauthorized("empty bearer token"));
    }

    Ok(token)
}
