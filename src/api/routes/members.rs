use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tower::ServiceExt;

use crate::{
    api::{
        authenticate,
        dto::{CreateMemberBody, GrantPointsBody},
        errors::ApiError,
        require_role, AppState,
    },
    commands::members::{
        CreateMemberRequest, DeleteMemberRequest, FindMemberRequest, GrantPointsRequest,
        GrantPointsResponse, MemberView, PointHistoryRequest, UpdateMemberRequest,
    },
    domain::{MemberPatch, PointRecord},
    ports::{blob_store::BlobStorePort, database::DatabasePort, identity::Role},
};
use uuid::Uuid;

/// Register the caller as a member
pub async fn create_member<D, B>(
    State(state): State<AppState<D, B>>,
    headers: HeaderMap,
    Json(body): Json<CreateMemberBody>,
) -> Result<(StatusCode, Json<MemberView>), ApiError>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    let member_id = authenticate(&state, &headers).await?.member_id;
    let member = state
        .logic
        .oneshot(CreateMemberRequest {
            member_id,
            name: body.name,
            email: body.email,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn find_member<D, B>(
    State(state): State<AppState<D, B>>,
    headers: HeaderMap,
) -> Result<Json<MemberView>, ApiError>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    let member_id = authenticate(&state, &headers).await?.member_id;
    let member = state.logic.oneshot(FindMemberRequest { member_id }).await?;
    Ok(Json(member))
}

pub async fn update_member<D, B>(
    State(state): State<AppState<D, B>>,
    headers: HeaderMap,
    Json(patch): Json<MemberPatch>,
) -> Result<Json<MemberView>, ApiError>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    let member_id = authenticate(&state, &headers).await?.member_id;
    let member = state
        .logic
        .oneshot(UpdateMemberRequest { member_id, patch })
        .await?;
    Ok(Json(member))
}

pub async fn delete_member<D, B>(
    State(state): State<AppState<D, B>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    let member_id = authenticate(&state, &headers).await?.member_id;
    state
        .logic
        .oneshot(DeleteMemberRequest { member_id })
        .await?;
    Ok(StatusCode::OK)
}

pub async fn point_history<D, B>(
    State(state): State<AppState<D, B>>,
    headers: HeaderMap,
) -> Result<Json<Vec<PointRecord>>, ApiError>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    let member_id = authenticate(&state, &headers).await?.member_id;
    let records = state
        .logic
        .oneshot(PointHistoryRequest { member_id })
        .await?;
    Ok(Json(records))
}

/// Credit points to any member, for administrators only
pub async fn grant_points<D, B>(
    State(state): State<AppState<D, B>>,
    headers: HeaderMap,
    Path(member_id): Path<Uuid>,
    Json(body): Json<GrantPointsBody>,
) -> Result<Json<GrantPointsResponse>, ApiError>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    let principal = authenticate(&state, &headers).await?;
    require_role(&principal, Role::Admin)?;
    let res = state
        .logic
        .oneshot(GrantPointsRequest {
            member_id,
            points: body.points,
            reason: body.reason,
        })
        .await?;
    Ok(Json(res))
}
