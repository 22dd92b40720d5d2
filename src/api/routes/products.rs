use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use tower::ServiceExt;

use crate::{
    api::{
        authenticate,
        dto::{CreateProductBody, IncreaseQuantityBody, PurchaseBody},
        errors::ApiError,
        AppState,
    },
    commands::{
        create_product::CreateProductRequest,
        products::{
            IncreaseQuantityRequest, ListProductsRequest, ProductView, ProductsByCategoryRequest,
        },
        purchase::{PurchaseRequest, PurchaseResponse},
    },
    domain::ProductType,
    ports::{blob_store::BlobStorePort, database::DatabasePort},
};

pub async fn list_products<D, B>(
    State(state): State<AppState<D, B>>,
) -> Result<Json<Vec<ProductView>>, ApiError>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    let products = state.logic.oneshot(ListProductsRequest).await?;
    Ok(Json(products))
}

pub async fn products_by_category<D, B>(
    State(state): State<AppState<D, B>>,
    Path(category): Path<String>,
) -> Result<Json<Vec<ProductView>>, ApiError>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    let product_type: ProductType = category
        .parse()
        .map_err(|err: crate::domain::Error| ApiError::invalid_input(err.to_string()))?;
    let products = state
        .logic
        .oneshot(ProductsByCategoryRequest { product_type })
        .await?;
    Ok(Json(products))
}

pub async fn create_product<D, B>(
    State(state): State<AppState<D, B>>,
    Json(body): Json<CreateProductBody>,
) -> Result<(StatusCode, Json<ProductView>), ApiError>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    let req = CreateProductRequest::try_from(body)?;
    let product = state.logic.oneshot(req).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn purchase<D, B>(
    State(state): State<AppState<D, B>>,
    headers: HeaderMap,
    Json(body): Json<PurchaseBody>,
) -> Result<Json<PurchaseResponse>, ApiError>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    let member_id = authenticate(&state, &headers).await?.member_id;
    let receipt = state
        .logic
        .oneshot(PurchaseRequest {
            member_id,
            product_id: body.product_id,
            quantity: body.quantity,
        })
        .await?;
    Ok(Json(receipt))
}

pub async fn increase_quantity<D, B>(
    State(state): State<AppState<D, B>>,
    Json(body): Json<IncreaseQuantityBody>,
) -> Result<Json<ProductView>, ApiError>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    let product = state
        .logic
        .oneshot(IncreaseQuantityRequest {
            name: body.name,
            amount: body.amount,
        })
        .await?;
    Ok(Json(product))
}
