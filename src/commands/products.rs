use std::task::{Context, Poll};

use crate::{
    domain::{Product, ProductType},
    ports::{blob_store::BlobStorePort, database::DatabasePort, database::Transaction},
};
use serde::{Deserialize, Serialize};
use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use super::{run_transaction, BoxFuture, DomainLogic, Error, TransactionScript};

/// Public view of a product
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductView {
    pub product_id: Uuid,
    pub name: String,
    pub price: u32,
    pub quantity: u32,
    pub image_url: Option<String>,
    pub product_type: ProductType,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self {
            product_id: product.product_id,
            quantity: product.quantity(),
            name: product.name,
            price: product.price,
            image_url: product.image_url,
            product_type: product.product_type,
        }
    }
}

pub struct ListProductsRequest;

pub struct ProductsByCategoryRequest {
    pub product_type: ProductType,
}

/// Move the stock of the product called `name` by `amount`
///
/// `amount` may be negative, as long as the stock does not drop below zero.
pub struct IncreaseQuantityRequest {
    pub name: String,
    pub amount: i64,
}

impl<D, B> Service<ListProductsRequest> for DomainLogic<D, B>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    type Response = Vec<ProductView>;
    type Error = Error;
    type Future = BoxFuture<Vec<ProductView>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: ListProductsRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            let products = database.list_products().await?;
            Ok(products.into_iter().map(Into::into).collect())
        })
    }
}

impl<D, B> Service<ProductsByCategoryRequest> for DomainLogic<D, B>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    type Response = Vec<ProductView>;
    type Error = Error;
    type Future = BoxFuture<Vec<ProductView>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ProductsByCategoryRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            let products = database.list_products_by_type(req.product_type).await?;
            Ok(products.into_iter().map(Into::into).collect())
        })
    }
}

impl<D, B> Service<IncreaseQuantityRequest> for DomainLogic<D, B>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    type Response = ProductView;
    type Error = Error;
    type Future = BoxFuture<ProductView>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: IncreaseQuantityRequest) -> Self::Future {
        let database = self.database.clone();
        let max_attempts = self.settings.max_transaction_attempts;
        let span = tracing::info_span!(
            "increase_quantity",
            product_name = %req.name,
            amount = req.amount,
        );
        Box::pin(
            async move {
                let product = database
                    .find_product_by_name(&req.name)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("product named {:?}", req.name).into()))?;

                let script = ResolvedIncrease {
                    product_id: product.product_id,
                    amount: req.amount,
                };
                let product = run_transaction(database.as_ref(), max_attempts, &script).await?;
                tracing::info!(quantity = product.quantity(), "quantity adjusted");
                Ok(product.into())
            }
            .instrument(span),
        )
    }
}

/// [`IncreaseQuantityRequest`] once the name has been resolved to a product
struct ResolvedIncrease {
    product_id: Uuid,
    amount: i64,
}

#[async_trait::async_trait]
impl TransactionScript for ResolvedIncrease {
    type Output = Product;

    async fn run(&self, tx: &mut dyn Transaction) -> Result<Product, Error> {
        let product = tx
            .product(self.product_id)
            .await?
            .adjust_quantity(self.amount)
            .map_err(|err| Error::InvalidInput(err.to_string().into()))?;
        tx.put_product(product.clone());
        Ok(product)
    }
}
