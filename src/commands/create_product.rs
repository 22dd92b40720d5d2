use std::task::{Context, Poll};

use crate::{
    domain::{NewProduct, Product},
    ports::{
        blob_store::BlobStorePort,
        database::{self, DatabasePort, Transaction},
    },
};
use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use super::{
    products::ProductView, run_transaction, BoxFuture, DomainLogic, Error, TransactionScript,
};

pub struct CreateProductRequest {
    pub product: NewProduct,
    pub image: Option<ImageUpload>,
}

/// Image file sent along with a new product
pub struct ImageUpload {
    /// Name of the file on the client side
    pub filename: String,
    pub content: Vec<u8>,
}

impl<D, B> Service<CreateProductRequest> for DomainLogic<D, B>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    type Response = ProductView;
    type Error = Error;
    type Future = BoxFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CreateProductRequest) -> Self::Future {
        let database = self.database.clone();
        let blob_store = self.blob_store.clone();
        let settings = self.settings.clone();
        let span = tracing::info_span!("create_product", product_name = %req.product.name);
        Box::pin(
            async move {
                validate(&req.product)?;

                // The product id is part of the image key, so the product is stored first
                let product = database.insert_product(req.product).await?;
                tracing::info!(product_id = %product.product_id, "product created");

                let image = match req.image {
                    Some(image) if !image.content.is_empty() => image,
                    _ => return Ok(product.into()),
                };
                let key = image_key(product.product_id, &image.filename);

                let image_url = match stage_and_upload(
                    blob_store.as_ref(),
                    &settings.image_bucket,
                    &key,
                    &image.content,
                )
                .await
                {
                    Ok(image_url) => image_url,
                    Err(err) => {
                        tracing::warn!(error = %err, "image upload failed, removing product");
                        discard_product(database.as_ref(), product.product_id).await;
                        return Err(err);
                    }
                };

                let script = AttachImage {
                    product_id: product.product_id,
                    image_url,
                };
                match run_transaction(database.as_ref(), settings.max_transaction_attempts, &script)
                    .await
                {
                    Ok(product) => Ok(product.into()),
                    Err(err) => {
                        tracing::warn!(error = %err, "could not attach image, removing product");
                        if let Err(delete_err) =
                            blob_store.delete(&settings.image_bucket, &key).await
                        {
                            tracing::error!(
                                error = %delete_err,
                                key = %key,
                                "could not remove uploaded image"
                            );
                        }
                        discard_product(database.as_ref(), product.product_id).await;
                        Err(err)
                    }
                }
            }
            .instrument(span),
        )
    }
}

fn validate(product: &NewProduct) -> Result<(), Error> {
    if product.name.trim().is_empty() {
        return Err(Error::InvalidInput("name cannot be empty".into()));
    }
    if product.price == 0 {
        return Err(Error::InvalidInput("price must be positive".into()));
    }
    Ok(())
}

/// Object key for a product image: `product-images/{product_id}-{filename}`
fn image_key(product_id: Uuid, filename: &str) -> String {
    // Only keep the last path segment, and characters that are safe in a key
    let filename: String = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let filename = match filename.trim_matches('.') {
        "" => "image",
        _ => filename.as_str(),
    };

    format!("product-images/{product_id}-{filename}")
}

/// Remove a product whose creation could not be completed
async fn discard_product<D>(database: &D, product_id: Uuid)
where
    D: DatabasePort + ?Sized,
{
    match database.delete_product(product_id).await {
        Ok(()) => {}
        // Already gone, nothing left behind
        Err(database::Error::ProductDoesNotExist(_)) => {}
        Err(err) => tracing::error!(
            error = %err,
            product_id = %product_id,
            "could not remove incomplete product"
        ),
    }
}

/// Stage `content` in a local temporary file, then upload it
///
/// The temporary file is removed when this returns, whether the upload succeeded or not.
async fn stage_and_upload<B>(
    blob_store: &B,
    bucket: &str,
    key: &str,
    content: &[u8],
) -> Result<String, Error>
where
    B: BlobStorePort + ?Sized,
{
    let staged =
        tokio::task::spawn_blocking(|| tempfile::Builder::new().prefix("upload-").tempfile())
            .await
            .map_err(|err| Error::IoFailure(Box::new(err)))??;
    tokio::fs::write(staged.path(), content).await?;

    blob_store.upload(bucket, key, staged.path()).await?;
    let url = blob_store.url_for(bucket, key);
    tokio::task::spawn_blocking(move || staged.close())
        .await
        .map_err(|err| Error::IoFailure(Box::new(err)))??;

    Ok(url)
}

struct AttachImage {
    product_id: Uuid,
    image_url: String,
}

#[async_trait::async_trait]
impl TransactionScript for AttachImage {
    type Output = Product;

    async fn run(&self, tx: &mut dyn Transaction) -> Result<Product, Error> {
        let product = tx
            .product(self.product_id)
            .await?
            .with_image_url(self.image_url.clone());
        tx.put_product(product.clone());
        Ok(product)
    }
}
