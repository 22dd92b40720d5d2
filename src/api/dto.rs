use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    commands::create_product::{CreateProductRequest, ImageUpload},
    domain::{NewProduct, ProductType},
};

use super::errors::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateMemberBody {
    pub name: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GrantPointsBody {
    pub points: u32,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseBody {
    pub product_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductBody {
    pub name: String,
    pub price: u32,
    pub quantity: u32,
    pub product_type: ProductType,
    pub image: Option<ImageBody>,
}

#[derive(Debug, Deserialize)]
pub struct ImageBody {
    pub filename: String,
    /// Standard base64 encoding of the file content
    pub content_base64: String,
}

impl TryFrom<CreateProductBody> for CreateProductRequest {
    type Error = ApiError;

    fn try_from(body: CreateProductBody) -> Result<Self, Self::Error> {
        let image = body
            .image
            .map(|image| {
                STANDARD
                    .decode(image.content_base64.as_bytes())
                    .map(|content| ImageUpload {
                        filename: image.filename,
                        content,
                    })
                    .map_err(|err| ApiError::invalid_input(format!("image content: {err}")))
            })
            .transpose()?;

        Ok(CreateProductRequest {
            product: NewProduct {
                name: body.name,
                price: body.price,
                quantity: body.quantity,
                product_type: body.product_type,
            },
            image,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct IncreaseQuantityBody {
    pub name: String,
    pub amount: i64,
}
