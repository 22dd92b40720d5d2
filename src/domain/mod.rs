use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A member holding a points balance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    /// Unique identifier for the `Member`
    ///
    /// This is also the subject of the bearer tokens issued to the member.
    pub member_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    /// Number of points available for purchases
    ///
    /// Only changed through [`Member::debit`] and [`Member::credit`].
    points: u32,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Member {
    pub fn new(member_id: Uuid, name: impl Into<String>, email: Option<String>, points: u32) -> Self {
        let now = Utc::now();
        Self {
            member_id,
            name: name.into(),
            email,
            points,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    /// Returns a copy of this member with `amount` points removed
    pub fn debit(&self, amount: u32) -> Result<Member, Error> {
        let points = self
            .points
            .checked_sub(amount)
            .ok_or(Error::InsufficientPoints {
                available: self.points,
                requested: amount,
            })?;

        Ok(Member {
            points,
            modified_at: Utc::now(),
            ..self.clone()
        })
    }

    /// Returns a copy of this member with `amount` points added
    pub fn credit(&self, amount: u32) -> Result<Member, Error> {
        let points = self.points.checked_add(amount).ok_or(Error::Overflow)?;

        Ok(Member {
            points,
            modified_at: Utc::now(),
            ..self.clone()
        })
    }

    /// Apply profile changes, leaving the balance untouched
    pub fn with_patch(&self, patch: &MemberPatch) -> Member {
        Member {
            name: patch.name.clone().unwrap_or_else(|| self.name.clone()),
            email: patch.email.clone().or_else(|| self.email.clone()),
            modified_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// Field-level changes to a member profile
///
/// `None` leaves the current value in place.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPatch {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Product category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    Snack,
    Drink,
    Goods,
    Coupon,
}

impl ProductType {
    pub const ALL: [ProductType; 4] = [
        ProductType::Snack,
        ProductType::Drink,
        ProductType::Goods,
        ProductType::Coupon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Snack => "snack",
            ProductType::Drink => "drink",
            ProductType::Goods => "goods",
            ProductType::Coupon => "coupon",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductType::ALL
            .into_iter()
            .find(|product_type| product_type.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownProductType(s.to_string()))
    }
}

/// A product that can be bought with points
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Product {
    pub product_id: Uuid,
    pub name: String,
    /// Price of a single unit, in points
    pub price: u32,
    /// Units in stock
    ///
    /// Only changed through [`Product::take`] and [`Product::adjust_quantity`].
    quantity: u32,
    /// Public URL of the product image, once uploaded
    pub image_url: Option<String>,
    pub product_type: ProductType,
}

impl Product {
    pub fn new(product_id: Uuid, product: NewProduct) -> Self {
        Self {
            product_id,
            name: product.name,
            price: product.price,
            quantity: product.quantity,
            image_url: None,
            product_type: product.product_type,
        }
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Cost in points of `quantity` units
    ///
    /// Returns `None` if the total does not fit in a points balance.
    pub fn total_cost(&self, quantity: u32) -> Option<u32> {
        self.price.checked_mul(quantity)
    }

    /// Returns a copy of this product with `quantity` units removed from stock
    pub fn take(&self, quantity: u32) -> Result<Product, Error> {
        let remaining = self
            .quantity
            .checked_sub(quantity)
            .ok_or(Error::InsufficientStock {
                available: self.quantity,
                requested: quantity,
            })?;

        Ok(Product {
            quantity: remaining,
            ..self.clone()
        })
    }

    /// Returns a copy of this product with its stock moved by `delta`
    ///
    /// A negative delta is accepted as long as the stock does not drop below zero.
    pub fn adjust_quantity(&self, delta: i64) -> Result<Product, Error> {
        let quantity = i64::from(self.quantity)
            .checked_add(delta)
            .ok_or(Error::Overflow)?;
        if quantity < 0 {
            return Err(Error::NegativeQuantity {
                available: self.quantity,
                delta,
            });
        }
        let quantity = u32::try_from(quantity).map_err(|_| Error::Overflow)?;

        Ok(Product {
            quantity,
            ..self.clone()
        })
    }

    pub fn with_image_url(self, image_url: impl Into<String>) -> Product {
        Product {
            image_url: Some(image_url.into()),
            ..self
        }
    }
}

/// Product data before the store assigns an identifier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: u32,
    pub quantity: u32,
    pub product_type: ProductType,
}

/// Entry in a member's point history
///
/// Records are append-only: once stored they are never changed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRecord {
    pub record_id: Uuid,
    pub member_id: Uuid,
    /// Difference in points
    ///
    /// A positive number adds points to the balance. A negative number removes from it.
    pub delta_points: i32,
    /// Message explaining the reason for this record.
    ///
    /// Since the reasons could evolve over time, we log this as a string instead of an enum.
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl PointRecord {
    pub fn new(member_id: Uuid, delta_points: i32, reason: impl Into<String>) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            member_id,
            delta_points,
            reason: reason.into(),
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("not enough points: {requested} requested, {available} available")]
    InsufficientPoints { available: u32, requested: u32 },

    #[error("not enough stock: {requested} requested, {available} available")]
    InsufficientStock { available: u32, requested: u32 },

    /// Moving the stock by `delta` would leave a negative quantity
    #[error("cannot adjust quantity {available} by {delta}")]
    NegativeQuantity { available: u32, delta: i64 },

    #[error("arithmetic overflow")]
    Overflow,

    #[error("unknown product type: {0}")]
    UnknownProductType(String),
}
