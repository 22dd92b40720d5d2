use std::task::{Context, Poll};

use crate::{
    domain,
    ports::{blob_store::BlobStorePort, database::DatabasePort, database::Transaction},
};
use serde::{Deserialize, Serialize};
use tower::Service;
use tracing::Instrument;
use uuid::Uuid;

use super::{run_transaction, BoxFuture, DomainLogic, Error, TransactionScript};

#[derive(Clone, Debug)]
pub struct PurchaseRequest {
    pub member_id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
}

/// Receipt for a committed purchase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub member_id: Uuid,
    pub product_id: Uuid,
    pub quantity: u32,
    /// Points debited from the member
    pub total_cost: u32,
    /// Member balance after the purchase
    pub remaining_points: u32,
    /// Product stock after the purchase
    pub remaining_quantity: u32,
}

#[async_trait::async_trait]
impl TransactionScript for PurchaseRequest {
    type Output = PurchaseResponse;

    async fn run(&self, tx: &mut dyn Transaction) -> Result<PurchaseResponse, Error> {
        let member = tx.member(self.member_id).await?;
        let product = tx.product(self.product_id).await?;

        let total_cost = product.total_cost(self.quantity).ok_or(
            Error::InsufficientResources(domain::Error::Overflow),
        )?;
        // Both checks happen before anything is staged
        let member = member
            .debit(total_cost)
            .map_err(Error::InsufficientResources)?;
        let product = product
            .take(self.quantity)
            .map_err(Error::InsufficientResources)?;

        let response = PurchaseResponse {
            member_id: member.member_id,
            product_id: product.product_id,
            quantity: self.quantity,
            total_cost,
            remaining_points: member.points(),
            remaining_quantity: product.quantity(),
        };
        tx.put_member(member);
        tx.put_product(product);

        Ok(response)
    }
}

impl<D, B> Service<PurchaseRequest> for DomainLogic<D, B>
where
    D: DatabasePort + 'static,
    B: BlobStorePort + 'static,
{
    type Response = PurchaseResponse;
    type Error = Error;
    type Future = BoxFuture<Self::Response>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: PurchaseRequest) -> Self::Future {
        let database = self.database.clone();
        let max_attempts = self.settings.max_transaction_attempts;
        let span = tracing::info_span!(
            "purchase",
            member_id = %req.member_id,
            product_id = %req.product_id,
            quantity = req.quantity,
        );
        Box::pin(
            async move {
                if req.quantity == 0 {
                    return Err(Error::InvalidInput("quantity must be positive".into()));
                }

                let res = run_transaction(database.as_ref(), max_attempts, &req).await;
                match &res {
                    Ok(receipt) => tracing::info!(
                        total_cost = receipt.total_cost,
                        remaining_points = receipt.remaining_points,
                        "purchase committed"
                    ),
                    Err(err) => tracing::info!(error = %err, "purchase rejected"),
                }
                res
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapters::{blob_store::memory::MemoryBlobStore, database::memory::MemoryDatabase},
        commands::Settings,
        domain::{Member, NewProduct, Product, ProductType},
        ports::{
            blob_store::MockBlobStorePort,
            database::{self, MockDatabasePort, MockTransaction},
        },
    };
    use rstest::*;
    use speculoos::prelude::*;
    use std::sync::Arc;
    use tower::{BoxError, ServiceExt};

    struct Fixture {
        database: MemoryDatabase,
        domain: DomainLogic<MemoryDatabase, MemoryBlobStore>,
        member: Member,
        product: Product,
    }

    async fn setup(points: u32, price: u32, quantity: u32) -> Fixture {
        let database = MemoryDatabase::default();
        let member = database
            .insert_member(Member::new(Uuid::new_v4(), "alice", None, points))
            .await
            .unwrap();
        let product = database
            .insert_product(NewProduct {
                name: "Cola".to_string(),
                price,
                quantity,
                product_type: ProductType::Drink,
            })
            .await
            .unwrap();
        let domain = DomainLogic::new(
            Arc::new(database.clone()),
            Arc::new(MemoryBlobStore::default()),
            Settings::default(),
        );

        Fixture {
            database,
            domain,
            member,
            product,
        }
    }

    #[tokio::test]
    async fn test_purchase() -> Result<(), BoxError> {
        // GIVEN a member with 100 points and a product priced 30 with 5 in stock
        let fixture = setup(100, 30, 5).await;

        // WHEN buying 3 units
        let res = fixture
            .domain
            .clone()
            .oneshot(PurchaseRequest {
                member_id: fixture.member.member_id,
                product_id: fixture.product.product_id,
                quantity: 3,
            })
            .await;

        // THEN the balance drops by 90 and the stock by 3
        assert_that!(res).is_ok().is_equal_to(PurchaseResponse {
            member_id: fixture.member.member_id,
            product_id: fixture.product.product_id,
            quantity: 3,
            total_cost: 90,
            remaining_points: 10,
            remaining_quantity: 2,
        });
        let member = fixture.database.get_member(fixture.member.member_id).await?;
        let product = fixture
            .database
            .get_product(fixture.product.product_id)
            .await?;
        assert_that!(member.points()).is_equal_to(10);
        assert_that!(product.quantity()).is_equal_to(2);
        // No other records change
        assert_that!(member.name).is_equal_to(fixture.member.name);
        assert_that!(product.price).is_equal_to(30);
        assert_that!(
            fixture
                .database
                .get_point_records(fixture.member.member_id)
                .await?
        )
        .is_empty();

        Ok(())
    }

    /// Not enough points, or not enough stock
    #[rstest]
    #[case(89, 30, 5, 3)]
    #[case(1000, 30, 2, 3)]
    #[tokio::test]
    async fn test_insufficient_resources(
        #[case] points: u32,
        #[case] price: u32,
        #[case] stock: u32,
        #[case] quantity: u32,
    ) -> Result<(), BoxError> {
        let fixture = setup(points, price, stock).await;

        let res = fixture
            .domain
            .clone()
            .oneshot(PurchaseRequest {
                member_id: fixture.member.member_id,
                product_id: fixture.product.product_id,
                quantity,
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::InsufficientResources(_)));
        // State is unchanged
        let member = fixture.database.get_member(fixture.member.member_id).await?;
        let product = fixture
            .database
            .get_product(fixture.product.product_id)
            .await?;
        assert_that!(member).is_equal_to(fixture.member);
        assert_that!(product).is_equal_to(fixture.product);

        Ok(())
    }

    #[tokio::test]
    async fn test_total_cost_overflow() {
        let fixture = setup(u32::MAX, u32::MAX, u32::MAX).await;

        let res = fixture
            .domain
            .clone()
            .oneshot(PurchaseRequest {
                member_id: fixture.member.member_id,
                product_id: fixture.product.product_id,
                quantity: 2,
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::InsufficientResources(domain::Error::Overflow)));
    }

    #[tokio::test]
    async fn test_zero_quantity() {
        let fixture = setup(100, 30, 5).await;

        let res = fixture
            .domain
            .clone()
            .oneshot(PurchaseRequest {
                member_id: fixture.member.member_id,
                product_id: fixture.product.product_id,
                quantity: 0,
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::InvalidInput(_)));
    }

    #[rstest]
    #[case(true)]
    #[case(false)]
    #[tokio::test]
    async fn test_not_found(#[case] missing_member: bool) {
        let fixture = setup(100, 30, 5).await;
        let (member_id, product_id) = if missing_member {
            (Uuid::new_v4(), fixture.product.product_id)
        } else {
            (fixture.member.member_id, Uuid::new_v4())
        };

        let res = fixture
            .domain
            .clone()
            .oneshot(PurchaseRequest {
                member_id,
                product_id,
                quantity: 1,
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_purchases_of_last_unit() -> Result<(), BoxError> {
        // GIVEN a single unit in stock and two members able to pay for it
        let fixture = setup(100, 30, 1).await;
        let other = fixture
            .database
            .insert_member(Member::new(Uuid::new_v4(), "bob", None, 100))
            .await?;

        // WHEN both try to buy it at the same time
        let handles = [fixture.member.member_id, other.member_id].map(|member_id| {
            let domain = fixture.domain.clone();
            let product_id = fixture.product.product_id;
            tokio::spawn(async move {
                domain
                    .oneshot(PurchaseRequest {
                        member_id,
                        product_id,
                        quantity: 1,
                    })
                    .await
            })
        });
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await?);
        }

        // THEN exactly one succeeds and stock ends at zero
        let successes = results.iter().filter(|res| res.is_ok()).count();
        assert_that!(successes).is_equal_to(1);
        assert_that!(results
            .iter()
            .filter_map(|res| res.as_ref().err())
            .all(|err| matches!(
                err,
                Error::InsufficientResources(_) | Error::Conflict { .. }
            )))
        .is_true();
        let product = fixture
            .database
            .get_product(fixture.product.product_id)
            .await?;
        assert_that!(product.quantity()).is_equal_to(0);
        // Only one member was charged
        let total_points = fixture
            .database
            .get_member(fixture.member.member_id)
            .await?
            .points()
            + fixture.database.get_member(other.member_id).await?.points();
        assert_that!(total_points).is_equal_to(170);

        Ok(())
    }

    /// Every commit conflicts: the coordinator gives up after the configured attempts
    #[tokio::test]
    async fn test_bounded_retries() {
        let member = Member::new(Uuid::new_v4(), "alice", None, 100);
        let product = Product::new(
            Uuid::new_v4(),
            NewProduct {
                name: "Cola".to_string(),
                price: 30,
                quantity: 5,
                product_type: ProductType::Drink,
            },
        );
        let (member_id, product_id) = (member.member_id, product.product_id);

        let mut database = MockDatabasePort::new();
        database.expect_begin().times(3).returning(move || {
            let mut tx = MockTransaction::new();
            let member = member.clone();
            let product = product.clone();
            tx.expect_member()
                .returning(move |_| Ok(member.clone()));
            tx.expect_product()
                .returning(move |_| Ok(product.clone()));
            tx.expect_put_member().times(1).return_const(());
            tx.expect_put_product().times(1).return_const(());
            tx.expect_commit()
                .times(1)
                .returning(|| Err(database::Error::Conflict));
            Ok(Box::new(tx) as Box<dyn Transaction>)
        });

        let domain = DomainLogic::new(
            Arc::new(database),
            Arc::new(MockBlobStorePort::new()),
            Settings {
                max_transaction_attempts: 3,
                ..Settings::default()
            },
        );

        let res = domain
            .oneshot(PurchaseRequest {
                member_id,
                product_id,
                quantity: 1,
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::Conflict { attempts: 3 }));
    }

    /// A failed validation rolls back and is not retried
    #[tokio::test]
    async fn test_rejection_rolls_back() {
        let member = Member::new(Uuid::new_v4(), "alice", None, 10);
        let product = Product::new(
            Uuid::new_v4(),
            NewProduct {
                name: "Cola".to_string(),
                price: 30,
                quantity: 5,
                product_type: ProductType::Drink,
            },
        );
        let (member_id, product_id) = (member.member_id, product.product_id);

        let mut database = MockDatabasePort::new();
        database.expect_begin().times(1).returning(move || {
            let mut tx = MockTransaction::new();
            let member = member.clone();
            let product = product.clone();
            tx.expect_member()
                .returning(move |_| Ok(member.clone()));
            tx.expect_product()
                .returning(move |_| Ok(product.clone()));
            tx.expect_put_member().never();
            tx.expect_put_product().never();
            tx.expect_commit().never();
            tx.expect_rollback().times(1).returning(|| Ok(()));
            Ok(Box::new(tx) as Box<dyn Transaction>)
        });

        let domain = DomainLogic::new(
            Arc::new(database),
            Arc::new(MockBlobStorePort::new()),
            Settings::default(),
        );

        let res = domain
            .oneshot(PurchaseRequest {
                member_id,
                product_id,
                quantity: 1,
            })
            .await;

        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::InsufficientResources(_)));
    }
}
