use uuid::Uuid;

use crate::domain::{Member, NewProduct, PointRecord, Product, ProductType};

/// Relational store for members, their point history, and the product catalog
///
/// Reads and inserts go straight to the store. Updates to existing rows go through a
/// [`Transaction`] obtained with [`DatabasePort::begin`], so that a read-validate-write
/// sequence either commits as a whole or not at all.
#[mockall::automock]
#[async_trait::async_trait]
pub trait DatabasePort: Send + Sync {
    /// Store a new member
    ///
    /// Fails with [`Error::MemberAlreadyExists`] if the identifier is taken.
    async fn insert_member(&self, member: Member) -> Result<Member, Error>;
    async fn get_member(&self, member_id: Uuid) -> Result<Member, Error>;
    /// Remove a member along with their point history
    async fn delete_member(&self, member_id: Uuid) -> Result<(), Error>;
    /// Point history of a member, oldest first
    async fn get_point_records(&self, member_id: Uuid) -> Result<Vec<PointRecord>, Error>;

    /// Store a new product, assigning it an identifier
    ///
    /// Product names are unique: a taken name fails with [`Error::DuplicateProductName`].
    async fn insert_product(&self, product: NewProduct) -> Result<Product, Error>;
    async fn get_product(&self, product_id: Uuid) -> Result<Product, Error>;
    /// All products, in creation order
    async fn list_products(&self) -> Result<Vec<Product>, Error>;
    async fn list_products_by_type(&self, product_type: ProductType)
        -> Result<Vec<Product>, Error>;
    async fn find_product_by_name(&self, name: &str) -> Result<Option<Product>, Error>;
    async fn delete_product(&self, product_id: Uuid) -> Result<(), Error>;

    /// Start a new transaction
    async fn begin(&self) -> Result<Box<dyn Transaction>, Error>;
}

/// Unit of work against the store
///
/// Rows read through the transaction are checked again at commit time: if any of them changed
/// in the meantime, [`Transaction::commit`] fails with [`Error::Conflict`] and nothing is
/// written. Dropping a transaction without committing discards staged writes.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Transaction: Send {
    async fn member(&mut self, member_id: Uuid) -> Result<Member, Error>;
    async fn product(&mut self, product_id: Uuid) -> Result<Product, Error>;

    /// Stage an updated member row
    fn put_member(&mut self, member: Member);
    /// Stage an updated product row
    fn put_product(&mut self, product: Product);
    /// Stage a new point history record
    fn append_point_record(&mut self, record: PointRecord);

    async fn commit(&mut self) -> Result<(), Error>;
    async fn rollback(&mut self) -> Result<(), Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Domain-level error when a member does not exist
    #[error("member {0} does not exist")]
    MemberDoesNotExist(Uuid),

    /// Domain-level error when a product does not exist
    #[error("product {0} does not exist")]
    ProductDoesNotExist(Uuid),

    #[error("member {0} already exists")]
    MemberAlreadyExists(Uuid),

    #[error("a product named {0:?} already exists")]
    DuplicateProductName(String),

    /// A row read by the transaction was modified before it could commit
    ///
    /// Nothing was written. The whole transaction can be retried.
    #[error("transaction conflict")]
    Conflict,

    /// The transaction was already committed or rolled back
    #[error("transaction already finished")]
    TransactionFinished,

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as connectivity, configuration, or permission errors.
    #[error("adapter error: {0:?}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}
