use std::{borrow::Cow, future::Future, pin::Pin, sync::Arc};

use crate::{
    domain,
    ports::{
        blob_store,
        database::{self, DatabasePort, Transaction},
        identity,
    },
};

pub mod create_product;
pub mod members;
pub mod products;
pub mod purchase;

/// Future returned by every command
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, Error>> + Send>>;

pub struct DomainLogic<D, B> {
    database: Arc<D>,
    blob_store: Arc<B>,
    settings: Settings,
}

impl<D, B> DomainLogic<D, B> {
    pub fn new(database: Arc<D>, blob_store: Arc<B>, settings: Settings) -> Self {
        Self {
            database,
            blob_store,
            settings,
        }
    }
}

impl<D, B> Clone for DomainLogic<D, B> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            blob_store: self.blob_store.clone(),
            settings: self.settings.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    /// Bucket receiving product images
    pub image_bucket: String,
    /// How many times a conflicting transaction is attempted before giving up
    pub max_transaction_attempts: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            image_bucket: "points-market".to_string(),
            max_transaction_attempts: 5,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(Cow<'static, str>),

    #[error("invalid input: {0}")]
    InvalidInput(Cow<'static, str>),

    /// Not enough points or stock to complete the operation
    #[error("insufficient resources: {0}")]
    InsufficientResources(#[source] domain::Error),

    /// The entity being created clashes with an existing one
    #[error("already exists: {0}")]
    AlreadyExists(Cow<'static, str>),

    #[error("unauthorized: {0}")]
    Unauthorized(Cow<'static, str>),

    /// The caller is known but lacks the role required by the operation
    #[error("forbidden: {0}")]
    Forbidden(Cow<'static, str>),

    /// Blob upload or local staging failure
    #[error("io failure: {0}")]
    IoFailure(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Every attempt at the transaction hit a concurrent modification
    #[error("transaction conflict after {attempts} attempt(s)")]
    Conflict { attempts: u32 },

    #[error("database port error: {0:?}")]
    Database(database::Error),
}

impl From<database::Error> for Error {
    fn from(err: database::Error) -> Self {
        match err {
            database::Error::MemberDoesNotExist(member_id) => {
                Self::NotFound(format!("member {member_id}").into())
            }
            database::Error::ProductDoesNotExist(product_id) => {
                Self::NotFound(format!("product {product_id}").into())
            }
            database::Error::MemberAlreadyExists(member_id) => {
                Self::AlreadyExists(format!("member {member_id}").into())
            }
            database::Error::DuplicateProductName(name) => {
                Self::AlreadyExists(format!("product named {name:?}").into())
            }
            err => Self::Database(err),
        }
    }
}

impl From<blob_store::Error> for Error {
    fn from(err: blob_store::Error) -> Self {
        Self::IoFailure(Box::new(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::IoFailure(Box::new(err))
    }
}

impl From<identity::Error> for Error {
    fn from(err: identity::Error) -> Self {
        Self::Unauthorized(err.to_string().into())
    }
}

/// Read-validate-write block executed inside a single transaction
///
/// `run` may be called more than once if the commit conflicts, so it must only act through
/// the transaction it is given.
#[async_trait::async_trait]
pub(crate) trait TransactionScript: Send + Sync {
    type Output: Send;

    async fn run(&self, tx: &mut dyn Transaction) -> Result<Self::Output, Error>;
}

/// Run `script` in a fresh transaction, retrying on commit conflicts
///
/// Any error returned by the script rolls the transaction back and is returned as is. Commit
/// conflicts start over with a new transaction, up to `max_attempts` times in total.
pub(crate) async fn run_transaction<D, S>(
    database: &D,
    max_attempts: u32,
    script: &S,
) -> Result<S::Output, Error>
where
    D: DatabasePort + ?Sized,
    S: TransactionScript,
{
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let mut tx = database.begin().await?;

        let output = match script.run(tx.as_mut()).await {
            Ok(output) => output,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                return Err(err);
            }
        };

        match tx.commit().await {
            Ok(()) => return Ok(output),
            Err(database::Error::Conflict) => {
                tracing::debug!(attempt, max_attempts, "transaction conflict, retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }

    tracing::warn!(max_attempts, "giving up after repeated transaction conflicts");
    Err(Error::Conflict {
        attempts: max_attempts,
    })
}
