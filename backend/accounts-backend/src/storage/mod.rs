//! The storage port for accounts and its adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    error::BoxDynError,
    model::account::{Account, AccountField, AccountId},
};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryAccountStore;
pub use postgres::PostgresAccountStore;

/// Failures raised by storage adapters.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An insert or update collided with the unique index on a field.
    #[error("A user with that {field} already exists.")]
    UniqueViolation { field: AccountField },

    /// A value was rejected by a storage constraint, e.g. because it is too long.
    #[error("value of field '{field}' rejected by storage: {message}")]
    DataError { field: AccountField, message: String },

    #[error("account with id {id} does not exist")]
    NotFound { id: AccountId },

    #[error("too many temporary transaction errors, the limit was {limit}")]
    TransactionRetryLimitReached { limit: u64 },

    #[error("database error: {source}")]
    Database { source: BoxDynError },
}

/// Persistence of accounts.
///
/// Adapters enforce the username constraints: uniqueness and a maximum length of
/// [`USERNAME_MAX_LENGTH`](crate::model::account::username::USERNAME_MAX_LENGTH) characters.
/// They store usernames as given, normalization happens before.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account and return its assigned id. The id of `account` is ignored.
    async fn insert(&self, account: &Account) -> Result<AccountId, StorageError>;

    /// Overwrite all fields of the stored account with the given id.
    async fn update(&self, id: AccountId, account: &Account) -> Result<(), StorageError>;

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StorageError>;

    /// Exact, case-sensitive lookup.
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StorageError>;

    async fn count(&self) -> Result<u64, StorageError>;

    /// All accounts ordered by id.
    async fn list(&self) -> Result<Vec<Account>, StorageError>;
}
