use std::{error::Error, ffi::OsString};

use thiserror::Error;

use crate::{
    model::{account::AccountField, validation::ValidationError},
    storage::StorageError,
};

pub type AccountsResult<T> = Result<T, AccountsError>;

pub type BoxDynError = Box<dyn Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum AccountsError {
    #[error("missing environment variable '{key}'")]
    MissingEnvironmentVariable { key: String },

    #[error("environment variable '{key}' has malformed value {value:?} caused by: {source}")]
    MalformedEnvironmentVariable {
        key: String,
        value: OsString,
        source: BoxDynError,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("error setting up tracing: {source}")]
    SetupTracing { source: BoxDynError },

    #[error("error connecting to the database: {source}")]
    DatabaseConnection { source: BoxDynError },

    #[error("error running database migrations: {source}")]
    DatabaseMigration { source: BoxDynError },

    #[error("error reading password from stdin: {source}")]
    ReadPasswordFromStdin { source: BoxDynError },

    #[error("error building tokio runtime: {source}")]
    TokioRuntime { source: BoxDynError },

    #[error("error joining tokio task: {source}")]
    TokioTaskJoin { source: BoxDynError },

    #[error("error creating argon2id parameters: {source}")]
    PasswordArgon2IdParameters { source: BoxDynError },

    #[error("error hashing password with argon2id: {source}")]
    PasswordArgon2IdHash { source: BoxDynError },

    #[error("error verifying password against argon2id hash: {source}")]
    PasswordArgon2IdVerify { source: BoxDynError },

    #[error("error checking argon2id hash parameters: {source}")]
    PasswordArgon2IdRehash { source: BoxDynError },

    #[error("The field '{field}' must be specified.")]
    MissingField { field: AccountField },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("no account with username {username:?}")]
    UnknownAccount { username: String },

    #[error("internal integration test failed: {message}")]
    IntegrationTest { message: String },
}

impl AccountsError {
    /// True if this error is a rejected insert or update due to a duplicate username.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Storage(StorageError::UniqueViolation { .. }))
    }

    /// True if the storage layer rejected a value, e.g. because it was too long.
    pub fn is_data_error(&self) -> bool {
        matches!(self, Self::Storage(StorageError::DataError { .. }))
    }
}
