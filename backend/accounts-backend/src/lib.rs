//! User accounts identified by a username: creation, password hashing, normalization,
//! validation and the login form built on top of them.

pub mod cli;
pub mod configuration;
pub mod database;
pub mod error;
pub mod forms;
mod integration_tests;
pub mod manager;
pub mod model;
pub mod storage;

pub use configuration::Configuration;
pub use error::{AccountsError, AccountsResult};
pub use forms::authentication::AuthenticationForm;
pub use manager::AccountManager;
pub use model::account::{Account, AccountField, ExtraFields};
pub use storage::{AccountStore, InMemoryAccountStore, PostgresAccountStore, StorageError};
