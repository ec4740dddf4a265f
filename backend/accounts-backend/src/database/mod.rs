use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager},
    scoped_futures::ScopedBoxFuture,
    AsyncPgConnection,
};
use tracing::{debug, instrument};

use crate::{
    configuration::Configuration,
    error::{AccountsError, AccountsResult},
    storage::StorageError,
};

use self::transactions::TransactionError;

pub mod migrations;
pub mod schema;
pub mod transactions;

#[derive(Clone)]
pub struct AccountsAsyncDatabaseConnectionPool {
    implementation: Pool<AsyncPgConnection>,
}

#[instrument(err, skip(configuration))]
pub async fn create_async_database_connection_pool(
    configuration: &Configuration,
) -> AccountsResult<AccountsAsyncDatabaseConnectionPool> {
    // create a new connection pool with the default config
    let connection_manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(
        configuration.postgres_url.unsecure(),
    );
    let pool = Pool::builder(connection_manager)
        .max_size(configuration.database_pool_size)
        .build()
        .map_err(|error| AccountsError::DatabaseConnection {
            source: Box::new(error),
        })?;

    Ok(AccountsAsyncDatabaseConnectionPool {
        implementation: pool,
    })
}

impl AccountsAsyncDatabaseConnectionPool {
    /// Execute a serializable database transaction and retry on serialisation failures.
    /// Temporary failures are logged and the transaction is retried (by calling the closure again).
    /// Permanent failures cause the function to return immediately.
    ///
    /// If `max_retries` temporary errors have occurred, then [`StorageError::TransactionRetryLimitReached`] is returned.
    pub async fn execute_transaction_with_retries<'b, ReturnType>(
        &self,
        transaction: impl for<'r> Fn(
                &'r mut AsyncPgConnection,
            )
                -> ScopedBoxFuture<'b, 'r, Result<ReturnType, TransactionError>>
            + Send
            + Sync,
        max_retries: u64,
    ) -> Result<ReturnType, StorageError>
    where
        ReturnType: 'b + Send,
    {
        let mut database_connection =
            self.implementation
                .get()
                .await
                .map_err(|error| StorageError::Database {
                    source: Box::new(error),
                })?;

        for _ in 0..max_retries.saturating_add(1) {
            match database_connection
                .build_transaction()
                .serializable()
                .run(&transaction)
                .await
            {
                Ok(result) => return Ok(result),
                Err(TransactionError::Temporary(error)) => {
                    debug!("temporary transaction error: {error}")
                }
                Err(TransactionError::Permanent(error)) => return Err(error),
            }
        }

        Err(StorageError::TransactionRetryLimitReached { limit: max_retries })
    }
}
