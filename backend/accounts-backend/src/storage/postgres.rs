use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{AsChangeset, Insertable, Queryable, Selectable};
use diesel_async::scoped_futures::ScopedFutureExt;
use tracing::instrument;

use super::{AccountStore, StorageError};
use crate::{
    configuration::Configuration,
    database::{transactions::TransactionError, AccountsAsyncDatabaseConnectionPool},
    model::account::{
        password_hash::PasswordHash, username::Username, Account, AccountId,
    },
};

/// An [`AccountStore`] backed by the `users` table.
#[derive(Clone)]
pub struct PostgresAccountStore {
    database_connection_pool: AccountsAsyncDatabaseConnectionPool,
    maximum_transaction_retry_count: u64,
}

impl PostgresAccountStore {
    pub fn new(
        database_connection_pool: AccountsAsyncDatabaseConnectionPool,
        configuration: &Configuration,
    ) -> Self {
        Self {
            database_connection_pool,
            maximum_transaction_retry_count: configuration.maximum_transaction_retry_count,
        }
    }
}

#[derive(Queryable, Selectable, Debug)]
#[diesel(table_name = crate::database::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct AccountRow {
    id: i64,
    username: String,
    password_hash: Option<String>,
    is_active: bool,
    is_staff: bool,
    is_superuser: bool,
    last_login: Option<DateTime<Utc>>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Self {
            id: Some(row.id),
            username: Username::from(row.username),
            password_hash: PasswordHash::from(row.password_hash),
            is_active: row.is_active,
            is_staff: row.is_staff,
            is_superuser: row.is_superuser,
            last_login: row.last_login,
        }
    }
}

#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = crate::database::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_default_value = false)]
#[diesel(treat_none_as_null = true)]
struct AccountChangeset<'a> {
    username: &'a str,
    password_hash: Option<&'a str>,
    is_active: bool,
    is_staff: bool,
    is_superuser: bool,
    last_login: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Account> for AccountChangeset<'a> {
    fn from(account: &'a Account) -> Self {
        Self {
            username: account.username.as_ref(),
            password_hash: account.password_hash.as_str(),
            is_active: account.is_active,
            is_staff: account.is_staff,
            is_superuser: account.is_superuser,
            last_login: account.last_login,
        }
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    #[instrument(err, skip(self, account))]
    async fn insert(&self, account: &Account) -> Result<AccountId, StorageError> {
        let changeset = &AccountChangeset::from(account);

        self.database_connection_pool
            .execute_transaction_with_retries(
                |database_connection| {
                    async move {
                        use crate::database::schema::users;
                        use diesel_async::RunQueryDsl;

                        Ok::<_, TransactionError>(diesel::insert_into(users::table)
                            .values(changeset)
                            .returning(users::id)
                            .get_result::<AccountId>(database_connection)
                            .await?)
                    }
                    .scope_boxed()
                },
                self.maximum_transaction_retry_count,
            )
            .await
    }

    #[instrument(err, skip(self, account))]
    async fn update(&self, id: AccountId, account: &Account) -> Result<(), StorageError> {
        let changeset = &AccountChangeset::from(account);

        let affected_rows = self
            .database_connection_pool
            .execute_transaction_with_retries(
                |database_connection| {
                    async move {
                        use crate::database::schema::users;
                        use diesel::QueryDsl;
                        use diesel_async::RunQueryDsl;

                        Ok::<_, TransactionError>(diesel::update(users::table.find(id))
                            .set(changeset)
                            .execute(database_connection)
                            .await?)
                    }
                    .scope_boxed()
                },
                self.maximum_transaction_retry_count,
            )
            .await?;

        if affected_rows == 0 {
            Err(StorageError::NotFound { id })
        } else {
            Ok(())
        }
    }

    #[instrument(err, skip(self))]
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StorageError> {
        let row = self
            .database_connection_pool
            .execute_transaction_with_retries(
                |database_connection| {
                    async move {
                        use crate::database::schema::users;
                        use diesel::{OptionalExtension, QueryDsl, SelectableHelper};
                        use diesel_async::RunQueryDsl;

                        Ok::<_, TransactionError>(users::table
                            .find(id)
                            .select(AccountRow::as_select())
                            .first::<AccountRow>(database_connection)
                            .await
                            .optional()?)
                    }
                    .scope_boxed()
                },
                self.maximum_transaction_retry_count,
            )
            .await?;

        Ok(row.map(Account::from))
    }

    #[instrument(err, skip(self))]
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StorageError> {
        let row = self
            .database_connection_pool
            .execute_transaction_with_retries(
                |database_connection| {
                    async move {
                        use crate::database::schema::users;
                        use diesel::{
                            ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper,
                        };
                        use diesel_async::RunQueryDsl;

                        Ok::<_, TransactionError>(users::table
                            .filter(users::username.eq(username))
                            .select(AccountRow::as_select())
                            .first::<AccountRow>(database_connection)
                            .await
                            .optional()?)
                    }
                    .scope_boxed()
                },
                self.maximum_transaction_retry_count,
            )
            .await?;

        Ok(row.map(Account::from))
    }

    #[instrument(err, skip(self))]
    async fn count(&self) -> Result<u64, StorageError> {
        let count = self
            .database_connection_pool
            .execute_transaction_with_retries(
                |database_connection| {
                    async move {
                        use crate::database::schema::users;
                        use diesel::QueryDsl;
                        use diesel_async::RunQueryDsl;

                        Ok::<_, TransactionError>(users::table
                            .count()
                            .get_result::<i64>(database_connection)
                            .await?)
                    }
                    .scope_boxed()
                },
                self.maximum_transaction_retry_count,
            )
            .await?;

        u64::try_from(count).map_err(|error| StorageError::Database {
            source: Box::new(error),
        })
    }

    #[instrument(err, skip(self))]
    async fn list(&self) -> Result<Vec<Account>, StorageError> {
        let rows = self
            .database_connection_pool
            .execute_transaction_with_retries(
                |database_connection| {
                    async move {
                        use crate::database::schema::users;
                        use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
                        use diesel_async::RunQueryDsl;

                        Ok::<_, TransactionError>(users::table
                            .order(users::id.asc())
                            .select(AccountRow::as_select())
                            .load::<AccountRow>(database_connection)
                            .await?)
                    }
                    .scope_boxed()
                },
                self.maximum_transaction_retry_count,
            )
            .await?;

        Ok(rows.into_iter().map(Account::from).collect())
    }
}
