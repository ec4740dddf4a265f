use diesel::Connection;
use diesel_async::{async_connection_wrapper::AsyncConnectionWrapper, AsyncPgConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness};
use tracing::{debug, info, instrument};

use crate::{
    configuration::Configuration,
    error::{AccountsError, AccountsResult},
};

const MIGRATIONS: EmbeddedMigrations = diesel_migrations::embed_migrations!();

/// A blocking connection for `diesel_migrations`, which does not support async connections.
/// Must not be used on a runtime thread, see [`spawn_migration_task`].
fn create_migration_connection(
    configuration: &Configuration,
) -> AccountsResult<AsyncConnectionWrapper<AsyncPgConnection>> {
    debug!("Creating synchronous connection to database");
    AsyncConnectionWrapper::<AsyncPgConnection>::establish(configuration.postgres_url.unsecure())
        .map_err(|error| AccountsError::DatabaseConnection {
            source: Box::new(error),
        })
}

async fn spawn_migration_task<ReturnType: Send + 'static>(
    configuration: &Configuration,
    task: impl FnOnce(Configuration) -> AccountsResult<ReturnType> + Send + 'static,
) -> AccountsResult<ReturnType> {
    let configuration = configuration.clone();
    tokio::task::spawn_blocking(move || task(configuration))
        .await
        .map_err(|error| AccountsError::TokioTaskJoin {
            source: Box::new(error),
        })?
}

/// Check if there are missing database migrations.
#[instrument(err, skip(configuration))]
pub async fn has_missing_migrations(configuration: &Configuration) -> AccountsResult<bool> {
    spawn_migration_task(configuration, |configuration| {
        create_migration_connection(&configuration)?
            .has_pending_migration(MIGRATIONS)
            .map_err(|error| AccountsError::DatabaseMigration { source: error })
    })
    .await
}

/// Runs all missing migrations.
///
/// **Warning:** It is unknown how this deals with concurrent execution of migrations,
/// so make sure that this is never run twice at the same time on the same database.
#[instrument(err, skip(configuration))]
pub async fn run_migrations(configuration: &Configuration) -> AccountsResult<()> {
    spawn_migration_task(configuration, |configuration| {
        let mut connection = create_migration_connection(&configuration)?;
        info!("Running pending database migrations...");
        connection
            .run_pending_migrations(MIGRATIONS)
            .map_err(|error| AccountsError::DatabaseMigration { source: error })?;
        info!("Database migrations complete");
        Ok(())
    })
    .await
}
