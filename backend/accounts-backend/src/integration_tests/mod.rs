//! Tests that need a database, run through the cli against a live postgres instance.

use api_commands::Login;
use chrono::Utc;
use secure_string::SecureBytes;
use tracing::{info, instrument};

use crate::configuration::Configuration;
use crate::database::{create_async_database_connection_pool, migrations::run_migrations};
use crate::error::{AccountsError, AccountsResult};
use crate::forms::authentication::AuthenticationForm;
use crate::manager::AccountManager;
use crate::model::account::{username::USERNAME_MAX_LENGTH, ExtraFields};
use crate::storage::PostgresAccountStore;

type Manager = AccountManager<PostgresAccountStore>;

#[instrument(err, skip(configuration))]
pub async fn run_internal_integration_tests(configuration: &Configuration) -> AccountsResult<()> {
    run_migrations(configuration).await?;

    let database_connection_pool = create_async_database_connection_pool(configuration).await?;
    let manager = AccountManager::new(
        PostgresAccountStore::new(database_connection_pool, configuration),
        configuration.clone(),
    );
    // usernames are unique per run, since the created accounts are never deleted
    let prefix = format!("it{}", Utc::now().timestamp_micros());

    test_create_user_lowercases(&manager, &prefix).await?;
    test_duplicate_username(&manager, &prefix).await?;
    test_username_length_limit(&manager, &prefix).await?;
    test_create_superuser(&manager, &prefix).await?;
    test_authentication_form(&manager, &prefix).await?;
    test_concurrent_creation(&manager, &prefix).await?;

    info!("Success! All internal integration tests passed");
    Ok(())
}

fn ensure(condition: bool, message: &str) -> AccountsResult<()> {
    if condition {
        Ok(())
    } else {
        Err(AccountsError::IntegrationTest {
            message: message.to_string(),
        })
    }
}

fn secure(password: &str) -> SecureBytes {
    SecureBytes::from(password.as_bytes().to_vec())
}

#[instrument(err, skip(manager))]
async fn test_create_user_lowercases(manager: &Manager, prefix: &str) -> AccountsResult<()> {
    let username = format!("{prefix}JohnDoe");
    let count = manager.count().await?;
    let account = manager
        .create_user(Some(username.as_str()), Some(secure("pw")), ExtraFields::default())
        .await?;

    ensure(manager.count().await? == count + 1, "exactly one account is created")?;
    ensure(
        account.username.as_ref() == username.to_lowercase(),
        "the returned username is lowercase",
    )?;

    let mut stored = manager
        .get_by_natural_key(&username.to_lowercase())
        .await?
        .ok_or_else(|| AccountsError::IntegrationTest {
            message: "the account can be found by its lowercase username".to_string(),
        })?;
    ensure(stored == account, "the stored account is the created one")?;
    ensure(
        stored.is_active && !stored.is_staff && !stored.is_superuser,
        "the flags have their defaults",
    )?;
    ensure(
        stored.check_password(secure("pw"), manager.configuration())?,
        "the stored password hash verifies",
    )?;
    ensure(
        manager.get_by_natural_key(&username).await?.is_none(),
        "the mixed case username is not stored",
    )
}

#[instrument(err, skip(manager))]
async fn test_duplicate_username(manager: &Manager, prefix: &str) -> AccountsResult<()> {
    let username = format!("{prefix}dup");
    manager
        .create_user(Some(username.as_str()), Some(secure("pw")), ExtraFields::default())
        .await?;

    let result = manager
        .create_user(
            Some(username.to_uppercase().as_str()),
            Some(secure("pw")),
            ExtraFields::default(),
        )
        .await;
    ensure(
        matches!(&result, Err(error) if error.is_unique_violation()),
        "a duplicate username is a unique violation",
    )
}

#[instrument(err, skip(manager))]
async fn test_username_length_limit(manager: &Manager, prefix: &str) -> AccountsResult<()> {
    let at_limit = format!("{prefix:u<width$}", width = USERNAME_MAX_LENGTH);
    manager
        .create_user(Some(at_limit.as_str()), Some(secure("pw")), ExtraFields::default())
        .await?;

    let beyond_limit = format!("{at_limit}u");
    let result = manager
        .create_user(Some(beyond_limit.as_str()), Some(secure("pw")), ExtraFields::default())
        .await;
    ensure(
        matches!(&result, Err(error) if error.is_data_error()),
        "an overlong username is a data error",
    )
}

#[instrument(err, skip(manager))]
async fn test_create_superuser(manager: &Manager, prefix: &str) -> AccountsResult<()> {
    let account = manager
        .create_superuser(
            Some(format!("{prefix}admin").as_str()),
            Some(secure("pw")),
            ExtraFields::default(),
        )
        .await?;
    ensure(
        account.is_staff && account.is_superuser,
        "superusers are staff with all permissions",
    )
}

#[instrument(err, skip(manager))]
async fn test_authentication_form(manager: &Manager, prefix: &str) -> AccountsResult<()> {
    let username = format!("{prefix}login");
    manager
        .create_user(
            Some(username.as_str()),
            Some(secure("secure-password")),
            ExtraFields::default(),
        )
        .await?;

    let mut form = AuthenticationForm::new(Login::new(username.clone(), "secure-password"));
    ensure(form.is_valid(manager).await?, "correct credentials are valid")?;

    let mut form = AuthenticationForm::new(Login::new(username, "wrong-password"));
    ensure(!form.is_valid(manager).await?, "a wrong password is invalid")?;
    ensure(
        form.errors().non_field_errors().len() == 1,
        "a wrong password gives a single non-field error",
    )
}

#[instrument(err, skip(manager))]
async fn test_concurrent_creation(manager: &Manager, prefix: &str) -> AccountsResult<()> {
    let username = format!("{prefix}race");
    let (first, second) = tokio::join!(
        manager.create_user(Some(username.as_str()), Some(secure("first")), ExtraFields::default()),
        manager.create_user(Some(username.as_str()), Some(secure("second")), ExtraFields::default()),
    );

    info!("First result:  {first:?}");
    info!("Second result: {second:?}");
    ensure(
        first.is_ok() != second.is_ok(),
        "exactly one of two concurrent creations succeeds",
    )?;
    let failures_are_unique_violations = [&first, &second]
        .into_iter()
        .filter_map(|result| result.as_ref().err())
        .all(AccountsError::is_unique_violation);
    ensure(
        failures_are_unique_violations,
        "the failed creation is a unique violation",
    )
}
