use api_commands::{CreateAccount, Login};
use clap::Parser;
use secure_string::SecureBytes;
use tokio::io::{stdin, AsyncReadExt};
use tracing::{debug, info, instrument, warn};

use crate::{
    configuration::Configuration,
    database::{
        create_async_database_connection_pool,
        migrations::{has_missing_migrations, run_migrations},
    },
    error::{AccountsError, AccountsResult},
    forms::authentication::AuthenticationForm,
    integration_tests::run_internal_integration_tests,
    manager::AccountManager,
    model::account::ExtraFields,
    storage::PostgresAccountStore,
};

/// CLI of the account administration.
#[derive(Parser, Debug)]
pub enum Cli {
    /// Apply pending database migrations.
    ApplyMigrations,

    /// Create a user.
    /// If no password is given, then it is read from stdin.
    CreateUser {
        /// The name of the user.
        #[arg(short, long)]
        username: String,
        /// The password.
        /// If not given, then it is read from stdin.
        #[arg(short, long)]
        password: Option<SecureBytes>,
        /// Allow the user to log into the admin site.
        #[arg(long)]
        staff: bool,
    },

    /// Create a user with staff status and all permissions.
    /// If no password is given, then it is read from stdin.
    CreateSuperuser {
        /// The name of the user.
        #[arg(short, long)]
        username: String,
        /// The password.
        /// If not given, then it is read from stdin.
        #[arg(short, long)]
        password: Option<SecureBytes>,
    },

    /// Set the password of a user.
    /// If no password is given, then it is read from stdin.
    SetPassword {
        /// The name of the user.
        #[arg(short, long)]
        username: String,
        /// The new password.
        /// If not given, then it is read from stdin.
        #[arg(short, long)]
        password: Option<SecureBytes>,
    },

    /// Check a username and password like the login form does, and record the login on success.
    /// If no password is given, then it is read from stdin.
    CheckCredentials {
        /// The name of the user.
        #[arg(short, long)]
        username: String,
        /// The password.
        /// If not given, then it is read from stdin.
        #[arg(short, long)]
        password: Option<SecureBytes>,
    },

    /// Run all validation rules on all stored accounts and report the ones that violate them.
    ValidateUsernames,

    /// Run integration tests against the database.
    /// They create accounts with unique random names, which are not removed afterwards.
    RunInternalIntegrationTests,
}

#[instrument(skip(configuration))]
pub async fn run_cli_command(configuration: &Configuration) -> AccountsResult<()> {
    let cli_command = Cli::parse();
    debug!("Cli arguments: {cli_command:#?}");

    match cli_command {
        Cli::ApplyMigrations => apply_pending_database_migrations(configuration).await?,
        Cli::CreateUser {
            username,
            password,
            staff,
        } => {
            let create_account = CreateAccount {
                username,
                password: read_password(password).await?,
                is_staff: Some(staff),
                is_superuser: None,
            };
            create_user(create_account, false, configuration).await?
        }
        Cli::CreateSuperuser { username, password } => {
            let create_account = CreateAccount {
                username,
                password: read_password(password).await?,
                is_staff: None,
                is_superuser: None,
            };
            create_user(create_account, true, configuration).await?
        }
        Cli::SetPassword { username, password } => {
            let password = read_password(password).await?;
            create_account_manager(configuration)
                .await?
                .set_password(&username, password)
                .await?
        }
        Cli::CheckCredentials { username, password } => {
            let password = read_password(password).await?;
            check_credentials(username, password, configuration).await?
        }
        Cli::ValidateUsernames => validate_usernames(configuration).await?,
        Cli::RunInternalIntegrationTests => run_internal_integration_tests(configuration).await?,
    }

    Ok(())
}

async fn create_account_manager(
    configuration: &Configuration,
) -> AccountsResult<AccountManager<PostgresAccountStore>> {
    let database_connection_pool = create_async_database_connection_pool(configuration).await?;
    Ok(AccountManager::new(
        PostgresAccountStore::new(database_connection_pool, configuration),
        configuration.clone(),
    ))
}

/// Use the given password, or read it from stdin without its trailing line break.
async fn read_password(password: Option<SecureBytes>) -> AccountsResult<SecureBytes> {
    if let Some(password) = password {
        return Ok(password);
    }

    let mut password = Vec::new();
    stdin().read_to_end(&mut password).await.map_err(|error| {
        AccountsError::ReadPasswordFromStdin {
            source: Box::new(error),
        }
    })?;

    if password.last() == Some(&b'\n') {
        password.pop();
        if password.last() == Some(&b'\r') {
            password.pop();
        }
    }

    Ok(SecureBytes::from(password))
}

#[instrument(err, skip(configuration))]
async fn apply_pending_database_migrations(configuration: &Configuration) -> AccountsResult<()> {
    if has_missing_migrations(configuration).await? {
        info!("Executing missing database migrations");
        run_migrations(configuration).await?;
        info!("Success!");
    } else {
        info!("No missing migrations");
    }

    Ok(())
}

#[instrument(err, skip(create_account, configuration), fields(username = %create_account.username))]
async fn create_user(
    create_account: CreateAccount,
    superuser: bool,
    configuration: &Configuration,
) -> AccountsResult<()> {
    let manager = create_account_manager(configuration).await?;
    let extra_fields = ExtraFields {
        is_active: None,
        is_staff: create_account.is_staff,
        is_superuser: create_account.is_superuser,
    };

    let account = if superuser {
        manager
            .create_superuser(
                Some(create_account.username.as_str()),
                Some(create_account.password),
                extra_fields,
            )
            .await?
    } else {
        manager
            .create_user(
                Some(create_account.username.as_str()),
                Some(create_account.password),
                extra_fields,
            )
            .await?
    };

    info!(
        "Created account {:?} with id {:?}",
        account.username.as_ref(),
        account.id
    );
    if let Err(error) = manager.full_clean(&account).await {
        warn!("The new account does not pass validation: {error}");
    }

    Ok(())
}

#[instrument(err, skip(password, configuration))]
async fn check_credentials(
    username: String,
    password: SecureBytes,
    configuration: &Configuration,
) -> AccountsResult<()> {
    let manager = create_account_manager(configuration).await?;
    let mut form = AuthenticationForm::new(Login {
        username: Some(username),
        password: Some(password),
    });

    if form.is_valid(&manager).await? {
        if let Some(account) = form.account() {
            let mut account = account.clone();
            manager.record_login(&mut account).await?;
            info!(
                "Credentials are valid for {:?} (staff: {}, superuser: {})",
                account.username.as_ref(),
                account.is_staff,
                account.is_superuser
            );
        }
    } else {
        for (field, message) in form.errors().iter() {
            warn!("{field}: {message}");
        }
    }

    Ok(())
}

#[instrument(err, skip(configuration))]
async fn validate_usernames(configuration: &Configuration) -> AccountsResult<()> {
    let manager = create_account_manager(configuration).await?;

    let mut invalid_count = 0usize;
    for account in manager.all().await? {
        match manager.full_clean(&account).await {
            Ok(()) => {}
            Err(AccountsError::Validation(errors)) => {
                invalid_count += 1;
                warn!("Account {:?} is invalid: {errors}", account.username.as_ref());
            }
            Err(error) => return Err(error),
        }
    }

    info!("Found {invalid_count} invalid accounts");
    Ok(())
}
