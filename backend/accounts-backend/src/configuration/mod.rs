use std::{env::VarError, error::Error, str::FromStr, time::Duration};

use secure_string::{SecureBytes, SecureString};

use crate::error::{AccountsError, AccountsResult};

/// The configuration of the application.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// The url to access postgres.
    pub postgres_url: SecureString,

    /// The url to send opentelemetry to.
    pub opentelemetry_url: Option<String>,

    /// The amount of time to wait for processes to shutdown gracefully.
    pub shutdown_timeout: Duration,

    /// The maximum number of retries for a failed transaction.
    pub maximum_transaction_retry_count: u64,

    /// The maximum number of connections in the database connection pool.
    pub database_pool_size: usize,

    /// The secret mixed into every password hash.
    pub password_pepper: SecureBytes,

    /// The amount of memory used by argon2id, in KiB.
    pub password_argon2id_minimum_memory_size: u32,

    /// The number of passes argon2id makes over the memory.
    pub password_argon2id_minimum_iterations: u32,

    /// The degree of parallelism of argon2id.
    pub password_argon2id_parallelism: u32,
}

impl Configuration {
    /// Read the configuration values from environment variables.
    pub fn from_environment() -> AccountsResult<Self> {
        let result = Self {
            postgres_url: read_env_var_with_default(
                "POSTGRES_ACCOUNTS_URL",
                "postgres://accounts@localhost/accounts",
            )?
            .into(),
            opentelemetry_url: read_optional_env_var("OPENTELEMETRY_URL")?,
            shutdown_timeout: Duration::from_secs(read_env_var_with_default_as_type(
                "ACCOUNTS_SHUTDOWN_TIMEOUT",
                30u64,
            )?),
            maximum_transaction_retry_count: read_env_var_with_default_as_type(
                "MAXIMUM_TRANSACTION_RETRY_COUNT",
                10u64,
            )?,
            database_pool_size: read_env_var_with_default_as_type("DATABASE_POOL_SIZE", 8usize)?,
            password_pepper: read_env_var_with_default("PASSWORD_PEPPER", "")?
                .into_bytes()
                .into(),
            password_argon2id_minimum_memory_size: read_env_var_with_default_as_type(
                "PASSWORD_ARGON2ID_MEMORY_KIB",
                argon2::Params::DEFAULT_M_COST,
            )?,
            password_argon2id_minimum_iterations: read_env_var_with_default_as_type(
                "PASSWORD_ARGON2ID_ITERATIONS",
                argon2::Params::DEFAULT_T_COST,
            )?,
            password_argon2id_parallelism: read_env_var_with_default_as_type(
                "PASSWORD_ARGON2ID_PARALLELISM",
                argon2::Params::DEFAULT_P_COST,
            )?,
        };

        result.verify()?;
        Ok(result)
    }

    /// A configuration with cheap password hashing parameters and no database access.
    /// Hashes created with it are still valid argon2id hashes.
    pub fn test_configuration() -> Self {
        Self {
            postgres_url: String::from("postgres://accounts@localhost/accounts").into(),
            opentelemetry_url: None,
            shutdown_timeout: Duration::from_secs(1),
            maximum_transaction_retry_count: 3,
            database_pool_size: 2,
            password_pepper: b"test-pepper".to_vec().into(),
            password_argon2id_minimum_memory_size: argon2::Params::MIN_M_COST * 8,
            password_argon2id_minimum_iterations: argon2::Params::MIN_T_COST,
            password_argon2id_parallelism: argon2::Params::MIN_P_COST,
        }
    }

    fn verify(&self) -> AccountsResult<()> {
        if self.database_pool_size == 0 {
            return Err(AccountsError::InvalidConfiguration {
                message: "database_pool_size must be at least one".to_string(),
            });
        }

        self.build_argon2_parameters().map_err(|error| AccountsError::InvalidConfiguration {
            message: format!("invalid argon2id parameters: {error}"),
        })?;

        Ok(())
    }

    pub fn build_argon2_parameters(&self) -> AccountsResult<argon2::Params> {
        argon2::Params::new(
            self.password_argon2id_minimum_memory_size,
            self.password_argon2id_minimum_iterations,
            self.password_argon2id_parallelism,
            Some(argon2::Params::DEFAULT_OUTPUT_LEN),
        )
        .map_err(|error| AccountsError::PasswordArgon2IdParameters {
            source: Box::new(error),
        })
    }
}

impl AsRef<Configuration> for Configuration {
    fn as_ref(&self) -> &Configuration {
        self
    }
}

fn read_optional_env_var(key: &str) -> AccountsResult<Option<String>> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(value)) => Err(AccountsError::MalformedEnvironmentVariable {
            key: key.to_string(),
            value: value.clone(),
            source: Box::new(VarError::NotUnicode(value)),
        }),
    }
}

fn read_env_var_with_default(key: &str, default: impl Into<String>) -> AccountsResult<String> {
    Ok(read_optional_env_var(key)?.unwrap_or_else(|| default.into()))
}

fn read_env_var_with_default_as_type<T: FromStr>(
    key: &str,
    default: impl Into<T>,
) -> AccountsResult<T>
where
    <T as FromStr>::Err: 'static + Error + Send + Sync,
{
    match read_optional_env_var(key)? {
        Some(value) => value
            .parse()
            .map_err(|error| AccountsError::MalformedEnvironmentVariable {
                key: key.to_string(),
                value: value.into(),
                source: Box::new(error),
            }),
        None => Ok(default.into()),
    }
}
