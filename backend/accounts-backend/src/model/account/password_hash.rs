use argon2::Argon2;
use argon2::PasswordHasher;
use password_hash::PasswordVerifier;
use password_hash::{rand_core::OsRng, SaltString};
use secure_string::{SecureBytes, SecureString};

use crate::{
    configuration::Configuration,
    error::{AccountsError, AccountsResult},
};

static HASH_ALGORITHM: argon2::Algorithm = argon2::Algorithm::Argon2id;
static HASH_ALGORITHM_VERSION: argon2::Version = argon2::Version::V0x13;

/// An argon2id hash in PHC string format, or nothing if the password is unusable.
#[derive(Debug, Clone)]
pub struct PasswordHash {
    argon_hash: Option<SecureString>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct VerifyPasswordResult {
    /// True if the password matches the hash.
    pub matches: bool,
    /// True if the hash was recomputed because the hashing parameters changed.
    pub modified: bool,
}

impl PasswordHash {
    pub fn new(
        plaintext_password: SecureBytes,
        configuration: impl AsRef<Configuration>,
    ) -> AccountsResult<Self> {
        let configuration = configuration.as_ref();
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = build_argon2(configuration)?;

        let argon_hash = argon2
            .hash_password(plaintext_password.unsecure(), &salt)
            .map_err(|error| AccountsError::PasswordArgon2IdHash {
                source: Box::new(error),
            })?
            .to_string()
            .into();

        Ok(Self {
            argon_hash: Some(argon_hash),
        })
    }

    /// A hash that no password matches.
    pub fn unusable() -> Self {
        Self { argon_hash: None }
    }

    pub fn is_usable(&self) -> bool {
        self.argon_hash.is_some()
    }

    pub fn verify(
        &mut self,
        plaintext_password: SecureBytes,
        configuration: impl AsRef<Configuration>,
    ) -> AccountsResult<VerifyPasswordResult> {
        let Some(argon_hash) = &self.argon_hash else {
            return Ok(VerifyPasswordResult {
                matches: false,
                modified: false,
            });
        };

        let parsed_hash = argon2::password_hash::PasswordHash::new(argon_hash.unsecure())
            .map_err(|error| AccountsError::PasswordArgon2IdVerify {
                source: Box::new(error),
            })?;

        // the parameters stored in the hash are used for verification, only the pepper is taken from the configuration
        let verify_result = build_argon2(configuration.as_ref())?
            .verify_password(plaintext_password.unsecure(), &parsed_hash);

        match verify_result {
            Ok(()) => {
                let modified = did_parameters_change(&parsed_hash, configuration.as_ref())?;
                if modified {
                    *self = Self::new(plaintext_password, configuration)?;
                }
                Ok(VerifyPasswordResult {
                    matches: true,
                    modified,
                })
            }
            Err(password_hash::Error::Password) => Ok(VerifyPasswordResult {
                matches: false,
                modified: false,
            }),
            Err(error) => Err(AccountsError::PasswordArgon2IdVerify {
                source: Box::new(error),
            }),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.argon_hash.as_ref().map(|argon_hash| argon_hash.unsecure())
    }
}

fn build_argon2(configuration: &Configuration) -> AccountsResult<Argon2<'_>> {
    Argon2::new_with_secret(
        configuration.password_pepper.unsecure(),
        HASH_ALGORITHM,
        HASH_ALGORITHM_VERSION,
        configuration.build_argon2_parameters()?,
    )
    .map_err(|error| AccountsError::PasswordArgon2IdParameters {
        source: Box::new(error),
    })
}

/// Check if the password hashing parameters are different from the ones used for this hash.
fn did_parameters_change(
    parsed_hash: &argon2::password_hash::PasswordHash<'_>,
    configuration: &Configuration,
) -> AccountsResult<bool> {
    let algorithm_identifier = parsed_hash.algorithm;
    let algorithm_version = parsed_hash.version;
    let algorithm_parameters = argon2::Params::try_from(parsed_hash).map_err(|error| {
        AccountsError::PasswordArgon2IdRehash {
            source: Box::new(error),
        }
    })?;

    Ok(algorithm_identifier != HASH_ALGORITHM.ident()
        || algorithm_version != Some(HASH_ALGORITHM_VERSION.into())
        || algorithm_parameters != configuration.build_argon2_parameters()?)
}

impl From<PasswordHash> for Option<SecureString> {
    fn from(value: PasswordHash) -> Self {
        value.argon_hash
    }
}

impl From<Option<String>> for PasswordHash {
    fn from(value: Option<String>) -> Self {
        Self {
            argon_hash: value.map(Into::into),
        }
    }
}
