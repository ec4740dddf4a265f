use chrono::{DateTime, Utc};
use secure_string::SecureBytes;
use strum::{AsRefStr, Display, EnumString};

use crate::{
    configuration::Configuration,
    error::AccountsResult,
    model::validation::ValidationError,
};

use self::{
    password_hash::{PasswordHash, VerifyPasswordResult},
    username::Username,
};

pub mod password_hash;
pub mod username;

/// The storage-assigned identifier of an account.
pub type AccountId = i64;

/// The fields an account is created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AccountField {
    Username,
    Password,
}

/// Optional attributes passed along when creating an account.
/// Fields left at `None` take the account defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtraFields {
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
}

impl ExtraFields {
    pub fn with_is_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    pub fn with_is_staff(mut self, is_staff: bool) -> Self {
        self.is_staff = Some(is_staff);
        self
    }

    pub fn with_is_superuser(mut self, is_superuser: bool) -> Self {
        self.is_superuser = Some(is_superuser);
        self
    }
}

/// A user of the application, identified by its username.
#[derive(Debug, Clone)]
pub struct Account {
    /// `None` until the account was saved for the first time.
    pub id: Option<AccountId>,
    pub username: Username,
    pub password_hash: PasswordHash,
    pub is_active: bool,
    /// Designates whether the user can log into the admin site.
    pub is_staff: bool,
    /// Designates that this user has all permissions without explicitly assigning them.
    pub is_superuser: bool,
    pub last_login: Option<DateTime<Utc>>,
}

impl Account {
    /// The name of the field used as natural identifier for authentication.
    pub const USERNAME_FIELD: &'static str = "username";

    /// An unsaved account with an unusable password.
    pub fn new(username: Username, extra_fields: ExtraFields) -> Self {
        Self {
            id: None,
            username,
            password_hash: PasswordHash::unusable(),
            is_active: extra_fields.is_active.unwrap_or(true),
            is_staff: extra_fields.is_staff.unwrap_or(false),
            is_superuser: extra_fields.is_superuser.unwrap_or(false),
            last_login: None,
        }
    }

    pub fn natural_key(&self) -> &str {
        self.username.as_ref()
    }

    pub fn set_password(
        &mut self,
        plaintext_password: SecureBytes,
        configuration: impl AsRef<Configuration>,
    ) -> AccountsResult<()> {
        self.password_hash = PasswordHash::new(plaintext_password, configuration)?;
        Ok(())
    }

    /// Verify the password, upgrading the in-memory hash if the hashing parameters changed.
    /// The caller is responsible for saving the account if [`VerifyPasswordResult::modified`] is set.
    pub fn verify_password(
        &mut self,
        plaintext_password: SecureBytes,
        configuration: impl AsRef<Configuration>,
    ) -> AccountsResult<VerifyPasswordResult> {
        self.password_hash.verify(plaintext_password, configuration)
    }

    pub fn check_password(
        &mut self,
        plaintext_password: SecureBytes,
        configuration: impl AsRef<Configuration>,
    ) -> AccountsResult<bool> {
        Ok(self
            .verify_password(plaintext_password, configuration)?
            .matches)
    }

    pub fn set_unusable_password(&mut self) {
        self.password_hash = PasswordHash::unusable();
    }

    pub fn has_usable_password(&self) -> bool {
        self.password_hash.is_usable()
    }

    /// There are no permission tables, so only active superusers hold permissions.
    pub fn has_perm(&self, _permission: &str) -> bool {
        self.is_active && self.is_superuser
    }

    pub fn has_module_perms(&self, _module: &str) -> bool {
        self.is_active && self.is_superuser
    }

    /// Check all field rules that do not need storage access.
    pub fn clean_fields(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        for message in self.username.clean() {
            errors.add(AccountField::Username.to_string(), message);
        }
        errors.into_result()
    }
}

/// Accounts are equal if they are the same stored record.
impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.id.is_some() && self.id == other.id
    }
}
