use api_commands::Login;
use secure_string::SecureBytes;
use tracing::{debug, instrument};

use crate::{
    error::AccountsResult,
    manager::AccountManager,
    model::{
        account::{
            username::{max_length_message, USERNAME_MAX_LENGTH},
            Account, AccountField,
        },
        validation::{ValidationError, NON_FIELD_ERRORS},
    },
    storage::AccountStore,
};

pub const REQUIRED_MESSAGE: &str = "This field is required.";
pub const INVALID_LOGIN_MESSAGE: &str =
    "Please enter a correct username and password. Note that both fields may be case-sensitive.";

/// Validates a login attempt.
///
/// Both fields are required, then the credentials are checked with [`AccountManager::authenticate`].
#[derive(Debug)]
pub struct AuthenticationForm {
    data: Login,
    errors: Option<ValidationError>,
    account: Option<Account>,
}

impl AuthenticationForm {
    pub fn new(data: Login) -> Self {
        Self {
            data,
            errors: None,
            account: None,
        }
    }

    /// Validate the form once, later calls return the cached outcome.
    ///
    /// Storage and hashing failures are returned as `Err`, never as form errors.
    #[instrument(err, skip_all)]
    pub async fn is_valid<Store: AccountStore>(
        &mut self,
        manager: &AccountManager<Store>,
    ) -> AccountsResult<bool> {
        if self.errors.is_none() {
            self.full_clean(manager).await?;
        }

        Ok(self.errors().is_empty())
    }

    /// The errors found by [`Self::is_valid`], empty if the form was not validated yet.
    pub fn errors(&self) -> &ValidationError {
        static NOT_VALIDATED: ValidationError = ValidationError::empty();
        self.errors.as_ref().unwrap_or(&NOT_VALIDATED)
    }

    /// The authenticated account, if the form is valid.
    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    async fn full_clean<Store: AccountStore>(
        &mut self,
        manager: &AccountManager<Store>,
    ) -> AccountsResult<()> {
        let mut errors = ValidationError::default();
        let username = clean_username(self.data.username.as_deref(), &mut errors);
        let password = clean_password(self.data.password.as_ref(), &mut errors);

        if let (Some(username), Some(password)) = (username, password) {
            match manager.authenticate(username, password.clone()).await? {
                Some(account) => self.account = Some(account),
                None => {
                    debug!("Invalid login");
                    errors.add(NON_FIELD_ERRORS, INVALID_LOGIN_MESSAGE);
                }
            }
        }

        self.errors = Some(errors);
        Ok(())
    }
}

/// Surrounding whitespace is not part of a username.
fn clean_username<'a>(username: Option<&'a str>, errors: &mut ValidationError) -> Option<&'a str> {
    let field = AccountField::Username.to_string();
    let username = username.map(str::trim).unwrap_or_default();

    if username.is_empty() {
        errors.add(field, REQUIRED_MESSAGE);
        return None;
    }

    let length = username.chars().count();
    if length > USERNAME_MAX_LENGTH {
        errors.add(field, max_length_message(length));
        return None;
    }

    Some(username)
}

fn clean_password<'a>(
    password: Option<&'a SecureBytes>,
    errors: &mut ValidationError,
) -> Option<&'a SecureBytes> {
    match password {
        Some(password) if !password.unsecure().is_empty() => Some(password),
        _ => {
            errors.add(AccountField::Password.to_string(), REQUIRED_MESSAGE);
            None
        }
    }
}
