use chrono::Utc;
use secure_string::SecureBytes;
use tracing::{debug, info, instrument};

use crate::{
    configuration::Configuration,
    error::{AccountsError, AccountsResult},
    model::account::{
        password_hash::PasswordHash, username::Username, Account, AccountField, ExtraFields,
    },
    storage::{AccountStore, StorageError},
};

/// The only way to create accounts.
///
/// Checks the creation preconditions before anything is hashed or stored,
/// and normalizes usernames on every save.
#[derive(Debug, Clone)]
pub struct AccountManager<Store> {
    store: Store,
    configuration: Configuration,
}

impl<Store: AccountStore> AccountManager<Store> {
    pub fn new(store: Store, configuration: Configuration) -> Self {
        Self {
            store,
            configuration,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Create and save an account with the given username and password.
    ///
    /// Fails with [`AccountsError::MissingField`] if either is absent or empty.
    #[instrument(err, skip(self, password))]
    pub async fn create_user(
        &self,
        username: Option<&str>,
        password: Option<SecureBytes>,
        extra_fields: ExtraFields,
    ) -> AccountsResult<Account> {
        let username = match username {
            Some(username) if !username.is_empty() => username,
            _ => {
                return Err(AccountsError::MissingField {
                    field: AccountField::Username,
                })
            }
        };
        let password = match password {
            Some(password) if !password.unsecure().is_empty() => password,
            _ => {
                return Err(AccountsError::MissingField {
                    field: AccountField::Password,
                })
            }
        };

        let mut account = Account::new(Username::new(username), extra_fields);
        account.set_password(password, &self.configuration)?;
        self.save(&mut account).await?;

        info!("Created account {:?}", account.username.as_ref());
        Ok(account)
    }

    /// Like [`Self::create_user`], but `is_staff` and `is_superuser` default to `true`.
    #[instrument(err, skip(self, password))]
    pub async fn create_superuser(
        &self,
        username: Option<&str>,
        password: Option<SecureBytes>,
        mut extra_fields: ExtraFields,
    ) -> AccountsResult<Account> {
        extra_fields.is_staff.get_or_insert(true);
        extra_fields.is_superuser.get_or_insert(true);

        self.create_user(username, password, extra_fields).await
    }

    /// Persist the account, inserting it if it has no id yet.
    /// The username is lowercased before every write.
    #[instrument(err, skip(self, account), fields(id = ?account.id))]
    pub async fn save(&self, account: &mut Account) -> AccountsResult<()> {
        account.username.normalize();

        match account.id {
            Some(id) => self.store.update(id, account).await?,
            None => account.id = Some(self.store.insert(account).await?),
        }

        Ok(())
    }

    /// Run all validation rules, including uniqueness of the username.
    ///
    /// This is never done by [`Self::save`], so accounts violating these rules can be stored.
    #[instrument(err, skip(self, account), fields(id = ?account.id))]
    pub async fn full_clean(&self, account: &Account) -> AccountsResult<()> {
        let mut errors = account.clean_fields().err().unwrap_or_default();

        let username_field = AccountField::Username.to_string();
        if !errors.contains_field(&username_field) {
            if let Some(existing) = self.store.find_by_username(account.username.as_ref()).await? {
                if existing.id != account.id {
                    errors.add(
                        username_field,
                        StorageError::UniqueViolation {
                            field: AccountField::Username,
                        }
                        .to_string(),
                    );
                }
            }
        }

        Ok(errors.into_result()?)
    }

    /// Exact lookup by username.
    pub async fn get_by_natural_key(&self, username: &str) -> AccountsResult<Option<Account>> {
        Ok(self.store.find_by_username(username).await?)
    }

    pub async fn count(&self) -> AccountsResult<u64> {
        Ok(self.store.count().await?)
    }

    /// All accounts in creation order.
    pub async fn all(&self) -> AccountsResult<Vec<Account>> {
        Ok(self.store.list().await?)
    }

    /// Check the credentials and return the account if they are correct and the account is active.
    ///
    /// The username is matched exactly, so a login with different case fails.
    /// If the stored hash was created with outdated parameters, the account is saved with a new hash.
    #[instrument(err, skip(self, password))]
    pub async fn authenticate(
        &self,
        username: &str,
        password: SecureBytes,
    ) -> AccountsResult<Option<Account>> {
        let Some(mut account) = self.store.find_by_username(username).await? else {
            // hash once anyways, such that the response time does not reveal which usernames exist
            PasswordHash::new(password, &self.configuration)?;
            debug!("No account with the given username");
            return Ok(None);
        };

        let verify_result = account.verify_password(password, &self.configuration)?;
        if verify_result.modified {
            debug!("Password hash parameters changed, saving new hash");
            self.save(&mut account).await?;
        }

        if !verify_result.matches {
            debug!("Wrong password");
            return Ok(None);
        }
        if !account.is_active {
            debug!("Account is inactive");
            return Ok(None);
        }

        Ok(Some(account))
    }

    /// Set the password of an existing account and save it.
    #[instrument(err, skip(self, password))]
    pub async fn set_password(&self, username: &str, password: SecureBytes) -> AccountsResult<()> {
        let mut account = self
            .store
            .find_by_username(username)
            .await?
            .ok_or_else(|| AccountsError::UnknownAccount {
                username: username.to_string(),
            })?;

        account.set_password(password, &self.configuration)?;
        self.save(&mut account).await
    }

    /// Stamp the current time as last login and save the account.
    #[instrument(err, skip(self, account), fields(id = ?account.id))]
    pub async fn record_login(&self, account: &mut Account) -> AccountsResult<()> {
        account.last_login = Some(Utc::now());
        self.save(account).await
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use secure_string::SecureBytes;

    use super::AccountManager;
    use crate::{
        configuration::Configuration,
        error::AccountsError,
        model::account::{username::NON_ALPHANUMERIC_MESSAGE, AccountField, ExtraFields},
        storage::{AccountStore, InMemoryAccountStore},
    };

    fn secure(password: &str) -> SecureBytes {
        password.as_bytes().to_vec().into()
    }

    fn manager() -> AccountManager<InMemoryAccountStore> {
        AccountManager::new(
            InMemoryAccountStore::new(),
            Configuration::test_configuration(),
        )
    }

    #[tokio::test]
    async fn test_create_user_with_valid_credentials() {
        let manager = manager();
        let account = manager
            .create_user(
                Some("myusername"),
                Some(secure("secure-password")),
                ExtraFields::default(),
            )
            .await
            .unwrap();

        assert_eq!(manager.count().await.unwrap(), 1);
        assert_eq!(manager.store().write_count().unwrap(), 1);

        let mut saved = manager.all().await.unwrap().remove(0);
        assert_eq!(saved, account);
        assert_eq!(saved.username.as_ref(), "myusername");
        assert!(saved
            .check_password(secure("secure-password"), manager.configuration())
            .unwrap());
        assert!(saved.is_active);
        assert!(!saved.is_staff);
        assert!(!saved.is_superuser);
    }

    #[tokio::test]
    async fn test_create_superuser_with_valid_credentials() {
        let manager = manager();
        manager
            .create_user(Some("myusername"), Some(secure("pw")), ExtraFields::default())
            .await
            .unwrap();
        let superuser = manager
            .create_superuser(
                Some("mysuperusername"),
                Some(secure("secure-superpassword")),
                ExtraFields::default(),
            )
            .await
            .unwrap();

        assert_eq!(manager.count().await.unwrap(), 2);
        let mut saved = manager.all().await.unwrap().pop().unwrap();
        assert_eq!(saved, superuser);
        assert_eq!(saved.username.as_ref(), "mysuperusername");
        assert!(saved
            .check_password(secure("secure-superpassword"), manager.configuration())
            .unwrap());
        assert!(saved.is_active);
        assert!(saved.is_staff);
        assert!(saved.is_superuser);
    }

    #[tokio::test]
    async fn test_create_superuser_keeps_supplied_flags() {
        let manager = manager();
        let account = manager
            .create_superuser(
                Some("limited"),
                Some(secure("pw")),
                ExtraFields::default().with_is_superuser(false),
            )
            .await
            .unwrap();
        assert!(account.is_staff);
        assert!(!account.is_superuser);
    }

    #[tokio::test]
    async fn test_username_must_be_unique() {
        let manager = manager();
        manager
            .create_user(Some("myusername"), Some(secure("pw")), ExtraFields::default())
            .await
            .unwrap();

        let error = manager
            .create_user(Some("MyUserName"), Some(secure("pw")), ExtraFields::default())
            .await
            .unwrap_err();
        assert!(error.is_unique_violation(), "{error:?}");
        assert_eq!(error.to_string(), "A user with that username already exists.");
        assert_eq!(manager.count().await.unwrap(), 1);
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[tokio::test]
    async fn test_create_user_without_username_raises_error(#[case] username: Option<&str>) {
        let manager = manager();
        let error = manager
            .create_user(username, Some(secure("secure-password")), ExtraFields::default())
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            AccountsError::MissingField {
                field: AccountField::Username
            }
        ));
        assert_eq!(error.to_string(), "The field 'username' must be specified.");
        assert_eq!(manager.store().write_count().unwrap(), 0);
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[tokio::test]
    async fn test_create_user_without_password_raises_error(#[case] password: Option<&str>) {
        let manager = manager();
        let error = manager
            .create_user(Some("johndoe"), password.map(secure), ExtraFields::default())
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            AccountsError::MissingField {
                field: AccountField::Password
            }
        ));
        assert_eq!(error.to_string(), "The field 'password' must be specified.");
        assert_eq!(manager.store().write_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_username_is_saved_as_lowercase() {
        let manager = manager();
        let account = manager
            .create_user(Some("JohnDoe"), Some(secure("pw")), ExtraFields::default())
            .await
            .unwrap();
        assert_eq!(account.username.as_ref(), "johndoe");

        let found = manager.get_by_natural_key("johndoe").await.unwrap().unwrap();
        assert_eq!(found, account);
    }

    #[tokio::test]
    async fn test_resave_lowercases_assigned_username() {
        let manager = manager();
        let mut account = manager
            .create_user(Some("johndoe"), Some(secure("pw")), ExtraFields::default())
            .await
            .unwrap();

        account.username = "JaneDoe".into();
        manager.save(&mut account).await.unwrap();
        manager.save(&mut account).await.unwrap();

        assert_eq!(account.username.as_ref(), "janedoe");
        assert_eq!(manager.count().await.unwrap(), 1);
        let stored = manager
            .store()
            .find_by_id(account.id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.username.as_ref(), "janedoe");
    }

    #[tokio::test]
    async fn test_username_exceeding_max_length_raises_error() {
        let manager = manager();
        manager
            .create_user(
                Some("u".repeat(50).as_str()),
                Some(secure("secure-password")),
                ExtraFields::default(),
            )
            .await
            .unwrap();

        let error = manager
            .create_user(
                Some("u".repeat(51).as_str()),
                Some(secure("secure-password")),
                ExtraFields::default(),
            )
            .await
            .unwrap_err();
        assert!(error.is_data_error(), "{error:?}");
        assert!(!error.is_unique_violation());
    }

    #[rstest]
    #[case("my username")]
    #[case("my@username")]
    #[case("my-username")]
    #[case("my#username")]
    #[case("my!username")]
    #[case("my*username")]
    #[tokio::test]
    async fn test_full_clean_rejects_non_alphanumeric(#[case] username: &str) {
        let manager = manager();
        // saving does not validate
        let account = manager
            .create_user(Some(username), Some(secure("secure-password")), ExtraFields::default())
            .await
            .unwrap();

        let error = manager.full_clean(&account).await.unwrap_err();
        assert!(matches!(error, AccountsError::Validation(_)));
        assert!(error.to_string().contains(NON_ALPHANUMERIC_MESSAGE));
    }

    #[tokio::test]
    async fn test_full_clean_checks_uniqueness() {
        let manager = manager();
        let account = manager
            .create_user(Some("johndoe"), Some(secure("pw")), ExtraFields::default())
            .await
            .unwrap();
        manager.full_clean(&account).await.unwrap();

        let unsaved = crate::model::account::Account::new("johndoe".into(), ExtraFields::default());
        let error = manager.full_clean(&unsaved).await.unwrap_err();
        let errors = match error {
            AccountsError::Validation(errors) => errors,
            other => panic!("unexpected error {other:?}"),
        };
        assert_eq!(
            errors.messages("username"),
            ["A user with that username already exists."]
        );

        // the stored value is compared as given, before lowercasing
        let mixed_case = crate::model::account::Account::new("JohnDoe".into(), ExtraFields::default());
        manager.full_clean(&mixed_case).await.unwrap();
    }

    #[tokio::test]
    async fn test_authenticate() {
        let manager = manager();
        manager
            .create_user(Some("JohnDoe"), Some(secure("pw")), ExtraFields::default())
            .await
            .unwrap();

        assert!(manager
            .authenticate("johndoe", secure("pw"))
            .await
            .unwrap()
            .is_some());
        assert!(manager
            .authenticate("JOHNDOE", secure("pw"))
            .await
            .unwrap()
            .is_none());
        assert!(manager
            .authenticate("johndoe", secure("wrong"))
            .await
            .unwrap()
            .is_none());
        assert!(manager
            .authenticate("nobody", secure("pw"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_authenticate_upgrades_outdated_hash() {
        let manager = manager();
        manager
            .create_user(Some("johndoe"), Some(secure("pw")), ExtraFields::default())
            .await
            .unwrap();

        let mut stronger_configuration = manager.configuration().clone();
        stronger_configuration.password_argon2id_minimum_iterations += 1;
        let stronger_manager = AccountManager::new(manager.store().clone(), stronger_configuration);

        let writes_before = manager.store().write_count().unwrap();
        assert!(stronger_manager
            .authenticate("johndoe", secure("pw"))
            .await
            .unwrap()
            .is_some());
        assert_eq!(manager.store().write_count().unwrap(), writes_before + 1);

        let stored = manager.get_by_natural_key("johndoe").await.unwrap().unwrap();
        assert!(stored.password_hash.as_str().unwrap().contains("t=2"));
    }

    #[tokio::test]
    async fn test_authenticate_with_current_parameters_does_not_write() {
        let manager = manager();
        manager
            .create_user(Some("johndoe"), Some(secure("pw")), ExtraFields::default())
            .await
            .unwrap();

        let writes_before = manager.store().write_count().unwrap();
        for _ in 0..3 {
            assert!(manager
                .authenticate("johndoe", secure("pw"))
                .await
                .unwrap()
                .is_some());
        }
        assert_eq!(manager.store().write_count().unwrap(), writes_before);
    }

    #[tokio::test]
    async fn test_set_password_and_record_login() {
        let manager = manager();
        manager
            .create_user(Some("johndoe"), Some(secure("old")), ExtraFields::default())
            .await
            .unwrap();

        manager.set_password("johndoe", secure("new")).await.unwrap();
        let mut account = manager
            .authenticate("johndoe", secure("new"))
            .await
            .unwrap()
            .unwrap();
        assert!(account.last_login.is_none());

        manager.record_login(&mut account).await.unwrap();
        let stored = manager.get_by_natural_key("johndoe").await.unwrap().unwrap();
        assert!(stored.last_login.is_some());

        assert!(matches!(
            manager.set_password("nobody", secure("new")).await,
            Err(AccountsError::UnknownAccount { .. })
        ));
    }
}
