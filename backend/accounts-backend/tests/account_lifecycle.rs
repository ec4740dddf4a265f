use accounts_backend::{
    Account, AccountManager, AccountStore, AuthenticationForm, Configuration, ExtraFields,
    InMemoryAccountStore,
};
use api_commands::Login;
use secure_string::SecureBytes;

fn secure(password: &str) -> SecureBytes {
    SecureBytes::from(password.as_bytes().to_vec())
}

fn manager() -> AccountManager<InMemoryAccountStore> {
    AccountManager::new(
        InMemoryAccountStore::new(),
        Configuration::test_configuration(),
    )
}

#[test]
fn test_username_field() {
    assert_eq!(Account::USERNAME_FIELD, "username");
}

#[tokio::test]
async fn test_signup_and_login() {
    let manager = manager();
    let account = manager
        .create_user(
            Some("myusername"),
            Some(secure("secure-password")),
            ExtraFields::default(),
        )
        .await
        .unwrap();
    assert_eq!(account.username.as_ref(), "myusername");
    assert!(account.is_active);
    assert!(!account.is_staff);

    let mut form = AuthenticationForm::new(Login::new("myusername", "secure-password"));
    assert!(form.is_valid(&manager).await.unwrap());
    assert_eq!(form.account(), Some(&account));

    let mut form = AuthenticationForm::new(Login::new("myusername", "wrong-password"));
    assert!(!form.is_valid(&manager).await.unwrap());
    assert_eq!(
        form.errors().non_field_errors(),
        ["Please enter a correct username and password. Note that both fields may be case-sensitive."]
    );
}

#[tokio::test]
async fn test_mixed_case_signup_logs_in_only_with_stored_case() {
    let manager = manager();
    manager
        .create_user(Some("JohnDoe"), Some(secure("pw")), ExtraFields::default())
        .await
        .unwrap();

    let stored = manager.store().find_by_username("johndoe").await.unwrap();
    assert_eq!(stored.unwrap().username.as_ref(), "johndoe");

    let mut form = AuthenticationForm::new(Login::new("johndoe", "pw"));
    assert!(form.is_valid(&manager).await.unwrap());

    for username in ["JohnDoe", "JOHNDOE"] {
        let mut form = AuthenticationForm::new(Login::new(username, "pw"));
        assert!(!form.is_valid(&manager).await.unwrap(), "{username}");
        assert_eq!(
            form.errors().non_field_errors(),
            ["Please enter a correct username and password. Note that both fields may be case-sensitive."]
        );
    }
}

#[tokio::test]
async fn test_failed_creations_leave_no_record() {
    let manager = manager();
    manager
        .create_user(Some("taken"), Some(secure("pw")), ExtraFields::default())
        .await
        .unwrap();

    assert!(manager
        .create_user(Some("Taken"), Some(secure("pw")), ExtraFields::default())
        .await
        .is_err());
    assert!(manager
        .create_user(Some(""), Some(secure("pw")), ExtraFields::default())
        .await
        .is_err());
    assert!(manager
        .create_user(Some("nopassword"), None, ExtraFields::default())
        .await
        .is_err());
    assert!(manager
        .create_user(
            Some("x".repeat(51).as_str()),
            Some(secure("pw")),
            ExtraFields::default()
        )
        .await
        .is_err());

    assert_eq!(manager.count().await.unwrap(), 1);
    assert_eq!(manager.store().write_count().unwrap(), 1);
}

#[tokio::test]
async fn test_non_alphanumeric_username_is_stored_until_validated() {
    let manager = manager();
    let account = manager
        .create_user(Some("my-username"), Some(secure("pw")), ExtraFields::default())
        .await
        .unwrap();
    assert_eq!(manager.count().await.unwrap(), 1);

    let error = manager.full_clean(&account).await.unwrap_err();
    assert!(error
        .to_string()
        .contains("Only alphanumeric characters are allowed."));
}
