use secure_string::SecureBytes;
use serde::{Deserialize, Serialize};

/// Credentials submitted to log in.
///
/// Both fields may be absent, which the authentication form reports as a missing field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Login {
    pub username: Option<String>,
    pub password: Option<SecureBytes>,
}

impl Login {
    pub fn new(username: impl Into<String>, password: impl AsRef<str>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(SecureBytes::from(password.as_ref().as_bytes().to_vec())),
        }
    }
}

/// Request to create a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub username: String,
    pub password: SecureBytes,
    #[serde(default)]
    pub is_staff: Option<bool>,
    #[serde(default)]
    pub is_superuser: Option<bool>,
}
