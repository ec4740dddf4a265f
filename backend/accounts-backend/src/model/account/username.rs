use std::fmt::Display;

/// The maximum length of a username in unicode code points.
/// This limit is enforced by the storage layer.
pub const USERNAME_MAX_LENGTH: usize = 50;

pub const BLANK_MESSAGE: &str = "This field cannot be blank.";
pub const NON_ALPHANUMERIC_MESSAGE: &str = "Only alphanumeric characters are allowed.";

pub fn max_length_message(length: usize) -> String {
    format!("Ensure this value has at most {USERNAME_MAX_LENGTH} characters (it has {length}).")
}

/// The natural identifier of an account.
///
/// Creating a username performs no checks, those happen in [`Username::clean`] and in storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username {
    name: String,
}

impl Username {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Lowercase the username in place.
    pub fn normalize(&mut self) {
        self.name = self.name.to_lowercase();
    }

    pub fn len_chars(&self) -> usize {
        self.name.chars().count()
    }

    /// Collect the messages of every rule this username violates.
    ///
    /// A blank username only reports that it is blank.
    pub fn clean(&self) -> Vec<String> {
        if self.name.is_empty() {
            return vec![BLANK_MESSAGE.to_string()];
        }

        let mut messages = Vec::new();
        let length = self.len_chars();
        if length > USERNAME_MAX_LENGTH {
            messages.push(max_length_message(length));
        }
        if !self.name.chars().all(|character| character.is_ascii_alphanumeric()) {
            messages.push(NON_ALPHANUMERIC_MESSAGE.to_string());
        }
        messages
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.name
    }
}

impl From<String> for Username {
    fn from(name: String) -> Self {
        Self { name }
    }
}

impl From<&str> for Username {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{Username, BLANK_MESSAGE, NON_ALPHANUMERIC_MESSAGE, USERNAME_MAX_LENGTH};

    #[test]
    fn test_normalize_lowercases() {
        let mut username = Username::new("JohnDoe");
        username.normalize();
        assert_eq!(username.as_ref(), "johndoe");

        username.normalize();
        assert_eq!(username.as_ref(), "johndoe");
    }

    #[test]
    fn test_normalize_handles_non_ascii() {
        let mut username = Username::new("ÄRGER");
        username.normalize();
        assert_eq!(username.as_ref(), "ärger");
    }

    #[test]
    fn test_alphanumeric_username_is_clean() {
        assert!(Username::new("myusername42").clean().is_empty());
        assert!(Username::new("MyUserName").clean().is_empty());
    }

    #[rstest]
    #[case("my username")]
    #[case("my@username")]
    #[case("my-username")]
    #[case("my#username")]
    #[case("my!username")]
    #[case("my*username")]
    #[case("myüsername")]
    fn test_non_alphanumeric_username_is_rejected(#[case] name: &str) {
        assert_eq!(Username::new(name).clean(), [NON_ALPHANUMERIC_MESSAGE]);
    }

    #[test]
    fn test_blank_username_only_reports_blank() {
        assert_eq!(Username::new("").clean(), [BLANK_MESSAGE]);
    }

    #[test]
    fn test_length_limit() {
        let at_limit = Username::new("u".repeat(USERNAME_MAX_LENGTH));
        assert!(at_limit.clean().is_empty());

        let beyond_limit = Username::new(format!("{}-", "u".repeat(USERNAME_MAX_LENGTH)));
        assert_eq!(
            beyond_limit.clean(),
            [
                "Ensure this value has at most 50 characters (it has 51).",
                NON_ALPHANUMERIC_MESSAGE
            ]
        );
    }
}
