use std::{collections::BTreeMap, fmt::Display};

/// The key under which errors are stored that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "__all__";

/// Validation messages grouped by the field they belong to.
///
/// Used both for model validation and for form errors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub const fn empty() -> Self {
        Self {
            errors: BTreeMap::new(),
        }
    }

    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::default();
        result.add(field, message);
        result
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// The messages for the given field, empty if the field has no errors.
    pub fn messages(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn non_field_errors(&self) -> &[String] {
        self.messages(NON_FIELD_ERRORS)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors.iter().flat_map(|(field, messages)| {
            messages
                .iter()
                .map(move |message| (field.as_str(), message.as_str()))
        })
    }

    /// `Ok` if no errors were collected.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut once = false;
        for (field, message) in self.iter() {
            if once {
                write!(f, "; ")?;
            }
            once = true;

            if field == NON_FIELD_ERRORS {
                write!(f, "{message}")?;
            } else {
                write!(f, "{field}: {message}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::{ValidationError, NON_FIELD_ERRORS};

    #[test]
    fn test_messages_are_grouped_by_field() {
        let mut error = ValidationError::new("username", "first");
        error.add("username", "second");
        error.add(NON_FIELD_ERRORS, "general");

        assert_eq!(error.messages("username"), ["first", "second"]);
        assert_eq!(error.non_field_errors(), ["general"]);
        assert!(error.messages("password").is_empty());
        assert_eq!(error.to_string(), "general; username: first; username: second");
    }

    #[test]
    fn test_empty_error_is_ok() {
        assert_eq!(ValidationError::default().into_result(), Ok(()));
    }
}
