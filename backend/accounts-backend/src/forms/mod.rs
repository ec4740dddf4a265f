//! Forms binding user input to account operations.

pub mod authentication;
