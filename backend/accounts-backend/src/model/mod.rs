pub mod account;
pub mod validation;
