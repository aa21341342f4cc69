//! Transaction record module split into types and validation

pub mod types;
pub mod validation;

pub use types::*;
pub use validation::{normalize_tx_params, validate_tx_params};
