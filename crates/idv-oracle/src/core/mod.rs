//! Core logic for the development oracle

mod validation;

pub use validation::{validate_submission, Rejection};
