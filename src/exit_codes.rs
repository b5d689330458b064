//! Stable exit codes for `loan-engine` commands.

use crate::error::LoanError;

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid input or a rejected business rule (bad transition, overfunding, ...).
pub const INVALID: i32 = 1;
/// The referenced loan does not exist.
pub const NOT_FOUND: i32 = 2;
/// Storage, configuration or other internal failure.
pub const FAILURE: i32 = 3;

pub fn for_error(err: &LoanError) -> i32 {
    match err {
        LoanError::NotFound(_) => NOT_FOUND,
        err if err.is_caller_error() => INVALID,
        _ => FAILURE,
    }
}
