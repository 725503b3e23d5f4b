use thiserror::Error;

use crate::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{actual}' does not satisfy '{required}'")]
    InsufficientRole { required: Role, actual: Role },
}

/// Check that `actual` ranks at least as high as `required`.
///
/// - No IO
/// - No panics
pub fn authorize_role(actual: Role, required: Role) -> Result<(), AuthzError> {
    if actual.satisfies(required) {
        Ok(())
    } else {
        Err(AuthzError::InsufficientRole { required, actual })
    }
}
