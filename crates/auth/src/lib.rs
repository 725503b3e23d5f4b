//! `roster-auth`: authentication/authorization boundary for user accounts.
//!
//! This crate is intentionally decoupled from HTTP and storage: it knows how to
//! mint and verify tokens, hash passwords, rank roles and enforce the rules of
//! the `User` entity, but not where users live or how requests arrive.

pub mod authorize;
pub mod claims;
pub mod password;
pub mod roles;
pub mod user;

pub use authorize::{AuthzError, authorize_role};
pub use claims::{Hs256Jwt, JwtClaims, JwtValidator, TokenError, validate_claims};
pub use password::{PasswordError, PasswordHasher, PasswordParams};
pub use roles::{ParseRoleError, Role};
pub use user::{LOCAL_PROVIDER, NewUser, User, UserProfile, UserUpdate, normalize_email, validate_password};
