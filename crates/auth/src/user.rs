//! User account entity and the rules that guard its state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use roster_core::{DomainError, DomainResult, Entity, UserId};

use crate::Role;

/// Provider recorded for accounts that authenticate with email + password.
pub const LOCAL_PROVIDER: &str = "local";

// ─────────────────────────────────────────────────────────────────────────────
// Entity
// ─────────────────────────────────────────────────────────────────────────────

/// A user account.
///
/// # Invariants
/// - `email` is trimmed, lower-cased and contains `@`.
/// - `name` is never blank.
/// - `password_hash` is a PHC string; the plaintext is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub provider: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revision: u64,
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn revision(&self) -> u64 {
        self.revision
    }
}

/// Public view of a user (no credentials).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub provider: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a user. The password is still plaintext here.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Partial update of the mutable profile fields.
#[derive(Debug, Clone, Default)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.role.is_none()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────────

/// Trim and lower-case an email, rejecting obviously malformed input.
pub fn normalize_email(email: &str) -> DomainResult<String> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(DomainError::validation("email cannot be blank"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(DomainError::validation("invalid email format")),
    }
}

fn normalize_name(name: &str) -> DomainResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("name cannot be blank"));
    }
    Ok(name.to_string())
}

/// Reject blank passwords before they reach the hasher.
pub fn validate_password(password: &str) -> DomainResult<()> {
    if password.trim().is_empty() {
        return Err(DomainError::validation("password cannot be blank"));
    }
    Ok(())
}

impl NewUser {
    /// Validate the input; the caller hashes the password only after this passes.
    pub fn validate(&self) -> DomainResult<()> {
        normalize_name(&self.name)?;
        normalize_email(&self.email)?;
        validate_password(&self.password)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transitions
// ─────────────────────────────────────────────────────────────────────────────

impl User {
    /// Build a new local account from validated input and its password hash.
    pub fn register(input: &NewUser, password_hash: String, now: DateTime<Utc>) -> DomainResult<Self> {
        input.validate()?;

        Ok(Self {
            id: UserId::new(),
            name: normalize_name(&input.name)?,
            email: normalize_email(&input.email)?,
            role: input.role,
            provider: LOCAL_PROVIDER.to_string(),
            password_hash,
            created_at: now,
            updated_at: now,
            revision: 0,
        })
    }

    /// Apply a partial profile update. Nothing changes if validation fails.
    pub fn apply_update(&mut self, update: UserUpdate, now: DateTime<Utc>) -> DomainResult<()> {
        if update.is_empty() {
            return Err(DomainError::validation("no updatable fields supplied"));
        }

        let name = update.name.as_deref().map(normalize_name).transpose()?;
        let email = update.email.as_deref().map(normalize_email).transpose()?;

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(email) = email {
            self.email = email;
        }
        if let Some(role) = update.role {
            self.role = role;
        }
        self.touch(now);
        Ok(())
    }

    pub fn set_password_hash(&mut self, password_hash: String, now: DateTime<Utc>) {
        self.password_hash = password_hash;
        self.touch(now);
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            provider: self.provider.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
        self.revision += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> NewUser {
        NewUser {
            name: "  Alice Smith ".to_string(),
            email: " Alice@Example.COM".to_string(),
            password: "s3cret".to_string(),
            role: Role::User,
        }
    }

    #[test]
    fn register_normalizes_fields() {
        let now = Utc::now();
        let user = User::register(&alice(), "$argon2id$fake".to_string(), now).unwrap();

        assert_eq!(user.name, "Alice Smith");
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.provider, LOCAL_PROVIDER);
        assert_eq!(user.role, Role::User);
        assert_eq!(user.created_at, now);
        assert_eq!(user.revision(), 0);
    }

    #[test]
    fn register_rejects_bad_input() {
        let now = Utc::now();

        let mut input = alice();
        input.email = "not-an-email".to_string();
        assert!(matches!(
            User::register(&input, String::new(), now),
            Err(DomainError::Validation(_))
        ));

        let mut input = alice();
        input.name = "   ".to_string();
        assert!(User::register(&input, String::new(), now).is_err());

        let mut input = alice();
        input.password = String::new();
        let err = User::register(&input, String::new(), now).unwrap_err();
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn update_is_all_or_nothing() {
        let now = Utc::now();
        let mut user = User::register(&alice(), "h".to_string(), now).unwrap();
        let before = user.clone();

        let bad = UserUpdate {
            name: Some("Bob".to_string()),
            email: Some("@nope".to_string()),
            role: None,
        };
        assert!(user.apply_update(bad, now).is_err());
        assert_eq!(user, before);

        let good = UserUpdate {
            name: Some("Bob".to_string()),
            email: None,
            role: Some(Role::Admin),
        };
        user.apply_update(good, now).unwrap();
        assert_eq!(user.name, "Bob");
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.email, before.email);
        assert_eq!(user.revision(), 1);
    }

    #[test]
    fn empty_update_is_rejected() {
        let now = Utc::now();
        let mut user = User::register(&alice(), "h".to_string(), now).unwrap();
        assert!(user.apply_update(UserUpdate::default(), now).is_err());
    }

    #[test]
    fn profile_omits_password_hash() {
        let user = User::register(&alice(), "$argon2id$secret".to_string(), Utc::now()).unwrap();
        let json = serde_json::to_value(user.profile()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "alice@example.com");
        assert_eq!(json["role"], "user");
    }

    proptest::proptest! {
        #[test]
        fn normalized_email_is_idempotent(local in "[a-zA-Z0-9]{1,12}", domain in "[a-zA-Z]{1,12}") {
            let once = normalize_email(&format!(" {local}@{domain}.Org ")).unwrap();
            let twice = normalize_email(&once).unwrap();
            proptest::prop_assert_eq!(&once, &twice);
            proptest::prop_assert_eq!(once.clone(), once.to_lowercase());
        }
    }
}
