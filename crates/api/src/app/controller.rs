//! User resource controller.
//!
//! Each route handler delegates to one method here. Methods take plain values
//! (ids, DTOs, the principal) so they can be called without an HTTP request.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::OnceCell;

use roster_auth::{
    Hs256Jwt, NewUser, PasswordHasher, Role, User, UserProfile, UserUpdate, normalize_email, validate_password,
};
use roster_core::{DomainError, UserId};
use roster_infra::UserStore;

use crate::app::dto::{
    self, ChangePasswordRequest, CreateUserRequest, LoginRequest, SetPasswordRequest, TokenResponse,
    UpdateUserRequest, UserListResponse,
};
use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

pub struct UserController {
    store: Arc<dyn UserStore>,
    passwords: PasswordHasher,
    tokens: Arc<Hs256Jwt>,
    /// Verified against when a login names an unknown email.
    dummy_hash: OnceCell<String>,
}

impl UserController {
    /// Path placeholder bound to a user id.
    pub const PARAM: &'static str = ":id";

    pub fn new(store: Arc<dyn UserStore>, passwords: PasswordHasher, tokens: Arc<Hs256Jwt>) -> Self {
        Self {
            store,
            passwords,
            tokens,
            dummy_hash: OnceCell::new(),
        }
    }

    pub fn store(&self) -> Arc<dyn UserStore> {
        Arc::clone(&self.store)
    }

    pub fn tokens(&self) -> Arc<Hs256Jwt> {
        Arc::clone(&self.tokens)
    }

    pub async fn index(&self) -> Result<UserListResponse, ApiError> {
        let items = self.store.list().await?.iter().map(User::profile).collect();
        Ok(UserListResponse { items })
    }

    pub async fn create(&self, req: CreateUserRequest) -> Result<UserProfile, ApiError> {
        let role = match req.role.as_deref() {
            Some(raw) => dto::parse_role(raw)?,
            None => Role::default(),
        };
        let input = NewUser {
            name: req.name,
            email: req.email,
            password: req.password,
            role,
        };
        self.register(input).await
    }

    pub async fn me(&self, principal: &PrincipalContext) -> Result<UserProfile, ApiError> {
        self.store
            .get(&principal.user_id())
            .await?
            .map(|u| u.profile())
            .ok_or_else(|| ApiError::unauthorized("authenticated user no longer exists"))
    }

    pub async fn show(&self, id: UserId) -> Result<UserProfile, ApiError> {
        Ok(self.load(&id).await?.profile())
    }

    pub async fn update(&self, id: UserId, req: UpdateUserRequest) -> Result<UserProfile, ApiError> {
        let update = UserUpdate {
            name: req.name,
            email: req.email,
            role: req.role.as_deref().map(dto::parse_role).transpose()?,
        };

        let mut user = self.load(&id).await?;
        user.apply_update(update, Utc::now())?;
        self.store.update(user.clone()).await?;

        tracing::info!(user_id = %id, revision = user.revision, "user updated");
        Ok(user.profile())
    }

    pub async fn destroy(&self, id: UserId) -> Result<(), ApiError> {
        self.store.delete(&id).await?;
        tracing::info!(user_id = %id, "user deleted");
        Ok(())
    }

    /// Change the caller's own password after checking the current one.
    pub async fn change_password(
        &self,
        principal: &PrincipalContext,
        id: UserId,
        req: ChangePasswordRequest,
    ) -> Result<(), ApiError> {
        if principal.user_id() != id {
            return Err(DomainError::forbidden("users may only change their own password").into());
        }
        validate_password(&req.new_password)?;

        let mut user = self.load(&id).await?;
        if !self.verify_password(req.old_password, user.password_hash.clone()).await? {
            return Err(ApiError::forbidden("old password is incorrect"));
        }

        let hash = self.hash_password(req.new_password).await?;
        user.set_password_hash(hash, Utc::now());
        self.store.update(user).await?;

        tracing::info!(user_id = %id, "password changed");
        Ok(())
    }

    /// Administrative password reset; no old password required.
    pub async fn set_password(&self, id: UserId, req: SetPasswordRequest) -> Result<(), ApiError> {
        validate_password(&req.password)?;

        let mut user = self.load(&id).await?;
        let hash = self.hash_password(req.password).await?;
        user.set_password_hash(hash, Utc::now());
        self.store.update(user).await?;

        tracing::info!(user_id = %id, "password reset by admin");
        Ok(())
    }

    /// Exchange email + password for a token.
    pub async fn login(&self, req: LoginRequest) -> Result<TokenResponse, ApiError> {
        let invalid = || ApiError::unauthorized("invalid email or password");

        let email = normalize_email(&req.email).map_err(|_| invalid())?;
        let Some(user) = self.store.find_by_email(&email).await? else {
            // Pay the same argon2 cost as a wrong password for a known email.
            let dummy = self
                .dummy_hash
                .get_or_try_init(|| self.hash_password("not-a-real-password".to_string()))
                .await?
                .clone();
            self.verify_password(req.password, dummy).await?;
            return Err(invalid());
        };
        if !self.verify_password(req.password, user.password_hash.clone()).await? {
            tracing::debug!(user_id = %user.id, "login rejected");
            return Err(invalid());
        }

        let token = self.tokens.issue(user.id, user.role, Utc::now())?;
        Ok(TokenResponse {
            token,
            expires_in: self.tokens.ttl().num_seconds(),
        })
    }

    /// Create an admin account unless one with this email already exists.
    /// Returns whether an account was created.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<bool, ApiError> {
        let normalized = normalize_email(email)?;
        if let Some(existing) = self.store.find_by_email(&normalized).await? {
            if existing.role != Role::Admin {
                tracing::warn!(user_id = %existing.id, "seed admin email belongs to a non-admin account");
            }
            return Ok(false);
        }

        self.register(NewUser {
            name: "Admin".to_string(),
            email: normalized,
            password: password.to_string(),
            role: Role::Admin,
        })
        .await?;
        Ok(true)
    }

    async fn register(&self, input: NewUser) -> Result<UserProfile, ApiError> {
        input.validate()?;

        // Uniqueness is enforced again by the store on insert.
        let email = normalize_email(&input.email)?;
        if self.store.find_by_email(&email).await?.is_some() {
            return Err(DomainError::conflict(format!("email '{email}' is already registered")).into());
        }

        let hash = self.hash_password(input.password.clone()).await?;
        let user = User::register(&input, hash, Utc::now())?;
        self.store.insert(user.clone()).await?;

        tracing::info!(user_id = %user.id, role = %user.role, "user created");
        Ok(user.profile())
    }

    async fn load(&self, id: &UserId) -> Result<User, ApiError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ApiError::not_found("user not found"))
    }

    async fn hash_password(&self, password: String) -> Result<String, ApiError> {
        let hasher = self.passwords.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ApiError::internal(format!("hashing task failed: {e}")))?
            .map_err(ApiError::from)
    }

    async fn verify_password(&self, password: String, hash: String) -> Result<bool, ApiError> {
        let hasher = self.passwords.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(|e| ApiError::internal(format!("verification task failed: {e}")))?
            .map_err(ApiError::from)
    }
}
