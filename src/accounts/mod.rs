mod memory;
mod redis;
pub mod token;

use async_trait::async_trait;
use chrono::{ Duration as ChronoDuration, Utc };
use lazy_static::lazy_static;
use log::{ info, warn };
use regex::Regex;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error as ThisError;
use uuid::Uuid;

use crate::cli::Args;
use crate::error::{ StoreError, StoreResult };
use crate::models::account::{ LoginRequest, LoginSession, PublicUser, RegisterRequest, User };
use self::token::TokenKeys;

pub use self::memory::MemoryUserStore;
pub use self::redis::RedisUserStore;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern");
}

#[derive(Debug, ThisError)]
pub enum AuthError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
    #[error("User already exist")]
    EmailTaken,
    #[error("{0}")]
    InvalidCredentials(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Internal(String),
}

/// The authenticated caller, resolved once per request and passed down
/// explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub token_id: String,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `AlreadyExists` when the email is taken.
    async fn insert_user(&self, user: User) -> StoreResult<()>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_by_id(&self, user_id: &str) -> StoreResult<Option<User>>;
    async fn save_login(&self, login: LoginSession) -> StoreResult<()>;
    async fn find_login(&self, token_id: &str) -> StoreResult<Option<LoginSession>>;
    async fn delete_login(&self, token_id: &str) -> StoreResult<()>;
}

pub fn create_user_store(
    args: &Args
) -> Result<Arc<dyn UserStore>, Box<dyn Error + Send + Sync>> {
    match args.store_type.to_lowercase().as_str() {
        "redis" => Ok(Arc::new(RedisUserStore::new(&args.store_host, &args.store_prefix)?)),
        "memory" => Ok(Arc::new(MemoryUserStore::new())),
        other => Err(format!("Unsupported store type: {}", other).into()),
    }
}

pub fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < 8 {
        return Err(AuthError::Validation("Password must be at least 8 characters long".into()));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(
            AuthError::Validation("Password must contain at least one uppercase letter".into())
        );
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(
            AuthError::Validation("Password must contain at least one lowercase letter".into())
        );
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::Validation("Password must contain at least one number".into()));
    }
    Ok(())
}

fn required(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    keys: TokenKeys,
    token_ttl_hours: u64,
    bcrypt_cost: u32,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserStore>,
        keys: TokenKeys,
        token_ttl_hours: u64,
        bcrypt_cost: u32
    ) -> Self {
        Self { users, keys, token_ttl_hours, bcrypt_cost }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<PublicUser, AuthError> {
        let (Some(name), Some(email), Some(password)) = (
            required(req.name),
            required(req.email),
            req.password.filter(|p| !p.is_empty()),
        ) else {
            return Err(AuthError::Validation("All fields are required".into()));
        };
        let email = email.to_lowercase();
        if !EMAIL_RE.is_match(&email) {
            return Err(AuthError::Validation("Invalid email format".into()));
        }
        validate_password(&password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let cost = self.bcrypt_cost;
        let password_hash = tokio::task
            ::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AuthError::Internal(format!("hashing task failed: {}", e)))?
            .map_err(|e| AuthError::Internal(format!("Failed to hash password: {}", e)))?;

        let user = User {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            password_hash,
            created_at: Utc::now(),
        };
        let public = PublicUser::from(&user);
        match self.users.insert_user(user).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists(_)) => return Err(AuthError::EmailTaken),
            Err(e) => return Err(e.into()),
        }
        info!("Registered user {}", public.id);
        Ok(public)
    }

    pub async fn login(
        &self,
        req: LoginRequest,
        device_info: Option<String>
    ) -> Result<(PublicUser, String), AuthError> {
        let (Some(email), Some(password)) = (
            required(req.email),
            req.password.filter(|p| !p.is_empty()),
        ) else {
            return Err(AuthError::Validation("All fields are required".into()));
        };
        let user = self.users
            .find_by_email(&email.to_lowercase()).await?
            .ok_or(AuthError::InvalidCredentials("No user registered with provided email"))?;

        let hash = user.password_hash.clone();
        let valid = tokio::task
            ::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AuthError::Internal(format!("verification task failed: {}", e)))?
            .map_err(|e| AuthError::Internal(format!("Failed to verify password: {}", e)))?;
        if !valid {
            return Err(AuthError::InvalidCredentials("Invalid password"));
        }

        let ttl_secs = self.token_ttl_hours * 3600;
        let (token, claims) = self.keys.issue(&user.id, ttl_secs).map_err(AuthError::Internal)?;
        self.users.save_login(LoginSession {
            token_id: claims.jti,
            user_id: user.id.clone(),
            expires_at: Utc::now() + ChronoDuration::seconds(ttl_secs as i64),
            device_info,
        }).await?;
        info!("User {} logged in", user.id);
        Ok((PublicUser::from(&user), token))
    }

    pub async fn logout(&self, ctx: &AuthContext) -> Result<(), AuthError> {
        self.users.delete_login(&ctx.token_id).await?;
        info!("User {} logged out", ctx.user_id);
        Ok(())
    }

    /// Resolves a bearer token to its caller. Expired, revoked or orphaned
    /// tokens are all `Unauthorized`.
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext, AuthError> {
        let claims = self.keys.verify(token).map_err(|e| {
            warn!("Rejected bearer token: {}", e);
            AuthError::Unauthorized
        })?;
        let login = self.users.find_login(&claims.jti).await?.ok_or(AuthError::Unauthorized)?;
        if login.user_id != claims.sub || login.expires_at <= Utc::now() {
            return Err(AuthError::Unauthorized);
        }
        if self.users.find_by_id(&claims.sub).await?.is_none() {
            return Err(AuthError::Unauthorized);
        }
        Ok(AuthContext { user_id: claims.sub, token_id: claims.jti })
    }

    pub async fn me(&self, ctx: &AuthContext) -> Result<PublicUser, AuthError> {
        let user = self.users.find_by_id(&ctx.user_id).await?.ok_or(AuthError::Unauthorized)?;
        Ok(PublicUser::from(&user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AccountService {
        AccountService::new(
            Arc::new(MemoryUserStore::new()),
            TokenKeys::from_secret("unit-test"),
            24,
            4
        )
    }

    fn register_req(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            name: Some("Ada".into()),
            email: Some(email.into()),
            password: Some(password.into()),
        }
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("Short1").is_err());
        assert!(validate_password("alllowercase1").is_err());
        assert!(validate_password("ALLUPPERCASE1").is_err());
        assert!(validate_password("NoDigitsHere").is_err());
        assert!(validate_password("Valid1Password").is_ok());
    }

    #[tokio::test]
    async fn register_login_authenticate_logout() {
        let svc = service();
        let user = svc.register(register_req("  Ada@Example.com ", "Secret123")).await.unwrap();
        assert_eq!(user.email, "ada@example.com");

        let (logged_in, token) = svc.login(
            LoginRequest { email: Some("ada@example.com".into()), password: Some("Secret123".into()) },
            Some("test-agent".into())
        ).await.unwrap();
        assert_eq!(logged_in, user);

        let ctx = svc.authenticate(&token).await.unwrap();
        assert_eq!(ctx.user_id, user.id);
        assert_eq!(svc.me(&ctx).await.unwrap(), user);

        svc.logout(&ctx).await.unwrap();
        assert!(matches!(svc.authenticate(&token).await, Err(AuthError::Unauthorized)));
    }

    #[tokio::test]
    async fn duplicate_email_and_bad_input() {
        let svc = service();
        svc.register(register_req("a@b.co", "Secret123")).await.unwrap();
        assert!(matches!(
            svc.register(register_req("A@B.co", "Secret123")).await,
            Err(AuthError::EmailTaken)
        ));
        assert!(matches!(
            svc.register(register_req("not-an-email", "Secret123")).await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            svc.register(RegisterRequest::default()).await,
            Err(AuthError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let svc = service();
        svc.register(register_req("a@b.co", "Secret123")).await.unwrap();
        let result = svc.login(
            LoginRequest { email: Some("a@b.co".into()), password: Some("Secret124".into()) },
            None
        ).await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
        let unknown = svc.login(
            LoginRequest { email: Some("x@b.co".into()), password: Some("Secret123".into()) },
            None
        ).await;
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials(_))));
    }

    #[tokio::test]
    async fn token_from_other_secret_is_unauthorized() {
        let svc = service();
        let (token, _) = TokenKeys::from_secret("other").issue("ghost", 60).unwrap();
        assert!(matches!(svc.authenticate(&token).await, Err(AuthError::Unauthorized)));
    }
}
