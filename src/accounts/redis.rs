use async_trait::async_trait;
use chrono::Utc;
use lazy_static::lazy_static;
use redis::{ AsyncCommands, Client, Script };

use super::UserStore;
use crate::error::{ StoreError, StoreResult };
use crate::models::account::{ LoginSession, User };

lazy_static! {
    // KEYS: email index, user record. ARGV: user id, user json.
    // Returns 0 when the email is already claimed.
    static ref INSERT_USER: Script = Script::new(r#"
if not redis.call('SET', KEYS[1], ARGV[1], 'NX') then
    return 0
end
redis.call('SET', KEYS[2], ARGV[2])
return 1
"#);
}

pub struct RedisUserStore {
    client: Client,
    key_prefix: String,
}

impl RedisUserStore {
    pub fn new(host: &str, key_prefix: &str) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.to_string(),
        })
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn user_key(&self, user_id: &str) -> String {
        format!("{}user:{}", self.key_prefix, user_id)
    }

    fn email_key(&self, email: &str) -> String {
        format!("{}user_email:{}", self.key_prefix, email)
    }

    fn login_key(&self, token_id: &str) -> String {
        format!("{}login:{}", self.key_prefix, token_id)
    }
}

#[async_trait]
impl UserStore for RedisUserStore {
    async fn insert_user(&self, user: User) -> StoreResult<()> {
        let json = serde_json::to_string(&user)?;
        let mut conn = self.get_connection().await?;
        let inserted: i64 = INSERT_USER
            .key(self.email_key(&user.email))
            .key(self.user_key(&user.id))
            .arg(&user.id)
            .arg(json)
            .invoke_async(&mut conn).await?;
        if inserted == 0 {
            return Err(StoreError::AlreadyExists(user.email));
        }
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let mut conn = self.get_connection().await?;
        let id: Option<String> = conn.get(self.email_key(email)).await?;
        match id {
            Some(id) => self.find_by_id(&id).await,
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, user_id: &str) -> StoreResult<Option<User>> {
        let mut conn = self.get_connection().await?;
        let json: Option<String> = conn.get(self.user_key(user_id)).await?;
        json.map(|j| serde_json::from_str(&j).map_err(StoreError::from)).transpose()
    }

    async fn save_login(&self, login: LoginSession) -> StoreResult<()> {
        let mut conn = self.get_connection().await?;
        let ttl = (login.expires_at - Utc::now()).num_seconds().max(1) as u64;
        let json = serde_json::to_string(&login)?;
        let _: () = conn.set_ex(self.login_key(&login.token_id), json, ttl).await?;
        Ok(())
    }

    async fn find_login(&self, token_id: &str) -> StoreResult<Option<LoginSession>> {
        let mut conn = self.get_connection().await?;
        let json: Option<String> = conn.get(self.login_key(token_id)).await?;
        json.map(|j| serde_json::from_str(&j).map_err(StoreError::from)).transpose()
    }

    async fn delete_login(&self, token_id: &str) -> StoreResult<()> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.del(self.login_key(token_id)).await?;
        Ok(())
    }
}
