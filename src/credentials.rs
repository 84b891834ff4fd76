//! Local password credentials. Everything else lives in the record store.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use crate::db::PgPool;
use crate::models::{NewPasswordResetToken, NewUser, PasswordResetToken, User};
use crate::schema::{password_reset_tokens, users};

#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Returns `None` when the email is already registered.
    async fn create_user(&self, user: NewUser) -> Result<Option<User>>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()>;

    async fn store_reset_token(&self, token: NewPasswordResetToken) -> Result<()>;

    /// Marks the token used and returns its owner, if it is unused and unexpired.
    async fn consume_reset_token(&self, token_hash: &str, now: NaiveDateTime)
        -> Result<Option<Uuid>>;
}

pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("database pool error: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("credential query task panicked")?
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            let user = users::table
                .filter(users::email.eq(&email))
                .first::<User>(conn)
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        self.with_conn(move |conn| {
            let user = users::table.find(user_id).first::<User>(conn).optional()?;
            Ok(user)
        })
        .await
    }

    async fn create_user(&self, user: NewUser) -> Result<Option<User>> {
        self.with_conn(move |conn| {
            match diesel::insert_into(users::table)
                .values(&user)
                .execute(conn)
            {
                Ok(_) => {}
                Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                    return Ok(None);
                }
                Err(err) => return Err(err.into()),
            }
            let created = users::table.find(user.id).first::<User>(conn)?;
            Ok(Some(created))
        })
        .await
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        let password_hash = password_hash.to_string();
        self.with_conn(move |conn| {
            let updated = diesel::update(users::table.find(user_id))
                .set((
                    users::password_hash.eq(&password_hash),
                    users::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(conn)?;
            if updated == 0 {
                return Err(anyhow!("user {user_id} not found"));
            }
            Ok(())
        })
        .await
    }

    async fn store_reset_token(&self, token: NewPasswordResetToken) -> Result<()> {
        self.with_conn(move |conn| {
            diesel::insert_into(password_reset_tokens::table)
                .values(&token)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: NaiveDateTime,
    ) -> Result<Option<Uuid>> {
        let token_hash = token_hash.to_string();
        self.with_conn(move |conn| {
            conn.transaction(|conn| {
                let token = password_reset_tokens::table
                    .filter(password_reset_tokens::token_hash.eq(&token_hash))
                    .filter(password_reset_tokens::used_at.is_null())
                    .filter(password_reset_tokens::expires_at.gt(now))
                    .for_update()
                    .first::<PasswordResetToken>(conn)
                    .optional()?;

                let Some(token) = token else {
                    return Ok(None);
                };

                diesel::update(password_reset_tokens::table.find(token.id))
                    .set(password_reset_tokens::used_at.eq(now))
                    .execute(conn)?;
                Ok::<Option<Uuid>, DieselError>(Some(token.user_id))
            })
            .map_err(anyhow::Error::from)
        })
        .await
    }
}
