use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::models::user::Identity;
use crate::platform::{IdentityProvider, PlatformError};

/// Identity backed by the `users` table.
///
/// `sign_in` upserts the configured external user and opens a session for it;
/// the session itself is held in process.
pub struct PgIdentity {
    pool: PgPool,
    external_id: String,
    session: RwLock<Option<Uuid>>,
}

impl PgIdentity {
    pub fn new(pool: PgPool, external_id: String) -> Self {
        Self {
            pool,
            external_id,
            session: RwLock::new(None),
        }
    }
}

fn identity_error(e: sqlx::Error) -> PlatformError {
    PlatformError::Identity(e.to_string())
}

#[async_trait]
impl IdentityProvider for PgIdentity {
    async fn is_signed_in(&self) -> Result<bool, PlatformError> {
        Ok(self.session.read().await.is_some())
    }

    async fn get_user(&self) -> Result<Identity, PlatformError> {
        let user_id = (*self.session.read().await).ok_or(PlatformError::NotSignedIn)?;

        sqlx::query_as::<_, Identity>(
            r#"
            SELECT id::text AS id, external_id AS username, email, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(identity_error)?
        .ok_or_else(|| PlatformError::NotFound(format!("user {user_id}")))
    }

    async fn sign_in(&self) -> Result<(), PlatformError> {
        let user_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO users (id, external_id)
            VALUES ($1, $2)
            ON CONFLICT (external_id) DO UPDATE SET external_id = EXCLUDED.external_id
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&self.external_id)
        .fetch_one(&self.pool)
        .await
        .map_err(identity_error)?;

        *self.session.write().await = Some(user_id);
        info!("Signed in {} as user {user_id}", self.external_id);
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), PlatformError> {
        if let Some(user_id) = self.session.write().await.take() {
            info!("Signed out user {user_id}");
        }
        Ok(())
    }
}
