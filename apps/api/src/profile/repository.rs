use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::profile::{NewProfile, Profile, ProfileUpdate, Tier};

/// Data-collaborator errors. `NotFound` and `Conflict` are expected outcomes
/// the callers branch on; `Database` is everything else.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("per-owner limit reached")]
    LimitReached,

    #[error("{0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepoError::Conflict(db.constraint().unwrap_or("unique key").to_string())
            }
            other => RepoError::Database(other),
        }
    }
}

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Profile, RepoError>;
    async fn insert(&self, profile: &NewProfile) -> Result<Profile, RepoError>;
    async fn update_details(&self, id: Uuid, update: &ProfileUpdate) -> Result<Profile, RepoError>;
    async fn set_avatar(&self, id: Uuid, avatar_url: &str) -> Result<Profile, RepoError>;
    async fn set_tier(&self, id: Uuid, tier: Tier) -> Result<Profile, RepoError>;
    async fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<Profile, RepoError>;
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Profile>, RepoError>;
    async fn count_by_tier(&self) -> Result<Vec<(Tier, i64)>, RepoError>;
}

pub struct PgProfileRepository {
    pool: PgPool,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn get(&self, id: Uuid) -> Result<Profile, RepoError> {
        Ok(
            sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn insert(&self, profile: &NewProfile) -> Result<Profile, RepoError> {
        Ok(sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, username, name, tier, is_admin)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(profile.id)
        .bind(&profile.username)
        .bind(&profile.name)
        .bind(profile.tier.as_str())
        .bind(profile.is_admin)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn update_details(&self, id: Uuid, update: &ProfileUpdate) -> Result<Profile, RepoError> {
        Ok(sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles SET
                username = COALESCE($2, username),
                name = COALESCE($3, name),
                phone = CASE WHEN $4 THEN $5 ELSE phone END,
                location = CASE WHEN $6 THEN $7 ELSE location END,
                bio = CASE WHEN $8 THEN $9 ELSE bio END,
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.username.as_deref())
        .bind(update.name.as_deref())
        .bind(update.phone.touches())
        .bind(update.phone.as_deref())
        .bind(update.location.touches())
        .bind(update.location.as_deref())
        .bind(update.bio.touches())
        .bind(update.bio.as_deref())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn set_avatar(&self, id: Uuid, avatar_url: &str) -> Result<Profile, RepoError> {
        Ok(sqlx::query_as::<_, Profile>(
            "UPDATE profiles SET avatar_url = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(avatar_url)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn set_tier(&self, id: Uuid, tier: Tier) -> Result<Profile, RepoError> {
        Ok(sqlx::query_as::<_, Profile>(
            "UPDATE profiles SET tier = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(tier.as_str())
        .fetch_one(&self.pool)
        .await?)
    }

    async fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<Profile, RepoError> {
        Ok(sqlx::query_as::<_, Profile>(
            "UPDATE profiles SET is_admin = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(is_admin)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Profile>, RepoError> {
        Ok(sqlx::query_as::<_, Profile>(
            "SELECT * FROM profiles ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn count_by_tier(&self) -> Result<Vec<(Tier, i64)>, RepoError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT tier, COUNT(*) FROM profiles GROUP BY tier")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|(tier, count)| {
                tier.parse::<Tier>()
                    .map(|t| (t, count))
                    .map_err(|e| RepoError::Database(sqlx::Error::Decode(Box::new(e))))
            })
            .collect()
    }
}
