use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::listing::{Listing, ListingUpdate, NewListing};
use crate::profile::repository::RepoError;

#[async_trait]
pub trait ListingRepository: Send + Sync {
    /// Inserts unless the owner already has `max_per_owner` listings, in which
    /// case `RepoError::LimitReached` is returned. `None` means no cap. The
    /// count and the insert are atomic with respect to other creates for the
    /// same owner.
    async fn create(
        &self,
        listing: &NewListing,
        max_per_owner: Option<u32>,
    ) -> Result<Listing, RepoError>;
    async fn get(&self, id: Uuid) -> Result<Listing, RepoError>;
    async fn update(&self, id: Uuid, update: &ListingUpdate) -> Result<Listing, RepoError>;
    async fn set_media(&self, id: Uuid, media_path: &str) -> Result<Listing, RepoError>;
    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;
    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Listing>, RepoError>;
    /// Active listings, newest first.
    async fn list_recent(&self, limit: Option<u32>) -> Result<Vec<Listing>, RepoError>;
    /// Every listing including inactive ones, newest first.
    async fn list_all(&self, limit: i64, offset: i64) -> Result<Vec<Listing>, RepoError>;
    async fn count(&self) -> Result<i64, RepoError>;
}

pub struct PgListingRepository {
    pool: PgPool,
}

impl PgListingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListingRepository for PgListingRepository {
    async fn create(
        &self,
        listing: &NewListing,
        max_per_owner: Option<u32>,
    ) -> Result<Listing, RepoError> {
        let mut tx = self.pool.begin().await?;

        // Held until commit: creates for one owner run one at a time.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(listing.owner_id.to_string())
            .execute(&mut *tx)
            .await?;

        if let Some(max) = max_per_owner {
            let used: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM listings WHERE owner_id = $1")
                .bind(listing.owner_id)
                .fetch_one(&mut *tx)
                .await?;
            if used >= i64::from(max) {
                return Err(RepoError::LimitReached);
            }
        }

        let created = sqlx::query_as::<_, Listing>(
            r#"
            INSERT INTO listings (id, owner_id, title, description, price_cents, category, location)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(listing.id)
        .bind(listing.owner_id)
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(listing.price_cents)
        .bind(listing.category.as_deref())
        .bind(listing.location.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Listing, RepoError> {
        Ok(
            sqlx::query_as::<_, Listing>("SELECT * FROM listings WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn update(&self, id: Uuid, update: &ListingUpdate) -> Result<Listing, RepoError> {
        Ok(sqlx::query_as::<_, Listing>(
            r#"
            UPDATE listings SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                price_cents = COALESCE($4, price_cents),
                category = CASE WHEN $5 THEN $6 ELSE category END,
                location = CASE WHEN $7 THEN $8 ELSE location END,
                is_active = COALESCE($9, is_active),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.title.as_deref())
        .bind(update.description.as_deref())
        .bind(update.price_cents)
        .bind(update.category.touches())
        .bind(update.category.as_deref())
        .bind(update.location.touches())
        .bind(update.location.as_deref())
        .bind(update.is_active)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn set_media(&self, id: Uuid, media_path: &str) -> Result<Listing, RepoError> {
        Ok(sqlx::query_as::<_, Listing>(
            "UPDATE listings SET media_path = $2, updated_at = now() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(media_path)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM listings WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Listing>, RepoError> {
        Ok(sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings WHERE owner_id = $1 ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_recent(&self, limit: Option<u32>) -> Result<Vec<Listing>, RepoError> {
        // LIMIT NULL is LIMIT ALL in Postgres.
        Ok(sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings WHERE is_active ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit.map(i64::from))
        .fetch_all(&self.pool)
        .await?)
    }

    async fn list_all(&self, limit: i64, offset: i64) -> Result<Vec<Listing>, RepoError> {
        Ok(sqlx::query_as::<_, Listing>(
            "SELECT * FROM listings ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn count(&self) -> Result<i64, RepoError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM listings")
            .fetch_one(&self.pool)
            .await?)
    }
}
