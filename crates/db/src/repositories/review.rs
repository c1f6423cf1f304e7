use sqlx::sqlite::SqliteRow;

use fabmarket_core::domain::actor::ActorId;
use fabmarket_core::domain::order::OrderId;
use fabmarket_core::domain::review::{Review, ReviewId};
use fabmarket_core::store::{ReviewStore, StoreError};

use super::{column, db_error, format_timestamp, parse_timestamp, SqlMarketplaceStore};

const REVIEW_COLUMNS: &str =
    "id, customer_id, manufacturer_id, rating, comment, order_id, created_at, updated_at";

#[async_trait::async_trait]
impl ReviewStore for SqlMarketplaceStore {
    async fn find_review(&self, id: &ReviewId) -> Result<Option<Review>, StoreError> {
        let row = sqlx::query(&format!("SELECT {REVIEW_COLUMNS} FROM review WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(review_from_row).transpose()
    }

    async fn list_reviews_for_manufacturer(
        &self,
        manufacturer_id: &ActorId,
    ) -> Result<Vec<Review>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM review WHERE manufacturer_id = ?
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(&manufacturer_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(review_from_row).collect()
    }

    async fn find_review_for(
        &self,
        customer_id: &ActorId,
        manufacturer_id: &ActorId,
        order_id: Option<&OrderId>,
    ) -> Result<Option<Review>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM review
             WHERE customer_id = ? AND manufacturer_id = ? AND order_id IS ?"
        ))
        .bind(&customer_id.0)
        .bind(&manufacturer_id.0)
        .bind(order_id.map(|id| id.0.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.as_ref().map(review_from_row).transpose()
    }

    async fn insert_review(&self, review: Review) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO review (
                id, customer_id, manufacturer_id, rating, comment, order_id, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&review.id.0)
        .bind(&review.customer_id.0)
        .bind(&review.manufacturer_id.0)
        .bind(i64::from(review.rating))
        .bind(&review.comment)
        .bind(review.order_id.as_ref().map(|id| id.0.as_str()))
        .bind(format_timestamp(&review.created_at))
        .bind(format_timestamp(&review.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_review(&self, review: &Review) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE review SET rating = ?, comment = ?, updated_at = ? WHERE id = ?")
                .bind(i64::from(review.rating))
                .bind(&review.comment)
                .bind(format_timestamp(&review.updated_at))
                .bind(&review.id.0)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Database(format!("review `{}` no longer exists", review.id)));
        }
        Ok(())
    }

    async fn delete_review(&self, id: &ReviewId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM review WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }
}

fn review_from_row(row: &SqliteRow) -> Result<Review, StoreError> {
    let rating: i64 = column(row, "rating")?;
    let rating = u8::try_from(rating)
        .map_err(|_| StoreError::Decode(format!("invalid value for `rating`: {rating}")))?;

    Ok(Review {
        id: ReviewId(column(row, "id")?),
        customer_id: ActorId(column(row, "customer_id")?),
        manufacturer_id: ActorId(column(row, "manufacturer_id")?),
        rating,
        comment: column(row, "comment")?,
        order_id: column::<Option<String>>(row, "order_id")?.map(OrderId),
        created_at: parse_timestamp("created_at", column(row, "created_at")?)?,
        updated_at: parse_timestamp("updated_at", column(row, "updated_at")?)?,
    })
}
