use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Sqlite, Transaction};

use fabmarket_core::domain::actor::ActorId;
use fabmarket_core::domain::design::{Design, DesignId, DesignStatus};
use fabmarket_core::domain::order::{Order, OrderId, OrderStatus};
use fabmarket_core::domain::quote::{Quote, QuoteId, QuoteStatus};
use fabmarket_core::store::{QuoteStore, QuoteUnitOfWork, StoreError};

use super::directory::{design_from_row, design_query};
use super::{
    column, db_error, format_timestamp, parse_decimal, parse_enum, parse_timestamp, parse_u32,
    SqlMarketplaceStore,
};

const QUOTE_COLUMNS: &str = "id, design_id, manufacturer_id, price, estimated_lead_time_days, status, notes, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, design_id, accepted_quote_id, customer_id, manufacturer_id, total_price, status, estimated_delivery_date, created_at, updated_at";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[async_trait::async_trait]
impl QuoteStore for SqlMarketplaceStore {
    async fn find_quote(&self, id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        let row = sqlx::query(&format!("SELECT {QUOTE_COLUMNS} FROM quote WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(quote_from_row).transpose()
    }

    async fn list_quotes_for_design(&self, design_id: &DesignId) -> Result<Vec<Quote>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quote WHERE design_id = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(&design_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(quote_from_row).collect()
    }

    async fn find_quote_for_pair(
        &self,
        design_id: &DesignId,
        manufacturer_id: &ActorId,
    ) -> Result<Option<Quote>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {QUOTE_COLUMNS} FROM quote WHERE design_id = ? AND manufacturer_id = ?"
        ))
        .bind(&design_id.0)
        .bind(&manufacturer_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.as_ref().map(quote_from_row).transpose()
    }

    async fn insert_quote(&self, quote: Quote) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO quote (
                id, design_id, manufacturer_id, price, estimated_lead_time_days, status, notes, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&quote.id.0)
        .bind(&quote.design_id.0)
        .bind(&quote.manufacturer_id.0)
        .bind(quote.price.to_string())
        .bind(i64::from(quote.estimated_lead_time_days))
        .bind(quote.status.as_str())
        .bind(&quote.notes)
        .bind(format_timestamp(&quote.created_at))
        .bind(format_timestamp(&quote.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn delete_quote(&self, id: &QuoteId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM quote WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_order_for_quote(&self, quote_id: &QuoteId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM customer_order WHERE accepted_quote_id = ?"
        ))
        .bind(&quote_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn find_order_for_design(
        &self,
        design_id: &DesignId,
    ) -> Result<Option<Order>, StoreError> {
        let row =
            sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM customer_order WHERE design_id = ?"))
                .bind(&design_id.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        row.as_ref().map(order_from_row).transpose()
    }

    /// Takes the write lock up front so a second writer waits on the busy
    /// timeout and then re-reads committed state.
    async fn begin(&self) -> Result<Box<dyn QuoteUnitOfWork>, StoreError> {
        let tx = self.pool.begin_with("BEGIN IMMEDIATE").await.map_err(db_error)?;
        Ok(Box::new(SqlQuoteUnitOfWork { tx }))
    }
}

/// A quote unit backed by one SQLite transaction. Dropping it without
/// `commit` rolls the transaction back.
pub struct SqlQuoteUnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait::async_trait]
impl QuoteUnitOfWork for SqlQuoteUnitOfWork {
    async fn find_quote(&mut self, id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        let row = sqlx::query(&format!("SELECT {QUOTE_COLUMNS} FROM quote WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;
        row.as_ref().map(quote_from_row).transpose()
    }

    async fn find_design(&mut self, id: &DesignId) -> Result<Option<Design>, StoreError> {
        let row = sqlx::query(&design_query())
            .bind(&id.0)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error)?;
        row.as_ref().map(design_from_row).transpose()
    }

    async fn find_order_for_quote(
        &mut self,
        quote_id: &QuoteId,
    ) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM customer_order WHERE accepted_quote_id = ?"
        ))
        .bind(&quote_id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_error)?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn find_order_for_design(
        &mut self,
        design_id: &DesignId,
    ) -> Result<Option<Order>, StoreError> {
        let row =
            sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM customer_order WHERE design_id = ?"))
                .bind(&design_id.0)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_error)?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn update_quote(&mut self, quote: &Quote) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE quote
             SET price = ?, estimated_lead_time_days = ?, status = ?, notes = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(quote.price.to_string())
        .bind(i64::from(quote.estimated_lead_time_days))
        .bind(quote.status.as_str())
        .bind(&quote.notes)
        .bind(format_timestamp(&quote.updated_at))
        .bind(&quote.id.0)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database(format!("quote `{}` no longer exists", quote.id)));
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO customer_order (
                id, design_id, accepted_quote_id, customer_id, manufacturer_id, total_price,
                status, estimated_delivery_date, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id.0)
        .bind(&order.design_id.0)
        .bind(&order.accepted_quote_id.0)
        .bind(&order.customer_id.0)
        .bind(&order.manufacturer_id.0)
        .bind(order.total_price.to_string())
        .bind(order.status.as_str())
        .bind(order.estimated_delivery_date.format(DATE_FORMAT).to_string())
        .bind(format_timestamp(&order.created_at))
        .bind(format_timestamp(&order.updated_at))
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn update_design_status(
        &mut self,
        design_id: &DesignId,
        status: DesignStatus,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE design SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(format_timestamp(&at))
            .bind(&design_id.0)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn reject_pending_quotes(
        &mut self,
        design_id: &DesignId,
        keep: &QuoteId,
        at: DateTime<Utc>,
    ) -> Result<Vec<QuoteId>, StoreError> {
        let rows = sqlx::query(
            "UPDATE quote SET status = 'rejected', updated_at = ?
             WHERE design_id = ? AND status = 'pending' AND id <> ?
             RETURNING id",
        )
        .bind(format_timestamp(&at))
        .bind(&design_id.0)
        .bind(&keep.0)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error)?;

        let mut rejected = rows
            .iter()
            .map(|row| column::<String>(row, "id").map(QuoteId))
            .collect::<Result<Vec<_>, _>>()?;
        rejected.sort();
        Ok(rejected)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(db_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(db_error)
    }
}

fn quote_from_row(row: &SqliteRow) -> Result<Quote, StoreError> {
    Ok(Quote {
        id: QuoteId(column(row, "id")?),
        design_id: DesignId(column(row, "design_id")?),
        manufacturer_id: ActorId(column(row, "manufacturer_id")?),
        price: parse_decimal("price", column(row, "price")?)?,
        estimated_lead_time_days: parse_u32(
            "estimated_lead_time_days",
            column(row, "estimated_lead_time_days")?,
        )?,
        status: parse_enum::<QuoteStatus>("status", column(row, "status")?)?,
        notes: column(row, "notes")?,
        created_at: parse_timestamp("created_at", column(row, "created_at")?)?,
        updated_at: parse_timestamp("updated_at", column(row, "updated_at")?)?,
    })
}

fn order_from_row(row: &SqliteRow) -> Result<Order, StoreError> {
    let delivery: String = column(row, "estimated_delivery_date")?;
    let estimated_delivery_date =
        NaiveDate::parse_from_str(&delivery, DATE_FORMAT).map_err(|error| {
            StoreError::Decode(format!(
                "invalid date in `estimated_delivery_date`: `{delivery}` ({error})"
            ))
        })?;

    Ok(Order {
        id: OrderId(column(row, "id")?),
        design_id: DesignId(column(row, "design_id")?),
        accepted_quote_id: QuoteId(column(row, "accepted_quote_id")?),
        customer_id: ActorId(column(row, "customer_id")?),
        manufacturer_id: ActorId(column(row, "manufacturer_id")?),
        total_price: parse_decimal("total_price", column(row, "total_price")?)?,
        status: parse_enum::<OrderStatus>("status", column(row, "status")?)?,
        estimated_delivery_date,
        created_at: parse_timestamp("created_at", column(row, "created_at")?)?,
        updated_at: parse_timestamp("updated_at", column(row, "updated_at")?)?,
    })
}
