use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;

use fabmarket_core::domain::actor::{Actor, ActorId, ActorRole};
use fabmarket_core::domain::design::{Design, DesignId, DesignStatus, GeometricData};
use fabmarket_core::domain::manufacturer::{ManufacturerCapabilities, ManufacturerProfile};
use fabmarket_core::store::{DirectoryStore, StoreError};

use super::{
    column, db_error, format_timestamp, parse_decimal, parse_enum, parse_timestamp,
    SqlMarketplaceStore,
};

const DESIGN_COLUMNS: &str = "id, customer_id, design_name, material, geometric_data_json, status, created_at, updated_at";

#[async_trait]
impl DirectoryStore for SqlMarketplaceStore {
    async fn find_actor(&self, id: &ActorId) -> Result<Option<Actor>, StoreError> {
        let row = sqlx::query(
            "SELECT id, email, company_name, role, is_staff, created_at FROM actor WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref().map(actor_from_row).transpose()
    }

    async fn save_actor(&self, actor: Actor) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO actor (id, email, company_name, role, is_staff, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                company_name = excluded.company_name,
                role = excluded.role,
                is_staff = excluded.is_staff",
        )
        .bind(&actor.id.0)
        .bind(&actor.email)
        .bind(&actor.company_name)
        .bind(actor.role.as_str())
        .bind(actor.is_staff)
        .bind(format_timestamp(&actor.created_at))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_design(&self, id: &DesignId) -> Result<Option<Design>, StoreError> {
        let row = sqlx::query(&format!("SELECT {DESIGN_COLUMNS} FROM design WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.as_ref().map(design_from_row).transpose()
    }

    async fn save_design(&self, design: Design) -> Result<(), StoreError> {
        let geometric_data_json = design
            .geometric_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| StoreError::Decode(format!("geometric data: {error}")))?;

        sqlx::query(
            "INSERT INTO design (
                id, customer_id, design_name, material, geometric_data_json, status, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                customer_id = excluded.customer_id,
                design_name = excluded.design_name,
                material = excluded.material,
                geometric_data_json = excluded.geometric_data_json,
                status = excluded.status,
                updated_at = excluded.updated_at",
        )
        .bind(&design.id.0)
        .bind(&design.customer_id.0)
        .bind(&design.design_name)
        .bind(&design.material)
        .bind(geometric_data_json)
        .bind(design.status.as_str())
        .bind(format_timestamp(&design.created_at))
        .bind(format_timestamp(&design.updated_at))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_manufacturer_profile(
        &self,
        actor_id: &ActorId,
    ) -> Result<Option<ManufacturerProfile>, StoreError> {
        let row = sqlx::query(
            "SELECT actor_id, markup_factor, capabilities_json FROM manufacturer_profile WHERE actor_id = ?",
        )
        .bind(&actor_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn save_manufacturer_profile(
        &self,
        profile: ManufacturerProfile,
    ) -> Result<(), StoreError> {
        let capabilities_json = serde_json::to_string(&profile.capabilities)
            .map_err(|error| StoreError::Decode(format!("capabilities: {error}")))?;

        sqlx::query(
            "INSERT INTO manufacturer_profile (actor_id, markup_factor, capabilities_json)
             VALUES (?, ?, ?)
             ON CONFLICT(actor_id) DO UPDATE SET
                markup_factor = excluded.markup_factor,
                capabilities_json = excluded.capabilities_json",
        )
        .bind(&profile.actor_id.0)
        .bind(profile.markup_factor.to_string())
        .bind(capabilities_json)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}

fn actor_from_row(row: &SqliteRow) -> Result<Actor, StoreError> {
    Ok(Actor {
        id: ActorId(column(row, "id")?),
        email: column(row, "email")?,
        company_name: column(row, "company_name")?,
        role: parse_enum::<ActorRole>("role", column(row, "role")?)?,
        is_staff: column(row, "is_staff")?,
        created_at: parse_timestamp("created_at", column(row, "created_at")?)?,
    })
}

pub(crate) fn design_from_row(row: &SqliteRow) -> Result<Design, StoreError> {
    let geometric_data = column::<Option<String>>(row, "geometric_data_json")?
        .map(|raw| {
            serde_json::from_str::<GeometricData>(&raw)
                .map_err(|error| StoreError::Decode(format!("geometric_data_json: {error}")))
        })
        .transpose()?;

    Ok(Design {
        id: DesignId(column(row, "id")?),
        customer_id: ActorId(column(row, "customer_id")?),
        design_name: column(row, "design_name")?,
        material: column(row, "material")?,
        geometric_data,
        status: parse_enum::<DesignStatus>("status", column(row, "status")?)?,
        created_at: parse_timestamp("created_at", column(row, "created_at")?)?,
        updated_at: parse_timestamp("updated_at", column(row, "updated_at")?)?,
    })
}

pub(crate) fn design_query() -> String {
    format!("SELECT {DESIGN_COLUMNS} FROM design WHERE id = ?")
}

fn profile_from_row(row: &SqliteRow) -> Result<ManufacturerProfile, StoreError> {
    let capabilities_raw: String = column(row, "capabilities_json")?;
    let capabilities = serde_json::from_str::<ManufacturerCapabilities>(&capabilities_raw)
        .map_err(|error| StoreError::Decode(format!("capabilities_json: {error}")))?;

    Ok(ManufacturerProfile {
        actor_id: ActorId(column(row, "actor_id")?),
        markup_factor: parse_decimal("markup_factor", column(row, "markup_factor")?)?,
        capabilities,
    })
}
