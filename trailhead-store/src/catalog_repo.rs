use async_trait::async_trait;
use uuid::Uuid;
use sqlx::PgPool;
use serde_json::Value;

use trailhead_core::repository::PoiRepository;
use trailhead_core::{CoreError, CoreResult};
use trailhead_shared::{Poi, PoiTier, Timeslot};

use crate::database::db_error;

pub struct StorePoiRepository {
    pool: PgPool,
}

impl StorePoiRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal struct for type-safe querying
#[derive(sqlx::FromRow)]
struct PoiRow {
    id: Uuid,
    name: String,
    slug: String,
    daily_capacity: i32,
    timeslots: Value,
    base_price: i64,
    currency: String,
    tier: String,
    is_active: bool,
}

impl TryFrom<PoiRow> for Poi {
    type Error = CoreError;

    fn try_from(row: PoiRow) -> Result<Self, Self::Error> {
        let timeslots: Vec<Timeslot> =
            serde_json::from_value(row.timeslots).map_err(CoreError::internal)?;
        Ok(Poi {
            id: row.id,
            name: row.name,
            slug: row.slug,
            daily_capacity: u32::try_from(row.daily_capacity).unwrap_or(0),
            timeslots,
            base_price: row.base_price,
            currency: row.currency,
            tier: row.tier.parse().map_err(CoreError::internal)?,
            is_active: row.is_active,
        })
    }
}

const POI_COLUMNS: &str =
    "id, name, slug, daily_capacity, timeslots, base_price, currency, tier, is_active";

#[async_trait]
impl PoiRepository for StorePoiRepository {
    async fn get_poi(&self, id: Uuid) -> CoreResult<Option<Poi>> {
        let row = sqlx::query_as::<_, PoiRow>(&format!("SELECT {} FROM pois WHERE id = $1", POI_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(Poi::try_from).transpose()
    }

    async fn list_pois(&self) -> CoreResult<Vec<Poi>> {
        let rows = sqlx::query_as::<_, PoiRow>(&format!("SELECT {} FROM pois ORDER BY name", POI_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.into_iter().map(Poi::try_from).collect()
    }

    async fn upsert_poi(&self, poi: &Poi) -> CoreResult<()> {
        let timeslots = serde_json::to_value(&poi.timeslots).map_err(CoreError::internal)?;

        sqlx::query(
            r#"
            INSERT INTO pois (id, name, slug, daily_capacity, timeslots, base_price, currency, tier, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                slug = EXCLUDED.slug,
                daily_capacity = EXCLUDED.daily_capacity,
                timeslots = EXCLUDED.timeslots,
                base_price = EXCLUDED.base_price,
                currency = EXCLUDED.currency,
                tier = EXCLUDED.tier,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(poi.id)
        .bind(&poi.name)
        .bind(&poi.slug)
        .bind(i32::try_from(poi.daily_capacity).unwrap_or(i32::MAX))
        .bind(timeslots)
        .bind(poi.base_price)
        .bind(&poi.currency)
        .bind(poi.tier.as_str())
        .bind(poi.is_active)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn set_tier(&self, id: Uuid, tier: PoiTier) -> CoreResult<()> {
        let result = sqlx::query("UPDATE pois SET tier = $2 WHERE id = $1")
            .bind(id)
            .bind(tier.as_str())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("POI", id));
        }
        Ok(())
    }
}
