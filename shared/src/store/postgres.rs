//! Document-store-backed `OrderStore`/`DriverStore` (spec §10.5): orders
//! and drivers are stored as JSONB documents rather than normalized
//! rows, matching the source system's document-store framing (spec §3
//! Ownership). Conditional updates (`try_convert_to_instant`) lean on
//! Postgres's JSONB predicates instead of a separate optimistic-lock
//! column.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::domain::{Driver, FleetTag, Order};

pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl crate::ports::OrderStore for PostgresOrderStore {
    async fn get(&self, order_id: &str) -> anyhow::Result<Option<Order>> {
        let row = sqlx::query("SELECT document FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(r) => Some(serde_json::from_value(r.try_get("document")?)?),
            None => None,
        })
    }

    async fn insert(&self, order: &Order) -> anyhow::Result<()> {
        let document = serde_json::to_value(order)?;
        sqlx::query(
            "INSERT INTO orders (id, document) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document",
        )
        .bind(order.id.to_string())
        .bind(document)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save(&self, order: &Order) -> anyhow::Result<()> {
        self.insert(order).await
    }

    async fn find_needing_reminder(&self, within: chrono::Duration, now: DateTime<Utc>) -> anyhow::Result<Vec<Order>> {
        let until = now + within;
        let rows = sqlx::query(
            "SELECT document FROM orders
             WHERE document->>'status' = 'scheduled_accepted'
               AND (document->>'driver_notified')::boolean = false
               AND document->>'assigned_driver' IS NOT NULL
               AND (document->>'scheduled_pickup_at')::timestamptz BETWEEN $1 AND $2",
        )
        .bind(now)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| Ok(serde_json::from_value(r.try_get("document")?)?))
            .collect()
    }

    async fn find_ready_to_convert(&self, within: chrono::Duration, now: DateTime<Utc>) -> anyhow::Result<Vec<Order>> {
        let until = now + within;
        let rows = sqlx::query(
            "SELECT document FROM orders
             WHERE document->>'status' = 'waiting'
               AND document->>'kind' = 'scheduled'
               AND (document->>'scheduled_pickup_at')::timestamptz BETWEEN $1 AND $2",
        )
        .bind(now)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| Ok(serde_json::from_value(r.try_get("document")?)?))
            .collect()
    }

    async fn try_convert_to_instant(&self, order_id: &str, now: DateTime<Utc>) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE orders
             SET document = jsonb_set(
                   jsonb_set(
                     jsonb_set(document, '{kind}', '\"instant\"', true),
                     '{converted_from}', '\"scheduled\"', true
                   ),
                   '{updated_at}', to_jsonb($2::timestamptz), true
                 )
             WHERE id = $1
               AND document->>'status' = 'waiting'
               AND document->>'kind' = 'scheduled'",
        )
        .bind(order_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

pub struct PostgresDriverStore {
    pool: PgPool,
}

impl PostgresDriverStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl crate::ports::DriverStore for PostgresDriverStore {
    async fn get(&self, driver_id: &str) -> anyhow::Result<Option<Driver>> {
        let row = sqlx::query("SELECT document FROM drivers WHERE id = $1")
            .bind(driver_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(r) => Some(serde_json::from_value(r.try_get("document")?)?),
            None => None,
        })
    }

    async fn save(&self, driver: &Driver) -> anyhow::Result<()> {
        let document = serde_json::to_value(driver)?;
        sqlx::query(
            "INSERT INTO drivers (id, document) VALUES ($1, $2)
             ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document",
        )
        .bind(&driver.id)
        .bind(document)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// spec §4.2: base eligibility pool is `online ∧ active ∧ approved ∧
    /// state = idle`. Fleet compatibility is evaluated in Rust via
    /// `FleetTag::may_serve` rather than encoded as SQL, since it is a
    /// small in-memory rule rather than something worth indexing.
    async fn find_eligible(&self, order_fleet: FleetTag) -> anyhow::Result<Vec<Driver>> {
        let rows = sqlx::query(
            "SELECT document FROM drivers
             WHERE (document->>'online')::boolean = true
               AND (document->>'active')::boolean = true
               AND (document->>'approved')::boolean = true
               AND document->>'state' = 'idle'",
        )
        .fetch_all(&self.pool)
        .await?;

        let drivers: Vec<Driver> = rows
            .into_iter()
            .map(|r| Ok::<_, anyhow::Error>(serde_json::from_value(r.try_get("document")?)?))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(drivers.into_iter().filter(|d| d.fleet.may_serve(order_fleet)).collect())
    }
}
