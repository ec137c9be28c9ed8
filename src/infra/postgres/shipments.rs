//! Shipment lookups against the platform's `shipments` table

use async_trait::async_trait;
use sqlx::postgres::PgPool;

use crate::domain::ShipmentRef;
use crate::infra::{Result, ShipmentDirectory};

/// PostgreSQL-backed shipment directory (read-only)
pub struct PgShipmentDirectory {
    pool: PgPool,
}

impl PgShipmentDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShipmentDirectory for PgShipmentDirectory {
    async fn exists(&self, shipment_ref: &ShipmentRef) -> Result<bool> {
        let row: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM shipments WHERE shipment_ref = $1)")
                .bind(shipment_ref.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0)
    }
}
