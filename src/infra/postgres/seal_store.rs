//! PostgreSQL seal store
//!
//! Every write to an existing row is `UPDATE ... WHERE id = $1 AND version = $2`.
//! Zero affected rows means another writer got there first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{FromRow, Transaction};
use uuid::Uuid;

use crate::domain::{
    Challenge, Seal, SealId, SealStatus, SerialNumber, ShipmentRef, TamperIndicator,
    VerificationAttempt, VerificationId,
};
use crate::infra::{Result, SealError, SealRepository};

const SEAL_COLUMNS: &str = r#"
    id, serial_number, status, shipment_ref,
    public_key, encrypted_private_key, challenge,
    expected_read_count, actual_read_count,
    attached_at, attached_by, attached_location, attached_lat, attached_lng,
    removed_at, removed_by, removed_location, removal_reason,
    tamper_indicator, tamper_details,
    expires_at, created_at, updated_at, version
"#;

/// Database row for seals
#[derive(FromRow)]
struct SealRow {
    id: Uuid,
    serial_number: String,
    status: String,
    shipment_ref: Option<String>,
    public_key: Vec<u8>,
    encrypted_private_key: Vec<u8>,
    challenge: Vec<u8>,
    expected_read_count: i64,
    actual_read_count: i64,
    attached_at: Option<DateTime<Utc>>,
    attached_by: Option<String>,
    attached_location: Option<String>,
    attached_lat: Option<f64>,
    attached_lng: Option<f64>,
    removed_at: Option<DateTime<Utc>>,
    removed_by: Option<String>,
    removed_location: Option<String>,
    removal_reason: Option<String>,
    tamper_indicator: String,
    tamper_details: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<SealRow> for Seal {
    type Error = SealError;

    fn try_from(row: SealRow) -> Result<Self> {
        let corrupt = |field: &str| {
            SealError::Internal(format!("corrupt {field} on seal row {}", row.id))
        };

        Ok(Seal {
            id: SealId::from_uuid(row.id),
            serial_number: SerialNumber::parse(&row.serial_number)
                .map_err(|_| corrupt("serial_number"))?,
            status: SealStatus::parse(&row.status).ok_or_else(|| corrupt("status"))?,
            shipment_ref: row.shipment_ref.map(ShipmentRef),
            public_key: row
                .public_key
                .as_slice()
                .try_into()
                .map_err(|_| corrupt("public_key"))?,
            encrypted_private_key: row.encrypted_private_key,
            challenge: Challenge::from_slice(&row.challenge).ok_or_else(|| corrupt("challenge"))?,
            expected_read_count: from_db_count(row.expected_read_count)
                .ok_or_else(|| corrupt("expected_read_count"))?,
            actual_read_count: from_db_count(row.actual_read_count)
                .ok_or_else(|| corrupt("actual_read_count"))?,
            attached_at: row.attached_at,
            attached_by: row.attached_by,
            attached_location: row.attached_location,
            attached_lat: row.attached_lat,
            attached_lng: row.attached_lng,
            removed_at: row.removed_at,
            removed_by: row.removed_by,
            removed_location: row.removed_location,
            removal_reason: row.removal_reason,
            tamper_indicator: TamperIndicator::parse(&row.tamper_indicator)
                .ok_or_else(|| corrupt("tamper_indicator"))?,
            tamper_details: row.tamper_details,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: from_db_count(row.version).ok_or_else(|| corrupt("version"))?,
        })
    }
}

/// Database row for verification attempts
#[derive(FromRow)]
struct VerificationRow {
    id: Uuid,
    seal_id: Uuid,
    verified_by: String,
    verified_at: DateTime<Utc>,
    location: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
    read_counter: i64,
    signature_provided: Vec<u8>,
    signature_expected: Vec<u8>,
    challenge_used: Vec<u8>,
    is_valid: bool,
    tamper_indicator: String,
    tamper_details: Option<String>,
    device_info: Option<serde_json::Value>,
}

impl TryFrom<VerificationRow> for VerificationAttempt {
    type Error = SealError;

    fn try_from(row: VerificationRow) -> Result<Self> {
        let corrupt = |field: &str| {
            SealError::Internal(format!("corrupt {field} on verification row {}", row.id))
        };

        Ok(VerificationAttempt {
            id: VerificationId(row.id),
            seal_id: SealId::from_uuid(row.seal_id),
            verified_by: row.verified_by,
            verified_at: row.verified_at,
            location: row.location,
            lat: row.lat,
            lng: row.lng,
            read_counter: from_db_count(row.read_counter).ok_or_else(|| corrupt("read_counter"))?,
            signature_provided: row.signature_provided,
            signature_expected: row.signature_expected,
            challenge_used: Challenge::from_slice(&row.challenge_used)
                .ok_or_else(|| corrupt("challenge_used"))?,
            is_valid: row.is_valid,
            tamper_indicator: TamperIndicator::parse(&row.tamper_indicator)
                .ok_or_else(|| corrupt("tamper_indicator"))?,
            tamper_details: row.tamper_details,
            device_info: row.device_info,
        })
    }
}

fn from_db_count(value: i64) -> Option<u64> {
    u64::try_from(value).ok()
}

fn to_db_count(value: u64, field: &str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| SealError::InvalidFormat(format!("{field} {value} exceeds storage range")))
}

/// PostgreSQL-backed seal repository
pub struct PgSealRepository {
    pool: PgPool,
}

impl PgSealRepository {
    /// Create a new seal repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_one_where(&self, clause: &str, bind: SealLookup<'_>) -> Result<Option<Seal>> {
        let sql = format!("SELECT {SEAL_COLUMNS} FROM seals WHERE {clause}");
        let query = sqlx::query_as::<_, SealRow>(&sql);
        let row = match bind {
            SealLookup::Id(id) => query.bind(id).fetch_optional(&self.pool).await?,
            SealLookup::Serial(serial) => query.bind(serial).fetch_optional(&self.pool).await?,
        };
        row.map(Seal::try_from).transpose()
    }

    /// Conditional full-row update; returns the stored seal or a concurrency error
    async fn update_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        seal: &Seal,
        expected_version: u64,
    ) -> Result<Seal> {
        let sql = format!(
            r#"
            UPDATE seals SET
                status = $3,
                shipment_ref = $4,
                challenge = $5,
                expected_read_count = $6,
                actual_read_count = $7,
                attached_at = $8,
                attached_by = $9,
                attached_location = $10,
                attached_lat = $11,
                attached_lng = $12,
                removed_at = $13,
                removed_by = $14,
                removed_location = $15,
                removal_reason = $16,
                tamper_indicator = $17,
                tamper_details = $18,
                updated_at = $19,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {SEAL_COLUMNS}
            "#
        );

        let row: Option<SealRow> = sqlx::query_as(&sql)
            .bind(seal.id.0)
            .bind(to_db_count(expected_version, "version")?)
            .bind(seal.status.as_str())
            .bind(seal.shipment_ref.as_ref().map(ShipmentRef::as_str))
            .bind(seal.challenge.as_bytes().as_slice())
            .bind(to_db_count(seal.expected_read_count, "expected_read_count")?)
            .bind(to_db_count(seal.actual_read_count, "actual_read_count")?)
            .bind(seal.attached_at)
            .bind(&seal.attached_by)
            .bind(&seal.attached_location)
            .bind(seal.attached_lat)
            .bind(seal.attached_lng)
            .bind(seal.removed_at)
            .bind(&seal.removed_by)
            .bind(&seal.removed_location)
            .bind(&seal.removal_reason)
            .bind(seal.tamper_indicator.as_str())
            .bind(&seal.tamper_details)
            .bind(seal.updated_at)
            .fetch_optional(&mut **tx)
            .await?;

        match row {
            Some(row) => Seal::try_from(row),
            None => {
                let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM seals WHERE id = $1")
                    .bind(seal.id.0)
                    .fetch_optional(&mut **tx)
                    .await?;
                Err(match exists {
                    Some(_) => SealError::ConcurrentModification {
                        seal_id: seal.id,
                        expected_version,
                    },
                    None => SealError::SealNotFound(seal.id.to_string()),
                })
            }
        }
    }
}

enum SealLookup<'a> {
    Id(Uuid),
    Serial(&'a str),
}

#[async_trait]
impl SealRepository for PgSealRepository {
    async fn create_seal(&self, seal: &Seal) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO seals (
                id, serial_number, status, shipment_ref,
                public_key, encrypted_private_key, challenge,
                expected_read_count, actual_read_count,
                tamper_indicator, expires_at, created_at, updated_at, version
            ) VALUES (
                $1, $2, $3, $4,
                $5, $6, $7,
                $8, $9,
                $10, $11, $12, $13, $14
            )
            "#,
        )
        .bind(seal.id.0)
        .bind(seal.serial_number.as_str())
        .bind(seal.status.as_str())
        .bind(seal.shipment_ref.as_ref().map(ShipmentRef::as_str))
        .bind(seal.public_key.as_slice())
        .bind(&seal.encrypted_private_key)
        .bind(seal.challenge.as_bytes().as_slice())
        .bind(to_db_count(seal.expected_read_count, "expected_read_count")?)
        .bind(to_db_count(seal.actual_read_count, "actual_read_count")?)
        .bind(seal.tamper_indicator.as_str())
        .bind(seal.expires_at)
        .bind(seal.created_at)
        .bind(seal.updated_at)
        .bind(to_db_count(seal.version, "version")?)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(SealError::DuplicateSerialNumber(seal.serial_number.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_seal(&self, id: SealId) -> Result<Option<Seal>> {
        self.fetch_one_where("id = $1", SealLookup::Id(id.0)).await
    }

    async fn find_seal_by_serial(&self, serial_number: &SerialNumber) -> Result<Option<Seal>> {
        self.fetch_one_where("serial_number = $1", SealLookup::Serial(serial_number.as_str()))
            .await
    }

    async fn update_seal(&self, seal: &Seal, expected_version: u64) -> Result<Seal> {
        let mut tx = self.pool.begin().await?;
        let stored = Self::update_in_tx(&mut tx, seal, expected_version).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn record_verification(
        &self,
        seal: &Seal,
        attempt: &VerificationAttempt,
        expected_version: u64,
    ) -> Result<Seal> {
        let mut tx = self.pool.begin().await?;

        // Update first so a lost race aborts before the attempt row exists.
        let stored = Self::update_in_tx(&mut tx, seal, expected_version).await?;

        sqlx::query(
            r#"
            INSERT INTO seal_verifications (
                id, seal_id, verified_by, verified_at,
                location, lat, lng, read_counter,
                signature_provided, signature_expected, challenge_used,
                is_valid, tamper_indicator, tamper_details, device_info
            ) VALUES (
                $1, $2, $3, $4,
                $5, $6, $7, $8,
                $9, $10, $11,
                $12, $13, $14, $15
            )
            "#,
        )
        .bind(attempt.id.0)
        .bind(attempt.seal_id.0)
        .bind(&attempt.verified_by)
        .bind(attempt.verified_at)
        .bind(&attempt.location)
        .bind(attempt.lat)
        .bind(attempt.lng)
        .bind(to_db_count(attempt.read_counter, "read_counter")?)
        .bind(&attempt.signature_provided)
        .bind(&attempt.signature_expected)
        .bind(attempt.challenge_used.as_bytes().as_slice())
        .bind(attempt.is_valid)
        .bind(attempt.tamper_indicator.as_str())
        .bind(&attempt.tamper_details)
        .bind(&attempt.device_info)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn list_verifications(&self, seal_id: SealId) -> Result<Vec<VerificationAttempt>> {
        let rows: Vec<VerificationRow> = sqlx::query_as(
            r#"
            SELECT id, seal_id, verified_by, verified_at,
                   location, lat, lng, read_counter,
                   signature_provided, signature_expected, challenge_used,
                   is_valid, tamper_indicator, tamper_details, device_info
            FROM seal_verifications
            WHERE seal_id = $1
            ORDER BY verified_at ASC, id ASC
            "#,
        )
        .bind(seal_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(VerificationAttempt::try_from).collect()
    }

    async fn list_by_shipment(&self, shipment_ref: &ShipmentRef) -> Result<Vec<Seal>> {
        let sql = format!(
            "SELECT {SEAL_COLUMNS} FROM seals WHERE shipment_ref = $1 ORDER BY attached_at ASC"
        );
        let rows: Vec<SealRow> = sqlx::query_as(&sql)
            .bind(shipment_ref.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Seal::try_from).collect()
    }

    async fn list_available(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Seal>> {
        let sql = format!(
            r#"
            SELECT {SEAL_COLUMNS} FROM seals
            WHERE status = 'PROVISIONED'
              AND (expires_at IS NULL OR expires_at >= $1)
            ORDER BY created_at ASC
            LIMIT $2
            "#
        );
        let rows: Vec<SealRow> = sqlx::query_as(&sql)
            .bind(now)
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Seal::try_from).collect()
    }

    async fn find_expired(&self, now: DateTime<Utc>) -> Result<Vec<SealId>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM seals
            WHERE status IN ('PROVISIONED', 'ATTACHED', 'VERIFIED', 'TAMPERED')
              AND expires_at IS NOT NULL
              AND expires_at < $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| SealId::from_uuid(id)).collect())
    }

    async fn mark_expired(&self, ids: &[SealId], now: DateTime<Utc>) -> Result<Vec<SealId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(|id| id.0).collect();

        // Eligibility is re-checked here, so racing sweeps and verifies only
        // touch rows still due at commit time.
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE seals SET
                status = 'EXPIRED',
                shipment_ref = NULL,
                updated_at = $2,
                version = version + 1
            WHERE id = ANY($1)
              AND status IN ('PROVISIONED', 'ATTACHED', 'VERIFIED', 'TAMPERED')
              AND expires_at IS NOT NULL
              AND expires_at < $2
            RETURNING id
            "#,
        )
        .bind(&ids)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| SealId::from_uuid(id)).collect())
    }

    async fn count_by_status(&self) -> Result<Vec<(SealStatus, u64)>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM seals GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(status, count)| {
                let status = SealStatus::parse(&status)
                    .ok_or_else(|| SealError::Internal(format!("unknown seal status {status}")))?;
                Ok((status, from_db_count(count).unwrap_or(0)))
            })
            .collect()
    }
}
