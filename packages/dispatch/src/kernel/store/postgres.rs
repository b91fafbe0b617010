//! PostgreSQL-backed store.
//!
//! Conditional writes are plain `UPDATE ... WHERE <precondition>` statements
//! inside one transaction; zero affected rows means the precondition failed
//! and the whole transaction is dropped (rolled back).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::{BaseDispatchStore, Transaction};
use crate::common::{BookingId, GeoPoint, HelperId, RequesterId, StoreError};
use crate::domains::bookings::{Assignment, Booking, BookingFilter, RejectedHelpers};
use crate::domains::helpers::{Helper, HelperFilter, HelperProfilePatch};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct HelperRow {
    id: Uuid,
    name: String,
    email: Option<String>,
    skills: Vec<String>,
    rating: f64,
    rating_count: i32,
    status: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    active_offer: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<HelperRow> for Helper {
    type Error = StoreError;

    fn try_from(row: HelperRow) -> Result<Self, StoreError> {
        let skills = row
            .skills
            .iter()
            .map(|s| s.parse())
            .collect::<anyhow::Result<_>>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let status = row
            .status
            .parse()
            .map_err(|e: anyhow::Error| StoreError::Corrupt(e.to_string()))?;
        let location = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(GeoPoint {
                latitude,
                longitude,
            }),
            _ => None,
        };

        Ok(Helper {
            id: HelperId::from_uuid(row.id),
            name: row.name,
            email: row.email,
            skills,
            rating: row.rating,
            rating_count: u32::try_from(row.rating_count).unwrap_or(0),
            status,
            location,
            active_offer: row.active_offer.map(BookingId::from_uuid),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    requester_id: Uuid,
    requester_name: String,
    service_type: String,
    requester_latitude: f64,
    requester_longitude: f64,
    description: Option<String>,
    address: Option<String>,
    offer_price: Option<Decimal>,
    assignment: Option<Json<Assignment>>,
    rejected_helpers: Vec<Uuid>,
    assignment_attempts: i32,
    status: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, StoreError> {
        let corrupt = |e: anyhow::Error| StoreError::Corrupt(e.to_string());
        Ok(Booking {
            id: BookingId::from_uuid(row.id),
            requester_id: RequesterId::from_uuid(row.requester_id),
            requester_name: row.requester_name,
            service_type: row.service_type.parse().map_err(corrupt)?,
            requester_location: GeoPoint {
                latitude: row.requester_latitude,
                longitude: row.requester_longitude,
            },
            description: row.description,
            address: row.address,
            offer_price: row.offer_price,
            assignment: row.assignment.map(|json| json.0),
            rejected_helpers: row
                .rejected_helpers
                .into_iter()
                .map(HelperId::from_uuid)
                .collect::<RejectedHelpers>(),
            assignment_attempts: u32::try_from(row.assignment_attempts).unwrap_or(0),
            status: row.status.parse().map_err(corrupt)?,
            version: u64::try_from(row.version)
                .map_err(|_| StoreError::Corrupt(format!("negative version on {}", row.id)))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn version_param(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Corrupt(format!("version {version} overflows")))
}

fn rejected_param(rejected: &RejectedHelpers) -> Vec<Uuid> {
    rejected.iter().map(|id| id.into_uuid()).collect()
}

async fn booking_exists(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: BookingId,
) -> Result<bool, StoreError> {
    let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM bookings WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(found.is_some())
}

async fn helper_exists(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    id: HelperId,
) -> Result<bool, StoreError> {
    let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM helpers WHERE id = $1")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(found.is_some())
}

#[async_trait]
impl BaseDispatchStore for PostgresStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_helper(&self, helper: Helper) -> Result<(), StoreError> {
        let skills: Vec<String> = helper.skills.iter().map(|s| s.to_string()).collect();
        sqlx::query(
            "INSERT INTO helpers
                (id, name, email, skills, rating, rating_count, status,
                 latitude, longitude, active_offer, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(helper.id)
        .bind(&helper.name)
        .bind(&helper.email)
        .bind(&skills)
        .bind(helper.rating)
        .bind(i32::try_from(helper.rating_count).unwrap_or(i32::MAX))
        .bind(helper.status.to_string())
        .bind(helper.location.map(|l| l.latitude))
        .bind(helper.location.map(|l| l.longitude))
        .bind(helper.active_offer)
        .bind(helper.created_at)
        .bind(helper.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_helper(&self, id: HelperId) -> Result<Option<Helper>, StoreError> {
        sqlx::query_as::<_, HelperRow>("SELECT * FROM helpers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Helper::try_from)
            .transpose()
    }

    async fn list_helpers(&self, filter: &HelperFilter) -> Result<Vec<Helper>, StoreError> {
        sqlx::query_as::<_, HelperRow>(
            "SELECT * FROM helpers
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::text IS NULL OR $2 = ANY(skills))
             ORDER BY id",
        )
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.skill.map(|s| s.to_string()))
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Helper::try_from)
        .collect()
    }

    async fn update_helper_profile(
        &self,
        id: HelperId,
        patch: HelperProfilePatch,
    ) -> Result<Helper, StoreError> {
        let skills: Option<Vec<String>> = patch
            .skills
            .map(|skills| skills.iter().map(|s| s.to_string()).collect());
        sqlx::query_as::<_, HelperRow>(
            "UPDATE helpers SET
                latitude = COALESCE($2, latitude),
                longitude = COALESCE($3, longitude),
                skills = COALESCE($4, skills),
                updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(patch.location.map(|l| l.latitude))
        .bind(patch.location.map(|l| l.longitude))
        .bind(skills)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::helper_not_found(id))
        .and_then(Helper::try_from)
    }

    async fn create_booking(&self, booking: Booking) -> Result<BookingId, StoreError> {
        sqlx::query(
            "INSERT INTO bookings
                (id, requester_id, requester_name, service_type,
                 requester_latitude, requester_longitude, description, address, offer_price,
                 assignment, assigned_helper_id, rejected_helpers, assignment_attempts,
                 status, version, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(booking.id)
        .bind(booking.requester_id)
        .bind(&booking.requester_name)
        .bind(booking.service_type.to_string())
        .bind(booking.requester_location.latitude)
        .bind(booking.requester_location.longitude)
        .bind(&booking.description)
        .bind(&booking.address)
        .bind(booking.offer_price)
        .bind(booking.assignment.clone().map(Json))
        .bind(booking.assignee())
        .bind(rejected_param(&booking.rejected_helpers))
        .bind(i32::try_from(booking.assignment_attempts).unwrap_or(i32::MAX))
        .bind(booking.status.to_string())
        .bind(version_param(booking.version)?)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(booking.id)
    }

    async fn get_booking(&self, id: BookingId) -> Result<Option<Booking>, StoreError> {
        sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Booking::try_from)
            .transpose()
    }

    async fn list_bookings(&self, filter: &BookingFilter) -> Result<Vec<Booking>, StoreError> {
        sqlx::query_as::<_, BookingRow>(
            "SELECT * FROM bookings
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::uuid IS NULL OR requester_id = $2)
               AND ($3::uuid IS NULL OR assigned_helper_id = $3)
             ORDER BY created_at DESC, id DESC",
        )
        .bind(filter.status.map(|s| s.to_string()))
        .bind(filter.requester_id)
        .bind(filter.helper_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Booking::try_from)
        .collect()
    }

    async fn commit(&self, txn: Transaction) -> Result<Vec<Booking>, StoreError> {
        let mut tx = self.pool.begin().await?;

        for write in &txn.helpers {
            let result = sqlx::query(
                "UPDATE helpers SET status = $2, active_offer = $3, updated_at = NOW()
                 WHERE id = $1
                   AND status = $4
                   AND active_offer IS NOT DISTINCT FROM $5",
            )
            .bind(write.helper_id)
            .bind(write.next.status.to_string())
            .bind(write.next.active_offer)
            .bind(write.expected.status.to_string())
            .bind(write.expected.active_offer)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(if helper_exists(&mut tx, write.helper_id).await? {
                    StoreError::HelperConflict(write.helper_id)
                } else {
                    StoreError::helper_not_found(write.helper_id)
                });
            }
        }

        let mut committed = Vec::with_capacity(txn.bookings.len());
        for write in txn.bookings {
            let booking = write.booking;
            let result = sqlx::query(
                "UPDATE bookings SET
                    requester_name = $3,
                    service_type = $4,
                    requester_latitude = $5,
                    requester_longitude = $6,
                    description = $7,
                    address = $8,
                    offer_price = $9,
                    assignment = $10,
                    assigned_helper_id = $11,
                    rejected_helpers = $12,
                    assignment_attempts = $13,
                    status = $14,
                    updated_at = $15,
                    version = version + 1
                 WHERE id = $1 AND version = $2",
            )
            .bind(booking.id)
            .bind(version_param(write.expected_version)?)
            .bind(&booking.requester_name)
            .bind(booking.service_type.to_string())
            .bind(booking.requester_location.latitude)
            .bind(booking.requester_location.longitude)
            .bind(&booking.description)
            .bind(&booking.address)
            .bind(booking.offer_price)
            .bind(booking.assignment.clone().map(Json))
            .bind(booking.assignee())
            .bind(rejected_param(&booking.rejected_helpers))
            .bind(i32::try_from(booking.assignment_attempts).unwrap_or(i32::MAX))
            .bind(booking.status.to_string())
            .bind(booking.updated_at)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(if booking_exists(&mut tx, booking.id).await? {
                    StoreError::BookingConflict(booking.id)
                } else {
                    StoreError::booking_not_found(booking.id)
                });
            }

            committed.push(Booking {
                version: write.expected_version + 1,
                ..booking
            });
        }

        tx.commit().await?;
        Ok(committed)
    }
}
