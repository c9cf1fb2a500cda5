// src/reservations.rs
//
// Explicit user-driven status changes. The reconciler owns the time-based
// transitions; everything here happens because somebody pressed a button.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::CoreError;
use crate::models::{DetailStatus, EncounterRow, ReservationRow, ReservationStatus};

pub async fn get_reservation(
    db: &PgPool,
    reservation_id: Uuid,
) -> Result<ReservationRow, CoreError> {
    sqlx::query_as(
        r#"
        SELECT reservation_id, registered_at, kind, status, cancel_reason,
               origin_reservation_id, patient_id, slot_id, completed_at
        FROM reservation
        WHERE reservation_id = $1
        "#,
    )
    .bind(reservation_id)
    .fetch_optional(db)
    .await?
    .ok_or(CoreError::NotFound("reservation"))
}

pub async fn get_encounter(db: &PgPool, reservation_id: Uuid) -> Result<EncounterRow, CoreError> {
    sqlx::query_as(
        r#"
        SELECT encounter_id, reservation_id, scheduled_at, diagnosis,
               observations, treatment, status
        FROM encounter
        WHERE reservation_id = $1
        "#,
    )
    .bind(reservation_id)
    .fetch_optional(db)
    .await?
    .ok_or(CoreError::NotFound("encounter"))
}

/// Pending -> Confirmed.
pub async fn confirm_reservation(db: &PgPool, reservation_id: Uuid) -> Result<u64, CoreError> {
    let confirmed = sqlx::query(
        r#"
        UPDATE reservation
        SET status = $2
        WHERE reservation_id = $1
          AND status = $3
        "#,
    )
    .bind(reservation_id)
    .bind(ReservationStatus::Confirmed)
    .bind(ReservationStatus::Pending)
    .execute(db)
    .await?
    .rows_affected();

    if confirmed == 0 {
        return Err(CoreError::NotFound("pending reservation"));
    }
    tracing::info!(%reservation_id, "reservation confirmed");
    Ok(confirmed)
}

/// Any non-terminal reservation -> Cancelled, with the reason stamped. The
/// detail row (encounter, exam or operation) is cancelled in the same
/// transaction.
pub async fn cancel_reservation(
    db: &PgPool,
    reservation_id: Uuid,
    reason: &str,
) -> Result<u64, CoreError> {
    let mut tx = db.begin().await?;

    let cancelled = sqlx::query(
        r#"
        UPDATE reservation
        SET status = $2,
            cancel_reason = $3
        WHERE reservation_id = $1
          AND status IN ($4, $5)
        "#,
    )
    .bind(reservation_id)
    .bind(ReservationStatus::Cancelled)
    .bind(reason.trim())
    .bind(ReservationStatus::Pending)
    .bind(ReservationStatus::Confirmed)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if cancelled == 0 {
        return Err(CoreError::NotFound("open reservation"));
    }

    for table in ["encounter", "exam", "operation"] {
        sqlx::query(&format!(
            r#"
            UPDATE {table}
            SET status = $2
            WHERE reservation_id = $1
              AND status IN ($3, $4)
            "#
        ))
        .bind(reservation_id)
        .bind(DetailStatus::Cancelled)
        .bind(DetailStatus::Pending)
        .bind(DetailStatus::Confirmed)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    tracing::info!(%reservation_id, "reservation cancelled");
    Ok(cancelled)
}

fn validate_diagnosis(diagnosis: &str) -> Result<(), CoreError> {
    if diagnosis.trim().is_empty() {
        return Err(CoreError::Invalid("diagnosis must not be empty"));
    }
    Ok(())
}

/// Stores the clinical outcome on an open encounter. Statuses are left
/// untouched: a non-empty diagnosis is what the reconciler later reads as
/// "the visit happened" when it closes the record out.
pub async fn record_encounter_outcome(
    db: &PgPool,
    reservation_id: Uuid,
    diagnosis: &str,
    observations: Option<&str>,
    treatment: Option<&str>,
) -> Result<u64, CoreError> {
    validate_diagnosis(diagnosis)?;

    let modified = sqlx::query(
        r#"
        UPDATE encounter
        SET diagnosis = $2,
            observations = $3,
            treatment = $4
        WHERE reservation_id = $1
          AND status IN ($5, $6)
        "#,
    )
    .bind(reservation_id)
    .bind(diagnosis.trim())
    .bind(observations)
    .bind(treatment)
    .bind(DetailStatus::Pending)
    .bind(DetailStatus::Confirmed)
    .execute(db)
    .await?
    .rows_affected();

    if modified == 0 {
        return Err(CoreError::NotFound("open encounter"));
    }

    tracing::info!(%reservation_id, "encounter outcome recorded");
    Ok(modified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnosis_must_have_content() {
        assert!(validate_diagnosis("caries on 26").is_ok());
        assert!(validate_diagnosis("").is_err());
        assert!(validate_diagnosis("   ").is_err());
    }
}
