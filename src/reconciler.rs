// src/reconciler.rs

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::CoreError;
use crate::models::{DetailStatus, ReservationStatus};

/// Row counts and per-category failures for one full sweep.
#[derive(Debug, Default, Serialize)]
pub struct ReconcileSummary {
    pub appointments_completed: u64,
    pub appointments_missed: u64,
    pub exams_cancelled: u64,
    pub operations_cancelled: u64,
    pub errors: Vec<String>,
}

/// Batch sweep that moves expired appointment-family reservations into their
/// terminal states, so the stored status keeps up with the calendar even when
/// nobody reopens the record.
pub struct Reconciler {
    db: PgPool,
    clock: Arc<dyn Clock>,
}

/// An appointment counts as held once its start time has passed.
fn completion_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now
}

/// A missing diagnosis only means a no-show once the whole day is over;
/// same-day encounters are left alone until the next day starts.
fn missed_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(now.date_naive().and_hms_opt(0, 0, 0).unwrap(), Utc)
}

impl Reconciler {
    pub fn new(db: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Runs the three categories independently. A failure in one rolls back
    /// and is reported in the summary; the others still run.
    pub async fn run(&self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        match self.reconcile_appointments().await {
            Ok((completed, missed)) => {
                summary.appointments_completed = completed;
                summary.appointments_missed = missed;
            }
            Err(e) => {
                tracing::warn!("appointment reconciliation failed: {e}");
                summary.errors.push(format!("appointments: {e}"));
            }
        }

        match self.reconcile_exams().await {
            Ok(cancelled) => summary.exams_cancelled = cancelled,
            Err(e) => {
                tracing::warn!("exam reconciliation failed: {e}");
                summary.errors.push(format!("exams: {e}"));
            }
        }

        match self.reconcile_operations().await {
            Ok(cancelled) => summary.operations_cancelled = cancelled,
            Err(e) => {
                tracing::warn!("operation reconciliation failed: {e}");
                summary.errors.push(format!("operations: {e}"));
            }
        }

        tracing::info!(
            appointments_completed = summary.appointments_completed,
            appointments_missed = summary.appointments_missed,
            exams_cancelled = summary.exams_cancelled,
            operations_cancelled = summary.operations_cancelled,
            failed_categories = summary.errors.len(),
            "reconciliation sweep done"
        );
        summary
    }

    /// Two set-based passes over confirmed medical appointments, in one
    /// transaction: encounters with a recorded diagnosis whose start time has
    /// passed become Completed/Completed; encounters still without a
    /// diagnosis whose date has fully elapsed become Missed/Cancelled.
    pub async fn reconcile_appointments(&self) -> Result<(u64, u64), CoreError> {
        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let completed_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE reservation r
            SET status = $1,
                completed_at = $2
            FROM encounter e
            WHERE e.reservation_id = r.reservation_id
              AND r.status = $3
              AND e.status IN ($4, $5)
              AND COALESCE(e.diagnosis, '') <> ''
              AND e.scheduled_at < $6
            RETURNING r.reservation_id
            "#,
        )
        .bind(ReservationStatus::Completed)
        .bind(now)
        .bind(ReservationStatus::Confirmed)
        .bind(DetailStatus::Pending)
        .bind(DetailStatus::Confirmed)
        .bind(completion_cutoff(now))
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE encounter
            SET status = $1
            WHERE reservation_id = ANY($2)
            "#,
        )
        .bind(DetailStatus::Completed)
        .bind(&completed_ids)
        .execute(&mut *tx)
        .await?;

        let missed_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE reservation r
            SET status = $1
            FROM encounter e
            WHERE e.reservation_id = r.reservation_id
              AND r.status = $2
              AND e.status IN ($3, $4)
              AND COALESCE(e.diagnosis, '') = ''
              AND e.scheduled_at < $5
            RETURNING r.reservation_id
            "#,
        )
        .bind(ReservationStatus::Missed)
        .bind(ReservationStatus::Confirmed)
        .bind(DetailStatus::Pending)
        .bind(DetailStatus::Confirmed)
        .bind(missed_cutoff(now))
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE encounter
            SET status = $1
            WHERE reservation_id = ANY($2)
            "#,
        )
        .bind(DetailStatus::Cancelled)
        .bind(&missed_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((completed_ids.len() as u64, missed_ids.len() as u64))
    }

    /// Pending exams whose date has passed while the parent reservation is
    /// still Confirmed. Date-only in both directions for exams.
    pub async fn reconcile_exams(&self) -> Result<u64, CoreError> {
        let today = self.clock.today();
        let mut tx = self.db.begin().await?;

        let expired_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE reservation r
            SET status = $1
            FROM exam x
            WHERE x.reservation_id = r.reservation_id
              AND r.status = $2
              AND x.status = $3
              AND x.scheduled_on < $4
            RETURNING r.reservation_id
            "#,
        )
        .bind(ReservationStatus::Missed)
        .bind(ReservationStatus::Confirmed)
        .bind(DetailStatus::Pending)
        .bind(today)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE exam
            SET status = $1
            WHERE reservation_id = ANY($2)
            "#,
        )
        .bind(DetailStatus::Cancelled)
        .bind(&expired_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(expired_ids.len() as u64)
    }

    /// Same rule as exams, over the operation table.
    pub async fn reconcile_operations(&self) -> Result<u64, CoreError> {
        let today = self.clock.today();
        let mut tx = self.db.begin().await?;

        let expired_ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE reservation r
            SET status = $1
            FROM operation o
            WHERE o.reservation_id = r.reservation_id
              AND r.status = $2
              AND o.status = $3
              AND o.scheduled_on < $4
            RETURNING r.reservation_id
            "#,
        )
        .bind(ReservationStatus::Missed)
        .bind(ReservationStatus::Confirmed)
        .bind(DetailStatus::Pending)
        .bind(today)
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE operation
            SET status = $1
            WHERE reservation_id = ANY($2)
            "#,
        )
        .bind(DetailStatus::Cancelled)
        .bind(&expired_ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(expired_ids.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn completion_counts_from_start_time() {
        let scheduled = at(2025, 1, 9, 14, 0);

        // an hour after the start time the encounter can be closed out
        assert!(scheduled < completion_cutoff(at(2025, 1, 9, 15, 0)));
        // an hour before it cannot
        assert!(scheduled >= completion_cutoff(at(2025, 1, 9, 13, 0)));
    }

    #[test]
    fn missed_waits_for_the_day_to_elapse() {
        let scheduled = at(2025, 1, 9, 14, 0);

        // same day, hours after the start time: not yet a no-show
        assert!(scheduled >= missed_cutoff(at(2025, 1, 9, 15, 0)));
        assert!(scheduled >= missed_cutoff(at(2025, 1, 9, 23, 59)));
        // next morning it is
        assert!(scheduled < missed_cutoff(at(2025, 1, 10, 9, 0)));
    }

    #[test]
    fn cutoffs_are_asymmetric_on_the_scheduled_day() {
        let now = at(2025, 1, 9, 15, 0);
        let scheduled = at(2025, 1, 9, 14, 0);

        // with a diagnosis this would already complete, without one it is
        // not yet missed
        assert!(scheduled < completion_cutoff(now));
        assert!(scheduled >= missed_cutoff(now));
    }
}
