use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/* -------------------------
   Status domains
--------------------------*/

/// Reservation lifecycle. Completed, Missed and Cancelled are terminal;
/// nothing ever moves a reservation back out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum ReservationStatus {
    Pending = 0,
    Confirmed = 1,
    Completed = 2,
    Missed = 3,
    Cancelled = 4,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReservationStatus::Completed | ReservationStatus::Missed | ReservationStatus::Cancelled
        )
    }
}

/// Status of the 1:1 detail row (encounter, exam, operation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum DetailStatus {
    Pending = 0,
    Confirmed = 1,
    Completed = 2,
    Cancelled = 3,
}

/// What kind of encounter a reservation books.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "smallint")]
#[repr(i16)]
pub enum ReservationKind {
    Appointment = 0,
    Exam = 1,
    Operation = 2,
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReservationRow {
    pub reservation_id: Uuid,
    pub registered_at: DateTime<Utc>,
    pub kind: ReservationKind,
    pub status: ReservationStatus,
    pub cancel_reason: Option<String>,
    pub origin_reservation_id: Option<Uuid>,
    pub patient_id: Uuid,
    pub slot_id: Uuid,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EncounterRow {
    pub encounter_id: Uuid,
    pub reservation_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    /// Empty/NULL diagnosis means the patient has not been seen yet.
    pub diagnosis: Option<String>,
    pub observations: Option<String>,
    pub treatment: Option<String>,
    pub status: DetailStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MedicationRow {
    pub medication_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub stock: i32,
    pub registered_on: NaiveDate,
    pub expires_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeliveryRow {
    pub delivery_id: Uuid,
    pub employee_id: Uuid,
    pub patient_id: Uuid,
    pub medication_id: Uuid,
    pub quantity: i32,
    pub delivered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!ReservationStatus::Pending.is_terminal());
        assert!(!ReservationStatus::Confirmed.is_terminal());
        assert!(ReservationStatus::Completed.is_terminal());
        assert!(ReservationStatus::Missed.is_terminal());
        assert!(ReservationStatus::Cancelled.is_terminal());
    }
}
