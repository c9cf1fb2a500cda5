use thiserror::Error;
use uuid::Uuid;

/// Failure classes surfaced to the calling layer. Storage errors are wrapped
/// here and the active transaction is rolled back before any variant is
/// returned; a raw driver error never crosses the crate boundary on its own.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("insufficient stock for medication {medication_id}: requested {requested}, available {available}")]
    InsufficientStock {
        medication_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("medication {0} still has recorded deliveries")]
    MedicationInUse(Uuid),

    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i32),

    #[error("invalid input: {0}")]
    Invalid(&'static str),

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),
}
