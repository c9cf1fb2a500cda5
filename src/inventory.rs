// src/inventory.rs

use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::cache::{LookupCache, fingerprint};
use crate::error::CoreError;
use crate::models::{DeliveryRow, MedicationRow};

/// Transactional stock debit/credit around medication deliveries. Stock never
/// goes below zero; every decision reads the stock row under a `FOR UPDATE`
/// lock so concurrent requests for the same medication are serialized by the
/// database.
pub struct InventoryLedger {
    db: PgPool,
    cache: Option<Arc<dyn LookupCache>>,
}

fn validate_quantity(quantity: i32) -> Result<(), CoreError> {
    if quantity <= 0 {
        return Err(CoreError::InvalidQuantity(quantity));
    }
    Ok(())
}

/// How an edited delivery moves stock around.
#[derive(Debug, PartialEq, Eq)]
enum UpdatePlan {
    /// Same medication: only the difference moves.
    Adjust { difference: i32 },
    /// Medication swapped: the old row gets its full quantity back, the new
    /// row is debited from scratch.
    Reassign { credit: i32, debit: i32 },
}

fn update_plan(
    old_medication: Uuid,
    old_quantity: i32,
    new_medication: Uuid,
    new_quantity: i32,
) -> UpdatePlan {
    if old_medication == new_medication {
        UpdatePlan::Adjust {
            difference: new_quantity - old_quantity,
        }
    } else {
        UpdatePlan::Reassign {
            credit: old_quantity,
            debit: new_quantity,
        }
    }
}

/// Lock the medication's stock row and return the current stock.
async fn lock_stock(
    tx: &mut Transaction<'_, Postgres>,
    medication_id: Uuid,
) -> Result<i32, CoreError> {
    sqlx::query_scalar(
        r#"
        SELECT stock
        FROM medication
        WHERE medication_id = $1
        FOR UPDATE
        "#,
    )
    .bind(medication_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(CoreError::NotFound("medication"))
}

async fn debit_stock(
    tx: &mut Transaction<'_, Postgres>,
    medication_id: Uuid,
    amount: i32,
) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        UPDATE medication
        SET stock = stock - $2
        WHERE medication_id = $1
        "#,
    )
    .bind(medication_id)
    .bind(amount)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn credit_stock(
    tx: &mut Transaction<'_, Postgres>,
    medication_id: Uuid,
    amount: i32,
) -> Result<(), CoreError> {
    let credited = sqlx::query(
        r#"
        UPDATE medication
        SET stock = stock + $2
        WHERE medication_id = $1
        "#,
    )
    .bind(medication_id)
    .bind(amount)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if credited == 0 {
        return Err(CoreError::NotFound("medication"));
    }
    Ok(())
}

impl InventoryLedger {
    pub fn new(db: PgPool, cache: Option<Arc<dyn LookupCache>>) -> Self {
        Self { db, cache }
    }

    /// Records a dispensation and debits the medication's stock, as one
    /// atomic unit. Fails with InsufficientStock (nothing mutated) when the
    /// stock cannot cover the quantity.
    pub async fn register_delivery(
        &self,
        employee_id: Uuid,
        patient_id: Uuid,
        medication_id: Uuid,
        quantity: i32,
    ) -> Result<Uuid, CoreError> {
        validate_quantity(quantity)?;

        let mut tx = self.db.begin().await?;

        let available = lock_stock(&mut tx, medication_id).await?;
        if available < quantity {
            return Err(CoreError::InsufficientStock {
                medication_id,
                requested: quantity,
                available,
            });
        }

        let delivery_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO delivery (employee_id, patient_id, medication_id, quantity)
            VALUES ($1, $2, $3, $4)
            RETURNING delivery_id
            "#,
        )
        .bind(employee_id)
        .bind(patient_id)
        .bind(medication_id)
        .bind(quantity)
        .fetch_one(&mut *tx)
        .await?;

        debit_stock(&mut tx, medication_id, quantity).await?;

        tx.commit().await?;

        self.invalidate_medication(medication_id).await;
        tracing::info!(%delivery_id, %medication_id, quantity, "delivery registered");
        Ok(delivery_id)
    }

    /// Rewrites a delivery. The old quantity's effect on stock is reversed
    /// before the new one is applied; on the same medication only the
    /// difference moves, and returning stock is never blocked. All stock
    /// mutations and the delivery row update commit together or not at all.
    pub async fn update_delivery(
        &self,
        delivery_id: Uuid,
        employee_id: Uuid,
        patient_id: Uuid,
        medication_id: Uuid,
        quantity: i32,
    ) -> Result<u64, CoreError> {
        validate_quantity(quantity)?;

        let mut tx = self.db.begin().await?;

        let existing: DeliveryRow = sqlx::query_as(
            r#"
            SELECT delivery_id, employee_id, patient_id, medication_id, quantity, delivered_at
            FROM delivery
            WHERE delivery_id = $1
            FOR UPDATE
            "#,
        )
        .bind(delivery_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(CoreError::NotFound("delivery"))?;

        match update_plan(
            existing.medication_id,
            existing.quantity,
            medication_id,
            quantity,
        ) {
            UpdatePlan::Adjust { difference: 0 } => {}
            UpdatePlan::Adjust { difference } if difference > 0 => {
                let available = lock_stock(&mut tx, medication_id).await?;
                if available < difference {
                    return Err(CoreError::InsufficientStock {
                        medication_id,
                        requested: difference,
                        available,
                    });
                }
                debit_stock(&mut tx, medication_id, difference).await?;
            }
            UpdatePlan::Adjust { difference } => {
                credit_stock(&mut tx, medication_id, -difference).await?;
            }
            UpdatePlan::Reassign { credit, debit } => {
                credit_stock(&mut tx, existing.medication_id, credit).await?;

                let available = lock_stock(&mut tx, medication_id).await?;
                if available < debit {
                    // rollback also takes the credit above back with it
                    return Err(CoreError::InsufficientStock {
                        medication_id,
                        requested: debit,
                        available,
                    });
                }
                debit_stock(&mut tx, medication_id, debit).await?;
            }
        }

        let modified = sqlx::query(
            r#"
            UPDATE delivery
            SET employee_id = $2,
                patient_id = $3,
                medication_id = $4,
                quantity = $5
            WHERE delivery_id = $1
            "#,
        )
        .bind(delivery_id)
        .bind(employee_id)
        .bind(patient_id)
        .bind(medication_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        self.invalidate_medication(existing.medication_id).await;
        if medication_id != existing.medication_id {
            self.invalidate_medication(medication_id).await;
        }
        tracing::info!(%delivery_id, %medication_id, quantity, "delivery updated");
        Ok(modified)
    }

    /// Read-through medication lookup.
    pub async fn get_medication(&self, medication_id: Uuid) -> Result<MedicationRow, CoreError> {
        let key = fingerprint("medication.get", &[&medication_id.to_string()]);

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await {
                if let Ok(row) = serde_json::from_value::<MedicationRow>(hit) {
                    return Ok(row);
                }
            }
        }

        let row: MedicationRow = sqlx::query_as(
            r#"
            SELECT medication_id, name, description, stock, registered_on, expires_on
            FROM medication
            WHERE medication_id = $1
            "#,
        )
        .bind(medication_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(CoreError::NotFound("medication"))?;

        if let Some(cache) = &self.cache {
            if let Ok(value) = serde_json::to_value(&row) {
                cache.put(key, value).await;
            }
        }
        Ok(row)
    }

    /// Removes a medication from the catalog. Refused while delivery rows
    /// still reference it, so the dispensation ledger stays attributable.
    pub async fn delete_medication(&self, medication_id: Uuid) -> Result<(), CoreError> {
        let mut tx = self.db.begin().await?;

        let referenced: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM delivery WHERE medication_id = $1)
            "#,
        )
        .bind(medication_id)
        .fetch_one(&mut *tx)
        .await?;

        if referenced {
            return Err(CoreError::MedicationInUse(medication_id));
        }

        let deleted = sqlx::query(
            r#"
            DELETE FROM medication
            WHERE medication_id = $1
            "#,
        )
        .bind(medication_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if deleted == 0 {
            return Err(CoreError::NotFound("medication"));
        }

        tx.commit().await?;
        self.invalidate_medication(medication_id).await;
        tracing::info!(%medication_id, "medication deleted");
        Ok(())
    }

    async fn invalidate_medication(&self, medication_id: Uuid) {
        if let Some(cache) = &self.cache {
            let key = fingerprint("medication.get", &[&medication_id.to_string()]);
            cache.invalidate(&key).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_must_be_positive() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(7).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
    }

    #[test]
    fn same_medication_moves_only_the_difference() {
        let med = Uuid::new_v4();

        // 7 -> 4 returns 3 to stock
        assert_eq!(
            update_plan(med, 7, med, 4),
            UpdatePlan::Adjust { difference: -3 }
        );
        // 4 -> 7 needs 3 more
        assert_eq!(
            update_plan(med, 4, med, 7),
            UpdatePlan::Adjust { difference: 3 }
        );
        assert_eq!(
            update_plan(med, 5, med, 5),
            UpdatePlan::Adjust { difference: 0 }
        );
    }

    #[test]
    fn changed_medication_credits_old_in_full() {
        let old = Uuid::new_v4();
        let new = Uuid::new_v4();

        assert_eq!(
            update_plan(old, 7, new, 4),
            UpdatePlan::Reassign {
                credit: 7,
                debit: 4
            }
        );
    }

    #[test]
    fn net_stock_change_under_edit_is_old_minus_new() {
        let med = Uuid::new_v4();
        for (old_qty, new_qty) in [(7, 4), (4, 7), (10, 10), (1, 9)] {
            let UpdatePlan::Adjust { difference } = update_plan(med, old_qty, med, new_qty) else {
                panic!("same medication must adjust");
            };
            // stock moves by -difference, i.e. old - new
            assert_eq!(-difference, old_qty - new_qty);
        }
    }
}
