//! In-memory bill repository.
//!
//! Mirrors the conditional semantics of [`PgBillRepository`](crate::PgBillRepository)
//! over a mutex-guarded map. Backs the pipeline tests and local runs without
//! a database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use fatural_core::{
    cosine_distance, BillRecord, BillRepository, BillStatus, CompletionUpdate, DuplicateUpdate,
    Error, NearestCandidate, Result, Vector,
};

#[derive(Default)]
struct State {
    bills: HashMap<Uuid, BillRecord>,
    transitions: Vec<(Uuid, BillStatus)>,
}

/// Mutex-backed [`BillRepository`]. Cloning shares the same store.
#[derive(Clone, Default)]
pub struct MemoryBillRepository {
    state: Arc<Mutex<State>>,
}

impl MemoryBillRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("bill store lock poisoned".to_string()))
    }

    /// Insert or replace a bill.
    pub fn insert(&self, bill: BillRecord) -> Result<()> {
        self.lock()?.bills.insert(bill.id, bill);
        Ok(())
    }

    /// Lookup ignoring the tenant. Test inspection only.
    pub fn get_unscoped(&self, bill_id: Uuid) -> Result<Option<BillRecord>> {
        Ok(self.lock()?.bills.get(&bill_id).cloned())
    }

    /// All bills, ordered by creation.
    pub fn snapshot(&self) -> Result<Vec<BillRecord>> {
        let mut bills: Vec<_> = self.lock()?.bills.values().cloned().collect();
        bills.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(bills)
    }

    /// Every status write in the order it happened.
    pub fn transition_log(&self) -> Result<Vec<(Uuid, BillStatus)>> {
        Ok(self.lock()?.transitions.clone())
    }

    fn apply_terminal<F>(
        &self,
        company_id: Uuid,
        bill_id: Uuid,
        target: BillStatus,
        apply: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut BillRecord),
    {
        let mut state = self.lock()?;
        let bill = state
            .bills
            .get_mut(&bill_id)
            .filter(|b| b.company_id == company_id && b.status == BillStatus::Processing)
            .ok_or_else(|| {
                Error::StateConflict(format!(
                    "bill {} is not processing; refusing transition to {}",
                    bill_id, target
                ))
            })?;
        bill.status = target;
        apply(bill);
        state.transitions.push((bill_id, target));
        Ok(())
    }
}

#[async_trait]
impl BillRepository for MemoryBillRepository {
    async fn get(&self, company_id: Uuid, bill_id: Uuid) -> Result<Option<BillRecord>> {
        Ok(self
            .lock()?
            .bills
            .get(&bill_id)
            .filter(|b| b.company_id == company_id)
            .cloned())
    }

    async fn begin_processing(&self, company_id: Uuid, bill_id: Uuid) -> Result<bool> {
        let mut state = self.lock()?;
        let claimed = match state.bills.get_mut(&bill_id) {
            Some(b) if b.company_id == company_id && b.status == BillStatus::Pending => {
                b.status = BillStatus::Processing;
                true
            }
            _ => false,
        };
        if claimed {
            state.transitions.push((bill_id, BillStatus::Processing));
        }
        Ok(claimed)
    }

    async fn nearest_completed(
        &self,
        company_id: Uuid,
        vector: &Vector,
    ) -> Result<Option<NearestCandidate>> {
        let state = self.lock()?;
        let query = vector.as_slice();

        let mut best: Option<(&BillRecord, f64)> = None;
        for bill in state.bills.values() {
            if bill.company_id != company_id || bill.status != BillStatus::Completed {
                continue;
            }
            let Some(fingerprint) = bill.fingerprint.as_ref() else {
                continue;
            };
            let distance = cosine_distance(fingerprint.as_slice(), query);
            let better = match best {
                None => true,
                Some((current, d)) => {
                    distance < d
                        || (distance == d
                            && (bill.created_at, bill.id) < (current.created_at, current.id))
                }
            };
            if better {
                best = Some((bill, distance));
            }
        }

        Ok(best.map(|(bill, distance)| NearestCandidate {
            bill_id: bill.id,
            distance,
        }))
    }

    async fn commit_completed(
        &self,
        company_id: Uuid,
        bill_id: Uuid,
        update: &CompletionUpdate,
    ) -> Result<()> {
        self.apply_terminal(company_id, bill_id, BillStatus::Completed, |bill| {
            bill.vendor_name = Some(update.vendor_name.clone());
            bill.vendor_tax_number = update.vendor_tax_number.clone();
            bill.bill_number = update.bill_number.clone();
            bill.bill_date = update.bill_date;
            bill.total_amount = Some(update.total_amount);
            bill.currency = Some(update.currency.clone());
            bill.line_items = Some(update.line_items.clone());
            bill.raw_extraction = Some(update.raw_extraction.clone());
            bill.fingerprint = update.fingerprint.clone();
            bill.error_message = None;
            bill.processed_at = Some(update.processed_at);
        })
    }

    async fn commit_duplicate(
        &self,
        company_id: Uuid,
        bill_id: Uuid,
        update: &DuplicateUpdate,
    ) -> Result<()> {
        {
            let state = self.lock()?;
            let valid = state
                .bills
                .get(&update.duplicate_of_id)
                .is_some_and(|b| b.company_id == company_id && b.status == BillStatus::Completed);
            if !valid {
                return Err(Error::StateConflict(format!(
                    "duplicate target {} is not a completed bill of company {}",
                    update.duplicate_of_id, company_id
                )));
            }
        }
        self.apply_terminal(company_id, bill_id, BillStatus::Duplicate, |bill| {
            bill.duplicate_of_id = Some(update.duplicate_of_id);
            bill.similarity_score = Some(update.similarity_score);
            bill.fingerprint = None;
            bill.processed_at = Some(update.processed_at);
        })
    }

    async fn commit_failed(&self, company_id: Uuid, bill_id: Uuid, error: &str) -> Result<()> {
        self.apply_terminal(company_id, bill_id, BillStatus::Failed, |bill| {
            bill.error_message = Some(error.to_string());
        })
    }
}
