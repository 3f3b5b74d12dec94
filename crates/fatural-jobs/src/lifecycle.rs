//! Bill state machine.
//!
//! The only legal paths are `pending → processing` followed by exactly one of
//! `completed`, `duplicate`, or `failed`. Every write goes through the
//! repository's conditional updates, so a stale or concurrent caller gets a
//! refusal instead of a regression.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use fatural_core::{
    BillRecord, BillRepository, BillStatus, CompletionUpdate, DuplicateUpdate, Error, Result,
};

/// Lifecycle writes for one tenant-scoped bill at a time.
#[derive(Clone)]
pub struct BillStateMachine {
    repo: Arc<dyn BillRepository>,
    commit_timeout: Duration,
}

impl BillStateMachine {
    pub fn new(repo: Arc<dyn BillRepository>, commit_timeout: Duration) -> Self {
        Self {
            repo,
            commit_timeout,
        }
    }

    async fn bounded<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.commit_timeout, fut)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "{} exceeded {}s",
                    op,
                    self.commit_timeout.as_secs_f64()
                ))
            })?
    }

    /// Tenant-scoped lookup.
    pub async fn load(&self, company_id: Uuid, bill_id: Uuid) -> Result<Option<BillRecord>> {
        self.bounded("bill lookup", self.repo.get(company_id, bill_id))
            .await
    }

    /// Claim a pending bill. `false` means another delivery got there first
    /// or the bill is gone.
    pub async fn begin(&self, record: &BillRecord) -> Result<bool> {
        record.status.transition(BillStatus::Processing)?;
        let claimed = self
            .bounded(
                "begin processing",
                self.repo.begin_processing(record.company_id, record.id),
            )
            .await?;
        debug!(bill_id = %record.id, claimed, "pending -> processing");
        Ok(claimed)
    }

    pub async fn complete(
        &self,
        company_id: Uuid,
        bill_id: Uuid,
        update: &CompletionUpdate,
    ) -> Result<()> {
        BillStatus::Processing.transition(BillStatus::Completed)?;
        self.bounded(
            "completion commit",
            self.repo.commit_completed(company_id, bill_id, update),
        )
        .await?;
        info!(
            %bill_id,
            %company_id,
            fingerprinted = update.fingerprint.is_some(),
            "Bill completed"
        );
        Ok(())
    }

    pub async fn mark_duplicate(
        &self,
        company_id: Uuid,
        bill_id: Uuid,
        update: &DuplicateUpdate,
    ) -> Result<()> {
        BillStatus::Processing.transition(BillStatus::Duplicate)?;
        if update.duplicate_of_id == bill_id {
            return Err(Error::StateConflict(format!(
                "bill {} cannot be a duplicate of itself",
                bill_id
            )));
        }
        self.bounded(
            "duplicate commit",
            self.repo.commit_duplicate(company_id, bill_id, update),
        )
        .await?;
        info!(
            %bill_id,
            %company_id,
            duplicate_of = %update.duplicate_of_id,
            similarity = update.similarity_score,
            "Bill marked duplicate"
        );
        Ok(())
    }

    pub async fn fail(&self, company_id: Uuid, bill_id: Uuid, error: &str) -> Result<()> {
        BillStatus::Processing.transition(BillStatus::Failed)?;
        self.bounded(
            "failure commit",
            self.repo.commit_failed(company_id, bill_id, error),
        )
        .await?;
        info!(%bill_id, %company_id, error, "Bill failed");
        Ok(())
    }
}
