//! Tenant-scoped duplicate detection over stored fingerprints.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use fatural_core::{
    is_zero_vector, similarity_from_distance, BillRepository, DuplicateMatch, Error, Result,
    Vector,
};

/// Finds the closest completed bill of the same tenant and applies the
/// similarity threshold.
#[derive(Clone)]
pub struct DuplicateDetector {
    repo: Arc<dyn BillRepository>,
    threshold: f64,
    timeout: Duration,
}

impl DuplicateDetector {
    pub fn new(repo: Arc<dyn BillRepository>, threshold: f64, timeout: Duration) -> Self {
        Self {
            repo,
            threshold,
            timeout,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Nearest same-tenant completed bill whose similarity reaches the
    /// threshold.
    ///
    /// A zero or non-finite vector never queries the index and yields `None`.
    pub async fn find_duplicate(
        &self,
        company_id: Uuid,
        vector: &Vector,
    ) -> Result<Option<DuplicateMatch>> {
        let values = vector.as_slice();
        if values.is_empty() || is_zero_vector(values) || values.iter().any(|v| !v.is_finite()) {
            debug!(%company_id, "Degenerate fingerprint; skipping duplicate search");
            return Ok(None);
        }

        let candidate = tokio::time::timeout(
            self.timeout,
            self.repo.nearest_completed(company_id, vector),
        )
        .await
        .map_err(|_| {
            Error::Timeout(format!(
                "duplicate search exceeded {}s",
                self.timeout.as_secs_f64()
            ))
        })??;

        let Some(candidate) = candidate else {
            debug!(%company_id, "No completed candidates for tenant");
            return Ok(None);
        };

        let similarity = similarity_from_distance(candidate.distance);
        debug!(
            %company_id,
            candidate = %candidate.bill_id,
            similarity,
            threshold = self.threshold,
            "Nearest candidate"
        );

        Ok((similarity >= self.threshold).then_some(DuplicateMatch {
            bill_id: candidate.bill_id,
            similarity,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fatural_core::{BillRecord, BillStatus};
    use fatural_db::MemoryBillRepository;

    fn detector(repo: &MemoryBillRepository, threshold: f64) -> DuplicateDetector {
        DuplicateDetector::new(Arc::new(repo.clone()), threshold, Duration::from_secs(5))
    }

    fn completed(repo: &MemoryBillRepository, company_id: Uuid, v: Vec<f32>) -> Uuid {
        let mut bill = BillRecord::pending(company_id, "k");
        bill.status = BillStatus::Completed;
        bill.fingerprint = Some(Vector::from(v));
        let id = bill.id;
        repo.insert(bill).unwrap();
        id
    }

    #[tokio::test]
    async fn test_match_at_threshold() {
        let repo = MemoryBillRepository::new();
        let company = Uuid::new_v4();
        let id = completed(&repo, company, vec![1.0, 0.0]);

        let hit = detector(&repo, 0.95)
            .find_duplicate(company, &Vector::from(vec![2.0, 0.0]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.bill_id, id);
        assert!((hit.similarity - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_below_threshold_is_none() {
        let repo = MemoryBillRepository::new();
        let company = Uuid::new_v4();
        completed(&repo, company, vec![1.0, 0.0]);

        // cos = 0.8
        let result = detector(&repo, 0.95)
            .find_duplicate(company, &Vector::from(vec![0.8, 0.6]))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_zero_vector_never_matches() {
        let repo = MemoryBillRepository::new();
        let company = Uuid::new_v4();
        completed(&repo, company, vec![1.0, 0.0]);

        let result = detector(&repo, 0.0)
            .find_duplicate(company, &Vector::from(vec![0.0, 0.0]))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_other_tenant_never_matches() {
        let repo = MemoryBillRepository::new();
        completed(&repo, Uuid::new_v4(), vec![1.0, 0.0]);

        let result = detector(&repo, 0.5)
            .find_duplicate(Uuid::new_v4(), &Vector::from(vec![1.0, 0.0]))
            .await
            .unwrap();
        assert!(result.is_none());
    }
}
