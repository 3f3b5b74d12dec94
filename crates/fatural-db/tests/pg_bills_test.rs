//! PostgreSQL integration tests for the bill repository.
//!
//! Require a database with the pgvector extension available; the suite runs
//! the crate migrations itself. Skipped when `DATABASE_URL` is unset.
//!
//! Run: `DATABASE_URL=postgres://... cargo test -p fatural-db --features migrations`

#![cfg(feature = "migrations")]

use chrono::{Duration, Utc};
use fatural_db::{
    BillRecord, BillRepository, BillStatus, CompletionUpdate, Database, DuplicateUpdate, Error,
    ExtractedBill, Vector,
};
use uuid::Uuid;

async fn setup() -> Option<Database> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping PostgreSQL test");
            return None;
        }
    };
    let db = Database::connect(&url)
        .await
        .expect("Failed to connect to test database");
    db.migrate().await.expect("Failed to run migrations");
    Some(db)
}

/// Unit vector with a single hot component, padded to the column width.
fn axis(i: usize) -> Vector {
    let mut v = vec![0.0f32; 768];
    v[i] = 1.0;
    Vector::from(v)
}

async fn new_company(db: &Database) -> Uuid {
    let id = Uuid::new_v4();
    db.bills.ensure_company(id, "Test Co").await.unwrap();
    id
}

async fn completed_bill(db: &Database, company_id: Uuid, fingerprint: Vector) -> Uuid {
    let mut bill = BillRecord::pending(company_id, format!("{}/orig.jpg", company_id));
    bill.status = BillStatus::Completed;
    bill.fingerprint = Some(fingerprint);
    bill.processed_at = Some(Utc::now());
    let id = bill.id;
    db.bills.insert(&bill).await.unwrap();
    id
}

#[tokio::test]
async fn test_begin_processing_is_conditional() {
    let Some(db) = setup().await else { return };
    let company = new_company(&db).await;
    let bill = BillRecord::pending(company, "k/a.jpg");
    let id = bill.id;
    db.bills.insert(&bill).await.unwrap();

    assert!(db.bills.begin_processing(company, id).await.unwrap());
    assert!(!db.bills.begin_processing(company, id).await.unwrap());
    assert!(!db.bills.begin_processing(Uuid::new_v4(), id).await.unwrap());
}

#[tokio::test]
async fn test_get_is_tenant_scoped() {
    let Some(db) = setup().await else { return };
    let company = new_company(&db).await;
    let other = new_company(&db).await;
    let bill = BillRecord::pending(company, "k/b.jpg");
    let id = bill.id;
    db.bills.insert(&bill).await.unwrap();

    assert!(db.bills.get(company, id).await.unwrap().is_some());
    assert!(db.bills.get(other, id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_nearest_completed_stays_in_tenant() {
    let Some(db) = setup().await else { return };
    let company = new_company(&db).await;
    let other = new_company(&db).await;

    completed_bill(&db, other, axis(0)).await;
    assert!(db
        .bills
        .nearest_completed(company, &axis(0))
        .await
        .unwrap()
        .is_none());

    let own = completed_bill(&db, company, axis(1)).await;
    let hit = db
        .bills
        .nearest_completed(company, &axis(0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.bill_id, own);
    assert!((hit.distance - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_nearest_tie_prefers_earliest_created() {
    let Some(db) = setup().await else { return };
    let company = new_company(&db).await;

    let mut older = BillRecord::pending(company, "k/older.jpg");
    older.status = BillStatus::Completed;
    older.fingerprint = Some(axis(3));
    older.created_at = Utc::now() - Duration::hours(1);
    let older_id = older.id;
    db.bills.insert(&older).await.unwrap();
    completed_bill(&db, company, axis(3)).await;

    let hit = db
        .bills
        .nearest_completed(company, &axis(3))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(hit.bill_id, older_id);
}

#[tokio::test]
async fn test_completed_then_duplicate_commits() {
    let Some(db) = setup().await else { return };
    let company = new_company(&db).await;

    let first = BillRecord::pending(company, "k/first.jpg");
    let first_id = first.id;
    db.bills.insert(&first).await.unwrap();
    assert!(db.bills.begin_processing(company, first_id).await.unwrap());

    let mut extracted = ExtractedBill::fallback();
    extracted.vendor_name = "ShopCo".to_string();
    extracted.total_amount = 25.0;
    extracted.bill_date = Some("14.03.2026".to_string());
    let update = CompletionUpdate::from_extraction(&extracted, Some(axis(5)), Utc::now()).unwrap();
    db.bills
        .commit_completed(company, first_id, &update)
        .await
        .unwrap();

    let stored = db.bills.get(company, first_id).await.unwrap().unwrap();
    assert_eq!(stored.status, BillStatus::Completed);
    assert_eq!(stored.vendor_name.as_deref(), Some("ShopCo"));
    assert_eq!(
        stored.bill_date,
        chrono::NaiveDate::from_ymd_opt(2026, 3, 14)
    );
    assert!(stored.fingerprint.is_some());
    assert!(stored.processed_at.is_some());

    // Terminal records cannot be committed again.
    let err = db
        .bills
        .commit_completed(company, first_id, &update)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::StateConflict(_)));

    let second = BillRecord::pending(company, "k/second.jpg");
    let second_id = second.id;
    db.bills.insert(&second).await.unwrap();
    assert!(db.bills.begin_processing(company, second_id).await.unwrap());
    db.bills
        .commit_duplicate(
            company,
            second_id,
            &DuplicateUpdate {
                duplicate_of_id: first_id,
                similarity_score: 1.0,
                processed_at: Utc::now(),
            },
        )
        .await
        .unwrap();

    let dup = db.bills.get(company, second_id).await.unwrap().unwrap();
    assert_eq!(dup.status, BillStatus::Duplicate);
    assert_eq!(dup.duplicate_of_id, Some(first_id));
    assert!(dup.fingerprint.is_none());
}

#[tokio::test]
async fn test_commit_failed_records_error() {
    let Some(db) = setup().await else { return };
    let company = new_company(&db).await;
    let bill = BillRecord::pending(company, "k/fail.jpg");
    let id = bill.id;
    db.bills.insert(&bill).await.unwrap();
    db.bills.begin_processing(company, id).await.unwrap();

    db.bills
        .commit_failed(company, id, "Blob not found: k/fail.jpg")
        .await
        .unwrap();
    let stored = db.bills.get(company, id).await.unwrap().unwrap();
    assert_eq!(stored.status, BillStatus::Failed);
    assert_eq!(
        stored.error_message.as_deref(),
        Some("Blob not found: k/fail.jpg")
    );
}

#[tokio::test]
async fn test_fingerprint_dimension_matches_migration() {
    let Some(db) = setup().await else { return };
    assert_eq!(db.fingerprint_dimension().await.unwrap(), Some(768));
    db.verify_fingerprint_dimension(768).await.unwrap();

    let err = db.verify_fingerprint_dimension(1024).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
