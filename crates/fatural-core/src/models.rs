//! Domain models for the bill pipeline.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};

pub use pgvector::Vector;

// =============================================================================
// BILL STATUS
// =============================================================================

/// Processing status of a bill.
///
/// Lifecycle: `pending → processing → {completed | duplicate | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Duplicate,
}

impl BillStatus {
    /// Database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Duplicate => "duplicate",
        }
    }

    /// Terminal states are never left by the pipeline.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Duplicate)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: BillStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Duplicate)
                | (Self::Processing, Self::Failed)
        )
    }

    /// Validate a transition, returning the new status.
    pub fn transition(self, next: BillStatus) -> Result<BillStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(Error::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for BillStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BillStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "duplicate" => Ok(Self::Duplicate),
            _ => Err(format!("Invalid bill status: {}", s)),
        }
    }
}

// =============================================================================
// PROCESSING JOB
// =============================================================================

/// Queue message published after an upload is accepted.
///
/// All fields are required strings on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadMessage {
    pub bill_id: String,
    pub company_id: String,
    pub storage_path: String,
    pub mime_type: String,
    pub uploaded_at: String,
}

/// One unit of work: process the bill `bill_id` owned by tenant `company_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingJob {
    pub bill_id: Uuid,
    pub company_id: Uuid,
    pub storage_path: String,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

impl ProcessingJob {
    /// Decode a raw queue payload.
    ///
    /// Missing fields, wrong JSON types, malformed UUIDs and unparseable
    /// timestamps are all `Error::Decode`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let message: UploadMessage =
            serde_json::from_slice(data).map_err(|e| Error::Decode(e.to_string()))?;
        Self::try_from(message)
    }

    /// Encode back to the wire format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&UploadMessage::from(self))?)
    }
}

impl TryFrom<UploadMessage> for ProcessingJob {
    type Error = Error;

    fn try_from(message: UploadMessage) -> Result<Self> {
        let bill_id = Uuid::parse_str(&message.bill_id)
            .map_err(|e| Error::Decode(format!("bill_id: {}", e)))?;
        let company_id = Uuid::parse_str(&message.company_id)
            .map_err(|e| Error::Decode(format!("company_id: {}", e)))?;
        if message.storage_path.is_empty() {
            return Err(Error::Decode("storage_path is empty".to_string()));
        }
        let uploaded_at = parse_timestamp(&message.uploaded_at)
            .ok_or_else(|| Error::Decode(format!("uploaded_at: {}", message.uploaded_at)))?;

        Ok(Self {
            bill_id,
            company_id,
            storage_path: message.storage_path,
            mime_type: message.mime_type,
            uploaded_at,
        })
    }
}

impl From<&ProcessingJob> for UploadMessage {
    fn from(job: &ProcessingJob) -> Self {
        Self {
            bill_id: job.bill_id.to_string(),
            company_id: job.company_id.to_string(),
            storage_path: job.storage_path.clone(),
            mime_type: job.mime_type.clone(),
            uploaded_at: job.uploaded_at.to_rfc3339(),
        }
    }
}

/// ISO-8601 with an offset, or a naive timestamp taken as UTC.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Kosovo ATK form 665 expense classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ExpenseCode {
    Food,
    Fuel,
    Services,
    Office,
    Utilities,
    Transport,
    Maintenance,
    #[default]
    Other,
}

impl ExpenseCode {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Food => "665-04",
            Self::Fuel => "665-09",
            Self::Services => "665-11",
            Self::Office => "665-12",
            Self::Utilities => "665-13",
            Self::Transport => "665-14",
            Self::Maintenance => "665-15",
            Self::Other => "665-99",
        }
    }

    /// Unknown codes classify as `Other`.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "665-04" => Self::Food,
            "665-09" => Self::Fuel,
            "665-11" => Self::Services,
            "665-12" => Self::Office,
            "665-13" => Self::Utilities,
            "665-14" => Self::Transport,
            "665-15" => Self::Maintenance,
            _ => Self::Other,
        }
    }
}

impl Serialize for ExpenseCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_code())
    }
}

impl<'de> Deserialize<'de> for ExpenseCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = Option::<String>::deserialize(deserializer)?;
        Ok(code.map(|c| Self::from_code(&c)).unwrap_or_default())
    }
}

fn default_quantity() -> f64 {
    1.0
}

fn default_currency() -> String {
    defaults::DEFAULT_CURRENCY.to_string()
}

/// One itemized line on a bill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LineItem {
    /// Item or service description
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    pub unit_price: f64,
    pub total_price: f64,
    /// VAT rate in percent (8 or 18)
    #[serde(default)]
    pub vat_rate: Option<f64>,
    /// ATK 665 expense category code
    #[serde(default)]
    #[schemars(with = "String")]
    pub atk_code: ExpenseCode,
}

/// Structured output of the extraction model.
///
/// The JSON schema sent to the model is generated from this type, so the
/// request schema and the parser cannot drift apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedBill {
    /// Merchant/vendor business name
    pub vendor_name: String,
    /// Kosovo NUI (business tax number, starts with 81)
    #[serde(default)]
    pub vendor_tax_number: Option<String>,
    #[serde(default)]
    pub vendor_address: Option<String>,
    /// Invoice/receipt number
    #[serde(default)]
    pub bill_number: Option<String>,
    /// Bill date in ISO format (YYYY-MM-DD) or DD/MM/YYYY
    #[serde(default)]
    pub bill_date: Option<String>,
    #[serde(default)]
    pub bill_time: Option<String>,
    /// Amount before VAT
    #[serde(default)]
    pub subtotal: Option<f64>,
    #[serde(default)]
    pub vat_8_percent: Option<f64>,
    #[serde(default)]
    pub vat_18_percent: Option<f64>,
    #[serde(default)]
    pub total_vat: Option<f64>,
    /// Final total amount
    pub total_amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub line_items: Vec<LineItem>,
    /// Payment method (cash, card, ...)
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Model confidence in the extraction (0-1)
    #[serde(default)]
    pub confidence_score: f64,
}

impl ExtractedBill {
    /// Sentinel record persisted when extraction fails.
    pub fn fallback() -> Self {
        Self {
            vendor_name: defaults::FALLBACK_VENDOR_NAME.to_string(),
            vendor_tax_number: None,
            vendor_address: None,
            bill_number: None,
            bill_date: None,
            bill_time: None,
            subtotal: None,
            vat_8_percent: None,
            vat_18_percent: None,
            total_vat: None,
            total_amount: 0.0,
            currency: default_currency(),
            line_items: Vec::new(),
            payment_method: None,
            confidence_score: 0.0,
        }
    }

    /// True for the sentinel produced by [`ExtractedBill::fallback`].
    pub fn is_fallback(&self) -> bool {
        self.vendor_name == defaults::FALLBACK_VENDOR_NAME
            && self.confidence_score == 0.0
            && self.line_items.is_empty()
    }

    /// Eager range checks on a parsed model response.
    pub fn validate(&self) -> Result<()> {
        fn non_negative(name: &str, value: f64) -> Result<()> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(Error::Extraction(format!("{} out of range: {}", name, value)))
            }
        }

        if self.vendor_name.trim().is_empty() {
            return Err(Error::Extraction("vendor_name is empty".to_string()));
        }
        non_negative("total_amount", self.total_amount)?;
        for (name, value) in [
            ("subtotal", self.subtotal),
            ("vat_8_percent", self.vat_8_percent),
            ("vat_18_percent", self.vat_18_percent),
            ("total_vat", self.total_vat),
        ] {
            if let Some(v) = value {
                non_negative(name, v)?;
            }
        }
        if !(0.0..=1.0).contains(&self.confidence_score) {
            return Err(Error::Extraction(format!(
                "confidence_score out of range: {}",
                self.confidence_score
            )));
        }
        for item in &self.line_items {
            non_negative("quantity", item.quantity)?;
            non_negative("unit_price", item.unit_price)?;
            non_negative("total_price", item.total_price)?;
        }
        Ok(())
    }

    /// Canonical text summary fed to the embedding model.
    ///
    /// Deterministic: identical records always produce identical text.
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![
            format!("Vendor: {}", self.vendor_name),
            format!(
                "NUI: {}",
                self.vendor_tax_number.as_deref().unwrap_or("N/A")
            ),
            format!("Bill: {}", self.bill_number.as_deref().unwrap_or("N/A")),
            format!("Date: {}", self.bill_date.as_deref().unwrap_or("N/A")),
            format!("Total: {} {}", self.total_amount, self.currency),
        ];
        for item in &self.line_items {
            parts.push(format!(
                "Item: {} x{} = {}",
                item.description, item.quantity, item.total_price
            ));
        }
        parts.join(" | ")
    }

    /// Parse the free-form bill date.
    pub fn parsed_bill_date(&self) -> Option<NaiveDate> {
        self.bill_date.as_deref().and_then(parse_bill_date)
    }
}

/// Date formats accepted from the extraction model, in priority order.
const BILL_DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%Y/%m/%d"];

/// Parse a bill date, returning `None` when no known format matches.
pub fn parse_bill_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    BILL_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

// =============================================================================
// BILL RECORD
// =============================================================================

/// Persisted bill, scoped to one tenant.
#[derive(Debug, Clone)]
pub struct BillRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub storage_path: String,
    pub mime_type: Option<String>,
    pub vendor_name: Option<String>,
    pub vendor_tax_number: Option<String>,
    pub bill_number: Option<String>,
    pub bill_date: Option<NaiveDate>,
    pub total_amount: Option<f64>,
    pub currency: Option<String>,
    pub line_items: Option<JsonValue>,
    pub raw_extraction: Option<JsonValue>,
    /// Present only on completed bills.
    pub fingerprint: Option<Vector>,
    pub status: BillStatus,
    pub error_message: Option<String>,
    /// Present only on duplicate bills; always a completed bill of the same tenant.
    pub duplicate_of_id: Option<Uuid>,
    pub similarity_score: Option<f64>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl BillRecord {
    /// A freshly uploaded bill awaiting processing.
    pub fn pending(company_id: Uuid, storage_path: impl Into<String>) -> Self {
        Self {
            id: crate::new_v7(),
            company_id,
            storage_path: storage_path.into(),
            mime_type: None,
            vendor_name: None,
            vendor_tax_number: None,
            bill_number: None,
            bill_date: None,
            total_amount: None,
            currency: None,
            line_items: None,
            raw_extraction: None,
            fingerprint: None,
            status: BillStatus::Pending,
            error_message: None,
            duplicate_of_id: None,
            similarity_score: None,
            processed_at: None,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// DUPLICATE DETECTION
// =============================================================================

/// Nearest completed candidate returned by the vector index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestCandidate {
    pub bill_id: Uuid,
    /// Cosine distance in [0, 2].
    pub distance: f64,
}

/// A positive duplicate decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateMatch {
    pub bill_id: Uuid,
    pub similarity: f64,
}

// =============================================================================
// TERMINAL COMMITS
// =============================================================================

/// Fields written together with `processing → completed`.
#[derive(Debug, Clone)]
pub struct CompletionUpdate {
    pub vendor_name: String,
    pub vendor_tax_number: Option<String>,
    pub bill_number: Option<String>,
    pub bill_date: Option<NaiveDate>,
    pub total_amount: f64,
    pub currency: String,
    pub line_items: JsonValue,
    pub raw_extraction: JsonValue,
    pub fingerprint: Option<Vector>,
    pub processed_at: DateTime<Utc>,
}

impl CompletionUpdate {
    pub fn from_extraction(
        extracted: &ExtractedBill,
        fingerprint: Option<Vector>,
        processed_at: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            vendor_name: extracted.vendor_name.clone(),
            vendor_tax_number: extracted.vendor_tax_number.clone(),
            bill_number: extracted.bill_number.clone(),
            bill_date: extracted.parsed_bill_date(),
            total_amount: extracted.total_amount,
            currency: extracted.currency.clone(),
            line_items: serde_json::to_value(&extracted.line_items)?,
            raw_extraction: serde_json::to_value(extracted)?,
            fingerprint,
            processed_at,
        })
    }
}

/// Fields written together with `processing → duplicate`.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateUpdate {
    pub duplicate_of_id: Uuid,
    pub similarity_score: f64,
    pub processed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_extraction() -> ExtractedBill {
        ExtractedBill {
            vendor_name: "ShopCo".to_string(),
            vendor_tax_number: Some("810000001".to_string()),
            vendor_address: None,
            bill_number: Some("Market-001".to_string()),
            bill_date: Some("2026-03-14".to_string()),
            bill_time: None,
            subtotal: Some(21.19),
            vat_8_percent: None,
            vat_18_percent: Some(3.81),
            total_vat: Some(3.81),
            total_amount: 25.0,
            currency: "EUR".to_string(),
            line_items: vec![LineItem {
                description: "Coffee beans".to_string(),
                quantity: 2.0,
                unit_price: 12.5,
                total_price: 25.0,
                vat_rate: Some(18.0),
                atk_code: ExpenseCode::Food,
            }],
            payment_method: Some("card".to_string()),
            confidence_score: 0.97,
        }
    }

    #[test]
    fn test_status_forward_transitions() {
        assert!(BillStatus::Pending.can_transition_to(BillStatus::Processing));
        assert!(BillStatus::Processing.can_transition_to(BillStatus::Completed));
        assert!(BillStatus::Processing.can_transition_to(BillStatus::Duplicate));
        assert!(BillStatus::Processing.can_transition_to(BillStatus::Failed));
    }

    #[test]
    fn test_status_rejects_skipping_processing() {
        assert!(!BillStatus::Pending.can_transition_to(BillStatus::Completed));
        assert!(!BillStatus::Pending.can_transition_to(BillStatus::Duplicate));
        assert!(!BillStatus::Pending.can_transition_to(BillStatus::Failed));
        assert!(!BillStatus::Processing.can_transition_to(BillStatus::Processing));
    }

    #[test]
    fn test_terminal_states_are_never_left() {
        let all = [
            BillStatus::Pending,
            BillStatus::Processing,
            BillStatus::Completed,
            BillStatus::Failed,
            BillStatus::Duplicate,
        ];
        for from in [BillStatus::Completed, BillStatus::Failed, BillStatus::Duplicate] {
            assert!(from.is_terminal());
            for to in all {
                assert!(!from.can_transition_to(to), "{} -> {} allowed", from, to);
            }
        }
    }

    #[test]
    fn test_transition_error_names_both_states() {
        let err = BillStatus::Duplicate
            .transition(BillStatus::Completed)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                from: BillStatus::Duplicate,
                to: BillStatus::Completed
            }
        ));
    }

    #[test]
    fn test_status_from_str_round_trip() {
        for status in ["pending", "processing", "completed", "failed", "duplicate"] {
            let parsed: BillStatus = status.parse().unwrap();
            assert_eq!(parsed.as_str(), status);
        }
        assert!("archived".parse::<BillStatus>().is_err());
    }

    #[test]
    fn test_decode_valid_message() {
        let bill_id = Uuid::new_v4();
        let company_id = Uuid::new_v4();
        let payload = serde_json::json!({
            "bill_id": bill_id.to_string(),
            "company_id": company_id.to_string(),
            "storage_path": "companies/x/bills/a.jpg",
            "mime_type": "image/jpeg",
            "uploaded_at": "2026-03-14T09:30:00.123456"
        });

        let job = ProcessingJob::decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(job.bill_id, bill_id);
        assert_eq!(job.company_id, company_id);
        assert_eq!(job.storage_path, "companies/x/bills/a.jpg");
        assert_eq!(job.mime_type, "image/jpeg");
        assert_eq!(job.uploaded_at.date_naive().to_string(), "2026-03-14");
    }

    #[test]
    fn test_decode_accepts_rfc3339_offsets() {
        let payload = serde_json::json!({
            "bill_id": Uuid::new_v4().to_string(),
            "company_id": Uuid::new_v4().to_string(),
            "storage_path": "k",
            "mime_type": "application/pdf",
            "uploaded_at": "2026-03-14T09:30:00+01:00"
        });
        let job = ProcessingJob::decode(payload.to_string().as_bytes()).unwrap();
        assert_eq!(job.uploaded_at.to_rfc3339(), "2026-03-14T08:30:00+00:00");
    }

    #[test]
    fn test_decode_missing_field_is_decode_error() {
        let payload = serde_json::json!({
            "bill_id": Uuid::new_v4().to_string(),
            "storage_path": "k",
            "mime_type": "image/png",
            "uploaded_at": "2026-03-14T09:30:00Z"
        });
        let err = ProcessingJob::decode(payload.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_decode_wrong_type_is_decode_error() {
        let payload = serde_json::json!({
            "bill_id": 42,
            "company_id": Uuid::new_v4().to_string(),
            "storage_path": "k",
            "mime_type": "image/png",
            "uploaded_at": "2026-03-14T09:30:00Z"
        });
        let err = ProcessingJob::decode(payload.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_decode_bad_uuid_and_garbage() {
        let payload = serde_json::json!({
            "bill_id": "not-a-uuid",
            "company_id": Uuid::new_v4().to_string(),
            "storage_path": "k",
            "mime_type": "image/png",
            "uploaded_at": "2026-03-14T09:30:00Z"
        });
        assert!(matches!(
            ProcessingJob::decode(payload.to_string().as_bytes()),
            Err(Error::Decode(_))
        ));
        assert!(matches!(
            ProcessingJob::decode(b"\xff\x00 not json"),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_encode_then_decode_preserves_job() {
        let job = ProcessingJob {
            bill_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            storage_path: "bills/x.png".to_string(),
            mime_type: "image/png".to_string(),
            uploaded_at: Utc::now(),
        };
        let decoded = ProcessingJob::decode(&job.encode().unwrap()).unwrap();
        assert_eq!(decoded.bill_id, job.bill_id);
        assert_eq!(decoded.company_id, job.company_id);
        assert_eq!(decoded.storage_path, job.storage_path);
    }

    #[test]
    fn test_expense_code_unknown_maps_to_other() {
        let item: LineItem = serde_json::from_str(
            r#"{"description":"x","unit_price":1.0,"total_price":1.0,"atk_code":"999-01"}"#,
        )
        .unwrap();
        assert_eq!(item.atk_code, ExpenseCode::Other);
        assert_eq!(item.quantity, 1.0);
    }

    #[test]
    fn test_expense_code_serializes_as_code() {
        let json = serde_json::to_string(&ExpenseCode::Fuel).unwrap();
        assert_eq!(json, "\"665-09\"");
        assert_eq!(ExpenseCode::from_code("665-13"), ExpenseCode::Utilities);
    }

    #[test]
    fn test_extracted_bill_defaults() {
        let bill: ExtractedBill =
            serde_json::from_str(r#"{"vendor_name":"ShopCo","total_amount":9.5}"#).unwrap();
        assert_eq!(bill.currency, "EUR");
        assert!(bill.line_items.is_empty());
        assert_eq!(bill.confidence_score, 0.0);
    }

    #[test]
    fn test_extracted_bill_requires_total() {
        let result = serde_json::from_str::<ExtractedBill>(r#"{"vendor_name":"ShopCo"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let mut bill = sample_extraction();
        assert!(bill.validate().is_ok());

        bill.confidence_score = 1.2;
        assert!(bill.validate().is_err());

        let mut bill = sample_extraction();
        bill.total_amount = -1.0;
        assert!(bill.validate().is_err());

        let mut bill = sample_extraction();
        bill.line_items[0].unit_price = f64::NAN;
        assert!(bill.validate().is_err());

        let mut bill = sample_extraction();
        bill.vendor_name = "  ".to_string();
        assert!(bill.validate().is_err());
    }

    #[test]
    fn test_fallback_is_recognised() {
        let fallback = ExtractedBill::fallback();
        assert!(fallback.is_fallback());
        assert_eq!(fallback.vendor_name, "Extraction Failed");
        assert_eq!(fallback.total_amount, 0.0);
        assert_eq!(fallback.confidence_score, 0.0);
        assert!(fallback.validate().is_ok());
        assert!(!sample_extraction().is_fallback());
    }

    #[test]
    fn test_embedding_text_layout() {
        let text = sample_extraction().embedding_text();
        assert_eq!(
            text,
            "Vendor: ShopCo | NUI: 810000001 | Bill: Market-001 | Date: 2026-03-14 \
             | Total: 25 EUR | Item: Coffee beans x2 = 25"
        );
    }

    #[test]
    fn test_embedding_text_marks_missing_fields() {
        let text = ExtractedBill::fallback().embedding_text();
        assert_eq!(
            text,
            "Vendor: Extraction Failed | NUI: N/A | Bill: N/A | Date: N/A | Total: 0 EUR"
        );
    }

    #[test]
    fn test_embedding_text_is_deterministic() {
        let a = sample_extraction();
        let b = a.clone();
        assert_eq!(a.embedding_text(), b.embedding_text());
    }

    #[test]
    fn test_parse_bill_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(parse_bill_date("2026-03-14"), Some(expected));
        assert_eq!(parse_bill_date("14/03/2026"), Some(expected));
        assert_eq!(parse_bill_date("14.03.2026"), Some(expected));
        assert_eq!(parse_bill_date("2026/03/14"), Some(expected));
        assert_eq!(parse_bill_date("March 14th"), None);
    }

    #[test]
    fn test_completion_update_from_extraction() {
        let extracted = sample_extraction();
        let update =
            CompletionUpdate::from_extraction(&extracted, None, Utc::now()).unwrap();
        assert_eq!(update.vendor_name, "ShopCo");
        assert_eq!(
            update.bill_date,
            Some(NaiveDate::from_ymd_opt(2026, 3, 14).unwrap())
        );
        assert_eq!(update.line_items[0]["atk_code"], "665-04");
        assert_eq!(update.raw_extraction["confidence_score"], 0.97);
    }

    #[test]
    fn test_pending_record() {
        let company = Uuid::new_v4();
        let bill = BillRecord::pending(company, "bills/a.jpg");
        assert_eq!(bill.status, BillStatus::Pending);
        assert_eq!(bill.company_id, company);
        assert!(bill.fingerprint.is_none());
        assert!(bill.duplicate_of_id.is_none());
    }
}
