//! Extraction prompt and response schema.

use schemars::gen::SchemaSettings;
use serde_json::Value as JsonValue;

use fatural_core::ExtractedBill;

/// Instructions sent alongside every document.
pub const EXTRACTION_PROMPT: &str = r#"You are an expert OCR and data extraction system for Kosovo business documents.

Requirements:

1. NUI (business tax number): Kosovo tax numbers start with "81". Copy them exactly.

2. VAT: Kosovo applies two rates.
   - 8% (reduced rate for essential goods)
   - 18% (standard rate)
   Report the amount for each rate separately.

3. ATK 665 expense codes. Classify every line item:
   - 665-04: Food and beverages
   - 665-09: Fuel and lubricants
   - 665-11: Professional services
   - 665-12: Office supplies
   - 665-13: Utilities (electricity, water, gas)
   - 665-14: Transportation
   - 665-15: Maintenance and repairs
   - 665-99: Other expenses

4. Currency: EUR unless the document states otherwise.

5. Dates: receipts use DD/MM/YYYY, DD.MM.YYYY or YYYY-MM-DD. Return YYYY-MM-DD.

6. Many receipts are faded thermal prints; read carefully.

Rules:
- Extract every line item that has a price.
- Check that line totals add up to the bill total.
- If any text is unclear, set confidence_score below 0.9.
- Never invent data. Use null when a value is not on the document.
- Keep the bill number exactly as printed.

Extract all information from the attached bill or receipt."#;

/// JSON schema of [`ExtractedBill`] with every subschema inlined.
///
/// Model APIs reject `$ref`, so definitions are expanded in place and the
/// meta-schema keys are removed.
pub fn extraction_schema() -> JsonValue {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        })
        .into_generator();
    let root = generator.into_root_schema_for::<ExtractedBill>();

    let mut schema = serde_json::to_value(root).unwrap_or(JsonValue::Null);
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("definitions");
        obj.remove("title");
    }
    schema
}

/// Strip a surrounding Markdown code fence, if any.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse a model's text output into a bill.
pub(crate) fn parse_extraction(text: &str) -> fatural_core::Result<ExtractedBill> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Err(fatural_core::Error::Extraction(
            "Empty response from model".to_string(),
        ));
    }
    serde_json::from_str(body)
        .map_err(|e| fatural_core::Error::Extraction(format!("Response does not match schema: {}", e)))
}
