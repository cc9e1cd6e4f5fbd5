//! Instruction and response schema sent with every page image.
//!
//! Callers can override the instruction via
//! [`crate::config::ExtractionConfig::instruction`]; the response schema is
//! always appended so the normaliser in [`crate::pipeline::extract`] can rely
//! on the field names.

/// Default extraction instruction.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are an expert data-extraction (OCR) engine. Find and extract EVERY table in this page image.

Rules:

1. COLUMNS
   - Infer column boundaries from the visual spacing between text, even when the table has no ruled lines
   - Never merge two distinct columns into one
   - Extract the column names exactly as printed

2. TABLE NAME
   - Name each table from the title or caption directly above it
   - If there is no caption, give it a short descriptive name

3. CELLS
   - Represent an empty cell as an empty string ""
   - Keep numbers, dates and currency amounts exactly as printed, as text (do not reformat, round or convert)
   - Join multi-line cell content with a single space

4. COMPLETENESS
   - Do not omit any row or column
   - If no clearly ruled table exists, group repeated structured information into a table

5. OUTPUT FORMAT
   - Output ONLY the JSON object described below
   - Do NOT wrap it in ```json fences
   - Do NOT add commentary"#;

/// JSON shape the model must answer with.
pub const RESPONSE_SCHEMA: &str = r#"{
  "type": "object",
  "properties": {
    "tables": {
      "type": "array",
      "items": {
        "type": "object",
        "properties": {
          "tableName": { "type": "string", "description": "Name of the table" },
          "headers": { "type": "array", "items": { "type": "string" }, "description": "Column names" },
          "data": {
            "type": "array",
            "items": { "type": "array", "items": { "type": "string" }, "description": "One row: one string per header, in header order" },
            "description": "Data rows"
          }
        },
        "required": ["tableName", "headers", "data"]
      }
    }
  },
  "required": ["tables"]
}"#;

/// Full system message: instruction followed by the response schema.
pub fn extraction_instruction(custom: Option<&str>) -> String {
    format!(
        "{}\n\nRespond with a single JSON object matching this JSON Schema:\n{}",
        custom.unwrap_or(DEFAULT_EXTRACTION_PROMPT),
        RESPONSE_SCHEMA
    )
}
