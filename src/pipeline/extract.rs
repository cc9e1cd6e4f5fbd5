//! Extraction client: one page image in, zero or more tables out.
//!
//! The request is a system message (instruction + JSON schema) and a user
//! message carrying the page image. The model is asked for
//! `{"tables": [{"tableName", "headers", "data"}]}` but nothing guarantees it
//! complies, so [`parse_tables_response`] validates defensively: missing
//! fields fall back to empty values, short rows are padded, numbers are
//! accepted as text, and a Markdown fence around the JSON is tolerated.
//!
//! Service failures are classified by [`ExtractionError::from_llm_error`]
//! (provider error variant first, description markers second) and handed
//! back untouched for the retry controller to interpret.

use crate::error::ExtractionError;
use crate::pipeline::encode::PageImage;
use crate::table::ExtractedTable;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Anything that can turn a page image into tables.
///
/// The pipeline only sees this trait, so it can be driven by the vision
/// client below or by a scripted double in tests.
pub trait TableExtractor: Send + Sync {
    fn extract<'a>(
        &'a self,
        page: &'a PageImage,
    ) -> BoxFuture<'a, Result<Vec<ExtractedTable>, ExtractionError>>;
}

/// [`TableExtractor`] backed by a vision-capable [`LLMProvider`].
pub struct VisionTableExtractor {
    provider: Arc<dyn LLMProvider>,
    instruction: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl VisionTableExtractor {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        instruction: String,
        temperature: f32,
        max_tokens: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            instruction,
            options: CompletionOptions {
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                // JSON mode where the provider has one; the schema stays in
                // the instruction for the rest.
                response_format: Some("json_object".to_string()),
                ..Default::default()
            },
            timeout,
        }
    }

    fn messages(&self, page: &PageImage) -> Vec<ChatMessage> {
        let image = ImageData::new(page.data.clone(), page.mime_type).with_detail("high");
        vec![
            ChatMessage::system(self.instruction.as_str()),
            ChatMessage::user_with_images("Extract every table from this page.", vec![image]),
        ]
    }

    async fn call(&self, page: &PageImage) -> Result<Vec<ExtractedTable>, ExtractionError> {
        let start = Instant::now();
        let messages = self.messages(page);

        let response = tokio::time::timeout(
            self.timeout,
            self.provider.chat(&messages, Some(&self.options)),
        )
        .await
        .map_err(|_| {
            ExtractionError::Transport(format!(
                "request timed out after {}s",
                self.timeout.as_secs()
            ))
        })?
        .map_err(ExtractionError::from_llm_error)?;

        debug!(
            "Page {}: {} input tokens, {} output tokens, {:?}",
            page.page_num,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        parse_tables_response(&response.content)
    }
}

impl TableExtractor for VisionTableExtractor {
    fn extract<'a>(
        &'a self,
        page: &'a PageImage,
    ) -> BoxFuture<'a, Result<Vec<ExtractedTable>, ExtractionError>> {
        Box::pin(self.call(page))
    }
}

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?\s*```$").expect("valid fence regex")
});

/// Parse and normalise one model answer.
///
/// * empty or whitespace-only text → [`ExtractionError::EmptyResponse`]
/// * text that is not JSON → [`ExtractionError::MalformedResponse`]
/// * JSON without a `tables` array → no tables
pub fn parse_tables_response(text: &str) -> Result<Vec<ExtractedTable>, ExtractionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ExtractionError::EmptyResponse);
    }

    let json = JSON_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    let root: Value = serde_json::from_str(json)
        .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;

    let tables: &[Value] = match &root {
        Value::Object(map) => match map.get("tables") {
            Some(Value::Array(tables)) => tables.as_slice(),
            _ => &[],
        },
        // Some models drop the wrapper object and return the array itself.
        Value::Array(tables) => tables.as_slice(),
        _ => &[],
    };

    Ok(tables.iter().filter_map(normalize_table).collect())
}

/// One `tables[]` entry → [`ExtractedTable`]. Non-objects and entries with
/// neither headers nor rows are dropped.
fn normalize_table(value: &Value) -> Option<ExtractedTable> {
    let obj = value.as_object()?;

    let table_name = obj
        .get("tableName")
        .map(cell_text)
        .unwrap_or_default()
        .trim()
        .to_string();

    let headers: Vec<String> = obj
        .get("headers")
        .and_then(Value::as_array)
        .map(|hs| hs.iter().map(|h| cell_text(h).trim().to_string()).collect())
        .unwrap_or_default();

    let data: Vec<Vec<String>> = obj
        .get("data")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| positional_row(row, &headers))
                .collect()
        })
        .unwrap_or_default();

    if headers.is_empty() && data.is_empty() {
        return None;
    }

    Some(ExtractedTable::from_positional(table_name, headers, &data))
}

/// A row as positional values. Rows sent as `{header: value}` objects are
/// re-aligned to `headers`.
fn positional_row(row: &Value, headers: &[String]) -> Option<Vec<String>> {
    match row {
        Value::Array(values) => Some(values.iter().map(cell_text).collect()),
        Value::Object(map) => Some(
            headers
                .iter()
                .map(|h| map.get(h).map(cell_text).unwrap_or_default())
                .collect(),
        ),
        _ => None,
    }
}

/// Literal text of a JSON scalar; null and containers become "".
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}
