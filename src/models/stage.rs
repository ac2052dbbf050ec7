use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// One document-Q&A answer. On stage failure the answer is a synthesized
/// `[Error: ...]` marker; a question is never dropped from the list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaAnswer {
    pub question: String,
    pub answer: String,
}

impl QaAnswer {
    pub fn answered(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }

    pub fn failed(question: impl Into<String>, message: &str) -> Self {
        Self {
            question: question.into(),
            answer: format!("[Error: {message}]"),
        }
    }

    pub fn is_error_marker(&self) -> bool {
        self.answer.starts_with("[Error: ")
    }
}

/// Outcome of the whole-document extraction stage.
///
/// The stage returns free text that often, but not always, parses as JSON.
/// `Parsed` is preferred; text that is not valid JSON is kept as `RawText`
/// rather than failing the run, and a stage-level failure becomes `Failed`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    Parsed(Value),
    RawText(String),
    Failed(String),
}

impl ExtractOutcome {
    /// Classify raw model text: a JSON object or array is `Parsed`,
    /// anything else is carried verbatim as `RawText`.
    pub fn from_model_text(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) if value.is_object() || value.is_array() => Self::Parsed(value),
            _ => Self::RawText(text.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

// Wire shapes: Parsed serializes as the value itself, RawText as
// {"_raw_text": ...}, Failed as {"_error": ...}.
impl Serialize for ExtractOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Parsed(value) => value.serialize(serializer),
            Self::RawText(text) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("_raw_text", text)?;
                map.end()
            }
            Self::Failed(message) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("_error", message)?;
                map.end()
            }
        }
    }
}

/// Both stages' raw outputs, bundled for responses and callback payloads
/// when raw inclusion is enabled.
#[derive(Debug, Clone, Serialize)]
pub struct RawOutputs {
    pub doc_qa: Vec<QaAnswer>,
    pub extraction: ExtractOutcome,
}
