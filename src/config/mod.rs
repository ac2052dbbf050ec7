use serde::Deserialize;
use std::path::PathBuf;
use strum::Display;

/// Which chat-completion backend performs receipt normalization.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    Minimax,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Base URL of the document inference host serving both extraction models.
    pub inference_url: String,

    /// Optional bearer token for the inference host.
    #[serde(default)]
    pub inference_api_token: Option<String>,

    /// Model served for per-question document Q&A.
    #[serde(default = "default_doc_qa_model")]
    pub doc_qa_model: String,

    /// Model served for whole-document extraction.
    #[serde(default = "default_doc_extract_model")]
    pub doc_extract_model: String,

    /// Normalization backend selector.
    #[serde(default)]
    pub llm_provider: LlmProvider,

    /// Ollama server URL (local normalization backend).
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    /// Minimax API key; required only when `llm_provider = minimax`.
    #[serde(default)]
    pub minimax_api_key: Option<String>,

    #[serde(default = "default_minimax_base_url")]
    pub minimax_base_url: String,

    #[serde(default = "default_minimax_model")]
    pub minimax_model: String,

    /// Max seconds a synchronous caller waits for the pipeline gate before
    /// being rejected with a queue-wait timeout. Absent = wait indefinitely.
    #[serde(default)]
    pub pipeline_wait_timeout_secs: Option<u64>,

    /// Include raw stage outputs in responses and callback payloads.
    #[serde(default = "default_include_raw")]
    pub include_raw: bool,

    /// Callback endpoint for async job outcomes. Absent = delivery is a
    /// silent no-op.
    #[serde(default)]
    pub callback_url: Option<String>,

    /// Per-attempt callback POST timeout, in seconds.
    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,

    /// Additional callback attempts after the first failure.
    #[serde(default = "default_callback_max_retries")]
    pub callback_max_retries: u32,

    /// Directory for spooled job images. Defaults to a subdirectory of the
    /// OS temp dir.
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_doc_qa_model() -> String {
    "impira/layoutlm-document-qa".to_string()
}

fn default_doc_extract_model() -> String {
    "mychen76/invoice-and-receipts_donut_v1".to_string()
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2".to_string()
}

fn default_minimax_base_url() -> String {
    "https://api.minimax.io".to_string()
}

fn default_minimax_model() -> String {
    "MiniMax-M2.5".to_string()
}

fn default_include_raw() -> bool {
    true
}

fn default_callback_timeout_secs() -> u64 {
    10
}

fn default_callback_max_retries() -> u32 {
    2
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
