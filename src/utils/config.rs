use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Runtime settings, read once from the environment (and `.env` via dotenv).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub bind_addr: String,
    pub cors_origin: String,
    pub max_request_body_mb: usize,
    pub upload_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub report_dir: PathBuf,
    pub public_base_url: String,
    pub llm: LlmSettings,
    pub tts_api_url: Option<String>,
    pub vision_api_url: Option<String>,
    pub collaborator_timeout_secs: u64,
    pub proctor_warning_limit: u32,
    pub resume_context_top_k: usize,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub interview_model: String,
    pub scoring_model: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_ttl_hours: parse_or("JWT_TTL_HOURS", 24)?,
            bind_addr: string_or("BIND_ADDR", "0.0.0.0:8000"),
            cors_origin: string_or("CORS_ALLOWED_ORIGIN", "http://localhost:3000"),
            max_request_body_mb: parse_or("MAX_REQUEST_BODY_MB", 20)?,
            upload_dir: string_or("UPLOAD_DIR", "./storage/uploads").into(),
            audio_dir: string_or("AUDIO_DIR", "./storage/audio").into(),
            report_dir: string_or("REPORT_DIR", "./storage/reports").into(),
            public_base_url: string_or("PUBLIC_BASE_URL", "http://localhost:8000")
                .trim_end_matches('/')
                .to_string(),
            llm: LlmSettings {
                api_url: string_or("LLM_API_URL", "https://api.groq.com/openai/v1"),
                api_key: optional("LLM_API_KEY"),
                interview_model: string_or("LLM_MODEL", "llama-3.3-70b-versatile"),
                scoring_model: string_or("LLM_SCORING_MODEL", "llama-3.1-8b-instant"),
            },
            tts_api_url: optional("TTS_API_URL"),
            vision_api_url: optional("VISION_API_URL"),
            collaborator_timeout_secs: parse_or("COLLABORATOR_TIMEOUT_SECS", 30)?,
            proctor_warning_limit: parse_or("PROCTOR_WARNING_LIMIT", 3)?,
            resume_context_top_k: parse_or("RESUME_CONTEXT_TOP_K", 3)?,
        })
    }
}

fn string_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        Err(_) => Ok(default),
    }
}
