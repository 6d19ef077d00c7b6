use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Instant;

use async_trait::async_trait;
use regex::Regex;
use sqlx::PgPool;

use super::{CollaboratorError, ResumeExtractor, ResumeIndex};
use crate::utils::logger::LOGGER;

const CHUNK_SIZE: usize = 400;
const CHUNK_OVERLAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeKind {
    Pdf,
    Text,
}

impl ResumeKind {
    pub fn extension(self) -> &'static str {
        match self {
            ResumeKind::Pdf => "pdf",
            ResumeKind::Text => "txt",
        }
    }
}

/// Sniffs uploaded bytes; only PDFs and UTF-8 text are accepted as resumes.
pub fn detect_resume_kind(bytes: &[u8]) -> Option<ResumeKind> {
    match infer::get(bytes) {
        Some(kind) if kind.mime_type() == "application/pdf" => Some(ResumeKind::Pdf),
        Some(_) => None,
        None if !bytes.is_empty() && std::str::from_utf8(bytes).is_ok() => Some(ResumeKind::Text),
        None => None,
    }
}

pub struct PdfResumeExtractor;

#[async_trait]
impl ResumeExtractor for PdfResumeExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<String, CollaboratorError> {
        let text = match detect_resume_kind(bytes) {
            Some(ResumeKind::Pdf) => {
                let owned = bytes.to_vec();
                tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&owned))
                    .await
                    .map_err(|e| CollaboratorError::Malformed(format!("pdf extraction panicked: {}", e)))?
                    .map_err(|e| CollaboratorError::Malformed(e.to_string()))?
            }
            Some(ResumeKind::Text) => String::from_utf8_lossy(bytes).into_owned(),
            None => {
                return Err(CollaboratorError::Malformed(
                    "resume is neither PDF nor text".to_string(),
                ))
            }
        };

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(CollaboratorError::Malformed("resume has no text layer".to_string()));
        }
        Ok(text)
    }
}

/// Splits text into overlapping windows of `size` characters.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let step = size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        start += step;
    }

    chunks
}

fn tokens(text: &str) -> HashSet<String> {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let pattern = TOKEN.get_or_init(|| Regex::new(r"[A-Za-z0-9][A-Za-z0-9+#.\-]*").expect("valid token pattern"));

    pattern
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches('.').to_lowercase())
        .filter(|token| token.len() > 1)
        .collect()
}

/// Orders chunks by how many distinct query terms they contain, keeping the
/// original order among ties, and drops chunks that share no term at all.
pub fn rank_chunks(chunks: &[String], query: &str, k: usize) -> Vec<String> {
    let query_tokens = tokens(query);
    let mut scored: Vec<(usize, usize)> = chunks
        .iter()
        .enumerate()
        .map(|(idx, chunk)| (idx, tokens(chunk).intersection(&query_tokens).count()))
        .filter(|(_, score)| *score > 0)
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    scored
        .into_iter()
        .take(k)
        .map(|(idx, _)| chunks[idx].clone())
        .collect()
}

/// Resume passages stored per owner in `resume_chunks`.
pub struct PgResumeIndex {
    pool: PgPool,
}

impl PgResumeIndex {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResumeIndex for PgResumeIndex {
    async fn store(&self, owner_id: i32, text: &str) -> Result<usize, CollaboratorError> {
        let chunks = chunk_text(text, CHUNK_SIZE, CHUNK_OVERLAP);

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        sqlx::query("DELETE FROM resume_chunks WHERE user_id = $1")
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        for (idx, chunk) in chunks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO resume_chunks (user_id, chunk_index, content) VALUES ($1, $2, $3)",
            )
            .bind(owner_id)
            .bind(idx as i32)
            .bind(chunk)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)?;

        Ok(chunks.len())
    }

    async fn retrieve(
        &self,
        owner_id: i32,
        query: &str,
        k: usize,
    ) -> Result<String, CollaboratorError> {
        let sql = "SELECT content FROM resume_chunks WHERE user_id = $1 ORDER BY chunk_index";
        let started = Instant::now();
        let chunks: Vec<String> = sqlx::query_scalar(sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        LOGGER.log_database_query(sql, started.elapsed().as_millis(), Some(chunks.len()));

        Ok(rank_chunks(&chunks, query, k).join("\n"))
    }
}

fn db_error(err: sqlx::Error) -> CollaboratorError {
    CollaboratorError::Transport(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pdf_and_text_but_not_images() {
        assert_eq!(detect_resume_kind(b"%PDF-1.4\n%..."), Some(ResumeKind::Pdf));
        assert_eq!(detect_resume_kind(b"Jane Doe\nRust engineer"), Some(ResumeKind::Text));
        assert_eq!(detect_resume_kind(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]), None);
        assert_eq!(detect_resume_kind(b""), None);
    }

    #[tokio::test]
    async fn text_resume_is_extracted_verbatim() {
        let text = PdfResumeExtractor
            .extract(b"  Jane Doe - Go, SQL, Kubernetes  ")
            .await
            .unwrap();
        assert_eq!(text, "Jane Doe - Go, SQL, Kubernetes");
    }

    #[test]
    fn chunks_overlap_and_cover_the_text() {
        let text: String = "abcdefghij".repeat(100);
        let chunks = chunk_text(&text, 400, 50);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 400);
        assert_eq!(&chunks[0][350..400], &chunks[1][..50]);
        assert!(chunks.last().unwrap().ends_with('j'));
    }

    #[test]
    fn chunking_handles_multibyte_text() {
        let text = "é".repeat(500);
        let chunks = chunk_text(&text, 400, 50);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].chars().count(), 150);
    }

    #[test]
    fn ranking_prefers_chunks_sharing_more_terms() {
        let chunks = vec![
            "Led a team building payment APIs in Go".to_string(),
            "Hobbies: chess and hiking".to_string(),
            "Tuned PostgreSQL queries and Go services for latency".to_string(),
        ];
        let ranked = rank_chunks(&chunks, "How did you tune Go services on PostgreSQL?", 2);
        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].starts_with("Tuned PostgreSQL"));
        assert!(ranked[1].starts_with("Led a team"));
    }

    #[test]
    fn ranking_returns_nothing_without_overlap() {
        let chunks = vec!["Hobbies: chess".to_string()];
        assert!(rank_chunks(&chunks, "kubernetes", 3).is_empty());
    }
}
