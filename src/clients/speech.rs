use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::fs;
use uuid::Uuid;

use super::{CollaboratorError, SpeechSynthesizer};

/// Posts text to a text-to-speech service and stores the returned MP3 under `audio_dir`.
pub struct HttpSpeechSynthesizer {
    http: reqwest::Client,
    api_url: Option<String>,
    audio_dir: PathBuf,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    lang: &'a str,
    format: &'a str,
}

impl HttpSpeechSynthesizer {
    pub fn new(
        api_url: Option<String>,
        audio_dir: PathBuf,
        timeout_secs: u64,
    ) -> Result<Self, CollaboratorError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_url,
            audio_dir,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<String, CollaboratorError> {
        let api_url = self
            .api_url
            .as_deref()
            .ok_or(CollaboratorError::Disabled("text-to-speech"))?;

        let response = self
            .http
            .post(api_url)
            .json(&SpeechRequest {
                text,
                lang: "en",
                format: "mp3",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(CollaboratorError::Malformed("empty audio body".to_string()));
        }

        fs::create_dir_all(&self.audio_dir).await?;
        let filename = format!("{}.mp3", Uuid::new_v4());
        fs::write(self.audio_dir.join(&filename), &audio).await?;

        Ok(format!("audio/{}", filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_service_reports_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let tts = HttpSpeechSynthesizer::new(None, dir.path().to_path_buf(), 1).unwrap();
        assert!(matches!(
            tts.synthesize("hello").await,
            Err(CollaboratorError::Disabled(_))
        ));
    }
}
