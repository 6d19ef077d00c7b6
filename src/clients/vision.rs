use std::time::Duration;

use async_trait::async_trait;
use base64ct::{Base64, Encoding};

use super::{CollaboratorError, FaceDetector, FrameDetections};

/// Sends still frames to a face-detection service that answers with
/// `{"frame_width": <px>, "faces": [{"origin_x": <px>, "width": <px>}, ...]}`.
pub struct HttpFaceDetector {
    http: reqwest::Client,
    api_url: Option<String>,
}

impl HttpFaceDetector {
    pub fn new(api_url: Option<String>, timeout_secs: u64) -> Result<Self, CollaboratorError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self { http, api_url })
    }
}

#[async_trait]
impl FaceDetector for HttpFaceDetector {
    async fn detect(&self, image: &[u8]) -> Result<FrameDetections, CollaboratorError> {
        let api_url = self
            .api_url
            .as_deref()
            .ok_or(CollaboratorError::Disabled("face detection"))?;

        let content_type = infer::get(image)
            .map(|kind| kind.mime_type())
            .unwrap_or("application/octet-stream");

        let response = self
            .http
            .post(api_url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(image.to_vec())
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

        response
            .json::<FrameDetections>()
            .await
            .map_err(|e| CollaboratorError::Malformed(e.to_string()))
    }
}

/// Decodes a `data:image/...;base64,` URL (or bare base64) into image bytes.
/// Returns `None` unless the payload decodes to a recognised image format.
pub fn decode_frame(encoded: &str) -> Option<Vec<u8>> {
    let payload = match encoded.split_once(',') {
        Some((header, data)) if header.starts_with("data:") => data,
        Some(_) => return None,
        None => encoded,
    };

    let bytes = Base64::decode_vec(payload.trim()).ok()?;
    match infer::get(&bytes) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => Some(bytes),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn decodes_data_url_frames() {
        let encoded = Base64::encode_string(&PNG_HEADER);
        let url = format!("data:image/png;base64,{}", encoded);
        assert_eq!(decode_frame(&url), Some(PNG_HEADER.to_vec()));
        assert_eq!(decode_frame(&encoded), Some(PNG_HEADER.to_vec()));
    }

    #[test]
    fn rejects_garbage_and_non_images() {
        assert_eq!(decode_frame("data:image/png;base64,@@@"), None);
        assert_eq!(decode_frame("not,a,data,url"), None);
        let text = Base64::encode_string(b"just some text");
        assert_eq!(decode_frame(&text), None);
    }

    #[tokio::test]
    async fn unconfigured_detector_reports_disabled() {
        let detector = HttpFaceDetector::new(None, 1).unwrap();
        assert!(matches!(
            detector.detect(&PNG_HEADER).await,
            Err(CollaboratorError::Disabled(_))
        ));
    }
}
