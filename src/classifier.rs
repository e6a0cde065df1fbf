use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, Result};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Health verdict for one captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    /// The response could not be interpreted; never actuated on.
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }
}

/// Normalized result of one classification call.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub status: HealthStatus,
    pub confidence: f32,
    /// Care advice attached by the classifier, logged but not acted on.
    pub recommendations: Vec<String>,
}

impl ClassificationResult {
    /// The defaulting rule: a result is never absent, it resolves to this.
    pub fn unknown() -> Self {
        Self {
            status: HealthStatus::Unknown,
            confidence: 0.0,
            recommendations: Vec::new(),
        }
    }
}

/// Uploads captured frames to the remote classification endpoint.
///
/// `classify` never fails: transport errors, bad statuses and malformed
/// bodies all resolve to `HealthStatus::Unknown` so the caller can always
/// proceed with a value.
pub struct ClassificationClient {
    client: Client,
    endpoint: String,
}

impl ClassificationClient {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(ClassifierError::Transport)?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    /// Classify the frame at `path`.
    pub async fn classify(&self, path: &Path) -> ClassificationResult {
        match self.request(path).await {
            Ok(result) => {
                for advice in &result.recommendations {
                    info!(%advice, "classifier recommendation");
                }
                result
            }
            Err(e) => {
                warn!("classification failed: {}", e);
                ClassificationResult::unknown()
            }
        }
    }

    async fn request(&self, path: &Path) -> std::result::Result<ClassificationResult, ClassifierError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame.jpg".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("image/jpeg")
            .map_err(ClassifierError::Transport)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Decode(format!(
                "unexpected status {status}"
            )));
        }

        let text = response.text().await?;
        debug!(body = %text, "classifier response");
        let body: Value =
            serde_json::from_str(&text).map_err(|e| ClassifierError::Decode(e.to_string()))?;
        Ok(interpret_response(&body))
    }
}

/// Map the raw response body onto a `ClassificationResult`. Anything that
/// is not an object with a recognized `status` string resolves to the
/// unknown default, confidence included.
fn interpret_response(body: &Value) -> ClassificationResult {
    let Some(object) = body.as_object() else {
        warn!("classifier response is not a JSON object");
        return ClassificationResult::unknown();
    };

    let status = match object.get("status").and_then(Value::as_str) {
        Some("healthy") => HealthStatus::Healthy,
        Some("unhealthy") => HealthStatus::Unhealthy,
        Some(other) => {
            warn!(status = %other, "unrecognized classification status");
            return ClassificationResult::unknown();
        }
        None => {
            warn!("classifier response missing status field");
            return ClassificationResult::unknown();
        }
    };

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0) as f32;

    let recommendations = object
        .get("recommendations")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();

    ClassificationResult {
        status,
        confidence,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn interprets_healthy_response() {
        let result = interpret_response(&json!({
            "status": "healthy",
            "confidence": 0.92,
        }));
        assert_eq!(result.status, HealthStatus::Healthy);
        assert!((result.confidence - 0.92).abs() < 1e-6);
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn interprets_unhealthy_response_with_recommendations() {
        let result = interpret_response(&json!({
            "status": "unhealthy",
            "confidence": 0.87,
            "recommendations": ["Isolate affected plants", "Improve air circulation"],
        }));
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.recommendations.len(), 2);
    }

    #[test]
    fn missing_status_defaults_to_unknown() {
        let result = interpret_response(&json!({ "confidence": 0.5 }));
        assert_eq!(result, ClassificationResult::unknown());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn unrecognized_status_defaults_to_unknown() {
        let result = interpret_response(&json!({
            "status": "wilted",
            "confidence": 0.9,
        }));
        assert_eq!(result, ClassificationResult::unknown());
    }

    #[test]
    fn non_object_body_defaults_to_unknown() {
        assert_eq!(
            interpret_response(&json!(["healthy"])),
            ClassificationResult::unknown()
        );
        assert_eq!(
            interpret_response(&json!("healthy")),
            ClassificationResult::unknown()
        );
    }

    #[test]
    fn confidence_is_clamped_to_unit_interval() {
        let result = interpret_response(&json!({
            "status": "healthy",
            "confidence": 1.7,
        }));
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn transport_failure_resolves_to_unknown() {
        let config = ClassifierConfig {
            // nothing listens here; the connection is refused immediately
            endpoint: "http://127.0.0.1:1/detect".to_string(),
            request_timeout_secs: 1,
        };
        let client = ClassificationClient::new(&config).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        std::fs::write(&path, b"bytes").unwrap();

        let result = client.classify(&path).await;
        assert_eq!(result, ClassificationResult::unknown());
    }

    #[tokio::test]
    async fn unreadable_capture_resolves_to_unknown() {
        let config = ClassifierConfig {
            endpoint: "http://127.0.0.1:1/detect".to_string(),
            request_timeout_secs: 1,
        };
        let client = ClassificationClient::new(&config).unwrap();

        let result = client.classify(Path::new("/nonexistent/frame.jpg")).await;
        assert_eq!(result, ClassificationResult::unknown());
    }
}
