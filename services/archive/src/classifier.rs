//! Client for the external classification service.
//!
//! The service receives an owner candidate (the intake folder a recording was
//! uploaded into) together with the derived start label, and answers with the
//! canonical owner folder and session start time, or with a rejection.

use crate::config::ClassificationConfig;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Errors that prevent a decision from being reached
#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("Classification service unreachable: {0}")]
    Unreachable(String),

    #[error("Malformed classification response: {0}")]
    MalformedResponse(String),
}

/// Outcome of a well-formed classification exchange
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationDecision {
    Accepted {
        owner_folder: String,
        canonical_start_time: String,
        /// Response body as received
        payload: String,
    },
    Rejected {
        reason: String,
    },
}

/// Maps an owner candidate and start label to a decision
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        owner_candidate: &str,
        start_label: &str,
    ) -> Result<ClassificationDecision, ClassificationError>;
}

/// Classifier speaking the form-POST / JSON protocol over HTTP
pub struct HttpClassifier {
    client: reqwest::Client,
    endpoint: String,
    owner_field: String,
    label_field: String,
}

impl HttpClassifier {
    pub fn new(config: &ClassificationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            owner_field: config.owner_field.clone(),
            label_field: config.label_field.clone(),
        }
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn classify(
        &self,
        owner_candidate: &str,
        start_label: &str,
    ) -> Result<ClassificationDecision, ClassificationError> {
        let form = reqwest::multipart::Form::new()
            .text(self.owner_field.clone(), owner_candidate.trim().to_string())
            .text(self.label_field.clone(), start_label.trim().to_string());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClassificationError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Classification service returned an error status");
            return Err(ClassificationError::Unreachable(format!("HTTP status {}", status)));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ClassificationError::MalformedResponse(e.to_string()))?;

        let decision = parse_decision(&payload)?;
        debug!(?decision, "Classification decision received");
        Ok(decision)
    }
}

/// Validate a response payload into a decision.
///
/// `error` may be a number (integer or float), a numeric string or a bool;
/// zero or `false` means accepted.
pub fn parse_decision(payload: &Value) -> Result<ClassificationDecision, ClassificationError> {
    let accepted = match payload.get("error") {
        Some(Value::Number(n)) => n.as_f64().map(|f| f == 0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().map(|f| f == 0.0),
        Some(Value::Bool(b)) => Some(!*b),
        _ => None,
    }
    .ok_or_else(|| {
        ClassificationError::MalformedResponse(format!("missing or non-numeric error flag in {}", payload))
    })?;

    if !accepted {
        return Ok(ClassificationDecision::Rejected {
            reason: payload.to_string(),
        });
    }

    let data = payload
        .get("data")
        .ok_or_else(|| ClassificationError::MalformedResponse("accepted response without data".to_string()))?;

    let start_time = required_str(data, "start_date")?;
    let owner_folder = required_str(data, "folderName")?;

    if owner_folder.contains('/') || owner_folder.contains('\\') || owner_folder.contains("..") {
        return Err(ClassificationError::MalformedResponse(format!(
            "folderName {:?} is not a single path segment",
            owner_folder
        )));
    }

    Ok(ClassificationDecision::Accepted {
        owner_folder: owner_folder.to_string(),
        canonical_start_time: start_time.to_string(),
        payload: payload.to_string(),
    })
}

fn required_str<'v>(data: &'v Value, field: &str) -> Result<&'v str, ClassificationError> {
    data.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ClassificationError::MalformedResponse(format!("data.{} missing or empty", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn config_for(server: &mockito::ServerGuard) -> ClassificationConfig {
        ClassificationConfig {
            endpoint: format!("{}/get-class-student", server.url()),
            owner_field: "teacher_name".to_string(),
            label_field: "start_date".to_string(),
        }
    }

    #[test]
    fn test_parse_accepted() {
        let payload = json!({
            "error": 0,
            "data": { "start_date": "2024-03-10 08:00:00", "folderName": "TeacherA" }
        });

        assert_eq!(
            parse_decision(&payload).unwrap(),
            ClassificationDecision::Accepted {
                owner_folder: "TeacherA".to_string(),
                canonical_start_time: "2024-03-10 08:00:00".to_string(),
                payload: payload.to_string(),
            }
        );
    }

    #[test]
    fn test_parse_float_flag() {
        let payload = json!({
            "error": 0.0,
            "data": { "start_date": "2024-03-10 08:00:00", "folderName": "TeacherA" }
        });
        assert!(matches!(
            parse_decision(&payload),
            Ok(ClassificationDecision::Accepted { .. })
        ));

        let payload = json!({ "error": 1.0, "message": "no class at this time" });
        assert!(matches!(
            parse_decision(&payload),
            Ok(ClassificationDecision::Rejected { .. })
        ));
    }

    #[test]
    fn test_parse_rejected() {
        let payload = json!({ "error": 1, "message": "no class at this time" });

        match parse_decision(&payload).unwrap() {
            ClassificationDecision::Rejected { reason } => {
                assert!(reason.contains("no class at this time"));
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_string_flag() {
        let payload = json!({
            "error": "0",
            "data": { "start_date": "2024-03-10 08:00:00", "folderName": "TeacherA" }
        });
        assert!(matches!(
            parse_decision(&payload),
            Ok(ClassificationDecision::Accepted { .. })
        ));
    }

    #[test]
    fn test_parse_missing_flag_is_malformed() {
        let payload = json!({ "data": {} });
        assert!(matches!(
            parse_decision(&payload),
            Err(ClassificationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_accepted_without_folder_is_malformed() {
        let payload = json!({ "error": 0, "data": { "start_date": "2024-03-10 08:00:00" } });
        assert!(matches!(
            parse_decision(&payload),
            Err(ClassificationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_traversal_in_folder() {
        let payload = json!({
            "error": 0,
            "data": { "start_date": "2024-03-10 08:00:00", "folderName": "../other" }
        });
        assert!(matches!(
            parse_decision(&payload),
            Err(ClassificationError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_http_classify_sends_form_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/get-class-student")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="teacher_name"\s+TeacherA"#.to_string()),
                Matcher::Regex(r#"name="start_date"\s+8-15-30_10-3-2024"#.to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"error":0,"data":{"start_date":"2024-03-10 08:00:00","folderName":"TeacherA"}}"#,
            )
            .create_async()
            .await;

        let classifier = HttpClassifier::new(&config_for(&server));
        let decision = classifier
            .classify(" TeacherA ", "8-15-30_10-3-2024")
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(matches!(decision, ClassificationDecision::Accepted { .. }));
    }

    #[tokio::test]
    async fn test_http_error_status_is_unreachable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/get-class-student")
            .with_status(502)
            .create_async()
            .await;

        let classifier = HttpClassifier::new(&config_for(&server));
        let result = classifier.classify("TeacherA", "8-15-30_10-3-2024").await;

        assert!(matches!(result, Err(ClassificationError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_http_non_json_body_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/get-class-student")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let classifier = HttpClassifier::new(&config_for(&server));
        let result = classifier.classify("TeacherA", "8-15-30_10-3-2024").await;

        assert!(matches!(result, Err(ClassificationError::MalformedResponse(_))));
    }
}
