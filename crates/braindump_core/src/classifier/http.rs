//! HTTP classifier adapter.
//!
//! # Responsibility
//! - POST a `ClassifyRequest` as JSON to a configured endpoint.
//! - Map transport and status failures onto `ClassifierError`.
//!
//! # Invariants
//! - Every call is bounded by the configured timeout.
//! - Response bodies are only decoded here; validation happens in
//!   `classify_batch`.

use super::{Classifier, ClassifierError, ClassifyRequest, ClassifyResponse};
use std::io;
use std::time::Duration;

const TOO_MANY_REQUESTS: u16 = 429;

/// Classifier backed by a JSON-over-HTTP endpoint.
pub struct HttpClassifier {
    endpoint: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, api_key: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            endpoint: endpoint.into(),
            api_key,
            agent,
        }
    }
}

impl Classifier for HttpClassifier {
    fn classify(&self, request: &ClassifyRequest) -> Result<ClassifyResponse, ClassifierError> {
        let mut call = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json");
        if let Some(key) = &self.api_key {
            call = call.set("Authorization", &format!("Bearer {key}"));
        }

        let response = match call.send_json(request) {
            Ok(response) => response,
            Err(ureq::Error::Status(TOO_MANY_REQUESTS, _)) => {
                return Err(ClassifierError::QuotaExceeded)
            }
            Err(ureq::Error::Status(code, _)) => {
                return Err(ClassifierError::Unavailable(format!("HTTP status {code}")))
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(if is_timeout(&transport) {
                    ClassifierError::Timeout
                } else {
                    ClassifierError::Unavailable(transport.to_string())
                })
            }
        };

        response
            .into_json::<ClassifyResponse>()
            .map_err(|err| match err.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ClassifierError::Timeout,
                _ => ClassifierError::InvalidResponse(err.to_string()),
            })
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<io::Error>())
        .is_some_and(|err| {
            matches!(
                err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            )
        })
}

#[cfg(test)]
mod tests {
    use super::HttpClassifier;
    use crate::classifier::{
        Classifier, ClassifierError, ClassifyRequest, PriorDocumentSummary,
    };
    use crate::model::document::Document;
    use chrono::Utc;
    use std::time::Duration;

    #[test]
    fn unreachable_endpoint_maps_to_recoverable_error() {
        let classifier = HttpClassifier::new(
            "http://127.0.0.1:9/classify",
            Duration::from_millis(300),
            Some("secret".to_string()),
        );
        let request = ClassifyRequest {
            raw_dump: String::new(),
            carry_over: Vec::new(),
            new_tasks: Vec::new(),
            max_today: 5,
            context: PriorDocumentSummary::of(&Document::new(Utc::now())),
        };
        let err = classifier.classify(&request).unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::Unavailable(_) | ClassifierError::Timeout
        ));
    }
}
