//! Conversation generator boundary
//!
//! The generator is an external text-generation service. The core only
//! defines the request and response shapes and rejects output that does not
//! fit them; it never repairs a response.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evaluation::{ConversationMeta, DialogueLine};
use crate::models::{Belief, EntityId, RelationType, Resident, ThreadStatus};
use crate::util::{normalize_endpoint, normalize_text_option, parse_api_error};

/// Thread state handed to the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadContext {
    pub thread_id: EntityId,
    pub participants: [Resident; 2],
    pub relation: RelationType,
    pub status: ThreadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub thread_context: ThreadContext,
    /// Beliefs of the participants, keyed by resident id
    pub beliefs: BTreeMap<EntityId, Belief>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_summary: Option<String>,
}

impl GenerationRequest {
    pub fn participant_ids(&self) -> [&EntityId; 2] {
        let [a, b] = &self.thread_context.participants;
        [&a.meta.id, &b.meta.id]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedConversation {
    pub thread_id: EntityId,
    pub participants: [EntityId; 2],
    #[serde(default)]
    pub topic: Option<String>,
    pub lines: Vec<DialogueLine>,
    pub meta: ConversationMeta,
}

impl GeneratedConversation {
    /// Reject output that does not belong to `request`.
    pub fn validate(&self, request: &GenerationRequest) -> Result<(), GeneratorError> {
        let [a, b] = request.participant_ids();
        let [x, y] = &self.participants;
        let same_pair = (x == a && y == b) || (x == b && y == a);
        if !same_pair {
            return Err(GeneratorError::Malformed(format!(
                "participants {x}/{y} do not match requested pair {a}/{b}"
            )));
        }
        if self.thread_id != request.thread_context.thread_id {
            return Err(GeneratorError::Malformed(format!(
                "thread id {} does not match requested thread {}",
                self.thread_id, request.thread_context.thread_id
            )));
        }
        if self.lines.is_empty() {
            return Err(GeneratorError::Malformed("no dialogue lines".to_string()));
        }
        if let Some(line) = self
            .lines
            .iter()
            .find(|line| (&line.speaker != a && &line.speaker != b) || line.text.trim().is_empty())
        {
            return Err(GeneratorError::Malformed(format!(
                "invalid line from speaker {}",
                line.speaker
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Invalid generator configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Generator rejected credentials: {0}")]
    Unauthenticated(String),
    #[error("Malformed generator output: {0}")]
    Malformed(String),
    #[error("Generator request failed: {0}")]
    Transport(String),
    #[error("Generator API error: {0}")]
    Api(String),
}

impl GeneratorError {
    pub const fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated(_))
    }

    /// Worth retrying: the request never produced an answer.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for GeneratorError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Malformed(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

/// Produces one conversation for a thread.
#[async_trait]
pub trait ConversationGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedConversation, GeneratorError>;
}

/// JSON-over-HTTP generator endpoint with bearer authentication.
#[derive(Clone)]
pub struct HttpConversationGenerator {
    endpoint: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpConversationGenerator {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpConversationGenerator")
            .field("endpoint", &self.endpoint)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}

impl HttpConversationGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        access_token: Option<String>,
    ) -> Result<Self, GeneratorError> {
        let endpoint =
            normalize_endpoint(&endpoint.into()).map_err(GeneratorError::InvalidConfiguration)?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| GeneratorError::InvalidConfiguration(error.to_string()))?;
        Ok(Self {
            endpoint,
            access_token: normalize_text_option(access_token),
            client,
        })
    }
}

#[async_trait]
impl ConversationGenerator for HttpConversationGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedConversation, GeneratorError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json")
            .json(request);
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Unauthenticated(parse_api_error(
                status.as_u16(),
                &body,
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = parse_api_error(status.as_u16(), &body);
            return Err(if status.is_server_error() {
                GeneratorError::Transport(message)
            } else {
                GeneratorError::Api(message)
            });
        }

        let body = response.text().await?;
        let conversation: GeneratedConversation = serde_json::from_str(&body)
            .map_err(|error| GeneratorError::Malformed(error.to_string()))?;
        conversation.validate(request)?;
        Ok(conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Entity;

    fn request() -> GenerationRequest {
        let a = Resident::new("Aoi", 1);
        let b = Resident::new("Ren", 1);
        GenerationRequest {
            thread_context: ThreadContext {
                thread_id: EntityId::from("t1"),
                participants: [a, b],
                relation: RelationType::Friend,
                status: ThreadStatus::Ongoing,
                topic: None,
            },
            beliefs: BTreeMap::new(),
            topic_hint: None,
            last_summary: None,
        }
    }

    fn output(request: &GenerationRequest) -> GeneratedConversation {
        let [a, b] = request.participant_ids();
        GeneratedConversation {
            thread_id: EntityId::from("t1"),
            participants: [b.clone(), a.clone()],
            topic: Some("映画".to_string()),
            lines: vec![
                DialogueLine {
                    speaker: a.clone(),
                    text: "観た?".to_string(),
                },
                DialogueLine {
                    speaker: b.clone(),
                    text: "観たよ".to_string(),
                },
            ],
            meta: ConversationMeta::default(),
        }
    }

    #[test]
    fn test_validate_accepts_matching_output() {
        let request = request();
        assert!(output(&request).validate(&request).is_ok());
    }

    #[test]
    fn test_validate_rejects_foreign_speaker() {
        let request = request();
        let mut out = output(&request);
        out.lines[0].speaker = EntityId::from("stranger");
        assert!(matches!(
            out.validate(&request),
            Err(GeneratorError::Malformed(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_dialogue_and_wrong_thread() {
        let request = request();
        let mut empty = output(&request);
        empty.lines.clear();
        assert!(empty.validate(&request).is_err());

        let mut wrong_thread = output(&request);
        wrong_thread.thread_id = EntityId::from("t2");
        assert!(wrong_thread.validate(&request).is_err());
    }

    #[test]
    fn test_error_classification() {
        assert!(GeneratorError::Unauthenticated("401".into()).is_unauthenticated());
        assert!(GeneratorError::Transport("reset".into()).is_transient());
        assert!(!GeneratorError::Malformed("bad".into()).is_transient());
        assert!(!GeneratorError::Api("bad request".into()).is_transient());
    }

    #[test]
    fn test_new_rejects_bad_endpoint_and_redacts_token() {
        assert!(HttpConversationGenerator::new("not-a-url", None).is_err());

        let generator =
            HttpConversationGenerator::new("https://gen.example.com/", Some("secret".into()))
                .unwrap();
        let debug = format!("{generator:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("https://gen.example.com"));
    }

    #[test]
    fn test_request_serializes_camel_case() {
        let request = request();
        let json = serde_json::to_value(&request).unwrap();
        assert!(json["threadContext"]["threadId"].is_string());
        assert_eq!(
            json["threadContext"]["participants"][0]["id"],
            serde_json::json!(request.thread_context.participants[0].id().as_str())
        );
    }
}
