mod wire;

use log::{debug, error, info};
use serde_json::Value;
use thiserror::Error;

use crate::config::AppConfig;
use crate::web::models::{ChatRole, ChatTurn};
use wire::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part, Role,
    SystemInstruction,
};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const BODY_EXCERPT_LIMIT: usize = 500;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Gemini API key is not configured on the server.")]
    ApiKeyMissing,
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Gemini API returned an invalid response (HTTP {status}): {excerpt}")]
    Protocol { status: u16, excerpt: String },
    #[error("{0}")]
    Api(String),
    #[error("Gemini API returned an empty response")]
    Empty,
}

// A wrapper for the Gemini generateContent API.
pub struct GeminiService {
    config: AppConfig,
    client: reqwest::Client,
    base_url: String,
}

impl GeminiService {
    pub fn new(config: AppConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            client,
            base_url: GEMINI_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn generate_response(
        &self,
        message: &str,
        history: &[ChatTurn],
    ) -> Result<String, RelayError> {
        if self.config.api_key.is_empty() {
            return Err(RelayError::ApiKeyMissing);
        }

        let request = GenerateContentRequest {
            contents: build_contents(history, message, self.config.max_history_items),
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: self.config.system_instruction.to_string(),
                }],
            },
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        debug!(
            "Sending generateContent request with {} content entries",
            request.contents.len()
        );

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        let body = response.text().await?;

        let payload: Value = match serde_json::from_str(&body) {
            Ok(payload) => payload,
            Err(_) => {
                error!(
                    "Gemini API returned a non-JSON response: {}",
                    excerpt(&body, 200)
                );
                return Err(RelayError::Protocol {
                    status: status.as_u16(),
                    excerpt: excerpt(&body, BODY_EXCERPT_LIMIT),
                });
            }
        };

        if !status.is_success() {
            let message = extract_api_error(&payload, &body);
            error!("Gemini API error: {message}");
            return Err(RelayError::Api(message));
        }

        let parsed: GenerateContentResponse = serde_json::from_value(payload).unwrap_or_default();
        let text = parsed
            .candidates
            .first()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .iter()
                    .map(|part| part.text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default();
        let text = text.trim();

        if text.is_empty() {
            return Err(RelayError::Empty);
        }

        info!("Generated response of {} characters", text.len());
        Ok(text.to_string())
    }
}

/// Keep the most recent `max_history_items` turns, map roles to the Gemini
/// vocabulary, and append the new user message as the trailing entry.
fn build_contents(history: &[ChatTurn], message: &str, max_history_items: usize) -> Vec<Content> {
    let start = history.len().saturating_sub(max_history_items);
    let mut contents: Vec<Content> = history[start..]
        .iter()
        .map(|turn| Content {
            role: match turn.role {
                ChatRole::User => Role::User,
                ChatRole::Assistant => Role::Model,
            },
            parts: vec![Part {
                text: turn.text.clone(),
            }],
        })
        .collect();
    contents.push(Content {
        role: Role::User,
        parts: vec![Part {
            text: message.to_string(),
        }],
    });
    contents
}

// Ordered fallback chain over the loosely-typed error envelope; every step is
// total and the chain bottoms out in a raw-body excerpt.
fn extract_api_error(payload: &Value, raw_body: &str) -> String {
    match payload.get("error") {
        Some(Value::String(message)) => message.clone(),
        Some(error) => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| error.to_string()),
        None if !payload.is_null() => payload.to_string(),
        None => excerpt(raw_body, BODY_EXCERPT_LIMIT),
    }
}

fn excerpt(body: &str, limit: usize) -> String {
    body.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_key: &str) -> AppConfig {
        let mut config = AppConfig::from_lookup(|_| None).unwrap();
        config.api_key = api_key.to_string();
        config
    }

    fn turn(role: ChatRole, text: &str) -> ChatTurn {
        ChatTurn {
            role,
            text: text.to_string(),
        }
    }

    fn service(server: &MockServer, api_key: &str) -> GeminiService {
        GeminiService::new(test_config(api_key), reqwest::Client::new())
            .with_base_url(server.uri())
    }

    #[test]
    fn windowing_keeps_the_most_recent_turns_in_order() {
        let history: Vec<ChatTurn> = (0..20)
            .map(|i| turn(ChatRole::User, &format!("turn {i}")))
            .collect();
        let contents = build_contents(&history, "latest", 15);

        assert_eq!(contents.len(), 16);
        assert_eq!(contents[0].parts[0].text, "turn 5");
        assert_eq!(contents[14].parts[0].text, "turn 19");
        assert_eq!(contents[15].parts[0].text, "latest");
        assert_eq!(contents[15].role, Role::User);
    }

    #[test]
    fn windowing_passes_short_history_through_untouched() {
        let history = vec![
            turn(ChatRole::User, "hello"),
            turn(ChatRole::Assistant, "hi Sensei"),
        ];
        let contents = build_contents(&history, "how are you?", 15);

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role, Role::User);
        assert_eq!(contents[1].role, Role::Model);
        assert_eq!(contents[2].role, Role::User);
        assert_eq!(contents[2].parts[0].text, "how are you?");
    }

    #[test]
    fn payload_carries_system_instruction_and_generation_config() {
        let request = GenerateContentRequest {
            contents: build_contents(&[], "ping", 15),
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: "stay in character".to_string(),
                }],
            },
            generation_config: GenerationConfig {
                temperature: 1.0,
                max_output_tokens: 5120,
            },
        };
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["contents"][0]["parts"][0]["text"], "ping");
        assert_eq!(
            value["system_instruction"]["parts"][0]["text"],
            "stay in character"
        );
        assert_eq!(value["generationConfig"]["temperature"], 1.0);
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 5120);
    }

    #[test]
    fn error_extraction_prefers_string_then_message_then_raw() {
        let string_error = json!({ "error": "flat error" });
        assert_eq!(extract_api_error(&string_error, "{}"), "flat error");

        let object_error = json!({ "error": { "message": "quota exceeded", "code": 429 } });
        assert_eq!(extract_api_error(&object_error, "{}"), "quota exceeded");

        let opaque_error = json!({ "error": { "code": 500 } });
        assert_eq!(extract_api_error(&opaque_error, "{}"), r#"{"code":500}"#);

        let no_error_field = json!({ "detail": "something odd" });
        assert_eq!(
            extract_api_error(&no_error_field, "{}"),
            r#"{"detail":"something odd"}"#
        );

        assert_eq!(extract_api_error(&Value::Null, "raw text"), "raw text");
    }

    #[actix_web::test]
    async fn missing_api_key_short_circuits_before_any_network_call() {
        // An unroutable base URL would surface as a transport error if the
        // relay ever dispatched.
        let service = GeminiService::new(test_config(""), reqwest::Client::new())
            .with_base_url("http://127.0.0.1:1");

        let err = service.generate_response("hello", &[]).await.unwrap_err();
        assert!(matches!(err, RelayError::ApiKeyMissing));
    }

    #[actix_web::test]
    async fn concatenates_and_trims_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [
                    { "text": "Hi" },
                    { "text": " there" }
                ] } }]
            })))
            .mount(&server)
            .await;

        let text = service(&server, "test-key")
            .generate_response("hello", &[])
            .await
            .unwrap();
        assert_eq!(text, "Hi there");
    }

    #[actix_web::test]
    async fn empty_candidates_are_reported_as_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let err = service(&server, "test-key")
            .generate_response("hello", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Empty));
    }

    #[actix_web::test]
    async fn whitespace_only_parts_are_reported_as_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "  \n " }] } }]
            })))
            .mount(&server)
            .await;

        let err = service(&server, "test-key")
            .generate_response("hello", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Empty));
    }

    #[actix_web::test]
    async fn upstream_error_envelope_yields_the_extracted_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "quota exceeded" }
            })))
            .mount(&server)
            .await;

        let err = service(&server, "test-key")
            .generate_response("hello", &[])
            .await
            .unwrap_err();
        match err {
            RelayError::Api(message) => assert_eq!(message, "quota exceeded"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[actix_web::test]
    async fn non_json_body_yields_a_protocol_error_with_status_and_excerpt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_string("<html>bad gateway</html>".repeat(40)),
            )
            .mount(&server)
            .await;

        let err = service(&server, "test-key")
            .generate_response("hello", &[])
            .await
            .unwrap_err();
        match &err {
            RelayError::Protocol { status, excerpt } => {
                assert_eq!(*status, 500);
                assert!(excerpt.starts_with("<html>bad gateway</html>"));
                assert!(excerpt.chars().count() <= 500);
            }
            other => panic!("expected Protocol error, got {other:?}"),
        }
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[actix_web::test]
    async fn request_body_reflects_windowed_history() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "ok" }] } }]
            })))
            .mount(&server)
            .await;

        let mut config = test_config("test-key");
        config.max_history_items = 2;
        let service = GeminiService::new(config, reqwest::Client::new())
            .with_base_url(server.uri());

        let history = vec![
            turn(ChatRole::User, "oldest"),
            turn(ChatRole::User, "older"),
            turn(ChatRole::Assistant, "newest"),
        ];
        service.generate_response("now", &history).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["parts"][0]["text"], "older");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "now");
    }
}
