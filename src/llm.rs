use crate::providers;
use crate::session::{Message, Role};
use crate::settings::SettingsStore;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("request cancelled")]
    Cancelled,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode reply: {0}")]
    Decode(String),
}

/// Calls the chat endpoint with whatever the settings store says right now.
#[derive(Debug, Clone)]
pub struct ModelClient {
    client: Client,
    endpoint: String,
    settings: Arc<SettingsStore>,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Debug, PartialEq)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<TextPart>,
}

#[derive(Serialize, Debug, PartialEq)]
struct TextPart {
    text: String,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<ReplyContent>,
}

/// Reply content is either a bare string or a list of parts.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum ReplyContent {
    Text(String),
    Parts(Vec<ContentPart>),
    Structured {
        #[serde(default)]
        parts: Vec<ContentPart>,
    },
}

/// One part of a reply. Parts without text (function calls, inline data)
/// are carried but contribute nothing to the reply string.
#[derive(Deserialize, Debug, PartialEq)]
pub struct ContentPart {
    #[serde(default)]
    pub text: Option<String>,
}

impl ReplyContent {
    pub fn into_text(self) -> String {
        match self {
            ReplyContent::Text(text) => text,
            ReplyContent::Parts(parts) | ReplyContent::Structured { parts } => {
                parts.into_iter().filter_map(|p| p.text).collect()
            }
        }
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

impl ModelClient {
    pub fn new(endpoint: String, settings: Arc<SettingsStore>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            settings,
        }
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Sends the whole history plus `persona` and returns the reply text.
    pub async fn chat_once(
        &self,
        history: &[Message],
        cancel: &CancellationToken,
        persona: &str,
    ) -> Result<String, ModelError> {
        let settings = self.settings.snapshot();
        let (provider, model) = providers::parse_base_model(settings.base_model.as_deref());
        let api_key = settings.api_key(&provider);

        let request = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![TextPart {
                    text: persona.to_string(),
                }],
            },
            contents: history
                .iter()
                .map(|m| Content {
                    role: Some(wire_role(m.role)),
                    parts: vec![TextPart {
                        text: m.content.clone(),
                    }],
                })
                .collect(),
            generation_config: GenerationConfig {
                temperature: settings.temperature_or_default(),
                top_p: settings.top_p_or_default(),
            },
        };

        debug!(
            provider = %provider,
            model = %model,
            messages = history.len(),
            "Calling model"
        );

        let url = format!("{}/v1beta/models/{}:generateContent", self.endpoint, model);
        let call = async {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", api_key)
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ModelError::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let bytes = response.bytes().await?;
            let parsed: GenerateResponse =
                serde_json::from_slice(&bytes).map_err(|e| ModelError::Decode(e.to_string()))?;
            Ok(parsed
                .candidates
                .into_iter()
                .next()
                .and_then(|c| c.content)
                .map(ReplyContent::into_text)
                .unwrap_or_default())
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Model call cancelled");
                Err(ModelError::Cancelled)
            }
            result = call => result,
        }
    }
}
