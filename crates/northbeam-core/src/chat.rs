//! Chat widget — conversation state and the bridge to an external text-generation service.
//!
//! The service is an OpenAI-compatible chat-completions endpoint (OpenRouter by default).
//! Any failure is swallowed into a localized apology appended to the conversation; the
//! widget never retries. The only store interaction is the human-handoff escalation.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::forms::{EscalationForm, FormError, SubmissionForm};
use crate::local_store::SubmissionStore;
use crate::submission::SubmissionRecord;

pub const DEFAULT_COMPLETIONS_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are the assistant on the Northbeam Consulting website. \
Answer questions about our services, case studies and hiring in a concise, friendly, professional tone. \
Do not invent prices or commitments. If the visitor wants to talk to a person, suggest the contact form \
or the 'talk to a human' button.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: ChatRole::User, text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: ChatRole::Model, text: text.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    De,
}

impl Locale {
    pub fn parse_or_default(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "de" | "de-de" | "de-at" | "de-ch" => Self::De,
            _ => Self::En,
        }
    }

    pub fn greeting(&self) -> &'static str {
        match self {
            Self::En => "Hi! How can we help you today?",
            Self::De => "Hallo! Wie können wir Ihnen heute helfen?",
        }
    }

    pub fn failure_message(&self) -> &'static str {
        match self {
            Self::En => "Sorry, something went wrong. Please try again or use our contact form.",
            Self::De => "Entschuldigung, etwas ist schiefgelaufen. Bitte versuchen Sie es erneut oder nutzen Sie unser Kontaktformular.",
        }
    }

    pub fn escalation_confirmation(&self) -> &'static str {
        match self {
            Self::En => "Thanks! A member of our team will get back to you shortly.",
            Self::De => "Danke! Ein Mitglied unseres Teams meldet sich in Kürze bei Ihnen.",
        }
    }
}

/// The visible conversation of one widget.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default)]
    pub locale: Locale,
    #[serde(default)]
    pub turns: Vec<ChatTurn>,
}

impl Conversation {
    /// Fresh conversation opened by the localized greeting.
    pub fn new(locale: Locale) -> Self {
        Self {
            locale,
            turns: vec![ChatTurn::model(locale.greeting())],
        }
    }

    /// `User: …` / `Assistant: …` lines for the handoff record.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| match t.role {
                ChatRole::User => format!("User: {}", t.text),
                ChatRole::Model => format!("Assistant: {}", t.text),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("no API key configured for the completion service")]
    MissingApiKey,
    #[error("completion request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("completion service {0}: {1}")]
    Upstream(u16, String),
    #[error("completion response parse: {0}")]
    Parse(String),
    #[error("completion service returned no text")]
    EmptyReply,
}

/// The external text-generation collaborator.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        system_instruction: &str,
        turns: &[ChatTurn],
    ) -> Result<String, ChatError>;
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Option<Vec<CompletionChoice>>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat-completions client.
pub struct OpenRouterClient {
    api_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenRouterClient {
    pub fn new(api_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_url: api_url.into(),
            model: model.into(),
            api_key: api_key.into().trim().to_string(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl CompletionClient for OpenRouterClient {
    async fn complete(
        &self,
        system_instruction: &str,
        turns: &[ChatTurn],
    ) -> Result<String, ChatError> {
        if self.api_key.is_empty() {
            return Err(ChatError::MissingApiKey);
        }

        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(WireMessage { role: "system", content: system_instruction });
        messages.extend(turns.iter().map(|t| WireMessage {
            role: match t.role {
                ChatRole::User => "user",
                ChatRole::Model => "assistant",
            },
            content: &t.text,
        }));
        let body = CompletionRequest { model: &self.model, messages };

        let res = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;
        if !status.is_success() {
            return Err(ChatError::Upstream(status.as_u16(), text));
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&text).map_err(|e| ChatError::Parse(e.to_string()))?;

        parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or(ChatError::EmptyReply)
    }
}

/// What the widget appended after a send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub text: String,
    /// True when the service failed and `text` is the localized apology.
    pub degraded: bool,
}

/// Conversation driver: fixed system instruction + completion client.
#[derive(Clone)]
pub struct ChatWidget {
    client: Arc<dyn CompletionClient>,
    system_instruction: String,
}

impl ChatWidget {
    pub fn new(client: Arc<dyn CompletionClient>, system_instruction: impl Into<String>) -> Self {
        Self {
            client,
            system_instruction: system_instruction.into(),
        }
    }

    /// Append the user's text, ask the service, append its reply (or the apology).
    /// Blank input is ignored and returns `None`.
    pub async fn send(&self, conversation: &mut Conversation, user_text: &str) -> Option<Reply> {
        let text = user_text.trim();
        if text.is_empty() {
            return None;
        }
        conversation.turns.push(ChatTurn::user(text));

        let reply = match self
            .client
            .complete(&self.system_instruction, &conversation.turns)
            .await
        {
            Ok(answer) => Reply { text: answer.trim().to_string(), degraded: false },
            Err(e) => {
                tracing::warn!("chat completion failed: {}", e);
                Reply {
                    text: conversation.locale.failure_message().to_string(),
                    degraded: true,
                }
            }
        };
        conversation.turns.push(ChatTurn::model(reply.text.clone()));
        Some(reply)
    }

    /// Human handoff: attach the transcript and capture one Lead.
    pub fn escalate(
        &self,
        store: &SubmissionStore,
        mut form: EscalationForm,
        conversation: &Conversation,
    ) -> Result<SubmissionRecord, FormError> {
        form.transcript = Some(conversation.transcript());
        let record = form.submit(store)?;
        tracing::info!(id = %record.id, "chat escalated to a human");
        Ok(record)
    }
}

/// Reply text ready for insertion into the widget's HTML.
pub fn render_reply_html(text: &str) -> String {
    html_escape(text.trim()).replace('\n', "<br>")
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
