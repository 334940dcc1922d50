//! Submission producers: contact, careers, newsletter and chat escalation forms.
//!
//! Each form trims its input, validates it, and turns it into a payload. Validation
//! failure blocks the append and reports every failing field at once.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::local_store::SubmissionStore;
use crate::submission::{Payload, SubmissionKind, SubmissionRecord};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

/// One failing field, surfaced inline next to the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("form rejected: {} invalid field(s)", .fields.len())]
pub struct FormError {
    pub fields: Vec<FieldError>,
}

impl FormError {
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.field == field)
    }
}

pub fn is_valid_email(s: &str) -> bool {
    EMAIL_RE.is_match(s.trim())
}

/// Collects field errors and the payload in one pass.
#[derive(Default)]
struct PayloadBuilder {
    payload: Payload,
    errors: Vec<FieldError>,
}

impl PayloadBuilder {
    fn source(mut self, source: &str) -> Self {
        self.payload.insert("source".into(), source.into());
        self
    }

    fn text(mut self, field: &'static str, value: &str, min_chars: usize) -> Self {
        let v = value.trim();
        if v.chars().count() < min_chars {
            let message = if v.is_empty() {
                "required".to_string()
            } else {
                format!("must be at least {} characters", min_chars)
            };
            self.errors.push(FieldError { field, message });
        } else {
            self.payload.insert(field.into(), v.into());
        }
        self
    }

    fn email(mut self, field: &'static str, value: &str) -> Self {
        let v = value.trim();
        if v.is_empty() {
            self.errors.push(FieldError { field, message: "required".into() });
        } else if !is_valid_email(v) {
            self.errors.push(FieldError { field, message: "invalid email address".into() });
        } else {
            self.payload.insert(field.into(), v.into());
        }
        self
    }

    fn optional(mut self, field: &'static str, value: Option<&str>) -> Self {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.payload.insert(field.into(), v.into());
        }
        self
    }

    fn finish(self) -> Result<Payload, FormError> {
        if self.errors.is_empty() {
            Ok(self.payload)
        } else {
            Err(FormError { fields: self.errors })
        }
    }
}

/// A form that produces submission records.
pub trait SubmissionForm {
    const KIND: SubmissionKind;

    fn validate(&self) -> Result<Payload, FormError>;

    /// Validate and append to the store.
    fn submit(&self, store: &SubmissionStore) -> Result<SubmissionRecord, FormError> {
        match self.validate() {
            Ok(payload) => Ok(store.append(Self::KIND, payload)),
            Err(e) => {
                tracing::debug!(kind = %Self::KIND, "{}", e);
                Err(e)
            }
        }
    }
}

/// Contact form: a sales lead.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
}

impl SubmissionForm for ContactForm {
    const KIND: SubmissionKind = SubmissionKind::Lead;

    fn validate(&self) -> Result<Payload, FormError> {
        PayloadBuilder::default()
            .source("contact")
            .text("name", &self.name, 2)
            .email("email", &self.email)
            .text("message", &self.message, 10)
            .optional("company", self.company.as_deref())
            .optional("phone", self.phone.as_deref())
            .optional("service", self.service.as_deref())
            .finish()
    }
}

/// Careers form: a job applicant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CareersForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub portfolio: Option<String>,
}

impl SubmissionForm for CareersForm {
    const KIND: SubmissionKind = SubmissionKind::Applicant;

    fn validate(&self) -> Result<Payload, FormError> {
        PayloadBuilder::default()
            .source("careers")
            .text("name", &self.name, 2)
            .email("email", &self.email)
            .text("position", &self.position, 2)
            .text("message", &self.message, 20)
            .optional("phone", self.phone.as_deref())
            .optional("portfolio", self.portfolio.as_deref())
            .finish()
    }
}

/// Newsletter signup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewsletterForm {
    #[serde(default)]
    pub email: String,
}

impl SubmissionForm for NewsletterForm {
    const KIND: SubmissionKind = SubmissionKind::Subscriber;

    fn validate(&self) -> Result<Payload, FormError> {
        PayloadBuilder::default()
            .source("newsletter")
            .email("email", &self.email)
            .finish()
    }
}

/// Human handoff from the chat widget. The transcript is attached by the widget.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EscalationForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
}

impl SubmissionForm for EscalationForm {
    const KIND: SubmissionKind = SubmissionKind::Lead;

    fn validate(&self) -> Result<Payload, FormError> {
        PayloadBuilder::default()
            .source("chat")
            .text("name", &self.name, 2)
            .email("email", &self.email)
            .optional("message", self.message.as_deref())
            .optional("transcript", self.transcript.as_deref())
            .finish()
    }
}
