//! Northbeam — core library.
//! Submission capture (Local Store + form producers), the Admin Viewer and the chat widget.

pub mod admin;
pub mod chat;
pub mod config;
pub mod forms;
pub mod local_store;
pub mod submission;

pub use admin::{apply_filter, export_filename, summarize, AdminGate, AdminViewer, KindFilter, SubmissionSummary};
pub use chat::{
    render_reply_html, ChatError, ChatRole, ChatTurn, ChatWidget, CompletionClient, Conversation,
    Locale, OpenRouterClient, Reply,
};
pub use config::SiteConfig;
pub use forms::{
    CareersForm, ContactForm, EscalationForm, FieldError, FormError, NewsletterForm, SubmissionForm,
};
pub use local_store::{MemoryBackend, SledBackend, StorageBackend, StoreError, SubmissionStore};
pub use submission::{Payload, SubmissionKind, SubmissionRecord, SubmissionStatus};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
