//! WhatsApp webhook: envelope parsing, dispatch, and the HTTP routes.

pub mod dispatcher;
pub mod payload;
pub mod routes;

pub use dispatcher::{Dispatcher, TextMessage, collect_text_messages};
pub use payload::WebhookEnvelope;
pub use routes::{AppState, router};
