//! Per-user conversation tracking.
//!
//! A `User` carries its `ConversationState`. Each inbound text message is
//! classified by `state::decide`, and `users::resolve_user` finds or creates
//! the user record for a phone number.

pub mod model;
pub mod state;
pub mod users;

pub use model::{ConversationState, Step, User};
pub use state::{Action, Decision, StateUpdate, decide, normalize};
pub use users::resolve_user;
