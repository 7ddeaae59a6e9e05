//! Conversation state machine: maps (state, message) to an action.
//!
//! `decide` is pure: it never touches the store or the network. The
//! dispatcher executes the returned action and applies the update.

use super::model::{ConversationState, Step};

/// Words that open (or reopen) a conversation. Matched as substrings.
pub const GREETINGS: &[&str] = &["hi", "hello", "hey", "start", "help"];

/// Marker that makes a message URL-bearing, with or without `.com`.
const PROFILE_MARKER: &str = "instagram";

/// Exact-match command that asks for a profile URL.
const START_COMMAND: &str = "start";

/// What the dispatcher should do with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Send the welcome text.
    SendWelcome,
    /// Validate the message as a profile URL and start ingestion.
    ValidateAndIngest,
    /// Ask the user for their profile URL.
    PromptForUrl,
    /// Send the "didn't understand" text.
    SendFallback,
}

impl Action {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SendWelcome => "send_welcome",
            Self::ValidateAndIngest => "validate_and_ingest",
            Self::PromptForUrl => "prompt_for_url",
            Self::SendFallback => "send_fallback",
        }
    }
}

/// Fields to overwrite on the user's state once the action succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateUpdate {
    pub step: Step,
    pub waiting_for_url: bool,
}

impl StateUpdate {
    pub fn apply(&self, state: &mut ConversationState) {
        state.step = self.step;
        state.waiting_for_url = self.waiting_for_url;
    }
}

/// Result of classifying one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub update: Option<StateUpdate>,
}

/// Trim and case-fold a message body for classification.
pub fn normalize(body: &str) -> String {
    body.trim().to_lowercase()
}

pub fn is_greeting(normalized: &str) -> bool {
    GREETINGS.iter().any(|g| normalized.contains(g))
}

pub fn is_profile_url(normalized: &str) -> bool {
    normalized.contains(PROFILE_MARKER)
}

/// Classify a normalized message. Rule order is significant.
///
/// `"start"` is itself a greeting, so the exact-match rule never sees it;
/// it stays for future exact commands.
pub fn decide(state: &ConversationState, normalized: &str) -> Decision {
    if is_greeting(normalized) {
        return Decision {
            action: Action::SendWelcome,
            update: Some(StateUpdate {
                step: Step::Welcomed,
                waiting_for_url: true,
            }),
        };
    }

    // URL-bearing messages are accepted even when unprompted. Anything else
    // sent while waiting is an attempted URL and will usually fail validation.
    if is_profile_url(normalized) || state.waiting_for_url {
        return Decision {
            action: Action::ValidateAndIngest,
            update: None,
        };
    }

    if normalized == START_COMMAND {
        return Decision {
            action: Action::PromptForUrl,
            update: Some(StateUpdate {
                step: Step::WaitingForUrl,
                waiting_for_url: true,
            }),
        };
    }

    Decision {
        action: Action::SendFallback,
        update: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting() -> ConversationState {
        ConversationState {
            step: Step::Welcomed,
            waiting_for_url: true,
            ..Default::default()
        }
    }

    #[test]
    fn greetings_are_case_insensitive_substrings() {
        for raw in ["Hey there!", "HELLO", "hi", "  Help me  ", "oh hi"] {
            let decision = decide(&ConversationState::default(), &normalize(raw));
            assert_eq!(decision.action, Action::SendWelcome, "{raw}");
            assert_eq!(
                decision.update,
                Some(StateUpdate {
                    step: Step::Welcomed,
                    waiting_for_url: true
                })
            );
        }
    }

    #[test]
    fn greeting_wins_over_url() {
        // "this" contains "hi"
        let d = decide(&ConversationState::default(), "this is instagram.com/shop");
        assert_eq!(d.action, Action::SendWelcome);
    }

    #[test]
    fn url_accepted_without_prompt() {
        let d = decide(&ConversationState::default(), "instagram.com/shop_x");
        assert_eq!(d.action, Action::ValidateAndIngest);
        assert!(d.update.is_none());

        let d = decide(&ConversationState::default(), "my instagram: shop_x");
        assert_eq!(d.action, Action::ValidateAndIngest);
    }

    #[test]
    fn any_reply_while_waiting_is_a_url_attempt() {
        let d = decide(&waiting(), "not-a-url");
        assert_eq!(d.action, Action::ValidateAndIngest);
        assert!(d.update.is_none());
    }

    #[test]
    fn start_is_caught_by_greeting_rule() {
        let d = decide(&ConversationState::default(), "start");
        assert_eq!(d.action, Action::SendWelcome);
    }

    #[test]
    fn unknown_message_falls_back_without_update() {
        let d = decide(&ConversationState::default(), "what is the price");
        assert_eq!(d.action, Action::SendFallback);
        assert!(d.update.is_none());

        let completed = ConversationState {
            step: Step::Completed,
            active_catalog_id: Some("c1".into()),
            ..Default::default()
        };
        assert_eq!(decide(&completed, "ok").action, Action::SendFallback);
    }

    #[test]
    fn decide_is_deterministic() {
        let states = [ConversationState::default(), waiting()];
        let messages = ["", "hi", "instagram.com/a", "random", "start", "???"];
        for state in &states {
            for msg in messages {
                assert_eq!(decide(state, msg), decide(state, msg));
            }
        }
    }

    #[test]
    fn empty_message_is_total() {
        assert_eq!(
            decide(&ConversationState::default(), "").action,
            Action::SendFallback
        );
        assert_eq!(decide(&waiting(), "").action, Action::ValidateAndIngest);
    }

    #[test]
    fn update_apply_overwrites_step_and_flag() {
        let mut state = ConversationState {
            pending_url: Some("u".into()),
            ..Default::default()
        };
        StateUpdate {
            step: Step::WaitingForUrl,
            waiting_for_url: true,
        }
        .apply(&mut state);
        assert_eq!(state.step, Step::WaitingForUrl);
        assert!(state.waiting_for_url);
        assert_eq!(state.pending_url.as_deref(), Some("u"));
    }
}
