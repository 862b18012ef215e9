//! services/journal/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the UI client and the server
//! for the end-of-day check-in conversation.

use for_me_core::DateKey;
use serde::{Deserialize, Serialize};

//=========================================================================================
// Messages Sent FROM the Client TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts a conversation for `date`. Must be the first message, and the
    /// date must be today.
    Open { date: DateKey },

    /// A message typed by the user.
    UserTurn { text: String },

    /// Asks for more turns by watching the rewarded ad. Only valid at the limit.
    WatchRewardAd,

    /// Ends the conversation by summarizing it.
    Summarize,

    /// Closes the connection without summarizing.
    Close,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the session. `greeting` is the opening assistant turn, if any.
    SessionOpened {
        date: DateKey,
        greeting: Option<String>,
        turn_limit: usize,
        interstitial_shown: bool,
    },

    AssistantTurn { text: String, turns_remaining: usize },

    /// The completion failed; `text` is the notice to show in the transcript.
    ErrorTurn { text: String, turns_remaining: usize },

    /// Every permitted turn is used. The client offers the rewarded ad while
    /// `can_earn_more_turns` holds, and summarizing in any case.
    LimitReached { turn_limit: usize, can_earn_more_turns: bool },

    ExtensionGranted {
        granted: usize,
        via_reward_ad: bool,
        turn_limit: usize,
        reward_views: usize,
    },

    /// The summary is stored; the session is over.
    SummaryReady { date: DateKey, summary: String },

    /// The summary could not be created. The session stays usable; the client
    /// shows `message` for `display_secs`.
    SummaryFailed { message: String, display_secs: u64 },

    /// Reports a rejected request to the client.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let open: ClientMessage = serde_json::from_str(r#"{"type":"open","date":"2025-03-16"}"#).unwrap();
        assert_eq!(open, ClientMessage::Open { date: "2025-03-16".parse().unwrap() });

        let watch: ClientMessage = serde_json::from_str(r#"{"type":"watch_reward_ad"}"#).unwrap();
        assert_eq!(watch, ClientMessage::WatchRewardAd);
    }

    #[test]
    fn malformed_date_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"open","date":"2025-3-16"}"#).is_err());
    }

    #[test]
    fn server_messages_are_tagged() {
        let json = serde_json::to_value(ServerMessage::LimitReached { turn_limit: 3, can_earn_more_turns: true }).unwrap();
        assert_eq!(json["type"], "limit_reached");
        assert_eq!(json["turn_limit"], 3);
    }
}
