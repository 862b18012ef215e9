//! services/journal/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a chat WebSocket connection.
//! Client messages are handled one at a time, in arrival order: the next
//! message is not read until every reply to the previous one has been sent.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use for_me_core::{
    AdSurface, ConversationSession, DateKey, SessionError, SessionState, TurnOutcome, UserId,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use tracing::{error, info, warn};

use crate::{
    error::AppError,
    web::{
        protocol::{ClientMessage, ServerMessage},
        state::{AppState, ChatState},
    },
};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    info!("New chat connection established.");
    let (mut sender, mut receiver) = socket.split();
    let mut chat = ChatState::default();

    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                info!("Client sent close message.");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!("Chat connection failed: {}", e);
                break;
            }
        };

        let replies = match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(ClientMessage::Close) => {
                info!("Client closed the conversation.");
                break;
            }
            Ok(message) => handle_client_message(&app_state, &mut chat, message).await,
            Err(e) => {
                warn!("Failed to deserialize client message: {}", e);
                vec![error_message(format!("Unrecognized message: {}", e))]
            }
        };

        for reply in &replies {
            if let Err(e) = send_message(&mut sender, reply).await {
                error!("Failed to send chat message: {}", e);
                return;
            }
        }
    }

    if let Some(session) = chat.session {
        info!("Chat for {} closed without a summary.", session.date());
    }
    info!("Chat connection closed.");
}

async fn send_message(sender: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> Result<(), AppError> {
    let json = serde_json::to_string(message).map_err(|e| AppError::Internal(e.to_string()))?;
    sender.send(Message::Text(json.into())).await?;
    Ok(())
}

/// Applies one client message to the connection's state and returns the
/// replies, in the order they must be sent.
pub async fn handle_client_message(
    app_state: &AppState,
    chat: &mut ChatState,
    message: ClientMessage,
) -> Vec<ServerMessage> {
    match message {
        ClientMessage::Open { date } => open_session(app_state, chat, date).await,
        ClientMessage::UserTurn { text } => match chat.session.as_mut() {
            Some(session) => user_turn(session, &text).await,
            None => vec![no_session()],
        },
        ClientMessage::WatchRewardAd => match chat.session.as_mut() {
            Some(session) => match session.watch_reward_ad(&app_state.ads).await {
                Ok(grant) => vec![ServerMessage::ExtensionGranted {
                    granted: grant.granted,
                    via_reward_ad: grant.via_reward_ad,
                    turn_limit: grant.turn_limit,
                    reward_views: grant.reward_views,
                }],
                Err(e) => vec![error_message(e.to_string())],
            },
            None => vec![no_session()],
        },
        ClientMessage::Summarize => summarize(app_state, chat).await,
        ClientMessage::Close => Vec::new(),
    }
}

async fn open_session(app_state: &AppState, chat: &mut ChatState, date: DateKey) -> Vec<ServerMessage> {
    if chat.session.is_some() {
        return vec![error_message("A conversation is already open.")];
    }
    if date != app_state.today() {
        return vec![error_message(format!("Conversations are only available for today, not {}.", date))];
    }
    let user_id = match app_state.identity.get_user_id() {
        Ok(user_id) => user_id,
        Err(e) => {
            error!("Failed to load the user id: {:?}", e);
            return vec![error_message("Failed to load the user identity.")];
        }
    };

    // The conversation starts whether or not the interstitial could be shown.
    let interstitial_shown = app_state.ads.show(AdSurface::Interstitial).await;
    info!("Opening chat for {} (interstitial shown: {})", date, interstitial_shown);

    let session = ConversationSession::new(date, app_state.completion.clone(), app_state.conversation.clone());
    let reply = ServerMessage::SessionOpened {
        date,
        greeting: session.transcript().first().map(|turn| turn.text.clone()),
        turn_limit: session.turn_limit(),
        interstitial_shown,
    };
    chat.user_id = Some(user_id);
    chat.session = Some(session);
    vec![reply]
}

async fn user_turn(session: &mut ConversationSession, text: &str) -> Vec<ServerMessage> {
    match session.submit_user_turn(text).await {
        Ok(outcome) => {
            let turns_remaining = session.turns_remaining();
            let mut replies = vec![match outcome {
                TurnOutcome::Replied(turn) => ServerMessage::AssistantTurn { text: turn.text, turns_remaining },
                TurnOutcome::Failed { notice, .. } => ServerMessage::ErrorTurn { text: notice.text, turns_remaining },
            }];
            if session.state() == SessionState::LimitReached {
                replies.push(limit_reached(session));
            }
            replies
        }
        Err(SessionError::TurnLimitReached { .. }) => vec![limit_reached(session)],
        Err(e) => vec![error_message(e.to_string())],
    }
}

async fn summarize(app_state: &AppState, chat: &mut ChatState) -> Vec<ServerMessage> {
    let Some(session) = chat.session.as_mut() else {
        return vec![no_session()];
    };
    match session.summarize(&app_state.summaries).await {
        Ok(summary) => {
            let date = session.date();
            if let Some(user_id) = &chat.user_id {
                persist_summary(app_state, user_id, date, &summary).await;
            }
            chat.session = None;
            vec![ServerMessage::SummaryReady { date, summary }]
        }
        Err(SessionError::Summary(e)) => vec![ServerMessage::SummaryFailed {
            message: session.summary_error().map(str::to_string).unwrap_or_else(|| e.to_string()),
            display_secs: app_state.conversation.summary_error_display.as_secs(),
        }],
        Err(e) => vec![error_message(e.to_string())],
    }
}

/// Writes the summary into the day's record, keeping its score and tasks.
/// Failures are logged; the summary is already in the local cache and goes
/// out with the next save of the day.
async fn persist_summary(app_state: &AppState, user_id: &UserId, date: DateKey, summary: &str) {
    if let Err(e) = app_state.records.attach_summary(user_id, date, summary.to_string()).await {
        warn!("Could not store the summary for {}: {}", date, e);
    }
}

fn limit_reached(session: &ConversationSession) -> ServerMessage {
    ServerMessage::LimitReached {
        turn_limit: session.turn_limit(),
        can_earn_more_turns: session.can_earn_more_turns(),
    }
}

fn no_session() -> ServerMessage {
    error_message("No conversation is open. Send an open message first.")
}

fn error_message(message: impl Into<String>) -> ServerMessage {
    ServerMessage::Error { message: message.into() }
}
