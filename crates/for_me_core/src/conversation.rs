//! crates/for_me_core/src/conversation.rs
//!
//! A turn-limited check-in conversation with the completion service.
//!
//! The session keeps two views of the exchange: the full transcript shown to
//! the user, and a rolling history window that is what actually gets sent.
//! User input is accepted while `turns_used < turn_limit`; the limit grows
//! through rewarded-ad extensions.

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::ads::{AdGate, RewardOutcome};
use crate::domain::{ChatMessage, ConversationTurn, DateKey, Speaker};
use crate::ports::{CompletionService, PortError};
use crate::summary_cache::SummaryCache;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI having an everyday conversation with the user.
Rules:
1. Understand what the user said before and respond to it accurately.
2. Only talk about the topic the user brought up.
3. Answer briefly, in an empathetic tone.
4. After answering, ask exactly one related question.
5. Finish your sentences within the 100 token budget you are given.";

pub const DEFAULT_GREETING: &str = "How was your day?";

const SUMMARY_SYSTEM_PROMPT: &str =
    "You summarize conversations concisely. Keep only the essentials, in 50 characters or fewer.";
const SUMMARY_REQUEST: &str = "Summarize the following conversation in 50 characters or fewer:";
const FAILED_REPLY_NOTICE: &str = "Sorry, something went wrong. Please try again.";
const SUMMARY_FAILED_NOTICE: &str = "Could not create a summary. Please try again.";

//=========================================================================================
// Configuration
//=========================================================================================

/// Whether a user turn whose completion request failed still uses up a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailedTurnPolicy {
    /// The turn is consumed: the user message already entered the transcript.
    #[default]
    Charge,
    /// The turn is handed back so the user can retry for free.
    Refund,
}

impl FromStr for FailedTurnPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "charge" => Ok(Self::Charge),
            "refund" => Ok(Self::Refund),
            other => Err(format!("'{}' is not one of: charge, refund", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub base_turn_limit: usize,
    /// Turns granted per successful rewarded-ad view.
    pub reward_extension: usize,
    /// Turns granted when the rewarded ad is unavailable or fails.
    pub fallback_extension: usize,
    pub max_reward_views: usize,
    /// Number of most recent turns kept in the outbound history.
    pub history_window: usize,
    pub failed_turn_policy: FailedTurnPolicy,
    /// How long a failed-summary notice stays visible.
    pub summary_error_display: Duration,
    pub system_prompt: String,
    pub greeting: Option<String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            base_turn_limit: 3,
            reward_extension: 3,
            fallback_extension: 1,
            max_reward_views: 3,
            history_window: 6,
            failed_turn_policy: FailedTurnPolicy::Charge,
            summary_error_display: Duration::from_secs(3),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            greeting: Some(DEFAULT_GREETING.to_string()),
        }
    }
}

//=========================================================================================
// State, outcomes and errors
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No user turn yet.
    Idle,
    Active,
    /// Every permitted turn is used; waiting for an extension or a summary.
    LimitReached,
    /// Summary request in flight.
    Summarizing,
    /// Summary stored. Terminal.
    Closed,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("message is empty")]
    EmptyInput,
    #[error("all {limit} turns are used")]
    TurnLimitReached { limit: usize },
    #[error("extensions are only offered once the turn limit is reached")]
    NotAtLimit,
    #[error("the maximum of {max} rewarded views is used")]
    RewardViewsExhausted { max: usize },
    #[error("there is nothing to summarize yet")]
    NothingToSummarize,
    #[error("a request is already in flight")]
    Busy,
    #[error("the session is closed")]
    Closed,
    #[error("summary failed: {0}")]
    Summary(#[source] PortError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Replied(ConversationTurn),
    /// The completion failed; `notice` was appended to the transcript instead.
    Failed { notice: ConversationTurn, error: PortError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtensionGrant {
    pub granted: usize,
    pub via_reward_ad: bool,
    pub turn_limit: usize,
    pub reward_views: usize,
}

//=========================================================================================
// Rolling history
//=========================================================================================

struct RollingHistory {
    system: ChatMessage,
    recent: VecDeque<ChatMessage>,
    window: usize,
}

impl RollingHistory {
    fn new(system_prompt: &str, window: usize) -> Self {
        Self { system: ChatMessage::system(system_prompt), recent: VecDeque::new(), window }
    }

    /// Trims to the window, appends the user message, and returns the request
    /// body: system prompt first, then the retained turns in order.
    fn outbound_with(&mut self, user: ChatMessage) -> Vec<ChatMessage> {
        while self.recent.len() > self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(user);
        std::iter::once(self.system.clone()).chain(self.recent.iter().cloned()).collect()
    }

    fn push_reply(&mut self, reply: ChatMessage) {
        self.recent.push_back(reply);
    }
}

//=========================================================================================
// Session
//=========================================================================================

pub struct ConversationSession {
    date: DateKey,
    config: ConversationConfig,
    completion: Arc<dyn CompletionService>,
    transcript: Vec<ConversationTurn>,
    history: RollingHistory,
    turns_used: usize,
    extension: usize,
    reward_views: usize,
    state: SessionState,
    summary_error: Option<(String, Instant)>,
}

impl ConversationSession {
    pub fn new(date: DateKey, completion: Arc<dyn CompletionService>, config: ConversationConfig) -> Self {
        let history = RollingHistory::new(&config.system_prompt, config.history_window);
        let transcript = config
            .greeting
            .iter()
            .map(|greeting| ConversationTurn::assistant(greeting.clone()))
            .collect();
        Self {
            date,
            config,
            completion,
            transcript,
            history,
            turns_used: 0,
            extension: 0,
            reward_views: 0,
            state: SessionState::Idle,
            summary_error: None,
        }
    }

    pub fn date(&self) -> DateKey {
        self.date
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &[ConversationTurn] {
        &self.transcript
    }

    pub fn turn_limit(&self) -> usize {
        self.config.base_turn_limit + self.extension
    }

    pub fn turns_used(&self) -> usize {
        self.turns_used
    }

    pub fn turns_remaining(&self) -> usize {
        self.turn_limit().saturating_sub(self.turns_used)
    }

    pub fn extension(&self) -> usize {
        self.extension
    }

    pub fn reward_views(&self) -> usize {
        self.reward_views
    }

    pub fn can_earn_more_turns(&self) -> bool {
        self.state == SessionState::LimitReached && self.reward_views < self.config.max_reward_views
    }

    /// The failed-summary notice, while it is still within its display window.
    pub fn summary_error(&self) -> Option<&str> {
        self.summary_error
            .as_ref()
            .filter(|(_, until)| Instant::now() < *until)
            .map(|(text, _)| text.as_str())
    }

    /// Appends the user's turn, sends the rolling history, and appends the
    /// reply (or a visible error notice when the request fails).
    pub async fn submit_user_turn(&mut self, text: &str) -> Result<TurnOutcome, SessionError> {
        self.ensure_open()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyInput);
        }
        if self.turns_used >= self.turn_limit() {
            self.state = SessionState::LimitReached;
            return Err(SessionError::TurnLimitReached { limit: self.turn_limit() });
        }

        self.transcript.push(ConversationTurn::user(text));
        self.turns_used += 1;
        self.state = SessionState::Active;

        let outbound = self.history.outbound_with(ChatMessage::user(text));
        let outcome = match self.completion.complete(&outbound).await {
            Ok(reply) => {
                self.history.push_reply(ChatMessage::assistant(reply.clone()));
                let turn = ConversationTurn::assistant(reply);
                self.transcript.push(turn.clone());
                TurnOutcome::Replied(turn)
            }
            Err(error) => {
                warn!("Completion request for {} failed: {}", self.date, error);
                if self.config.failed_turn_policy == FailedTurnPolicy::Refund {
                    self.turns_used -= 1;
                }
                let notice = ConversationTurn::error(FAILED_REPLY_NOTICE);
                self.transcript.push(notice.clone());
                TurnOutcome::Failed { notice, error }
            }
        };

        if self.turns_used >= self.turn_limit() {
            info!("Conversation for {} reached its {} turn limit", self.date, self.turn_limit());
            self.state = SessionState::LimitReached;
        }
        Ok(outcome)
    }

    /// Shows the rewarded ad and grants the matching extension.
    pub async fn watch_reward_ad(&mut self, ads: &Arc<AdGate>) -> Result<ExtensionGrant, SessionError> {
        self.ensure_extension_allowed()?;
        let outcome = ads.show_rewarded().await;
        self.grant_extension(outcome)
    }

    /// Applies the result of a rewarded-ad attempt. A successful view grants
    /// `reward_extension` turns and counts towards `max_reward_views`; any
    /// other outcome grants the smaller fallback without counting.
    pub fn grant_extension(&mut self, outcome: RewardOutcome) -> Result<ExtensionGrant, SessionError> {
        self.ensure_extension_allowed()?;
        let (granted, via_reward_ad) = match outcome {
            RewardOutcome::Earned => {
                self.reward_views += 1;
                (self.config.reward_extension, true)
            }
            RewardOutcome::NotShown | RewardOutcome::Failed => (self.config.fallback_extension, false),
        };
        self.extension += granted;
        self.state = SessionState::Active;
        info!(
            "Granted {} extra turns for {} (reward ad: {}); limit is now {}",
            granted,
            self.date,
            via_reward_ad,
            self.turn_limit()
        );
        Ok(ExtensionGrant {
            granted,
            via_reward_ad,
            turn_limit: self.turn_limit(),
            reward_views: self.reward_views,
        })
    }

    /// Summarizes the full transcript in an isolated request and stores the
    /// result in the cache under the session's date. On success the session
    /// closes; on failure it returns to the state it was in.
    pub async fn summarize(&mut self, cache: &SummaryCache) -> Result<String, SessionError> {
        self.ensure_open()?;
        if self.state == SessionState::Idle {
            return Err(SessionError::NothingToSummarize);
        }

        let resume_state = self.state;
        self.state = SessionState::Summarizing;
        self.summary_error = None;

        let request = [
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(format!("{}\n{}", SUMMARY_REQUEST, self.transcript_text())),
        ];
        let result = match self.completion.complete(&request).await {
            Ok(summary) => {
                let summary = summary.trim().to_string();
                cache.save_summary(&summary, self.date).map(|_| summary)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(summary) => {
                info!("Stored conversation summary for {}", self.date);
                self.state = SessionState::Closed;
                Ok(summary)
            }
            Err(e) => {
                warn!("Summary for {} failed: {}", self.date, e);
                self.state = resume_state;
                self.summary_error = Some((
                    SUMMARY_FAILED_NOTICE.to_string(),
                    Instant::now() + self.config.summary_error_display,
                ));
                Err(SessionError::Summary(e))
            }
        }
    }

    fn transcript_text(&self) -> String {
        self.transcript
            .iter()
            .filter_map(|turn| match turn.speaker {
                Speaker::User => Some(format!("User: {}", turn.text)),
                Speaker::Assistant => Some(format!("AI: {}", turn.text)),
                Speaker::Error => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Closed => Err(SessionError::Closed),
            SessionState::Summarizing => Err(SessionError::Busy),
            _ => Ok(()),
        }
    }

    fn ensure_extension_allowed(&self) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.state != SessionState::LimitReached {
            return Err(SessionError::NotAtLimit);
        }
        if self.reward_views >= self.config.max_reward_views {
            return Err(SessionError::RewardViewsExhausted { max: self.config.max_reward_views });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ads::{AdUnits, RetryPolicy};
    use crate::domain::{AdSurface, ChatRole};
    use crate::fakes::{MemorySettings, ScriptedAds, ScriptedCompletion, SwitchHost};

    fn today() -> DateKey {
        DateKey::from_ymd(2025, 3, 16).unwrap()
    }

    fn session_with(completion: Arc<ScriptedCompletion>, config: ConversationConfig) -> ConversationSession {
        ConversationSession::new(today(), completion, config)
    }

    fn session() -> (ConversationSession, Arc<ScriptedCompletion>) {
        let completion = Arc::new(ScriptedCompletion::default());
        (session_with(completion.clone(), ConversationConfig::default()), completion)
    }

    fn ad_gate() -> Arc<AdGate> {
        let units = AdUnits { banner: "b".into(), interstitial: "i".into(), rewarded: "r".into() };
        AdGate::new(
            Arc::new(ScriptedAds::default()),
            Arc::new(SwitchHost::default()),
            units,
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn fresh_session_accepts_exactly_the_base_limit() {
        let (mut session, _) = session();
        assert_eq!(session.state(), SessionState::Idle);

        for n in 1..=3 {
            session.submit_user_turn(&format!("T{}", n)).await.unwrap();
        }
        assert_eq!(session.state(), SessionState::LimitReached);
        assert_eq!(
            session.submit_user_turn("T4").await.unwrap_err(),
            SessionError::TurnLimitReached { limit: 3 }
        );
        assert_eq!(session.turns_used(), 3);
    }

    #[tokio::test]
    async fn reward_ad_unlocks_three_more_turns() {
        let (mut session, _) = session();
        let ads = ad_gate();
        ads.load(AdSurface::Rewarded).await.unwrap();

        for text in ["T1", "T2", "T3"] {
            session.submit_user_turn(text).await.unwrap();
        }
        assert!(session.submit_user_turn("again").await.is_err());
        assert!(session.can_earn_more_turns());

        let grant = session.watch_reward_ad(&ads).await.unwrap();
        assert_eq!(
            grant,
            ExtensionGrant { granted: 3, via_reward_ad: true, turn_limit: 6, reward_views: 1 }
        );
        assert_eq!(session.extension(), 3);
        assert_eq!(session.state(), SessionState::Active);

        let outcome = session.submit_user_turn("T4").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Replied(_)));
        assert_eq!(session.turns_remaining(), 2);
    }

    #[tokio::test]
    async fn unavailable_ad_grants_one_turn_without_counting_a_view() {
        let (mut session, _) = session();
        let ads = ad_gate();
        for text in ["a", "b", "c"] {
            session.submit_user_turn(text).await.unwrap();
        }

        let grant = session.watch_reward_ad(&ads).await.unwrap();
        assert_eq!(grant.granted, 1);
        assert!(!grant.via_reward_ad);
        assert_eq!(session.reward_views(), 0);
        assert_eq!(session.turn_limit(), 4);
    }

    #[tokio::test]
    async fn reward_views_never_exceed_the_cap() {
        let completion = Arc::new(ScriptedCompletion::default());
        let config = ConversationConfig { max_reward_views: 2, ..ConversationConfig::default() };
        let mut session = session_with(completion, config);

        let mut turn = 0;
        for _ in 0..2 {
            while session.state() != SessionState::LimitReached {
                turn += 1;
                session.submit_user_turn(&format!("t{}", turn)).await.unwrap();
            }
            session.grant_extension(RewardOutcome::Earned).unwrap();
        }
        while session.state() != SessionState::LimitReached {
            turn += 1;
            session.submit_user_turn(&format!("t{}", turn)).await.unwrap();
        }

        assert_eq!(session.reward_views(), 2);
        assert!(!session.can_earn_more_turns());
        assert_eq!(
            session.grant_extension(RewardOutcome::Earned).unwrap_err(),
            SessionError::RewardViewsExhausted { max: 2 }
        );
        assert_eq!(session.reward_views(), 2);
    }

    #[tokio::test]
    async fn extension_is_refused_before_the_limit() {
        let (mut session, _) = session();
        session.submit_user_turn("hi").await.unwrap();
        assert_eq!(session.grant_extension(RewardOutcome::Earned).unwrap_err(), SessionError::NotAtLimit);
    }

    #[tokio::test]
    async fn empty_input_is_rejected_without_charging() {
        let (mut session, completion) = session();
        assert_eq!(session.submit_user_turn("   ").await.unwrap_err(), SessionError::EmptyInput);
        assert_eq!(session.turns_used(), 0);
        assert!(completion.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn outbound_history_keeps_system_prompt_and_recent_turns() {
        let completion = Arc::new(ScriptedCompletion::default());
        let config = ConversationConfig { base_turn_limit: 10, ..ConversationConfig::default() };
        let mut session = session_with(completion.clone(), config);

        for n in 1..=5 {
            session.submit_user_turn(&format!("U{}", n)).await.unwrap();
        }

        let last = completion.last_request();
        assert_eq!(last.len(), 1 + 6 + 1);
        assert_eq!(last[0].role, ChatRole::System);
        assert_eq!(last[1], ChatMessage::user("U2"));
        assert_eq!(last[7], ChatMessage::user("U5"));

        // Greeting plus five exchanges stay visible.
        assert_eq!(session.transcript().len(), 1 + 10);
    }

    #[tokio::test]
    async fn failed_reply_is_charged_by_default() {
        let completion = Arc::new(ScriptedCompletion::with_replies(vec![Err(PortError::Unavailable(
            "offline".into(),
        ))]));
        let mut session = session_with(completion, ConversationConfig::default());

        let outcome = session.submit_user_turn("hello").await.unwrap();
        match outcome {
            TurnOutcome::Failed { notice, error } => {
                assert_eq!(notice.speaker, Speaker::Error);
                assert_eq!(error, PortError::Unavailable("offline".into()));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(session.turns_used(), 1);
        assert_eq!(session.transcript().last().unwrap().speaker, Speaker::Error);
    }

    #[tokio::test]
    async fn failed_reply_is_returned_under_refund_policy() {
        let completion = Arc::new(ScriptedCompletion::with_replies(vec![Err(PortError::Unavailable(
            "offline".into(),
        ))]));
        let config = ConversationConfig { failed_turn_policy: FailedTurnPolicy::Refund, ..ConversationConfig::default() };
        let mut session = session_with(completion, config);

        session.submit_user_turn("hello").await.unwrap();
        assert_eq!(session.turns_used(), 0);
        assert_eq!(session.turns_remaining(), 3);
    }

    #[tokio::test]
    async fn summarizing_one_turn_stores_summary_and_closes() {
        let completion = Arc::new(ScriptedCompletion::with_replies(vec![
            Ok("Sounds lovely!".into()),
            Ok("  Calm walk in the park  ".into()),
        ]));
        let mut session = session_with(completion.clone(), ConversationConfig::default());
        let cache = SummaryCache::load(Arc::new(MemorySettings::default()));

        session.submit_user_turn("I walked in the park").await.unwrap();
        let summary = session.summarize(&cache).await.unwrap();

        assert_eq!(summary, "Calm walk in the park");
        assert_eq!(cache.get_summary(today()).as_deref(), Some("Calm walk in the park"));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.submit_user_turn("more").await.unwrap_err(), SessionError::Closed);

        let request = completion.last_request();
        assert_eq!(request.len(), 2);
        assert!(request[0].content.contains("50 characters"));
        assert!(request[1].content.contains("User: I walked in the park"));
        assert!(request[1].content.contains("AI: Sounds lovely!"));
        assert!(!request[1].content.contains(DEFAULT_SYSTEM_PROMPT));
    }

    #[tokio::test]
    async fn summary_does_not_disturb_rolling_history() {
        let completion = Arc::new(ScriptedCompletion::with_replies(vec![
            Ok("r1".into()),
            Err(PortError::Unavailable("offline".into())),
            Ok("r2".into()),
        ]));
        let mut session = session_with(completion.clone(), ConversationConfig::default());
        let cache = SummaryCache::load(Arc::new(MemorySettings::default()));

        session.submit_user_turn("first").await.unwrap();
        assert!(session.summarize(&cache).await.is_err());
        session.submit_user_turn("second").await.unwrap();

        let last = completion.last_request();
        assert_eq!(
            last,
            vec![
                ChatMessage::system(DEFAULT_SYSTEM_PROMPT),
                ChatMessage::user("first"),
                ChatMessage::assistant("r1"),
                ChatMessage::user("second"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_summary_shows_transient_notice_and_keeps_session_usable() {
        let completion = Arc::new(ScriptedCompletion::default());
        let mut session = session_with(completion.clone(), ConversationConfig::default());
        let cache = SummaryCache::load(Arc::new(MemorySettings::default()));
        for text in ["a", "b", "c"] {
            session.submit_user_turn(text).await.unwrap();
        }

        completion.push(Err(PortError::Rejected("status 500: boom".into())));
        let err = session.summarize(&cache).await.unwrap_err();
        assert!(matches!(err, SessionError::Summary(_)));
        assert_eq!(session.state(), SessionState::LimitReached);
        assert!(session.summary_error().is_some());
        assert!(cache.is_empty());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(session.summary_error().is_none());

        completion.push(Ok("retry worked".into()));
        assert_eq!(session.summarize(&cache).await.unwrap(), "retry worked");
    }

    #[tokio::test]
    async fn idle_session_has_nothing_to_summarize() {
        let (mut session, _) = session();
        let cache = SummaryCache::load(Arc::new(MemorySettings::default()));
        assert_eq!(session.summarize(&cache).await.unwrap_err(), SessionError::NothingToSummarize);
    }

    #[test]
    fn failed_turn_policy_parses() {
        assert_eq!("Refund".parse::<FailedTurnPolicy>().unwrap(), FailedTurnPolicy::Refund);
        assert!("free".parse::<FailedTurnPolicy>().is_err());
    }
}
