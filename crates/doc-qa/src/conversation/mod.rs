//! Multi-turn conversation state
//!
//! A [`ConversationState`] is an append-only log of turns behind an async mutex.
//! The query engine holds the lock for the whole render, generate, append cycle
//! so concurrent questions on one conversation are answered strictly in turn.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

/// Who spoke a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Prefix used when rendering history
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One utterance in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    /// Zero-based, strictly increasing within a conversation
    pub turn_index: u64,
    pub created_at: DateTime<Utc>,
}

/// Turns kept per conversation; older ones are dropped, indices keep counting
pub const MAX_RETAINED_TURNS: usize = 256;

/// The turn log itself; only reachable through a [`ConversationState`] lock
#[derive(Debug, Default)]
pub struct ConversationLog {
    turns: VecDeque<ConversationTurn>,
    next_index: u64,
}

impl ConversationLog {
    /// Append a turn with the next turn index
    pub fn append(&mut self, role: Role, text: impl Into<String>) -> u64 {
        let turn_index = self.next_index;
        if self.turns.len() == MAX_RETAINED_TURNS {
            self.turns.pop_front();
        }
        self.turns.push_back(ConversationTurn {
            role,
            text: text.into(),
            turn_index,
            created_at: Utc::now(),
        });
        self.next_index += 1;
        turn_index
    }

    /// The most recent `max_turns` turns as `User:`/`Assistant:` lines, oldest first
    pub fn render_history(&self, max_turns: usize) -> String {
        let skip = self.turns.len().saturating_sub(max_turns);
        self.turns
            .iter()
            .skip(skip)
            .map(|turn| format!("{}: {}", turn.role, turn.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Drop every turn; indices restart at zero
    pub fn clear(&mut self) {
        self.turns.clear();
        self.next_index = 0;
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Ordered history of user and assistant turns for one conversation
#[derive(Debug, Default)]
pub struct ConversationState {
    log: Mutex<ConversationLog>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access for a multi-step read-modify-append sequence
    pub async fn lock(&self) -> MutexGuard<'_, ConversationLog> {
        self.log.lock().await
    }

    /// Append a turn with the next turn index
    pub async fn append(&self, role: Role, text: impl Into<String>) -> u64 {
        self.log.lock().await.append(role, text)
    }

    /// See [`ConversationLog::render_history`]
    pub async fn render_history(&self, max_turns: usize) -> String {
        self.log.lock().await.render_history(max_turns)
    }

    /// Reset to an empty conversation
    pub async fn clear(&self) {
        self.log.lock().await.clear();
    }

    /// Snapshot of every turn
    pub async fn turns(&self) -> Vec<ConversationTurn> {
        self.log.lock().await.turns().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.log.lock().await.len()
    }
}

/// Session id that always addresses the default conversation
pub const DEFAULT_SESSION_ID: &str = "default";

/// Default cap on named sessions
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Default idle time after which a named session is forgotten
pub const DEFAULT_SESSION_IDLE_SECS: i64 = 3600;

#[derive(Debug)]
struct Session {
    state: Arc<ConversationState>,
    last_used: DateTime<Utc>,
}

/// Conversations keyed by session id
///
/// Requests without a session id share the default conversation. Named
/// sessions idle for longer than `idle_timeout` are dropped, and once
/// `max_sessions` are live the least recently used one makes room for a new id.
#[derive(Debug)]
pub struct SessionRegistry {
    default: Arc<ConversationState>,
    sessions: DashMap<String, Session>,
    max_sessions: usize,
    idle_timeout: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_default(Arc::new(ConversationState::new()))
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose default conversation is `default`
    pub fn with_default(default: Arc<ConversationState>) -> Self {
        Self {
            default,
            sessions: DashMap::new(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle_timeout: Duration::seconds(DEFAULT_SESSION_IDLE_SECS),
        }
    }

    /// Override the session cap (at least 1) and idle timeout
    pub fn with_limits(mut self, max_sessions: usize, idle_timeout: Duration) -> Self {
        self.max_sessions = max_sessions.max(1);
        self.idle_timeout = idle_timeout;
        self
    }

    /// The conversation for `session_id`, created on first use
    pub fn get_or_create(&self, session_id: Option<&str>) -> Arc<ConversationState> {
        let Some(id) = session_id
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != DEFAULT_SESSION_ID)
        else {
            return Arc::clone(&self.default);
        };

        let now = Utc::now();
        if let Some(mut session) = self.sessions.get_mut(id) {
            session.last_used = now;
            return Arc::clone(&session.state);
        }

        self.evict_idle(now);
        self.make_room();

        let session = self.sessions.entry(id.to_string()).or_insert_with(|| Session {
            state: Arc::new(ConversationState::new()),
            last_used: now,
        });
        Arc::clone(&session.state)
    }

    /// Named session, if it exists
    pub fn get(&self, session_id: &str) -> Option<Arc<ConversationState>> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(&entry.state))
    }

    /// Forget a named session, returning it if it existed
    pub fn remove(&self, session_id: &str) -> Option<Arc<ConversationState>> {
        self.sessions.remove(session_id).map(|(_, session)| session.state)
    }

    /// Drop sessions unused for longer than the idle timeout as of `now`
    ///
    /// Returns how many were dropped.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| now - session.last_used <= self.idle_timeout);
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            tracing::debug!("Evicted {} idle sessions", evicted);
        }
        evicted
    }

    /// Evict least recently used sessions until a new one fits under the cap
    fn make_room(&self) {
        while self.sessions.len() >= self.max_sessions {
            let oldest = self
                .sessions
                .iter()
                .min_by_key(|entry| entry.last_used)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(id) => {
                    self.sessions.remove(&id);
                    tracing::debug!("Session limit reached, evicted {}", id);
                }
                None => break,
            }
        }
    }

    /// Number of named sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
