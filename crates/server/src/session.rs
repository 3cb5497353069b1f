//! Session table.
//!
//! A session outlives the connection that opened it. It remembers the
//! outcome of every method it ran (bounded), so a call re-sent after a
//! reconnect is answered from the table and never runs twice.

use hashbrown::HashMap;
use std::collections::VecDeque;
use strand_core::{CorrelationId, SessionId};
use strand_protocol::Outcome;

#[derive(Debug, Default)]
struct Session {
    attached: bool,
    outcomes: HashMap<CorrelationId, Outcome>,
    order: VecDeque<CorrelationId>,
}

/// Live and recently detached sessions.
#[derive(Debug)]
pub struct SessionTable {
    sessions: HashMap<SessionId, Session>,
    detached: VecDeque<SessionId>,
    retention: usize,
    retained_sessions: usize,
}

impl SessionTable {
    pub fn new(retention: usize, retained_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            detached: VecDeque::new(),
            retention,
            retained_sessions,
        }
    }

    /// Attaches a connection. A known, detached session is resumed; anything
    /// else starts a new session.
    pub fn attach(&mut self, requested: Option<SessionId>) -> (SessionId, bool) {
        if let Some(id) = requested {
            if let Some(session) = self.sessions.get_mut(&id) {
                if !session.attached {
                    session.attached = true;
                    self.detached.retain(|d| d != &id);
                    return (id, true);
                }
            }
        }
        let id = SessionId::generate();
        self.sessions.insert(
            id.clone(),
            Session {
                attached: true,
                ..Session::default()
            },
        );
        (id, false)
    }

    /// Detaches a session, evicting the oldest detached ones over the limit.
    pub fn detach(&mut self, id: &SessionId) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        session.attached = false;
        self.detached.push_back(id.clone());
        while self.detached.len() > self.retained_sessions {
            if let Some(oldest) = self.detached.pop_front() {
                self.sessions.remove(&oldest);
                tracing::debug!(session = %oldest, "expired detached session");
            }
        }
    }

    /// The recorded outcome of a call this session already ran.
    pub fn completed(&self, id: &SessionId, correlation: CorrelationId) -> Option<&Outcome> {
        self.sessions.get(id)?.outcomes.get(&correlation)
    }

    /// Remembers a call's outcome, forgetting the oldest over the limit.
    pub fn record(&mut self, id: &SessionId, correlation: CorrelationId, outcome: Outcome) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        if session.outcomes.insert(correlation, outcome).is_none() {
            session.order.push_back(correlation);
        }
        while session.order.len() > self.retention {
            if let Some(oldest) = session.order.pop_front() {
                session.outcomes.remove(&oldest);
            }
        }
    }

    /// Number of sessions, attached or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
