use std::collections::HashMap;
use std::time::Duration;

use herald_shared::prelude::*;

use crate::prelude::*;
use crate::session::{Session, SessionContext};

/// Authenticated sessions keyed by account id. At most one per account.
///
/// Removal is lazy: kicking only closes the transport, the entry goes away on the next
/// `update_sessions` sweep.
#[derive(Default)]
pub struct SessionManager {
    sessions: HashMap<u32, Session>,
    max_active_session_count: usize,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly authenticated session and confirms it to the peer. An existing session
    /// for the same account is kicked and replaced.
    pub fn add_session(&mut self, session: Session) {
        let account_id = session.account_id();
        if let Some(mut old) = self.sessions.remove(&account_id) {
            old.kick_session("replaced by a new login of the same account", false);
        }

        session.send_auth_response(AuthResponseCode::Ok);
        info!("Account {} ({}) logged in from {}", account_id, session.account_name(), session.remote_address());
        self.sessions.insert(account_id, session);

        self.max_active_session_count = self.max_active_session_count.max(self.sessions.len());
    }

    /// Closes the session's transport. It stays findable until the next sweep.
    pub fn kick_session(&mut self, account_id: u32) -> bool {
        match self.sessions.get_mut(&account_id) {
            Some(session) => {
                session.kick_session("kicked", false);
                true
            }
            None => false,
        }
    }

    pub fn find_session(&self, account_id: u32) -> Option<&Session> {
        self.sessions.get(&account_id)
    }

    pub fn find_session_mut(&mut self, account_id: u32) -> Option<&mut Session> {
        self.sessions.get_mut(&account_id)
    }

    pub fn update_sessions(&mut self, diff: Duration, context: &SessionContext) {
        let before = self.sessions.len();
        self.sessions.retain(|account_id, session| {
            if session.handle_socket_closed() {
                debug!("Session of account {} closed its socket", account_id);
                return false;
            }
            if !session.update(diff, context) {
                debug!("Session of account {} finished", account_id);
                return false;
            }
            true
        });

        let removed = before - self.sessions.len();
        if removed > 0 {
            info!("Cleaned up {} sessions, {} sessions left online", removed, self.sessions.len());
        }
    }

    pub fn kick_all(&mut self) {
        for session in self.sessions.values_mut() {
            session.kick_session("server shutting down", true);
        }
        self.sessions.clear();
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn max_active_session_count(&self) -> usize {
        self.max_active_session_count
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }
}
