/// Authentication progress of one bot server socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Waiting for the IP ban lookup. Nothing is read yet.
    CheckingIp,
    Unauthenticated,
    AwaitingDbLookup { account_name: String },
    Authenticated { account_id: u32 },
    /// An auth response other than `Ok` was sent, the socket closes once it is flushed.
    Rejected,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated { .. })
    }

    /// Reads stay paused while the IP check runs and after a rejection.
    pub fn accepts_reads(&self) -> bool {
        !matches!(self, AuthState::CheckingIp | AuthState::Rejected)
    }
}
