use serde::{Deserialize, Serialize};

use crate::oauth::{TokenSet, UserInfo};
use crate::types::SessionId;

/// Where a browser session stands in the login flow.
///
/// A verifier and a token set never coexist: the enum makes the
/// "flow pending" and "authenticated" phases mutually exclusive.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Anonymous,
    /// Between `/login` and `/callback`. Both values are single-use.
    FlowPending { code_verifier: String, state: String },
    Authenticated { tokens: TokenSet, user_info: UserInfo },
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::FlowPending { .. } => f
                .debug_struct("FlowPending")
                .field("code_verifier", &"[redacted]")
                .field("state", &"[redacted]")
                .finish(),
            Self::Authenticated { tokens, user_info } => f
                .debug_struct("Authenticated")
                .field("tokens", tokens)
                .field("sub", &user_info.sub())
                .finish(),
        }
    }
}

/// Server-side session record, keyed by the id carried in the session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub state: SessionState,
}

impl Session {
    #[must_use]
    pub fn anonymous(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Anonymous,
        }
    }

    #[must_use]
    pub fn flow_pending(id: SessionId, code_verifier: String, state: String) -> Self {
        Self {
            id,
            state: SessionState::FlowPending {
                code_verifier,
                state,
            },
        }
    }

    #[must_use]
    pub fn authenticated(id: SessionId, tokens: TokenSet, user_info: UserInfo) -> Self {
        Self {
            id,
            state: SessionState::Authenticated { tokens, user_info },
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated { .. })
    }

    #[must_use]
    pub fn is_flow_pending(&self) -> bool {
        matches!(self.state, SessionState::FlowPending { .. })
    }

    #[must_use]
    pub fn tokens(&self) -> Option<&TokenSet> {
        match &self.state {
            SessionState::Authenticated { tokens, .. } => Some(tokens),
            _ => None,
        }
    }

    #[must_use]
    pub fn user_info(&self) -> Option<&UserInfo> {
        match &self.state {
            SessionState::Authenticated { user_info, .. } => Some(user_info),
            _ => None,
        }
    }

    /// The id token to hint at logout, if the session holds one.
    #[must_use]
    pub fn id_token(&self) -> Option<&str> {
        self.tokens().and_then(|t| t.id_token.as_deref())
    }
}
