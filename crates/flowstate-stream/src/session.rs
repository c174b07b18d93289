use crate::errors::ClientError;

const DEFAULT_USER_ID: &str = "default_user";

/// Caller-owned chat context passed into every client call.
///
/// Holds the bearer token and conversation identifiers explicitly rather than
/// reading them from process-wide storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatSession {
    access_token: String,
    user_id: Option<String>,
    thread_id: Option<String>,
}

impl ChatSession {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            user_id: None,
            thread_id: None,
        }
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into()).filter(|id| !id.trim().is_empty());
        self
    }

    /// Attaches an existing backend thread (`session_id` on the wire).
    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.set_thread_id(thread_id);
        self
    }

    pub fn set_thread_id(&mut self, thread_id: impl Into<String>) {
        self.thread_id = Some(thread_id.into()).filter(|id| !id.trim().is_empty());
    }

    pub fn current_thread(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// User id sent to the backend; falls back to `default_user`.
    pub fn effective_user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or(DEFAULT_USER_ID)
    }

    pub(crate) fn bearer_token(&self) -> Result<&str, ClientError> {
        let token = self.access_token.trim();
        if token.is_empty() {
            return Err(ClientError::Unauthenticated);
        }
        Ok(token)
    }

    pub(crate) fn require_thread(&self) -> Result<&str, ClientError> {
        self.current_thread().ok_or(ClientError::MissingThread)
    }
}
