//! Active session state for one agent connection.
//!
//! Holds the session id negotiated by `session/new` and the output buffer fed
//! by `agent_message_chunk` updates. The state is shared between the
//! dispatcher task (appends) and the caller issuing prompts (clears before the
//! call, reads after the call's response has been delivered) through a
//! [`SharedSession`] mutex.

use std::sync::Arc;

use tokio::sync::Mutex;

/// Shared handle used by the dispatcher and the supervisor.
pub type SharedSession = Arc<Mutex<SessionState>>;

/// Session id and streamed output.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionState {
    session_id: Option<String>,
    output: String,
    chunks: usize,
}

impl SessionState {
    /// Create an empty shared state.
    #[must_use]
    pub fn shared() -> SharedSession {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Record the id assigned by the agent.
    pub fn activate(&mut self, session_id: String) {
        self.session_id = Some(session_id);
        self.output.clear();
        self.chunks = 0;
    }

    /// Forget the session (connection stopped).
    pub fn deactivate(&mut self) {
        self.session_id = None;
        self.output.clear();
        self.chunks = 0;
    }

    /// Active session id, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Whether `session_id` is the active session.
    #[must_use]
    pub fn is_active(&self, session_id: &str) -> bool {
        self.session_id.as_deref() == Some(session_id)
    }

    /// Clear the output buffer at the start of a prompt.
    pub fn begin_prompt(&mut self) {
        self.output.clear();
        self.chunks = 0;
    }

    /// Append one streamed chunk.
    pub fn append_chunk(&mut self, text: &str) {
        self.output.push_str(text);
        self.chunks += 1;
    }

    /// Take the accumulated output, leaving the buffer empty.
    pub fn take_output(&mut self) -> String {
        self.chunks = 0;
        std::mem::take(&mut self.output)
    }

    /// Accumulated output so far.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Number of chunks appended since the buffer was last cleared.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }
}
