//! Unit tests for the session output buffer.

use acp_bridge::models::session::SessionState;

#[test]
fn new_state_has_no_session() {
    let state = SessionState::default();
    assert_eq!(state.session_id(), None);
    assert!(!state.is_active("s1"));
}

#[test]
fn begin_prompt_clears_previous_output() {
    let mut state = SessionState::default();
    state.activate("s1".into());
    state.append_chunk("old");
    state.begin_prompt();
    state.append_chunk("Echo: ");
    state.append_chunk("hello");

    assert_eq!(state.output(), "Echo: hello");
    assert_eq!(state.chunk_count(), 2);
}

#[test]
fn take_output_empties_buffer() {
    let mut state = SessionState::default();
    state.activate("s1".into());
    state.append_chunk("abc");

    assert_eq!(state.take_output(), "abc");
    assert_eq!(state.output(), "");
    assert_eq!(state.chunk_count(), 0);
}

#[test]
fn deactivate_forgets_session_and_output() {
    let mut state = SessionState::default();
    state.activate("s1".into());
    state.append_chunk("abc");
    state.deactivate();

    assert_eq!(state.session_id(), None);
    assert_eq!(state.output(), "");
}

#[test]
fn activate_replaces_previous_session() {
    let mut state = SessionState::default();
    state.activate("s1".into());
    state.activate("s2".into());

    assert!(state.is_active("s2"));
    assert!(!state.is_active("s1"));
}
