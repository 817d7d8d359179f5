//! The chat session controller.
//!
//! `Session` owns the transcript and the turn lifecycle
//! (`Idle -> AwaitingReply -> Revealing -> Idle`). It never awaits anything
//! itself: starting a turn hands back a [`TurnRequest`] for the caller to run,
//! and the caller reports the outcome with [`Session::finish_request`] and
//! drives the typewriter reveal with [`Session::reveal_tick`]. Both carry the
//! run id they were issued for, and anything tagged with a run id other than
//! the current one is dropped.

use crate::browser::PageError;
use crate::llm::ModelError;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const MODEL_ERROR_MESSAGE: &str = "Error calling model.";
pub const PAGE_ERROR_PREFIX: &str =
    "Could not read this page. If this is a restricted page or missing permissions, try another site.";
pub const SUMMARY_DISPLAY_TEXT: &str = "Summarize the current page, please.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

pub type RunId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingReply,
    Revealing,
}

/// Everything needed to run one model call off the UI task.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub run_id: RunId,
    pub history: Vec<Message>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub enum ReplyOutcome {
    /// The reply is being revealed. Tick `run_id` until the timer is cancelled.
    Reveal {
        run_id: RunId,
        timer: CancellationToken,
    },
    /// The call failed and an error bubble was appended.
    Failed,
    /// Stale or cancelled; nothing changed.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Advanced,
    Finished,
    /// The tick belongs to a reveal that no longer exists.
    Stale,
}

#[derive(Debug)]
struct Reveal {
    run_id: RunId,
    text: Vec<char>,
    shown: usize,
    timer: CancellationToken,
}

#[derive(Debug)]
pub struct Session {
    transcript: Vec<Message>,
    state: TurnState,
    run_id: RunId,
    cancelled: bool,
    in_flight: Option<CancellationToken>,
    reveal: Option<Reveal>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            transcript: Vec::new(),
            state: TurnState::Idle,
            run_id: 0,
            cancelled: false,
            in_flight: None,
            reveal: None,
        }
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn current_run(&self) -> RunId {
        self.run_id
    }

    pub fn is_busy(&self) -> bool {
        self.state != TurnState::Idle
    }

    pub fn is_revealing(&self) -> bool {
        self.state == TurnState::Revealing
    }

    /// Starts a turn from typed input.
    pub fn send(&mut self, input: &str) -> Option<TurnRequest> {
        let text = input.trim();
        if text.is_empty() || self.is_busy() {
            return None;
        }
        self.transcript.push(Message::user(text));
        let history = self.transcript.clone();
        Some(self.begin_turn(history))
    }

    /// Starts a turn whose visible text differs from what the model receives.
    pub fn send_hidden_prompt(&mut self, display: &str, prompt: &str) -> Option<TurnRequest> {
        if self.is_busy() {
            return None;
        }
        let mut history = self.transcript.clone();
        history.push(Message::user(prompt));
        self.transcript.push(Message::user(display));
        Some(self.begin_turn(history))
    }

    /// Starts the page summary turn for already extracted page text.
    pub fn send_summary(&mut self, page_text: &str) -> Option<TurnRequest> {
        let prompt = crate::extract::build_summary_prompt(page_text);
        self.send_hidden_prompt(SUMMARY_DISPLAY_TEXT, &prompt)
    }

    /// Records that the summary could not start because the page was unreadable.
    pub fn report_page_error(&mut self, error: &PageError) {
        warn!("Page extraction failed: {}", error);
        self.transcript
            .push(Message::assistant(format!("{}\n\n{}", PAGE_ERROR_PREFIX, error)));
    }

    fn begin_turn(&mut self, history: Vec<Message>) -> TurnRequest {
        self.run_id += 1;
        self.cancelled = false;
        self.state = TurnState::AwaitingReply;

        let cancel = CancellationToken::new();
        self.in_flight = Some(cancel.clone());
        debug!(run_id = self.run_id, messages = history.len(), "Turn started");

        TurnRequest {
            run_id: self.run_id,
            history,
            cancel,
        }
    }

    fn is_current(&self, run_id: RunId) -> bool {
        !self.cancelled && run_id == self.run_id
    }

    /// Applies the result of the model call issued for `run_id`.
    pub fn finish_request(
        &mut self,
        run_id: RunId,
        result: Result<String, ModelError>,
    ) -> ReplyOutcome {
        if run_id == self.run_id {
            self.in_flight = None;
        }
        if !self.is_current(run_id) {
            debug!(run_id, current = self.run_id, "Dropping superseded reply");
            return ReplyOutcome::Discarded;
        }

        match result {
            Ok(reply) => {
                let timer = CancellationToken::new();
                self.transcript.push(Message::assistant(String::new()));
                self.reveal = Some(Reveal {
                    run_id,
                    text: reply.chars().collect(),
                    shown: 0,
                    timer: timer.clone(),
                });
                self.state = TurnState::Revealing;
                debug!(run_id, chars = reply.chars().count(), "Revealing reply");
                ReplyOutcome::Reveal { run_id, timer }
            }
            Err(e) => {
                warn!(run_id, "Model call failed: {}", e);
                self.transcript.push(Message::assistant(MODEL_ERROR_MESSAGE));
                self.state = TurnState::Idle;
                ReplyOutcome::Failed
            }
        }
    }

    /// Reveals one more character of the reply for `run_id`.
    pub fn reveal_tick(&mut self, run_id: RunId) -> TickOutcome {
        let current = self.is_current(run_id);
        let Some(reveal) = self.reveal.as_mut() else {
            return TickOutcome::Stale;
        };
        if reveal.run_id != run_id {
            return TickOutcome::Stale;
        }
        if !current {
            reveal.timer.cancel();
            self.reveal = None;
            return TickOutcome::Stale;
        }

        if reveal.shown < reveal.text.len() {
            reveal.shown += 1;
        }
        let partial: String = reveal.text[..reveal.shown].iter().collect();
        if let Some(last) = self.transcript.last_mut() {
            if last.role == Role::Assistant {
                last.content = partial;
            }
        }

        if reveal.shown >= reveal.text.len() {
            reveal.timer.cancel();
            self.reveal = None;
            self.state = TurnState::Idle;
            debug!(run_id, "Reveal finished");
            TickOutcome::Finished
        } else {
            TickOutcome::Advanced
        }
    }

    /// Abandons the active turn. Revealed text stays as it is.
    pub fn stop(&mut self) {
        self.cancelled = true;
        if let Some(cancel) = self.in_flight.take() {
            cancel.cancel();
        }
        if let Some(reveal) = self.reveal.take() {
            reveal.timer.cancel();
        }
        if self.state != TurnState::Idle {
            debug!(run_id = self.run_id, "Turn stopped");
        }
        self.state = TurnState::Idle;
    }

    pub fn clear(&mut self) {
        self.stop();
        self.transcript.clear();
    }

    /// Content of the most recent assistant message, if any.
    pub fn last_reply(&self) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reveal_all(session: &mut Session, run_id: RunId) -> Vec<String> {
        let mut seen = Vec::new();
        loop {
            let outcome = session.reveal_tick(run_id);
            seen.push(session.transcript().last().unwrap().content.clone());
            if outcome != TickOutcome::Advanced {
                break;
            }
        }
        seen
    }

    #[test]
    fn test_send_appends_trimmed_user_message() {
        let mut session = Session::new();
        let req = session.send("  hello  ").expect("turn should start");

        assert_eq!(session.transcript(), &[Message::user("hello")]);
        assert_eq!(req.history, vec![Message::user("hello")]);
        assert_eq!(req.run_id, 1);
        assert_eq!(session.state(), TurnState::AwaitingReply);
    }

    #[test]
    fn test_blank_input_is_ignored() {
        let mut session = Session::new();
        assert!(session.send("   \n ").is_none());
        assert!(session.transcript().is_empty());
        assert_eq!(session.state(), TurnState::Idle);
        assert_eq!(session.current_run(), 0);
    }

    #[test]
    fn test_send_while_busy_is_noop() {
        let mut session = Session::new();
        let req = session.send("first").unwrap();

        for text in ["second", "third"] {
            assert!(session.send(text).is_none());
            assert!(session.send_hidden_prompt("shown", text).is_none());
        }
        assert_eq!(session.transcript().len(), 1);

        session.finish_request(req.run_id, Ok("reply".to_string()));
        assert_eq!(session.state(), TurnState::Revealing);
        let before = session.transcript().len();
        assert!(session.send("during reveal").is_none());
        assert!(session.send_summary("page text that is long enough").is_none());
        assert_eq!(session.transcript().len(), before);
    }

    #[test]
    fn test_reveal_progresses_one_char_at_a_time() {
        let mut session = Session::new();
        let req = session.send("hi").unwrap();
        let outcome = session.finish_request(req.run_id, Ok("Hello world".to_string()));
        assert!(matches!(outcome, ReplyOutcome::Reveal { run_id: 1, .. }));
        assert_eq!(session.transcript().last().unwrap(), &Message::assistant(""));

        let seen = reveal_all(&mut session, req.run_id);
        let expected: Vec<String> = (1..="Hello world".len())
            .map(|i| "Hello world"[..i].to_string())
            .collect();
        assert_eq!(seen, expected);
        assert_eq!(session.state(), TurnState::Idle);

        // Late ticks after completion change nothing.
        assert_eq!(session.reveal_tick(req.run_id), TickOutcome::Stale);
        assert_eq!(session.transcript().last().unwrap().content, "Hello world");
    }

    #[test]
    fn test_reveal_counts_codepoints() {
        let mut session = Session::new();
        let req = session.send("hi").unwrap();
        session.finish_request(req.run_id, Ok("héé".to_string()));
        let seen = reveal_all(&mut session, req.run_id);
        assert_eq!(seen, vec!["h", "hé", "héé"]);
    }

    #[test]
    fn test_empty_reply_finishes_on_first_tick() {
        let mut session = Session::new();
        let req = session.send("hi").unwrap();
        session.finish_request(req.run_id, Ok(String::new()));
        assert_eq!(session.reveal_tick(req.run_id), TickOutcome::Finished);
        assert_eq!(session.transcript().last().unwrap(), &Message::assistant(""));
        assert!(!session.is_busy());
    }

    #[test]
    fn test_reveal_timer_cancelled_on_finish() {
        let mut session = Session::new();
        let req = session.send("hi").unwrap();
        let ReplyOutcome::Reveal { timer, .. } = session.finish_request(req.run_id, Ok("ok".into()))
        else {
            panic!("expected reveal");
        };
        assert!(!timer.is_cancelled());
        reveal_all(&mut session, req.run_id);
        assert!(timer.is_cancelled());
    }

    #[test]
    fn test_stop_during_reveal_keeps_partial_text() {
        let mut session = Session::new();
        let req = session.send("hi").unwrap();
        let ReplyOutcome::Reveal { timer, .. } =
            session.finish_request(req.run_id, Ok("Hello world".into()))
        else {
            panic!("expected reveal");
        };
        session.reveal_tick(req.run_id);
        session.reveal_tick(req.run_id);

        session.stop();
        assert!(timer.is_cancelled());
        assert_eq!(session.state(), TurnState::Idle);

        for _ in 0..20 {
            assert_eq!(session.reveal_tick(req.run_id), TickOutcome::Stale);
        }
        assert_eq!(session.transcript().last().unwrap().content, "He");
    }

    #[test]
    fn test_stop_cancels_in_flight_call_and_suppresses_error() {
        let mut session = Session::new();
        let req = session.send("hi").unwrap();
        session.stop();
        session.stop();

        assert!(req.cancel.is_cancelled());
        assert_eq!(session.state(), TurnState::Idle);
        assert!(matches!(
            session.finish_request(req.run_id, Err(ModelError::Cancelled)),
            ReplyOutcome::Discarded
        ));
        assert_eq!(session.transcript(), &[Message::user("hi")]);
    }

    #[test]
    fn test_failure_appends_error_message() {
        let mut session = Session::new();
        let req = session.send("hi").unwrap();
        let outcome = session.finish_request(
            req.run_id,
            Err(ModelError::Status {
                status: 401,
                body: "bad key".to_string(),
            }),
        );
        assert!(matches!(outcome, ReplyOutcome::Failed));
        assert_eq!(
            session.transcript().last().unwrap(),
            &Message::assistant(MODEL_ERROR_MESSAGE)
        );
        assert_eq!(session.state(), TurnState::Idle);
    }

    #[test]
    fn test_superseded_reply_is_dropped() {
        let mut session = Session::new();
        let first = session.send("one").unwrap();
        session.stop();
        let second = session.send("two").unwrap();
        assert!(second.run_id > first.run_id);

        assert!(matches!(
            session.finish_request(first.run_id, Ok("late".into())),
            ReplyOutcome::Discarded
        ));
        assert_eq!(session.reveal_tick(first.run_id), TickOutcome::Stale);
        assert_eq!(
            session.transcript(),
            &[Message::user("one"), Message::user("two")]
        );
        assert_eq!(session.state(), TurnState::AwaitingReply);

        session.finish_request(second.run_id, Ok("fresh".into()));
        reveal_all(&mut session, second.run_id);
        assert_eq!(session.transcript().last().unwrap().content, "fresh");
    }

    #[test]
    fn test_hidden_prompt_only_reaches_the_model() {
        let mut session = Session::new();
        let first = session.send("earlier question").unwrap();
        session.finish_request(first.run_id, Ok("a".into()));
        reveal_all(&mut session, first.run_id);

        let req = session
            .send_hidden_prompt(SUMMARY_DISPLAY_TEXT, "...long text...")
            .unwrap();

        let users: Vec<_> = session
            .transcript()
            .iter()
            .filter(|m| m.role == Role::User)
            .collect();
        assert_eq!(users.len(), 2);
        assert_eq!(users[1].content, SUMMARY_DISPLAY_TEXT);

        assert_eq!(req.history.len(), 3);
        assert_eq!(req.history[2], Message::user("...long text..."));
        assert_eq!(req.history[..2], session.transcript()[..2]);
    }

    #[test]
    fn test_send_summary_builds_prompt() {
        let mut session = Session::new();
        let req = session.send_summary("The page body.").unwrap();
        let prompt = &req.history.last().unwrap().content;
        assert!(prompt.starts_with("Summarize the following webpage content."));
        assert!(prompt.ends_with("The page body."));
        assert_eq!(
            session.transcript(),
            &[Message::user(SUMMARY_DISPLAY_TEXT)]
        );
    }

    #[test]
    fn test_page_error_message() {
        let mut session = Session::new();
        session.report_page_error(&PageError::Unreadable);
        let last = session.transcript().last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.content.contains("Could not read this page"));
        assert!(last
            .content
            .contains("Could not extract readable text from the page."));
        assert!(!session.is_busy());
    }

    #[test]
    fn test_clear_empties_transcript_and_stops() {
        let mut session = Session::new();
        let req = session.send("hi").unwrap();
        session.clear();
        assert!(session.transcript().is_empty());
        assert!(req.cancel.is_cancelled());
        assert!(matches!(
            session.finish_request(req.run_id, Ok("late".into())),
            ReplyOutcome::Discarded
        ));
        assert!(session.transcript().is_empty());
    }

    #[test]
    fn test_new_turn_resets_cancelled_flag() {
        let mut session = Session::new();
        session.send("one").unwrap();
        session.stop();
        let req = session.send("two").unwrap();
        assert!(matches!(
            session.finish_request(req.run_id, Ok("x".into())),
            ReplyOutcome::Reveal { .. }
        ));
    }

    #[test]
    fn test_last_reply() {
        let mut session = Session::new();
        assert_eq!(session.last_reply(), None);
        let req = session.send("hi").unwrap();
        session.finish_request(req.run_id, Ok("there".into()));
        reveal_all(&mut session, req.run_id);
        assert_eq!(session.last_reply(), Some("there"));
    }
}
