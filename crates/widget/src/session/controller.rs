use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use chatwidget_transport::{ChatTransport, TransportResponse};
use futures::StreamExt;
use snafu::ResultExt;

use crate::chat::{
    Clock, MarkdownRenderer, MessageEntry, MessageKey, MessageStore, ResponseHandler, Sender,
    StoreMutation, StreamReconciler, SystemClock, Timestamp,
};
use crate::error::{
    DecodeSnafu, HttpStatusSnafu, ProtocolSnafu, TransportSnafu, WidgetError, WidgetResult,
};
use crate::settings::WidgetConfig;
use crate::shell::{Anchor, WidgetSurface};

use super::request::OutgoingRequest;
use super::state::{SessionState, ThreadId, ThreadSlot, TurnPhase, Visibility};

/// Why a submit was refused before anything happened.
///
/// There is no "busy" reason: `submit` borrows the controller exclusively until the
/// turn settles or its future is dropped, so turns cannot overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyInput,
}

/// How one turn ended. Failures have already been logged and alerted.
#[derive(Debug)]
pub enum TurnOutcome {
    Rejected(RejectReason),
    Replied { key: MessageKey },
    Streamed { key: MessageKey, chunks: usize },
    /// The stream closed before any text arrived; nothing was added.
    EmptyStream,
    Failed(WidgetError),
}

impl TurnOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn error(&self) -> Option<&WidgetError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Conversation session controller: visibility, timeline and the submit state machine.
pub struct SessionController<S: WidgetSurface> {
    config: Arc<WidgetConfig>,
    transport: Arc<dyn ChatTransport>,
    clock: Arc<dyn Clock>,
    store: MessageStore,
    state: SessionState,
    surface: S,
}

impl<S: WidgetSurface> SessionController<S> {
    pub fn new(config: WidgetConfig, transport: Arc<dyn ChatTransport>, surface: S) -> Self {
        let config = Arc::new(config.normalized());
        let thread = ThreadSlot::seeded(config.thread_id.as_deref());

        Self {
            config,
            transport,
            clock: Arc::new(SystemClock),
            store: MessageStore::default(),
            state: SessionState::new(thread),
            surface,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn MarkdownRenderer>) -> Self {
        self.store = MessageStore::new(renderer);
        self
    }

    pub fn config(&self) -> &Arc<WidgetConfig> {
        &self.config
    }

    /// Swaps the configuration used from the next interaction on.
    ///
    /// A configured thread id only seeds the session when none is held yet.
    pub fn replace_config(&mut self, config: Arc<WidgetConfig>) {
        if self.state.thread.adopt(config.thread_id.as_deref().and_then(ThreadId::parse)) {
            tracing::debug!("thread id seeded from updated configuration");
        }
        self.config = config;
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn timeline(&self) -> &MessageStore {
        &self.store
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn open(&mut self, anchor: Option<&Anchor>) {
        if self.state.is_open() {
            tracing::debug!("widget already open");
            return;
        }

        let config = Arc::clone(&self.config);
        if config.close_on_outside_click {
            self.surface.show_backdrop();
            self.state.backdrop_shown = true;
        }

        // The panel is rebuilt on every open, so the retained timeline is replayed once.
        self.surface.show_panel(&config.widget_title, anchor);
        let timeline = self.store.render_all();
        if !timeline.is_empty() {
            self.surface.render_timeline(&timeline);
        }

        if let Some(greeting) = config.greeting_message.as_deref()
            && self.store.is_empty()
        {
            let key = self.store.allocate_key(Sender::System, self.clock.now());
            self.commit(StoreMutation::Append(MessageEntry::new(key, greeting)));
        }

        self.state.visibility = Visibility::Open;
        tracing::info!(
            title = %config.widget_title,
            entries = self.store.len(),
            "widget opened"
        );
    }

    pub fn close(&mut self) {
        if !self.state.is_open() {
            return;
        }

        self.surface.hide_panel();
        if self.state.backdrop_shown {
            self.surface.hide_backdrop();
            self.state.backdrop_shown = false;
        }
        self.state.visibility = Visibility::Closed;
        tracing::info!("widget closed");
    }

    /// Click on the backdrop outside the panel.
    pub fn outside_click(&mut self) {
        if self.config.close_on_outside_click {
            self.close();
        }
    }

    /// Starts a new conversation: empty timeline, thread re-seeded from configuration.
    pub fn reset(&mut self) {
        self.store.clear();
        self.state.thread = ThreadSlot::seeded(self.config.thread_id.as_deref());
        self.surface.render_timeline(&[]);
        tracing::info!("conversation reset");
    }

    pub async fn submit(&mut self, input: &str) -> TurnOutcome {
        let config = Arc::clone(&self.config);
        if !config.has_url() {
            let error = WidgetError::MissingUrl {
                stage: "submit-check-url",
            };
            self.report(&error, &config);
            return TurnOutcome::Failed(error);
        }

        if input.trim().is_empty() {
            tracing::debug!("ignoring blank submit");
            return TurnOutcome::Rejected(RejectReason::EmptyInput);
        }

        let timestamp = self.clock.now();
        let user_key = self.store.allocate_key(Sender::User, timestamp);
        self.commit(StoreMutation::Append(MessageEntry::new(user_key, input)));

        let mut turn = TurnGuard::begin(self);
        match turn.run_turn(&config, input, timestamp).await {
            Ok(outcome) => outcome,
            Err(error) => {
                turn.report(&error, &config);
                TurnOutcome::Failed(error)
            }
        }
    }

    async fn run_turn(
        &mut self,
        config: &WidgetConfig,
        input: &str,
        timestamp: Timestamp,
    ) -> WidgetResult<TurnOutcome> {
        let request =
            OutgoingRequest::new(input, self.state.thread.get().cloned(), timestamp);
        let body = request.to_body(&config.user);
        let timeout = config.request_timeout();
        let transport = Arc::clone(&self.transport);

        tracing::debug!(
            url = %config.url,
            transport = transport.name(),
            streaming = config.response_is_a_stream,
            "dispatching chat request"
        );

        let response = within(
            timeout,
            "response",
            "await-response-head",
            transport.post_json(&config.url, body),
        )
        .await?
        .context(TransportSnafu {
            stage: "send-chat-request",
        })?;

        // Settled or not, the reply has arrived.
        self.surface.set_thinking(false);

        if let Err(failure) = ResponseHandler::check_status(&response) {
            return HttpStatusSnafu {
                stage: "check-response-status",
                status: failure.status,
                reason: failure.reason,
            }
            .fail();
        }

        if config.response_is_a_stream {
            self.state.phase = TurnPhase::Streaming;
            self.consume_stream(response, timeout).await
        } else {
            self.state.phase = TurnPhase::Completing;
            self.consume_buffered(response, timeout).await
        }
    }

    async fn consume_buffered(
        &mut self,
        response: TransportResponse,
        timeout: Option<Duration>,
    ) -> WidgetResult<TurnOutcome> {
        let body = within(
            timeout,
            "response body",
            "await-buffered-body",
            response.read_to_end(),
        )
        .await?
        .context(TransportSnafu {
            stage: "read-buffered-body",
        })?;

        let reply = ResponseHandler::parse_buffered(&body).context(ProtocolSnafu {
            stage: "parse-buffered-reply",
        })?;

        let key = self.store.allocate_key(Sender::System, self.clock.now());
        self.commit(StoreMutation::Append(MessageEntry::new(key, reply.message)));
        self.adopt_thread(reply.thread_id.as_deref());

        Ok(TurnOutcome::Replied { key })
    }

    async fn consume_stream(
        &mut self,
        response: TransportResponse,
        timeout: Option<Duration>,
    ) -> WidgetResult<TurnOutcome> {
        let charset = response.charset.clone();
        let mut stream = ResponseHandler::require_stream(response.body).context(ProtocolSnafu {
            stage: "require-stream-body",
        })?;
        let mut reconciler = StreamReconciler::new(charset.as_deref(), Arc::clone(&self.clock))
            .context(DecodeSnafu {
                stage: "open-stream-decoder",
            })?;

        while let Some(chunk) =
            within(timeout, "stream chunk", "await-stream-chunk", stream.next()).await?
        {
            let chunk = chunk.context(TransportSnafu {
                stage: "read-stream-chunk",
            })?;
            tracing::trace!(chunk_len = chunk.len(), "stream chunk received");

            let change = reconciler
                .push_chunk(&chunk, &mut self.store)
                .context(DecodeSnafu {
                    stage: "decode-stream-chunk",
                })?;
            if let Some(change) = change {
                self.surface.render_entry(&change);
            }
        }

        let summary = reconciler.finish(&mut self.store).context(DecodeSnafu {
            stage: "finish-stream",
        })?;
        if let Some(change) = &summary.last_change {
            self.surface.render_entry(change);
        }

        match summary.key {
            Some(key) => {
                tracing::debug!(
                    chunks = summary.chunks,
                    text_len = summary.text.len(),
                    "stream completed"
                );
                Ok(TurnOutcome::Streamed {
                    key,
                    chunks: summary.chunks,
                })
            }
            None => {
                tracing::debug!(chunks = summary.chunks, "stream closed without content");
                Ok(TurnOutcome::EmptyStream)
            }
        }
    }

    fn adopt_thread(&mut self, candidate: Option<&str>) {
        let candidate = candidate.and_then(ThreadId::parse);
        let offered = candidate.clone();
        if self.state.thread.adopt(candidate) {
            tracing::info!(thread_id = ?offered, "adopted thread id from response");
        } else if let (Some(offered), Some(held)) = (offered, self.state.thread.get())
            && offered != *held
        {
            tracing::debug!(
                offered = %offered,
                held = %held,
                "ignoring thread id from response"
            );
        }
    }

    fn commit(&mut self, mutation: StoreMutation) {
        match self.store.apply(mutation) {
            Ok(change) => self.surface.render_entry(&change),
            Err(error) => tracing::error!(error = %error, "timeline mutation rejected"),
        }
    }

    fn report(&mut self, error: &WidgetError, config: &WidgetConfig) {
        tracing::error!(
            target: "chatwidget",
            kind = ?error.kind(),
            error = %error,
            "chat turn failed"
        );
        if !config.disable_error_alert {
            self.surface.alert(&error.alert_text());
        }
    }

    fn enter_turn(&mut self) {
        self.state.busy = true;
        self.state.phase = TurnPhase::Submitting;
        self.surface.set_input_enabled(false);
        self.surface.set_thinking(true);
    }

    fn leave_turn(&mut self) {
        self.state.busy = false;
        self.state.phase = TurnPhase::Idle;
        self.surface.set_thinking(false);
        self.surface.set_input_enabled(true);
        self.surface.reset_input();
    }
}

/// Holds the controller for the duration of one turn and restores the idle state on
/// every exit, including when the submit future is dropped mid-flight.
struct TurnGuard<'a, S: WidgetSurface> {
    controller: &'a mut SessionController<S>,
}

impl<'a, S: WidgetSurface> TurnGuard<'a, S> {
    fn begin(controller: &'a mut SessionController<S>) -> Self {
        controller.enter_turn();
        Self { controller }
    }
}

impl<S: WidgetSurface> Deref for TurnGuard<'_, S> {
    type Target = SessionController<S>;

    fn deref(&self) -> &Self::Target {
        self.controller
    }
}

impl<S: WidgetSurface> DerefMut for TurnGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.controller
    }
}

impl<S: WidgetSurface> Drop for TurnGuard<'_, S> {
    fn drop(&mut self) {
        self.controller.leave_turn();
    }
}

async fn within<F: Future>(
    timeout: Option<Duration>,
    waiting_for: &'static str,
    stage: &'static str,
    future: F,
) -> WidgetResult<F::Output> {
    let Some(timeout) = timeout else {
        return Ok(future.await);
    };

    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| WidgetError::Timeout {
            stage,
            waiting_for,
            timeout,
        })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::chat::Placement;
    use crate::error::ErrorKind;
    use crate::session::UserMetadata;
    use crate::test_support::{
        RecordingSurface, Reply, ScriptedTransport, SteppingClock, SurfaceEvent, read_failure,
    };

    const URL: &str = "https://chat.example/api";

    fn controller(
        config: WidgetConfig,
        replies: Vec<Reply>,
    ) -> (SessionController<RecordingSurface>, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(replies));
        let controller = SessionController::new(
            config,
            Arc::clone(&transport) as Arc<dyn ChatTransport>,
            RecordingSurface::default(),
        )
        .with_clock(Arc::new(SteppingClock::starting_at(1_700_000_000_000)));
        (controller, transport)
    }

    fn buffered() -> WidgetConfig {
        WidgetConfig::default().with_url(URL)
    }

    fn streaming() -> WidgetConfig {
        buffered().with_streaming(true)
    }

    fn system_texts(controller: &SessionController<RecordingSurface>) -> Vec<String> {
        controller
            .timeline()
            .iter()
            .filter(|entry| entry.sender() == Sender::System)
            .map(|entry| entry.text.clone())
            .collect()
    }

    fn assert_idle(controller: &SessionController<RecordingSurface>) {
        assert!(!controller.state().is_busy());
        assert_eq!(controller.state().phase(), TurnPhase::Idle);
        assert_eq!(
            controller.surface().events.last(),
            Some(&SurfaceEvent::ResetInput)
        );
    }

    #[tokio::test]
    async fn buffered_reply_with_empty_message_is_rendered_and_adopts_thread() {
        let (mut controller, transport) = controller(
            buffered(),
            vec![Reply::json(200, "OK", r#"{"message":"","threadId":"t1"}"#)],
        );

        let outcome = controller.submit("hello").await;

        assert!(matches!(outcome, TurnOutcome::Replied { .. }));
        assert_eq!(system_texts(&controller), vec![String::new()]);
        assert_eq!(
            controller.state().thread_id().map(ThreadId::as_str),
            Some("t1")
        );
        let (url, body) = &transport.requests()[0];
        assert_eq!(url, URL);
        assert_eq!(body, &json!({ "message": "hello", "timestamp": 1_700_000_000_000_i64 }));
        assert_idle(&controller);
    }

    #[tokio::test]
    async fn thread_id_is_first_write_wins_across_turns() {
        let (mut controller, transport) = controller(
            buffered(),
            vec![
                Reply::json(200, "OK", r#"{"message":"one","threadId":"t1"}"#),
                Reply::json(200, "OK", r#"{"message":"two","threadId":"t2"}"#),
            ],
        );

        controller.submit("first").await;
        controller.submit("second").await;

        assert_eq!(
            controller.state().thread_id().map(ThreadId::as_str),
            Some("t1")
        );
        let requests = transport.requests();
        assert_eq!(requests[0].1.get("threadId"), None);
        assert_eq!(requests[1].1.get("threadId"), Some(&json!("t1")));
    }

    #[tokio::test]
    async fn configured_thread_id_is_never_overwritten() {
        let (mut controller, transport) = controller(
            buffered().with_thread_id("seeded"),
            vec![Reply::json(200, "OK", r#"{"message":"hi","threadId":"other"}"#)],
        );

        controller.submit("hello").await;

        assert_eq!(
            controller.state().thread_id().map(ThreadId::as_str),
            Some("seeded")
        );
        assert_eq!(transport.requests()[0].1.get("threadId"), Some(&json!("seeded")));
    }

    #[tokio::test]
    async fn missing_url_issues_no_request_and_mutates_nothing() {
        let (mut controller, transport) = controller(WidgetConfig::default(), Vec::new());

        let outcome = controller.submit("hello").await;

        assert_eq!(
            outcome.error().map(WidgetError::kind),
            Some(ErrorKind::Configuration)
        );
        assert!(transport.requests().is_empty());
        assert!(controller.timeline().is_empty());
        assert_eq!(
            controller.surface().events,
            vec![SurfaceEvent::Alert(
                "Could not send chat message: No URL provided".to_string()
            )]
        );
        assert!(!controller.state().is_busy());
    }

    #[tokio::test]
    async fn reply_without_message_is_a_protocol_error() {
        let (mut controller, _transport) = controller(
            buffered(),
            vec![Reply::json(200, "OK", r#"{"threadId":"t1"}"#)],
        );

        let outcome = controller.submit("hello").await;

        assert_eq!(outcome.error().map(WidgetError::kind), Some(ErrorKind::Protocol));
        assert!(system_texts(&controller).is_empty());
        assert_eq!(controller.timeline().len(), 1);
        assert_eq!(controller.state().thread_id(), None);
        assert_eq!(controller.surface().alerts().len(), 1);
        assert!(controller.surface().alerts()[0].contains("misconfigured"));
        assert_idle(&controller);
    }

    #[tokio::test]
    async fn failure_status_is_reported_with_its_reason() {
        let (mut controller, _transport) = controller(
            buffered(),
            vec![Reply::json(500, "Internal Server Error", "oops")],
        );

        let outcome = controller.submit("hello").await;

        assert_eq!(outcome.error().map(WidgetError::kind), Some(ErrorKind::Transport));
        assert_eq!(
            controller.surface().alerts(),
            vec!["Could not send message: Internal Server Error".to_string()]
        );
        assert!(system_texts(&controller).is_empty());
        assert_idle(&controller);
    }

    #[tokio::test]
    async fn transport_failure_clears_busy_state() {
        let (mut controller, _transport) = controller(buffered(), vec![Reply::unreachable()]);

        let outcome = controller.submit("hello").await;

        assert!(matches!(
            outcome,
            TurnOutcome::Failed(WidgetError::Transport { .. })
        ));
        assert_idle(&controller);
        assert_eq!(
            controller.surface().count(&SurfaceEvent::InputEnabled(true)),
            1
        );
    }

    #[tokio::test]
    async fn disabled_alerts_still_fail_quietly() {
        let config = WidgetConfig {
            disable_error_alert: true,
            ..buffered()
        };
        let (mut controller, _transport) =
            controller(config, vec![Reply::json(503, "Service Unavailable", "")]);

        let outcome = controller.submit("hello").await;

        assert!(outcome.is_failure());
        assert!(controller.surface().alerts().is_empty());
    }

    #[tokio::test]
    async fn streamed_chunks_grow_a_single_entry() {
        let (mut controller, _transport) =
            controller(streaming(), vec![Reply::chunks(&[b"Hel", b"lo"])]);

        let outcome = controller.submit("greet me").await;

        let TurnOutcome::Streamed { key, chunks } = outcome else {
            panic!("expected a streamed outcome");
        };
        assert_eq!(chunks, 2);
        assert_eq!(system_texts(&controller), vec!["Hello".to_string()]);
        assert_eq!(
            controller.surface().rendered_texts(),
            vec!["greet me".to_string(), "Hel".to_string(), "Hello".to_string()]
        );

        let system_renders = controller
            .surface()
            .entries
            .iter()
            .filter(|change| change.key == key)
            .map(|change| (change.text.as_str(), change.placement))
            .collect::<Vec<_>>();
        assert_eq!(
            system_renders,
            vec![("Hel", Placement::Prepended), ("Hello", Placement::Replaced)]
        );
        assert_idle(&controller);
    }

    #[tokio::test]
    async fn failure_status_in_streaming_mode_is_a_transport_error() {
        let (mut controller, _transport) =
            controller(streaming(), vec![Reply::json(502, "Bad Gateway", "upstream down")]);

        let outcome = controller.submit("hello").await;

        assert!(matches!(
            outcome,
            TurnOutcome::Failed(WidgetError::HttpStatus { status: 502, .. })
        ));
        assert_eq!(
            controller.surface().alerts(),
            vec!["Could not send message: Bad Gateway".to_string()]
        );
        assert!(system_texts(&controller).is_empty());
        assert_idle(&controller);
    }

    #[tokio::test]
    async fn read_failure_mid_stream_keeps_the_partial_reply() {
        let (mut controller, _transport) = controller(
            streaming(),
            vec![Reply::stream(vec![
                Ok(Bytes::from_static(b"Half a ")),
                Err(read_failure()),
                Ok(Bytes::from_static(b"never seen")),
            ])],
        );

        let outcome = controller.submit("hello").await;

        assert_eq!(outcome.error().map(WidgetError::kind), Some(ErrorKind::Transport));
        assert!(matches!(
            outcome,
            TurnOutcome::Failed(WidgetError::Transport { stage: "read-stream-chunk", .. })
        ));
        assert_eq!(system_texts(&controller), vec!["Half a ".to_string()]);
        assert_eq!(controller.surface().alerts().len(), 1);
        assert_idle(&controller);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_stream_times_out_and_keeps_partial_text() {
        let config = WidgetConfig {
            request_timeout_secs: 5,
            ..streaming()
        };
        let (mut controller, _transport) = controller(config, vec![Reply::stall_after(&[b"part"])]);

        let outcome = controller.submit("hello").await;

        assert!(matches!(
            outcome,
            TurnOutcome::Failed(WidgetError::Timeout {
                stage: "await-stream-chunk",
                ..
            })
        ));
        assert_eq!(system_texts(&controller), vec!["part".to_string()]);
        assert_eq!(
            controller.surface().alerts(),
            vec!["Could not send message: the request timed out".to_string()]
        );
        assert_idle(&controller);
    }

    #[tokio::test]
    async fn windows_1252_stream_is_decoded() {
        let reply = match Reply::chunks(&[b"caf\xe9 \x93ok\x94"]) {
            Reply::Ready(Ok(response)) => {
                Reply::Ready(Ok(response.with_charset("windows-1252")))
            }
            other => other,
        };
        let (mut controller, _transport) = controller(streaming(), vec![reply]);

        let outcome = controller.submit("hello").await;

        assert!(matches!(outcome, TurnOutcome::Streamed { chunks: 1, .. }));
        assert_eq!(system_texts(&controller), vec!["café “ok”".to_string()]);
        assert!(controller.surface().alerts().is_empty());
    }

    #[tokio::test]
    async fn response_thread_id_is_kept_verbatim() {
        let (mut controller, transport) = controller(
            buffered(),
            vec![
                Reply::json(200, "OK", r#"{"message":"one","threadId":" t1 "}"#),
                Reply::json(200, "OK", r#"{"message":"two"}"#),
            ],
        );

        controller.submit("first").await;
        controller.submit("second").await;

        assert_eq!(
            controller.state().thread_id().map(ThreadId::as_str),
            Some(" t1 ")
        );
        assert_eq!(transport.requests()[1].1.get("threadId"), Some(&json!(" t1 ")));
    }

    #[tokio::test]
    async fn empty_stream_is_a_silent_turn() {
        let (mut controller, _transport) = controller(streaming(), vec![Reply::chunks(&[])]);

        let outcome = controller.submit("anyone?").await;

        assert!(matches!(outcome, TurnOutcome::EmptyStream));
        assert!(system_texts(&controller).is_empty());
        assert!(controller.surface().alerts().is_empty());
        assert_idle(&controller);
    }

    #[tokio::test]
    async fn streaming_without_body_is_a_protocol_error() {
        let (mut controller, _transport) =
            controller(streaming(), vec![Reply::absent(200, "OK")]);

        let outcome = controller.submit("hello").await;

        assert_eq!(outcome.error().map(WidgetError::kind), Some(ErrorKind::Protocol));
        assert!(system_texts(&controller).is_empty());
        assert_idle(&controller);
    }

    #[tokio::test]
    async fn decode_failure_keeps_the_partial_stream() {
        let (mut controller, _transport) =
            controller(streaming(), vec![Reply::chunks(&[b"partial ", &[0xc0, 0x20]])]);

        let outcome = controller.submit("hello").await;

        assert!(matches!(
            outcome,
            TurnOutcome::Failed(WidgetError::Decode { .. })
        ));
        assert_eq!(system_texts(&controller), vec!["partial ".to_string()]);
        assert_eq!(controller.surface().alerts().len(), 1);
        assert_idle(&controller);
    }

    #[tokio::test]
    async fn turn_events_follow_the_submit_state_machine() {
        let (mut controller, _transport) =
            controller(buffered(), vec![Reply::json(200, "OK", r#"{"message":"hi"}"#)]);

        controller.submit("hello").await;

        assert_eq!(
            controller.surface().events,
            vec![
                SurfaceEvent::Entry {
                    text: "hello".to_string(),
                    placement: Placement::Prepended,
                },
                SurfaceEvent::InputEnabled(false),
                SurfaceEvent::Thinking(true),
                SurfaceEvent::Thinking(false),
                SurfaceEvent::Entry {
                    text: "hi".to_string(),
                    placement: Placement::Prepended,
                },
                SurfaceEvent::Thinking(false),
                SurfaceEvent::InputEnabled(true),
                SurfaceEvent::ResetInput,
            ]
        );
        let senders = controller
            .timeline()
            .iter()
            .map(|entry| entry.sender())
            .collect::<Vec<_>>();
        assert_eq!(senders, vec![Sender::System, Sender::User]);
    }

    #[tokio::test]
    async fn blank_input_is_rejected_without_a_request() {
        let (mut controller, transport) = controller(buffered(), Vec::new());

        let outcome = controller.submit("   ").await;

        assert!(matches!(
            outcome,
            TurnOutcome::Rejected(RejectReason::EmptyInput)
        ));
        assert!(transport.requests().is_empty());
        assert!(controller.timeline().is_empty());
    }

    #[tokio::test]
    async fn host_metadata_cannot_shadow_reserved_fields() {
        let config = WidgetConfig {
            user: UserMetadata::new()
                .with("email", "a@example.com")
                .with("message", "spoof")
                .with("threadId", "spoof"),
            ..buffered()
        };
        let (mut controller, transport) =
            controller(config, vec![Reply::json(200, "OK", r#"{"message":"ok"}"#)]);

        controller.submit("real").await;

        let body = &transport.requests()[0].1;
        assert_eq!(body.get("email"), Some(&json!("a@example.com")));
        assert_eq!(body.get("message"), Some(&json!("real")));
        assert_eq!(body.get("threadId"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_request_times_out_back_to_idle() {
        let config = WidgetConfig {
            request_timeout_secs: 5,
            ..buffered()
        };
        let (mut controller, _transport) = controller(config, vec![Reply::Hang]);

        let outcome = controller.submit("hello").await;

        assert!(matches!(
            outcome,
            TurnOutcome::Failed(WidgetError::Timeout { .. })
        ));
        assert_eq!(
            controller.surface().alerts(),
            vec!["Could not send message: the request timed out".to_string()]
        );
        assert_idle(&controller);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_turn_mid_flight_restores_idle() {
        let config = WidgetConfig {
            request_timeout_secs: 0,
            ..buffered()
        };
        let (mut controller, _transport) = controller(config, vec![Reply::Hang]);

        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), controller.submit("hello")).await;

        assert!(abandoned.is_err());
        assert_idle(&controller);
        assert_eq!(controller.timeline().len(), 1);
    }

    #[test]
    fn greeting_is_inserted_once_on_first_open() {
        let (mut controller, _transport) = controller(buffered().with_greeting("Welcome!"), Vec::new());

        controller.open(None);
        controller.close();
        controller.open(None);

        assert_eq!(system_texts(&controller), vec!["Welcome!".to_string()]);
        assert_eq!(controller.surface().count(&SurfaceEvent::Timeline(1)), 1);
        assert!(controller.state().is_open());
    }

    #[test]
    fn backdrop_follows_outside_click_setting() {
        let (mut controller, _transport) = controller(buffered(), Vec::new());
        controller.open(Some(&Anchor::new("chat-button")));
        assert!(controller.state().backdrop_shown());

        controller.outside_click();

        assert!(!controller.state().is_open());
        assert!(!controller.state().backdrop_shown());
        assert_eq!(
            controller.surface().events,
            vec![
                SurfaceEvent::ShowBackdrop,
                SurfaceEvent::ShowPanel("Chatbot".to_string()),
                SurfaceEvent::HidePanel,
                SurfaceEvent::HideBackdrop,
            ]
        );
    }

    #[test]
    fn outside_click_is_ignored_when_disabled() {
        let config = WidgetConfig {
            close_on_outside_click: false,
            ..buffered()
        };
        let (mut controller, _transport) = controller(config, Vec::new());
        controller.open(None);

        controller.outside_click();

        assert!(controller.state().is_open());
        assert_eq!(controller.surface().count(&SurfaceEvent::ShowBackdrop), 0);
    }

    #[tokio::test]
    async fn reset_clears_timeline_and_reseeds_thread() {
        let (mut controller, _transport) = controller(
            buffered(),
            vec![Reply::json(200, "OK", r#"{"message":"hi","threadId":"t1"}"#)],
        );
        controller.submit("hello").await;

        controller.reset();

        assert!(controller.timeline().is_empty());
        assert_eq!(controller.state().thread_id(), None);
        assert_eq!(controller.surface().events.last(), Some(&SurfaceEvent::Timeline(0)));
    }
}
