use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use bytes::Bytes;
use futures::StreamExt;
use chatwidget_transport::{
    BoxFuture, ChatTransport, ResponseBody, TransportError, TransportResponse, TransportResult,
};
use serde_json::Value;

use crate::chat::{Clock, EntryChange, Placement, Timestamp};
use crate::shell::{Anchor, WidgetSurface};

/// Clock that advances by one millisecond per reading.
pub(crate) struct SteppingClock(AtomicI64);

impl SteppingClock {
    pub(crate) fn starting_at(millis: i64) -> Self {
        Self(AtomicI64::new(millis))
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.0.fetch_add(1, Ordering::SeqCst))
    }
}

pub(crate) enum Reply {
    Ready(TransportResult<TransportResponse>),
    /// Never answers.
    Hang,
}

impl Reply {
    pub(crate) fn json(status: u16, reason: &str, body: &str) -> Self {
        Self::Ready(Ok(TransportResponse::new(
            status,
            reason,
            ResponseBody::from_chunks(vec![Ok(Bytes::from(body.to_string()))]),
        )))
    }

    pub(crate) fn chunks(chunks: &[&[u8]]) -> Self {
        Self::stream(chunks.iter().map(|chunk| Ok(Bytes::copy_from_slice(chunk))).collect())
    }

    /// 200 stream yielding `items` in order, errors included.
    pub(crate) fn stream(items: Vec<TransportResult<Bytes>>) -> Self {
        Self::Ready(Ok(TransportResponse::new(
            200,
            "OK",
            ResponseBody::from_chunks(items),
        )))
    }

    /// 200 stream that yields `chunks` and then never produces another item.
    pub(crate) fn stall_after(chunks: &[&[u8]]) -> Self {
        let chunks = chunks
            .iter()
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect::<Vec<_>>();
        let stream = futures::stream::iter(chunks).chain(futures::stream::pending());
        Self::Ready(Ok(TransportResponse::new(
            200,
            "OK",
            ResponseBody::Stream(Box::pin(stream)),
        )))
    }

    pub(crate) fn absent(status: u16, reason: &str) -> Self {
        Self::Ready(Ok(TransportResponse::new(status, reason, ResponseBody::Absent)))
    }

    pub(crate) fn unreachable() -> Self {
        Self::Ready(Err(TransportError::InvalidUrl {
            stage: "scripted",
            url: "http://unreachable.invalid".to_string(),
            details: "connection refused".to_string(),
        }))
    }
}

/// Body read failure as the HTTP transport reports it.
pub(crate) fn read_failure() -> TransportError {
    let source = reqwest::Client::new()
        .post("not an absolute url")
        .build()
        .expect_err("relative urls cannot be requested");
    TransportError::ReadChunk {
        stage: "scripted-read",
        source,
    }
}

/// Transport that answers from a script and records every request body.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    pub(crate) fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl ChatTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    fn post_json<'a>(
        &'a self,
        url: &'a str,
        body: Vec<u8>,
    ) -> BoxFuture<'a, TransportResult<TransportResponse>> {
        let parsed = serde_json::from_slice(&body).expect("request body is json");
        self.requests
            .lock()
            .expect("requests lock")
            .push((url.to_string(), parsed));
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .expect("a scripted reply for every request");

        Box::pin(async move {
            match reply {
                Reply::Ready(result) => result,
                Reply::Hang => futures::future::pending().await,
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SurfaceEvent {
    ShowPanel(String),
    HidePanel,
    ShowBackdrop,
    HideBackdrop,
    Thinking(bool),
    InputEnabled(bool),
    ResetInput,
    Entry { text: String, placement: Placement },
    Timeline(usize),
    Alert(String),
}

#[derive(Default)]
pub(crate) struct RecordingSurface {
    pub(crate) events: Vec<SurfaceEvent>,
    pub(crate) entries: Vec<EntryChange>,
}

impl RecordingSurface {
    pub(crate) fn alerts(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                SurfaceEvent::Alert(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn rendered_texts(&self) -> Vec<String> {
        self.entries.iter().map(|change| change.text.clone()).collect()
    }

    pub(crate) fn count(&self, wanted: &SurfaceEvent) -> usize {
        self.events.iter().filter(|event| *event == wanted).count()
    }
}

impl WidgetSurface for RecordingSurface {
    fn show_panel(&mut self, title: &str, _anchor: Option<&Anchor>) {
        self.events.push(SurfaceEvent::ShowPanel(title.to_string()));
    }

    fn hide_panel(&mut self) {
        self.events.push(SurfaceEvent::HidePanel);
    }

    fn show_backdrop(&mut self) {
        self.events.push(SurfaceEvent::ShowBackdrop);
    }

    fn hide_backdrop(&mut self) {
        self.events.push(SurfaceEvent::HideBackdrop);
    }

    fn set_thinking(&mut self, thinking: bool) {
        self.events.push(SurfaceEvent::Thinking(thinking));
    }

    fn set_input_enabled(&mut self, enabled: bool) {
        self.events.push(SurfaceEvent::InputEnabled(enabled));
    }

    fn reset_input(&mut self) {
        self.events.push(SurfaceEvent::ResetInput);
    }

    fn render_entry(&mut self, change: &EntryChange) {
        self.events.push(SurfaceEvent::Entry {
            text: change.text.clone(),
            placement: change.placement,
        });
        self.entries.push(change.clone());
    }

    fn render_timeline(&mut self, entries: &[EntryChange]) {
        self.events.push(SurfaceEvent::Timeline(entries.len()));
    }

    fn alert(&mut self, message: &str) {
        self.events.push(SurfaceEvent::Alert(message.to_string()));
    }
}
