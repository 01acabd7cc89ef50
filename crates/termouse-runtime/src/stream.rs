#![forbid(unsafe_code)]

//! Cancellable pull streams over engine subscriptions.
//!
//! An [`EventStream`] bridges the engine's push dispatch into a blocking
//! pull loop. Events arriving while a consumer is suspended in
//! [`next`](EventStream::next) are handed off directly; events arriving
//! while no pull is outstanding are buffered under a [`BufferPolicy`].
//!
//! # Termination
//!
//! `next()` returns `Ok(None)` once the stream is closed and drained,
//! `Err(_)` when an engine error or cancellation preempts it. Errors and
//! cancellation both close the stream; closing detaches every handler the
//! stream registered on the engine, as does dropping the stream.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, Weak};

use termouse_core::error::MouseError;
use termouse_core::event::{MouseAction, MouseEvent};

use crate::cancel::CancelToken;
use crate::engine::{HandlerId, MouseEngine};

/// Default bounded queue capacity for a stream with no explicit policy.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Hard ceiling on the bounded queue capacity.
pub const MAX_QUEUE_CAPACITY: usize = 4096;

/// What happens to events that arrive while no pull is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPolicy {
    /// Keep up to this many events; on overflow the oldest is dropped.
    /// Capacities are clamped to `1..=MAX_QUEUE_CAPACITY`.
    Bounded(usize),

    /// Keep only the most recent event.
    LatestOnly,
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self::Bounded(DEFAULT_QUEUE_CAPACITY)
    }
}

impl BufferPolicy {
    fn clamped(self) -> Self {
        match self {
            Self::Bounded(capacity) => Self::Bounded(capacity.clamp(1, MAX_QUEUE_CAPACITY)),
            Self::LatestOnly => Self::LatestOnly,
        }
    }
}

/// Per-stream subscription options.
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    /// Buffering behavior between pulls.
    pub policy: BufferPolicy,

    /// Optional token that aborts the stream when signalled.
    pub cancel: Option<CancelToken>,
}

struct StreamState {
    /// Bounded FIFO of events awaiting a pull.
    queue: VecDeque<MouseEvent>,
    /// Single slot used by `BufferPolicy::LatestOnly`.
    latest: Option<MouseEvent>,
    /// Direct handoff slot filled only while a pull is suspended.
    handoff: Option<MouseEvent>,
    /// Engine errors awaiting delivery; drained before any event.
    errors: VecDeque<MouseError>,
    waiting: bool,
    closed: bool,
    cancelled: bool,
}

struct StreamShared {
    state: Mutex<StreamState>,
    cond: Condvar,
}

impl StreamShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(StreamState {
                queue: VecDeque::new(),
                latest: None,
                handoff: None,
                errors: VecDeque::new(),
                waiting: false,
                closed: false,
                cancelled: false,
            }),
            cond: Condvar::new(),
        })
    }

    fn push_event(&self, event: &MouseEvent, policy: BufferPolicy) {
        let mut state = self.state.lock().expect("stream state poisoned");
        if state.closed || state.cancelled {
            return;
        }
        if state.waiting && state.handoff.is_none() {
            state.handoff = Some(event.clone());
            self.cond.notify_one();
            return;
        }
        match policy {
            BufferPolicy::Bounded(capacity) => {
                if state.queue.len() >= capacity {
                    state.queue.pop_front();
                    tracing::trace!("stream queue full, dropped oldest event");
                }
                state.queue.push_back(event.clone());
            }
            BufferPolicy::LatestOnly => {
                state.latest = Some(event.clone());
            }
        }
        self.cond.notify_one();
    }

    fn push_error(&self, error: &MouseError) {
        let mut state = self.state.lock().expect("stream state poisoned");
        if state.closed {
            return;
        }
        state.errors.push_back(duplicate_error(error));
        self.cond.notify_all();
    }

    fn mark_cancelled(&self) {
        let mut state = self.state.lock().expect("stream state poisoned");
        state.cancelled = true;
        self.cond.notify_all();
    }
}

/// [`MouseError`] holds an `io::Error` and cannot be `Clone`; streams carry
/// a faithful copy instead, flattening I/O errors into their message.
fn duplicate_error(error: &MouseError) -> MouseError {
    match error {
        MouseError::Configuration(message) => MouseError::Configuration(message.clone()),
        MouseError::Stream(message) => MouseError::Stream(message.clone()),
        MouseError::Cancelled => MouseError::Cancelled,
        other => MouseError::Stream(other.to_string()),
    }
}

enum Registration {
    Kind(MouseAction, HandlerId),
    All(HandlerId),
    Error(HandlerId),
}

/// A blocking pull stream of mouse events from one engine subscription.
///
/// Created by [`MouseEngine::subscribe`] or [`MouseEngine::subscribe_all`].
pub struct EventStream {
    shared: Arc<StreamShared>,
    engine: MouseEngine,
    registrations: Vec<Registration>,
}

impl EventStream {
    fn attach(engine: &MouseEngine, kind: Option<MouseAction>, options: StreamOptions) -> Self {
        let shared = StreamShared::new();
        let policy = options.policy.clamped();
        let mut registrations = Vec::with_capacity(2);

        let event_target = shared.clone();
        let event_handler = move |event: &MouseEvent| event_target.push_event(event, policy);
        match kind {
            Some(kind) => {
                registrations.push(Registration::Kind(kind, engine.on(kind, event_handler)));
            }
            None => registrations.push(Registration::All(engine.on_all(event_handler))),
        }

        let error_target = shared.clone();
        registrations.push(Registration::Error(
            engine.on_error(move |error| error_target.push_error(error)),
        ));

        if let Some(token) = options.cancel {
            let cancel_target = Arc::downgrade(&shared);
            token.watch(Box::new(move || {
                if let Some(shared) = Weak::upgrade(&cancel_target) {
                    shared.mark_cancelled();
                }
            }));
        }

        Self {
            shared,
            engine: engine.clone(),
            registrations,
        }
    }

    /// Pull the next event, blocking while none is available.
    ///
    /// Returns `Ok(None)` once the stream is closed and its buffers are
    /// drained. Buffered events still pending at close time are delivered
    /// before the `None`.
    ///
    /// # Errors
    ///
    /// [`MouseError::Cancelled`] when the stream's cancellation token fires,
    /// or the pending engine error when one was published. Either closes the
    /// stream and detaches its engine subscriptions; pending errors preempt
    /// pending events.
    pub fn next(&mut self) -> Result<Option<MouseEvent>, MouseError> {
        loop {
            let mut state = self.shared.state.lock().expect("stream state poisoned");
            if state.cancelled {
                state.closed = true;
                drop(state);
                self.detach();
                return Err(MouseError::Cancelled);
            }
            if let Some(error) = state.errors.pop_front() {
                state.closed = true;
                drop(state);
                self.detach();
                return Err(error);
            }
            if let Some(event) = state.handoff.take() {
                return Ok(Some(event));
            }
            if let Some(event) = state.latest.take() {
                return Ok(Some(event));
            }
            if let Some(event) = state.queue.pop_front() {
                return Ok(Some(event));
            }
            if state.closed {
                return Ok(None);
            }
            state.waiting = true;
            let mut state = self
                .shared
                .cond
                .wait(state)
                .expect("stream state poisoned");
            state.waiting = false;
        }
    }

    /// Close the stream and detach its engine subscriptions.
    ///
    /// Idempotent. Events already buffered remain pullable; later pulls
    /// drain them and then return `Ok(None)`.
    pub fn close(&mut self) {
        self.detach();
        let mut state = self.shared.state.lock().expect("stream state poisoned");
        if !state.closed {
            state.closed = true;
            self.shared.cond.notify_all();
            tracing::debug!("event stream closed");
        }
    }

    fn detach(&mut self) {
        for registration in self.registrations.drain(..) {
            match registration {
                Registration::Kind(kind, id) => self.engine.off(kind, id),
                Registration::All(id) => self.engine.off_all(id),
                Registration::Error(id) => self.engine.off_error(id),
            }
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock().expect("stream state poisoned");
        f.debug_struct("EventStream")
            .field("buffered", &state.queue.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl MouseEngine {
    /// Open a pull stream over one event kind with default options.
    #[must_use]
    pub fn subscribe(&self, kind: MouseAction) -> EventStream {
        self.subscribe_with(kind, StreamOptions::default())
    }

    /// Open a pull stream over one event kind.
    #[must_use]
    pub fn subscribe_with(&self, kind: MouseAction, options: StreamOptions) -> EventStream {
        EventStream::attach(self, Some(kind), options)
    }

    /// Open a pull stream over every event kind with default options.
    #[must_use]
    pub fn subscribe_all(&self) -> EventStream {
        self.subscribe_all_with(StreamOptions::default())
    }

    /// Open a pull stream over every event kind.
    #[must_use]
    pub fn subscribe_all_with(&self, options: StreamOptions) -> EventStream {
        EventStream::attach(self, None, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::{Encoding, InputSource, OutputSink, RawDataFn, SourceToken};
    use std::io;
    use std::thread;
    use std::time::Duration;

    /// Always-interactive source that records nothing; tests drive input
    /// through [`MouseEngine::feed`].
    struct NullSource {
        raw: bool,
        encoding: Encoding,
    }

    impl NullSource {
        fn new() -> Self {
            Self {
                raw: false,
                encoding: Encoding::Raw,
            }
        }
    }

    impl InputSource for NullSource {
        fn is_interactive(&self) -> bool {
            true
        }

        fn is_raw(&self) -> bool {
            self.raw
        }

        fn encoding(&self) -> Encoding {
            self.encoding
        }

        fn set_raw(&mut self, raw: bool) -> io::Result<()> {
            self.raw = raw;
            Ok(())
        }

        fn set_encoding(&mut self, encoding: Encoding) -> io::Result<()> {
            self.encoding = encoding;
            Ok(())
        }

        fn subscribe(&mut self, _callback: RawDataFn) -> SourceToken {
            SourceToken::new(0)
        }

        fn unsubscribe(&mut self, _token: SourceToken) {}
    }

    struct NullSink;

    impl OutputSink for NullSink {
        fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
            Ok(())
        }
    }

    fn enabled_engine() -> MouseEngine {
        let engine = MouseEngine::new(Box::new(NullSource::new()), Box::new(NullSink));
        engine.enable().unwrap();
        engine
    }

    fn press(x: u16, y: u16) -> String {
        format!("\x1b[<0;{x};{y}M")
    }

    #[test]
    fn pull_receives_dispatched_events() {
        let engine = enabled_engine();
        let mut stream = engine.subscribe(MouseAction::Press);

        engine.feed(&press(3, 4));
        let event = stream.next().unwrap().unwrap();
        assert_eq!(event.action, MouseAction::Press);
        assert_eq!(event.position(), (3, 4));
    }

    #[test]
    fn suspended_pull_wakes_on_direct_handoff() {
        let engine = enabled_engine();
        let mut stream = engine.subscribe(MouseAction::Press);

        let feeder = engine.clone();
        let handle = thread::spawn(move || {
            // Give the puller a moment to suspend before feeding.
            thread::sleep(Duration::from_millis(50));
            feeder.feed(&press(7, 8));
        });

        let event = stream.next().unwrap().unwrap();
        assert_eq!(event.position(), (7, 8));
        handle.join().unwrap();
    }

    #[test]
    fn bounded_queue_drops_oldest_on_overflow() {
        let engine = enabled_engine();
        let mut stream = engine.subscribe_with(
            MouseAction::Press,
            StreamOptions {
                policy: BufferPolicy::Bounded(2),
                cancel: None,
            },
        );

        for x in 1..=4 {
            engine.feed(&press(x, 1));
        }
        stream.close();

        assert_eq!(stream.next().unwrap().unwrap().position(), (3, 1));
        assert_eq!(stream.next().unwrap().unwrap().position(), (4, 1));
        assert!(stream.next().unwrap().is_none());
    }

    #[test]
    fn bounded_capacity_is_clamped_to_ceiling() {
        assert_eq!(
            BufferPolicy::Bounded(usize::MAX).clamped(),
            BufferPolicy::Bounded(MAX_QUEUE_CAPACITY)
        );
        assert_eq!(BufferPolicy::Bounded(0).clamped(), BufferPolicy::Bounded(1));
    }

    #[test]
    fn latest_only_keeps_newest_event() {
        let engine = enabled_engine();
        let mut stream = engine.subscribe_with(
            MouseAction::Press,
            StreamOptions {
                policy: BufferPolicy::LatestOnly,
                cancel: None,
            },
        );

        for x in 1..=3 {
            engine.feed(&press(x, 9));
        }
        stream.close();

        assert_eq!(stream.next().unwrap().unwrap().position(), (3, 9));
        assert!(stream.next().unwrap().is_none());
    }

    #[test]
    fn pending_error_preempts_buffered_events() {
        let engine = enabled_engine();
        let mut stream = engine.subscribe(MouseAction::Press);
        // Registered after the stream, so the stream sees the event first
        // and the panic turns into an error on the channel afterwards.
        engine.on(MouseAction::Press, |_| panic!("subscriber bug"));

        engine.feed(&press(1, 1));

        let err = stream.next().unwrap_err();
        assert!(matches!(err, MouseError::Stream(_)));
        // The error closed the stream even though an event was buffered.
        assert_eq!(engine.listener_count(), 1); // only the panicking handler
    }

    #[test]
    fn already_cancelled_token_fails_first_pull() {
        let engine = enabled_engine();
        let token = CancelToken::new();
        token.cancel();

        let mut stream = engine.subscribe_with(
            MouseAction::Press,
            StreamOptions {
                policy: BufferPolicy::default(),
                cancel: Some(token),
            },
        );

        let err = stream.next().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(engine.listener_count(), 0);
    }

    #[test]
    fn cancellation_wakes_suspended_pull() {
        let engine = enabled_engine();
        let token = CancelToken::new();
        let mut stream = engine.subscribe_with(
            MouseAction::Press,
            StreamOptions {
                policy: BufferPolicy::default(),
                cancel: Some(token.clone()),
            },
        );

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            token.cancel();
        });

        let err = stream.next().unwrap_err();
        assert!(err.is_cancelled());
        handle.join().unwrap();
    }

    #[test]
    fn close_detaches_engine_subscriptions() {
        let engine = enabled_engine();
        let mut stream = engine.subscribe(MouseAction::Press);
        assert_eq!(engine.listener_count(), 1);

        stream.close();
        assert_eq!(engine.listener_count(), 0);

        // Events after close never reach the stream.
        engine.feed(&press(1, 1));
        assert!(stream.next().unwrap().is_none());
    }

    #[test]
    fn drop_detaches_engine_subscriptions() {
        let engine = enabled_engine();
        {
            let _stream = engine.subscribe_all();
            assert_eq!(engine.listener_count(), 1);
        }
        assert_eq!(engine.listener_count(), 0);
    }

    #[test]
    fn subscribe_all_sees_every_kind() {
        let engine = enabled_engine();
        let mut stream = engine.subscribe_all();

        engine.feed("\x1b[<0;1;1M\x1b[<35;2;2M");
        stream.close();

        assert_eq!(stream.next().unwrap().unwrap().action, MouseAction::Press);
        assert_eq!(stream.next().unwrap().unwrap().action, MouseAction::Move);
        assert!(stream.next().unwrap().is_none());
    }
}
