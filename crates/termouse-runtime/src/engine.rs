#![forbid(unsafe_code)]

//! Mouse tracking engine.
//!
//! [`MouseEngine`] owns the lifecycle against one terminal handle: it drives
//! the terminal into and out of mouse-reporting mode, decodes incoming
//! chunks, synthesizes `Click` events from press/release pairs, and
//! publishes everything to subscribers.
//!
//! # Lifecycle
//!
//! `enabled` and `paused` are independent flags; every combination is legal
//! and each survives toggles of the other. `destroyed` is terminal: it
//! forces `enabled` off and turns later `enable()` calls into no-ops.
//!
//! - `enable()` checks interactivity, snapshots the source's raw/encoding
//!   state, writes the four reporting-enable sequences, switches the source
//!   to raw UTF-8 chunks, and subscribes to its raw data. Any failure rolls
//!   back to disabled.
//! - `disable()` unsubscribes, restores the snapshot, and writes the four
//!   disable sequences; a write failure is reported but the engine is still
//!   forced to disabled.
//! - `pause()`/`resume()` are pure flag flips with zero I/O. While paused,
//!   decoded events are discarded on arrival and take any pending press with
//!   them, so a press/release pair straddling a pause never becomes a click.
//!
//! # Click synthesis
//!
//! At most one press is pending at a time (a new press overwrites it). A
//! release within `click_threshold` of the pending press synthesizes a
//! `Click` carrying the release's position and button, published one
//! scheduling turn after the release so subscribers always observe the
//! release first.
//!
//! # Dispatch isolation
//!
//! A panicking subscriber callback is caught and republished on the error
//! channel; it cannot corrupt lifecycle flags or the pending press.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, Weak};

use termouse_core::decoder::MouseDecoder;
use termouse_core::error::{MouseError, Result};
use termouse_core::event::{MouseAction, MouseButton, MouseEvent};

use crate::terminal::{
    DISABLE_SEQUENCES, ENABLE_SEQUENCES, Encoding, InputSource, OutputSink, SourceToken, TtyInput,
    TtyOutput,
};

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum Chebyshev distance between press and release for the pair to
    /// count as a click.
    pub click_threshold: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { click_threshold: 1 }
    }
}

/// Identifies a registered handler for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type EventHandler = Arc<dyn Fn(&MouseEvent) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&MouseError) + Send + Sync>;

#[derive(Default)]
struct HandlerTable {
    next_id: u64,
    by_kind: HashMap<MouseAction, Vec<(HandlerId, EventHandler)>>,
    all: Vec<(HandlerId, EventHandler)>,
    errors: Vec<(HandlerId, ErrorHandler)>,
}

impl HandlerTable {
    fn allocate(&mut self) -> HandlerId {
        self.next_id += 1;
        HandlerId(self.next_id)
    }
}

/// The single outstanding press awaiting its release.
#[derive(Debug, Clone, Copy)]
struct PendingPress {
    button: MouseButton,
    x: u16,
    y: u16,
}

/// Raw/encoding state observed at enable time, restored on disable.
#[derive(Debug, Clone, Copy)]
struct SourceSnapshot {
    raw: bool,
    encoding: Encoding,
}

struct EngineInner {
    config: EngineConfig,
    input: Box<dyn InputSource>,
    output: Box<dyn OutputSink>,
    decoder: MouseDecoder,
    enabled: bool,
    paused: bool,
    destroyed: bool,
    pending_press: Option<PendingPress>,
    snapshot: Option<SourceSnapshot>,
    source_token: Option<SourceToken>,
}

pub(crate) struct EngineShared {
    inner: Mutex<EngineInner>,
    handlers: Mutex<HandlerTable>,
}

/// Cheaply cloneable handle to one mouse tracking engine.
///
/// All clones refer to the same lifecycle state and subscriber table; the
/// terminal handle is exclusively owned by this engine while enabled.
#[derive(Clone)]
pub struct MouseEngine {
    shared: Arc<EngineShared>,
}

impl MouseEngine {
    /// Create an engine with the default configuration.
    #[must_use]
    pub fn new(input: Box<dyn InputSource>, output: Box<dyn OutputSink>) -> Self {
        Self::with_config(EngineConfig::default(), input, output)
    }

    /// Create an engine with an explicit configuration.
    #[must_use]
    pub fn with_config(
        config: EngineConfig,
        input: Box<dyn InputSource>,
        output: Box<dyn OutputSink>,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                inner: Mutex::new(EngineInner {
                    config,
                    input,
                    output,
                    decoder: MouseDecoder::new(),
                    enabled: false,
                    paused: false,
                    destroyed: false,
                    pending_press: None,
                    snapshot: None,
                    source_token: None,
                }),
                handlers: Mutex::new(HandlerTable::default()),
            }),
        }
    }

    /// Create an engine over the process stdin/stdout.
    #[must_use]
    pub fn stdio(config: EngineConfig) -> Self {
        Self::with_config(config, Box::new(TtyInput::new()), Box::new(TtyOutput::new()))
    }

    /// Switch the terminal into mouse-reporting mode.
    ///
    /// No-op when already enabled or destroyed. `paused` is untouched either
    /// way.
    ///
    /// # Errors
    ///
    /// [`MouseError::Configuration`] when the input source is not an
    /// interactive terminal (state unchanged), or [`MouseError::Io`] when
    /// writing the control sequences or switching modes fails (rolled back
    /// to disabled).
    pub fn enable(&self) -> Result<()> {
        let mut inner = self.lock_inner();
        if inner.enabled || inner.destroyed {
            return Ok(());
        }
        if !inner.input.is_interactive() {
            return Err(MouseError::Configuration(String::from(
                "input source is not an interactive terminal",
            )));
        }

        let snapshot = SourceSnapshot {
            raw: inner.input.is_raw(),
            encoding: inner.input.encoding(),
        };

        for sequence in ENABLE_SEQUENCES {
            if let Err(source) = inner.output.write(sequence) {
                rollback_enable(&mut inner, snapshot);
                return Err(MouseError::io(
                    "write mouse tracking enable sequence",
                    source,
                ));
            }
        }
        if let Err(source) = inner.input.set_raw(true) {
            rollback_enable(&mut inner, snapshot);
            return Err(MouseError::io("switch input source to raw mode", source));
        }
        if let Err(source) = inner.input.set_encoding(Encoding::Utf8) {
            rollback_enable(&mut inner, snapshot);
            return Err(MouseError::io(
                "switch input source to UTF-8 decoding",
                source,
            ));
        }

        let weak = Arc::downgrade(&self.shared);
        let token = inner.input.subscribe(Box::new(move |chunk| {
            if let Some(shared) = Weak::upgrade(&weak) {
                EngineShared::ingest(&shared, chunk);
            }
        }));

        inner.snapshot = Some(snapshot);
        inner.source_token = Some(token);
        inner.enabled = true;
        tracing::info!("mouse tracking enabled");
        Ok(())
    }

    /// Switch the terminal out of mouse-reporting mode.
    ///
    /// No-op when not enabled. `paused` is preserved across
    /// disable/enable cycles.
    ///
    /// # Errors
    ///
    /// [`MouseError::Io`] when restoring modes or writing the disable
    /// sequences fails; the engine is still forced to disabled.
    pub fn disable(&self) -> Result<()> {
        let mut inner = self.lock_inner();
        if !inner.enabled {
            return Ok(());
        }

        if let Some(token) = inner.source_token.take() {
            inner.input.unsubscribe(token);
        }

        let mut first_failure: Option<MouseError> = None;
        if let Some(snapshot) = inner.snapshot.take() {
            if let Err(source) = inner.input.set_raw(snapshot.raw) {
                first_failure
                    .get_or_insert(MouseError::io("restore input source raw mode", source));
            }
            if let Err(source) = inner.input.set_encoding(snapshot.encoding) {
                first_failure
                    .get_or_insert(MouseError::io("restore input source encoding", source));
            }
        }
        for sequence in DISABLE_SEQUENCES {
            if let Err(source) = inner.output.write(sequence) {
                first_failure.get_or_insert(MouseError::io(
                    "write mouse tracking disable sequence",
                    source,
                ));
            }
        }

        inner.enabled = false;
        inner.pending_press = None;
        tracing::info!("mouse tracking disabled");
        match first_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Stop delivering events without touching the terminal.
    ///
    /// Idempotent, zero I/O, independent of `enabled`. Events arriving while
    /// paused are discarded, not buffered.
    pub fn pause(&self) {
        let mut inner = self.lock_inner();
        if !inner.paused {
            inner.paused = true;
            tracing::debug!("mouse events paused");
        }
    }

    /// Resume delivering events. Idempotent, zero I/O.
    pub fn resume(&self) {
        let mut inner = self.lock_inner();
        if inner.paused {
            inner.paused = false;
            tracing::debug!("mouse events resumed");
        }
    }

    /// Disable and permanently forbid re-enabling. Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates the [`MouseError::Io`] from the underlying `disable()`;
    /// the engine is destroyed regardless.
    pub fn destroy(&self) -> Result<()> {
        if self.lock_inner().destroyed {
            return Ok(());
        }
        let result = self.disable();
        let mut inner = self.lock_inner();
        inner.destroyed = true;
        inner.pending_press = None;
        tracing::info!("mouse engine destroyed");
        result
    }

    /// Whether mouse reporting is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.lock_inner().enabled
    }

    /// Whether event delivery is currently paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.lock_inner().paused
    }

    /// Register a handler for one event kind.
    pub fn on(
        &self,
        kind: MouseAction,
        handler: impl Fn(&MouseEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        let mut table = self.lock_handlers();
        let id = table.allocate();
        table
            .by_kind
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler registered with [`on`](Self::on).
    pub fn off(&self, kind: MouseAction, id: HandlerId) {
        let mut table = self.lock_handlers();
        if let Some(handlers) = table.by_kind.get_mut(&kind) {
            handlers.retain(|(handler_id, _)| *handler_id != id);
        }
    }

    /// Register a handler receiving every event kind.
    pub fn on_all(&self, handler: impl Fn(&MouseEvent) + Send + Sync + 'static) -> HandlerId {
        let mut table = self.lock_handlers();
        let id = table.allocate();
        table.all.push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler registered with [`on_all`](Self::on_all).
    pub fn off_all(&self, id: HandlerId) {
        self.lock_handlers()
            .all
            .retain(|(handler_id, _)| *handler_id != id);
    }

    /// Register a handler for the asynchronous error channel.
    pub fn on_error(&self, handler: impl Fn(&MouseError) + Send + Sync + 'static) -> HandlerId {
        let mut table = self.lock_handlers();
        let id = table.allocate();
        table.errors.push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler registered with [`on_error`](Self::on_error).
    pub fn off_error(&self, id: HandlerId) {
        self.lock_handlers()
            .errors
            .retain(|(handler_id, _)| *handler_id != id);
    }

    /// Number of registered event handlers (per-kind plus all-kind).
    ///
    /// Diagnostic; used to verify streams detach their subscriptions.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        let table = self.lock_handlers();
        table.by_kind.values().map(Vec::len).sum::<usize>() + table.all.len()
    }

    /// Feed a chunk of raw input text through the decoder and dispatch.
    ///
    /// This is the same entry point the input-source subscription uses;
    /// chunks are ignored unless the engine is enabled.
    pub fn feed(&self, chunk: &str) {
        EngineShared::ingest(&self.shared, chunk);
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, EngineInner> {
        self.shared.inner.lock().expect("engine state poisoned")
    }

    fn lock_handlers(&self) -> std::sync::MutexGuard<'_, HandlerTable> {
        self.shared.handlers.lock().expect("handler table poisoned")
    }
}

impl EngineShared {
    /// Decode a chunk and publish its events in decode order.
    ///
    /// The state lock is released around every handler invocation, so
    /// handlers may call back into the engine (pause, off, disable) without
    /// deadlocking; a pause taking effect mid-chunk discards the remainder
    /// of the chunk's events as they arrive.
    fn ingest(shared: &Arc<EngineShared>, chunk: &str) {
        let decoded = {
            let mut inner = shared.inner.lock().expect("engine state poisoned");
            if !inner.enabled || inner.destroyed {
                return;
            }
            inner.decoder.decode(chunk)
        };
        if decoded.is_empty() {
            return;
        }

        let mut deferred: Vec<MouseEvent> = Vec::new();
        for event in decoded {
            {
                let mut inner = shared.inner.lock().expect("engine state poisoned");
                if !inner.enabled || inner.destroyed {
                    return;
                }
                if inner.paused {
                    // Discarded on arrival; the pending press goes with it so
                    // a release after resume cannot pair with a stale press.
                    inner.pending_press = None;
                    continue;
                }
                match event.action {
                    MouseAction::Press => {
                        inner.pending_press = Some(PendingPress {
                            button: event.button,
                            x: event.x,
                            y: event.y,
                        });
                    }
                    MouseAction::Release => {
                        if let Some(pending) = inner.pending_press.take() {
                            let dx = event.x.abs_diff(pending.x);
                            let dy = event.y.abs_diff(pending.y);
                            if dx.max(dy) <= inner.config.click_threshold {
                                tracing::trace!(
                                    button = ?pending.button,
                                    dx,
                                    dy,
                                    "release matched pending press, synthesizing click"
                                );
                                deferred.push(synthesize_click(&event));
                            }
                        }
                    }
                    _ => {}
                }
            }
            Self::dispatch(shared, &event);
        }

        // Synthesized clicks publish one turn after the batch so the
        // triggering release is always observed first.
        for click in deferred {
            {
                let inner = shared.inner.lock().expect("engine state poisoned");
                if !inner.enabled || inner.destroyed {
                    return;
                }
                if inner.paused {
                    continue;
                }
            }
            Self::dispatch(shared, &click);
        }
    }

    fn dispatch(shared: &Arc<EngineShared>, event: &MouseEvent) {
        let handlers: Vec<EventHandler> = {
            let table = shared.handlers.lock().expect("handler table poisoned");
            table
                .by_kind
                .get(&event.action)
                .into_iter()
                .flatten()
                .map(|(_, handler)| handler.clone())
                .chain(table.all.iter().map(|(_, handler)| handler.clone()))
                .collect()
        };
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                tracing::warn!(
                    action = ?event.action,
                    "event handler panicked, rerouting to error channel"
                );
                Self::publish_error(
                    shared,
                    &MouseError::Stream(String::from("event handler panicked")),
                );
            }
        }
    }

    fn publish_error(shared: &Arc<EngineShared>, error: &MouseError) {
        let handlers: Vec<ErrorHandler> = {
            let table = shared.handlers.lock().expect("handler table poisoned");
            table
                .errors
                .iter()
                .map(|(_, handler)| handler.clone())
                .collect()
        };
        for handler in handlers {
            // An error handler panicking has nowhere further to report.
            let _ = catch_unwind(AssertUnwindSafe(|| handler(error)));
        }
    }
}

fn rollback_enable(inner: &mut EngineInner, snapshot: SourceSnapshot) {
    let _ = inner.input.set_raw(snapshot.raw);
    let _ = inner.input.set_encoding(snapshot.encoding);
    for sequence in DISABLE_SEQUENCES {
        let _ = inner.output.write(sequence);
    }
}

/// Build the click event published after a matching release.
fn synthesize_click(release: &MouseEvent) -> MouseEvent {
    let mut click = release.clone();
    click.action = MouseAction::Click;
    click
}
