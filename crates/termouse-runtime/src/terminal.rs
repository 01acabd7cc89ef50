#![forbid(unsafe_code)]

//! Terminal collaborator interfaces and the crossterm-backed implementation.
//!
//! The engine never talks to a terminal directly; it drives an
//! [`InputSource`] and an [`OutputSink`]. [`TtyInput`]/[`TtyOutput`] are the
//! real stdin/stdout implementations. Tests substitute scripted sources and
//! in-memory sinks.
//!
//! # Escape Sequences Reference
//!
//! Four reporting modes are toggled together on enable/disable:
//!
//! | Feature | Enable | Disable |
//! |---------|--------|---------|
//! | Button press reporting | `CSI ? 1000 h` | `CSI ? 1000 l` |
//! | Drag reporting | `CSI ? 1002 h` | `CSI ? 1002 l` |
//! | Any-motion reporting | `CSI ? 1003 h` | `CSI ? 1003 l` |
//! | SGR extended coordinates | `CSI ? 1006 h` | `CSI ? 1006 l` |

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossterm::tty::IsTty;

/// Button press reporting on.
pub const BUTTON_REPORTING_ENABLE: &[u8] = b"\x1b[?1000h";
/// Button press reporting off.
pub const BUTTON_REPORTING_DISABLE: &[u8] = b"\x1b[?1000l";
/// Drag reporting on.
pub const DRAG_REPORTING_ENABLE: &[u8] = b"\x1b[?1002h";
/// Drag reporting off.
pub const DRAG_REPORTING_DISABLE: &[u8] = b"\x1b[?1002l";
/// Any-motion reporting on.
pub const MOTION_REPORTING_ENABLE: &[u8] = b"\x1b[?1003h";
/// Any-motion reporting off.
pub const MOTION_REPORTING_DISABLE: &[u8] = b"\x1b[?1003l";
/// SGR extended coordinate mode on.
pub const SGR_COORDINATES_ENABLE: &[u8] = b"\x1b[?1006h";
/// SGR extended coordinate mode off.
pub const SGR_COORDINATES_DISABLE: &[u8] = b"\x1b[?1006l";

/// The four enable sequences, in write order.
pub const ENABLE_SEQUENCES: [&[u8]; 4] = [
    BUTTON_REPORTING_ENABLE,
    DRAG_REPORTING_ENABLE,
    MOTION_REPORTING_ENABLE,
    SGR_COORDINATES_ENABLE,
];

/// The four disable sequences, in write order.
pub const DISABLE_SEQUENCES: [&[u8]; 4] = [
    BUTTON_REPORTING_DISABLE,
    DRAG_REPORTING_DISABLE,
    MOTION_REPORTING_DISABLE,
    SGR_COORDINATES_DISABLE,
];

/// How raw bytes from the source are turned into text chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Deliver bytes decoded as UTF-8 (lossily for invalid sequences).
    Utf8,

    /// Deliver bytes mapped one-to-one into the low range.
    #[default]
    Raw,
}

/// Callback receiving raw text chunks from an input source.
pub type RawDataFn = Box<dyn FnMut(&str) + Send>;

/// Handle identifying a raw-data subscription on a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceToken(u64);

impl SourceToken {
    /// Wrap a source-chosen identifier. Tokens are only meaningful to the
    /// source that issued them.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

/// An interactive input handle the engine can own while enabled.
pub trait InputSource: Send {
    /// Whether this source is an interactive terminal.
    fn is_interactive(&self) -> bool;

    /// Current raw-mode state, snapshotted before the engine changes it.
    fn is_raw(&self) -> bool;

    /// Current chunk encoding, snapshotted before the engine changes it.
    fn encoding(&self) -> Encoding;

    /// Switch raw mode on or off.
    fn set_raw(&mut self, raw: bool) -> io::Result<()>;

    /// Switch the chunk encoding.
    fn set_encoding(&mut self, encoding: Encoding) -> io::Result<()>;

    /// Register a raw-data callback; chunks flow until unsubscribed.
    ///
    /// Delivery must begin only after `subscribe` returns. The callback may
    /// re-enter the engine that registered it, so invoking it synchronously
    /// from inside `subscribe` deadlocks the subscribing thread. Delivering
    /// from another thread at any point after registration is fine.
    fn subscribe(&mut self, callback: RawDataFn) -> SourceToken;

    /// Remove a previously registered callback.
    fn unsubscribe(&mut self, token: SourceToken);
}

/// Where control sequences are written.
pub trait OutputSink: Send {
    /// Write the full buffer or fail.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
}

// ---------------------------------------------------------------------------
// Crossterm-backed stdin source
// ---------------------------------------------------------------------------

struct TtyInputShared {
    subscribers: Mutex<HashMap<u64, Arc<Mutex<RawDataFn>>>>,
    next_token: AtomicU64,
    reader_alive: AtomicBool,
    stop: AtomicBool,
    encoding: Mutex<Encoding>,
}

/// Stdin-backed [`InputSource`] with a background reader thread.
///
/// The reader thread starts on the first subscription and winds down after
/// the last one is removed. It is not joined on teardown; a blocked stdin
/// read cannot be interrupted, so the thread exits after its next read.
pub struct TtyInput {
    shared: Arc<TtyInputShared>,
    raw: bool,
}

impl TtyInput {
    /// Create a source over the process stdin.
    #[must_use]
    pub fn new() -> Self {
        let raw = crossterm::terminal::is_raw_mode_enabled().unwrap_or(false);
        Self {
            shared: Arc::new(TtyInputShared {
                subscribers: Mutex::new(HashMap::new()),
                next_token: AtomicU64::new(1),
                reader_alive: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                encoding: Mutex::new(Encoding::Raw),
            }),
            raw,
        }
    }

    fn spawn_reader(shared: Arc<TtyInputShared>) {
        thread::spawn(move || {
            let mut stdin = io::stdin();
            let mut buffer = [0u8; 1024];
            loop {
                if shared.stop.load(Ordering::SeqCst) {
                    break;
                }
                let read = match stdin.read(&mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                if shared.stop.load(Ordering::SeqCst) {
                    break;
                }

                let encoding = *shared.encoding.lock().expect("encoding poisoned");
                let chunk = decode_chunk(&buffer[..read], encoding);

                // Snapshot subscribers so delivery happens without holding
                // the map lock; unsubscribe during delivery must not block.
                let callbacks: Vec<_> = {
                    let subscribers =
                        shared.subscribers.lock().expect("subscriber map poisoned");
                    subscribers.values().cloned().collect()
                };
                for callback in callbacks {
                    (callback.lock().expect("raw-data callback poisoned"))(&chunk);
                }
            }
            shared.reader_alive.store(false, Ordering::SeqCst);
            tracing::debug!("stdin reader thread exited");
        });
    }
}

impl Default for TtyInput {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for TtyInput {
    fn is_interactive(&self) -> bool {
        io::stdin().is_tty()
    }

    fn is_raw(&self) -> bool {
        self.raw
    }

    fn encoding(&self) -> Encoding {
        *self.shared.encoding.lock().expect("encoding poisoned")
    }

    fn set_raw(&mut self, raw: bool) -> io::Result<()> {
        if raw {
            crossterm::terminal::enable_raw_mode()?;
        } else {
            crossterm::terminal::disable_raw_mode()?;
        }
        self.raw = raw;
        Ok(())
    }

    fn set_encoding(&mut self, encoding: Encoding) -> io::Result<()> {
        *self.shared.encoding.lock().expect("encoding poisoned") = encoding;
        Ok(())
    }

    fn subscribe(&mut self, callback: RawDataFn) -> SourceToken {
        let token = self.shared.next_token.fetch_add(1, Ordering::SeqCst);
        self.shared
            .subscribers
            .lock()
            .expect("subscriber map poisoned")
            .insert(token, Arc::new(Mutex::new(callback)));

        self.shared.stop.store(false, Ordering::SeqCst);
        if !self.shared.reader_alive.swap(true, Ordering::SeqCst) {
            Self::spawn_reader(self.shared.clone());
        }
        SourceToken(token)
    }

    fn unsubscribe(&mut self, token: SourceToken) {
        let mut subscribers = self
            .shared
            .subscribers
            .lock()
            .expect("subscriber map poisoned");
        subscribers.remove(&token.0);
        if subscribers.is_empty() {
            self.shared.stop.store(true, Ordering::SeqCst);
        }
    }
}

fn decode_chunk(bytes: &[u8], encoding: Encoding) -> String {
    match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Raw => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Stdout-backed [`OutputSink`].
#[derive(Debug, Default)]
pub struct TtyOutput;

impl TtyOutput {
    /// Create a sink over the process stdout.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl OutputSink for TtyOutput {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut stdout = io::stdout();
        stdout.write_all(bytes)?;
        stdout.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_tables_pair_up() {
        assert_eq!(ENABLE_SEQUENCES.len(), DISABLE_SEQUENCES.len());
        for (enable, disable) in ENABLE_SEQUENCES.iter().zip(DISABLE_SEQUENCES) {
            // Same mode number, opposite final byte.
            assert_eq!(enable[..enable.len() - 1], disable[..disable.len() - 1]);
            assert_eq!(*enable.last().unwrap(), b'h');
            assert_eq!(*disable.last().unwrap(), b'l');
        }
    }

    #[test]
    fn utf8_chunk_decoding_is_lossy() {
        assert_eq!(decode_chunk(b"\x1b[<0;1;1M", Encoding::Utf8), "\x1b[<0;1;1M");
        assert_eq!(decode_chunk(&[0xFF, b'a'], Encoding::Utf8), "\u{fffd}a");
    }

    #[test]
    fn raw_chunk_decoding_maps_bytes_one_to_one() {
        let chunk = decode_chunk(&[0x1B, 0xFF], Encoding::Raw);
        let chars: Vec<char> = chunk.chars().collect();
        assert_eq!(chars, vec!['\u{1b}', '\u{ff}']);
    }

    #[test]
    fn default_encoding_is_raw() {
        assert_eq!(TtyInput::new().encoding(), Encoding::Raw);
    }
}
