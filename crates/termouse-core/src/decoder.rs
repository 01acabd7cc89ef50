#![forbid(unsafe_code)]

//! Mouse escape-sequence decoder.
//!
//! Scans a chunk of terminal input for SGR and legacy X10 mouse-reporting
//! sequences and decodes them into [`MouseEvent`] values. Everything that is
//! not a recognizable mouse sequence is skipped silently: terminal input is
//! untrusted and noisy, so resilience wins over strictness here.
//!
//! # Grammars
//!
//! - SGR: `ESC [ < Cb ; Cx ; Cy (M|m)` where `Cb` is 1-3 decimal digits and
//!   `Cx`/`Cy` are 1-4 decimal digits each. `M` is the press class, `m` is a
//!   release.
//! - Legacy: `ESC [ M` followed by three raw bytes in `0x20..=0x7F`; code and
//!   coordinates are the raw byte minus 32. The printable-byte bound caps
//!   legacy coordinates at 95; the wire format can theoretically carry up to
//!   223 using high bytes, which this decoder rejects (a documented
//!   limitation — terminals emitting those positions use SGR mode anyway).
//!
//! # Bounded matching
//!
//! All matching is length-bounded: an SGR candidate is abandoned as soon as a
//! digit field overruns its width, so a hostile chunk can never make the
//! scanner walk an unbounded distance from a candidate position. A failed
//! candidate advances the scan by exactly one byte.
//!
//! # Deduplication
//!
//! The decoder remembers the exact text of the last sequence it emitted,
//! across calls. A candidate whose matched text is byte-identical to that
//! memory is dropped instead of re-emitted. This absorbs terminals that
//! repeat a report; it is a pure run-length filter on the wire text, so two
//! semantically different events with identical encodings would also be
//! deduplicated (a documented limitation).
//!
//! # Chunk boundaries
//!
//! A sequence truncated at the end of a chunk is discarded; no partial state
//! is carried to the next call. Callers that need cross-chunk sequences must
//! re-deliver complete ones.

use crate::event::{Modifiers, MouseAction, MouseButton, MouseEvent, Protocol};

/// Upper bound on an SGR match: `ESC [ <` + 3 digits + `;` + 4 digits + `;`
/// + 4 digits + terminator.
pub const SGR_MAX_MATCH: usize = 21;

/// A legacy match is always exactly six bytes.
pub const LEGACY_MATCH: usize = 6;

const SGR_BUTTON_DIGITS: usize = 3;
const SGR_COORD_DIGITS: usize = 4;

/// Decodes mouse-reporting escape sequences from input chunks.
///
/// The only state carried between calls is the run-length deduplication
/// memory; each call rescans its chunk from the start.
#[derive(Debug, Default)]
pub struct MouseDecoder {
    /// Exact text of the most recently emitted sequence.
    last_emitted: Option<String>,
}

impl MouseDecoder {
    /// Create a new decoder with empty deduplication memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every mouse sequence in `chunk`, in order.
    pub fn decode(&mut self, chunk: &str) -> Vec<MouseEvent> {
        self.decode_iter(chunk).collect()
    }

    /// Lazily decode `chunk`.
    ///
    /// The iterator is finite and borrows the decoder, so deduplication
    /// memory advances as events are pulled.
    pub fn decode_iter<'d, 'c>(&'d mut self, chunk: &'c str) -> DecodeIter<'d, 'c> {
        DecodeIter {
            decoder: self,
            chunk,
            pos: 0,
        }
    }

    /// Clear the deduplication memory.
    ///
    /// Useful when the input source is reset and a repeat of the last
    /// sequence should be treated as new.
    pub fn reset(&mut self) {
        self.last_emitted = None;
    }

    /// Try to emit the match at `start..end`, applying deduplication.
    fn emit(&mut self, chunk: &str, start: usize, end: usize, raw: RawMatch) -> Option<MouseEvent> {
        let data = &chunk[start..end];
        if self.last_emitted.as_deref() == Some(data) {
            #[cfg(feature = "tracing")]
            tracing::trace!(data, "dropping repeated mouse sequence");
            return None;
        }
        self.last_emitted = Some(data.to_owned());

        let (button, action, modifiers) = classify(raw.code, raw.explicit_release);
        Some(MouseEvent {
            button,
            action,
            x: raw.x,
            y: raw.y,
            modifiers,
            raw: raw.code,
            data: data.to_owned(),
            protocol: raw.protocol,
        })
    }
}

/// Lazy decoding iterator returned by [`MouseDecoder::decode_iter`].
#[derive(Debug)]
pub struct DecodeIter<'d, 'c> {
    decoder: &'d mut MouseDecoder,
    chunk: &'c str,
    pos: usize,
}

impl Iterator for DecodeIter<'_, '_> {
    type Item = MouseEvent;

    fn next(&mut self) -> Option<MouseEvent> {
        let bytes = self.chunk.as_bytes();
        while self.pos + 1 < bytes.len() {
            if bytes[self.pos] != 0x1B || bytes[self.pos + 1] != b'[' {
                self.pos += 1;
                continue;
            }

            let candidate = match bytes.get(self.pos + 2) {
                Some(b'<') => match_sgr(bytes, self.pos),
                Some(b'M') => match_legacy(bytes, self.pos),
                _ => None,
            };

            let Some((raw, end)) = candidate else {
                // Not a mouse sequence at this position; skip one byte and
                // keep scanning. This also steps over unrelated CSI input.
                self.pos += 1;
                continue;
            };

            let start = self.pos;
            self.pos = end;
            if let Some(event) = self.decoder.emit(self.chunk, start, end, raw) {
                return Some(event);
            }
        }
        None
    }
}

/// Fields pulled off the wire before button classification.
#[derive(Debug, Clone, Copy)]
struct RawMatch {
    code: u16,
    x: u16,
    y: u16,
    explicit_release: bool,
    protocol: Protocol,
}

/// Match an SGR sequence starting at `pos` (which holds `ESC [ <`).
///
/// Returns the decoded fields and the exclusive end offset of the match.
fn match_sgr(bytes: &[u8], pos: usize) -> Option<(RawMatch, usize)> {
    let i = pos + 3;
    let (code, i) = take_digits(bytes, i, SGR_BUTTON_DIGITS)?;
    let i = expect(bytes, i, b';')?;
    let (x, i) = take_digits(bytes, i, SGR_COORD_DIGITS)?;
    let i = expect(bytes, i, b';')?;
    let (y, i) = take_digits(bytes, i, SGR_COORD_DIGITS)?;
    let terminator = *bytes.get(i)?;
    if terminator != b'M' && terminator != b'm' {
        return None;
    }

    let end = i + 1;
    debug_assert!(end - pos <= SGR_MAX_MATCH);
    Some((
        RawMatch {
            code,
            x,
            y,
            explicit_release: terminator == b'm',
            protocol: Protocol::Sgr,
        },
        end,
    ))
}

/// Match a legacy sequence starting at `pos` (which holds `ESC [ M`).
///
/// The three payload bytes must all be printable (`0x20..=0x7F`); anything
/// else fails the match. There is no release terminator in this grammar, so
/// releases are inferred from button code 3 during classification.
fn match_legacy(bytes: &[u8], pos: usize) -> Option<(RawMatch, usize)> {
    let end = pos + LEGACY_MATCH;
    if end > bytes.len() {
        return None;
    }
    let payload = &bytes[pos + 3..end];
    if payload.iter().any(|&b| !(0x20..=0x7F).contains(&b)) {
        return None;
    }

    Some((
        RawMatch {
            code: u16::from(payload[0] - 0x20),
            x: u16::from(payload[1] - 0x20),
            y: u16::from(payload[2] - 0x20),
            explicit_release: false,
            protocol: Protocol::Legacy,
        },
        end,
    ))
}

/// Read 1 to `max` decimal digits at `i`.
///
/// Fails when there is no digit, or when the field keeps going past `max`
/// digits (the bound that keeps matching cost constant per candidate).
fn take_digits(bytes: &[u8], i: usize, max: usize) -> Option<(u16, usize)> {
    let start = i;
    let mut i = i;
    let mut value: u32 = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() && i - start < max {
        value = value * 10 + u32::from(bytes[i] - b'0');
        i += 1;
    }
    if i == start {
        return None;
    }
    if i < bytes.len() && bytes[i].is_ascii_digit() {
        return None;
    }
    // Bounded digit counts keep the value within u16 (max 9999).
    Some((value as u16, i))
}

fn expect(bytes: &[u8], i: usize, byte: u8) -> Option<usize> {
    (*bytes.get(i)? == byte).then_some(i + 1)
}

/// Map a button code and terminator class to button, action, and modifiers.
///
/// Bit layout (shared by both grammars): low two bits select the button
/// (3 = release class), 0x04/0x08/0x10 are shift/alt/ctrl, 0x20 is motion,
/// 0x40 flags wheel codes. Codes 128 and 129 sit outside the bit scheme.
fn classify(code: u16, explicit_release: bool) -> (MouseButton, MouseAction, Modifiers) {
    let mut modifiers = Modifiers::NONE;
    if code & 0x04 != 0 {
        modifiers |= Modifiers::SHIFT;
    }
    if code & 0x08 != 0 {
        modifiers |= Modifiers::ALT;
    }
    if code & 0x10 != 0 {
        modifiers |= Modifiers::CTRL;
    }

    if code == 128 || code == 129 {
        let button = if code == 128 {
            MouseButton::Back
        } else {
            MouseButton::Forward
        };
        let action = if explicit_release {
            MouseAction::Release
        } else {
            MouseAction::Press
        };
        return (button, action, Modifiers::NONE);
    }

    if code & 0x40 != 0 {
        // Strip modifier bits before matching the wheel direction codes.
        let button = match code & !0x1C {
            64 => MouseButton::WheelUp,
            65 => MouseButton::WheelDown,
            66 => MouseButton::WheelLeft,
            67 => MouseButton::WheelRight,
            _ => MouseButton::Unknown,
        };
        let action = if explicit_release {
            MouseAction::Release
        } else {
            MouseAction::Wheel
        };
        return (button, action, modifiers);
    }

    let motion = code & 0x20 != 0;
    let button = match code & 0b11 {
        0 => MouseButton::Left,
        1 => MouseButton::Middle,
        2 => MouseButton::Right,
        _ => MouseButton::None,
    };

    let action = if explicit_release {
        MouseAction::Release
    } else if button == MouseButton::None {
        // Release-class code: with the motion bit this is a hover move,
        // without it a legacy-style release.
        if motion {
            MouseAction::Move
        } else {
            MouseAction::Release
        }
    } else if motion {
        MouseAction::Drag
    } else {
        MouseAction::Press
    };

    (button, action, modifiers)
}
