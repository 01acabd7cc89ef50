#![forbid(unsafe_code)]

//! Canonical mouse event types.
//!
//! This module defines the event vocabulary used throughout termouse. All
//! events derive `Clone`, `PartialEq`, and `Eq` for use in tests and pattern
//! matching.
//!
//! # Design Notes
//!
//! - Coordinates are carried exactly as reported by the terminal (SGR
//!   coordinates are 1-indexed on most terminals; termouse does not rebase
//!   them).
//! - `Modifiers` use bitflags for easy combination.
//! - `data` holds the exact escape-sequence text the event was decoded from;
//!   it feeds the decoder's run-length deduplication and is useful for
//!   diagnostics.

use bitflags::bitflags;

/// The mouse button reported by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// No button (motion without a held button, or a bare release).
    None,

    /// Left mouse button.
    Left,

    /// Middle mouse button (scroll wheel click).
    Middle,

    /// Right mouse button.
    Right,

    /// Wheel scrolled up.
    WheelUp,

    /// Wheel scrolled down.
    WheelDown,

    /// Wheel tilted left (horizontal scroll).
    WheelLeft,

    /// Wheel tilted right (horizontal scroll).
    WheelRight,

    /// Back navigation button (button 8).
    Back,

    /// Forward navigation button (button 9).
    Forward,

    /// A button code outside the recognized set.
    Unknown,
}

/// What the mouse did.
///
/// `Click` is synthesized from a press/release pair by the engine; the
/// decoder never produces it. The enum doubles as the subscription kind tag
/// for the engine's publish channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseAction {
    /// Pointer moved with no button held.
    Move,

    /// Button pressed down.
    Press,

    /// Button released.
    Release,

    /// Pointer moved while a button was held.
    Drag,

    /// Wheel scrolled.
    Wheel,

    /// Press and release close together, synthesized by the engine.
    Click,
}

impl MouseAction {
    /// All decodable and synthesized action kinds.
    pub const ALL: [MouseAction; 6] = [
        MouseAction::Move,
        MouseAction::Press,
        MouseAction::Release,
        MouseAction::Drag,
        MouseAction::Wheel,
        MouseAction::Click,
    ];
}

/// Which wire grammar an event was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// SGR extended reporting (`ESC [ < Cb ; Cx ; Cy M|m`).
    Sgr,

    /// Legacy X10 reporting (`ESC [ M` followed by three raw bytes).
    Legacy,
}

bitflags! {
    /// Modifier keys held during a mouse event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        /// No modifiers.
        const NONE  = 0b000;
        /// Shift key.
        const SHIFT = 0b001;
        /// Alt/Option key.
        const ALT   = 0b010;
        /// Control key.
        const CTRL  = 0b100;
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::NONE
    }
}

/// A decoded (or synthesized) mouse event.
///
/// Immutable once constructed; owned by whichever queue or handler currently
/// holds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MouseEvent {
    /// The button involved, if any.
    pub button: MouseButton,

    /// What happened.
    pub action: MouseAction,

    /// Column as reported by the terminal.
    pub x: u16,

    /// Row as reported by the terminal.
    pub y: u16,

    /// Modifier keys held during the event.
    pub modifiers: Modifiers,

    /// The numeric button code from the wire (after legacy bias removal).
    pub raw: u16,

    /// The exact escape-sequence text this event was decoded from.
    pub data: String,

    /// Which grammar produced the event.
    pub protocol: Protocol,
}

impl MouseEvent {
    /// Get the position as a tuple.
    #[must_use]
    pub const fn position(&self) -> (u16, u16) {
        (self.x, self.y)
    }

    /// Check if Shift was held.
    #[must_use]
    pub const fn shift(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
    }

    /// Check if Alt was held.
    #[must_use]
    pub const fn alt(&self) -> bool {
        self.modifiers.contains(Modifiers::ALT)
    }

    /// Check if Ctrl was held.
    #[must_use]
    pub const fn ctrl(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
    }
}
