//! Property tests for the mouse sequence grammars.
//!
//! These pin the decoder against the bit table rather than against itself:
//! every generated sequence must round-trip its coordinates and raw code,
//! and the action class must follow the terminator and motion/wheel bits.

use proptest::prelude::*;
use termouse_core::decoder::MouseDecoder;
use termouse_core::event::{Modifiers, MouseAction, MouseButton, Protocol};

proptest! {
    #[test]
    fn sgr_round_trips_code_and_coordinates(
        code in 0u16..=255,
        x in 0u16..=9999,
        y in 0u16..=9999,
        release in any::<bool>(),
    ) {
        let terminator = if release { 'm' } else { 'M' };
        let input = format!("\x1b[<{code};{x};{y}{terminator}");

        let mut decoder = MouseDecoder::new();
        let events = decoder.decode(&input);
        prop_assert_eq!(events.len(), 1);

        let event = &events[0];
        prop_assert_eq!(event.raw, code);
        prop_assert_eq!(event.x, x);
        prop_assert_eq!(event.y, y);
        prop_assert_eq!(event.protocol, Protocol::Sgr);
        prop_assert_eq!(event.data.as_str(), input.as_str());

        // Terminator `m` is always a release.
        if release {
            prop_assert_eq!(event.action, MouseAction::Release);
        }

        // Modifier bits map directly, except for the out-of-scheme codes.
        if code != 128 && code != 129 {
            prop_assert_eq!(event.shift(), code & 0x04 != 0);
            prop_assert_eq!(event.alt(), code & 0x08 != 0);
            prop_assert_eq!(event.ctrl(), code & 0x10 != 0);
        }

        if !release {
            if code == 128 || code == 129 {
                prop_assert_eq!(event.action, MouseAction::Press);
            } else if code & 0x40 != 0 {
                prop_assert_eq!(event.action, MouseAction::Wheel);
            } else if code & 0b11 == 3 {
                let expected = if code & 0x20 != 0 { MouseAction::Move } else { MouseAction::Release };
                prop_assert_eq!(event.action, expected);
            } else if code & 0x20 != 0 {
                prop_assert_eq!(event.action, MouseAction::Drag);
            } else {
                prop_assert_eq!(event.action, MouseAction::Press);
            }
        }
    }

    #[test]
    fn sgr_wheel_codes_map_directions(mods in 0u16..8) {
        let mod_bits = mods << 2;
        for (base, button) in [
            (64u16, MouseButton::WheelUp),
            (65, MouseButton::WheelDown),
            (66, MouseButton::WheelLeft),
            (67, MouseButton::WheelRight),
        ] {
            let code = base | mod_bits;
            let input = format!("\x1b[<{code};1;1M");
            let mut decoder = MouseDecoder::new();
            let events = decoder.decode(&input);
            prop_assert_eq!(events.len(), 1);
            prop_assert_eq!(events[0].button, button);
            prop_assert_eq!(events[0].action, MouseAction::Wheel);
        }
    }

    #[test]
    fn legacy_round_trips_printable_bytes(
        code_byte in 0x20u8..=0x7F,
        x_byte in 0x20u8..=0x7F,
        y_byte in 0x20u8..=0x7F,
    ) {
        let mut input = String::from("\x1b[M");
        input.push(code_byte as char);
        input.push(x_byte as char);
        input.push(y_byte as char);

        let mut decoder = MouseDecoder::new();
        let events = decoder.decode(&input);
        prop_assert_eq!(events.len(), 1);

        let event = &events[0];
        prop_assert_eq!(event.raw, u16::from(code_byte - 0x20));
        prop_assert_eq!(event.x, u16::from(x_byte - 0x20));
        prop_assert_eq!(event.y, u16::from(y_byte - 0x20));
        prop_assert_eq!(event.protocol, Protocol::Legacy);
    }

    #[test]
    fn repeated_sequences_emit_once(
        code in 0u16..=255,
        x in 0u16..=9999,
        y in 0u16..=9999,
        repeats in 2usize..6,
    ) {
        let input = format!("\x1b[<{code};{x};{y}M").repeat(repeats);
        let mut decoder = MouseDecoder::new();
        prop_assert_eq!(decoder.decode(&input).len(), 1);
    }

    #[test]
    fn arbitrary_ascii_noise_never_panics(noise in "[ -~]{0,64}") {
        let mut decoder = MouseDecoder::new();
        let _ = decoder.decode(&noise);
        let _ = decoder.decode(&format!("\x1b[<{noise}"));
        let _ = decoder.decode(&format!("\x1b[M{noise}"));
    }

    #[test]
    fn modifiers_never_exceed_three_bits(code in 0u16..=255) {
        let input = format!("\x1b[<{code};1;1M");
        let mut decoder = MouseDecoder::new();
        if let Some(event) = decoder.decode(&input).first() {
            let known = Modifiers::SHIFT | Modifiers::ALT | Modifiers::CTRL;
            prop_assert!(known.contains(event.modifiers));
        }
    }
}
