#![forbid(unsafe_code)]

//! Termouse public facade crate.
//!
//! Re-exports the decoding, engine, and streaming surface from the internal
//! crates, plus a small prelude for day-to-day usage.
//!
//! ```no_run
//! use termouse::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let engine = MouseEngine::stdio(EngineConfig::default());
//!     engine.enable()?;
//!
//!     let mut clicks = engine.subscribe(MouseAction::Click);
//!     while let Some(click) = clicks.next()? {
//!         println!("click at {:?}", click.position());
//!     }
//!     engine.destroy()
//! }
//! ```

// --- Core re-exports -------------------------------------------------------

pub use termouse_core::decoder::MouseDecoder;
pub use termouse_core::error::{MouseError, Result};
pub use termouse_core::event::{
    Modifiers, MouseAction, MouseButton, MouseEvent, Protocol,
};

// --- Runtime re-exports ----------------------------------------------------

#[cfg(feature = "runtime")]
pub use termouse_runtime::cancel::CancelToken;
#[cfg(feature = "runtime")]
pub use termouse_runtime::engine::{EngineConfig, HandlerId, MouseEngine};
#[cfg(feature = "runtime")]
pub use termouse_runtime::stream::{BufferPolicy, EventStream, StreamOptions};
#[cfg(feature = "runtime")]
pub use termouse_runtime::terminal::{Encoding, InputSource, OutputSink, TtyInput, TtyOutput};

// --- Prelude --------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        Modifiers, MouseAction, MouseButton, MouseDecoder, MouseError, MouseEvent, Protocol,
        Result,
    };

    #[cfg(feature = "runtime")]
    pub use crate::{
        BufferPolicy, CancelToken, EngineConfig, EventStream, MouseEngine, StreamOptions,
    };

    pub use crate::core;
    #[cfg(feature = "runtime")]
    pub use crate::runtime;
}

pub use termouse_core as core;
#[cfg(feature = "runtime")]
pub use termouse_runtime as runtime;
