#![forbid(unsafe_code)]

//! Runtime: mouse tracking lifecycle, publish/subscribe dispatch, and
//! cancellable pull streams.

pub mod cancel;
pub mod engine;
pub mod stream;
pub mod terminal;
