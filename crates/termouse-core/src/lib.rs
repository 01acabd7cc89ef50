#![forbid(unsafe_code)]

//! Core: mouse event types, escape-sequence decoding, and error taxonomy.

pub mod decoder;
pub mod error;
pub mod event;
