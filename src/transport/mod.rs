//! # Transport Layer
//!
//! The two ways an envelope travels: MLLP-framed TCP and plain HTTP.
//!
//! ## Components
//! - **Mllp**: framed request/response client and the async accept loop
//! - **Http**: reqwest client plus the embedded blocking receiver

pub mod http;
pub mod mllp;
