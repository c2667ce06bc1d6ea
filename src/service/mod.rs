//! # Service Layer
//!
//! Receiver-side dispatch shared by both transports.
//!
//! The [`receiver::Receiver`] owns the process-lifetime keypair, answers
//! public-key queries, acknowledges transfers, and stages every inbound
//! envelope before attempting to open it.

pub mod receiver;
