//! Event plumbing between the trace session and its views
//!
//! The session is the only writer of trace state. Everything a view needs to
//! know arrives as a domain event on a [`Relay`].
//!
//! # Architecture Principles
//!
//! 1. **Event-Source Naming** - Relays follow `{source}_{event}_relay` pattern
//! 2. **One dispatch point per event** - each domain event has exactly one relay
//! 3. **No cross-view access** - views subscribe; they never read each other

pub mod relay;

pub use relay::{Relay, relay};
