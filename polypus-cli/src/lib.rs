pub mod check;
pub mod config;
pub mod control;
pub mod sse;
pub mod tail;
