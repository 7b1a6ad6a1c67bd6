//! Playback: where the virtual time is and what is in flight at it

pub mod controller;
pub mod projection;
pub mod speed;

pub use controller::{PlaybackController, PlaybackState, ReplayToken, TimeSpan};
pub use projection::{Projection, project};
pub use speed::Speed;
