//! View models fed by trace events
//!
//! None of these draw anything. They turn trace state into the geometry a
//! renderer needs, keyed by [`MessageHandle`](crate::trace::MessageHandle).

pub mod chart;
pub mod graph;
pub mod popups;

pub use chart::{ChartConfig, ChartLayout, ChartRow, Column, Viewport};
pub use graph::{GraphView, Link, LiveHint, Marker, Point};
pub use popups::{Half, Popup, PopupContent, Popups};
