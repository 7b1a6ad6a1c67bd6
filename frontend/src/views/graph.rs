//! Node graph view model
//!
//! Node placement belongs to the force layout; this model only tracks which
//! links exist and where message markers sit relative to their endpoints.

use crate::playback::project;
use crate::session::{MessageCompleted, MessageInserted, TraceEvent};
use crate::trace::{MessageHandle, Trace};
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn lerp(self, to: Point, fraction: f64) -> Point {
        Point {
            x: self.x + fraction * (to.x - self.x),
            y: self.y + fraction * (to.y - self.y),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    pub source: String,
    pub target: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Marker {
    pub handle: MessageHandle,
    pub color: String,
    pub at: Point,
}

/// Animation cue for live mode.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum LiveHint {
    /// Marker appears at the sender and heads toward the link's middle.
    Depart {
        handle: MessageHandle,
        from_node: String,
        to_node: String,
        color: String,
    },
    /// Marker travels on to the receiver and disappears.
    Arrive { handle: MessageHandle, to_node: String },
}

#[derive(Debug, Clone, Default)]
pub struct GraphView {
    links: IndexSet<Link>,
    // Markers shown in live mode, waiting for their receive.
    departed: IndexMap<MessageHandle, String>,
}

impl GraphView {
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn has_link(&self, source: &str, target: &str) -> bool {
        self.links.iter().any(|link| link.source == source && link.target == target)
    }

    /// Applies one trace change; resets clear everything and give no cue.
    pub fn on_trace_event(&mut self, event: &TraceEvent) -> Option<LiveHint> {
        match event {
            TraceEvent::Inserted(inserted) => Some(self.on_message_inserted(inserted)),
            TraceEvent::Completed(completed) => self.on_message_completed(completed),
            TraceEvent::Reset => {
                self.clear();
                None
            }
        }
    }

    /// Live markers still waiting for their receive.
    pub fn awaiting_arrival(&self) -> usize {
        self.departed.len()
    }

    /// Records the message's link (first flow between the pair only) and
    /// returns its departure cue.
    pub fn on_message_inserted(&mut self, event: &MessageInserted) -> LiveHint {
        let message = &event.message;
        let link = Link {
            source: message.from_node.clone(),
            target: message.to_node.clone(),
        };
        if self.links.insert(link) {
            log::debug!("New link {} -> {}", message.from_node, message.to_node);
        }
        self.departed.insert(event.handle, message.to_node.clone());
        LiveHint::Depart {
            handle: event.handle,
            from_node: message.from_node.clone(),
            to_node: message.to_node.clone(),
            color: message.color.clone(),
        }
    }

    /// Arrival cue for a marker that departed earlier, if any.
    pub fn on_message_completed(&mut self, event: &MessageCompleted) -> Option<LiveHint> {
        let to_node = self.departed.shift_remove(&event.handle)?;
        Some(LiveHint::Arrive {
            handle: event.handle,
            to_node,
        })
    }

    /// Markers for every message in flight at `t`, placed between the
    /// coordinates `position_of` reports for their nodes.
    pub fn markers_at<F>(&self, trace: &Trace, t: f64, position_of: F) -> Vec<Marker>
    where
        F: Fn(&str) -> Option<Point>,
    {
        trace
            .ledger()
            .iter()
            .filter_map(|(_, handle, message)| {
                let projection = project(message, t);
                if !projection.in_flight {
                    return None;
                }
                let from = position_of(&message.from_node)?;
                let to = position_of(&message.to_node)?;
                Some(Marker {
                    handle,
                    color: message.color.clone(),
                    at: from.lerp(to, projection.fraction),
                })
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.links.clear();
        self.departed.clear();
    }
}
