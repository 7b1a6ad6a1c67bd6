use crate::trace::{Message, MessageHandle, Trace};
use serde::Serialize;

/// Where a message is at a given virtual time.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    pub in_flight: bool,
    /// Progress from sender (0) to receiver (1).
    pub fraction: f64,
}

/// Projects one message at virtual time `t` (milliseconds).
///
/// A message is in flight while `t` lies between its two timestamps
/// inclusive, whichever comes first. Messages without a receive never are.
pub fn project(message: &Message, t: f64) -> Projection {
    let Some(time_recv) = message.time_recv else {
        return Projection {
            in_flight: false,
            fraction: 0.0,
        };
    };
    let sent = message.time_sent.as_f64();
    let recv = time_recv.as_f64();

    let in_flight = sent.min(recv) <= t && t <= sent.max(recv);
    let fraction = if sent == recv {
        0.5
    } else {
        ((t - sent) / (recv - sent)).clamp(0.0, 1.0)
    };
    Projection {
        in_flight,
        fraction,
    }
}

impl Trace {
    /// Every message in flight at `t`, in ledger order.
    pub fn project_at(&self, t: f64) -> Vec<(MessageHandle, Projection)> {
        self.ledger()
            .iter()
            .filter_map(|(_, handle, message)| {
                let projection = project(message, t);
                projection.in_flight.then_some((handle, projection))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Timestamp;

    fn message(time_sent: u64, time_recv: Option<u64>) -> Message {
        Message {
            id: "m".to_string(),
            from_node: "A".to_string(),
            to_node: "B".to_string(),
            time_sent: Timestamp(time_sent),
            time_recv: time_recv.map(Timestamp),
            message: serde_json::Value::Null,
            color: "#FF6E6E".to_string(),
        }
    }

    #[test]
    fn zero_duration_is_half_way_only_at_its_instant() {
        let message = message(50, Some(50));
        assert_eq!(
            project(&message, 50.0),
            Projection { in_flight: true, fraction: 0.5 }
        );
        assert!(!project(&message, 49.0).in_flight);
        assert!(!project(&message, 51.0).in_flight);
    }

    #[test]
    fn fraction_is_linear_and_clamped() {
        let message = message(100, Some(200));
        assert_eq!(project(&message, 150.0).fraction, 0.5);
        assert_eq!(project(&message, 100.0).fraction, 0.0);
        assert_eq!(project(&message, 200.0).fraction, 1.0);
        assert_eq!(project(&message, 90.0).fraction, 0.0);
        assert_eq!(project(&message, 250.0).fraction, 1.0);
        assert!(!project(&message, 250.0).in_flight);
    }

    #[test]
    fn reversed_clocks_still_fly() {
        let message = message(200, Some(100));
        let projection = project(&message, 150.0);
        assert!(projection.in_flight);
        assert_eq!(projection.fraction, 0.5);
    }

    #[test]
    fn incomplete_messages_never_fly() {
        let message = message(100, None);
        assert!(!project(&message, 100.0).in_flight);
    }
}
