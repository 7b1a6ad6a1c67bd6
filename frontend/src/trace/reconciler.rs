//! Sent/received half-event matching

use super::{LutRow, Message, MessageHandle, PendingReceive, Renumbering, Trace};
use shared::{AddressBook, Timestamp};

/// Sent half as observed on a node's `/sent` stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SentHalf {
    pub node_id: String,
    pub to_addr: String,
    pub time_sent: Timestamp,
    pub id: String,
    pub payload: serde_json::Value,
    pub color: String,
}

/// Received half as observed on a node's `/recv` stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedHalf {
    pub node_id: String,
    pub from_addr: String,
    pub time_recv: Timestamp,
    pub id: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inserted {
    pub handle: MessageHandle,
    pub ledger_index: usize,
    pub renumbering: Renumbering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completed {
    pub handle: MessageHandle,
    pub ledger_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentOutcome {
    /// Destination address is not in the topology.
    Discarded,
    /// `completed` is set when a buffered receive matched immediately.
    Inserted {
        inserted: Inserted,
        completed: Option<Completed>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    Discarded,
    Buffered,
    Completed(Completed),
}

impl Trace {
    pub fn on_sent(&mut self, book: &AddressBook, sent: SentHalf) -> SentOutcome {
        let Some(to_node) = book.resolve(&sent.to_addr) else {
            log::debug!(
                "Discarding sent '{}' from {}: unknown destination {}",
                sent.id, sent.node_id, sent.to_addr
            );
            return SentOutcome::Discarded;
        };

        let message = Message {
            id: sent.id,
            from_node: sent.node_id,
            to_node: to_node.to_string(),
            time_sent: sent.time_sent,
            time_recv: None,
            message: sent.payload,
            color: sent.color,
        };
        let (handle, ledger_index) = self.ledger.insert(message);
        let sent_position = self.insert_time(sent.time_sent);
        self.lut.insert_row(ledger_index, LutRow::sent_only(sent_position));

        let inserted = Inserted {
            handle,
            ledger_index,
            renumbering: Renumbering { from: ledger_index },
        };

        let completed = self.take_buffered_receive(handle).map(|pending| {
            log::debug!(
                "Matched buffered receive '{}' from {} at {}",
                pending.id, pending.from_node, pending.time_recv
            );
            self.complete(handle, ledger_index, pending.time_recv)
        });

        SentOutcome::Inserted {
            inserted,
            completed,
        }
    }

    pub fn on_received(&mut self, book: &AddressBook, received: ReceivedHalf) -> ReceiveOutcome {
        let Some(from_node) = book.resolve(&received.from_addr) else {
            log::debug!(
                "Discarding receive '{}' at {}: unknown source {}",
                received.id, received.node_id, received.from_addr
            );
            return ReceiveOutcome::Discarded;
        };

        let matched = self
            .ledger
            .find_unmatched_latest(&received.id, from_node)
            .and_then(|index| Some((index, self.ledger.handle_at(index)?)));

        match matched {
            Some((ledger_index, handle)) => {
                ReceiveOutcome::Completed(self.complete(handle, ledger_index, received.time_recv))
            }
            None => {
                log::debug!(
                    "Buffering receive '{}' from {from_node} until its send arrives",
                    received.id
                );
                self.pending.push(PendingReceive {
                    id: received.id,
                    from_addr: received.from_addr,
                    from_node: from_node.to_string(),
                    to_node: received.node_id,
                    time_recv: received.time_recv,
                    payload: received.payload,
                });
                ReceiveOutcome::Buffered
            }
        }
    }

    fn take_buffered_receive(&mut self, handle: MessageHandle) -> Option<PendingReceive> {
        let message = self.ledger.get(handle)?;
        let pending = self.pending.take_match(&message.id, &message.from_node)?;
        if pending.to_node != message.to_node {
            log::warn!(
                "Receive '{}' was observed at {} but its send targets {}",
                pending.id, pending.to_node, message.to_node
            );
        }
        Some(pending)
    }

    fn complete(&mut self, handle: MessageHandle, ledger_index: usize, time_recv: Timestamp) -> Completed {
        if let Some(message) = self.ledger.get_mut(handle) {
            if time_recv < message.time_sent {
                log::warn!(
                    "Message '{}' from {} received at {time_recv} before it was sent at {}",
                    message.id, message.from_node, message.time_sent
                );
            }
            message.time_recv = Some(time_recv);
        }
        let recv_position = self.insert_time(time_recv);
        self.lut.set_recv(ledger_index, recv_position);
        Completed {
            handle,
            ledger_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn book() -> AddressBook {
        [
            ("127.0.0.1:2001".to_string(), "A".to_string()),
            ("127.0.0.1:2002".to_string(), "B".to_string()),
        ]
        .into_iter()
        .collect()
    }

    fn sent(node: &str, to_addr: &str, time_sent: u64, id: &str) -> SentHalf {
        SentHalf {
            node_id: node.to_string(),
            to_addr: to_addr.to_string(),
            time_sent: Timestamp(time_sent),
            id: id.to_string(),
            payload: serde_json::json!({ "id": id }),
            color: "#FF6E6E".to_string(),
        }
    }

    fn received(node: &str, from_addr: &str, time_recv: u64, id: &str) -> ReceivedHalf {
        ReceivedHalf {
            node_id: node.to_string(),
            from_addr: from_addr.to_string(),
            time_recv: Timestamp(time_recv),
            id: id.to_string(),
            payload: serde_json::Value::Null,
        }
    }

    const A: &str = "127.0.0.1:2001";
    const B: &str = "127.0.0.1:2002";

    #[test]
    fn receive_before_send_is_paired_on_send() {
        let book = book();
        let mut trace = Trace::new();

        let outcome = trace.on_received(&book, received("B", A, 100, "x"));
        assert_eq!(outcome, ReceiveOutcome::Buffered);
        assert_eq!(trace.pending().len(), 1);
        assert!(trace.ledger().is_empty());

        let outcome = trace.on_sent(&book, sent("A", B, 90, "x"));
        let SentOutcome::Inserted { inserted, completed } = outcome else {
            panic!("send should be inserted, got {outcome:?}");
        };
        assert_eq!(inserted.ledger_index, 0);
        assert_eq!(
            completed,
            Some(Completed { handle: inserted.handle, ledger_index: 0 })
        );

        let message = trace.ledger().get(inserted.handle).unwrap();
        assert_eq!(message.time_sent, Timestamp(90));
        assert_eq!(message.time_recv, Some(Timestamp(100)));
        assert_eq!(message.to_node, "B");
        assert!(trace.pending().is_empty());
        assert_eq!(trace.lookup(0), Some(LutRow { sent: 0, recv: Some(1) }));
        assert!(trace.is_consistent());
    }

    #[test]
    fn late_earlier_send_is_inserted_in_order() {
        let book = book();
        let mut trace = Trace::new();
        trace.on_sent(&book, sent("A", B, 10, "m1"));
        trace.on_sent(&book, sent("A", B, 30, "m3"));
        // A view holding the position of "30" before the late insert.
        let held_position = 1;

        let outcome = trace.on_sent(&book, sent("A", B, 20, "m2"));
        let SentOutcome::Inserted { inserted, completed: None } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };

        let order: Vec<u64> = trace
            .ledger()
            .iter()
            .map(|(_, _, message)| message.time_sent.millis())
            .collect();
        assert_eq!(order, vec![10, 20, 30]);
        assert_eq!(inserted.ledger_index, 1);
        assert_eq!(inserted.renumbering.apply(held_position), held_position + 1);
        assert_eq!(trace.ledger().at(2).map(|m| m.id.as_str()), Some("m3"));
        assert_eq!(trace.skewed_inserts(), 1);
        assert!(trace.is_consistent());
    }

    #[test]
    fn receive_matches_most_recent_unmatched_duplicate() {
        let book = book();
        let mut trace = Trace::new();
        trace.on_sent(&book, sent("A", B, 10, "dup"));
        trace.on_sent(&book, sent("A", B, 20, "dup"));

        let outcome = trace.on_received(&book, received("B", A, 25, "dup"));
        assert!(matches!(
            outcome,
            ReceiveOutcome::Completed(Completed { ledger_index: 1, .. })
        ));
        assert_eq!(trace.ledger().at(0).unwrap().time_recv, None);
        assert_eq!(trace.ledger().at(1).unwrap().time_recv, Some(Timestamp(25)));

        let outcome = trace.on_received(&book, received("B", A, 30, "dup"));
        assert!(matches!(
            outcome,
            ReceiveOutcome::Completed(Completed { ledger_index: 0, .. })
        ));
        assert!(trace.is_consistent());
    }

    #[test]
    fn unresolved_addresses_are_discarded() {
        let book = book();
        let mut trace = Trace::new();
        assert_eq!(
            trace.on_sent(&book, sent("A", "10.0.0.9:1", 5, "x")),
            SentOutcome::Discarded
        );
        assert_eq!(
            trace.on_received(&book, received("B", "10.0.0.9:1", 6, "x")),
            ReceiveOutcome::Discarded
        );
        assert!(trace.ledger().is_empty());
        assert!(trace.pending().is_empty());
        assert!(trace.time_index().is_empty());
    }

    #[test]
    fn same_id_from_different_nodes_does_not_match() {
        let book = book();
        let mut trace = Trace::new();
        trace.on_sent(&book, sent("A", B, 10, "x"));

        let outcome = trace.on_received(&book, received("A", B, 12, "x"));
        assert_eq!(outcome, ReceiveOutcome::Buffered);
        assert_eq!(trace.ledger().at(0).unwrap().time_recv, None);
    }

    #[test]
    fn lookup_stays_consistent_under_interleaving() {
        let book = book();
        let mut trace = Trace::new();
        let script: Vec<Box<dyn Fn(&mut Trace) + '_>> = vec![
            Box::new(|t| { t.on_sent(&book, sent("A", B, 50, "1")); }),
            Box::new(|t| { t.on_received(&book, received("A", B, 55, "2")); }),
            Box::new(|t| { t.on_sent(&book, sent("A", B, 40, "3")); }),
            Box::new(|t| { t.on_received(&book, received("B", A, 60, "1")); }),
            Box::new(|t| { t.on_sent(&book, sent("B", A, 45, "2")); }),
            Box::new(|t| { t.on_sent(&book, sent("A", B, 40, "4")); }),
            Box::new(|t| { t.on_received(&book, received("B", A, 41, "3")); }),
            Box::new(|t| { t.on_received(&book, received("B", A, 45, "4")); }),
        ];
        for step in script {
            step(&mut trace);
            assert!(trace.is_consistent());
        }

        assert_eq!(trace.ledger().len(), 4);
        assert!(trace.pending().is_empty());
        assert_eq!(trace.time_index().len(), 8);
        let ids: Vec<&str> = trace.ledger().iter().map(|(_, _, m)| m.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "4", "2", "1"]);
    }

    #[test]
    fn zero_duration_message_is_consistent() {
        let book = book();
        let mut trace = Trace::new();
        trace.on_sent(&book, sent("A", B, 50, "z"));
        trace.on_received(&book, received("B", A, 50, "z"));

        assert_eq!(trace.lookup(0), Some(LutRow { sent: 0, recv: Some(1) }));
        assert!(trace.is_consistent());
    }

    #[test]
    fn reset_empties_everything() {
        let book = book();
        let mut trace = Trace::new();
        trace.on_sent(&book, sent("A", B, 10, "x"));
        trace.on_received(&book, received("A", B, 12, "y"));

        trace.reset();

        assert!(trace.ledger().is_empty());
        assert!(trace.time_index().is_empty());
        assert!(trace.lut().is_empty());
        assert!(trace.pending().is_empty());
        assert!(trace.is_consistent());
    }

    #[derive(Debug, Clone)]
    enum Step {
        Sent { from_a: bool, id: u8, time: u64 },
        Recv { at_a: bool, id: u8, time: u64 },
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        prop_oneof![
            (any::<bool>(), 0u8..4, 0u64..40)
                .prop_map(|(from_a, id, time)| Step::Sent { from_a, id, time }),
            (any::<bool>(), 0u8..4, 0u64..40)
                .prop_map(|(at_a, id, time)| Step::Recv { at_a, id, time }),
        ]
    }

    fn apply(trace: &mut Trace, book: &AddressBook, step: &Step) {
        match *step {
            Step::Sent { from_a, id, time } => {
                let (node, to) = if from_a { ("A", B) } else { ("B", A) };
                trace.on_sent(book, sent(node, to, time, &id.to_string()));
            }
            Step::Recv { at_a, id, time } => {
                let (node, from) = if at_a { ("A", B) } else { ("B", A) };
                trace.on_received(book, received(node, from, time, &id.to_string()));
            }
        }
    }

    proptest! {
        #[test]
        fn any_interleaving_keeps_the_trace_consistent(
            steps in prop::collection::vec(step_strategy(), 0..80)
        ) {
            let book = book();
            let mut trace = Trace::new();

            for step in &steps {
                apply(&mut trace, &book, step);

                prop_assert!(trace.is_consistent());
                prop_assert!(trace.time_index().is_sorted());
                let sent_times: Vec<Timestamp> =
                    trace.ledger().iter().map(|(_, _, message)| message.time_sent).collect();
                prop_assert!(sent_times.windows(2).all(|pair| pair[0] <= pair[1]));
                for pending in trace.pending().iter() {
                    prop_assert_eq!(
                        trace.ledger().find_unmatched_latest(&pending.id, &pending.from_node),
                        None
                    );
                }
            }

            let received = steps.iter().filter(|step| matches!(step, Step::Recv { .. })).count();
            let completed = trace
                .ledger()
                .iter()
                .filter(|(_, _, message)| message.is_complete())
                .count();
            prop_assert_eq!(completed + trace.pending().len(), received);
            prop_assert_eq!(trace.time_index().len(), trace.ledger().len() + completed);
        }
    }
}
