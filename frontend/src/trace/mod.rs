//! Message ordering and index reconciliation
//!
//! [`Trace`] is the unit of trace state: the [`Ledger`] of messages, the
//! [`TimeIndex`] of every half-event timestamp, the [`IndexLut`] binding the
//! two, and the buffer of receives still waiting for their send. All four are
//! only mutated together, through `&mut Trace`.

pub mod index_lut;
pub mod ledger;
pub mod pending;
pub mod reconciler;
pub mod time_index;

pub use index_lut::{IndexLut, LutRow};
pub use ledger::{Ledger, Message, MessageHandle, Renumbering};
pub use pending::{PendingReceive, PendingReceives};
pub use reconciler::{Completed, Inserted, ReceiveOutcome, ReceivedHalf, SentHalf, SentOutcome};
pub use time_index::{TimeIndex, sorted_insert_position};

use shared::{ExportRecord, Timestamp};

#[derive(Debug, Clone, Default)]
pub struct Trace {
    ledger: Ledger,
    time_index: TimeIndex,
    lut: IndexLut,
    pending: PendingReceives,
    skewed_inserts: usize,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn time_index(&self) -> &TimeIndex {
        &self.time_index
    }

    pub fn lut(&self) -> &IndexLut {
        &self.lut
    }

    pub fn pending(&self) -> &PendingReceives {
        &self.pending
    }

    /// Time-Index positions of the message at `ledger_index`.
    pub fn lookup(&self, ledger_index: usize) -> Option<LutRow> {
        self.lut.row(ledger_index)
    }

    /// Number of timestamps that arrived below the running maximum.
    pub fn skewed_inserts(&self) -> usize {
        self.skewed_inserts
    }

    /// Earliest and latest known timestamps.
    pub fn time_span(&self) -> Option<(Timestamp, Timestamp)> {
        Some((self.time_index.first()?, self.time_index.last()?))
    }

    /// Discards every message, timestamp, lookup row and buffered receive.
    pub fn reset(&mut self) {
        self.ledger.clear();
        self.time_index.clear();
        self.lut.clear();
        self.pending.clear();
        self.skewed_inserts = 0;
    }

    pub fn export_records(&self) -> Vec<ExportRecord> {
        self.ledger
            .iter()
            .map(|(_, _, message)| message.to_export_record())
            .collect()
    }

    /// Checks that the Time-Index is sorted, holds exactly one entry per known
    /// half-event and that every lookup row resolves to its message's times.
    pub fn is_consistent(&self) -> bool {
        if !self.time_index.is_sorted() || self.lut.len() != self.ledger.len() {
            return false;
        }
        let mut halves = 0;
        for (index, _, message) in self.ledger.iter() {
            let Some(row) = self.lut.row(index) else {
                return false;
            };
            if self.time_index.get(row.sent) != Some(message.time_sent) {
                return false;
            }
            halves += 1;
            match (row.recv, message.time_recv) {
                (Some(recv), Some(time_recv)) => {
                    if self.time_index.get(recv) != Some(time_recv) {
                        return false;
                    }
                    halves += 1;
                }
                (None, None) => {}
                _ => return false,
            }
        }
        halves == self.time_index.len()
    }

    /// Inserts into the Time-Index and shifts every lookup row in the same step.
    fn insert_time(&mut self, time: Timestamp) -> usize {
        if let Some(latest) = self.time_index.last() {
            if time < latest {
                self.skewed_inserts += 1;
                log::warn!(
                    "Timestamp {time} arrived after later timestamp {latest} ({} ms behind)",
                    latest.abs_diff(time)
                );
            }
        }
        let position = self.time_index.insert(time);
        self.lut.shift_from(position);
        position
    }
}
