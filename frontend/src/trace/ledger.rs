use serde::Serialize;
use shared::{ExportRecord, Timestamp};
use std::fmt;

/// Stable identity of one ledger entry.
///
/// Unlike a ledger index, a handle never changes when earlier messages are
/// inserted, and handles are not reused after a reset.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageHandle(u64);

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg#{}", self.0)
    }
}

/// Shift of positional identifiers caused by one ledger insertion.
///
/// Every position `>= from` that existed before the insertion moves up by
/// one; the new entry then takes `from`.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Renumbering {
    pub from: usize,
}

impl Renumbering {
    /// Translates a pre-insertion position into its post-insertion value.
    pub fn apply(self, position: usize) -> usize {
        if position >= self.from {
            position + 1
        } else {
            position
        }
    }

    /// True when nothing existing moves (the insert was an append).
    pub fn is_append(self, previous_len: usize) -> bool {
        self.from >= previous_len
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub from_node: String,
    pub to_node: String,
    pub time_sent: Timestamp,
    pub time_recv: Option<Timestamp>,
    pub message: serde_json::Value,
    pub color: String,
}

impl Message {
    pub fn is_complete(&self) -> bool {
        self.time_recv.is_some()
    }

    pub fn to_export_record(&self) -> ExportRecord {
        ExportRecord {
            message: self.message.clone(),
            from_node: self.from_node.clone(),
            to_node: self.to_node.clone(),
            time_sent: self.time_sent,
            time_recv: self.time_recv,
            id: self.id.clone(),
            color: self.color.clone(),
        }
    }
}

/// Messages in `timeSent` order.
///
/// Storage is an arena addressed by handle; `order` holds the handles in
/// ledger order, so an insertion moves handles, never messages.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    messages: Vec<Message>,
    order: Vec<MessageHandle>,
    // Handle value of `messages[0]`; advanced on clear so handles stay unique.
    base: u64,
}

impl Ledger {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ledger index a message sent at `time_sent` would take. Same backward
    /// scan as the Time-Index: ties land after existing equal entries.
    pub fn insertion_index(&self, time_sent: Timestamp) -> usize {
        self.order
            .iter()
            .rposition(|&handle| {
                self.get(handle)
                    .is_some_and(|existing| time_sent >= existing.time_sent)
            })
            .map_or(0, |index| index + 1)
    }

    pub(crate) fn insert(&mut self, message: Message) -> (MessageHandle, usize) {
        let index = self.insertion_index(message.time_sent);
        let handle = MessageHandle(self.base + self.messages.len() as u64);
        self.messages.push(message);
        self.order.insert(index, handle);
        (handle, index)
    }

    pub fn get(&self, handle: MessageHandle) -> Option<&Message> {
        let slot = handle.0.checked_sub(self.base)?;
        self.messages.get(usize::try_from(slot).ok()?)
    }

    pub(crate) fn get_mut(&mut self, handle: MessageHandle) -> Option<&mut Message> {
        let slot = handle.0.checked_sub(self.base)?;
        self.messages.get_mut(usize::try_from(slot).ok()?)
    }

    pub fn handle_at(&self, index: usize) -> Option<MessageHandle> {
        self.order.get(index).copied()
    }

    pub fn at(&self, index: usize) -> Option<&Message> {
        self.handle_at(index).and_then(|handle| self.get(handle))
    }

    /// Current ledger index of a handle.
    pub fn position_of(&self, handle: MessageHandle) -> Option<usize> {
        self.order.iter().position(|&candidate| candidate == handle)
    }

    /// Most recent (highest ledger index) message from `from_node` with this
    /// id that still lacks its receive half.
    pub fn find_unmatched_latest(&self, id: &str, from_node: &str) -> Option<usize> {
        self.order.iter().rposition(|&handle| {
            self.get(handle).is_some_and(|message| {
                message.time_recv.is_none() && message.id == id && message.from_node == from_node
            })
        })
    }

    /// `(ledger index, handle, message)` in ledger order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, MessageHandle, &Message)> + '_ {
        self.order
            .iter()
            .enumerate()
            .filter_map(|(index, &handle)| self.get(handle).map(|message| (index, handle, message)))
    }

    pub(crate) fn clear(&mut self) {
        self.base += self.messages.len() as u64;
        self.messages.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, time_sent: u64) -> Message {
        Message {
            id: id.to_string(),
            from_node: "NodeA".to_string(),
            to_node: "NodeB".to_string(),
            time_sent: Timestamp(time_sent),
            time_recv: None,
            message: serde_json::Value::Null,
            color: "#FF6E6E".to_string(),
        }
    }

    #[test]
    fn insert_orders_by_time_sent() {
        let mut ledger = Ledger::default();
        let (h10, _) = ledger.insert(message("a", 10));
        let (h30, _) = ledger.insert(message("b", 30));
        let (h20, index) = ledger.insert(message("c", 20));

        assert_eq!(index, 1);
        assert_eq!(ledger.handle_at(0), Some(h10));
        assert_eq!(ledger.handle_at(1), Some(h20));
        assert_eq!(ledger.handle_at(2), Some(h30));
        assert_eq!(ledger.position_of(h30), Some(2));
        assert_eq!(ledger.get(h20).map(|m| m.id.as_str()), Some("c"));
    }

    #[test]
    fn renumbering_shifts_positions_at_or_after_insert() {
        let renumbering = Renumbering { from: 1 };
        assert_eq!(renumbering.apply(0), 0);
        assert_eq!(renumbering.apply(1), 2);
        assert_eq!(renumbering.apply(5), 6);
        assert!(renumbering.is_append(1));
        assert!(!renumbering.is_append(2));
    }

    #[test]
    fn find_unmatched_latest_skips_completed() {
        let mut ledger = Ledger::default();
        ledger.insert(message("x", 10));
        let (h20, _) = ledger.insert(message("x", 20));
        ledger.insert(message("y", 30));

        assert_eq!(ledger.find_unmatched_latest("x", "NodeA"), Some(1));
        if let Some(entry) = ledger.get_mut(h20) {
            entry.time_recv = Some(Timestamp(25));
        }
        assert_eq!(ledger.find_unmatched_latest("x", "NodeA"), Some(0));
        assert_eq!(ledger.find_unmatched_latest("x", "NodeB"), None);
    }

    #[test]
    fn handles_are_not_reused_after_clear() {
        let mut ledger = Ledger::default();
        let (before, _) = ledger.insert(message("a", 10));
        ledger.clear();
        assert!(ledger.is_empty());
        assert_eq!(ledger.get(before), None);

        let (after, _) = ledger.insert(message("b", 10));
        assert_ne!(before, after);
        assert_eq!(ledger.get(before), None);
        assert_eq!(ledger.get(after).map(|m| m.id.as_str()), Some("b"));
    }
}
