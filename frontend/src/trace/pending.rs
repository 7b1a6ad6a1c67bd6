use shared::Timestamp;

/// A receive that arrived before its send.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReceive {
    pub id: String,
    pub from_addr: String,
    pub from_node: String,
    pub to_node: String,
    pub time_recv: Timestamp,
    pub payload: serde_json::Value,
}

/// Receives waiting for their sent half. Entries live until matched or reset.
#[derive(Debug, Clone, Default)]
pub struct PendingReceives {
    entries: Vec<PendingReceive>,
}

impl PendingReceives {
    pub(crate) fn push(&mut self, pending: PendingReceive) {
        self.entries.push(pending);
    }

    /// Removes and returns the oldest buffered receive for `(id, from_node)`.
    pub(crate) fn take_match(&mut self, id: &str, from_node: &str) -> Option<PendingReceive> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.id == id && entry.from_node == from_node)?;
        Some(self.entries.remove(position))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingReceive> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
