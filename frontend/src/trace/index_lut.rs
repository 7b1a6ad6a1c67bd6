use serde::Serialize;

/// Time-Index positions of one message's two halves.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LutRow {
    pub sent: usize,
    pub recv: Option<usize>,
}

impl LutRow {
    pub fn sent_only(sent: usize) -> Self {
        LutRow { sent, recv: None }
    }

    fn shift_from(&mut self, position: usize) {
        if self.sent >= position {
            self.sent += 1;
        }
        if let Some(recv) = self.recv.as_mut() {
            if *recv >= position {
                *recv += 1;
            }
        }
    }
}

/// One row per ledger entry, in ledger order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexLut {
    rows: Vec<LutRow>,
}

impl IndexLut {
    /// Bumps every stored Time-Index position `>= position` by one.
    pub(crate) fn shift_from(&mut self, position: usize) {
        for row in &mut self.rows {
            row.shift_from(position);
        }
    }

    pub(crate) fn insert_row(&mut self, ledger_index: usize, row: LutRow) {
        self.rows.insert(ledger_index, row);
    }

    pub(crate) fn set_recv(&mut self, ledger_index: usize, recv: usize) {
        if let Some(row) = self.rows.get_mut(ledger_index) {
            row.recv = Some(recv);
        }
    }

    pub fn row(&self, ledger_index: usize) -> Option<LutRow> {
        self.rows.get(ledger_index).copied()
    }

    pub fn rows(&self) -> &[LutRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.rows.clear();
    }
}
