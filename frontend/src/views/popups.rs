use crate::trace::{Message, MessageHandle, Trace};
use serde::Serialize;
use shared::Timestamp;

/// Which dot of a chart row the popup is attached to.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Half {
    Sent,
    Recv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Popup {
    pub handle: MessageHandle,
    pub half: Half,
}

/// Popup resolved against the current trace.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupContent<'a> {
    pub ledger_index: usize,
    pub half: Half,
    pub time: Timestamp,
    pub message: &'a Message,
}

/// At most one message detail popup.
#[derive(Debug, Clone, Default)]
pub struct Popups {
    open: Option<Popup>,
}

impl Popups {
    /// Opens a popup, replacing any open one.
    pub fn open(&mut self, handle: MessageHandle, half: Half) {
        self.open = Some(Popup { handle, half });
    }

    pub fn close(&mut self) {
        self.open = None;
    }

    pub fn current(&self) -> Option<Popup> {
        self.open
    }

    /// Current ledger index and content of the open popup. A popup on the
    /// receive half of a message that has none resolves to nothing.
    pub fn resolve<'a>(&self, trace: &'a Trace) -> Option<PopupContent<'a>> {
        let popup = self.open?;
        let ledger = trace.ledger();
        let message = ledger.get(popup.handle)?;
        let time = match popup.half {
            Half::Sent => message.time_sent,
            Half::Recv => message.time_recv?,
        };
        Some(PopupContent {
            ledger_index: ledger.position_of(popup.handle)?,
            half: popup.half,
            time,
            message,
        })
    }
}
