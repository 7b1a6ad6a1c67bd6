//! One visualization session: trace state, playback and the events views see
//!
//! The session is the single writer. Transports hand it raw stream payloads,
//! controls call its playback methods, and every resulting change goes out on
//! exactly one relay.

use crate::connectivity::ConnectivityBoard;
use crate::dataflow::Relay;
use crate::playback::{PlaybackController, PlaybackState, Projection, ReplayToken, Speed, TimeSpan};
use crate::trace::{
    LutRow, Message, MessageHandle, ReceiveOutcome, ReceivedHalf, Renumbering, SentHalf, SentOutcome, Trace,
};
use crate::views::{ChartConfig, ChartLayout, Half, PopupContent, Popups, Viewport};
use shared::{AddressBook, ExportRecord, RecvWire, SentWire, StreamKind, Topology, WireError};
use std::time::Instant;

/// A sent half entered the ledger at `ledger_index`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageInserted {
    pub message: Message,
    pub handle: MessageHandle,
    pub ledger_index: usize,
    pub renumbering: Renumbering,
}

/// A message gained its receive half.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageCompleted {
    pub message: Message,
    pub handle: MessageHandle,
    pub ledger_index: usize,
}

/// Trace changes in the order they were applied.
///
/// Inserts, completions and resets share one relay so a subscriber never sees
/// a completion ahead of its insert, or an insert from before a reset after it.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    Inserted(MessageInserted),
    Completed(MessageCompleted),
    Reset,
}

pub struct VizSession {
    topology: Topology,
    book: AddressBook,
    trace: Trace,
    playback: PlaybackController,
    popups: Popups,
    connectivity: ConnectivityBoard,
    accepting: bool,

    pub trace_changed_relay: Relay<TraceEvent>,
    /// Virtual time in milliseconds.
    pub virtual_time_changed_relay: Relay<f64>,
    pub playback_state_changed_relay: Relay<PlaybackState>,
}

impl VizSession {
    pub fn new(topology: Topology, speed: Speed) -> Self {
        let book = topology.address_book();
        log::info!(
            "Session created for {} node(s) at {speed} replay speed",
            topology.nodes.len()
        );
        VizSession {
            topology,
            book,
            trace: Trace::new(),
            playback: PlaybackController::new(speed),
            popups: Popups::default(),
            connectivity: ConnectivityBoard::default(),
            accepting: true,
            trace_changed_relay: Relay::new(),
            virtual_time_changed_relay: Relay::new(),
            playback_state_changed_relay: Relay::new(),
        }
    }

    // ===== QUERIES =====

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn connectivity(&self) -> &ConnectivityBoard {
        &self.connectivity
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    pub fn span(&self) -> Option<TimeSpan> {
        self.trace.time_span()
    }

    pub fn lookup(&self, ledger_index: usize) -> Option<LutRow> {
        self.trace.lookup(ledger_index)
    }

    pub fn project_at(&self, t: f64) -> Vec<(MessageHandle, Projection)> {
        self.trace.project_at(t)
    }

    /// Messages in flight at the current virtual time.
    pub fn in_flight(&self) -> Vec<(MessageHandle, Projection)> {
        self.trace.project_at(self.playback.virtual_time())
    }

    pub fn chart_layout(&self, viewport: Viewport, config: &ChartConfig) -> ChartLayout {
        let node_ids: Vec<String> = self.topology.nodes.iter().map(|node| node.id.clone()).collect();
        ChartLayout::compute(&self.trace, &node_ids, viewport, config)
    }

    pub fn popup(&self) -> Option<PopupContent<'_>> {
        self.popups.resolve(&self.trace)
    }

    pub fn export_records(&self) -> Vec<ExportRecord> {
        self.trace.export_records()
    }

    // ===== INGEST =====

    /// Decodes one `data:` payload from a node's stream and applies it.
    ///
    /// Malformed payloads are logged and dropped; the error is returned for
    /// the caller's bookkeeping only.
    pub fn ingest(&mut self, node_id: &str, stream: StreamKind, data: &str) -> Result<(), WireError> {
        if !self.accepting {
            log::debug!("Session stopped, dropping {stream} event from {node_id}");
            return Ok(());
        }
        let applied = match stream {
            StreamKind::Sent => self.decode_sent(node_id, data).map(|sent| self.apply_sent(sent)),
            StreamKind::Recv => self.decode_received(node_id, data).map(|received| self.apply_received(received)),
        };
        if let Err(error) = &applied {
            log::warn!("Dropping {stream} event from {node_id}: {error}");
        }
        applied
    }

    pub fn apply_sent(&mut self, sent: SentHalf) {
        if !self.accepting {
            return;
        }
        let SentOutcome::Inserted { inserted, completed } = self.trace.on_sent(&self.book, sent) else {
            return;
        };
        if let Some(message) = self.trace.ledger().get(inserted.handle) {
            let mut message = message.clone();
            // The completion it may carry follows as its own event.
            if completed.is_some() {
                message.time_recv = None;
            }
            self.trace_changed_relay.send(TraceEvent::Inserted(MessageInserted {
                message,
                handle: inserted.handle,
                ledger_index: inserted.ledger_index,
                renumbering: inserted.renumbering,
            }));
        }
        if let Some(completed) = completed {
            self.publish_completed(completed.handle, completed.ledger_index);
        }
        self.follow_live();
    }

    pub fn apply_received(&mut self, received: ReceivedHalf) {
        if !self.accepting {
            return;
        }
        if let ReceiveOutcome::Completed(completed) = self.trace.on_received(&self.book, received) {
            self.publish_completed(completed.handle, completed.ledger_index);
            self.follow_live();
        }
    }

    fn decode_sent(&self, node_id: &str, data: &str) -> Result<SentHalf, WireError> {
        let wire = SentWire::decode(data)?;
        let time_sent = wire.timestamp()?;
        let color = self
            .topology
            .color_of(node_id)
            .unwrap_or_else(|| shared::FALLBACK_PALETTE[0].to_string());
        Ok(SentHalf {
            node_id: node_id.to_string(),
            to_addr: wire.to_addr,
            time_sent,
            id: wire.id,
            payload: wire.message,
            color,
        })
    }

    fn decode_received(&self, node_id: &str, data: &str) -> Result<ReceivedHalf, WireError> {
        let wire = RecvWire::decode(data)?;
        let time_recv = wire.timestamp()?;
        Ok(ReceivedHalf {
            node_id: node_id.to_string(),
            from_addr: wire.from_addr,
            time_recv,
            id: wire.id,
            payload: wire.message,
        })
    }

    fn publish_completed(&self, handle: MessageHandle, ledger_index: usize) {
        if let Some(message) = self.trace.ledger().get(handle) {
            self.trace_changed_relay.send(TraceEvent::Completed(MessageCompleted {
                message: message.clone(),
                handle,
                ledger_index,
            }));
        }
    }

    fn follow_live(&mut self) {
        if let Some(time) = self.playback.on_time_observed(self.trace.time_span()) {
            self.virtual_time_changed_relay.send(time);
        }
    }

    // ===== CONNECTIVITY =====

    pub fn stream_failed(&mut self, node_id: &str, stream: StreamKind, url: &str, error: &str) {
        self.connectivity.mark_failed(node_id, stream, url, error);
    }

    pub fn stream_connected(&mut self, url: &str) {
        self.connectivity.mark_connected(url);
    }

    /// Swaps in a new node list. Indicators of removed nodes are cleared;
    /// trace state is kept.
    pub fn set_topology(&mut self, topology: Topology) {
        self.book = topology.address_book();
        self.connectivity
            .retain_nodes(topology.nodes.iter().map(|node| node.id.as_str()));
        self.topology = topology;
    }

    // ===== PLAYBACK =====

    pub fn pause(&mut self, now: Instant) {
        self.with_playback(|playback, _| {
            playback.pause(now);
        });
    }

    pub fn play(&mut self, now: Instant) -> Option<ReplayToken> {
        let mut token = None;
        self.with_playback(|playback, span| token = playback.play(now, span));
        token
    }

    pub fn tick(&mut self, token: ReplayToken, now: Instant) {
        self.with_playback(|playback, span| {
            playback.tick(token, now, span);
        });
    }

    pub fn grab(&mut self, fraction: f64) {
        self.with_playback(|playback, span| playback.grab(fraction, span));
    }

    pub fn drag(&mut self, fraction: f64) {
        self.with_playback(|playback, span| {
            playback.drag(fraction, span);
        });
    }

    pub fn release(&mut self) {
        self.with_playback(|playback, _| {
            playback.release();
        });
    }

    pub fn go_live(&mut self) -> bool {
        let mut went_live = false;
        self.with_playback(|playback, span| went_live = playback.go_live(span));
        went_live
    }

    pub fn set_speed(&mut self, speed: Speed, now: Instant) {
        self.playback.set_speed(speed, now);
        log::info!("Replay speed set to {speed}");
    }

    /// Opens the detail popup of one half of a message and pauses on it.
    pub fn focus(&mut self, handle: MessageHandle, half: Half) -> bool {
        let Some(message) = self.trace.ledger().get(handle) else {
            return false;
        };
        let time = match half {
            Half::Sent => message.time_sent,
            Half::Recv => match message.time_recv {
                Some(time) => time,
                None => return false,
            },
        };
        self.popups.open(handle, half);
        self.with_playback(|playback, _| playback.focus(time));
        true
    }

    pub fn close_popup(&mut self) {
        self.popups.close();
    }

    fn with_playback<F>(&mut self, change: F)
    where
        F: FnOnce(&mut PlaybackController, Option<TimeSpan>),
    {
        let time_before = self.playback.virtual_time();
        let state_before = self.playback.state();
        change(&mut self.playback, self.trace.time_span());
        if self.playback.state() != state_before {
            log::debug!("Playback {state_before:?} -> {:?}", self.playback.state());
            self.playback_state_changed_relay.send(self.playback.state());
        }
        if self.playback.virtual_time() != time_before {
            self.virtual_time_changed_relay.send(self.playback.virtual_time());
        }
    }

    // ===== LIFECYCLE =====

    /// Stops taking events and leaves live mode until [`restart`].
    ///
    /// [`restart`]: VizSession::restart
    pub fn stop(&mut self) {
        self.accepting = false;
        self.with_playback(|playback, _| playback.disable_live());
        log::info!(
            "Session stopped with {} message(s), {} receive(s) still unmatched",
            self.trace.ledger().len(),
            self.trace.pending().len()
        );
    }

    /// Discards all trace state and notifies views.
    pub fn reset(&mut self) {
        self.trace.reset();
        self.popups.close();
        self.with_playback(|playback, _| playback.reset());
        self.trace_changed_relay.send(TraceEvent::Reset);
        log::info!("Trace reset");
    }

    /// Full reset, then accept events and tail live again.
    pub fn restart(&mut self) {
        self.reset();
        self.accepting = true;
        self.playback.enable_live();
        self.go_live();
        log::info!("Session restarted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::{GraphView, LiveHint};
    use futures::StreamExt;
    use shared::{NodeConfig, Timestamp};
    use std::time::Duration;

    fn topology() -> Topology {
        Topology {
            nodes: vec![
                NodeConfig {
                    id: "NodeA".to_string(),
                    addr: "127.0.0.1:2001".to_string(),
                    proxy: "http://127.0.0.1:8081".to_string(),
                    color: None,
                },
                NodeConfig {
                    id: "NodeB".to_string(),
                    addr: "127.0.0.1:2002".to_string(),
                    proxy: "http://127.0.0.1:8082".to_string(),
                    color: Some("#123456".to_string()),
                },
            ],
        }
    }

    fn sent(to: &str, time: &str, id: &str) -> String {
        format!(r#"{{"message":"m{id}","toAddr":"{to}","timeSent":"{time}","id":"{id}"}}"#)
    }

    fn recv(from: &str, time: &str, id: &str) -> String {
        format!(r#"{{"message":"m{id}","fromAddr":"{from}","timeRecv":"{time}","id":"{id}"}}"#)
    }

    const A: &str = "127.0.0.1:2001";
    const B: &str = "127.0.0.1:2002";

    fn expect_inserted(event: Option<TraceEvent>) -> MessageInserted {
        match event {
            Some(TraceEvent::Inserted(inserted)) => inserted,
            other => panic!("expected an insert, got {other:?}"),
        }
    }

    fn expect_completed(event: Option<TraceEvent>) -> MessageCompleted {
        match event {
            Some(TraceEvent::Completed(completed)) => completed,
            other => panic!("expected a completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn events_flow_to_every_subscriber() {
        let mut session = VizSession::new(topology(), Speed::default());
        let mut chart_events = session.trace_changed_relay.subscribe();
        let mut graph_events = session.trace_changed_relay.subscribe();
        let mut times = session.virtual_time_changed_relay.subscribe();

        session.ingest("NodeA", StreamKind::Sent, &sent(B, "1000", "1")).unwrap();
        session.ingest("NodeB", StreamKind::Recv, &recv(A, "1500", "1")).unwrap();

        let inserted = expect_inserted(chart_events.next().await);
        assert_eq!(inserted.ledger_index, 0);
        assert_eq!(inserted.message.color, shared::FALLBACK_PALETTE[0]);
        assert_eq!(inserted.message.time_recv, None);
        assert_eq!(expect_inserted(graph_events.next().await).handle, inserted.handle);

        let completed = expect_completed(chart_events.next().await);
        assert_eq!(completed.handle, inserted.handle);
        assert_eq!(completed.message.time_recv, Some(Timestamp(1500)));
        assert_eq!(expect_completed(graph_events.next().await), completed);

        assert_eq!(times.next().await, Some(1000.0));
        assert_eq!(times.next().await, Some(1500.0));
    }

    #[tokio::test]
    async fn buffered_receive_completes_right_after_insert() {
        let mut session = VizSession::new(topology(), Speed::default());
        let mut events = session.trace_changed_relay.subscribe();

        session.ingest("NodeB", StreamKind::Recv, &recv(A, "100", "x")).unwrap();
        session.ingest("NodeA", StreamKind::Sent, &sent(B, "90", "x")).unwrap();

        let inserted = expect_inserted(events.next().await);
        assert_eq!(inserted.message.time_recv, None);
        let completed = expect_completed(events.next().await);
        assert_eq!(completed.handle, inserted.handle);
        assert_eq!(completed.message.time_sent, Timestamp(90));
        assert_eq!(completed.message.time_recv, Some(Timestamp(100)));
        assert!(session.trace().pending().is_empty());
    }

    #[tokio::test]
    async fn graph_sees_every_buffered_completion_after_its_departure() {
        let mut session = VizSession::new(topology(), Speed::default());
        let mut events = session.trace_changed_relay.subscribe();

        for id in 0..50u64 {
            let id = id.to_string();
            session.ingest("NodeB", StreamKind::Recv, &recv(A, "500", &id)).unwrap();
            session.ingest("NodeA", StreamKind::Sent, &sent(B, "400", &id)).unwrap();
        }
        session.reset();
        session.ingest("NodeA", StreamKind::Sent, &sent(B, "10", "after")).unwrap();
        drop(session);

        let mut graph = GraphView::default();
        let mut departures = 0;
        let mut arrivals = 0;
        while let Some(event) = events.next().await {
            match graph.on_trace_event(&event) {
                Some(LiveHint::Depart { .. }) => departures += 1,
                Some(LiveHint::Arrive { .. }) => arrivals += 1,
                None => assert_eq!(event, TraceEvent::Reset),
            }
        }

        assert_eq!(departures, 51);
        assert_eq!(arrivals, 50);
        // Only the message sent after the reset is still on its way.
        assert_eq!(graph.awaiting_arrival(), 1);
    }

    #[test]
    fn malformed_payloads_are_dropped() {
        let mut session = VizSession::new(topology(), Speed::default());
        assert!(matches!(
            session.ingest("NodeA", StreamKind::Sent, "{not json"),
            Err(WireError::Json(_))
        ));
        assert!(matches!(
            session.ingest("NodeA", StreamKind::Sent, &sent(B, "12ab", "1")),
            Err(WireError::Timestamp(_))
        ));
        assert!(session.trace().ledger().is_empty());
        assert!(session.trace().time_index().is_empty());
    }

    #[test]
    fn stop_drops_events_until_restart() {
        let mut session = VizSession::new(topology(), Speed::default());
        session.ingest("NodeA", StreamKind::Sent, &sent(B, "10", "1")).unwrap();
        session.stop();
        assert!(!session.is_accepting());
        assert_eq!(session.playback().state(), PlaybackState::Paused);
        assert!(!session.go_live());

        session.ingest("NodeA", StreamKind::Sent, &sent(B, "20", "2")).unwrap();
        assert_eq!(session.trace().ledger().len(), 1);

        session.restart();
        assert!(session.is_accepting());
        assert_eq!(session.playback().state(), PlaybackState::Live);
        assert!(session.trace().ledger().is_empty());

        session.ingest("NodeA", StreamKind::Sent, &sent(B, "30", "3")).unwrap();
        assert_eq!(session.trace().ledger().len(), 1);
        assert_eq!(session.playback().virtual_time(), 30.0);
    }

    #[tokio::test]
    async fn reset_clears_trace_and_popup() {
        let mut session = VizSession::new(topology(), Speed::default());
        let mut events = session.trace_changed_relay.subscribe();
        session.ingest("NodeA", StreamKind::Sent, &sent(B, "10", "1")).unwrap();
        session.ingest("NodeA", StreamKind::Recv, &recv(B, "12", "9")).unwrap();
        let handle = session.trace().ledger().handle_at(0).unwrap();
        assert!(session.focus(handle, Half::Sent));
        assert!(session.popup().is_some());

        session.reset();

        expect_inserted(events.next().await);
        assert_eq!(events.next().await, Some(TraceEvent::Reset));
        assert!(session.popup().is_none());
        assert!(session.trace().ledger().is_empty());
        assert!(session.trace().time_index().is_empty());
        assert!(session.trace().lut().is_empty());
        assert!(session.trace().pending().is_empty());
    }

    #[test]
    fn focus_pauses_live_playback_on_the_message() {
        let mut session = VizSession::new(topology(), Speed::default());
        session.ingest("NodeA", StreamKind::Sent, &sent(B, "10", "1")).unwrap();
        session.ingest("NodeA", StreamKind::Sent, &sent(B, "50", "2")).unwrap();
        assert_eq!(session.playback().virtual_time(), 50.0);

        let first = session.trace().ledger().handle_at(0).unwrap();
        assert!(!session.focus(first, Half::Recv));
        assert!(session.focus(first, Half::Sent));
        assert_eq!(session.playback().state(), PlaybackState::Paused);
        assert_eq!(session.playback().virtual_time(), 10.0);

        session.ingest("NodeA", StreamKind::Sent, &sent(B, "5", "0")).unwrap();
        assert_eq!(session.popup().map(|popup| popup.ledger_index), Some(1));
        assert_eq!(session.playback().virtual_time(), 10.0);
    }

    #[test]
    fn replay_projects_messages_in_flight() {
        let mut session = VizSession::new(topology(), Speed::default());
        session.ingest("NodeA", StreamKind::Sent, &sent(B, "0", "1")).unwrap();
        session.ingest("NodeB", StreamKind::Recv, &recv(A, "100", "1")).unwrap();
        session.ingest("NodeB", StreamKind::Sent, &sent(A, "200", "2")).unwrap();

        let start = Instant::now();
        session.grab(0.0);
        session.release();
        let token = session.play(start).unwrap();
        session.tick(token, start + Duration::from_millis(40));

        let in_flight = session.in_flight();
        assert_eq!(in_flight.len(), 1);
        assert_eq!(in_flight[0].1.fraction, 0.4);
        assert_eq!(session.lookup(0), Some(LutRow { sent: 0, recv: Some(1) }));
    }

    #[test]
    fn chart_layout_places_rows_on_configured_node_lines() {
        let mut session = VizSession::new(topology(), Speed::default());
        session.ingest("NodeB", StreamKind::Sent, &sent(A, "0", "1")).unwrap();
        session.ingest("NodeA", StreamKind::Recv, &recv(B, "50", "1")).unwrap();
        session.ingest("NodeA", StreamKind::Sent, &sent(B, "100", "2")).unwrap();

        let viewport = Viewport { width: 1000.0, height: 100.0 };
        let layout = session.chart_layout(viewport, &ChartConfig::default());
        let columns: Vec<&str> = layout.columns.iter().map(|column| column.node_id.as_str()).collect();
        assert_eq!(columns, vec!["NodeA", "NodeB"]);

        let first = session.trace().ledger().handle_at(0).unwrap();
        let row = layout.row(first).unwrap();
        assert_eq!(row.sent, (857.0, 0.0));
        assert_eq!(row.recv, Some((143.0, 100.0)));
        assert_eq!(row.color, "#123456");

        let second = session.trace().ledger().handle_at(1).unwrap();
        assert_eq!(layout.row(second).unwrap().recv, None);
        // Content (200 px) is taller than the viewport allows.
        assert_eq!(layout.line_height, 200.0);
    }

    #[test]
    fn topology_change_clears_indicators_of_removed_nodes() {
        let mut session = VizSession::new(topology(), Speed::default());
        session.stream_failed("NodeB", StreamKind::Sent, "http://127.0.0.1:8082/sent", "refused");
        assert_eq!(session.connectivity().len(), 1);

        let mut smaller = topology();
        smaller.nodes.truncate(1);
        session.set_topology(smaller);
        assert!(session.connectivity().is_empty());
    }
}
