//! `polypus tail`: live reconciliation of every node's streams
//!
//! The session lives on this task only. Stream tasks, stdin and the replay
//! timer all talk to it through channels.

use crate::config;
use crate::control::ControlCommand;
use crate::sse::{self, StreamUpdate};
use anyhow::{Context, Result};
use frontend::{TraceEvent, VizSession};
use frontend::export::write_csv;
use frontend::playback::{ReplayToken, Speed};
use frontend::views::{GraphView, Half};
use futures_util::StreamExt;
use shared::Topology;
use std::fs::File;
use std::io::{BufRead, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const REPLAY_TICK: Duration = Duration::from_millis(50);

pub struct TailOptions {
    pub config: PathBuf,
    pub export: Option<PathBuf>,
    pub reconnect_delay: Duration,
    pub speed: Speed,
}

#[derive(Debug, Default, Clone, Copy)]
struct TailStats {
    events: u64,
    malformed: u64,
}

/// Connection tasks for every node stream. Stopping aborts them; starting
/// again opens fresh connections.
struct StreamSet {
    topology: Topology,
    updates: mpsc::Sender<StreamUpdate>,
    reconnect_delay: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl StreamSet {
    fn start(&mut self) -> Result<()> {
        self.stop();
        self.tasks = sse::spawn_streams(&self.topology, self.updates.clone(), self.reconnect_delay)?;
        log::info!("Listening on {} stream(s)", self.tasks.len());
        Ok(())
    }

    fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        log::info!("Closed all streams");
    }
}

/// The replay timer currently feeding ticks, if any.
struct ReplayTimer {
    token: ReplayToken,
    task: JoinHandle<()>,
}

pub async fn run_tail(options: TailOptions) -> Result<()> {
    let topology = config::load_topology(&options.config)?;
    let mut session = VizSession::new(topology.clone(), options.speed);
    let observers = spawn_observers(&session);

    let (updates_tx, mut updates) = mpsc::channel(1024);
    let mut streams = StreamSet {
        topology,
        updates: updates_tx,
        reconnect_delay: options.reconnect_delay,
        tasks: Vec::new(),
    };
    streams.start()?;
    let mut commands = spawn_stdin_reader();
    let (ticks_tx, mut ticks) = mpsc::unbounded_channel();
    let mut timer: Option<ReplayTimer> = None;
    let mut stats = TailStats::default();

    log::info!("Commands: status, pause, play, live, seek <0..1>, speed <x>, focus <n>, stop, restart");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result.context("Failed to listen for Ctrl-C")?;
                log::info!("Interrupted, shutting down");
                break;
            }
            Some(update) = updates.recv() => {
                apply_update(&mut session, update, &mut stats);
            }
            Some(line) = commands.recv() => {
                match line.parse::<ControlCommand>() {
                    Ok(command) => handle_command(&mut session, &mut streams, &mut updates, command, &stats),
                    Err(error) => log::warn!("Ignoring command '{}': {error:#}", line.trim()),
                }
            }
            Some(token) = ticks.recv() => {
                session.tick(token, Instant::now());
            }
        }
        sync_replay_timer(&session, &mut timer, &ticks_tx);
    }

    streams.stop();
    if let Some(timer) = timer.take() {
        timer.task.abort();
    }
    session.stop();
    log::info!(
        "Processed {} event(s), {} malformed",
        stats.events, stats.malformed
    );

    if let Some(path) = &options.export {
        export_csv(&session, path)?;
    }

    drop(session);
    for observer in observers {
        if let Err(error) = observer.await {
            log::debug!("Observer task ended abnormally: {error}");
        }
    }
    Ok(())
}

fn apply_update(session: &mut VizSession, update: StreamUpdate, stats: &mut TailStats) {
    match update {
        StreamUpdate::Connected { url } => session.stream_connected(&url),
        StreamUpdate::Failed {
            node_id,
            kind,
            url,
            error,
        } => session.stream_failed(&node_id, kind, &url, &error),
        StreamUpdate::Event {
            node_id,
            kind,
            data,
        } => {
            stats.events += 1;
            if session.ingest(&node_id, kind, &data).is_err() {
                stats.malformed += 1;
            }
        }
    }
}

fn handle_command(
    session: &mut VizSession,
    streams: &mut StreamSet,
    updates: &mut mpsc::Receiver<StreamUpdate>,
    command: ControlCommand,
    stats: &TailStats,
) {
    let now = Instant::now();
    match command {
        ControlCommand::Pause => session.pause(now),
        ControlCommand::Play => {
            if session.play(now).is_none() {
                log::info!("Nothing to replay from {:?}", session.playback().state());
            }
        }
        ControlCommand::Live => {
            if !session.go_live() {
                log::warn!("Live mode is disabled until 'restart'");
            }
        }
        ControlCommand::Seek(fraction) => {
            let current = session.playback().position_fraction(session.span());
            session.grab(current);
            session.drag(fraction);
            session.release();
        }
        ControlCommand::Speed(factor) => session.set_speed(Speed::nearest(factor), now),
        ControlCommand::Focus(ledger_index) => {
            let Some(handle) = session.trace().ledger().handle_at(ledger_index) else {
                log::warn!("No message at ledger index {ledger_index}");
                return;
            };
            session.focus(handle, Half::Sent);
            if let Some(popup) = session.popup() {
                println!(
                    "#{} {} -> {} id={} sent={} recv={} {}",
                    popup.ledger_index,
                    popup.message.from_node,
                    popup.message.to_node,
                    popup.message.id,
                    popup.message.time_sent,
                    popup
                        .message
                        .time_recv
                        .map(|time| time.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    popup.message.message
                );
            }
        }
        ControlCommand::Stop => {
            streams.stop();
            session.stop();
        }
        ControlCommand::Restart => {
            streams.stop();
            // Whatever the closed connections left queued belongs to the old trace.
            while updates.try_recv().is_ok() {}
            session.restart();
            if let Err(error) = streams.start() {
                log::error!("Failed to reopen streams: {error:#}");
            }
        }
        ControlCommand::Status => print_status(session, stats),
    }
}

fn print_status(session: &VizSession, stats: &TailStats) {
    let playback = session.playback();
    let trace = session.trace();
    println!(
        "{:?} at {:.0} ms ({:.0}%), speed {}",
        playback.state(),
        playback.virtual_time(),
        playback.position_fraction(session.span()) * 100.0,
        playback.speed()
    );
    let awaiting = trace
        .ledger()
        .iter()
        .filter(|(_, _, message)| !message.is_complete())
        .count();
    println!(
        "{} message(s), {} awaiting receive, {} unmatched receive(s), {} in flight, {} event(s), {} malformed, {} skewed",
        trace.ledger().len(),
        awaiting,
        trace.pending().len(),
        session.in_flight().len(),
        stats.events,
        stats.malformed,
        trace.skewed_inserts()
    );
    for indicator in session.connectivity().indicators() {
        println!(
            "  ⚠️  {} ({} failure(s)): {}",
            indicator.message, indicator.failures, indicator.technical_error
        );
    }
}

/// Keeps exactly one timer task alive for the session's current replay.
fn sync_replay_timer(
    session: &VizSession,
    timer: &mut Option<ReplayTimer>,
    ticks: &mpsc::UnboundedSender<ReplayToken>,
) {
    let wanted = session.playback().replay_token();
    if timer.as_ref().map(|timer| timer.token) == wanted {
        return;
    }
    if let Some(stale) = timer.take() {
        stale.task.abort();
    }
    if let Some(token) = wanted {
        let ticks = ticks.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(REPLAY_TICK);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if ticks.send(token).is_err() {
                    break;
                }
            }
        });
        *timer = Some(ReplayTimer { token, task });
    }
}

/// Reads stdin on a detached thread. A blocking read there cannot hold up
/// runtime shutdown the way a read on the blocking pool does.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(error) => {
                    log::warn!("Failed to read stdin: {error}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Follows trace events in order: logs them and keeps a graph model current.
#[derive(Debug, Default)]
struct TraceLog {
    graph: GraphView,
    ledger_len: usize,
    late_inserts: usize,
}

impl TraceLog {
    fn apply(&mut self, event: &TraceEvent) {
        match event {
            TraceEvent::Inserted(inserted) => {
                let message = &inserted.message;
                let late = !inserted.renumbering.is_append(self.ledger_len);
                self.ledger_len += 1;
                if late {
                    self.late_inserts += 1;
                }
                log::info!(
                    "#{} {} -> {} id={} sent={}{}",
                    inserted.ledger_index,
                    message.from_node,
                    message.to_node,
                    message.id,
                    message.time_sent,
                    if late { " (late)" } else { "" }
                );
                let links_before = self.graph.link_count();
                let hint = self.graph.on_trace_event(event);
                if self.graph.link_count() > links_before {
                    log::info!("Link {} -> {} discovered", message.from_node, message.to_node);
                }
                log::debug!("{hint:?}");
            }
            TraceEvent::Completed(completed) => {
                let message = &completed.message;
                let latency = message
                    .time_recv
                    .map(|recv| recv.abs_diff(message.time_sent))
                    .unwrap_or_default();
                log::info!(
                    "#{} {} -> {} id={} received after {latency} ms",
                    completed.ledger_index,
                    message.from_node,
                    message.to_node,
                    message.id
                );
                match self.graph.on_trace_event(event) {
                    Some(hint) => log::debug!("{hint:?}"),
                    None => log::warn!("Completion of #{} arrived without its insert", completed.ledger_index),
                }
            }
            TraceEvent::Reset => {
                self.ledger_len = 0;
                self.late_inserts = 0;
                self.graph.on_trace_event(event);
            }
        }
    }
}

/// Logs domain events and keeps the graph model in step with them.
fn spawn_observers(session: &VizSession) -> Vec<JoinHandle<()>> {
    let mut events = session.trace_changed_relay.subscribe();
    let mut states = session.playback_state_changed_relay.subscribe();

    let trace = tokio::spawn(async move {
        let mut trace_log = TraceLog::default();
        while let Some(event) = events.next().await {
            trace_log.apply(&event);
        }
        log::debug!(
            "Trace observer done: {} link(s), {} message(s) awaiting arrival",
            trace_log.graph.link_count(),
            trace_log.graph.awaiting_arrival()
        );
    });

    let playback = tokio::spawn(async move {
        while let Some(state) = states.next().await {
            log::info!("Playback {state:?}");
        }
    });

    vec![trace, playback]
}

fn export_csv(session: &VizSession, path: &Path) -> Result<()> {
    let records = session.export_records();
    let file = File::create(path)
        .with_context(|| format!("Failed to create export file: {}", path.display()))?;
    write_csv(BufWriter::new(file), &records)
        .with_context(|| format!("Failed to write export file: {}", path.display()))?;
    log::info!("Exported {} message(s) to {}", records.len(), path.display());
    Ok(())
}
