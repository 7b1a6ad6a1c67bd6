pub mod protocol;

use anyhow::{Context, Result, bail};
use futures_util::StreamExt;
use shared::{StreamKind, Topology};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use protocol::{SseDecoder, SseEvent};

/// One of the two event streams of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSource {
    pub node_id: String,
    pub kind: StreamKind,
    pub url: String,
}

impl StreamSource {
    pub fn all(topology: &Topology) -> Vec<StreamSource> {
        topology
            .nodes
            .iter()
            .flat_map(|node| {
                [StreamKind::Sent, StreamKind::Recv].map(|kind| StreamSource {
                    node_id: node.id.clone(),
                    kind,
                    url: node.stream_url(kind),
                })
            })
            .collect()
    }
}

/// What a stream task reports to the session owner.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    Connected {
        url: String,
    },
    Failed {
        node_id: String,
        kind: StreamKind,
        url: String,
        error: String,
    },
    Event {
        node_id: String,
        kind: StreamKind,
        data: String,
    },
}

/// Spawns one reconnecting task per stream of every node.
pub fn spawn_streams(
    topology: &Topology,
    updates: mpsc::Sender<StreamUpdate>,
    reconnect_delay: Duration,
) -> Result<Vec<JoinHandle<()>>> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")?;

    Ok(StreamSource::all(topology)
        .into_iter()
        .map(|source| {
            let client = client.clone();
            let updates = updates.clone();
            tokio::spawn(run_stream(client, source, updates, reconnect_delay))
        })
        .collect())
}

/// Reads one stream forever, reconnecting after `reconnect_delay` (or the
/// server's `retry:` hint) and resuming from the last event id seen. Ends
/// once the receiving side is gone.
pub async fn run_stream(
    client: reqwest::Client,
    source: StreamSource,
    updates: mpsc::Sender<StreamUpdate>,
    reconnect_delay: Duration,
) {
    let mut delay = reconnect_delay;
    let mut last_event_id: Option<String> = None;
    loop {
        let mut decoder = SseDecoder::default();
        let result = read_stream(&client, &source, &updates, &mut decoder, last_event_id.as_deref()).await;
        if let Some(id) = decoder.last_event_id() {
            last_event_id = Some(id.to_string());
        }
        match result {
            Ok(()) => log::info!("Stream {} ended", source.url),
            Err(error) => {
                let failed = StreamUpdate::Failed {
                    node_id: source.node_id.clone(),
                    kind: source.kind,
                    url: source.url.clone(),
                    error: format!("{error:#}"),
                };
                if updates.send(failed).await.is_err() {
                    return;
                }
            }
        }
        if updates.is_closed() {
            return;
        }
        if let Some(retry_ms) = decoder.retry_ms() {
            delay = Duration::from_millis(retry_ms);
        }
        log::debug!("Reconnecting to {} in {delay:?}", source.url);
        tokio::time::sleep(delay).await;
    }
}

async fn read_stream(
    client: &reqwest::Client,
    source: &StreamSource,
    updates: &mpsc::Sender<StreamUpdate>,
    decoder: &mut SseDecoder,
    last_event_id: Option<&str>,
) -> Result<()> {
    let mut request = client
        .get(&source.url)
        .header(reqwest::header::ACCEPT, "text/event-stream");
    if let Some(id) = last_event_id {
        request = request.header("Last-Event-ID", id);
    }
    let response = request
        .send()
        .await
        .with_context(|| format!("Failed to connect to {}", source.url))?
        .error_for_status()
        .with_context(|| format!("Stream {} refused", source.url))?;

    let connected = StreamUpdate::Connected {
        url: source.url.clone(),
    };
    if updates.send(connected).await.is_err() {
        return Ok(());
    }
    log::info!("Connected to {} stream of {}", source.kind, source.node_id);

    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.with_context(|| format!("Stream {} interrupted", source.url))?;
        for event in decoder.push(&chunk) {
            if !event.is_message() {
                log::debug!("Ignoring '{}' event on {}", event.event, source.url);
                continue;
            }
            let update = StreamUpdate::Event {
                node_id: source.node_id.clone(),
                kind: source.kind,
                data: event.data,
            };
            if updates.send(update).await.is_err() {
                return Ok(());
            }
        }
    }
    if updates.is_closed() {
        return Ok(());
    }
    bail!("Stream {} closed by server", source.url)
}
