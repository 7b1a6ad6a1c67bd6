use indexmap::IndexMap;
use serde::Serialize;
use shared::StreamKind;

/// Persistent failure notice for one stream URL.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ConnectivityIndicator {
    pub id: String,
    pub node_id: String,
    pub stream: StreamKind,
    pub url: String,
    pub title: String,
    pub message: String,
    pub technical_error: String,
    /// Consecutive failures since the stream last connected.
    pub failures: u32,
}

impl ConnectivityIndicator {
    pub fn new_stream_error(node_id: &str, stream: StreamKind, url: &str, error: &str) -> Self {
        Self {
            id: format!("stream_error_{node_id}_{stream}"),
            node_id: node_id.to_string(),
            stream,
            url: url.to_string(),
            title: "Connection Error".to_string(),
            message: format!("Cannot reach {node_id} ({stream} stream)"),
            technical_error: format!("Stream {url} failed: {error}"),
            failures: 1,
        }
    }
}

/// Indicators keyed by stream URL, in order of first failure.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityBoard {
    indicators: IndexMap<String, ConnectivityIndicator>,
}

impl ConnectivityBoard {
    /// Raises or refreshes the indicator for `url`. Returns true when it is new.
    pub fn mark_failed(&mut self, node_id: &str, stream: StreamKind, url: &str, error: &str) -> bool {
        if let Some(existing) = self.indicators.get_mut(url) {
            existing.failures += 1;
            existing.technical_error = format!("Stream {url} failed: {error}");
            return false;
        }
        log::warn!("Stream {url} of {node_id} failed: {error}");
        self.indicators.insert(
            url.to_string(),
            ConnectivityIndicator::new_stream_error(node_id, stream, url, error),
        );
        true
    }

    /// Clears the indicator for `url`. Returns true when one was raised.
    pub fn mark_connected(&mut self, url: &str) -> bool {
        let cleared = self.indicators.shift_remove(url);
        if let Some(indicator) = &cleared {
            log::info!(
                "Stream {url} of {} reconnected after {} failure(s)",
                indicator.node_id, indicator.failures
            );
        }
        cleared.is_some()
    }

    /// Drops indicators of nodes no longer in the configuration.
    pub fn retain_nodes<'a>(&mut self, node_ids: impl IntoIterator<Item = &'a str>) {
        let keep: Vec<&str> = node_ids.into_iter().collect();
        self.indicators
            .retain(|_, indicator| keep.contains(&indicator.node_id.as_str()));
    }

    pub fn indicators(&self) -> impl Iterator<Item = &ConnectivityIndicator> {
        self.indicators.values()
    }

    pub fn get(&self, url: &str) -> Option<&ConnectivityIndicator> {
        self.indicators.get(url)
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_persists_until_reconnect() {
        let mut board = ConnectivityBoard::default();
        let url = "http://127.0.0.1:8081/sent";

        assert!(board.mark_failed("A", StreamKind::Sent, url, "connection refused"));
        assert!(!board.mark_failed("A", StreamKind::Sent, url, "connection refused"));
        assert_eq!(board.get(url).map(|i| i.failures), Some(2));
        assert_eq!(board.get(url).map(|i| i.id.as_str()), Some("stream_error_A_sent"));

        assert!(board.mark_connected(url));
        assert!(!board.mark_connected(url));
        assert!(board.is_empty());
    }

    #[test]
    fn removed_nodes_lose_their_indicators() {
        let mut board = ConnectivityBoard::default();
        board.mark_failed("A", StreamKind::Sent, "http://a/sent", "timeout");
        board.mark_failed("B", StreamKind::Recv, "http://b/recv", "timeout");
        board.mark_failed("A", StreamKind::Recv, "http://a/recv", "timeout");

        board.retain_nodes(["A"]);

        let urls: Vec<&str> = board.indicators().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["http://a/sent", "http://a/recv"]);
    }
}
