//! Swimlane chart geometry
//!
//! One vertical line per node; every message is a row with a sent dot on its
//! sender's line and, once received, a recv dot on the receiver's line joined
//! by a segment. Ordinates come from the Time-Index: consecutive timestamps are
//! spaced proportionally to their gap, the largest gap taking `max_space_y`.

use crate::trace::{MessageHandle, Trace};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartConfig {
    /// Minimum horizontal space per node line.
    pub min_space_x: f64,
    /// Pixel height of the largest gap between consecutive timestamps.
    pub max_space_y: f64,
    /// Outer padding of the node scale, in steps.
    pub padding: f64,
    pub margin_bottom: f64,
    pub dot_radius: f64,
}

impl Default for ChartConfig {
    fn default() -> Self {
        ChartConfig {
            min_space_x: 200.0,
            max_space_y: 100.0,
            padding: 0.2,
            margin_bottom: 30.0,
            dot_radius: 5.0,
        }
    }
}

impl ChartConfig {
    /// Rows are drawn this far below the top of the node lines.
    pub fn offset(&self) -> f64 {
        2.0 * self.dot_radius
    }

    pub fn min_width(&self, node_count: usize) -> f64 {
        node_count as f64 * self.min_space_x + 2.0 * self.min_space_x * self.padding
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Column {
    pub node_id: String,
    pub x: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChartRow {
    pub handle: MessageHandle,
    pub ledger_index: usize,
    pub color: String,
    pub sent: (f64, f64),
    pub recv: Option<(f64, f64)>,
}

impl ChartRow {
    /// Connecting segment, once the message is complete.
    pub fn segment(&self) -> Option<((f64, f64), (f64, f64))> {
        self.recv.map(|recv| (self.sent, recv))
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChartLayout {
    pub width: f64,
    /// Height of the node lines; the drawing is `offset + margin_bottom` taller.
    pub line_height: f64,
    pub columns: Vec<Column>,
    /// Ordinate of every Time-Index slot.
    pub slots: Vec<f64>,
    pub rows: Vec<ChartRow>,
}

impl ChartLayout {
    pub fn compute(trace: &Trace, node_ids: &[String], viewport: Viewport, config: &ChartConfig) -> Self {
        let width = viewport.width.max(config.min_width(node_ids.len()));
        let columns = point_scale(node_ids, width, config.padding);
        let slots = slot_positions(trace.time_index().as_slice(), config.max_space_y);

        let column_x = |node_id: &str| {
            columns
                .iter()
                .find(|column| column.node_id == node_id)
                .map(|column| column.x)
        };

        let rows = trace
            .ledger()
            .iter()
            .filter_map(|(ledger_index, handle, message)| {
                let row = trace.lookup(ledger_index)?;
                let sent_y = *slots.get(row.sent)?;
                let sent_x = column_x(&message.from_node)?;
                let recv = row.recv.and_then(|recv| {
                    Some((column_x(&message.to_node)?, *slots.get(recv)?))
                });
                Some(ChartRow {
                    handle,
                    ledger_index,
                    color: message.color.clone(),
                    sent: (sent_x, sent_y),
                    recv,
                })
            })
            .collect();

        let total = slots.last().copied().unwrap_or(0.0);
        let margin = config.margin_bottom + config.offset();
        let line_height = total.max(viewport.height - margin);

        ChartLayout {
            width,
            line_height,
            columns,
            slots,
            rows,
        }
    }

    pub fn row(&self, handle: MessageHandle) -> Option<&ChartRow> {
        self.rows.iter().find(|row| row.handle == handle)
    }
}

/// Cumulative ordinates of sorted timestamps, the largest gap scaled to
/// `max_space_y`. All-equal timestamps collapse onto 0.
pub fn slot_positions(times: &[shared::Timestamp], max_space_y: f64) -> Vec<f64> {
    let gaps: Vec<f64> = times
        .windows(2)
        .map(|pair| pair[1].as_f64() - pair[0].as_f64())
        .collect();
    let max_gap = gaps.iter().copied().fold(0.0, f64::max);
    let domain = if max_gap == 0.0 { 1.0 } else { max_gap };

    let mut positions = Vec::with_capacity(times.len());
    if times.is_empty() {
        return positions;
    }
    positions.push(0.0);
    let mut sum = 0.0;
    for gap in gaps {
        sum += gap / domain * max_space_y;
        positions.push(sum);
    }
    positions
}

/// Evenly spaced node lines with `padding` steps of outer space, rounded to
/// whole pixels.
pub fn point_scale(node_ids: &[String], width: f64, padding: f64) -> Vec<Column> {
    let count = node_ids.len() as f64;
    let step = (width / (count - 1.0 + 2.0 * padding).max(1.0)).floor();
    let start = ((width - step * (count - 1.0)) * 0.5).round();
    node_ids
        .iter()
        .enumerate()
        .map(|(index, node_id)| Column {
            node_id: node_id.clone(),
            x: start + step * index as f64,
        })
        .collect()
}
