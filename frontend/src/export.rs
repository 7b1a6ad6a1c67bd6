//! CSV export of the ledger, one row per message

use shared::ExportRecord;
use std::io::{self, Write};

/// Writes the header and one row per record, RFC 4180 quoted.
///
/// The payload column holds compact JSON; `timeRecv` is empty for messages
/// that were never received.
pub fn write_csv<W: Write>(mut out: W, records: &[ExportRecord]) -> io::Result<()> {
    writeln!(out, "{}", ExportRecord::COLUMNS.join(","))?;
    for record in records {
        let time_recv = record
            .time_recv
            .map(|time| time.to_string())
            .unwrap_or_default();
        let fields = [
            record.message.to_string(),
            record.from_node.clone(),
            record.to_node.clone(),
            record.time_sent.to_string(),
            time_recv,
            record.id.clone(),
            record.color.clone(),
        ];
        let line: Vec<String> = fields.iter().map(|field| quote(field)).collect();
        writeln!(out, "{}", line.join(","))?;
    }
    out.flush()
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
