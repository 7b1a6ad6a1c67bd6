//! Playback commands typed on stdin while tailing

use anyhow::{Context, Result, anyhow, bail};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    Pause,
    Play,
    Live,
    /// Grab, drag to the fraction and release.
    Seek(f64),
    Speed(f64),
    /// Open the sent-half detail of the message at a ledger index.
    Focus(usize),
    Stop,
    Restart,
    Status,
}

impl FromStr for ControlCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or_else(|| anyhow!("empty command"))?;
        let argument = words.next();
        if let Some(extra) = words.next() {
            bail!("unexpected argument '{extra}'");
        }

        let parsed = match (command.to_ascii_lowercase().as_str(), argument) {
            ("pause", None) => ControlCommand::Pause,
            ("play", None) => ControlCommand::Play,
            ("live", None) => ControlCommand::Live,
            ("stop", None) => ControlCommand::Stop,
            ("restart", None) => ControlCommand::Restart,
            ("status", None) => ControlCommand::Status,
            ("seek", Some(fraction)) => ControlCommand::Seek(
                fraction
                    .parse()
                    .with_context(|| format!("seek expects a fraction, got '{fraction}'"))?,
            ),
            ("speed", Some(factor)) => ControlCommand::Speed(
                factor
                    .trim_end_matches('x')
                    .parse()
                    .with_context(|| format!("speed expects a factor, got '{factor}'"))?,
            ),
            ("focus", Some(index)) => ControlCommand::Focus(
                index
                    .parse()
                    .with_context(|| format!("focus expects a ledger index, got '{index}'"))?,
            ),
            (other, _) => bail!("unknown command '{other}'"),
        };
        Ok(parsed)
    }
}
