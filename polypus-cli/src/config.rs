use anyhow::{Context, Result, bail};
use shared::Topology;
use std::path::Path;

/// Loads a topology file, TOML or JSON by extension.
pub fn load_topology(path: &Path) -> Result<Topology> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read topology file: {}", path.display()))?;

    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);
    let topology = match extension.as_deref() {
        Some("toml") => Topology::from_toml_str(&content),
        Some("json") => Topology::from_json_str(&content),
        other => bail!(
            "Unsupported topology format {:?} for {} (expected .toml or .json)",
            other.unwrap_or(""),
            path.display()
        ),
    }
    .with_context(|| format!("Failed to parse topology file: {}", path.display()))?;

    log::debug!("Loaded {} node(s) from {}", topology.nodes.len(), path.display());
    Ok(topology)
}
