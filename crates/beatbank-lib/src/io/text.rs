use crate::signal::LabeledEvents;
use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use std::path::Path;

/// Parse newline-delimited floating point series, ignoring blank/comment lines.
pub fn parse_f64_series(text: &str) -> Result<Vec<f64>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: f64 = trimmed
            .parse()
            .with_context(|| format!("line {} is not f64: {}", idx + 1, trimmed))?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

/// Read a newline-delimited floating point series from disk.
pub fn read_f64_series(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_f64_series(&text)
}

/// Parse newline-delimited sample indices (usize) into an Events-friendly list.
pub fn parse_event_indices(text: &str) -> Result<Vec<usize>> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val: usize = trimmed
            .parse()
            .with_context(|| format!("line {} is not an integer index: {}", idx + 1, trimmed))?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no annotation indices found");
    }
    Ok(out)
}

/// Read event indices from a file.
pub fn read_event_indices(path: &Path) -> Result<Vec<usize>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_event_indices(&text)
}

/// Parse labelled beats, one `sample symbol` pair per line. Pairs may be
/// separated by whitespace or by a comma; a comma-separated file may start
/// with a header row. The first data line decides the separator.
pub fn parse_labeled_events(text: &str) -> Result<LabeledEvents> {
    let mut out = LabeledEvents::default();
    let comma_separated = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map_or(false, |line| line.contains(','));
    if comma_separated {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .trim(Trim::All)
            .flexible(true)
            .from_reader(text.as_bytes());
        for (row, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("bad CSV row {}", row + 1))?;
            let (sample, symbol) = match (record.get(0), record.get(1)) {
                (Some(sample), Some(symbol)) => (sample, symbol),
                _ => anyhow::bail!("row {} needs a sample and a symbol", row + 1),
            };
            match sample.parse::<usize>() {
                Ok(idx) => out.push(idx, symbol),
                Err(_) if row == 0 => continue,
                Err(_) => anyhow::bail!("row {} has a non-integer sample: {}", row + 1, sample),
            }
        }
    } else {
        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let mut fields = trimmed.split_whitespace();
            let (sample, symbol) = match (fields.next(), fields.next()) {
                (Some(sample), Some(symbol)) => (sample, symbol),
                _ => anyhow::bail!("line {} needs a sample and a symbol", idx + 1),
            };
            let sample: usize = sample
                .parse()
                .with_context(|| format!("line {} is not an integer index: {}", idx + 1, sample))?;
            out.push(sample, symbol);
        }
    }
    if out.is_empty() {
        anyhow::bail!("no labelled beats found");
    }
    Ok(out)
}

/// Read labelled beats from disk.
pub fn read_labeled_events(path: &Path) -> Result<LabeledEvents> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_labeled_events(&text)
}
