use crate::beats::BeatType;
use crate::signal::{Events, LabeledEvents, MultiChannelSeries, TimeSeries};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Simple WFDB annotation entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WfdbAnnotation {
    pub sample: usize,
    pub code: u8,
}

const BEAT_CODES: [u8; 18] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 25, 34, 35, 38, 41];

impl WfdbAnnotation {
    /// True for QRS annotations; rhythm changes, artifacts and comments are not beats.
    pub fn is_beat(&self) -> bool {
        BEAT_CODES.contains(&self.code)
    }

    /// MIT annotation mnemonic for the code.
    pub fn symbol(&self) -> &'static str {
        code_symbol(self.code)
    }

    pub fn beat_type(&self) -> BeatType {
        BeatType::from_symbol(self.symbol())
    }
}

pub fn code_symbol(code: u8) -> &'static str {
    match code {
        1 => "N",
        2 => "L",
        3 => "R",
        4 => "a",
        5 => "V",
        6 => "F",
        7 => "J",
        8 => "A",
        9 => "S",
        10 => "E",
        11 => "j",
        12 => "/",
        13 => "Q",
        14 => "~",
        16 => "|",
        18 => "s",
        19 => "T",
        20 => "*",
        21 => "D",
        22 => "\"",
        23 => "=",
        24 => "p",
        25 => "B",
        26 => "^",
        27 => "t",
        28 => "+",
        29 => "u",
        30 => "?",
        31 => "!",
        32 => "[",
        33 => "]",
        34 => "e",
        35 => "n",
        36 => "@",
        37 => "x",
        38 => "f",
        39 => "(",
        40 => ")",
        41 => "r",
        _ => " ",
    }
}

/// Load the specified signal (lead) from a WFDB header/data pair into a TimeSeries.
pub fn load_wfdb_lead(header_path: &Path, lead: usize) -> Result<TimeSeries> {
    let record = load_wfdb_record(header_path)?;
    if lead >= record.channels {
        anyhow::bail!(
            "WFDB record contains {} signals, but lead {} was requested",
            record.channels,
            lead
        );
    }
    record
        .channel(lead)
        .with_context(|| format!("lead {} missing from {}", lead, header_path.display()))
}

/// Load every lead of a WFDB record. Channel names come from the signal
/// description column of the header.
pub fn load_wfdb_record(header_path: &Path) -> Result<MultiChannelSeries> {
    let header_text = fs::read_to_string(header_path)
        .with_context(|| format!("failed to read {}", header_path.display()))?;
    let names = parse_signal_names(&header_text);

    let (header, signals) = wfdb_rust::parse_wfdb(header_path);
    let fs = header
        .record
        .sampling_frequency
        .map(|f| f as f64)
        .unwrap_or(250.0);
    let channels: Vec<Vec<f64>> = header
        .signal_specs
        .iter()
        .zip(signals.iter())
        .map(|(spec, raw)| {
            let gain = spec.adc_gain.unwrap_or(1.0) as f64;
            let baseline = spec.baseline.or(spec.adc_zero).unwrap_or(0) as f64;
            raw.iter()
                .map(|&sample| (sample as f64 - baseline) / gain)
                .collect()
        })
        .collect();
    let names = (0..channels.len())
        .map(|i| names.get(i).cloned().unwrap_or_else(|| format!("ch{}", i)))
        .collect();
    Ok(MultiChannelSeries::from_channels(fs, names, &channels))
}

/// Signal descriptions from a `.hea` header: the ninth field onwards of each
/// signal specification line.
pub fn parse_signal_names(header_text: &str) -> Vec<String> {
    let mut lines = header_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));
    let n_signals = lines
        .next()
        .and_then(|record| record.split_whitespace().nth(1))
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(0);
    lines
        .take(n_signals)
        .enumerate()
        .map(|(i, line)| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() > 8 {
                fields[8..].join(" ")
            } else {
                format!("ch{}", i)
            }
        })
        .collect()
}

/// Parse MIT annotation binary stream into samples & codes.
pub fn parse_wfdb_annotations(buf: &[u8]) -> Vec<WfdbAnnotation> {
    let mut out = Vec::new();
    let mut idx = 0;
    let mut sample: usize = 0;
    while idx + 2 <= buf.len() {
        let word = u16::from_le_bytes([buf[idx], buf[idx + 1]]);
        idx += 2;
        let code = (word >> 10) as u8;
        let field = (word & 0x03FF) as usize;
        if code == 0 && field == 0 {
            break;
        }
        match code {
            59 => {
                if idx + 4 > buf.len() {
                    break;
                }
                let high = u16::from_le_bytes([buf[idx], buf[idx + 1]]) as u32;
                let low = u16::from_le_bytes([buf[idx + 2], buf[idx + 3]]) as u32;
                idx += 4;
                let skip = (high << 16) | low;
                sample = sample.wrapping_add(skip as usize);
            }
            // NUM/SUB/CHN modify the previous annotation and carry no time step.
            60..=62 => {}
            63 => {
                idx += field;
                if field % 2 != 0 {
                    idx += 1;
                }
            }
            _ => {
                sample = sample.wrapping_add(field);
                out.push(WfdbAnnotation { sample, code });
            }
        }
    }
    out
}

fn read_exact(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Read WFDB annotation file (ATR) and convert to beat events.
pub fn load_wfdb_events(path: &Path) -> Result<Events> {
    Ok(load_wfdb_labeled_beats(path)?.events())
}

/// Beat annotations with their symbols; non-beat markers are dropped.
pub fn load_wfdb_labeled_beats(path: &Path) -> Result<LabeledEvents> {
    let buf = read_exact(path)?;
    Ok(labeled_beats(&parse_wfdb_annotations(&buf)))
}

pub fn labeled_beats(annotations: &[WfdbAnnotation]) -> LabeledEvents {
    let mut out = LabeledEvents::default();
    for ann in annotations.iter().filter(|a| a.is_beat()) {
        out.push(ann.sample, ann.symbol());
    }
    out
}
