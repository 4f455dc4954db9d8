//! Beat bank: beats pooled per channel name across many records.

use crate::beats::{extract_beats, BeatWindowConfig};
use crate::detectors::ecg::{detect_r_peaks_with_config, QrsDetectorConfig};
use crate::error::{BeatError, BeatResult};
use crate::preprocess::{filter_band, fill_missing, is_valid, normalize, BandType};
use crate::signal::{Events, MultiChannelSeries, TimeSeries};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeatBankConfig {
    pub window: BeatWindowConfig,
    /// Bandpass edges in Hz applied to every channel before detection.
    pub f_low: f64,
    pub f_high: f64,
    /// Butterworth order of the bandpass.
    pub order: usize,
    /// Only this frame range of each record is used. Provided beat indices
    /// refer to the whole record.
    pub section: Option<Section>,
    /// Channels whose name starts with one of these are ignored.
    pub skip_prefixes: Vec<String>,
    pub detector: QrsDetectorConfig,
}

impl Default for BeatBankConfig {
    fn default() -> Self {
        Self {
            window: BeatWindowConfig::default(),
            f_low: 0.5,
            f_high: 40.0,
            order: 2,
            section: None,
            skip_prefixes: vec!["aV".into()],
            detector: QrsDetectorConfig::default(),
        }
    }
}

/// Half-open frame range `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub start: usize,
    pub stop: usize,
}

impl Section {
    /// Range covering `start_s..stop_s` seconds at `fs`.
    pub fn from_seconds(fs: f64, start_s: f64, stop_s: f64) -> Self {
        Self {
            start: (start_s * fs).round() as usize,
            stop: (stop_s * fs).round() as usize,
        }
    }
}

impl BeatBankConfig {
    pub fn validate(&self) -> BeatResult<()> {
        if let Some(section) = self.section {
            if section.start >= section.stop {
                return Err(BeatError::invalid(format!(
                    "section must satisfy start < stop, got [{}, {})",
                    section.start, section.stop
                )));
            }
        }
        self.window.validate()
    }
}

/// One record to pool. Without `beats` the R-peaks are detected per channel.
#[derive(Debug, Clone)]
pub struct RecordInput {
    pub name: String,
    pub signal: MultiChannelSeries,
    pub beats: Option<Events>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatBank {
    pub channels: BTreeMap<String, Vec<Vec<f64>>>,
}

impl BeatBank {
    pub fn get(&self, channel: &str) -> Option<&[Vec<f64>]> {
        self.channels.get(channel).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Beat count per channel.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.channels
            .iter()
            .map(|(name, beats)| (name.clone(), beats.len()))
            .collect()
    }

    pub fn total_beats(&self) -> usize {
        self.channels.values().map(Vec::len).sum()
    }

    pub fn merge(&mut self, other: BeatBank) {
        for (name, beats) in other.channels {
            self.channels.entry(name).or_default().extend(beats);
        }
    }

    /// Drop channels that ended up without beats; returns their names.
    pub fn remove_empty(&mut self) -> Vec<String> {
        let empty: Vec<String> = self
            .channels
            .iter()
            .filter(|(_, beats)| beats.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        self.channels.retain(|_, beats| !beats.is_empty());
        for name in &empty {
            warn!("obtained no beats for signal {}; removing", name);
        }
        empty
    }
}

/// Pool the beats of every usable channel of every record.
pub fn build_beat_bank(records: &[RecordInput], cfg: &BeatBankConfig) -> BeatResult<BeatBank> {
    cfg.validate()?;
    let mut bank = BeatBank::default();
    for record in records {
        bank.merge(bank_record(record, cfg)?);
    }
    finish(bank, records.len())
}

/// Same as [`build_beat_bank`] with one rayon task per record.
#[cfg(feature = "parallel")]
pub fn build_beat_bank_parallel(
    records: &[RecordInput],
    cfg: &BeatBankConfig,
) -> BeatResult<BeatBank> {
    use rayon::prelude::*;

    cfg.validate()?;
    let partial: Vec<BeatBank> = records
        .par_iter()
        .map(|record| bank_record(record, cfg))
        .collect::<BeatResult<_>>()?;
    let mut bank = BeatBank::default();
    for part in partial {
        bank.merge(part);
    }
    finish(bank, records.len())
}

fn finish(mut bank: BeatBank, n_records: usize) -> BeatResult<BeatBank> {
    bank.remove_empty();
    info!(
        "beat bank: {} beats over {} channels from {} records",
        bank.total_beats(),
        bank.channels.len(),
        n_records
    );
    Ok(bank)
}

fn bank_record(record: &RecordInput, cfg: &BeatBankConfig) -> BeatResult<BeatBank> {
    let signal = &record.signal;
    let mut bank = BeatBank::default();
    let frames = signal.frames();
    let (from, to) = match cfg.section {
        Some(section) => (section.start.min(frames), section.stop.min(frames)),
        None => (0, frames),
    };
    if from >= to {
        warn!(
            "{}: section starts past the end of {} frames; skipping record",
            record.name, frames
        );
        return Ok(bank);
    }
    let provided: Option<Vec<usize>> = record.beats.as_ref().map(|events| {
        events
            .indices
            .iter()
            .filter(|&&i| (from..to).contains(&i))
            .map(|&i| i - from)
            .collect()
    });

    for ch in 0..signal.channels {
        let name = signal.channel_name(ch);
        if cfg.skip_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            debug!("{}: skipping channel {}", record.name, name);
            continue;
        }
        let raw = match signal.channel(ch) {
            Some(ts) => ts.data[from..to].to_vec(),
            None => continue,
        };
        if !is_valid(&raw) {
            debug!("{}: channel {} is flat or empty", record.name, name);
            continue;
        }

        let filled = fill_missing(&raw);
        let filtered = match filter_band(
            &filled,
            signal.fs,
            cfg.f_low,
            cfg.f_high,
            cfg.order,
            BandType::Pass,
        ) {
            Ok(filtered) => filtered,
            Err(BeatError::TooShort { len, min }) => {
                warn!(
                    "{}: channel {} has {} samples, {} needed for filtering; skipping",
                    record.name, name, len, min
                );
                continue;
            }
            Err(e) => return Err(e),
        };
        let beat_inds = match &provided {
            Some(indices) => indices.clone(),
            None => {
                let ts = TimeSeries {
                    fs: signal.fs,
                    data: filtered.clone(),
                };
                detect_r_peaks_with_config(&ts, &cfg.detector).indices
            }
        };
        if beat_inds.len() < 2 {
            debug!("{}: channel {} has too few beats", record.name, name);
            continue;
        }

        let normalized = normalize(&filtered);
        match extract_beats(&normalized, &beat_inds, &cfg.window) {
            Ok(beats) => {
                bank.channels
                    .entry(name)
                    .or_default()
                    .extend(beats.segments.into_iter().map(|seg| seg.data));
            }
            Err(BeatError::InsufficientData { low, high }) => {
                warn!(
                    "{}: channel {} has no RR interval inside ({}, {}); skipping",
                    record.name, name, low, high
                );
            }
            Err(e) => return Err(e),
        }
    }
    Ok(bank)
}
