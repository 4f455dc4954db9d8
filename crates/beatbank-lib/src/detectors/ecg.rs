use crate::preprocess::bandpass_once;
use crate::signal::{Events, TimeSeries};
use log::debug;
use serde::{Deserialize, Serialize};

/// Parameters of the QRS detector used when a record carries no beat annotations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct QrsDetectorConfig {
    /// Lower cutoff for the single-pole high-pass filter (Hz).
    pub lowcut_hz: f64,
    /// Upper cutoff for the single-pole low-pass filter (Hz).
    pub highcut_hz: f64,
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Refractory period between two detections (seconds).
    pub min_rr_s: f64,
    /// Scale between noise and signal envelopes for the adaptive threshold.
    pub threshold_scale: f64,
    /// How far back to search (seconds) for the precise R-peak after a detection.
    pub search_back_s: f64,
}

impl Default for QrsDetectorConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 5.0,
            highcut_hz: 15.0,
            integration_window_s: 0.150,
            min_rr_s: 0.200,
            threshold_scale: 0.6,
            search_back_s: 0.150,
        }
    }
}

/// Detect R-peaks with default settings and the given refractory period.
pub fn detect_r_peaks(ts: &TimeSeries, min_rr_s: f64) -> Events {
    let cfg = QrsDetectorConfig {
        min_rr_s: min_rr_s.max(0.15),
        ..QrsDetectorConfig::default()
    };
    detect_r_peaks_with_config(ts, &cfg)
}

/// Envelope-threshold detector with a local-maximum fallback for signals where
/// the adaptive threshold finds fewer than two beats.
pub fn detect_r_peaks_with_config(ts: &TimeSeries, cfg: &QrsDetectorConfig) -> Events {
    if ts.is_empty() {
        return Events::from_indices(Vec::new());
    }
    let fs = ts.fs.max(1.0);
    let bandpassed = bandpass_once(&ts.data, fs, cfg.lowcut_hz, cfg.highcut_hz);
    let envelope = integrated_energy(&bandpassed, fs, cfg.integration_window_s);
    let peaks = pick_peaks(&bandpassed, &envelope, fs, cfg);
    if peaks.len() >= 2 {
        return Events::from_indices(peaks);
    }
    debug!(
        "adaptive threshold found {} peaks; using local-maximum fallback",
        peaks.len()
    );
    Events::from_indices(fallback_peaks(&ts.data, fs, cfg.min_rr_s))
}

/// Squared first difference smoothed by a trailing moving average.
fn integrated_energy(data: &[f64], fs: f64, window_s: f64) -> Vec<f64> {
    let win = ((window_s * fs).round() as usize).max(1);
    let mut out = Vec::with_capacity(data.len());
    let mut energy = Vec::with_capacity(data.len());
    let mut acc = 0.0;
    for i in 0..data.len() {
        let d = if i == 0 { 0.0 } else { data[i] - data[i - 1] };
        energy.push(d * d);
        acc += d * d;
        if i >= win {
            acc -= energy[i - win];
        }
        out.push(acc / win as f64);
    }
    out
}

fn pick_peaks(
    bandpassed: &[f64],
    envelope: &[f64],
    fs: f64,
    cfg: &QrsDetectorConfig,
) -> Vec<usize> {
    let refractory = ((cfg.min_rr_s * fs).round() as usize).max(1);
    let search = ((cfg.search_back_s * fs).round() as usize).max(1);

    let init = envelope.len().min((fs as usize).max(1));
    let avg = envelope[..init].iter().sum::<f64>() / init as f64;
    let mut signal_level = avg;
    let mut noise_level = avg * 0.5;
    let threshold_of =
        |signal: f64, noise: f64| noise + cfg.threshold_scale * (signal - noise).max(0.0);
    let mut threshold = threshold_of(signal_level, noise_level);
    let mut last_detection: Option<usize> = None;
    let mut peaks = Vec::new();

    for (i, &sample) in envelope.iter().enumerate() {
        let refractory_ok = last_detection.map_or(true, |last| i - last >= refractory);
        if sample >= threshold && refractory_ok {
            let start = i.saturating_sub(search);
            let end = i.min(bandpassed.len() - 1);
            let idx = (start..=end)
                .max_by(|&a, &b| bandpassed[a].total_cmp(&bandpassed[b]))
                .unwrap_or(i);
            peaks.push(idx);
            last_detection = Some(i);
            signal_level = 0.125 * sample + 0.875 * signal_level;
        } else {
            noise_level = 0.125 * sample + 0.875 * noise_level;
        }
        threshold = threshold_of(signal_level, noise_level);
    }

    peaks.sort_unstable();
    peaks.dedup();
    peaks
}

fn fallback_peaks(data: &[f64], fs: f64, min_rr_s: f64) -> Vec<usize> {
    if data.len() < 3 {
        return Vec::new();
    }
    let min_gap = ((min_rr_s * fs) as usize).max(1);
    let win = ((0.150 * fs) as usize).max(1);
    let mut detrended = Vec::with_capacity(data.len());
    let mut acc = 0.0;
    for i in 0..data.len() {
        acc += data[i];
        if i >= win {
            acc -= data[i - win];
        }
        detrended.push(data[i] - acc / win as f64);
    }

    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..data.len() - 1 {
        let y = detrended[i];
        let is_peak = y > 0.0 && y > detrended[i - 1] && y > detrended[i + 1];
        let spaced = peaks.last().map_or(true, |&last| i - last >= min_gap);
        if is_peak && spaced {
            peaks.push(i);
        }
    }
    peaks
}
