//! Channel cleanup applied before beats are pulled out of a record.

use crate::error::{BeatError, BeatResult};
use sci_rs::signal::filter::design::{
    butter_dyn, DigitalFilter, FilterBandType, FilterOutputType, SosFormatFilter,
};
use sci_rs::signal::filter::sosfiltfilt_dyn;
use serde::{Deserialize, Serialize};

/// Replace NaN samples by linear interpolation between the nearest finite
/// neighbours. Leading and trailing gaps hold the nearest finite value; an
/// all-NaN channel becomes zeros.
pub fn fill_missing(data: &[f64]) -> Vec<f64> {
    let finite: Vec<usize> = data
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .map(|(i, _)| i)
        .collect();
    let (first, last) = match (finite.first(), finite.last()) {
        (Some(&f), Some(&l)) => (f, l),
        _ => return vec![0.0; data.len()],
    };

    let mut out = data.to_vec();
    for v in out.iter_mut().take(first) {
        *v = data[first];
    }
    for v in out.iter_mut().skip(last + 1) {
        *v = data[last];
    }
    for pair in finite.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b - a < 2 {
            continue;
        }
        let span = (b - a) as f64;
        for (k, v) in out[a + 1..b].iter_mut().enumerate() {
            let t = (k + 1) as f64 / span;
            *v = data[a] + t * (data[b] - data[a]);
        }
    }
    out
}

/// A channel is usable when it holds at least one finite sample and is not a
/// flat line.
pub fn is_valid(data: &[f64]) -> bool {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in data.iter().filter(|v| v.is_finite()) {
        min = min.min(v);
        max = max.max(v);
    }
    min.is_finite() && max > min
}

/// Pass or reject the band between the two cutoffs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BandType {
    #[default]
    Pass,
    Stop,
}

/// Zero-phase Butterworth band filter of the given order, run forward and
/// backward over second-order sections.
pub fn filter_band(
    data: &[f64],
    fs: f64,
    f_low: f64,
    f_high: f64,
    order: usize,
    band: BandType,
) -> BeatResult<Vec<f64>> {
    if order == 0 {
        return Err(BeatError::invalid("filter order must be positive"));
    }
    if !(fs > 0.0 && 0.0 < f_low && f_low < f_high && f_high < fs / 2.0) {
        return Err(BeatError::invalid(format!(
            "band edges must satisfy 0 < f_low < f_high < fs/2, got ({}, {}) at {} Hz",
            f_low, f_high, fs
        )));
    }
    let btype = match band {
        BandType::Pass => FilterBandType::Bandpass,
        BandType::Stop => FilterBandType::Bandstop,
    };
    let filter = butter_dyn(
        order,
        vec![f_low, f_high],
        Some(btype),
        Some(false),
        Some(FilterOutputType::Sos),
        Some(fs),
    );
    let sos = match filter {
        DigitalFilter::Sos(SosFormatFilter { sos }) => sos,
        _ => return Err(BeatError::invalid("butterworth design did not yield sections")),
    };

    // Forward-backward filtering pads both ends by three filter lengths.
    let min = 3 * (2 * sos.len() + 1);
    if data.len() <= min {
        return Err(BeatError::TooShort {
            len: data.len(),
            min: min + 1,
        });
    }
    Ok(sosfiltfilt_dyn(data.iter(), &sos))
}

/// [`filter_band`] keeping the band.
pub fn bandpass(
    data: &[f64],
    fs: f64,
    f_low: f64,
    f_high: f64,
    order: usize,
) -> BeatResult<Vec<f64>> {
    filter_band(data, fs, f_low, f_high, order, BandType::Pass)
}

/// Single causal pass of one-pole high-pass and low-pass sections; cheap
/// conditioning for the QRS detector.
pub(crate) fn bandpass_once(data: &[f64], fs: f64, low: f64, high: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let hp = if low > 0.0 {
        single_pole_highpass(data, fs, low)
    } else {
        data.to_vec()
    };
    if high <= 0.0 || high >= fs * 0.5 {
        hp
    } else {
        single_pole_lowpass(&hp, fs, high)
    }
}

fn single_pole_highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = rc / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev_y = 0.0;
    let mut prev_x = data[0];
    for &x in data {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }
    out
}

fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = dt / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = data[0];
    for &x in data {
        prev += alpha * (x - prev);
        out.push(prev);
    }
    out
}

/// Zero mean, unit standard deviation. Flat signals come back unchanged.
pub fn normalize(data: &[f64]) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let (min, max) = data
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if max - min == 0.0 {
        return data.to_vec();
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let sd = (data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    data.iter().map(|v| (v - mean) / sd).collect()
}
