use crate::signal::TimeSeries;
use std::f64::consts::PI;

/// Gaussian QRS bumps on a slow baseline wander, first beat at 0.5 s.
/// Returns the signal and the true beat sample indices.
pub(crate) fn synthetic_ecg(fs: f64, rr: &[f64]) -> (TimeSeries, Vec<usize>) {
    let mut beats = Vec::with_capacity(rr.len() + 1);
    let mut t = 0.5;
    beats.push(t);
    for &interval in rr {
        t += interval;
        beats.push(t);
    }
    let duration = beats.last().copied().unwrap_or(1.0) + 1.0;
    let samples = (duration * fs) as usize;
    let data = (0..samples)
        .map(|i| {
            let time = i as f64 / fs;
            let wander = 0.05 * (2.0 * PI * time).sin();
            let qrs: f64 = beats
                .iter()
                .map(|bt| 1.2 * (-0.5 * ((time - bt) / 0.02).powi(2)).exp())
                .sum();
            wander + qrs
        })
        .collect();
    let truth = beats.iter().map(|bt| (bt * fs).round() as usize).collect();
    (TimeSeries { fs, data }, truth)
}
