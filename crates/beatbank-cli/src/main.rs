use anyhow::{anyhow, bail, Context, Result};
use beatbank_lib::{
    bank::{build_beat_bank_parallel, BeatBankConfig, RecordInput, Section},
    beats::{
        extract_beats, extract_beats_by_type, BeatType, BeatWindowConfig, ChannelMode,
        ExtractedBeats,
    },
    detectors::ecg::{detect_r_peaks_with_config, QrsDetectorConfig},
    evaluate::calc_results,
    features::spectral::spectral_ratios,
    io::{text as text_io, wfdb as wfdb_io},
    plot::{
        self, decimate_points, figure_from_beat, panels_from_beats, Figure, Panels, PlotBackend,
        Series,
    },
    signal::{Events, LabeledEvents, MultiChannelSeries},
};
use clap::{Args, Parser, Subcommand};
use log::{debug, info};
use plotters::coord::Shift;
use plotters::prelude::*;
use serde::de::DeserializeOwned;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "beatbank",
    version,
    about = "Beat segmentation and beat bank tools for ECG records"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the signal comes from: newline-delimited text (`--input` or stdin)
/// or a WFDB record.
#[derive(Args, Debug)]
struct SignalArgs {
    #[arg(long, default_value_t = 360.0)]
    fs: f64,
    #[arg(long, conflicts_with = "wfdb_header")]
    input: Option<PathBuf>,
    #[arg(long)]
    wfdb_header: Option<PathBuf>,
    /// Keep a single lead of the WFDB record instead of all of them.
    #[arg(long, requires = "wfdb_header")]
    wfdb_lead: Option<usize>,
}

#[derive(Args, Debug)]
struct WindowArgs {
    /// TOML file with a beat window configuration; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    prop_left: Option<f64>,
    #[arg(long)]
    rr_low: Option<usize>,
    #[arg(long)]
    rr_high: Option<usize>,
    /// Fixed window width in samples instead of RR-adaptive windows.
    #[arg(long)]
    fixed_width: Option<usize>,
    /// Keep only the first channel of multi-channel signals.
    #[arg(long)]
    single_channel: bool,
}

impl WindowArgs {
    fn resolve(&self) -> Result<BeatWindowConfig> {
        let mut cfg: BeatWindowConfig = match &self.config {
            Some(path) => read_toml(path)?,
            None => BeatWindowConfig::default(),
        };
        if let Some(prop_left) = self.prop_left {
            cfg.prop_left = prop_left;
        }
        if let Some(low) = self.rr_low {
            cfg.rr_limits.low = low;
        }
        if let Some(high) = self.rr_high {
            cfg.rr_limits.high = high;
        }
        if self.fixed_width.is_some() {
            cfg.fixed_width = self.fixed_width;
        }
        if self.single_channel {
            cfg.channel_mode = ChannelMode::FirstOnly;
        }
        debug!("beat window config: {:?}", cfg);
        Ok(cfg)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Cut a window around every beat; beats come from --annotations or are detected
    ExtractBeats {
        #[command(flatten)]
        signal: SignalArgs,
        /// Beat indices as text, or a WFDB .atr file
        #[arg(long)]
        annotations: Option<PathBuf>,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Cut windows only around beats carrying the --wanted annotation symbol
    ExtractBeatsByType {
        #[command(flatten)]
        signal: SignalArgs,
        /// `sample symbol` pairs as text, or a WFDB .atr file
        #[arg(long)]
        labels: PathBuf,
        #[arg(long)]
        wanted: String,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Pool beats per channel name across WFDB records
    BeatBank {
        #[arg(long = "wfdb-header", required = true, num_args = 1..)]
        wfdb_headers: Vec<PathBuf>,
        /// TOML file with a beat bank configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Use only the section of each record starting here (seconds)
        #[arg(long, requires = "stop_s")]
        start_s: Option<f64>,
        #[arg(long, requires = "start_s")]
        stop_s: Option<f64>,
        /// Print every pooled beat instead of per-channel counts
        #[arg(long)]
        full: bool,
    },
    /// Fraction of periodogram power in three frequency bands
    SpectralRatios {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = 360.0)]
        fs: f64,
        #[arg(long, default_value_t = 5.0)]
        f_low: f64,
        #[arg(long, default_value_t = 25.0)]
        f_med: f64,
        #[arg(long, default_value_t = 70.0)]
        f_high: f64,
    },
    /// Confusion matrix of 0/1 predictions against 0/1 truth
    Evaluate {
        #[arg(long)]
        truth: PathBuf,
        #[arg(long)]
        pred: PathBuf,
        /// Print the confusion matrix as a table instead of JSON
        #[arg(long)]
        table: bool,
    },
    /// Plot one extracted beat, or compare beat types side by side with
    /// --labels and --compare; PNG with --out, otherwise the figure as JSON
    BeatPlot {
        #[command(flatten)]
        signal: SignalArgs,
        #[arg(long, conflicts_with = "labels")]
        annotations: Option<PathBuf>,
        /// `sample symbol` pairs as text, or a WFDB .atr file
        #[arg(long, requires = "compare")]
        labels: Option<PathBuf>,
        /// Comma-separated beat symbols, one panel row per symbol
        #[arg(long, value_delimiter = ',', requires = "labels")]
        compare: Vec<String>,
        #[command(flatten)]
        window: WindowArgs,
        /// Position among the extracted beats (of each type when comparing)
        #[arg(long, default_value_t = 0)]
        index: usize,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::ExtractBeats {
            signal,
            annotations,
            window,
        } => cmd_extract_beats(&signal, annotations.as_deref(), &window)?,
        Commands::ExtractBeatsByType {
            signal,
            labels,
            wanted,
            window,
        } => cmd_extract_beats_by_type(&signal, &labels, &wanted, &window)?,
        Commands::BeatBank {
            wfdb_headers,
            config,
            start_s,
            stop_s,
            full,
        } => {
            let section_s = start_s.zip(stop_s);
            cmd_beat_bank(&wfdb_headers, config.as_deref(), section_s, full)?
        }
        Commands::SpectralRatios {
            input,
            fs,
            f_low,
            f_med,
            f_high,
        } => cmd_spectral_ratios(input.as_deref(), fs, f_low, f_med, f_high)?,
        Commands::Evaluate { truth, pred, table } => cmd_evaluate(&truth, &pred, table)?,
        Commands::BeatPlot {
            signal,
            annotations,
            labels,
            compare,
            window,
            index,
            out,
        } => match labels {
            Some(labels) => {
                cmd_beat_compare(&signal, &labels, &compare, &window, index, out.as_deref())?
            }
            None => cmd_beat_plot(
                &signal,
                annotations.as_deref(),
                &window,
                index,
                out.as_deref(),
            )?,
        },
    }
    Ok(())
}

fn read_samples(input: Option<&Path>) -> Result<Vec<f64>> {
    match input {
        Some(path) => text_io::read_f64_series(path),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            text_io::parse_f64_series(&buf)
        }
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("invalid config {}", path.display()))
}

fn load_signal(args: &SignalArgs) -> Result<MultiChannelSeries> {
    let Some(header) = &args.wfdb_header else {
        let data = read_samples(args.input.as_deref())?;
        return Ok(MultiChannelSeries::from_channels(
            args.fs,
            vec!["signal".into()],
            &[data],
        ));
    };
    let record = wfdb_io::load_wfdb_record(header)?;
    match args.wfdb_lead {
        None => Ok(record),
        Some(lead) => {
            let ts = wfdb_io::load_wfdb_lead(header, lead)?;
            Ok(MultiChannelSeries::from_channels(
                ts.fs,
                vec![record.channel_name(lead)],
                &[ts.data],
            ))
        }
    }
}

fn is_atr(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("atr"))
}

/// Beat indices from an annotation file, or detected on the first channel.
fn load_beat_indices(
    annotations: Option<&Path>,
    signal: &MultiChannelSeries,
) -> Result<Vec<usize>> {
    if let Some(path) = annotations {
        let events = if is_atr(path) {
            wfdb_io::load_wfdb_events(path)?
        } else {
            Events::from_indices(text_io::read_event_indices(path)?)
        };
        return Ok(events.indices);
    }
    let lead = signal
        .channel(0)
        .ok_or_else(|| anyhow!("signal has no channels"))?;
    let events = detect_r_peaks_with_config(&lead, &QrsDetectorConfig::default());
    info!(
        "detected {} beats on {}",
        events.indices.len(),
        signal.channel_name(0)
    );
    Ok(events.indices)
}

fn load_labels(path: &Path) -> Result<LabeledEvents> {
    if is_atr(path) {
        wfdb_io::load_wfdb_labeled_beats(path)
    } else {
        text_io::read_labeled_events(path)
    }
}

fn extract(
    signal: &MultiChannelSeries,
    annotations: Option<&Path>,
    window: &WindowArgs,
) -> Result<ExtractedBeats> {
    let cfg = window.resolve()?;
    let beat_inds = load_beat_indices(annotations, signal)?;
    Ok(extract_beats(signal, &beat_inds, &cfg)?)
}

fn cmd_extract_beats(
    signal: &SignalArgs,
    annotations: Option<&Path>,
    window: &WindowArgs,
) -> Result<()> {
    let signal = load_signal(signal)?;
    let beats = extract(&signal, annotations, window)?;
    println!("{}", serde_json::to_string(&beats)?);
    Ok(())
}

fn cmd_extract_beats_by_type(
    signal: &SignalArgs,
    labels: &Path,
    wanted: &str,
    window: &WindowArgs,
) -> Result<()> {
    let signal = load_signal(signal)?;
    let cfg = window.resolve()?;
    let labels = load_labels(labels)?;
    let wanted: BeatType = wanted.parse()?;
    let beats = extract_labeled(&signal, &labels, &wanted, &cfg)?;
    info!("{} beats of type {}", beats.len(), wanted);
    println!("{}", serde_json::to_string(&beats)?);
    Ok(())
}

fn extract_labeled(
    signal: &MultiChannelSeries,
    labels: &LabeledEvents,
    wanted: &BeatType,
    cfg: &BeatWindowConfig,
) -> Result<ExtractedBeats> {
    let types: Vec<BeatType> = labels
        .symbols
        .iter()
        .map(|s| BeatType::from_symbol(s))
        .collect();
    Ok(extract_beats_by_type(
        signal,
        &labels.indices,
        &types,
        wanted,
        cfg,
    )?)
}

fn cmd_beat_bank(
    headers: &[PathBuf],
    config: Option<&Path>,
    section_s: Option<(f64, f64)>,
    full: bool,
) -> Result<()> {
    let mut cfg: BeatBankConfig = match config {
        Some(path) => read_toml(path)?,
        None => BeatBankConfig::default(),
    };
    let mut records = Vec::with_capacity(headers.len());
    for header in headers {
        let signal = wfdb_io::load_wfdb_record(header)?;
        let atr = header.with_extension("atr");
        let beats = if atr.exists() {
            Some(wfdb_io::load_wfdb_events(&atr)?)
        } else {
            debug!("{}: no annotations, beats will be detected", header.display());
            None
        };
        let name = header
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("record")
            .to_string();
        records.push(RecordInput {
            name,
            signal,
            beats,
        });
    }
    if let Some((start_s, stop_s)) = section_s {
        let fs = records.first().map_or(0.0, |r| r.signal.fs);
        if records.iter().any(|r| r.signal.fs != fs) {
            bail!("--start-s/--stop-s need records sharing one sampling frequency");
        }
        cfg.section = Some(Section::from_seconds(fs, start_s, stop_s));
    }
    let bank = build_beat_bank_parallel(&records, &cfg)?;
    if full {
        println!("{}", serde_json::to_string(&bank)?);
    } else {
        println!("{}", serde_json::to_string(&bank.counts())?);
    }
    Ok(())
}

fn cmd_spectral_ratios(
    input: Option<&Path>,
    fs: f64,
    f_low: f64,
    f_med: f64,
    f_high: f64,
) -> Result<()> {
    let data = read_samples(input)?;
    let ratios = spectral_ratios(&data, fs, f_low, f_med, f_high)?;
    println!("{}", serde_json::to_string(&ratios)?);
    Ok(())
}

fn read_binary_outcomes(path: &Path) -> Result<Vec<u8>> {
    text_io::read_event_indices(path)?
        .into_iter()
        .map(|v| {
            u8::try_from(v)
                .with_context(|| format!("{}: outcome {} is not 0/1", path.display(), v))
        })
        .collect()
}

fn cmd_evaluate(truth: &Path, pred: &Path, table: bool) -> Result<()> {
    let y_true = read_binary_outcomes(truth)?;
    let y_pred = read_binary_outcomes(pred)?;
    let summary = calc_results(&y_true, &y_pred)?;
    if table {
        println!("{}", summary.confusion);
        println!("Proportion correct: {:.4}", summary.proportion_correct);
    } else {
        println!("{}", serde_json::to_string(&summary)?);
    }
    Ok(())
}

fn cmd_beat_plot(
    signal: &SignalArgs,
    annotations: Option<&Path>,
    window: &WindowArgs,
    index: usize,
    out: Option<&Path>,
) -> Result<()> {
    let signal = load_signal(signal)?;
    let beats = extract(&signal, annotations, window)?;
    let Some((segment, center)) = beats.iter().nth(index) else {
        bail!(
            "beat {} requested but only {} beats were extracted",
            index,
            beats.len()
        );
    };
    let names: Vec<String> = (0..segment.channels)
        .map(|ch| signal.channel_name(ch))
        .collect();
    let fig = figure_from_beat(segment, center, &names);
    match out {
        Some(path) => PngBackend::new(path).draw(&fig)?,
        None => println!("{}", serde_json::to_string(&fig)?),
    }
    Ok(())
}

fn cmd_beat_compare(
    signal: &SignalArgs,
    labels: &Path,
    compare: &[String],
    window: &WindowArgs,
    index: usize,
    out: Option<&Path>,
) -> Result<()> {
    let signal = load_signal(signal)?;
    let cfg = window.resolve()?;
    let labels = load_labels(labels)?;
    let mut extracted = Vec::with_capacity(compare.len());
    for symbol in compare {
        let wanted: BeatType = symbol.parse()?;
        let beats = extract_labeled(&signal, &labels, &wanted, &cfg)?;
        extracted.push((wanted, beats));
    }
    let mut rows = Vec::with_capacity(extracted.len());
    for (wanted, beats) in &extracted {
        let Some((segment, center)) = beats.iter().nth(index) else {
            bail!(
                "beat {} of type {} requested but only {} were extracted",
                index,
                wanted,
                beats.len()
            );
        };
        rows.push((wanted.to_string(), segment, center));
    }
    let names: Vec<String> = (0..signal.channels)
        .map(|ch| signal.channel_name(ch))
        .collect();
    let mut panels = panels_from_beats(&rows, &names);
    panels.title = Some(format!("Beat types: {}", compare.join(", ")));
    match out {
        Some(path) => PngBackend::new(path).draw_panels(&panels)?,
        None => println!("{}", serde_json::to_string(&panels)?),
    }
    Ok(())
}

struct PngBackend<'a> {
    path: &'a Path,
    size: (u32, u32),
}

impl<'a> PngBackend<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            size: (800, 480),
        }
    }
}

fn rgb(color: plot::Color) -> RGBColor {
    let (r, g, b) = color.rgb();
    RGBColor(r, g, b)
}

fn draw_figure_on(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    fig: &Figure,
    caption_size: u32,
) -> Result<()> {
    let (x_min, x_max, y_min, y_max) = fig.bounds();
    let max_points = area.dim_in_pixel().0.max(2) as usize;
    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .caption(
            fig.title.clone().unwrap_or_else(|| "Plot".into()),
            ("sans-serif", caption_size),
        )
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;
    chart
        .configure_mesh()
        .x_desc(fig.x.label.clone().unwrap_or_default())
        .y_desc(fig.y.label.clone().unwrap_or_default())
        .draw()?;
    for series in &fig.series {
        match series {
            Series::Line(line) => {
                let width = line.style.width.round().max(1.0) as u32;
                let style = rgb(line.style.color).stroke_width(width);
                chart.draw_series(LineSeries::new(
                    decimate_points(&line.points, max_points)
                        .into_iter()
                        .map(|p| (p[0], p[1])),
                    style,
                ))?;
            }
            Series::Marker(marker) => {
                chart.draw_series(std::iter::once(PathElement::new(
                    vec![(marker.x, y_min), (marker.x, y_max)],
                    rgb(marker.color).stroke_width(1),
                )))?;
            }
        }
    }
    Ok(())
}

impl PlotBackend for PngBackend<'_> {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let root = BitMapBackend::new(self.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        draw_figure_on(&root, fig, 24)?;
        root.present()?;
        info!("wrote {}", self.path.display());
        Ok(())
    }

    fn draw_panels(&mut self, panels: &Panels) -> Result<()> {
        let size = (
            self.size.0 * panels.cols.max(1) as u32 / 2,
            self.size.1 * panels.rows.max(1) as u32 / 2,
        );
        let root = BitMapBackend::new(self.path, size).into_drawing_area();
        root.fill(&WHITE)?;
        let root = match &panels.title {
            Some(title) => root.titled(title, ("sans-serif", 24))?,
            None => root,
        };
        let areas = root.split_evenly((panels.rows.max(1), panels.cols.max(1)));
        for (area, fig) in areas.iter().zip(&panels.figures) {
            draw_figure_on(area, fig, 16)?;
        }
        root.present()?;
        info!("wrote {}", self.path.display());
        Ok(())
    }
}
