//! Backend-neutral figure description. Rendering lives with the caller.

use crate::beats::BeatSegment;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

/// 0xRRGGBB
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

/// Cycled through when a figure has one line per channel.
pub const CHANNEL_COLORS: [Color; 6] = [
    Color(0x1F77B4),
    Color(0xFF7F0E),
    Color(0x2CA02C),
    Color(0xD62728),
    Color(0x9467BD),
    Color(0x8C564B),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Vertical marker at `x` spanning the whole y range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerSeries {
    pub name: String,
    pub x: f64,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Marker(MarkerSeries),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis::default(),
            y: Axis::default(),
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over every line; markers only widen x.
    /// Degenerate ranges are padded so a renderer always gets a non-empty box.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let mut x = (f64::INFINITY, f64::NEG_INFINITY);
        let mut y = (f64::INFINITY, f64::NEG_INFINITY);
        for series in &self.series {
            match series {
                Series::Line(line) => {
                    for p in &line.points {
                        x = (x.0.min(p[0]), x.1.max(p[0]));
                        y = (y.0.min(p[1]), y.1.max(p[1]));
                    }
                }
                Series::Marker(marker) => x = (x.0.min(marker.x), x.1.max(marker.x)),
            }
        }
        let (x_min, x_max) = padded(x);
        let (y_min, y_max) = padded(y);
        (x_min, x_max, y_min, y_max)
    }
}

fn padded((lo, hi): (f64, f64)) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        (0.0, 1.0)
    } else if hi - lo <= f64::EPSILON {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
    fn draw_panels(&mut self, panels: &Panels) -> anyhow::Result<()>;
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    (0..max_points)
        .map(|i| (i as f64 * bucket_size).floor() as usize)
        .take_while(|&start| start < points.len())
        .map(|start| points[start])
        .collect()
}

/// One line per channel of the segment, x in samples relative to the segment
/// start, plus a marker at the beat center.
pub fn figure_from_beat(segment: &BeatSegment, center: usize, names: &[String]) -> Figure {
    let mut fig = Figure::new(Some(format!("Beat at sample {}", segment.start + center)));
    fig.x.label = Some("sample".into());
    fig.y.label = Some("amplitude".into());
    for ch in 0..segment.channels {
        let points = segment
            .channel(ch)
            .into_iter()
            .enumerate()
            .map(|(i, v)| [i as f64, v])
            .collect();
        fig.add_series(Series::Line(LineSeries {
            name: names
                .get(ch)
                .cloned()
                .unwrap_or_else(|| format!("ch{}", ch)),
            points,
            style: Style {
                width: 1.4,
                dash: None,
                color: CHANNEL_COLORS[ch % CHANNEL_COLORS.len()],
            },
        }));
    }
    fig.add_series(Series::Marker(MarkerSeries {
        name: "center".into(),
        x: center as f64,
        color: Color(0x000000),
    }));
    fig
}

/// Figures laid out on a `rows x cols` grid, filled row by row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Panels {
    pub title: Option<String>,
    pub rows: usize,
    pub cols: usize,
    pub figures: Vec<Figure>,
}

/// Side-by-side comparison of labelled beats: one row per beat, one panel
/// per channel, each with the beat center marked.
pub fn panels_from_beats(beats: &[(String, &BeatSegment, usize)], names: &[String]) -> Panels {
    let cols = beats.iter().map(|(_, seg, _)| seg.channels).max().unwrap_or(0);
    let mut figures = Vec::with_capacity(beats.len() * cols);
    for (row, (label, segment, center)) in beats.iter().enumerate() {
        let color = CHANNEL_COLORS[row % CHANNEL_COLORS.len()];
        for ch in 0..cols {
            let name = names
                .get(ch)
                .cloned()
                .unwrap_or_else(|| format!("ch{}", ch));
            let mut fig = Figure::new(Some(format!("{} {}", label, name)));
            fig.x.label = Some("sample".into());
            fig.y.label = Some(name.clone());
            let points: Vec<[f64; 2]> = segment
                .channel(ch)
                .into_iter()
                .enumerate()
                .map(|(i, v)| [i as f64, v])
                .collect();
            if !points.is_empty() {
                fig.add_series(Series::Line(LineSeries {
                    name: label.clone(),
                    points,
                    style: Style {
                        width: 1.4,
                        dash: None,
                        color,
                    },
                }));
                fig.add_series(Series::Marker(MarkerSeries {
                    name: "center".into(),
                    x: *center as f64,
                    color: Color(0x000000),
                }));
            }
            figures.push(fig);
        }
    }
    Panels {
        title: None,
        rows: beats.len(),
        cols,
        figures,
    }
}
