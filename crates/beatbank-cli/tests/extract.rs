use assert_cmd::cargo::cargo_bin_cmd;
use beatbank_lib::beats::ExtractedBeats;
use beatbank_lib::plot::{Figure, Panels, Series};
use std::{error::Error, fs, path::PathBuf};

const BEATS: [usize; 10] = [200, 500, 790, 1100, 1400, 1690, 2000, 2300, 2600, 2890];

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

fn sample_path(rel: &str) -> String {
    workspace_root()
        .join(rel)
        .to_str()
        .expect("utf8 path")
        .to_string()
}

fn run(args: &[&str]) -> Result<ExtractedBeats, Box<dyn Error>> {
    let output = cargo_bin_cmd!("beatbank")
        .args(args)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    Ok(serde_json::from_slice(&output)?)
}

#[test]
fn extracts_rr_windows_from_text_inputs() -> Result<(), Box<dyn Error>> {
    let signal = sample_path("test_data/beats_signal.txt");
    let indices = sample_path("test_data/beats_indices.txt");
    let beats = run(&[
        "extract-beats",
        "--input",
        &signal,
        "--annotations",
        &indices,
        "--prop-left",
        "0.25",
    ])?;

    // The last beat's window runs past the end of the signal.
    assert_eq!(beats.beat_indices(), BEATS[..9].to_vec());
    assert_eq!(beats.centers, vec![75, 75, 72, 77, 75, 72, 77, 75, 75]);
    let first = &beats.segments[0];
    assert_eq!((first.start, first.len(), first.channels), (125, 300, 1));
    let ninth = &beats.segments[8];
    assert_eq!((ninth.start, ninth.len()), (2525, 292));
    Ok(())
}

#[test]
fn default_window_reads_signal_from_stdin() -> Result<(), Box<dyn Error>> {
    let signal = fs::read_to_string(sample_path("test_data/beats_signal.txt"))?;
    let indices = sample_path("test_data/beats_indices.txt");
    let output = cargo_bin_cmd!("beatbank")
        .args(["extract-beats", "--annotations", &indices])
        .write_stdin(signal)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let beats: ExtractedBeats = serde_json::from_slice(&output)?;
    assert_eq!(beats.beat_indices(), BEATS[..9].to_vec());
    for (segment, center) in beats.iter() {
        assert!(center < segment.len());
        assert!(segment.end() < 3000);
    }
    Ok(())
}

#[test]
fn selects_beats_by_annotation_symbol() -> Result<(), Box<dyn Error>> {
    let signal = sample_path("test_data/beats_signal.txt");
    for labels in ["test_data/beats_labeled.txt", "test_data/beats_labeled.csv"] {
        let labels = sample_path(labels);
        let beats = run(&[
            "extract-beats-by-type",
            "--input",
            &signal,
            "--labels",
            &labels,
            "--wanted",
            "V",
            "--prop-left",
            "0.25",
        ])?;
        assert_eq!(beats.beat_indices(), vec![790, 2600]);
        assert_eq!(beats.centers, vec![72, 75]);
        assert_eq!(beats.segments[0].len(), 304);
    }
    Ok(())
}

#[test]
fn fixed_width_windows() -> Result<(), Box<dyn Error>> {
    let signal = sample_path("test_data/beats_signal.txt");
    let labels = sample_path("test_data/beats_labeled.txt");
    let beats = run(&[
        "extract-beats-by-type",
        "--input",
        &signal,
        "--labels",
        &labels,
        "--wanted",
        "V",
        "--prop-left",
        "0.25",
        "--fixed-width",
        "200",
    ])?;
    assert_eq!(beats.centers, vec![50, 50]);
    let starts: Vec<usize> = beats.segments.iter().map(|s| s.start).collect();
    assert_eq!(starts, vec![740, 2550]);
    assert!(beats.segments.iter().all(|s| s.len() == 200));
    Ok(())
}

#[test]
fn toml_config_with_flag_override() -> Result<(), Box<dyn Error>> {
    let signal = sample_path("test_data/beats_signal.txt");
    let labels = sample_path("test_data/beats_labeled.txt");
    let config = sample_path("test_data/window.toml");

    let normal = run(&[
        "extract-beats-by-type",
        "--input",
        &signal,
        "--labels",
        &labels,
        "--wanted",
        "N",
        "--config",
        &config,
    ])?;
    assert_eq!(
        normal.beat_indices(),
        vec![200, 500, 1100, 1400, 2000, 2300]
    );
    assert!(normal.segments.iter().all(|s| s.len() == 200));

    let dir = tempfile::tempdir()?;
    let override_path = dir.path().join("wide.toml");
    fs::write(&override_path, "fixed_width = 400\n")?;
    let wide = run(&[
        "extract-beats-by-type",
        "--input",
        &signal,
        "--labels",
        &labels,
        "--wanted",
        "V",
        "--config",
        override_path.to_str().expect("utf8 path"),
        "--prop-left",
        "0.5",
    ])?;
    let starts: Vec<usize> = wide.segments.iter().map(|s| s.start).collect();
    assert_eq!(starts, vec![590, 2400]);
    assert_eq!(wide.centers, vec![200, 200]);
    Ok(())
}

#[test]
fn detects_beats_without_annotations() -> Result<(), Box<dyn Error>> {
    let signal = sample_path("test_data/beats_signal.txt");
    let beats = run(&["extract-beats", "--input", &signal])?;
    assert!(!beats.is_empty());
    for (segment, center) in beats.iter() {
        assert!(center < segment.len());
    }
    Ok(())
}

#[test]
fn no_interval_in_band_is_an_error() {
    let signal = sample_path("test_data/beats_signal.txt");
    let indices = sample_path("test_data/beats_indices.txt");
    let assert = cargo_bin_cmd!("beatbank")
        .args([
            "extract-beats",
            "--input",
            &signal,
            "--annotations",
            &indices,
            "--rr-low",
            "400",
            "--rr-high",
            "500",
        ])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("no RR interval"), "stderr: {}", stderr);
}

#[test]
fn rejects_bad_window_proportion() {
    let signal = sample_path("test_data/beats_signal.txt");
    let indices = sample_path("test_data/beats_indices.txt");
    let assert = cargo_bin_cmd!("beatbank")
        .args([
            "extract-beats",
            "--input",
            &signal,
            "--annotations",
            &indices,
            "--prop-left",
            "1.5",
        ])
        .assert()
        .failure();
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("prop_left"), "stderr: {}", stderr);
}

#[test]
fn beat_plot_figure_json() -> Result<(), Box<dyn Error>> {
    let signal = sample_path("test_data/beats_signal.txt");
    let indices = sample_path("test_data/beats_indices.txt");
    let output = cargo_bin_cmd!("beatbank")
        .args([
            "beat-plot",
            "--input",
            &signal,
            "--annotations",
            &indices,
            "--prop-left",
            "0.25",
            "--index",
            "2",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let fig: Figure = serde_json::from_slice(&output)?;
    assert_eq!(fig.title.as_deref(), Some("Beat at sample 790"));
    assert_eq!(fig.series.len(), 2);
    match &fig.series[0] {
        Series::Line(line) => {
            assert_eq!(line.name, "signal");
            assert_eq!(line.points.len(), 304);
        }
        other => panic!("expected a line, got {:?}", other),
    }
    assert!(matches!(&fig.series[1], Series::Marker(m) if m.x == 72.0));

    cargo_bin_cmd!("beatbank")
        .args([
            "beat-plot",
            "--input",
            &signal,
            "--annotations",
            &indices,
            "--index",
            "9",
        ])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn beat_plot_compares_beat_types() -> Result<(), Box<dyn Error>> {
    let signal = sample_path("test_data/beats_signal.txt");
    let labels = sample_path("test_data/beats_labeled.txt");
    let output = cargo_bin_cmd!("beatbank")
        .args([
            "beat-plot",
            "--input",
            &signal,
            "--labels",
            &labels,
            "--compare",
            "N,V",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let panels: Panels = serde_json::from_slice(&output)?;
    assert_eq!((panels.rows, panels.cols), (2, 1));
    assert_eq!(panels.title.as_deref(), Some("Beat types: N, V"));
    let titles: Vec<_> = panels
        .figures
        .iter()
        .map(|f| f.title.clone().unwrap_or_default())
        .collect();
    assert_eq!(titles, ["N signal", "V signal"]);
    for fig in &panels.figures {
        assert!(fig.series.iter().any(|s| matches!(s, Series::Marker(_))));
    }

    // Only two V beats are labelled.
    cargo_bin_cmd!("beatbank")
        .args([
            "beat-plot",
            "--input",
            &signal,
            "--labels",
            &labels,
            "--compare",
            "N,V",
            "--index",
            "2",
        ])
        .assert()
        .failure();
    Ok(())
}
