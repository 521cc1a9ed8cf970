//! Fixture utilities for the deterministic CLI harness.
//!
//! This module discovers fixture assets, loads PCM WAV input data,
//! parses optional expectation JSON, and runs the beat analyzer over the
//! decoded samples block by block. It is intentionally desktop-focused to
//! support CI and QA workflows.

pub mod synthetic;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::beat_log::LoggedBeat;
use crate::analysis::quantizer::{BeatGrid, Difficulty, TimingClassification};
use crate::analysis::{BeatAnalyzer, PeakEvent};
use crate::config::AnalyzerConfig;

/// Default location for fixture WAV/JSON assets.
pub const DEFAULT_FIXTURE_ROOT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures");

/// Metadata describing an available fixture.
#[derive(Clone, Debug, Serialize)]
pub struct FixtureMetadata {
    pub name: String,
    pub wav_path: PathBuf,
    pub expect_path: Option<PathBuf>,
}

/// Loaded fixture data with decoded PCM samples.
pub struct FixtureData {
    pub metadata: FixtureMetadata,
    pub sample_rate: u32,
    pub samples: Vec<i16>,
    pub expectations: Option<FixtureExpectations>,
}

/// JSON expectation schema for fixture verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureExpectations {
    pub fixture: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub events: Vec<ExpectedEvent>,
}

impl FixtureExpectations {
    /// Compare reported peak events, in order, with the expected ones
    pub fn verify(&self, actual: &[PeakEvent]) -> std::result::Result<(), ExpectationDiff> {
        let mut failures = Vec::new();

        for (idx, expected) in self.events.iter().enumerate() {
            match actual.get(idx) {
                Some(event) => {
                    let delta = (event.error - expected.error).abs();
                    if event.slot != expected.slot || delta > expected.tolerance {
                        failures.push(ExpectationFailure {
                            index: idx,
                            expected: Some(expected.clone()),
                            actual: Some(*event),
                            delta: Some(delta),
                        });
                    }
                }
                None => failures.push(ExpectationFailure {
                    index: idx,
                    expected: Some(expected.clone()),
                    actual: None,
                    delta: None,
                }),
            }
        }

        for (idx, event) in actual.iter().enumerate().skip(self.events.len()) {
            failures.push(ExpectationFailure {
                index: idx,
                expected: None,
                actual: Some(*event),
                delta: None,
            });
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExpectationDiff { failures })
        }
    }
}

/// Expected peak event definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedEvent {
    /// Grid slot (or beat index in beat-log mode)
    pub slot: i64,
    /// Expected timing error in grid steps
    #[serde(default)]
    pub error: f64,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

fn default_tolerance() -> f64 {
    0.25
}

/// Outcome of comparing actual results with expectations.
#[derive(Debug)]
pub struct ExpectationDiff {
    pub failures: Vec<ExpectationFailure>,
}

impl ExpectationDiff {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "failures": self.failures.iter().map(|failure| {
                serde_json::json!({
                    "index": failure.index,
                    "expected": failure.expected,
                    "actual": failure.actual,
                    "delta": failure.delta,
                })
            }).collect::<Vec<_>>()
        })
    }
}

/// Detailed diff entry for a single failure.
///
/// `expected` is `None` for surplus events, `actual` is `None` for missing ones.
#[derive(Debug)]
pub struct ExpectationFailure {
    pub index: usize,
    pub expected: Option<ExpectedEvent>,
    pub actual: Option<PeakEvent>,
    pub delta: Option<f64>,
}

/// Catalog responsible for discovering fixtures on disk.
pub struct FixtureCatalog {
    root: PathBuf,
}

impl FixtureCatalog {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List all fixtures by their metadata.
    pub fn discover(&self) -> Result<Vec<FixtureMetadata>> {
        let mut fixtures = Vec::new();
        if !self.root.exists() {
            return Ok(fixtures);
        }

        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("listing {}", self.root.display()))?
        {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) == Some("wav") {
                    fixtures.push(self.metadata_for_path(&path)?);
                }
            }
        }

        fixtures.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(fixtures)
    }

    /// Load fixture samples + expectations for provided name or path.
    pub fn load(&self, fixture: &str, override_expect: Option<PathBuf>) -> Result<FixtureData> {
        let wav_path = self.resolve_fixture_path(fixture)?;
        let metadata = self.metadata_for_path(&wav_path)?;
        let (samples, sample_rate) = read_wav(&wav_path)?;

        let expectation_path = override_expect.or(metadata.expect_path.clone());
        let expectations = match expectation_path {
            Some(path) => {
                let json = fs::read_to_string(&path)
                    .with_context(|| format!("reading expectation {}", path.display()))?;
                Some(
                    serde_json::from_str(&json)
                        .with_context(|| format!("parsing {}", path.display()))?,
                )
            }
            None => None,
        };

        Ok(FixtureData {
            metadata,
            sample_rate,
            samples,
            expectations,
        })
    }

    fn resolve_fixture_path(&self, fixture: &str) -> Result<PathBuf> {
        let as_path = Path::new(fixture);
        if as_path.exists() {
            return Ok(as_path.to_path_buf());
        }

        let candidate = self.root.join(format!("{fixture}.wav"));
        if candidate.exists() {
            Ok(candidate)
        } else {
            Err(anyhow!(
                "Fixture '{fixture}' not found in {}",
                self.root.display()
            ))
        }
    }

    fn metadata_for_path(&self, wav_path: &Path) -> Result<FixtureMetadata> {
        let name = wav_path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("Invalid fixture name for {}", wav_path.display()))?
            .to_string();
        let expect_path = wav_path.with_extension("expect.json");
        Ok(FixtureMetadata {
            name,
            wav_path: wav_path.to_path_buf(),
            expect_path: expect_path.exists().then_some(expect_path),
        })
    }
}

impl Default for FixtureCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_FIXTURE_ROOT)
    }
}

/// Timing verdict for one placed beat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BeatTiming {
    pub slot: i64,
    pub error: f64,
    pub classification: TimingClassification,
}

/// Result of running one fixture through the analyzer.
#[derive(Debug, Clone, Serialize)]
pub struct FixtureReport {
    pub fixture: String,
    pub sample_rate: u32,
    pub blocks: u64,
    pub latency_offset: i64,
    pub peak_count: u64,
    pub events: Vec<PeakEvent>,
    /// Final two-bar grid; absent in beat-log mode
    pub grid: Option<BeatGrid>,
    /// Every logged beat; absent in two-bar mode
    pub beat_log: Option<Vec<LoggedBeat>>,
    pub difficulty: Difficulty,
    /// Verdicts for the occupied grid slots, or for every logged beat
    pub timing: Vec<BeatTiming>,
}

/// Executes fixtures by feeding decoded PCM samples through the analyzer.
pub struct FixtureProcessor {
    config: AnalyzerConfig,
    difficulty: Difficulty,
}

impl FixtureProcessor {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            difficulty: Difficulty::Normal,
        }
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// Feed the whole fixture, returning every event plus the final state
    pub fn run(&self, data: &FixtureData) -> Result<FixtureReport> {
        self.run_with(data, |_| Ok(()))
    }

    /// Like `run`, calling `on_event` for each event as soon as its block is fed
    pub fn run_with<F>(&self, data: &FixtureData, mut on_event: F) -> Result<FixtureReport>
    where
        F: FnMut(&PeakEvent) -> Result<()>,
    {
        let mut config = self.config.clone();
        if config.stream.sample_rate != data.sample_rate {
            tracing::warn!(
                "[FixtureProcessor] {} is {} Hz; overriding configured {} Hz",
                data.metadata.name,
                data.sample_rate,
                config.stream.sample_rate
            );
            config.stream.sample_rate = data.sample_rate;
        }

        let mut analyzer = BeatAnalyzer::with_config(config)
            .with_context(|| format!("configuring analyzer for {}", data.metadata.name))?;
        let block_size = analyzer.config().stream.block_size;

        let mut events = Vec::new();
        let mut block = vec![0i16; block_size];
        for chunk in data.samples.chunks(block_size) {
            // Zero-pad the final partial block
            block[..chunk.len()].copy_from_slice(chunk);
            block[chunk.len()..].fill(0);

            for event in analyzer.feed(&block)? {
                on_event(&event)?;
                events.push(event);
            }
        }

        let timing = match (analyzer.grid(), analyzer.beat_log()) {
            (Some(grid), _) => grid
                .occupied_slots()
                .map(|slot| self.timing(slot as i64, grid.error(slot)))
                .collect(),
            (None, Some(beats)) => beats
                .iter()
                .map(|beat| self.timing(beat.beat_index, beat.error))
                .collect(),
            (None, None) => Vec::new(),
        };

        tracing::info!(
            "[FixtureProcessor] {}: {} blocks, {} peaks",
            data.metadata.name,
            analyzer.iteration(),
            analyzer.peak_count()
        );

        Ok(FixtureReport {
            fixture: data.metadata.name.clone(),
            sample_rate: data.sample_rate,
            blocks: analyzer.iteration(),
            latency_offset: analyzer.latency_offset(),
            peak_count: analyzer.peak_count(),
            events,
            grid: analyzer.grid().cloned(),
            beat_log: analyzer.beat_log().map(<[LoggedBeat]>::to_vec),
            difficulty: self.difficulty,
            timing,
        })
    }

    fn timing(&self, slot: i64, error: f64) -> BeatTiming {
        BeatTiming {
            slot,
            error,
            classification: self.difficulty.classify(error),
        }
    }
}

/// Decode a mono WAV file to 16-bit PCM.
pub fn read_wav(path: &Path) -> Result<(Vec<i16>, u32)> {
    let mut reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(anyhow!(
            "Fixture {} must be mono (found {} channels)",
            path.display(),
            spec.channels
        ));
    }

    let sample_rate = spec.sample_rate;

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|sample| {
                sample
                    .map(|value| {
                        (value as f64 * i16::MAX as f64)
                            .round()
                            .clamp(i16::MIN as f64, i16::MAX as f64) as i16
                    })
                    .map_err(|err| anyhow!(err))
            })
            .collect::<Result<Vec<i16>>>()?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|sample| sample.map_err(|err| anyhow!(err)))
                .collect::<Result<Vec<i16>>>()?,
            bits @ (24 | 32) => {
                let shift = bits - 16;
                reader
                    .samples::<i32>()
                    .map(|sample| {
                        sample
                            .map(|value| (value >> shift) as i16)
                            .map_err(|err| anyhow!(err))
                    })
                    .collect::<Result<Vec<i16>>>()?
            }
            other => {
                return Err(anyhow!(
                    "Unsupported bits per sample {} in {}",
                    other,
                    path.display()
                ))
            }
        },
    };

    Ok((samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(slot: i64, error: f64) -> PeakEvent {
        PeakEvent {
            block: 8,
            offset: 70,
            value: 0.16,
            slot,
            error,
            reanchored: false,
        }
    }

    fn expectations(events: Vec<ExpectedEvent>) -> FixtureExpectations {
        FixtureExpectations {
            fixture: "pattern".to_string(),
            notes: None,
            events,
        }
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fixtures_{}_{}", tag, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_expected_event_defaults() {
        let parsed: ExpectedEvent = serde_json::from_str(r#"{ "slot": 4 }"#).unwrap();
        assert_eq!(parsed.slot, 4);
        assert_eq!(parsed.error, 0.0);
        assert_eq!(parsed.tolerance, 0.25);
    }

    #[test]
    fn test_verify_accepts_matching_events() {
        let expect = expectations(vec![
            ExpectedEvent {
                slot: 0,
                error: 0.0,
                tolerance: 0.1,
            },
            ExpectedEvent {
                slot: 4,
                error: -0.3,
                tolerance: 0.1,
            },
        ]);
        assert!(expect.verify(&[event(0, 0.0), event(4, -0.28)]).is_ok());
    }

    #[test]
    fn test_verify_reports_wrong_slot_missing_and_surplus() {
        let expect = expectations(vec![
            ExpectedEvent {
                slot: 0,
                error: 0.0,
                tolerance: 0.1,
            },
            ExpectedEvent {
                slot: 4,
                error: 0.0,
                tolerance: 0.1,
            },
        ]);

        let diff = expect.verify(&[event(1, 0.0)]).unwrap_err();
        assert_eq!(diff.failures.len(), 2);
        assert_eq!(diff.failures[0].actual.map(|e| e.slot), Some(1));
        assert!(diff.failures[1].actual.is_none());

        let diff = expect
            .verify(&[event(0, 0.0), event(4, 0.0), event(8, 0.0)])
            .unwrap_err();
        assert_eq!(diff.failures.len(), 1);
        assert_eq!(diff.failures[0].index, 2);
        assert!(diff.failures[0].expected.is_none());

        let json = diff.to_json();
        assert_eq!(json["failures"][0]["actual"]["slot"], 8);
        assert!(json["failures"][0]["expected"].is_null());
    }

    #[test]
    fn test_catalog_discovers_wav_and_expectations() {
        let dir = scratch_dir("discover");
        synthetic::write_wav(&dir.join("b_pattern.wav"), &[0; 16], 44_100).unwrap();
        synthetic::write_wav(&dir.join("a_single.wav"), &[0; 16], 44_100).unwrap();
        fs::write(
            dir.join("a_single.expect.json"),
            r#"{ "fixture": "a_single", "events": [ { "slot": 0 } ] }"#,
        )
        .unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let catalog = FixtureCatalog::new(&dir);
        let fixtures = catalog.discover().unwrap();
        let names: Vec<_> = fixtures.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a_single", "b_pattern"]);
        assert!(fixtures[0].expect_path.is_some());
        assert!(fixtures[1].expect_path.is_none());

        let data = catalog.load("a_single", None).unwrap();
        assert_eq!(data.sample_rate, 44_100);
        assert_eq!(data.samples.len(), 16);
        assert_eq!(data.expectations.unwrap().events.len(), 1);

        assert!(catalog.load("missing", None).is_err());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_root_is_empty_catalog() {
        let catalog = FixtureCatalog::new("/nonexistent/fixture/root");
        assert!(catalog.discover().unwrap().is_empty());
    }

    #[test]
    fn test_read_wav_rejects_stereo() {
        let dir = scratch_dir("stereo");
        let path = dir.join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..8 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        assert!(read_wav(&path).is_err());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_read_wav_converts_float_and_wide_int() {
        let dir = scratch_dir("formats");

        let float_path = dir.join("float.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&float_path, spec).unwrap();
        for value in [0.0f32, 0.5, -1.0] {
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();
        let (samples, rate) = read_wav(&float_path).unwrap();
        assert_eq!(rate, 48_000);
        assert_eq!(samples, vec![0, 16384, -32767]);

        let int_path = dir.join("int24.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44_100,
            bits_per_sample: 24,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&int_path, spec).unwrap();
        for value in [0i32, 256 * 1000, -256 * 1000] {
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();
        let (samples, _) = read_wav(&int_path).unwrap();
        assert_eq!(samples, vec![0, 1000, -1000]);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_processor_reports_single_hit() {
        let config = AnalyzerConfig::default();
        let pattern = synthetic::SyntheticPattern::new(90.0, vec![0.0]);
        let data = FixtureData {
            metadata: FixtureMetadata {
                name: "single".to_string(),
                wav_path: PathBuf::from("single.wav"),
                expect_path: None,
            },
            sample_rate: 44_100,
            samples: pattern.render(&config.stream),
            expectations: None,
        };

        let report = FixtureProcessor::new(config).run(&data).unwrap();
        assert_eq!(report.events.len(), 1);
        assert_eq!(report.events[0].slot, 0);
        assert_eq!(report.peak_count, 1);
        assert_eq!(report.latency_offset, 112);
        assert!(report.grid.as_ref().unwrap().is_occupied(0));
        assert!(report.beat_log.is_none());
        assert_eq!(report.timing.len(), 1);
        assert_eq!(report.timing[0].classification, TimingClassification::OnTime);
    }

    #[test]
    fn test_processor_zero_pads_partial_tail() {
        let config = AnalyzerConfig::default();
        let data = FixtureData {
            metadata: FixtureMetadata {
                name: "short".to_string(),
                wav_path: PathBuf::from("short.wav"),
                expect_path: None,
            },
            sample_rate: 44_100,
            samples: vec![0; 4096 * 2 + 100],
            expectations: None,
        };

        let report = FixtureProcessor::new(config).run(&data).unwrap();
        assert_eq!(report.blocks, 3);
        assert!(report.events.is_empty());
    }
}
