/*!
The calibration sequencer.

A calibration pass reads a list of tone frequencies and, for each one, runs a
single capture of the sweeper receiving that tone. Each capture path is
appended to an output manifest just before its capture starts, and once every
tone is captured the files are folded into one calibration file by
[`combine`][crate::combine].

Two kinds of calibration are supported:

- [`CalibrationMode::SelfLeakage`] (mode 1): the same device transmits a
  constant tone at each frequency and the receiver picks up the leakage
  between its own TX and RX chains.
- [`CalibrationMode::ExternalTone`] (mode 2): the tone comes from an external
  source. Nothing is transmitted, and the operator is asked to confirm before
  each capture so the source can be retuned.

The pass is fail-fast. Captures that completed before an error stay on disk,
and the output manifest on disk lists them followed by the one that failed.
*/

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use tracing::info;

use crate::{
    CombineReport, Error, ResolvedConfig,
    capture::keep_sweeps,
    combine,
    device::{DeviceDriver, DeviceRequest, Direction, Radio},
    flowgraph::{Block, Flowgraph, ItemType},
    manifest::{self, ManifestWriter},
    registers,
    runtime::{StreamingRuntime, run_to_completion},
};

/// Transmit sample rate of the self-calibration tone.
const TONE_SAMP_RATE: f64 = 10e6;

/// Transmit bandwidth of the self-calibration tone.
const TONE_BANDWIDTH: f64 = 25e6;

/// Where the calibration tone comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationMode {
    /// Mode 1: the device transmits the tone itself.
    SelfLeakage,
    /// Mode 2: an external source provides the tone.
    ExternalTone,
}

impl CalibrationMode {
    /// Decode a calibration mode code. Only 1 and 2 are meaningful here.
    pub fn from_code(code: i32) -> Result<Self, Error> {
        match code {
            1 => Ok(Self::SelfLeakage),
            2 => Ok(Self::ExternalTone),
            other => Err(Error::UnsupportedMode(other)),
        }
    }

    /// Whether the device transmits during capture.
    pub fn transmits(self) -> bool {
        matches!(self, Self::SelfLeakage)
    }
}

/// Where the capture of one tone is saved: `<save_path><freq>_step_<step>_sweeped_tone.dat`.
///
/// `save_path` is a plain prefix, so a directory needs its trailing separator.
pub fn capture_path(save_path: &str, freq: u64, step: u32) -> PathBuf {
    PathBuf::from(format!("{save_path}{freq}_step_{step}_sweeped_tone.dat"))
}

/// Where the combined calibration is written: `<save_path>combined_rt_cal.dat`.
pub fn combined_path(save_path: &str) -> PathBuf {
    PathBuf::from(format!("{save_path}combined_rt_cal.dat"))
}

/// What a completed calibration pass produced.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationReport {
    /// Which kind of calibration ran.
    pub mode: CalibrationMode,
    /// One capture per tone, in manifest order.
    pub captures: Vec<PathBuf>,
    /// The output manifest listing `captures`.
    pub manifest: PathBuf,
    /// Wall-clock time spent capturing, from the first tone to the last.
    pub elapsed: Duration,
    /// The combination pass.
    pub combined: CombineReport,
}

type Confirm<'a> = Box<dyn FnMut(u64, &Path) -> Result<(), Error> + 'a>;

/// Runs a calibration pass.
///
/// `filename[0]` of the configuration is the frequency manifest and
/// `filename[1]` the save path prefix.
pub struct Calibration<'a> {
    cfg: &'a ResolvedConfig,
    confirm: Option<Confirm<'a>>,
}

impl std::fmt::Debug for Calibration<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Calibration")
            .field("cfg", &self.cfg)
            .field("confirm", &self.confirm.is_some())
            .finish()
    }
}

impl<'a> Calibration<'a> {
    /// Prepare a pass for a resolved configuration.
    pub fn new(cfg: &'a ResolvedConfig) -> Self {
        Self { cfg, confirm: None }
    }

    /// Ask for confirmation before each external-tone capture. The callback
    /// gets the tone frequency and the capture path; an error aborts the
    /// pass. Without one, external-tone captures start immediately.
    pub fn with_confirmation(
        mut self,
        confirm: impl FnMut(u64, &Path) -> Result<(), Error> + 'a,
    ) -> Self {
        self.confirm = Some(Box::new(confirm));
        self
    }

    /// Capture every tone, then combine the captures.
    pub async fn run<D, S>(&mut self, driver: &mut D, runtime: &mut S) -> Result<CalibrationReport, Error>
    where
        D: DeviceDriver,
        S: StreamingRuntime,
    {
        let c = self.cfg.config();
        let mode = CalibrationMode::from_code(c.mode)?;
        let [freq_manifest, save_path, ..] = c.filename.as_slice() else {
            return Err(Error::config(format!(
                "calibration needs a frequency list and a save path, but {} filenames were given",
                c.filename.len()
            )));
        };
        let freq_manifest = Path::new(freq_manifest);

        let freqs = manifest::read_frequencies(freq_manifest).await?;
        let mut out = ManifestWriter::create(manifest::output_manifest_path(freq_manifest)).await?;
        let mut captures = Vec::with_capacity(freqs.len());

        let start = Instant::now();
        for freq in freqs {
            let cfg = self.cfg.with_txfreq(freq as f64);
            let path = capture_path(save_path, freq, c.step);
            out.push(&path).await?;
            info!("Sending calibration tone at {freq} Hz");
            if mode == CalibrationMode::ExternalTone {
                if let Some(confirm) = self.confirm.as_mut() {
                    confirm(freq, &path)?;
                }
            }
            calibration_capture(&cfg, mode, &path, driver, runtime).await?;
            captures.push(path);
        }
        let elapsed = start.elapsed();
        info!("Total Elapsed: {:.3} seconds", elapsed.as_secs_f64());
        info!("Calibration capture complete");

        let manifest = out.finish().await?;
        let combined = combine::combine(self.cfg, &manifest, &combined_path(save_path), runtime).await?;

        Ok(CalibrationReport {
            mode,
            captures,
            manifest,
            elapsed,
            combined,
        })
    }
}

/// Capture one calibration tone into `path`, using `cfg.txfreq` as the tone
/// frequency.
pub async fn calibration_capture<D, S>(
    cfg: &ResolvedConfig,
    mode: CalibrationMode,
    path: &Path,
    driver: &mut D,
    runtime: &mut S,
) -> Result<Duration, Error>
where
    D: DeviceDriver,
    S: StreamingRuntime,
{
    let c = cfg.config();
    let request = DeviceRequest {
        args: c.source_addr.clone(),
        channels: 1,
        transmit: mode.transmits(),
    };
    let mut radio = driver.open(&request).await?;
    registers::initialize(&mut radio, c).await?;
    tune(&mut radio, cfg, mode).await?;

    let graph = calibration_graph(cfg, mode, path)?;
    let (_, elapsed) = run_to_completion(runtime, &graph).await?;
    Ok(elapsed)
}

async fn tune<R: Radio>(radio: &mut R, cfg: &ResolvedConfig, mode: CalibrationMode) -> Result<(), Error> {
    let c = cfg.config();
    radio.set_antenna(Direction::Rx, "RX2", 0).await?;
    radio.set_samp_rate(Direction::Rx, c.samp).await?;
    radio.set_bandwidth(Direction::Rx, c.samp, 0).await?;
    radio.set_gain(Direction::Rx, c.rgain, 0).await?;

    if mode.transmits() {
        radio.set_samp_rate(Direction::Tx, TONE_SAMP_RATE).await?;
        radio.set_center_freq(Direction::Tx, c.txfreq, 0).await?;
        radio.set_gain(Direction::Tx, c.tgain, 0).await?;
        radio.set_antenna(Direction::Tx, "TX/RX", 0).await?;
        radio.set_bandwidth(Direction::Tx, TONE_BANDWIDTH, 0).await?;
    }

    radio.set_clock_source(Direction::Rx, "internal", 0).await?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    radio.set_time_now(now).await?;
    Ok(())
}

/// Topology for one calibration capture.
pub fn calibration_graph(cfg: &ResolvedConfig, mode: CalibrationMode, path: &Path) -> Result<Flowgraph, Error> {
    let c = cfg.config();
    let mut fg = Flowgraph::new();

    let src = fg.add(Block::DeviceSource { channels: 1 });
    let skip = fg.add(Block::SkipHead { n: cfg.skip() });
    let keep = fg.add(keep_sweeps(cfg)?);
    let limit = fg.add(Block::Head {
        item: ItemType::Complex32,
        n: cfg.maxsamp(),
    });
    let sink = fg.add(Block::FileMetaSink {
        path: path.to_path_buf(),
        samp_rate: c.samp,
        max_segment_size: cfg.sweep_time(),
        detached_header: true,
    });
    fg.chain(&[src, skip, keep, limit, sink])?;

    if mode.transmits() {
        let n = c
            .in_n
            .max(1)
            .checked_mul(cfg.maxsamp())
            .and_then(|n| n.checked_add(cfg.skip()))
            .ok_or_else(|| Error::config("Calibration tone length does not fit in 64 bits"))?;
        let tone = fg.add(Block::ConstSource { re: 1.0, im: 0.0 });
        let tone_limit = fg.add(Block::Head {
            item: ItemType::Complex32,
            n,
        });
        let tx = fg.add(Block::DeviceSink { channels: 1 });
        fg.chain(&[tone, tone_limit, tx])?;
    }
    Ok(fg)
}
