/*!
The capture orchestrator.

[`capture`] runs exactly one topology for a resolved configuration. The mode
is decoded before anything else, so an unknown mode never opens a device.
After the device is open and initialized, the mode's tuning calls are applied
and its topology is built by the matching builder function, then run to
completion.
*/

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::info;

use crate::{
    Error, Mode, ResolvedConfig,
    device::{DeviceDriver, Direction, Radio},
    flowgraph::{Block, BlockId, Flowgraph, ItemType},
    registers,
    runtime::{StreamingRuntime, run_to_completion},
};

/// Offset between the tone capture transmitter's idle channel and the tone,
/// keeping it out of band.
const TONE_CAPTURE_IDLE_OFFSET_HZ: f64 = 100e6;

/// Frequency of the calibration tone, relative to the tuned center.
const TONE_OFFSET_HZ: f64 = 10_000.0;

/// Length of the DC blocker used on standalone captures.
const STANDALONE_DC_BLOCKER_LEN: usize = 256;

/// What a completed capture produced.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureReport {
    /// The mode that ran.
    pub mode: Mode,
    /// Wall-clock time from start to stop.
    pub elapsed: Duration,
    /// Files written.
    pub outputs: Vec<PathBuf>,
}

/// Where the compensation signal comes from.
enum Compensation<'a> {
    /// A recorded calibration tone, repeated.
    File(&'a Path),
    /// A constant 1+0j: no compensation.
    Unity,
}

impl Compensation<'_> {
    fn block(&self) -> Block {
        match self {
            Self::File(path) => Block::FileSource {
                path: path.to_path_buf(),
                repeat: true,
            },
            Self::Unity => Block::ConstSource { re: 1.0, im: 0.0 },
        }
    }
}

fn head(fg: &mut Flowgraph, n: u64) -> BlockId {
    fg.add(Block::Head {
        item: ItemType::Complex32,
        n,
    })
}

fn file_sink(fg: &mut Flowgraph, path: &Path) -> BlockId {
    fg.add(Block::FileSink {
        path: path.to_path_buf(),
    })
}

fn null_sink(fg: &mut Flowgraph) -> BlockId {
    fg.add(Block::NullSink {
        item: ItemType::Complex32,
    })
}

/// Run one capture for a resolved configuration, blocking until it finishes.
pub async fn capture<D, S>(
    cfg: &ResolvedConfig,
    driver: &mut D,
    runtime: &mut S,
) -> Result<CaptureReport, Error>
where
    D: DeviceDriver,
    S: StreamingRuntime,
{
    let mode = Mode::decode(cfg.config().mode, &cfg.config().filename)?;
    info!("Starting mode {} capture", mode.code());

    let request = mode.device_request(cfg.config());
    let mut radio = driver.open(&request).await?;
    registers::initialize(&mut radio, cfg.config()).await?;

    let graph = match &mode {
        Mode::Idle => idle(&mut radio, cfg).await?,
        Mode::PairedDiscard { .. } => paired_discard(&mut radio, cfg).await?,
        Mode::PairedCompensated {
            normal_rx,
            sweepsense_rx,
            calibration,
        } => {
            paired_compensated(&mut radio, cfg, normal_rx, sweepsense_rx, calibration).await?
        }
        Mode::PairedUncompensated {
            normal_rx,
            sweepsense_rx,
        } => paired_uncompensated(&mut radio, cfg, normal_rx, sweepsense_rx).await?,
        Mode::ToneCapture { save_path } => tone_capture(&mut radio, cfg, save_path).await?,
        Mode::Standalone {
            sweepsense_rx,
            calibration,
        } => standalone(&mut radio, cfg, sweepsense_rx, calibration).await?,
        Mode::StandaloneUncompensated { sweepsense_rx } => {
            standalone_uncompensated(&mut radio, cfg, sweepsense_rx).await?
        }
    };

    let (_, elapsed) = run_to_completion(runtime, &graph).await?;
    drop(radio);
    info!("Total Elapsed: {:.3} seconds", elapsed.as_secs_f64());

    let outputs = mode.outputs();
    Ok(CaptureReport {
        mode,
        elapsed,
        outputs,
    })
}

async fn idle<R: Radio>(_radio: &mut R, _cfg: &ResolvedConfig) -> Result<Flowgraph, Error> {
    let mut fg = Flowgraph::new();
    let src = fg.add(Block::DeviceSource { channels: 1 });
    let sink = null_sink(&mut fg);
    fg.connect(src, sink)?;
    Ok(fg)
}

async fn paired_discard<R: Radio>(_radio: &mut R, _cfg: &ResolvedConfig) -> Result<Flowgraph, Error> {
    let mut fg = Flowgraph::new();
    let src = fg.add(Block::DeviceSource { channels: 2 });
    for chan in 0..2 {
        let sink = null_sink(&mut fg);
        fg.connect((src, chan), sink)?;
    }
    Ok(fg)
}

/// Channel 0 is the sweeper, channel 1 the off-the-shelf receiver slaved over
/// the MIMO cable and tuned to `txfreq`.
async fn tune_paired_rx<R: Radio>(radio: &mut R, cfg: &ResolvedConfig) -> Result<(), Error> {
    let c = cfg.config();
    radio.set_gain(Direction::Rx, c.rgain, 0).await?;
    radio.set_antenna(Direction::Rx, "RX2", 0).await?;
    radio.set_bandwidth(Direction::Rx, c.samp, 0).await?;

    radio.set_samp_rate(Direction::Rx, c.samp).await?;
    radio.set_gain(Direction::Rx, c.rgain, 1).await?;
    radio.set_antenna(Direction::Rx, "TX/RX", 1).await?;
    radio.set_center_freq(Direction::Rx, c.txfreq, 1).await?;
    radio.set_bandwidth(Direction::Rx, c.samp, 1).await?;
    radio.set_clock_source(Direction::Rx, "mimo", 1).await?;
    radio.set_time_source(Direction::Rx, "mimo", 1).await?;
    Ok(())
}

async fn paired<R: Radio>(
    radio: &mut R,
    cfg: &ResolvedConfig,
    normal_rx: &Path,
    sweepsense_rx: &Path,
    comp: Compensation<'_>,
) -> Result<Flowgraph, Error> {
    tune_paired_rx(radio, cfg).await?;

    let mut fg = Flowgraph::new();
    let src = fg.add(Block::DeviceSource { channels: 2 });
    let head_normal = head(&mut fg, cfg.maxsamp());
    let head_sweep = head(&mut fg, cfg.maxsamp());
    let sink_normal = file_sink(&mut fg, normal_rx);
    let sink_sweep = file_sink(&mut fg, sweepsense_rx);
    let cal = fg.add(comp.block());
    let mult = fg.add(Block::MultiplyConjugate);

    fg.connect((src, 1), head_normal)?;
    fg.connect((src, 0), (mult, 0))?;
    fg.connect(cal, (mult, 1))?;
    fg.chain(&[mult, head_sweep, sink_sweep])?;
    fg.connect(head_normal, sink_normal)?;
    Ok(fg)
}

async fn paired_compensated<R: Radio>(
    radio: &mut R,
    cfg: &ResolvedConfig,
    normal_rx: &Path,
    sweepsense_rx: &Path,
    calibration: &Path,
) -> Result<Flowgraph, Error> {
    paired(
        radio,
        cfg,
        normal_rx,
        sweepsense_rx,
        Compensation::File(calibration),
    )
    .await
}

async fn paired_uncompensated<R: Radio>(
    radio: &mut R,
    cfg: &ResolvedConfig,
    normal_rx: &Path,
    sweepsense_rx: &Path,
) -> Result<Flowgraph, Error> {
    paired(radio, cfg, normal_rx, sweepsense_rx, Compensation::Unity).await
}

async fn tone_capture<R: Radio>(
    radio: &mut R,
    cfg: &ResolvedConfig,
    save_path: &Path,
) -> Result<Flowgraph, Error> {
    let c = cfg.config();

    // Sweeper receive
    radio.set_gain(Direction::Rx, c.rgain, 0).await?;
    radio.set_antenna(Direction::Rx, "RX2", 0).await?;
    radio.set_bandwidth(Direction::Rx, c.samp, 0).await?;

    // Sweeper side of the sink idles off band so it doesn't interfere.
    radio.set_gain(Direction::Tx, c.tgain, 0).await?;
    radio.set_antenna(Direction::Tx, "TX/RX", 0).await?;
    radio
        .set_center_freq(Direction::Tx, c.txfreq - TONE_CAPTURE_IDLE_OFFSET_HZ, 0)
        .await?;
    radio.set_bandwidth(Direction::Tx, c.txsamp, 0).await?;

    // Tone transmitter
    radio.set_samp_rate(Direction::Tx, c.txsamp).await?;
    radio.set_gain(Direction::Tx, c.tgain, 1).await?;
    radio.set_antenna(Direction::Tx, "TX/RX", 1).await?;
    radio.set_center_freq(Direction::Tx, c.txfreq, 1).await?;
    radio.set_bandwidth(Direction::Tx, c.txsamp, 1).await?;
    radio.set_clock_source(Direction::Tx, "mimo", 1).await?;
    radio.set_time_source(Direction::Tx, "mimo", 1).await?;

    radio.set_samp_rate(Direction::Rx, c.samp).await?;
    radio.set_gain(Direction::Rx, c.rgain, 1).await?;
    radio.set_antenna(Direction::Rx, "RX2", 1).await?;
    radio.set_center_freq(Direction::Rx, c.txfreq, 1).await?;
    radio.set_bandwidth(Direction::Rx, c.samp, 1).await?;
    radio.set_clock_source(Direction::Rx, "mimo", 1).await?;
    radio.set_time_source(Direction::Rx, "mimo", 1).await?;

    let mut fg = Flowgraph::new();
    let src = fg.add(Block::DeviceSource { channels: 2 });
    let snk = fg.add(Block::DeviceSink { channels: 2 });
    let discard = null_sink(&mut fg);
    let zeros = fg.add(Block::NullSource {
        item: ItemType::Complex32,
    });
    let tone = fg.add(Block::CosineSource {
        samp_rate: c.samp,
        freq: TONE_OFFSET_HZ,
        amplitude: 1.0,
    });
    let save = file_sink(&mut fg, save_path);

    let chains = [
        (src, 0, save, 0),
        (src, 1, discard, 0),
        (tone, 0, snk, 1),
        (zeros, 0, snk, 0),
    ];
    for (from, from_port, to, to_port) in chains {
        let skip = fg.add(Block::SkipHead { n: cfg.skip() });
        let limit = head(&mut fg, cfg.maxsamp());
        fg.connect((from, from_port), skip)?;
        fg.connect(skip, limit)?;
        fg.connect(limit, (to, to_port))?;
    }
    Ok(fg)
}

async fn tune_standalone_rx<R: Radio>(radio: &mut R, cfg: &ResolvedConfig) -> Result<(), Error> {
    let c = cfg.config();
    radio.set_gain(Direction::Rx, c.rgain, 0).await?;
    radio.set_antenna(Direction::Rx, "RX2", 0).await?;
    radio.set_bandwidth(Direction::Rx, c.samp, 0).await?;
    radio.set_samp_rate(Direction::Rx, c.samp).await?;
    Ok(())
}

/// Keep one full sweep over every band out of every `in_n`.
pub(crate) fn keep_sweeps(cfg: &ResolvedConfig) -> Result<Block, Error> {
    let m = cfg.period();
    let n = m
        .checked_mul(cfg.config().in_n.max(1))
        .ok_or_else(|| Error::config("Keep-M-in-N interval does not fit in 64 bits"))?;
    Ok(Block::KeepMInN { m, n, offset: 0 })
}

async fn standalone_with<R: Radio>(
    radio: &mut R,
    cfg: &ResolvedConfig,
    sweepsense_rx: &Path,
    comp: Compensation<'_>,
) -> Result<Flowgraph, Error> {
    tune_standalone_rx(radio, cfg).await?;

    let mut fg = Flowgraph::new();
    let src = fg.add(Block::DeviceSource { channels: 1 });
    let dc = fg.add(Block::DcBlocker {
        length: STANDALONE_DC_BLOCKER_LEN,
        long_form: false,
    });
    let cal = fg.add(comp.block());
    let mult = fg.add(Block::MultiplyConjugate);
    let skip = fg.add(Block::SkipHead { n: cfg.skip() });
    let keep = fg.add(keep_sweeps(cfg)?);
    let limit = head(&mut fg, cfg.maxsamp());
    let sink = file_sink(&mut fg, sweepsense_rx);

    fg.connect(src, dc)?;
    fg.connect(dc, (mult, 0))?;
    fg.connect(cal, (mult, 1))?;
    fg.chain(&[mult, skip, keep, limit, sink])?;
    Ok(fg)
}

async fn standalone<R: Radio>(
    radio: &mut R,
    cfg: &ResolvedConfig,
    sweepsense_rx: &Path,
    calibration: &Path,
) -> Result<Flowgraph, Error> {
    standalone_with(radio, cfg, sweepsense_rx, Compensation::File(calibration)).await
}

async fn standalone_uncompensated<R: Radio>(
    radio: &mut R,
    cfg: &ResolvedConfig,
    sweepsense_rx: &Path,
) -> Result<Flowgraph, Error> {
    standalone_with(radio, cfg, sweepsense_rx, Compensation::Unity).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Config, StepTable,
        device::DeviceCommand,
        sim::{SimDriver, SimRuntime},
    };

    fn resolved(mode: i32, files: &[&str]) -> ResolvedConfig {
        let cfg = Config {
            band1: 0x30,
            band2: 0,
            step: 1,
            maxsamp: 500,
            skip: 0,
            in_n: 4,
            mode,
            filename: files.iter().map(|s| s.to_string()).collect(),
            ..Config::default()
        };
        StepTable::new(vec![100]).resolve(&cfg).unwrap()
    }

    #[tokio::test]
    async fn unknown_mode_opens_nothing() {
        let cfg = resolved(99, &[]);
        let mut driver = SimDriver::new("CBX");
        let mut runtime = SimRuntime::new();
        let err = capture(&cfg, &mut driver, &mut runtime).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedMode(99)));
        assert!(driver.journal().opened.is_empty());
        assert!(runtime.graphs().is_empty());
    }

    #[tokio::test]
    async fn unknown_board_stops_before_streaming() {
        let cfg = resolved(0, &[]);
        let mut driver = SimDriver::new("WBX");
        let mut runtime = SimRuntime::new();
        let err = capture(&cfg, &mut driver, &mut runtime).await.unwrap_err();
        assert!(matches!(err, Error::UnknownHardware(_)));
        assert_eq!(driver.journal().opened.len(), 1);
        assert!(runtime.graphs().is_empty());
    }

    #[tokio::test]
    async fn init_sequence_precedes_tuning() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("rx.dat");
        let cfg = resolved(30, &[out.to_str().unwrap()]);
        let mut driver = SimDriver::new("CBX-120");
        let mut runtime = SimRuntime::new();
        capture(&cfg, &mut driver, &mut runtime).await.unwrap();

        let cmds = driver.journal().commands;
        assert_eq!(
            cmds[0],
            DeviceCommand::WriteAuxDac {
                unit: Direction::Tx,
                dac: crate::device::AuxDac::A,
                volts: 0.2
            }
        );
        let regs: Vec<u8> = cmds[1..9]
            .iter()
            .map(|c| match c {
                DeviceCommand::SetUserRegister { addr, .. } => *addr,
                other => panic!("expected a register write, got {other:?}"),
            })
            .collect();
        assert_eq!(regs, [3, 1, 2, 6, 5, 4, 7, 8]);
        assert!(matches!(cmds[9], DeviceCommand::SetGain { .. }));
    }

    #[tokio::test]
    async fn standalone_topology() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("rx.dat");
        let cal = dir.path().join("cal.dat");
        tokio::fs::write(&cal, [0u8; 8]).await.unwrap();
        let cfg = resolved(3, &[out.to_str().unwrap(), cal.to_str().unwrap()]);
        let mut driver = SimDriver::new("CBX");
        let mut runtime = SimRuntime::new();
        let report = capture(&cfg, &mut driver, &mut runtime).await.unwrap();
        assert_eq!(report.outputs, [out.clone()]);

        let fg = &runtime.graphs()[0];
        assert!(fg.blocks().contains(&Block::KeepMInN {
            m: 200,
            n: 800,
            offset: 0
        }));
        assert!(fg.blocks().contains(&Block::FileSource {
            path: cal,
            repeat: true
        }));
        assert!(fg.blocks().contains(&Block::DcBlocker {
            length: 256,
            long_form: false
        }));
        assert_eq!(tokio::fs::metadata(&out).await.unwrap().len(), 600 * 8);
    }

    #[tokio::test]
    async fn paired_uncompensated_uses_unity_tone() {
        let dir = tempfile::tempdir().unwrap();
        let normal = dir.path().join("normal.dat");
        let sweep = dir.path().join("sweep.dat");
        let cfg = resolved(10, &[normal.to_str().unwrap(), sweep.to_str().unwrap()]);
        let mut driver = SimDriver::new("CBX");
        let mut runtime = SimRuntime::new();
        capture(&cfg, &mut driver, &mut runtime).await.unwrap();

        let journal = driver.journal();
        assert_eq!(journal.opened[0].channels, 2);
        assert!(journal.commands.contains(&DeviceCommand::SetClockSource {
            dir: Direction::Rx,
            source: "mimo".into(),
            mboard: 1
        }));
        let fg = &runtime.graphs()[0];
        assert!(fg.blocks().contains(&Block::ConstSource { re: 1.0, im: 0.0 }));
        assert!(normal.exists() && sweep.exists());
    }

    #[tokio::test]
    async fn tone_capture_offsets_idle_channel() {
        let dir = tempfile::tempdir().unwrap();
        let save = dir.path().join("tone.dat");
        let cfg = resolved(2, &[save.to_str().unwrap()]);
        let mut driver = SimDriver::new("SBX");
        let mut runtime = SimRuntime::new();
        capture(&cfg, &mut driver, &mut runtime).await.unwrap();

        let journal = driver.journal();
        assert!(journal.opened[0].transmit);
        let txfreq = cfg.config().txfreq;
        assert!(journal.commands.contains(&DeviceCommand::SetCenterFreq {
            dir: Direction::Tx,
            hz: txfreq - 100e6,
            chan: 0
        }));
        assert!(journal.commands.contains(&DeviceCommand::SetCenterFreq {
            dir: Direction::Tx,
            hz: txfreq,
            chan: 1
        }));
        let fg = &runtime.graphs()[0];
        let skips = fg
            .blocks()
            .iter()
            .filter(|b| matches!(b, Block::SkipHead { .. }))
            .count();
        assert_eq!(skips, 4);
    }
}
