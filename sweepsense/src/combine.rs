/*!
Folds a list of calibration captures into one file.

Each capture in the output manifest is added, one at a time, into a rolling
accumulator that sits next to the final output. The first capture is added to
itself. Each run goes through DC removal, a throttle, the same skip as a
capture, and a head of exactly one sweep period. The sum is then reduced to
its phase, with the magnitude gated to 0 or 1 by a hysteresis threshold.

The accumulator is only removed or renamed after the runtime acknowledges
that the previous run flushed it.
*/

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::{debug, info};

use crate::{
    Error, ResolvedConfig,
    flowgraph::{Block, Flowgraph, ItemType},
    manifest,
    runtime::{StreamingRuntime, run_to_completion},
};

const DC_BLOCKER_LEN: usize = 32;
const THROTTLE_SAMPLES_PER_SEC: f64 = 20e6;
const THRESHOLD_LOW: f32 = 0.01;
const THRESHOLD_HIGH: f32 = 0.04;

/// What a completed combination pass produced.
#[derive(Clone, Debug, PartialEq)]
pub struct CombineReport {
    /// The combined calibration file.
    pub output: PathBuf,
    /// Captures folded in, in order.
    pub inputs: Vec<PathBuf>,
    /// Total runtime across every run.
    pub elapsed: Duration,
}

/// The two rolling accumulator paths for an output file:
/// `<stem>_temp.<ext>` and `<stem>_combined.<ext>`, in the same directory.
pub fn accumulator_paths(output: &Path) -> (PathBuf, PathBuf) {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = |suffix: &str| match output.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    };
    (
        output.with_file_name(name("temp")),
        output.with_file_name(name("combined")),
    )
}

/// Topology adding `entry` into `accumulator` and writing the result to
/// `out`. `maxsamp` bounds the output length.
pub fn combination_graph(
    cfg: &ResolvedConfig,
    entry: &Path,
    accumulator: &Path,
    out: &Path,
) -> Result<Flowgraph, Error> {
    let mut fg = Flowgraph::new();
    let acc_src = fg.add(Block::FileSource {
        path: accumulator.to_path_buf(),
        repeat: true,
    });
    let entry_src = fg.add(Block::FileSource {
        path: entry.to_path_buf(),
        repeat: true,
    });
    let dc = || Block::DcBlocker {
        length: DC_BLOCKER_LEN,
        long_form: true,
    };
    let acc_dc = fg.add(dc());
    let entry_dc = fg.add(dc());
    let add = fg.add(Block::Add);
    let throttle = fg.add(Block::Throttle {
        samples_per_sec: THROTTLE_SAMPLES_PER_SEC,
    });
    let skip = fg.add(Block::SkipHead { n: cfg.skip() });
    let head = fg.add(Block::Head {
        item: ItemType::Complex32,
        n: cfg.maxsamp(),
    });
    let to_mag_phase = fg.add(Block::ComplexToMagPhase);
    let discard_mag = fg.add(Block::NullSink {
        item: ItemType::Float32,
    });
    let to_mag = fg.add(Block::ComplexToMag);
    let gate = fg.add(Block::Threshold {
        low: THRESHOLD_LOW,
        high: THRESHOLD_HIGH,
        initial: 0.0,
    });
    let to_complex = fg.add(Block::MagPhaseToComplex);
    let sink = fg.add(Block::FileSink {
        path: out.to_path_buf(),
    });

    fg.connect(acc_src, acc_dc)?;
    fg.connect(entry_src, entry_dc)?;
    fg.connect(acc_dc, (add, 0))?;
    fg.connect(entry_dc, (add, 1))?;
    fg.chain(&[add, throttle, skip, head])?;

    // Phase passes through, magnitude is replaced by the gate.
    fg.connect(head, to_mag_phase)?;
    fg.connect((to_mag_phase, 0), discard_mag)?;
    fg.connect((to_mag_phase, 1), (to_complex, 1))?;
    fg.chain(&[head, to_mag, gate])?;
    fg.connect(gate, (to_complex, 0))?;
    fg.connect(to_complex, sink)?;
    Ok(fg)
}

/// Combine every capture listed in `manifest_path` into `output`.
///
/// The capture length is shortened to one sweep period on a run-scoped copy
/// of `cfg`. A failure part way through leaves the accumulator files behind.
pub async fn combine<S: StreamingRuntime>(
    cfg: &ResolvedConfig,
    manifest_path: &Path,
    output: &Path,
    runtime: &mut S,
) -> Result<CombineReport, Error> {
    let inputs = manifest::read_paths(manifest_path).await?;
    if inputs.is_empty() {
        return Err(Error::config(format!(
            "calibration manifest {} lists no captures",
            manifest_path.display()
        )));
    }
    let cfg = cfg.with_maxsamp(cfg.period());
    let (temp, combined) = accumulator_paths(output);
    let mut elapsed = Duration::ZERO;

    for (i, entry) in inputs.iter().enumerate() {
        info!("Now processing {}", entry.display());
        let graph = if i == 0 {
            combination_graph(&cfg, entry, entry, &temp)?
        } else {
            combination_graph(&cfg, entry, &temp, &combined)?
        };
        let (_, took) = run_to_completion(runtime, &graph).await?;
        elapsed += took;
        if i != 0 {
            tokio::fs::remove_file(&temp).await?;
            tokio::fs::rename(&combined, &temp).await?;
            debug!("{} -> {}", combined.display(), temp.display());
        }
    }
    tokio::fs::rename(&temp, output).await?;
    info!("Calibration combine complete: {}", output.display());

    Ok(CombineReport {
        output: output.to_path_buf(),
        inputs,
        elapsed,
    })
}
