use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::Context;
use sweepsense::{Config, ResolvedConfig, StepTable, store};

/// Accepts decimal, `0x` hex, or `0b` binary.
fn parse_bitmap(s: &str) -> Result<u32, String> {
    let s = s.trim().replace('_', "");
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else if let Some(bin) = s.strip_prefix("0b").or_else(|| s.strip_prefix("0B")) {
        u32::from_str_radix(bin, 2)
    } else {
        s.parse()
    };
    parsed.map_err(|e| format!("not a 32-bit band bitmap: {e}"))
}

/// Builds a [`Config`] from an optional saved file plus command-line
/// overrides.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Saved configuration to start from. Defaults are used without one.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Step size table: CSV with a `samp_sep` column, one row per step.
    #[arg(long, default_value = "script_files/step_sizes.csv")]
    steps: PathBuf,

    /// Bitmap of the lower 32 VCO bands. LSB is the lowest band.
    #[arg(long, value_parser = parse_bitmap)]
    band1: Option<u32>,

    /// Bitmap of the upper VCO bands.
    #[arg(long, value_parser = parse_bitmap)]
    band2: Option<u32>,

    /// Voltage step size code, 1-indexed into the step table.
    #[arg(long)]
    step: Option<u32>,

    /// Maximum number of samples to capture.
    #[arg(short = 'n', long)]
    maxsamp: Option<u64>,

    /// Samples to discard before the first kept sample.
    #[arg(long)]
    skip: Option<u64>,

    /// Keep one sweep out of every `in_n`.
    #[arg(long = "in-n")]
    in_n: Option<u64>,

    /// Operating mode: 0, 1, 2, 3, 10, or 30. Calibration uses 1 or 2.
    #[arg(short, long)]
    mode: Option<i32>,

    /// VCO RF divider. CBX: 1 for 3-6 GHz, 2 for 1.5-3 GHz.
    #[arg(long)]
    rf_div: Option<u32>,

    /// Receive gain, dB.
    #[arg(long)]
    rgain: Option<f64>,

    /// Transmit gain, dB.
    #[arg(long)]
    tgain: Option<f64>,

    /// Receive sample rate, Hz.
    #[arg(short, long)]
    samp: Option<f64>,

    /// Transmit / tuning frequency, Hz.
    #[arg(short, long)]
    txfreq: Option<f64>,

    /// Transmit sample rate, Hz.
    #[arg(long)]
    txsamp: Option<f64>,

    /// Mode-dependent file list, in order. Repeat for each entry. Replaces
    /// the saved list when given.
    #[arg(short, long = "file")]
    filename: Vec<String>,

    /// Where `save` writes this configuration.
    #[arg(long)]
    self_name: Option<String>,

    /// Device arguments for the standalone receiver.
    #[arg(long)]
    source_addr: Option<String>,

    /// Device arguments for the MIMO pair.
    #[arg(long)]
    paired_addr: Option<String>,
}

impl ConfigArgs {
    pub fn build(&self) -> color_eyre::Result<Config> {
        let mut cfg = match self.config.as_ref() {
            Some(path) => store::load(path)
                .wrap_err_with(|| format!("Failed loading {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(v) = self.band1 {
            cfg.band1 = v;
        }
        if let Some(v) = self.band2 {
            cfg.band2 = v;
        }
        if let Some(v) = self.step {
            cfg.step = v;
        }
        if let Some(v) = self.maxsamp {
            cfg.maxsamp = v;
        }
        if let Some(v) = self.skip {
            cfg.skip = v;
        }
        if let Some(v) = self.in_n {
            cfg.in_n = v;
        }
        if let Some(v) = self.mode {
            cfg.mode = v;
        }
        if let Some(v) = self.rf_div {
            cfg.rf_div = v;
        }
        if let Some(v) = self.rgain {
            cfg.rgain = v;
        }
        if let Some(v) = self.tgain {
            cfg.tgain = v;
        }
        if let Some(v) = self.samp {
            cfg.samp = v;
        }
        if let Some(v) = self.txfreq {
            cfg.txfreq = v;
        }
        if let Some(v) = self.txsamp {
            cfg.txsamp = v;
        }
        if !self.filename.is_empty() {
            cfg.filename = self.filename.clone();
        }
        if let Some(v) = self.self_name.as_ref() {
            cfg.self_name = v.clone();
        }
        if let Some(v) = self.source_addr.as_ref() {
            cfg.source_addr = v.clone();
        }
        if let Some(v) = self.paired_addr.as_ref() {
            cfg.paired_addr = v.clone();
        }
        Ok(cfg)
    }

    pub fn resolve(&self) -> color_eyre::Result<ResolvedConfig> {
        let cfg = self.build()?;
        let steps = StepTable::from_path(&self.steps)
            .wrap_err_with(|| format!("Failed reading step table {}", self.steps.display()))?;
        steps
            .resolve(&cfg)
            .wrap_err("Configuration can't be resolved")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmaps() {
        assert_eq!(parse_bitmap("48").unwrap(), 48);
        assert_eq!(parse_bitmap("0x30").unwrap(), 0x30);
        assert_eq!(parse_bitmap("0b11_0000").unwrap(), 0x30);
        assert_eq!(parse_bitmap("0xffffffff").unwrap(), u32::MAX);
        assert!(parse_bitmap("0x1_0000_0000").is_err());
        assert!(parse_bitmap("band5").is_err());
    }

    #[test]
    fn overrides_apply_over_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let saved = Config {
            mode: 3,
            step: 4,
            filename: vec!["a.dat".into(), "b.dat".into()],
            self_name: path.display().to_string(),
            ..Config::default()
        };
        store::save(&saved).unwrap();

        let args = ConfigArgs {
            config: Some(path),
            mode: Some(30),
            filename: vec!["c.dat".into()],
            ..ConfigArgs::default()
        };
        let cfg = args.build().unwrap();
        assert_eq!(cfg.mode, 30);
        assert_eq!(cfg.step, 4);
        assert_eq!(cfg.filename, ["c.dat"]);
    }

    #[test]
    fn resolve_reads_step_table() {
        let dir = tempfile::tempdir().unwrap();
        let steps = dir.path().join("steps.csv");
        std::fs::write(&steps, "samp_sep\n0\n250\n").unwrap();
        let mut args = ConfigArgs {
            steps,
            step: Some(2),
            ..ConfigArgs::default()
        };
        let resolved = args.resolve().unwrap();
        assert_eq!(resolved.sweep_time(), 250);

        args.step = Some(1);
        assert!(args.resolve().is_err());
    }
}
