/*!
The sweep/calibration configuration record.

A [`Config`] holds the raw parameters a caller asked for. It can't be used for
a capture directly: pass it through [`StepTable::resolve`] first, which
produces a [`ResolvedConfig`] with the sweep period derived and the sample
counts normalized. Capture, calibration and combination all take a
`ResolvedConfig`, so an unresolved configuration can't reach the hardware.

[`StepTable::resolve`]: crate::StepTable::resolve
*/

use serde::{Deserialize, Serialize};

/// Device arguments for the standalone SweepSense receiver.
pub const DEFAULT_SOURCE_ADDR: &str = "addr0=192.168.10.3";

/// Device arguments for the MIMO-cabled pair. `addr0` is the sweeper, `addr1`
/// the off-the-shelf radio.
pub const DEFAULT_PAIRED_ADDR: &str = "addr0=192.168.10.2,addr1=192.168.20.3";

fn default_source_addr() -> String {
    DEFAULT_SOURCE_ADDR.to_owned()
}

fn default_paired_addr() -> String {
    DEFAULT_PAIRED_ADDR.to_owned()
}

/// Raw sweep and calibration parameters, as requested by a caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Bitmap of the lower 32 VCO bands to sweep. The LSB is the lowest
    /// frequency band.
    pub band1: u32,
    /// Bitmap of the upper VCO bands to sweep.
    pub band2: u32,
    /// Voltage step size code, 1-indexed into the step table.
    pub step: u32,
    /// Maximum number of samples to capture.
    pub maxsamp: u64,
    /// Number of samples to discard before the first kept sample.
    pub skip: u64,
    /// Keep one sweep group out of every `in_n`.
    pub in_n: u64,
    /// Operating mode code. See [`Mode`][crate::Mode].
    pub mode: i32,
    /// RF output divider of the VCO. For a CBX, 1 covers 3-6 GHz and 2 covers
    /// 1.5-3 GHz.
    pub rf_div: u32,
    /// Receive gain of every receive chain, in dB.
    pub rgain: f64,
    /// Transmit gain of every transmit chain, in dB.
    pub tgain: f64,
    /// Receive sample rate, in Hz.
    pub samp: f64,
    /// Transmit / tuning frequency, in Hz.
    pub txfreq: f64,
    /// Transmit sample rate, in Hz.
    pub txsamp: f64,
    /// Positional, mode-dependent path list.
    #[serde(default)]
    pub filename: Vec<String>,
    /// Where the configuration store saves this record.
    #[serde(default)]
    pub self_name: String,
    /// Device arguments for single-device topologies.
    #[serde(default = "default_source_addr")]
    pub source_addr: String,
    /// Device arguments for the two-device MIMO topologies.
    #[serde(default = "default_paired_addr")]
    pub paired_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            band1: 0x30,
            band2: 0,
            step: 1,
            maxsamp: 1_000_000,
            skip: 100_000,
            in_n: 1,
            mode: 0,
            rf_div: 1,
            rgain: 30.0,
            tgain: 30.0,
            samp: 25e6,
            txfreq: 2.44e9,
            txsamp: 10e6,
            filename: Vec::new(),
            self_name: String::new(),
            source_addr: default_source_addr(),
            paired_addr: default_paired_addr(),
        }
    }
}

impl Config {
    /// Total number of VCO bands enabled across both bitmaps.
    pub fn num_bands(&self) -> u32 {
        self.band1.count_ones() + self.band2.count_ones()
    }
}

/// A configuration that has been through the step-size resolver.
///
/// The derived fields can only be produced by
/// [`StepTable::resolve`][crate::StepTable::resolve]. Any run-scoped change
/// (a new transmit frequency per calibration tone, the shortened capture
/// length used when combining) is made on a copy.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedConfig {
    config: Config,
    sweep_time: u64,
    num_bands: u32,
    maxsamp: u64,
    skip: u64,
}

impl ResolvedConfig {
    pub(crate) fn new(
        config: Config,
        sweep_time: u64,
        num_bands: u32,
        maxsamp: u64,
        skip: u64,
    ) -> Self {
        Self {
            config,
            sweep_time,
            num_bands,
            maxsamp,
            skip,
        }
    }

    /// The raw configuration this was resolved from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Samples per single band sweep.
    pub fn sweep_time(&self) -> u64 {
        self.sweep_time
    }

    /// Number of VCO bands enabled.
    pub fn num_bands(&self) -> u32 {
        self.num_bands
    }

    /// Samples in one full sweep over every enabled band.
    pub fn period(&self) -> u64 {
        self.sweep_time * self.num_bands as u64
    }

    /// Capture length, a whole number of periods.
    pub fn maxsamp(&self) -> u64 {
        self.maxsamp
    }

    /// Samples discarded up front, a whole number of periods.
    pub fn skip(&self) -> u64 {
        self.skip
    }

    pub(crate) fn with_txfreq(&self, txfreq: f64) -> Self {
        let mut out = self.clone();
        out.config.txfreq = txfreq;
        out
    }

    pub(crate) fn with_maxsamp(&self, maxsamp: u64) -> Self {
        let mut out = self.clone();
        out.maxsamp = maxsamp;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_bands_counts_both_bitmaps() {
        let mut cfg = Config {
            band1: 0,
            band2: 0,
            ..Config::default()
        };
        assert_eq!(cfg.num_bands(), 0);
        cfg.band1 = 0x30;
        assert_eq!(cfg.num_bands(), 2);
        cfg.band2 = 0x1f;
        assert_eq!(cfg.num_bands(), 7);
        cfg.band1 = u32::MAX;
        cfg.band2 = u32::MAX;
        assert_eq!(cfg.num_bands(), 64);
    }

    #[test]
    fn run_scoped_copies_leave_original_alone() {
        let resolved = ResolvedConfig::new(Config::default(), 100, 2, 1200, 400);
        let tone = resolved.with_txfreq(915e6);
        let short = resolved.with_maxsamp(200);
        assert_eq!(tone.config().txfreq, 915e6);
        assert_eq!(short.maxsamp(), 200);
        assert_eq!(resolved.config().txfreq, Config::default().txfreq);
        assert_eq!(resolved.maxsamp(), 1200);
    }

    #[test]
    fn missing_addresses_take_defaults() {
        let text = r#"
            band1 = 48
            band2 = 0
            step = 2
            maxsamp = 10
            skip = 0
            in_n = 1
            mode = 3
            rf_div = 2
            rgain = 20.0
            tgain = 10.0
            samp = 20e6
            txfreq = 2.4e9
            txsamp = 1e6
        "#;
        let cfg: Config = toml::from_str(text).unwrap();
        assert_eq!(cfg.source_addr, DEFAULT_SOURCE_ADDR);
        assert_eq!(cfg.paired_addr, DEFAULT_PAIRED_ADDR);
        assert!(cfg.filename.is_empty());
    }
}
