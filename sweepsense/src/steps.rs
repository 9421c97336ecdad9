use std::{io::Read, path::Path};

use serde::Deserialize;
use tracing::info;

use crate::{Config, Error, ResolvedConfig};

#[derive(Deserialize)]
struct StepRow {
    samp_sep: u64,
}

/// Sweep duration, in samples, for each voltage step size.
///
/// The table is 1-indexed by step. An entry of 0 means the sweep time for that
/// step was never characterised, and resolving a configuration with that step
/// fails.
///
/// The usual source is a CSV file with a `samp_sep` column; any other columns
/// are ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepTable {
    samp_sep: Vec<u64>,
}

impl StepTable {
    /// Build a table directly from the per-step sweep times. `samp_sep[0]` is
    /// step 1.
    pub fn new(samp_sep: Vec<u64>) -> Self {
        Self { samp_sep }
    }

    /// Read a step table from CSV.
    pub fn from_reader<R: Read>(rdr: R) -> Result<Self, Error> {
        let mut rdr = csv::Reader::from_reader(rdr);
        let samp_sep = rdr
            .deserialize::<StepRow>()
            .map(|row| row.map(|r| r.samp_sep))
            .collect::<Result<Vec<u64>, csv::Error>>()
            .map_err(|e| Error::config(format!("Step table is malformed: {e}")))?;
        Ok(Self { samp_sep })
    }

    /// Read a step table from a CSV file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    /// Number of step sizes in the table.
    pub fn len(&self) -> usize {
        self.samp_sep.len()
    }

    /// Returns true if the table has no steps at all.
    pub fn is_empty(&self) -> bool {
        self.samp_sep.is_empty()
    }

    /// Look up the sweep time for a step size.
    pub fn sweep_time(&self, step: u32) -> Result<u64, Error> {
        let entry = (step as usize)
            .checked_sub(1)
            .and_then(|i| self.samp_sep.get(i))
            .copied();
        match entry {
            Some(t) if t > 0 => Ok(t),
            _ => Err(Error::config(format!(
                "Sweep time data for step size {step} not available"
            ))),
        }
    }

    /// Resolve a configuration: derive the sweep time and band count, and
    /// round the capture and skip lengths up to whole sweep periods.
    ///
    /// This is a pure function of the raw configuration; resolving the same
    /// `Config` twice gives the same result.
    pub fn resolve(&self, config: &Config) -> Result<ResolvedConfig, Error> {
        let sweep_time = self.sweep_time(config.step)?;
        let num_bands = config.num_bands();
        if num_bands == 0 {
            return Err(Error::config("No VCO bands selected in band1 or band2"));
        }
        let period = sweep_time
            .checked_mul(num_bands as u64)
            .ok_or_else(|| Error::config("Sweep period does not fit in 64 bits"))?;
        let maxsamp = round_up_to_period(config.maxsamp, period)?;
        let skip = round_up_to_period(config.skip, period)?;
        // Keep-M-in-N and the calibration tone both scale by in_n.
        let in_n = config.in_n.max(1);
        period
            .checked_mul(in_n)
            .and_then(|_| in_n.checked_mul(maxsamp))
            .and_then(|n| n.checked_add(skip))
            .ok_or_else(|| {
                Error::config(format!(
                    "in_n = {} is too large for {maxsamp} samples per capture",
                    config.in_n
                ))
            })?;

        info!(
            "Num Bands: {num_bands} ({}, {})",
            config.band1, config.band2
        );
        info!(
            "Step Size: {}, Sweep Time: {sweep_time}, maxsamp: {maxsamp}",
            config.step
        );
        info!("Skip samples: {skip}");

        Ok(ResolvedConfig::new(
            config.clone(),
            sweep_time,
            num_bands,
            maxsamp,
            skip,
        ))
    }
}

/// Round `value` up to the next whole multiple of `period`.
///
/// This always adds at least one period: a value that is already an exact
/// multiple still grows by a full period, so a partial sweep is never
/// truncated.
///
/// Fails on a zero period, or when the result does not fit in a `u64`.
pub fn round_up_to_period(value: u64, period: u64) -> Result<u64, Error> {
    if period == 0 {
        return Err(Error::config("Sweep period must be non-zero"));
    }
    (value / period + 1).checked_mul(period).ok_or_else(|| {
        Error::config(format!(
            "{value} samples cannot be rounded up to a whole period of {period}"
        ))
    })
}
