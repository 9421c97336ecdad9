use std::path::PathBuf;

use crate::{Config, Error, device::DeviceRequest};

/// An operating mode: which devices are opened and how their streams are
/// wired to files.
///
/// Each variant is its own topology and carries the files it needs, decoded
/// from the positional `filename` list of a [`Config`].
///
/// | code | variant | filenames |
/// |---|---|---|
/// | 0 | [`Idle`][Mode::Idle] | none |
/// | 1 | [`PairedCompensated`][Mode::PairedCompensated] | normal rx, sweepsense rx, calibration |
/// | 10 | [`PairedUncompensated`][Mode::PairedUncompensated] | normal rx, sweepsense rx |
/// | 2 | [`ToneCapture`][Mode::ToneCapture] | save path |
/// | 3 | [`Standalone`][Mode::Standalone] | sweepsense rx, calibration |
/// | 30 | [`StandaloneUncompensated`][Mode::StandaloneUncompensated] | sweepsense rx |
///
/// With an empty filename list, codes 3 and 30 fall back to
/// [`Idle`][Mode::Idle] and codes 1, 2 and 10 to
/// [`PairedDiscard`][Mode::PairedDiscard]: the devices stream into null sinks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Single device, samples discarded.
    Idle,
    /// MIMO pair, both channels discarded.
    PairedDiscard {
        /// The code this was decoded from (1, 2 or 10).
        code: i32,
    },
    /// MIMO pair: synchronized capture of the normal receiver and the
    /// sweeper, with the sweeper compensated against a calibration file.
    PairedCompensated {
        /// Output of the off-the-shelf receiver.
        normal_rx: PathBuf,
        /// Output of the SweepSense receiver.
        sweepsense_rx: PathBuf,
        /// Calibration tone samples, repeated.
        calibration: PathBuf,
    },
    /// Same as `PairedCompensated`, without compensation.
    PairedUncompensated {
        /// Output of the off-the-shelf receiver.
        normal_rx: PathBuf,
        /// Output of the SweepSense receiver.
        sweepsense_rx: PathBuf,
    },
    /// MIMO pair with transmit: the second device sends a calibration tone
    /// that the sweeper records.
    ToneCapture {
        /// Where the received tone is stored.
        save_path: PathBuf,
    },
    /// Single SweepSense receiver with compensation, DC removal and sweep
    /// sub-sampling.
    Standalone {
        /// Output of the SweepSense receiver.
        sweepsense_rx: PathBuf,
        /// Calibration tone samples, repeated.
        calibration: PathBuf,
    },
    /// Same as `Standalone`, without compensation.
    StandaloneUncompensated {
        /// Output of the SweepSense receiver.
        sweepsense_rx: PathBuf,
    },
}

fn need(code: i32, files: &[String], n: usize) -> Result<(), Error> {
    if files.len() < n {
        Err(Error::config(format!(
            "Mode {code} needs {n} filenames, but {} were given",
            files.len()
        )))
    } else {
        Ok(())
    }
}

impl Mode {
    /// Decode a mode code and its filename list.
    ///
    /// Unknown codes fail with [`Error::UnsupportedMode`].
    pub fn decode(code: i32, files: &[String]) -> Result<Self, Error> {
        if !matches!(code, 0 | 1 | 2 | 3 | 10 | 30) {
            return Err(Error::UnsupportedMode(code));
        }
        if files.is_empty() {
            return Ok(match code {
                1 | 2 | 10 => Self::PairedDiscard { code },
                _ => Self::Idle,
            });
        }
        let path = |i: usize| PathBuf::from(&files[i]);
        Ok(match code {
            0 => Self::Idle,
            1 => {
                need(code, files, 3)?;
                Self::PairedCompensated {
                    normal_rx: path(0),
                    sweepsense_rx: path(1),
                    calibration: path(2),
                }
            }
            10 => {
                need(code, files, 2)?;
                Self::PairedUncompensated {
                    normal_rx: path(0),
                    sweepsense_rx: path(1),
                }
            }
            2 => Self::ToneCapture { save_path: path(0) },
            3 => {
                need(code, files, 2)?;
                Self::Standalone {
                    sweepsense_rx: path(0),
                    calibration: path(1),
                }
            }
            30 => Self::StandaloneUncompensated {
                sweepsense_rx: path(0),
            },
            _ => unreachable!("mode codes were checked above"),
        })
    }

    /// The mode code this variant corresponds to.
    pub fn code(&self) -> i32 {
        match self {
            Self::Idle => 0,
            Self::PairedDiscard { code } => *code,
            Self::PairedCompensated { .. } => 1,
            Self::PairedUncompensated { .. } => 10,
            Self::ToneCapture { .. } => 2,
            Self::Standalone { .. } => 3,
            Self::StandaloneUncompensated { .. } => 30,
        }
    }

    /// Whether this mode uses the MIMO-cabled pair.
    pub fn is_paired(&self) -> bool {
        matches!(
            self,
            Self::PairedDiscard { .. }
                | Self::PairedCompensated { .. }
                | Self::PairedUncompensated { .. }
                | Self::ToneCapture { .. }
        )
    }

    /// The devices this mode needs opened.
    pub fn device_request(&self, config: &Config) -> DeviceRequest {
        if self.is_paired() {
            DeviceRequest {
                args: config.paired_addr.clone(),
                channels: 2,
                transmit: matches!(self, Self::ToneCapture { .. }),
            }
        } else {
            DeviceRequest {
                args: config.source_addr.clone(),
                channels: 1,
                transmit: false,
            }
        }
    }

    /// Files the mode writes.
    pub fn outputs(&self) -> Vec<PathBuf> {
        match self {
            Self::Idle | Self::PairedDiscard { .. } => Vec::new(),
            Self::PairedCompensated {
                normal_rx,
                sweepsense_rx,
                ..
            }
            | Self::PairedUncompensated {
                normal_rx,
                sweepsense_rx,
            } => vec![normal_rx.clone(), sweepsense_rx.clone()],
            Self::ToneCapture { save_path } => vec![save_path.clone()],
            Self::Standalone { sweepsense_rx, .. }
            | Self::StandaloneUncompensated { sweepsense_rx } => vec![sweepsense_rx.clone()],
        }
    }
}
