/*!
One-time hardware initialization for a SweepSense daughterboard.

Every opened device gets the same treatment before streaming, whatever the
mode:

1. Aux DAC A on the TX unit is driven to [`AUX_DAC_BIAS_VOLTS`].
2. The receive daughterboard name is read back and mapped to a
   [`Daughterboard`]. Anything other than an SBX or CBX is fatal.
3. The sweep registers are written in a fixed order. Later registers depend on
   state latched by earlier ones, so [`SweepRegisters::writes`] must be
   applied in sequence.
*/

use tracing::{debug, info};

use crate::{
    Config, Error,
    device::{AuxDac, Direction, Radio},
};

/// Bias applied to aux DAC A on every open.
pub const AUX_DAC_BIAS_VOLTS: f64 = 0.2;

/// Band bitmaps an SBX always uses, bands 5 and 6 (the 2.4 GHz region).
pub const SBX_BANDS: (u32, u32) = (0x30, 0);

/// Clock divider value.
pub const CLOCK_DIV: u32 = 4;

/// Ramp start code, 12 bits.
pub const RAMP_START: u32 = 621;

/// Ramp end code, 12 bits.
pub const RAMP_END: u32 = 3103;

const TWELVE_BITS: u32 = 0xfff;

/// FPGA user register addresses.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserRegister {
    /// Bitmap of the first 32 VCO bands.
    BandLow = 1,
    /// Bitmap of the remaining VCO bands.
    BandHigh = 2,
    /// Chirp enable.
    ChirpEnable = 3,
    /// Jump value (voltage step), 12 bits.
    Jump = 4,
    /// Clock divider.
    ClockDiv = 5,
    /// VCO RF output divider.
    RfDiv = 6,
    /// Ramp start, 12 bits.
    RampStart = 7,
    /// Ramp end, 12 bits.
    RampEnd = 8,
}

/// The supported daughterboards, each with its own band register map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Daughterboard {
    /// SBX: bands are fixed to [`SBX_BANDS`].
    Sbx,
    /// CBX: bands come from the configuration.
    Cbx,
}

impl Daughterboard {
    /// Identify the board from the receive subdevice name.
    pub fn detect(name: &str) -> Result<Self, Error> {
        if name.contains("SBX") {
            Ok(Self::Sbx)
        } else if name.contains("CBX") {
            Ok(Self::Cbx)
        } else {
            Err(Error::UnknownHardware(name.to_owned()))
        }
    }

    /// Low and high band bitmaps to program for this board.
    pub fn bands(self, config: &Config) -> (u32, u32) {
        match self {
            Self::Sbx => SBX_BANDS,
            Self::Cbx => (config.band1, config.band2),
        }
    }
}

impl std::fmt::Display for Daughterboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sbx => f.write_str("SBX"),
            Self::Cbx => f.write_str("CBX"),
        }
    }
}

/// Values for the sweep configuration registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SweepRegisters {
    /// Low band bitmap.
    pub band_low: u32,
    /// High band bitmap.
    pub band_high: u32,
    /// VCO RF output divider.
    pub rf_div: u32,
    /// Jump value, from the step size code.
    pub jump: u32,
}

impl SweepRegisters {
    /// Work out the register values for a board and configuration.
    pub fn new(board: Daughterboard, config: &Config) -> Result<Self, Error> {
        if config.step > TWELVE_BITS {
            return Err(Error::config(format!(
                "Step size {} doesn't fit the 12-bit jump register",
                config.step
            )));
        }
        let (band_low, band_high) = board.bands(config);
        Ok(Self {
            band_low,
            band_high,
            rf_div: config.rf_div,
            jump: config.step,
        })
    }

    /// Register writes, in the order they must be applied.
    pub fn writes(&self) -> [(UserRegister, u32); 8] {
        [
            (UserRegister::ChirpEnable, 1),
            (UserRegister::BandLow, self.band_low),
            (UserRegister::BandHigh, self.band_high),
            (UserRegister::RfDiv, self.rf_div),
            (UserRegister::ClockDiv, CLOCK_DIV),
            (UserRegister::Jump, self.jump),
            (UserRegister::RampStart, RAMP_START),
            (UserRegister::RampEnd, RAMP_END),
        ]
    }
}

/// Run the one-time initialization on a freshly opened device.
pub async fn initialize<R: Radio>(radio: &mut R, config: &Config) -> Result<Daughterboard, Error> {
    radio
        .write_aux_dac(Direction::Tx, AuxDac::A, AUX_DAC_BIAS_VOLTS)
        .await?;

    let name = radio.rx_subdev_name(0).await?;
    info!("NAME: {name}");
    let board = Daughterboard::detect(&name)?;
    info!("Detected {board} DB...");

    let regs = SweepRegisters::new(board, config)?;
    for (reg, value) in regs.writes() {
        debug!("user register {reg:?} ({}) <- {value}", reg as u8);
        radio.set_user_register(reg as u8, value, 0).await?;
    }
    Ok(board)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection() {
        assert_eq!(Daughterboard::detect("SBX-120 RX").unwrap(), Daughterboard::Sbx);
        assert_eq!(Daughterboard::detect("CBX-40").unwrap(), Daughterboard::Cbx);
        assert!(matches!(
            Daughterboard::detect("WBX v3"),
            Err(Error::UnknownHardware(_))
        ));
        assert!(matches!(
            Daughterboard::detect(""),
            Err(Error::UnknownHardware(_))
        ));
    }

    #[test]
    fn write_order() {
        let cfg = Config {
            band1: 0xff,
            band2: 0x3,
            rf_div: 2,
            step: 12,
            ..Config::default()
        };
        let regs = SweepRegisters::new(Daughterboard::Cbx, &cfg).unwrap();
        let addrs: Vec<u8> = regs.writes().iter().map(|(r, _)| *r as u8).collect();
        assert_eq!(addrs, [3, 1, 2, 6, 5, 4, 7, 8]);
        let values: Vec<u32> = regs.writes().iter().map(|(_, v)| *v).collect();
        assert_eq!(values, [1, 0xff, 0x3, 2, 4, 12, 621, 3103]);
    }

    #[test]
    fn sbx_ignores_configured_bands() {
        let cfg = Config {
            band1: 0xffff,
            band2: 0x1,
            ..Config::default()
        };
        let regs = SweepRegisters::new(Daughterboard::Sbx, &cfg).unwrap();
        assert_eq!((regs.band_low, regs.band_high), SBX_BANDS);
    }

    #[test]
    fn oversized_step_rejected() {
        let cfg = Config {
            step: 0x1000,
            ..Config::default()
        };
        assert!(matches!(
            SweepRegisters::new(Daughterboard::Cbx, &cfg),
            Err(Error::Configuration(_))
        ));
    }
}
