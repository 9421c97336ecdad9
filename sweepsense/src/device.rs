/*!
The device driver collaborator.

A [`DeviceDriver`] opens a [`Radio`] for a [`DeviceRequest`]. Every tuning or
register call is expressed as a [`DeviceCommand`] and handed to
[`Radio::apply`]; the typed helper methods on [`Radio`] just build the
command. The one read the orchestration needs is the daughterboard name, used
to pick a register map.

Only one radio handle is open at a time. The capture code opens it, programs
it, runs the topology, and drops it before the next capture starts.
*/

use serde::{Deserialize, Serialize};

use crate::Error;

/// Which side of the device a command applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The receive source.
    Rx,
    /// The transmit sink.
    Tx,
}

/// Auxiliary DAC on the daughterboard interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum AuxDac {
    A,
    B,
    C,
    D,
}

/// What to open: device arguments, the number of receive channels, and
/// whether a transmit sink on the same devices is needed too.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRequest {
    /// Device address arguments, e.g. `addr0=192.168.10.3`.
    pub args: String,
    /// Number of channels to stream.
    pub channels: usize,
    /// Whether a transmit sink is also opened.
    pub transmit: bool,
}

/// A single configuration call on an open device.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum DeviceCommand {
    WriteAuxDac {
        unit: Direction,
        dac: AuxDac,
        volts: f64,
    },
    SetUserRegister {
        addr: u8,
        value: u32,
        mboard: usize,
    },
    SetGain {
        dir: Direction,
        db: f64,
        chan: usize,
    },
    SetAntenna {
        dir: Direction,
        name: String,
        chan: usize,
    },
    SetBandwidth {
        dir: Direction,
        hz: f64,
        chan: usize,
    },
    SetSampleRate {
        dir: Direction,
        hz: f64,
    },
    SetCenterFreq {
        dir: Direction,
        hz: f64,
        chan: usize,
    },
    SetClockSource {
        dir: Direction,
        source: String,
        mboard: usize,
    },
    SetTimeSource {
        dir: Direction,
        source: String,
        mboard: usize,
    },
    /// Set device time on all motherboards, in seconds since the Unix epoch.
    SetTimeNow { seconds: f64 },
}

/// An open device.
#[allow(async_fn_in_trait)]
pub trait Radio {
    /// Apply one configuration call.
    async fn apply(&mut self, cmd: DeviceCommand) -> Result<(), Error>;

    /// Read the name of the receive daughterboard on a channel.
    async fn rx_subdev_name(&mut self, chan: usize) -> Result<String, Error>;

    /// Write a voltage to an auxiliary DAC.
    async fn write_aux_dac(&mut self, unit: Direction, dac: AuxDac, volts: f64) -> Result<(), Error> {
        self.apply(DeviceCommand::WriteAuxDac { unit, dac, volts })
            .await
    }

    /// Write an FPGA user register.
    async fn set_user_register(&mut self, addr: u8, value: u32, mboard: usize) -> Result<(), Error> {
        self.apply(DeviceCommand::SetUserRegister {
            addr,
            value,
            mboard,
        })
        .await
    }

    /// Set the gain of one channel, in dB.
    async fn set_gain(&mut self, dir: Direction, db: f64, chan: usize) -> Result<(), Error> {
        self.apply(DeviceCommand::SetGain { dir, db, chan }).await
    }

    /// Select the antenna port of one channel.
    async fn set_antenna(&mut self, dir: Direction, name: &str, chan: usize) -> Result<(), Error> {
        self.apply(DeviceCommand::SetAntenna {
            dir,
            name: name.to_owned(),
            chan,
        })
        .await
    }

    /// Set the analog bandwidth of one channel, in Hz.
    async fn set_bandwidth(&mut self, dir: Direction, hz: f64, chan: usize) -> Result<(), Error> {
        self.apply(DeviceCommand::SetBandwidth { dir, hz, chan })
            .await
    }

    /// Set the sample rate of every channel, in Hz.
    async fn set_samp_rate(&mut self, dir: Direction, hz: f64) -> Result<(), Error> {
        self.apply(DeviceCommand::SetSampleRate { dir, hz }).await
    }

    /// Tune one channel, in Hz.
    async fn set_center_freq(&mut self, dir: Direction, hz: f64, chan: usize) -> Result<(), Error> {
        self.apply(DeviceCommand::SetCenterFreq { dir, hz, chan })
            .await
    }

    /// Select the reference clock of one motherboard.
    async fn set_clock_source(&mut self, dir: Direction, source: &str, mboard: usize) -> Result<(), Error> {
        self.apply(DeviceCommand::SetClockSource {
            dir,
            source: source.to_owned(),
            mboard,
        })
        .await
    }

    /// Select the time reference of one motherboard.
    async fn set_time_source(&mut self, dir: Direction, source: &str, mboard: usize) -> Result<(), Error> {
        self.apply(DeviceCommand::SetTimeSource {
            dir,
            source: source.to_owned(),
            mboard,
        })
        .await
    }

    /// Set device time on every motherboard.
    async fn set_time_now(&mut self, seconds: f64) -> Result<(), Error> {
        self.apply(DeviceCommand::SetTimeNow { seconds }).await
    }
}

/// Opens devices.
#[allow(async_fn_in_trait)]
pub trait DeviceDriver {
    /// The handle type for an open device.
    type Radio: Radio;

    /// Open the devices named by a request.
    async fn open(&mut self, request: &DeviceRequest) -> Result<Self::Radio, Error>;
}
