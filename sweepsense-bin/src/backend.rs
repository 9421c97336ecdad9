use std::path::PathBuf;

use clap::{Args, ValueEnum};
use sweepsense::{
    DeviceDriver, Error, Flowgraph, Radio, RunReport, StreamingRuntime,
    device::{DeviceCommand, DeviceRequest},
    sim::{SimDriver, SimRadio, SimRuntime},
};

use crate::bridge::{BridgeDriver, BridgeRadio, BridgeRuntime, bridge};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Drive real hardware through the bridge program.
    Bridge,
    /// Dry run: accept every command and write zero-valued sample files.
    Sim,
}

#[derive(Args, Debug)]
pub struct BackendArgs {
    /// Where devices are opened and flowgraphs are run.
    #[arg(long, value_enum, default_value_t = BackendKind::Bridge, global = true)]
    backend: BackendKind,

    /// Bridge program wrapping the radio driver and the streaming runtime.
    #[arg(long, default_value = "sweepsense-bridge", global = true)]
    bridge: PathBuf,

    /// Daughterboard name the simulator reports.
    #[arg(long, default_value = "CBX", global = true)]
    sim_board: String,
}

impl BackendArgs {
    pub fn open(&self) -> (Driver, Runtime) {
        match self.backend {
            BackendKind::Bridge => {
                let (d, r) = bridge(&self.bridge);
                (Driver::Bridge(d), Runtime::Bridge(r))
            }
            BackendKind::Sim => (
                Driver::Sim(SimDriver::new(self.sim_board.clone())),
                Runtime::Sim(SimRuntime::new()),
            ),
        }
    }
}

pub enum Driver {
    Bridge(BridgeDriver),
    Sim(SimDriver),
}

pub enum AnyRadio {
    Bridge(BridgeRadio),
    Sim(SimRadio),
}

pub enum Runtime {
    Bridge(BridgeRuntime),
    Sim(SimRuntime),
}

impl DeviceDriver for Driver {
    type Radio = AnyRadio;

    async fn open(&mut self, request: &DeviceRequest) -> Result<AnyRadio, Error> {
        Ok(match self {
            Self::Bridge(d) => AnyRadio::Bridge(d.open(request).await?),
            Self::Sim(d) => AnyRadio::Sim(d.open(request).await?),
        })
    }
}

impl Radio for AnyRadio {
    async fn apply(&mut self, cmd: DeviceCommand) -> Result<(), Error> {
        match self {
            Self::Bridge(r) => r.apply(cmd).await,
            Self::Sim(r) => r.apply(cmd).await,
        }
    }

    async fn rx_subdev_name(&mut self, chan: usize) -> Result<String, Error> {
        match self {
            Self::Bridge(r) => r.rx_subdev_name(chan).await,
            Self::Sim(r) => r.rx_subdev_name(chan).await,
        }
    }
}

impl StreamingRuntime for Runtime {
    async fn start(&mut self, graph: &Flowgraph) -> Result<(), Error> {
        match self {
            Self::Bridge(r) => r.start(graph).await,
            Self::Sim(r) => r.start(graph).await,
        }
    }

    async fn wait(&mut self) -> Result<RunReport, Error> {
        match self {
            Self::Bridge(r) => r.wait().await,
            Self::Sim(r) => r.wait().await,
        }
    }
}
