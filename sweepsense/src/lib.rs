/*!

Host-side orchestration for the SweepSense sweeping receiver.

SweepSense is a modified daughterboard and FPGA image for USRP radios that
sweeps its VCO across a set of bands instead of sitting at a fixed frequency.
This crate configures those sweeps, sequences captures, and builds the
calibration data used to undo the sweep's frequency response. It doesn't
process samples itself: the signal chains are handed, as [`Flowgraph`]s, to an
external [`StreamingRuntime`], and the hardware is reached through a
[`DeviceDriver`].

The flow for any run is:

1. Fill in a [`Config`], or [`load`][store::load] a saved one.
2. Resolve it against the [`StepTable`] to get a [`ResolvedConfig`]. This
   derives the sweep period and rounds the capture and skip lengths to whole
   periods.
3. Either [`capture`] once in one of the [`Mode`]s, or run a
   [`Calibration`] pass, which captures one tone per frequency and then
   [`combine`]s them.

Here's a dry run of a standalone capture against the built-in simulator:

```no_run
use sweepsense::{Config, StepTable, capture, sim::{SimDriver, SimRuntime}};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let steps = StepTable::from_path("script_files/step_sizes.csv")?;
    let cfg = Config {
        band1: 0x30,
        step: 1,
        mode: 30,
        filename: vec!["/mnt/ramdisk/sweep.dat".into()],
        ..Config::default()
    };
    let resolved = steps.resolve(&cfg)?;

    let mut driver = SimDriver::new("CBX-120");
    let mut runtime = SimRuntime::new();
    let report = capture(&resolved, &mut driver, &mut runtime).await?;
    println!("Captured {:?} in {:?}", report.outputs, report.elapsed);
    Ok(())
}
```

*/

#![warn(missing_docs)]

pub mod calibrate;
mod capture;
pub mod combine;
mod config;
pub mod device;
mod error;
pub mod flowgraph;
pub mod manifest;
mod mode;
pub mod registers;
pub mod runtime;
pub mod sim;
mod steps;
pub mod store;

pub use crate::calibrate::{Calibration, CalibrationMode, CalibrationReport};
pub use crate::capture::{CaptureReport, capture};
pub use crate::combine::{CombineReport, combine};
pub use crate::config::{Config, DEFAULT_PAIRED_ADDR, DEFAULT_SOURCE_ADDR, ResolvedConfig};
pub use crate::device::{DeviceDriver, Radio};
pub use crate::error::Error;
pub use crate::flowgraph::Flowgraph;
pub use crate::mode::Mode;
pub use crate::runtime::{RunReport, StreamingRuntime};
pub use crate::steps::{StepTable, round_up_to_period};
