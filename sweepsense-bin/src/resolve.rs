use clap::Args;
use serde::Serialize;

use crate::config::ConfigArgs;

/// Resolve a configuration against the step table and print the derived
/// sweep parameters.
#[derive(Args, Debug)]
pub struct Cmd {
    #[command(flatten)]
    config: ConfigArgs,

    /// Print as JSON instead of plain text.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Summary {
    mode: i32,
    step: u32,
    num_bands: u32,
    sweep_time: u64,
    period: u64,
    maxsamp: u64,
    skip: u64,
}

impl Cmd {
    pub fn cmd(self) -> color_eyre::Result<()> {
        let cfg = self.config.resolve()?;
        let summary = Summary {
            mode: cfg.config().mode,
            step: cfg.config().step,
            num_bands: cfg.num_bands(),
            sweep_time: cfg.sweep_time(),
            period: cfg.period(),
            maxsamp: cfg.maxsamp(),
            skip: cfg.skip(),
        };
        if self.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            println!("Mode: {}", summary.mode);
            println!("Step: {}", summary.step);
            println!("Bands: {}", summary.num_bands);
            println!("Sweep time: {} samples", summary.sweep_time);
            println!("Period: {} samples", summary.period);
            println!("Max samples: {}", summary.maxsamp);
            println!("Skip: {}", summary.skip);
        }
        Ok(())
    }
}
