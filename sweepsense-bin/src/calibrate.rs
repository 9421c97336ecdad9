use std::{io::Write, path::Path};

use clap::Args;
use color_eyre::eyre::Context;
use sweepsense::{Calibration, Error};

use crate::{backend::BackendArgs, config::ConfigArgs};

/// Capture a calibration tone at every frequency in a list, then combine the
/// captures into one calibration file.
///
/// The file list is `<frequency list> <save path prefix>`. Mode 1 uses the
/// radio's own TX-to-RX leakage; mode 2 waits for Enter before each tone so
/// an external source can be retuned.
#[derive(Args, Debug)]
pub struct Cmd {
    #[command(flatten)]
    config: ConfigArgs,

    /// Don't wait for Enter before each external-tone capture.
    #[arg(long)]
    no_prompt: bool,
}

fn prompt(freq: u64, path: &Path) -> Result<(), Error> {
    print!(
        "Press Enter to start capture of tone at {freq} Hz into {}",
        path.display()
    );
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(())
}

impl Cmd {
    pub async fn cmd(self, backend: &BackendArgs) -> color_eyre::Result<()> {
        let cfg = self.config.resolve()?;
        let (mut driver, mut runtime) = backend.open();

        let mut calibration = Calibration::new(&cfg);
        if !self.no_prompt {
            calibration = calibration.with_confirmation(prompt);
        }
        let report = calibration
            .run(&mut driver, &mut runtime)
            .await
            .wrap_err("Calibration failed")?;

        println!(
            "Captured {} tones in {:.3} s, listed in {}",
            report.captures.len(),
            report.elapsed.as_secs_f64(),
            report.manifest.display()
        );
        println!("Combined calibration: {}", report.combined.output.display());
        Ok(())
    }
}
