use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::Context;

use crate::{backend::BackendArgs, config::ConfigArgs};

/// Combine the captures listed in an output manifest into one calibration
/// file.
#[derive(Args, Debug)]
pub struct Cmd {
    #[command(flatten)]
    config: ConfigArgs,

    /// Output manifest: one capture path per line.
    #[arg(long)]
    manifest: PathBuf,

    /// Where the combined calibration is written.
    #[arg(short, long)]
    output: PathBuf,
}

impl Cmd {
    pub async fn cmd(self, backend: &BackendArgs) -> color_eyre::Result<()> {
        let cfg = self.config.resolve()?;
        let (_, mut runtime) = backend.open();
        let report = sweepsense::combine(&cfg, &self.manifest, &self.output, &mut runtime)
            .await
            .wrap_err_with(|| format!("Failed combining {}", self.manifest.display()))?;
        println!(
            "Combined {} captures into {} in {:.3} s",
            report.inputs.len(),
            report.output.display(),
            report.elapsed.as_secs_f64()
        );
        Ok(())
    }
}
