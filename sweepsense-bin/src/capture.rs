use clap::Args;
use color_eyre::eyre::Context;

use crate::{backend::BackendArgs, config::ConfigArgs};

/// Run one capture in the configured mode.
#[derive(Args, Debug)]
pub struct Cmd {
    #[command(flatten)]
    config: ConfigArgs,
}

impl Cmd {
    pub async fn cmd(self, backend: &BackendArgs) -> color_eyre::Result<()> {
        let cfg = self.config.resolve()?;
        let (mut driver, mut runtime) = backend.open();
        let report = sweepsense::capture(&cfg, &mut driver, &mut runtime)
            .await
            .wrap_err_with(|| format!("Mode {} capture failed", cfg.config().mode))?;

        println!(
            "Mode {} capture finished in {:.3} s",
            report.mode.code(),
            report.elapsed.as_secs_f64()
        );
        for path in report.outputs {
            println!("  {}", path.display());
        }
        Ok(())
    }
}
