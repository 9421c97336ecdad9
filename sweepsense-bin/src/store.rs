use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::{Context, eyre};
use sweepsense::store;

use crate::config::ConfigArgs;

/// Save a configuration to its `--self-name` path.
#[derive(Args, Debug)]
pub struct SaveCmd {
    #[command(flatten)]
    config: ConfigArgs,
}

impl SaveCmd {
    pub fn cmd(self) -> color_eyre::Result<()> {
        let cfg = self.config.build()?;
        if cfg.self_name.is_empty() {
            return Err(eyre!("Set --self-name to say where the configuration goes"));
        }
        let path = store::save(&cfg).wrap_err("Failed saving configuration")?;
        println!("Saved {}", path.display());
        Ok(())
    }
}

/// Print one or more saved configurations, e.g. a calibration setup next to
/// the sweep setup it pairs with.
#[derive(Args, Debug)]
pub struct ShowCmd {
    /// Saved configuration files.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

impl ShowCmd {
    pub fn cmd(self) -> color_eyre::Result<()> {
        // Load everything first so a bad file prints nothing.
        let configs = self
            .paths
            .iter()
            .map(|path| {
                store::load(path).wrap_err_with(|| format!("Failed loading {}", path.display()))
            })
            .collect::<color_eyre::Result<Vec<_>>>()?;
        for (path, cfg) in self.paths.iter().zip(&configs) {
            if self.paths.len() > 1 {
                println!("{}:", path.display());
            }
            println!("{}", serde_json::to_string_pretty(cfg)?);
        }
        Ok(())
    }
}
