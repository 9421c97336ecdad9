mod backend;
mod bridge;
mod calibrate;
mod capture;
mod combine;
mod config;
mod resolve;
mod store;

use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use crate::backend::BackendArgs;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    #[command(flatten)]
    backend: BackendArgs,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Resolve(resolve::Cmd),
    Save(store::SaveCmd),
    Show(store::ShowCmd),
    Capture(capture::Cmd),
    Calibrate(calibrate::Cmd),
    Combine(combine::Cmd),
}

/// Default log level picked by `-v`/`-q`. `-qqq` silences everything.
fn default_level(verbose: &Verbosity<InfoLevel>) -> LevelFilter {
    let Some(level) = verbose.log_level() else {
        return LevelFilter::OFF;
    };
    match level {
        log::Level::Error => LevelFilter::ERROR,
        log::Level::Warn => LevelFilter::WARN,
        log::Level::Info => LevelFilter::INFO,
        log::Level::Debug => LevelFilter::DEBUG,
        log::Level::Trace => LevelFilter::TRACE,
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    // RUST_LOG wins over -v/-q when it's set.
    let filter = EnvFilter::builder()
        .with_default_directive(default_level(&args.verbose).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match args.command {
        Commands::Resolve(c) => c.cmd(),
        Commands::Save(c) => c.cmd(),
        Commands::Show(c) => c.cmd(),
        Commands::Capture(c) => c.cmd(&args.backend).await,
        Commands::Calibrate(c) => c.cmd(&args.backend).await,
        Commands::Combine(c) => c.cmd(&args.backend).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_moves_the_default_level() {
        let level = |v, q| default_level(&Verbosity::<InfoLevel>::new(v, q));
        assert_eq!(level(0, 0), LevelFilter::INFO);
        assert_eq!(level(1, 0), LevelFilter::DEBUG);
        assert_eq!(level(2, 0), LevelFilter::TRACE);
        assert_eq!(level(0, 1), LevelFilter::WARN);
        assert_eq!(level(0, 3), LevelFilter::OFF);
    }

    #[test]
    fn cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
