/*!
The streaming runtime collaborator.

A [`StreamingRuntime`] takes a [`Flowgraph`], instantiates and connects the
blocks it names, starts streaming, and reports back once every block has
finished. Runs never overlap: [`run_to_completion`] doesn't return until the
runtime has stopped.

When a run ends, the runtime reports which file sinks it has closed and
synced to disk. That acknowledgment is what makes it safe to rename or remove
those files afterwards; a sink missing from the report is treated as a
runtime failure.
*/

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use tracing::{debug, info};

use crate::{Error, Flowgraph};

/// Lifecycle of a single run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// The topology is described and validated.
    Built,
    /// The runtime has accepted the topology and is streaming.
    Started,
    /// Waiting for sample limiters to be satisfied.
    Draining,
    /// The runtime reported completion.
    Stopped,
}

/// What the runtime reports when a run finishes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    /// File sinks that were closed and synced to disk.
    pub flushed: Vec<PathBuf>,
}

/// An external block-graph runtime.
#[allow(async_fn_in_trait)]
pub trait StreamingRuntime {
    /// Build, connect, and start a topology. Returns once streaming has begun.
    async fn start(&mut self, graph: &Flowgraph) -> Result<(), Error>;

    /// Wait for the running topology to finish.
    async fn wait(&mut self) -> Result<RunReport, Error>;
}

/// Run one topology through `Built → Started → Draining → Stopped`.
///
/// Returns the runtime's report and the wall-clock time spent between start
/// and stop.
pub async fn run_to_completion<S: StreamingRuntime>(
    runtime: &mut S,
    graph: &Flowgraph,
) -> Result<(RunReport, Duration), Error> {
    graph.validate()?;
    let mut state = RunState::Built;
    debug!("run state: {state:?}, {} blocks", graph.blocks().len());

    let start = Instant::now();
    runtime.start(graph).await?;
    state = RunState::Started;
    debug!("run state: {state:?}");

    state = RunState::Draining;
    debug!("run state: {state:?}");
    let report = runtime.wait().await?;
    let elapsed = start.elapsed();
    state = RunState::Stopped;
    debug!("run state: {state:?}");

    for sink in graph.file_sinks() {
        if !report.flushed.iter().any(|p| p == sink) {
            return Err(Error::ExternalRuntime(format!(
                "runtime stopped without acknowledging flush of {}",
                sink.display()
            )));
        }
    }

    info!("Run complete in {:.3} s", elapsed.as_secs_f64());
    Ok((report, elapsed))
}
