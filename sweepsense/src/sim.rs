/*!
An in-process stand-in for the device driver and the streaming runtime.

[`SimDriver`] accepts every command and keeps a [`Journal`] of what was opened
and applied. [`SimRuntime`] records each topology it's given, checks that
every file source exists, and writes zero-valued complex samples to each file
sink: as many as the nearest upstream head allows, capped at
[`SimRuntime::max_samples`]. It then syncs the sinks and acknowledges them.

Useful for dry runs of a full calibration sequence without hardware, and for
tests.
*/

use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use num_complex::Complex;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{
    Error, Flowgraph,
    device::{DeviceCommand, DeviceDriver, DeviceRequest, Radio},
    flowgraph::BlockId,
    runtime::{RunReport, StreamingRuntime},
};

/// Everything a [`SimDriver`] has been asked to do.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Journal {
    /// Open requests, in order.
    pub opened: Vec<DeviceRequest>,
    /// Commands applied to any opened radio, in order.
    pub commands: Vec<DeviceCommand>,
}

/// A simulated device driver.
#[derive(Clone, Debug)]
pub struct SimDriver {
    subdev_name: String,
    journal: Arc<Mutex<Journal>>,
}

impl SimDriver {
    /// Create a driver whose devices report the given daughterboard name.
    pub fn new(subdev_name: impl Into<String>) -> Self {
        Self {
            subdev_name: subdev_name.into(),
            journal: Arc::default(),
        }
    }

    /// A snapshot of everything done so far.
    pub fn journal(&self) -> Journal {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A radio opened by [`SimDriver`].
#[derive(Debug)]
pub struct SimRadio {
    subdev_name: String,
    journal: Arc<Mutex<Journal>>,
}

impl Radio for SimRadio {
    async fn apply(&mut self, cmd: DeviceCommand) -> Result<(), Error> {
        debug!("sim device: {cmd:?}");
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .commands
            .push(cmd);
        Ok(())
    }

    async fn rx_subdev_name(&mut self, _chan: usize) -> Result<String, Error> {
        Ok(self.subdev_name.clone())
    }
}

impl DeviceDriver for SimDriver {
    type Radio = SimRadio;

    async fn open(&mut self, request: &DeviceRequest) -> Result<SimRadio, Error> {
        debug!("sim device: open {request:?}");
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .opened
            .push(request.clone());
        Ok(SimRadio {
            subdev_name: self.subdev_name.clone(),
            journal: self.journal.clone(),
        })
    }
}

/// A simulated streaming runtime.
#[derive(Clone, Debug)]
pub struct SimRuntime {
    /// Upper bound on samples written to any one sink.
    pub max_samples: u64,
    /// Fail the run with this index (0-based) instead of completing it.
    pub fail_run: Option<usize>,
    graphs: Vec<Flowgraph>,
    running: Option<Flowgraph>,
}

impl Default for SimRuntime {
    fn default() -> Self {
        Self {
            max_samples: 1 << 16,
            fail_run: None,
            graphs: Vec::new(),
            running: None,
        }
    }
}

impl SimRuntime {
    /// A runtime with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every topology started so far, in order.
    pub fn graphs(&self) -> &[Flowgraph] {
        &self.graphs
    }

    async fn write_sink(&self, graph: &Flowgraph, id: BlockId, path: &Path) -> Result<(), Error> {
        let n = graph
            .limit_into(id)
            .unwrap_or(self.max_samples)
            .min(self.max_samples);
        let samples = vec![Complex::<f32>::new(0.0, 0.0); n as usize];
        let mut file = tokio::fs::File::create(path).await?;
        file.write_all(bytemuck::cast_slice(&samples)).await?;
        file.flush().await?;
        file.sync_all().await?;
        debug!("sim runtime: wrote {n} samples to {}", path.display());
        Ok(())
    }
}

impl StreamingRuntime for SimRuntime {
    async fn start(&mut self, graph: &Flowgraph) -> Result<(), Error> {
        if self.running.is_some() {
            return Err(Error::ExternalRuntime(
                "a topology is already running".to_owned(),
            ));
        }
        let run = self.graphs.len();
        self.graphs.push(graph.clone());
        if self.fail_run == Some(run) {
            return Err(Error::ExternalRuntime(format!("simulated failure of run {run}")));
        }
        for path in graph.file_sources() {
            if tokio::fs::metadata(path).await.is_err() {
                return Err(Error::ExternalRuntime(format!(
                    "file source {} does not exist",
                    path.display()
                )));
            }
        }
        self.running = Some(graph.clone());
        Ok(())
    }

    async fn wait(&mut self) -> Result<RunReport, Error> {
        let graph = self
            .running
            .take()
            .ok_or_else(|| Error::ExternalRuntime("nothing is running".to_owned()))?;
        let mut report = RunReport::default();
        for (i, block) in graph.blocks().iter().enumerate() {
            let Some(path) = block.sink_path() else {
                continue;
            };
            let path = path.to_path_buf();
            self.write_sink(&graph, BlockId::from_index(i), &path).await?;
            report.flushed.push(path);
        }
        Ok(report)
    }
}
