//! Device driver and streaming runtime backed by an external bridge program.
//!
//! The bridge owns the real radio driver and block runtime. It's driven with
//! two subcommands:
//!
//! - `<program> identify --args <addr> --channel <n>` prints the receive
//!   daughterboard name on stdout.
//! - `<program> run` reads one JSON document from stdin, opens the device it
//!   names, applies the recorded commands in order, runs the flowgraph, and
//!   exits 0 once every sink is closed.
//!
//! Device commands are recorded as the orchestration issues them and sent
//! along with the flowgraph they belong to.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    sync::{Arc, Mutex, PoisonError},
};

use serde::Serialize;
use sweepsense::{
    DeviceDriver, Error, Flowgraph, Radio, RunReport, StreamingRuntime,
    device::{DeviceCommand, DeviceRequest},
};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

#[derive(Debug, Default)]
struct Session {
    request: Option<DeviceRequest>,
    commands: Vec<DeviceCommand>,
}

#[derive(Serialize)]
struct DeviceSetup<'a> {
    request: &'a DeviceRequest,
    commands: &'a [DeviceCommand],
}

#[derive(Serialize)]
struct RunRequest<'a> {
    device: Option<DeviceSetup<'a>>,
    flowgraph: &'a Flowgraph,
}

fn lock(session: &Mutex<Session>) -> std::sync::MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Opens devices through the bridge.
#[derive(Clone, Debug)]
pub struct BridgeDriver {
    program: PathBuf,
    session: Arc<Mutex<Session>>,
}

/// A device opened through the bridge. Commands are queued until the next run.
#[derive(Debug)]
pub struct BridgeRadio {
    program: PathBuf,
    args: String,
    session: Arc<Mutex<Session>>,
}

/// Runs flowgraphs through the bridge.
#[derive(Debug)]
pub struct BridgeRuntime {
    program: PathBuf,
    session: Arc<Mutex<Session>>,
    running: Option<(tokio::process::Child, Flowgraph)>,
}

/// A driver and runtime sharing one bridge session.
pub fn bridge(program: &Path) -> (BridgeDriver, BridgeRuntime) {
    let session = Arc::new(Mutex::new(Session::default()));
    (
        BridgeDriver {
            program: program.to_path_buf(),
            session: session.clone(),
        },
        BridgeRuntime {
            program: program.to_path_buf(),
            session,
            running: None,
        },
    )
}

impl DeviceDriver for BridgeDriver {
    type Radio = BridgeRadio;

    async fn open(&mut self, request: &DeviceRequest) -> Result<BridgeRadio, Error> {
        let mut session = lock(&self.session);
        session.request = Some(request.clone());
        session.commands.clear();
        Ok(BridgeRadio {
            program: self.program.clone(),
            args: request.args.clone(),
            session: self.session.clone(),
        })
    }
}

impl Radio for BridgeRadio {
    async fn apply(&mut self, cmd: DeviceCommand) -> Result<(), Error> {
        lock(&self.session).commands.push(cmd);
        Ok(())
    }

    async fn rx_subdev_name(&mut self, chan: usize) -> Result<String, Error> {
        let out = Command::new(&self.program)
            .arg("identify")
            .arg("--args")
            .arg(&self.args)
            .arg("--channel")
            .arg(chan.to_string())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                Error::ExternalRuntime(format!("couldn't run {}: {e}", self.program.display()))
            })?;
        if !out.status.success() {
            return Err(Error::ExternalRuntime(format!(
                "identify failed ({}): {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&out.stdout).trim().to_owned())
    }
}

impl StreamingRuntime for BridgeRuntime {
    async fn start(&mut self, graph: &Flowgraph) -> Result<(), Error> {
        if self.running.is_some() {
            return Err(Error::ExternalRuntime(
                "a topology is already running".to_owned(),
            ));
        }
        let session = std::mem::take(&mut *lock(&self.session));
        let request = RunRequest {
            device: session.request.as_ref().map(|request| DeviceSetup {
                request,
                commands: &session.commands,
            }),
            flowgraph: graph,
        };
        let doc = serde_json::to_vec(&request)
            .map_err(|e| Error::ExternalRuntime(format!("couldn't encode run request: {e}")))?;

        let mut child = Command::new(&self.program)
            .arg("run")
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::ExternalRuntime(format!("couldn't run {}: {e}", self.program.display()))
            })?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::ExternalRuntime("bridge stdin unavailable".to_owned()))?;
        stdin.write_all(&doc).await?;
        stdin.shutdown().await?;
        drop(stdin);
        debug!("bridge: started, {} byte request", doc.len());

        self.running = Some((child, graph.clone()));
        Ok(())
    }

    async fn wait(&mut self) -> Result<RunReport, Error> {
        let (mut child, graph) = self
            .running
            .take()
            .ok_or_else(|| Error::ExternalRuntime("nothing is running".to_owned()))?;
        let status = child.wait().await?;
        if !status.success() {
            return Err(Error::ExternalRuntime(format!("bridge run failed: {status}")));
        }

        let mut report = RunReport::default();
        for path in graph.file_sinks() {
            let file = tokio::fs::File::open(path).await.map_err(|e| {
                Error::ExternalRuntime(format!("sink {} missing after run: {e}", path.display()))
            })?;
            file.sync_all().await?;
            report.flushed.push(path.to_path_buf());
        }
        Ok(report)
    }
}
