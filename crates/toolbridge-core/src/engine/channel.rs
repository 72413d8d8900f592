//! Channel handles and the connectors that produce them

use crate::error::{BridgeError, BridgeResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tracing::debug;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A freshly opened duplex channel: read-end, write-end and, for spawned
/// peers, the process handle.
pub struct Channel {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
    pub process: Option<Child>,
}

impl Channel {
    /// Wrap an in-memory or otherwise pre-connected stream pair
    pub fn from_io(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            process: None,
        }
    }

    /// Take the piped stdio of a spawned child
    pub fn from_child(mut child: Child) -> BridgeResult<Self> {
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::transport("Failed to get stdin handle"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::transport("Failed to get stdout handle"))?;

        Ok(Self {
            reader: Box::new(stdout),
            writer: Box::new(stdin),
            process: Some(child),
        })
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("pid", &self.process.as_ref().and_then(|c| c.id()))
            .finish_non_exhaustive()
    }
}

/// How to start a peer process
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub current_dir: Option<PathBuf>,
}

impl SpawnSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            current_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Spawn the process with stdin/stdout piped and stderr inherited
    pub fn spawn(&self) -> BridgeResult<Channel> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| {
            BridgeError::spawn_failed(self.program.display().to_string(), e.to_string())
        })?;
        debug!(
            "Spawned '{}' (pid {:?})",
            self.program.display(),
            child.id()
        );

        Channel::from_child(child)
    }
}

/// Opens a channel to a peer. The engine's owner calls this on every
/// connect attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> BridgeResult<Channel>;

    /// Human-readable target, for logs and errors
    fn describe(&self) -> String;
}

/// Connector that spawns a child process per connection
#[derive(Debug, Clone)]
pub struct ProcessConnector {
    spec: SpawnSpec,
}

impl ProcessConnector {
    pub fn new(spec: SpawnSpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &SpawnSpec {
        &self.spec
    }
}

#[async_trait]
impl Connector for ProcessConnector {
    async fn connect(&self) -> BridgeResult<Channel> {
        self.spec.spawn()
    }

    fn describe(&self) -> String {
        self.spec.program.display().to_string()
    }
}

/// Connector backed by a closure, for peers that live in-process
pub struct FnConnector<F> {
    name: String,
    open: F,
}

impl<F> FnConnector<F>
where
    F: Fn() -> BridgeResult<Channel> + Send + Sync,
{
    pub fn new(name: impl Into<String>, open: F) -> Self {
        Self {
            name: name.into(),
            open,
        }
    }
}

#[async_trait]
impl<F> Connector for FnConnector<F>
where
    F: Fn() -> BridgeResult<Channel> + Send + Sync,
{
    async fn connect(&self) -> BridgeResult<Channel> {
        (self.open)()
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
