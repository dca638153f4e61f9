//! Process driver: connects the bridge to a framed transport and runs the
//! single-threaded frame loop.
//!
//! Blocking I/O stays on a reader and a writer thread. Inbound payloads are
//! marshalled to the loop over a channel; the loop also paces frames.

use crate::bridge::Bridge;
use crate::config::{ConfigError, Endpoint, HostConfig};
use crate::headless::{HeadlessDocument, HeadlessHistory, HeadlessRenderer};
use crate::protocol::{reader_loop, writer_loop};
use crate::transport::QueueTransport;
use serde_json::Value;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("failed to write snapshot {}: {source}", path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One open byte stream to the server.
pub struct Connection {
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    /// Closing this unblocks the reader thread on teardown.
    socket: Option<TcpStream>,
}

impl Connection {
    pub fn new(reader: impl Read + Send + 'static, writer: impl Write + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            socket: None,
        }
    }

    pub fn connect(endpoint: &Endpoint) -> Result<Self, HostError> {
        match endpoint {
            Endpoint::Stdio => Ok(Self::new(io::stdin(), io::stdout())),
            Endpoint::Tcp(addr) => {
                let connect_error = |source| HostError::Connect {
                    addr: addr.clone(),
                    source,
                };
                let stream = TcpStream::connect(addr).map_err(connect_error)?;
                stream.set_nodelay(true).map_err(connect_error)?;
                let reader = stream.try_clone().map_err(connect_error)?;
                let socket = stream.try_clone().map_err(connect_error)?;
                Ok(Self {
                    reader: Box::new(reader),
                    writer: Box::new(stream),
                    socket: Some(socket),
                })
            }
        }
    }
}

enum Inbound {
    Message(Value),
    Closed,
    Failed(String),
}

/// The host: a headless document driven by the bridge.
pub struct Host {
    bridge: Bridge,
    renderer: Rc<HeadlessRenderer>,
    config: HostConfig,
}

impl Host {
    pub fn new(config: HostConfig) -> Self {
        let document = Rc::new(HeadlessDocument::default());
        let history = Rc::new(HeadlessHistory::new(config.initial_location.clone()));
        let renderer = Rc::new(HeadlessRenderer::new(document.clone()));
        let bridge = Bridge::new(document, history, renderer.clone(), config.reconnect);
        Self {
            bridge,
            renderer,
            config,
        }
    }

    pub fn renderer(&self) -> &Rc<HeadlessRenderer> {
        &self.renderer
    }

    /// Serves one connection until it closes or fails. Returns whether the
    /// reconnect policy asks for another one.
    pub fn serve(&mut self, connection: Connection) -> Result<bool, HostError> {
        let Connection {
            reader,
            writer,
            socket,
        } = connection;
        let capacity = self.config.outbound_queue_cap;
        let (out_tx, out_rx) = mpsc::sync_channel(capacity);
        let (in_tx, in_rx) = mpsc::channel();

        let writer_events = in_tx.clone();
        let writer_handle = thread::spawn(move || {
            let result = writer_loop(io::BufWriter::new(writer), out_rx);
            if let Err(err) = &result {
                let _ = writer_events.send(Inbound::Failed(format!("write: {err}")));
            }
            result
        });

        let reader_handle = thread::spawn(move || {
            let events = in_tx.clone();
            let result = reader_loop(reader, |value| {
                let _ = events.send(Inbound::Message(value));
            });
            let _ = match &result {
                Ok(()) => in_tx.send(Inbound::Closed),
                Err(err) => in_tx.send(Inbound::Failed(format!("read: {err}"))),
            };
            result
        });

        self.bridge
            .open(Rc::new(QueueTransport::new(out_tx, capacity)));

        let outcome = self.pump(&in_rx);

        let reconnect = match outcome {
            Ok(Inbound::Failed(reason)) => self.bridge.fail(&reason),
            Ok(_) => self.bridge.close(),
            Err(err) => {
                self.bridge.fail(&err.to_string());
                return Err(err);
            }
        };

        if let Some(socket) = socket
            && let Err(err) = socket.shutdown(Shutdown::Both)
        {
            debug!(error = %err, "socket already shut down");
        }
        join_or_detach("reader", reader_handle);
        join_or_detach("writer", writer_handle);

        Ok(reconnect)
    }

    /// Runs the frame loop until the connection ends. Returns the ending
    /// event.
    fn pump(&mut self, inbound: &mpsc::Receiver<Inbound>) -> Result<Inbound, HostError> {
        let interval = self.config.frame_interval;
        let mut next_frame = Instant::now();
        let mut frame_pending = false;

        loop {
            let wait = if frame_pending {
                next_frame.saturating_duration_since(Instant::now())
            } else {
                interval
            };

            match inbound.recv_timeout(wait) {
                Ok(Inbound::Message(value)) => self.bridge.handle_message(value),
                Ok(end) => return Ok(end),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(Inbound::Closed),
            }

            frame_pending |= self.renderer.take_frame_request();
            let now = Instant::now();
            if frame_pending && now >= next_frame {
                frame_pending = false;
                next_frame = now + interval;
                if self.bridge.frame() {
                    self.write_snapshot()?;
                }
            }
        }
    }

    fn write_snapshot(&self) -> Result<(), HostError> {
        let Some(path) = &self.config.snapshot else {
            return Ok(());
        };
        write_snapshot(path, &self.renderer.to_html())
    }
}

fn write_snapshot(path: &Path, html: &str) -> Result<(), HostError> {
    std::fs::write(path, html).map_err(|source| HostError::Snapshot {
        path: path.to_path_buf(),
        source,
    })
}

fn join_or_detach(name: &str, handle: JoinHandle<io::Result<()>>) {
    if handle.is_finished() {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(thread = name, error = %err, "io thread returned error"),
            Err(err) => error!(thread = name, ?err, "io thread join failed"),
        }
    } else {
        // A blocked stdio read or write must not hang teardown.
        debug!(thread = name, "io thread still active; not joining");
    }
}

/// Connects, serves and reconnects per policy until the policy says stop.
pub fn run(config: HostConfig) -> Result<(), HostError> {
    info!(endpoint = ?config.endpoint, reconnect = ?config.reconnect, "starting spine host");
    let mut host = Host::new(config);

    loop {
        let reconnect = match Connection::connect(&host.config.endpoint) {
            Ok(connection) => host.serve(connection)?,
            Err(err) if host.config.reconnect.should_reconnect(true) => {
                warn!(error = %err, "connect failed");
                true
            }
            Err(err) => return Err(err),
        };

        if !reconnect {
            return Ok(());
        }

        debug!(delay = ?host.config.reconnect_delay, "reconnecting");
        thread::sleep(host.config.reconnect_delay);
    }
}
