//! Transport - framed duplex stream to the game server
//!
//! Reading and writing each run on their own task. The read task decodes
//! frames and pushes them, in arrival order, onto one unbounded channel that
//! the dispatcher drains; the write task serializes outbound envelopes. A
//! write failure is reported on the inbound channel too, so the session sees
//! every transport failure in the same ordered stream.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::protocol::{self, DecodeError, Envelope};
use crate::types::FRAME_TERMINATOR;

/// One item from the receive path.
#[derive(Debug)]
pub enum Inbound {
    Envelope(Envelope),
    Malformed(DecodeError),
    /// The server closed the connection.
    Closed,
    Failed(String),
}

pub type InboundReceiver = mpsc::UnboundedReceiver<Inbound>;

/// Handle to a running connection.
pub struct Transport {
    out_tx: Option<mpsc::UnboundedSender<Envelope>>,
    read_task: JoinHandle<()>,
    write_task: JoinHandle<()>,
    wire_log: Option<WireLog>,
    closed: bool,
}

impl Transport {
    /// Connect over TCP using the host, port, and wire log settings of `config`.
    pub async fn connect(config: &ClientConfig) -> Result<(Self, InboundReceiver)> {
        let addr = config.server_addr();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;
        debug!(%addr, "connected");

        Ok(Self::spawn(stream, WireLog::start(config)))
    }

    /// Run the read and write tasks over any duplex byte stream.
    pub fn spawn<S>(stream: S, wire_log: Option<WireLog>) -> (Self, InboundReceiver)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Inbound>();
        let (out_tx, out_rx) = mpsc::unbounded_channel::<Envelope>();

        let tap = wire_log.as_ref().map(WireLog::tap);
        let read_task = tokio::spawn(read_loop(reader, inbound_tx.clone(), tap.clone()));
        let write_task = tokio::spawn(write_loop(writer, out_rx, inbound_tx, tap));

        (
            Self {
                out_tx: Some(out_tx),
                read_task,
                write_task,
                wire_log,
                closed: false,
            },
            inbound_rx,
        )
    }

    /// Queue one envelope for sending.
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        let Some(out_tx) = self.out_tx.as_ref() else {
            return Err(ClientError::Transport("connection is closed".to_string()));
        };
        out_tx
            .send(envelope)
            .map_err(|_| ClientError::Transport("connection writer has stopped".to_string()))
    }

    /// Flush queued envelopes, shut the stream down, and stop reading.
    ///
    /// Also waits for the wire log to record every frame seen so far, even
    /// after [`abort`](Self::abort).
    pub async fn close(&mut self) {
        if !std::mem::replace(&mut self.closed, true) {
            self.out_tx.take();
            if let Err(e) = (&mut self.write_task).await {
                if !e.is_cancelled() {
                    warn!(error = %e, "writer task failed");
                }
            }
            self.read_task.abort();
        }
        if let Some(wire_log) = self.wire_log.take() {
            wire_log.finish().await;
        }
    }

    /// Stop both tasks now, discarding anything not yet written.
    pub fn abort(&mut self) {
        self.closed = true;
        self.out_tx.take();
        self.read_task.abort();
        self.write_task.abort();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.read_task.abort();
        self.write_task.abort();
    }
}

async fn read_loop<R>(reader: R, inbound_tx: mpsc::UnboundedSender<Inbound>, wire_log: Option<WireTap>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut frame: Vec<u8> = Vec::with_capacity(4096);

    loop {
        frame.clear();
        match reader.read_until(FRAME_TERMINATOR, &mut frame).await {
            Ok(0) => {
                let _ = inbound_tx.send(Inbound::Closed);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = inbound_tx.send(Inbound::Failed(format!("read failed: {e}")));
                break;
            }
        }

        let body = frame.strip_suffix(&[FRAME_TERMINATOR]).unwrap_or(&frame[..]);
        if body.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        if let Some(log) = wire_log.as_ref() {
            log.record(Direction::FromServer, body);
        }

        let item = match protocol::decode(body) {
            Ok(envelope) => Inbound::Envelope(envelope),
            Err(e) => Inbound::Malformed(e),
        };
        if inbound_tx.send(item).is_err() {
            break;
        }
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut out_rx: mpsc::UnboundedReceiver<Envelope>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    wire_log: Option<WireTap>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = out_rx.recv().await {
        let frame = match protocol::encode(&envelope) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event = %envelope.event, error = %e, "dropping unencodable envelope");
                continue;
            }
        };

        let written = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = written {
            let _ = inbound_tx.send(Inbound::Failed(format!("write failed: {e}")));
            break;
        }

        if let Some(log) = wire_log.as_ref() {
            log.record(Direction::ToServer, &frame[..frame.len() - 1]);
        }
    }

    let _ = writer.shutdown().await;
}

// ============== Wire Log ==============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    FromServer,
    ToServer,
}

impl Direction {
    fn prefix(self) -> &'static str {
        match self {
            Direction::FromServer => "FROM SERVER <-- ",
            Direction::ToServer => "TO SERVER --> ",
        }
    }
}

#[derive(Debug)]
struct WireRecord {
    direction: Direction,
    bytes: Vec<u8>,
}

/// Diagnostic sink receiving every raw frame, independent of protocol logic.
#[derive(Debug)]
pub struct WireLog {
    tx: mpsc::UnboundedSender<WireRecord>,
    task: JoinHandle<()>,
}

/// Sending side of a [`WireLog`], held by the read and write tasks.
#[derive(Debug, Clone)]
struct WireTap {
    tx: mpsc::UnboundedSender<WireRecord>,
}

impl WireLog {
    /// Start the sink task if `config` asks for stderr echo or a log file.
    pub fn start(config: &ClientConfig) -> Option<Self> {
        if !config.print_io && config.wire_log_path.is_none() {
            return None;
        }

        let print_io = config.print_io;
        let path = config.wire_log_path.clone();
        let (tx, mut rx) = mpsc::unbounded_channel::<WireRecord>();

        let task = tokio::spawn(async move {
            use tokio::fs::OpenOptions;

            let mut file = match path.as_deref() {
                Some(path) => match OpenOptions::new().create(true).append(true).open(path).await {
                    Ok(f) => Some(f),
                    Err(e) => {
                        warn!(%path, error = %e, "cannot open wire log");
                        None
                    }
                },
                None => None,
            };
            let mut stderr = tokio::io::stderr();
            let mut line: Vec<u8> = Vec::with_capacity(4096);

            while let Some(rec) = rx.recv().await {
                line.clear();
                line.extend_from_slice(rec.direction.prefix().as_bytes());
                line.extend_from_slice(&rec.bytes);
                line.push(b'\n');

                if print_io {
                    let _ = stderr.write_all(&line).await;
                }
                if let Some(f) = file.as_mut() {
                    if f.write_all(&line).await.is_err() {
                        file = None;
                    }
                }
            }

            if let Some(mut f) = file {
                let _ = f.flush().await;
            }
        });

        Some(Self { tx, task })
    }

    fn tap(&self) -> WireTap {
        WireTap {
            tx: self.tx.clone(),
        }
    }

    /// Wait until every frame recorded so far is written out.
    ///
    /// Returns once the read and write tasks have dropped their taps.
    async fn finish(self) {
        let Self { tx, task } = self;
        drop(tx);
        if let Err(e) = task.await {
            warn!(error = %e, "wire log task failed");
        }
    }
}

impl WireTap {
    fn record(&self, direction: Direction, bytes: &[u8]) {
        let _ = self.tx.send(WireRecord {
            direction,
            bytes: bytes.to_vec(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn splits_frames_and_reports_bad_ones() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (_transport, mut inbound) = Transport::spawn(client, None);

        server
            .write_all(b"{\"event\":\"named\",\"data\":\"Chess\"}\x04\x04not json\x04{\"event\":\"start\",\"data\":{\"playerID\":\"0\"}}\x04")
            .await
            .unwrap();
        drop(server);

        match inbound.recv().await.unwrap() {
            Inbound::Envelope(env) => {
                assert_eq!(env.event, "named");
                assert_eq!(env.data, json!("Chess"));
            }
            other => panic!("expected named, got {other:?}"),
        }
        assert!(matches!(inbound.recv().await.unwrap(), Inbound::Malformed(_)));
        match inbound.recv().await.unwrap() {
            Inbound::Envelope(env) => assert_eq!(env.event, "start"),
            other => panic!("expected start, got {other:?}"),
        }
        assert!(matches!(inbound.recv().await.unwrap(), Inbound::Closed));
    }

    #[tokio::test]
    async fn frames_split_across_reads_are_reassembled() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (_transport, mut inbound) = Transport::spawn(client, None);

        server.write_all(b"{\"event\":\"ov").await.unwrap();
        tokio::task::yield_now().await;
        server
            .write_all(b"er\",\"data\":{\"won\":true,\"reason\":\"mate\"}}\x04")
            .await
            .unwrap();

        match inbound.recv().await.unwrap() {
            Inbound::Envelope(env) => assert_eq!(env.event, "over"),
            other => panic!("expected over, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sends_terminated_frames() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (mut transport, _inbound) = Transport::spawn(client, None);

        transport
            .send(Envelope::new("alias", json!("chess")))
            .unwrap();
        transport.close().await;

        let mut buf = Vec::new();
        server.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf.last(), Some(&FRAME_TERMINATOR));
        let env = protocol::decode(&buf).unwrap();
        assert_eq!(env.event, "alias");

        assert!(transport.send(Envelope::new("alias", json!("x"))).is_err());
    }

    #[tokio::test]
    async fn close_waits_for_the_wire_log() {
        let path = std::env::temp_dir().join(format!("joueur-wire-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let config = ClientConfig {
            wire_log_path: Some(path.to_string_lossy().into_owned()),
            ..ClientConfig::default()
        };

        let (client, mut server) = tokio::io::duplex(1024);
        let (mut transport, mut inbound) = Transport::spawn(client, WireLog::start(&config));

        server
            .write_all(b"{\"event\":\"over\",\"data\":{\"won\":true,\"reason\":\"mate\"}}\x04")
            .await
            .unwrap();
        assert!(matches!(inbound.recv().await.unwrap(), Inbound::Envelope(_)));
        transport
            .send(Envelope::new("finished", json!({"orderIndex": 0})))
            .unwrap();
        transport.abort();
        transport.close().await;

        let logged = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(logged.contains("FROM SERVER <-- {\"event\":\"over\""));
    }

    #[tokio::test]
    async fn close_flushes_sent_frames_to_the_wire_log() {
        let path = std::env::temp_dir().join(format!("joueur-wire-sent-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let config = ClientConfig {
            wire_log_path: Some(path.to_string_lossy().into_owned()),
            ..ClientConfig::default()
        };

        let (client, _server) = tokio::io::duplex(1024);
        let (mut transport, _inbound) = Transport::spawn(client, WireLog::start(&config));
        transport
            .send(Envelope::new("alias", json!("chess")))
            .unwrap();
        transport.close().await;

        let logged = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(logged.starts_with("TO SERVER --> {"));
        assert!(logged.contains("\"alias\""));
    }
}
