//! Transport listeners and the worker pool. UDP datagrams are enqueued onto
//! a bounded channel and drained by workers; TCP and DoT connections each
//! get a dedicated task reading length-prefixed messages.
//!
//! Ref <https://www.rfc-editor.org/rfc/rfc7766> for DNS over TCP framing.

use std::io::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use concread::cowcell::asynch::CowCellReadTxn;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, trace, warn};

use crate::config::ConfigFile;
use crate::enums::Transport;
use crate::query::{QueryEngine, QueryResponse};
use crate::MAX_PACKET_BYTES;

/// One datagram waiting for a worker: payload, source, and the socket to
/// answer on.
pub struct QueuedPacket {
    pub bytes: Bytes,
    pub src: SocketAddr,
    pub socket: Arc<UdpSocket>,
}

/// Bind a UDP socket with SO_REUSEPORT so multiple receive loops share the
/// port and the kernel shards datagrams across them.
fn bind_reuseport_udp(addr: SocketAddr) -> Result<std::net::UdpSocket, Error> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// One UDP receive loop. Run several of these against the same address; the
/// queue sender is shared and workers do the heavy lifting.
pub async fn udp_server(
    config: CowCellReadTxn<ConfigFile>,
    queue: mpsc::Sender<QueuedPacket>,
) -> Result<(), Error> {
    let addr = config.dns_listener_address()?;
    let socket = match bind_reuseport_udp(addr) {
        Ok(value) => {
            info!("Started UDP listener on {addr}");
            Arc::new(UdpSocket::from_std(value)?)
        }
        Err(error) => {
            error!("Failed to start UDP listener on {addr}: {error:?}");
            return Err(error);
        }
    };

    let mut buffer = [0u8; MAX_PACKET_BYTES];
    loop {
        let (len, src) = match socket.recv_from(&mut buffer).await {
            Ok(value) => value,
            Err(error) => {
                error!("Error receiving UDP datagram: {error:?}");
                continue;
            }
        };
        trace!("{len} bytes received from {src}");
        let packet = QueuedPacket {
            bytes: Bytes::copy_from_slice(&buffer[..len]),
            src,
            socket: socket.clone(),
        };
        // a full queue means overload; shed the packet rather than block the
        // receive loop
        if let Err(mpsc::error::TrySendError::Full(_)) = queue.try_send(packet) {
            warn!("worker queue full, dropping datagram from {src}");
        }
    }
}

/// Spawn the worker pool. Workers pop from the shared queue, run the query
/// engine, and answer on the packet's own socket. Each packet runs in its
/// own task so a panic is contained and logged, not fatal to the pool.
pub fn spawn_workers(
    count: usize,
    receiver: mpsc::Receiver<QueuedPacket>,
    engine: Arc<QueryEngine>,
) -> Vec<JoinHandle<()>> {
    let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
    let mut handles = vec![];
    for worker_id in 0..count {
        let receiver = receiver.clone();
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let packet = {
                    let mut rx = receiver.lock().await;
                    rx.recv().await
                };
                let Some(packet) = packet else {
                    debug!("worker {worker_id} shutting down, queue closed");
                    break;
                };
                let engine = engine.clone();
                let task = tokio::spawn(async move {
                    let response = engine
                        .handle_packet(&packet.bytes, packet.src, Transport::Udp)
                        .await;
                    if let Some(QueryResponse::Single(bytes)) = response {
                        if let Err(error) = packet.socket.send_to(&bytes, packet.src).await {
                            warn!("failed to send reply to {}: {error:?}", packet.src);
                        }
                    }
                });
                if let Err(join_error) = task.await {
                    if join_error.is_panic() {
                        error!("worker {worker_id} caught a panicked request: {join_error}");
                    }
                }
            }
        }));
    }
    handles
}

/// Read length-prefixed messages off a stream until the peer goes away,
/// running each through the engine. Shared between plain TCP and TLS.
async fn handle_stream<S>(
    mut stream: S,
    src: SocketAddr,
    engine: Arc<QueryEngine>,
    transport: Transport,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let msg_length = match stream.read_u16().await {
            Ok(0) => break,
            Ok(value) => value as usize,
            Err(_) => break,
        };
        let mut buf = vec![0u8; msg_length];
        if let Err(error) = stream.read_exact(&mut buf).await {
            debug!("short read from {src}: {error:?}");
            break;
        }

        let response = engine.handle_packet(&buf, src, transport).await;
        let messages = match response {
            Some(QueryResponse::Single(bytes)) => vec![bytes],
            Some(QueryResponse::Stream(messages)) => messages,
            None => continue,
        };
        for message in messages {
            stream.write_u16(message.len() as u16).await?;
            stream.write_all(&message).await?;
        }
        stream.flush().await?;
    }
    Ok(())
}

/// main handler for the TCP side of things
pub async fn tcp_server(
    config: CowCellReadTxn<ConfigFile>,
    engine: Arc<QueryEngine>,
) -> Result<(), Error> {
    let addr = config.dns_listener_address()?;
    let listener = match TcpListener::bind(addr).await {
        Ok(value) => {
            info!("Started TCP listener on {addr}");
            value
        }
        Err(error) => {
            error!("Failed to start TCP listener on {addr}: {error:?}");
            return Err(error);
        }
    };

    let client_timeout = config.tcp_client_timeout;
    loop {
        let (stream, src) = match listener.accept().await {
            Ok(value) => value,
            Err(error) => {
                error!("Couldn't accept TCP connection: {error:?}");
                continue;
            }
        };
        debug!("TCP connection from {src}");
        let engine = engine.clone();
        tokio::spawn(async move {
            let mut stream: TcpStream = stream;
            if timeout(
                Duration::from_secs(client_timeout),
                handle_stream(&mut stream, src, engine, Transport::Tcp),
            )
            .await
            .is_err()
            {
                warn!("TCP connection from {src} terminated after {client_timeout} seconds");
            }
        });
    }
}

/// DNS over TLS, same framing as TCP inside the session. Ref RFC7858.
pub async fn tls_server(
    config: CowCellReadTxn<ConfigFile>,
    engine: Arc<QueryEngine>,
) -> Result<(), Error> {
    let addr = config.tls_listener_address()?;
    let tls_config = config.build_tls_server_config()?;
    let acceptor = TlsAcceptor::from(Arc::new(tls_config));

    let listener = match TcpListener::bind(addr).await {
        Ok(value) => {
            info!("Started DoT listener on {addr}");
            value
        }
        Err(error) => {
            error!("Failed to start DoT listener on {addr}: {error:?}");
            return Err(error);
        }
    };

    let client_timeout = config.tcp_client_timeout;
    loop {
        let (stream, src) = match listener.accept().await {
            Ok(value) => value,
            Err(error) => {
                error!("Couldn't accept DoT connection: {error:?}");
                continue;
            }
        };
        let acceptor = acceptor.clone();
        let engine = engine.clone();
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(value) => value,
                Err(error) => {
                    debug!("TLS handshake with {src} failed: {error:?}");
                    return;
                }
            };
            if timeout(
                Duration::from_secs(client_timeout),
                handle_stream(tls_stream, src, engine, Transport::Tls),
            )
            .await
            .is_err()
            {
                warn!("DoT connection from {src} terminated after {client_timeout} seconds");
            }
        });
    }
}

/// Handles to every running listener and the worker pool; `all_finished`
/// drives the supervision loop in main.
#[derive(Default)]
pub struct Servers {
    pub udpservers: Vec<JoinHandle<Result<(), Error>>>,
    pub tcpserver: Option<JoinHandle<Result<(), Error>>>,
    pub tlsserver: Option<JoinHandle<Result<(), Error>>>,
    pub dohserver: Option<JoinHandle<Result<(), Error>>>,
    pub workers: Vec<JoinHandle<()>>,
}

impl Servers {
    pub fn with_udpservers(self, udpservers: Vec<JoinHandle<Result<(), Error>>>) -> Self {
        Self { udpservers, ..self }
    }
    pub fn with_tcpserver(self, tcpserver: JoinHandle<Result<(), Error>>) -> Self {
        Self {
            tcpserver: Some(tcpserver),
            ..self
        }
    }
    pub fn with_tlsserver(self, tlsserver: JoinHandle<Result<(), Error>>) -> Self {
        Self {
            tlsserver: Some(tlsserver),
            ..self
        }
    }
    pub fn with_dohserver(self, dohserver: JoinHandle<Result<(), Error>>) -> Self {
        Self {
            dohserver: Some(dohserver),
            ..self
        }
    }
    pub fn with_workers(self, workers: Vec<JoinHandle<()>>) -> Self {
        Self { workers, ..self }
    }

    /// True when any listener has stopped; the process treats that as fatal.
    pub fn any_finished(&self) -> bool {
        let mut results: Vec<bool> = self.udpservers.iter().map(|h| h.is_finished()).collect();
        if let Some(server) = &self.tcpserver {
            results.push(server.is_finished());
        }
        if let Some(server) = &self.tlsserver {
            results.push(server.is_finished());
        }
        if let Some(server) = &self.dohserver {
            results.push(server.is_finished());
        }
        results.iter().any(|&r| r)
    }
}
