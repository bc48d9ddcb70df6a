//! TCP accept loop and per-connection drivers (A5).
//!
//! Grounded on the teacher's `ModbusServer::start` (`plugins/protocols/modbus/server.rs`):
//! bind, spawn an accept loop, spawn one task per connection, track
//! connections in a shared map, log INFO on connect/disconnect. Generalized
//! here to drive `ConnectionPipeline` instead of the teacher's fixed Modbus
//! request handler, and extended with an idle-read timeout and a graceful
//! shutdown grace window (§5 "Cancellation and timeouts").

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::pipeline::connection::{ConnectionPipeline, PipelineEvent};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const READ_BUFFER_SIZE: usize = 4096;

/// Tracks currently-open connections, matching the teacher's `ClientInfo`
/// map shape, minus the fields this server has no use for.
#[derive(Debug, Clone)]
struct ClientInfo {
    connected_at: chrono::DateTime<chrono::Utc>,
}

/// Bind `config.port` and serve connections until `shutdown` fires.
///
/// Returns once every in-flight connection has drained or the grace window
/// elapsed, whichever comes first. If `ready` is given, the actual bound
/// address is sent through it as soon as the listener is up — useful for
/// tests that bind an ephemeral port (`config.port == 0`).
pub async fn run(
    config: Arc<ServerConfig>,
    mut shutdown: watch::Receiver<bool>,
    ready: Option<oneshot::Sender<SocketAddr>>,
) -> Result<()> {
    let bind_addr: SocketAddr = format!("0.0.0.0:{}", config.port)
        .parse()
        .map_err(crate::error::FrameError::from)?;

    let listener = TcpListener::bind(bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "framesrv listening");
    if let Some(ready) = ready {
        let _ = ready.send(local_addr);
    }

    let clients: Arc<DashMap<SocketAddr, ClientInfo>> = Arc::new(DashMap::new());
    let mut connection_tasks = Vec::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        info!(%addr, "connection accepted");
                        clients.insert(addr, ClientInfo { connected_at: chrono::Utc::now() });

                        let config = config.clone();
                        let clients = clients.clone();
                        let mut conn_shutdown = shutdown.clone();

                        let task = tokio::spawn(async move {
                            tokio::select! {
                                _ = serve_connection(stream, addr, config) => {}
                                _ = conn_shutdown.changed() => {}
                            }
                            clients.remove(&addr);
                            info!(%addr, "connection closed");
                        });
                        connection_tasks.push(task);
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("shutdown signal received, entering grace window");
                break;
            }
        }
    }

    let grace = tokio::time::sleep(SHUTDOWN_GRACE);
    tokio::pin!(grace);
    for task in connection_tasks {
        tokio::select! {
            _ = &mut grace => {
                warn!("shutdown grace window elapsed, forcing close");
                break;
            }
            _ = task => {}
        }
    }

    Ok(())
}

/// Drive one connection's read loop through its `ConnectionPipeline` until
/// peer close, idle timeout, or a fatal framing error.
async fn serve_connection(mut stream: TcpStream, addr: SocketAddr, config: Arc<ServerConfig>) {
    let mut pipeline = ConnectionPipeline::new(&config);
    let idle = pipeline.reader_idle_seconds();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read_result = if idle == 0 {
            stream.read(&mut buf).await
        } else {
            match tokio::time::timeout(Duration::from_secs(idle), stream.read(&mut buf)).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(%addr, "idle timeout, closing connection");
                    return;
                }
            }
        };

        let n = match read_result {
            Ok(0) => {
                debug!(%addr, "peer closed connection");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(%addr, error = %e, "read error, closing connection");
                return;
            }
        };

        let outcome = match pipeline.feed(&buf[..n]) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(%addr, error = %e, "fatal framing error, closing connection");
                return;
            }
        };

        for event in outcome.events {
            if let PipelineEvent::Outbound(bytes) = event {
                if let Err(e) = stream.write_all(&bytes).await {
                    warn!(%addr, error = %e, "write error, closing connection");
                    return;
                }
                debug!(%addr, "responded");
            }
            // ModbusFrame / RawChunk: observed only, no socket write back.
        }

        if outcome.fatal {
            let _ = stream.flush().await;
            debug!(%addr, "fatal stream condition after response attempt, closing");
            return;
        }
    }
}
