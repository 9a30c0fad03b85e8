//! 端口接入器
//!
//! 每个协议端口绑定一个监听 socket，超过连接上限拒绝 accept，
//! 每条连接一个任务。停机时关闭接入器，在途连接给固定宽限。

use crate::{connection::drive_connection, SessionDeps, SessionError};
use socket2::TcpKeepalive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tgw_protocol::Codec;
use tgw_telemetry::record_connection_refused;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, info, warn};

pub struct PortServer {
    codec: Codec,
    port: u16,
    deps: Arc<SessionDeps>,
}

impl PortServer {
    pub fn new(codec: Codec, port: u16, deps: Arc<SessionDeps>) -> Self {
        Self { codec, port, deps }
    }

    /// 运行接入循环直至停机信号。
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), SessionError> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        info!(
            target: "tgw.session",
            port = self.port,
            protocol = %self.codec.protocol(),
            max_connections = self.deps.options.max_connections_per_port,
            "listening"
        );
        let active = Arc::new(AtomicUsize::new(0));
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut shutdown_rx = shutdown.clone();

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            if active.load(Ordering::Relaxed)
                                >= self.deps.options.max_connections_per_port
                            {
                                record_connection_refused();
                                warn!(
                                    target: "tgw.session",
                                    port = self.port,
                                    peer = %peer,
                                    "connection limit reached, refusing"
                                );
                                continue;
                            }
                            self.configure_socket(&stream);
                            let codec = self.codec;
                            let deps = Arc::clone(&self.deps);
                            let active = Arc::clone(&active);
                            let shutdown = shutdown.clone();
                            active.fetch_add(1, Ordering::Relaxed);
                            tasks.spawn(async move {
                                drive_connection(stream, peer.to_string(), codec, deps, shutdown)
                                    .await;
                                active.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(err) => {
                            error!(target: "tgw.session", port = self.port, error = %err, "accept failed");
                        }
                    }
                }
            }
        }

        drop(listener);
        info!(
            target: "tgw.session",
            port = self.port,
            active = active.load(Ordering::Relaxed),
            "acceptor stopped, draining connections"
        );
        let grace = self.deps.options.shutdown_grace;
        let drained = timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                target: "tgw.session",
                port = self.port,
                "shutdown grace elapsed, aborting remaining connections"
            );
            tasks.abort_all();
        }
        Ok(())
    }

    fn configure_socket(&self, stream: &TcpStream) {
        if let Err(err) = stream.set_nodelay(true) {
            warn!(target: "tgw.session", error = %err, "set_nodelay failed");
        }
        let keepalive = TcpKeepalive::new().with_time(self.deps.options.keepalive_interval);
        let socket = socket2::SockRef::from(stream);
        if let Err(err) = socket.set_tcp_keepalive(&keepalive) {
            warn!(target: "tgw.session", error = %err, "set_tcp_keepalive failed");
        }
    }
}
