//! Provider side: an HTTP/1.1 server streaming snapshot files by byte range.

mod config;
mod files;
mod handler;

pub use config::ServerConfig;
pub use files::{DataRoot, Lookup, is_safe_file_name};
pub use handler::{RangeFileServer, ResponseBody, ServePlan};

use crate::errors::Result;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use log::{debug, info, warn};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

/// A bound listener that hands every connection to a [`RangeFileServer`].
pub struct Listener {
    listener: TcpListener,
    server: Arc<RangeFileServer>,
}

impl Listener {
    /// Validates the data root and binds `config.bind` (port 0 picks a free port).
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        let server = Arc::new(RangeFileServer::new(config)?);
        let listener = TcpListener::bind(config.bind).await?;
        Ok(Self { listener, server })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn server(&self) -> Arc<RangeFileServer> {
        Arc::clone(&self.server)
    }

    /// Serves until the process is stopped.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accepts connections until `shutdown` resolves. Connections already
    /// accepted finish on their own tasks.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        info!("serving {} on http://{addr}", self.server.data_root().display());
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("listener on {addr} shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("accept failed: {e}");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                    };
                    let server = Arc::clone(&self.server);
                    tokio::spawn(async move {
                        let service = service_fn(move |req| {
                            let server = Arc::clone(&server);
                            async move { Ok::<_, Infallible>(server.handle(req).await) }
                        });
                        if let Err(e) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                            debug!("connection from {peer} ended: {e}");
                        }
                    });
                }
            }
        }
        Ok(())
    }
}
