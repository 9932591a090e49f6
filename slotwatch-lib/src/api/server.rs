use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::handlers::route;
use super::state::ApiState;
use crate::error::Result;

/// Serve the management API on `listener` until `shutdown` is cancelled.
///
/// In-flight connections are left to finish on their own tasks.
pub async fn serve(listener: TcpListener, state: ApiState, shutdown: CancellationToken) -> Result<()> {
    let addr = listener.local_addr()?;
    let state = Arc::new(state);
    let builder = ConnBuilder::new(TokioExecutor::new());

    info!(?addr, "Management API started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Management API: shutdown requested");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "Management API: accept error");
                        continue;
                    }
                };

                let state = state.clone();
                let builder = builder.clone();
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let state = state.clone();
                        async move { Ok::<_, hyper::Error>(route(req, &state).await) }
                    });

                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "Management API: serve_connection error");
                    }
                });
            }
        }
    }

    info!("Management API stopped");
    Ok(())
}
