//! The TCP accept loop and the gRPC `DelConn` control-plane surface.

use std::sync::Arc;

use tokio::net::TcpListener;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

use imcore_rpc::pb::im_gateway_server::{ImGateway, ImGatewayServer};
use imcore_rpc::{DelConnRequest, DelConnResponse};

use crate::connection::handle_connection;
use crate::error::{Context, Result};
use crate::state::GatewayState;

/// Accept connections on `listener` until `shutdown` fires, spawning one
/// [`handle_connection`] task per socket.
pub async fn serve(
    listener: TcpListener,
    state: Arc<GatewayState>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, peer_addr) = accepted.context("accepting TCP connection")?;
                if let Err(err) = socket.set_nodelay(true) {
                    warn!(%err, "failed to set TCP_NODELAY");
                }
                info!(%peer_addr, "accepted connection");
                let state = state.clone();
                tokio::spawn(handle_connection(socket, state));
            }
            _ = shutdown.recv() => {
                info!("shutdown signal received, stopping accept loop");
                return Ok(());
            }
        }
    }
}

/// The `DelConn` gRPC surface: best-effort eviction of a connection from
/// this replica's [`GatewayState`]. Removing the manager entry stops the
/// connection from being addressed by future lookups and fan-outs; the
/// underlying socket is torn down the next time its writer task observes
/// the dropped sender.
pub struct ImGatewayRpcService {
    state: Arc<GatewayState>,
}

impl ImGatewayRpcService {
    pub fn new(state: Arc<GatewayState>) -> Self {
        Self { state }
    }

    pub fn into_server(self) -> ImGatewayServer<Self> {
        ImGatewayServer::new(self)
    }
}

#[tonic::async_trait]
impl ImGateway for ImGatewayRpcService {
    async fn del_conn(
        &self,
        request: Request<DelConnRequest>,
    ) -> std::result::Result<Response<DelConnResponse>, Status> {
        let conn_uuid = request.into_inner().conn_uuid;
        self.state.conn_mgr.remove_connection(&conn_uuid).await;
        info!(conn_uuid, "connection removed via DelConn");
        Ok(Response::new(DelConnResponse {}))
    }
}
