use std::sync::Arc;

use imcore_auth::JwtSigner;
use imcore_connmgr::ConnManager;
use imcore_rpc::ApiGatewayClient;

/// Shared runtime state for one gateway process, handed to every
/// per-connection task as an `Arc`.
pub struct GatewayState {
    pub conn_mgr: ConnManager,
    pub api: Arc<dyn ApiGatewayClient>,
    pub jwt: JwtSigner,
    pub max_frame_bytes: u32,
}

impl GatewayState {
    pub fn new(api: Arc<dyn ApiGatewayClient>, jwt: JwtSigner, max_frame_bytes: u32) -> Arc<Self> {
        Arc::new(Self {
            conn_mgr: ConnManager::new(),
            api,
            jwt,
            max_frame_bytes,
        })
    }
}
