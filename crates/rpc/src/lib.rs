//! gRPC service definitions and client wrappers for the three RPC surfaces
//! the core depends on: the Discovery control plane, the IM Gateway's own
//! `DelConn` surface, and the subset of the API Gateway this gateway calls
//! on behalf of authenticated sockets.

pub mod error;
pub mod testing;

pub use error::{Error, Result};

/// Generated protobuf + tonic service code for all three `.proto` files.
pub mod pb {
    tonic::include_proto!("imcore.rpc");
}

use async_trait::async_trait;
use tonic::transport::{Channel, Endpoint};

pub use pb::api_gateway_client::ApiGatewayClient as RawApiGatewayClient;
pub use pb::discovery_client::DiscoveryClient as RawDiscoveryClient;
pub use pb::im_gateway_client::ImGatewayClient as RawImGatewayClient;
pub use pb::{
    DelConnRequest, DeregisterRequest, GetServiceIpRequest, GetServiceRequest,
    GetSessionUserListRequest, ReadyRequest, RegisterRequest, SendMessageRequest, ServiceInfo,
    SessionUser,
};

/// The API Gateway operations the IM Gateway needs: resolve a session's
/// member list, and persist a message. Implemented by [`ApiGatewayRpcClient`]
/// for production use and by [`testing::MockApiGatewayClient`] for tests.
#[async_trait]
pub trait ApiGatewayClient: Send + Sync {
    async fn get_session_user_list(&self, session_uuid: &str) -> Result<Vec<SessionUser>>;

    #[allow(clippy::too_many_arguments)]
    async fn send_message(
        &self,
        session_uuid: &str,
        sender_uuid: &str,
        payload: Vec<u8>,
        message_type: i32,
        seq_id: i64,
        timestamp: i64,
    ) -> Result<String>;
}

/// A tonic-backed [`ApiGatewayClient`] connected to a single API Gateway
/// endpoint.
#[derive(Clone)]
pub struct ApiGatewayRpcClient {
    inner: RawApiGatewayClient<Channel>,
}

impl ApiGatewayRpcClient {
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint_str = endpoint.into();
        let channel = Endpoint::from_shared(endpoint_str.clone())
            .map_err(|source| Error::Connect {
                endpoint: endpoint_str.clone(),
                source,
            })?
            .connect()
            .await
            .map_err(|source| Error::Connect {
                endpoint: endpoint_str,
                source,
            })?;
        Ok(Self {
            inner: RawApiGatewayClient::new(channel),
        })
    }
}

#[async_trait]
impl ApiGatewayClient for ApiGatewayRpcClient {
    async fn get_session_user_list(&self, session_uuid: &str) -> Result<Vec<SessionUser>> {
        let mut client = self.inner.clone();
        let resp = client
            .get_session_user_list(GetSessionUserListRequest {
                session_uuid: session_uuid.to_string(),
            })
            .await?;
        Ok(resp.into_inner().users)
    }

    async fn send_message(
        &self,
        session_uuid: &str,
        sender_uuid: &str,
        payload: Vec<u8>,
        message_type: i32,
        seq_id: i64,
        timestamp: i64,
    ) -> Result<String> {
        let mut client = self.inner.clone();
        let resp = client
            .send_message(SendMessageRequest {
                session_uuid: session_uuid.to_string(),
                sender_uuid: sender_uuid.to_string(),
                payload,
                message_type,
                seq_id,
                timestamp,
            })
            .await?;
        Ok(resp.into_inner().message_uuid)
    }
}
