//! Bridges the domain-level [`imcore_discovery::DiscoveryService`] to the
//! generated tonic `Discovery` service trait.

use std::sync::Arc;

use tonic::{Request, Response, Status};

use imcore_discovery::{DiscoveryService, Error as DiscoveryError};
use imcore_rpc::pb::discovery_server::Discovery;
use imcore_rpc::pb::{
    DeregisterRequest, DeregisterResponse, GetServiceIpRequest, GetServiceIpResponse,
    GetServiceRequest, GetServiceResponse, ReadyRequest, ReadyResponse, RegisterRequest,
    RegisterResponse, ServiceInfo as PbServiceInfo,
};

pub struct DiscoveryRpcService {
    inner: Arc<DiscoveryService>,
}

impl DiscoveryRpcService {
    pub fn new(inner: Arc<DiscoveryService>) -> Self {
        Self { inner }
    }
}

fn to_status(err: DiscoveryError) -> Status {
    match err {
        DiscoveryError::AlreadyExists(name) => Status::already_exists(name),
        DiscoveryError::NotFound(name) => Status::not_found(name),
        DiscoveryError::Unavailable => Status::unavailable("discovery cache not ready"),
        DiscoveryError::Redis(source) => Status::internal(source.to_string()),
    }
}

#[tonic::async_trait]
impl Discovery for DiscoveryRpcService {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<RegisterResponse>, Status> {
        let req = request.into_inner();
        self.inner
            .register(&req.service_name, &req.address, &req.port)
            .await
            .map_err(to_status)?;
        Ok(Response::new(RegisterResponse {}))
    }

    async fn deregister(
        &self,
        request: Request<DeregisterRequest>,
    ) -> Result<Response<DeregisterResponse>, Status> {
        let req = request.into_inner();
        self.inner
            .deregister(&req.service_name, &req.address, &req.port)
            .await
            .map_err(to_status)?;
        Ok(Response::new(DeregisterResponse {}))
    }

    async fn get_service(
        &self,
        request: Request<GetServiceRequest>,
    ) -> Result<Response<GetServiceResponse>, Status> {
        let req = request.into_inner();
        let services = self.inner.get_service(&req.service_name).await.map_err(to_status)?;
        Ok(Response::new(GetServiceResponse {
            services: services
                .into_iter()
                .map(|s| PbServiceInfo {
                    address: s.address,
                    port: s.port,
                })
                .collect(),
        }))
    }

    async fn get_service_ip(
        &self,
        request: Request<GetServiceIpRequest>,
    ) -> Result<Response<GetServiceIpResponse>, Status> {
        let req = request.into_inner();
        let service = self
            .inner
            .get_service_ip(&req.service_name, &req.client_key)
            .await
            .map_err(to_status)?;
        Ok(Response::new(GetServiceIpResponse {
            service: Some(PbServiceInfo {
                address: service.address,
                port: service.port,
            }),
        }))
    }

    async fn ready(&self, _request: Request<ReadyRequest>) -> Result<Response<ReadyResponse>, Status> {
        Ok(Response::new(ReadyResponse {
            ready: self.inner.ready(),
        }))
    }
}
