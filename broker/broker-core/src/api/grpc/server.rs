//! gRPC service implementation of `RegistrationBroker`.

use std::pin::Pin;

use broker_contracts::model::{GetModuleSchemaRequest as DomainSchemaRequest, ResolveRequest};
use broker_proto::v1 as pb;
use futures::Stream;
use tonic::{Request, Response, Status};

use super::convert::{
    catalog_snapshot_to_list_response, domain_error_to_status, identifier_from_module_request,
    identifier_from_service_request,
};
use crate::domain::{DiscoveryQueryService, RegistrationCoordinator};

type EventStream = Pin<Box<dyn Stream<Item = Result<pb::RegisterResponse, Status>> + Send + 'static>>;
type WatchStream = Pin<Box<dyn Stream<Item = Result<pb::ListServicesResponse, Status>> + Send + 'static>>;
type ModuleWatchStream = Pin<Box<dyn Stream<Item = Result<pb::ListModulesResponse, Status>> + Send + 'static>>;

/// Wraps the coordinator and discovery-query domain services behind the
/// generated `RegistrationBroker` trait.
#[derive(Clone)]
pub struct BrokerGrpcService {
    coordinator: RegistrationCoordinator,
    discovery_query: DiscoveryQueryService,
}

impl BrokerGrpcService {
    #[must_use]
    pub fn new(coordinator: RegistrationCoordinator, discovery_query: DiscoveryQueryService) -> Self {
        Self { coordinator, discovery_query }
    }
}

#[tonic::async_trait]
impl pb::RegistrationBroker for BrokerGrpcService {
    type RegisterStream = EventStream;
    type WatchServicesStream = WatchStream;
    type WatchModulesStream = ModuleWatchStream;

    async fn register(&self, request: Request<pb::RegisterRequest>) -> Result<Response<Self::RegisterStream>, Status> {
        let domain_request = broker_contracts::model::RegisterRequest::try_from(request.into_inner())?;
        let events = self.coordinator.register(domain_request);
        let mapped = tokio_stream::StreamExt::map(events, |event| Ok(pb::RegisterResponse { event: Some(event.into()) }));
        Ok(Response::new(Box::pin(mapped)))
    }

    async fn unregister(&self, request: Request<pb::UnregisterRequest>) -> Result<Response<pb::UnregisterResponse>, Status> {
        let service_id = request.into_inner().service_id;
        let (name, host, port) = split_service_id(&service_id)?;
        let response = self
            .coordinator
            .unregister(&name, &host, port)
            .await
            .map_err(|err| domain_error_to_status(&err))?;
        Ok(Response::new(response.into()))
    }

    async fn list_services(
        &self,
        request: Request<pb::ListServicesRequest>,
    ) -> Result<Response<pb::ListServicesResponse>, Status> {
        let name_filter = request.into_inner().name_filter;
        let filter = (!name_filter.is_empty()).then_some(name_filter.as_str());
        let snapshot = self.discovery_query.list_services(filter).await.map_err(|err| domain_error_to_status(&err))?;
        let (entries, as_of_unix_millis, total_count) = catalog_snapshot_to_list_response(snapshot);
        Ok(Response::new(pb::ListServicesResponse { entries, as_of_unix_millis, total_count }))
    }

    async fn list_modules(
        &self,
        request: Request<pb::ListModulesRequest>,
    ) -> Result<Response<pb::ListModulesResponse>, Status> {
        let name_filter = request.into_inner().name_filter;
        let filter = (!name_filter.is_empty()).then_some(name_filter.as_str());
        let snapshot = self.discovery_query.list_modules(filter).await.map_err(|err| domain_error_to_status(&err))?;
        let (entries, as_of_unix_millis, total_count) = catalog_snapshot_to_list_response(snapshot);
        Ok(Response::new(pb::ListModulesResponse { entries, as_of_unix_millis, total_count }))
    }

    async fn get_service(&self, request: Request<pb::GetServiceRequest>) -> Result<Response<pb::ServiceInstance>, Status> {
        let (identifier, by_id) = identifier_from_service_request(request.into_inner())?;
        let entry = if by_id {
            self.discovery_query.get_service_by_id(&identifier).await
        } else {
            self.discovery_query.get_service_by_name(&identifier).await
        }
        .map_err(|err| domain_error_to_status(&err))?;
        Ok(Response::new(entry.into()))
    }

    async fn get_module(&self, request: Request<pb::GetModuleRequest>) -> Result<Response<pb::ServiceInstance>, Status> {
        let (identifier, by_id) = identifier_from_module_request(request.into_inner())?;
        let entry = if by_id {
            self.discovery_query.get_module_by_id(&identifier).await
        } else {
            self.discovery_query.get_module_by_name(&identifier).await
        }
        .map_err(|err| domain_error_to_status(&err))?;
        Ok(Response::new(entry.into()))
    }

    async fn resolve_service(
        &self,
        request: Request<pb::ResolveServiceRequest>,
    ) -> Result<Response<pb::ResolveServiceResponse>, Status> {
        let domain_request = ResolveRequest::from(request.into_inner());
        let response =
            self.discovery_query.resolve(&domain_request).await.map_err(|err| domain_error_to_status(&err))?;
        Ok(Response::new(response.into()))
    }

    async fn watch_services(
        &self,
        request: Request<pb::WatchServicesRequest>,
    ) -> Result<Response<Self::WatchServicesStream>, Status> {
        let name_filter = request.into_inner().name_filter;
        let filter = (!name_filter.is_empty()).then(|| name_filter.clone());
        let snapshots = self.discovery_query.watch_services(filter);
        let mapped = tokio_stream::StreamExt::map(snapshots, |snapshot| {
            let (entries, as_of_unix_millis, total_count) = catalog_snapshot_to_list_response(snapshot);
            Ok(pb::ListServicesResponse { entries, as_of_unix_millis, total_count })
        });
        Ok(Response::new(Box::pin(mapped)))
    }

    async fn watch_modules(
        &self,
        request: Request<pb::WatchModulesRequest>,
    ) -> Result<Response<Self::WatchModulesStream>, Status> {
        let name_filter = request.into_inner().name_filter;
        let filter = (!name_filter.is_empty()).then(|| name_filter.clone());
        let snapshots = self.discovery_query.watch_modules(filter);
        let mapped = tokio_stream::StreamExt::map(snapshots, |snapshot| {
            let (entries, as_of_unix_millis, total_count) = catalog_snapshot_to_list_response(snapshot);
            Ok(pb::ListModulesResponse { entries, as_of_unix_millis, total_count })
        });
        Ok(Response::new(Box::pin(mapped)))
    }

    async fn get_module_schema(
        &self,
        request: Request<pb::GetModuleSchemaRequest>,
    ) -> Result<Response<pb::GetModuleSchemaResponse>, Status> {
        let domain_request = DomainSchemaRequest::from(request.into_inner());
        let response = self
            .discovery_query
            .get_module_schema(&domain_request)
            .await
            .map_err(|err| domain_error_to_status(&err))?;
        Ok(Response::new(response.into()))
    }

    async fn get_module_schema_versions(
        &self,
        request: Request<pb::GetModuleSchemaVersionsRequest>,
    ) -> Result<Response<pb::GetModuleSchemaVersionsResponse>, Status> {
        // Only the latest version is ever resolved through the cascade;
        // this RPC reports it as the sole known version.
        let module_name = request.into_inner().module_name;
        let domain_request = DomainSchemaRequest { module_name, version: None };
        let versions = match self.discovery_query.get_module_schema(&domain_request).await {
            Ok(resp) => vec![resp.schema_version],
            Err(err) if err.is_not_found() => vec![],
            Err(err) => return Err(domain_error_to_status(&err)),
        };
        Ok(Response::new(pb::GetModuleSchemaVersionsResponse { versions }))
    }
}

/// `Unregister` only carries `service_id` over the wire; recover
/// `(name, host, port)` via the same last-two-dashes rule used for lookup.
fn split_service_id(service_id: &str) -> Result<(String, String, u16), Status> {
    let mut parts = service_id.rsplitn(3, '-');
    let port = parts.next().ok_or_else(|| Status::invalid_argument("malformed service_id"))?;
    let host = parts.next().ok_or_else(|| Status::invalid_argument("malformed service_id"))?;
    let name = parts.next().ok_or_else(|| Status::invalid_argument("malformed service_id"))?;
    let port: u16 = port.parse().map_err(|_| Status::invalid_argument("malformed service_id: bad port"))?;
    Ok((name.to_string(), host.to_string(), port))
}

