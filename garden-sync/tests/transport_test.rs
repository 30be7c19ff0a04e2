//! HTTP transport tests against a local wiremock server

use std::sync::Arc;

use garden_sync::{
    ApiRequest, AssociationSession, AssociationSyncClient, AvailabilityStore, BaseUrl,
    EndpointAvailability, FetchOutcome, GardenApiClient, HttpTransport, Method, RequestBody,
    ReqwestTransport, SectorId, SyncConfig, SyncError,
};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport() -> Arc<ReqwestTransport> {
    Arc::new(ReqwestTransport::new(&SyncConfig::default()).unwrap())
}

#[tokio::test]
async fn test_bearer_and_csrf_headers_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/species/staff"))
        .and(header("Authorization", "Bearer tok"))
        .and(header("X-CSRFToken", "csrf-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let request = ApiRequest::get(format!("{}/species/staff", server.uri()))
        .with_bearer(Some("tok".into()))
        .with_csrf(Some("csrf-1".into()));
    let response = transport().send(request).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn test_json_body_and_error_statuses_returned() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/sectors/staff/2/species"))
        .and(body_json(json!({"especie_ids": [1, 2]})))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"detail": "bad ids"})))
        .mount(&server)
        .await;

    let request = ApiRequest::new(Method::Put, format!("{}/sectors/staff/2/species", server.uri()))
        .with_body(RequestBody::Json(json!({"especie_ids": [1, 2]})));
    let response = transport().send(request).await.unwrap();

    assert_eq!(response.status, 400);
    match response.into_error() {
        SyncError::Server { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "bad ids");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_client_lists_species_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/species/staff"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id_especie": 1, "nombre_comun": "Ceibo", "nombre_cientifico": "Erythrina crista-galli"}
        ])))
        .mount(&server)
        .await;

    let client = GardenApiClient::new(transport(), BaseUrl::new(server.uri()), SyncConfig::default());
    let species = client.list_species().await.unwrap();

    assert_eq!(species.len(), 1);
    assert_eq!(species[0].common_name, "Ceibo");
}

#[tokio::test]
async fn test_method_not_allowed_closes_gate_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sectors/staff/3/species"))
        .respond_with(ResponseTemplate::new(405))
        .expect(1)
        .mount(&server)
        .await;

    let api = GardenApiClient::new(transport(), BaseUrl::new(server.uri()), SyncConfig::default());
    let sync = AssociationSyncClient::new(Arc::new(api), Arc::new(AvailabilityStore::new()));
    let session = AssociationSession::new();

    assert_eq!(
        sync.fetch_associations(&session, SectorId(3)).await.unwrap(),
        FetchOutcome::VersionSkew
    );
    assert_eq!(
        sync.fetch_associations(&session, SectorId(3)).await.unwrap(),
        FetchOutcome::Skipped
    );
    assert_eq!(sync.availability(), EndpointAvailability::Unavailable);
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let request = ApiRequest::get("http://127.0.0.1:9/species/staff");
    let err = transport().send(request).await.unwrap_err();
    assert!(matches!(err, SyncError::Network(_)));
    assert!(err.is_recoverable());
}
