//! Protected resource loading integration tests
//!
//! Covers handle accounting across a consumer's lifetime and late responses
//! arriving after the consumer switched locators.

use std::sync::Arc;

use garden_sync::resource::BLOB_URI_PREFIX;
use garden_sync::{
    BaseUrl, BlobRegistry, Credential, Method, MockResponse, MockTransport, ResourceLoader,
    ResourceStatus, SyncConfig,
};

fn loader(mock: &Arc<MockTransport>, registry: &BlobRegistry) -> ResourceLoader {
    ResourceLoader::new(
        mock.clone(),
        registry.clone(),
        BaseUrl::new("https://api.jardinbotanico.org"),
        &SyncConfig::default(),
    )
}

#[tokio::test]
async fn test_every_handle_released_after_teardown() {
    let mock = Arc::new(MockTransport::new());
    for name in ["a", "b", "c"] {
        mock.on(
            Method::Get,
            &format!("/photos/file/{}.jpg", name),
            MockResponse::bytes(200, name.as_bytes().to_vec(), "image/jpeg"),
        );
    }
    mock.on(Method::Get, "/photos/file/missing.jpg", MockResponse::status(404));

    let registry = BlobRegistry::new();
    let loader = loader(&mock, &registry);
    let credential = Credential::from_context("tok");

    for locator in [
        "/photos/file/a.jpg",
        "/photos/file/b.jpg",
        "/photos/file/missing.jpg",
        "https://cdn.example.org/logo.png",
        "/photos/file/c.jpg",
    ] {
        loader.load(locator, Some(&credential)).await.unwrap();
        assert!(registry.stats().live() <= 1);
    }

    let current = loader.current().unwrap();
    assert_eq!(current.status, ResourceStatus::Ready);
    let src = current.src.unwrap();
    assert!(src.starts_with(BLOB_URI_PREFIX));
    assert_eq!(registry.get(&src).unwrap().bytes.as_slice(), b"c");

    loader.teardown();
    let stats = registry.stats();
    assert_eq!(stats.created, 3);
    assert_eq!(stats.released, 3);
    assert!(registry.get(&src).is_none());
}

#[tokio::test]
async fn test_late_response_creates_no_handle() {
    let mock = Arc::new(MockTransport::new());
    mock.on(Method::Get, "/photos/file/old.jpg", MockResponse::bytes(200, vec![1], "image/png"))
        .on(Method::Get, "/photos/file/new.jpg", MockResponse::bytes(200, vec![2], "image/png"));
    let release = mock.hold(Method::Get, "/photos/file/old.jpg");

    let registry = BlobRegistry::new();
    let loader = loader(&mock, &registry);

    let (old, new) = tokio::join!(loader.load("/photos/file/old.jpg", None), async {
        while mock.request_count() == 0 {
            tokio::task::yield_now().await;
        }
        let view = loader.load("/photos/file/new.jpg", None).await;
        release.notify_one();
        view
    });

    assert!(old.is_none());
    let new = new.unwrap();
    assert_eq!(new.locator, "/photos/file/new.jpg");
    assert_eq!(registry.stats().created, 1);
    assert_eq!(loader.current().unwrap().locator, "/photos/file/new.jpg");
}

#[tokio::test]
async fn test_teardown_while_in_flight() {
    let mock = Arc::new(MockTransport::new());
    mock.on(Method::Get, "/photos/file/a.jpg", MockResponse::bytes(200, vec![1], "image/png"));
    let release = mock.hold(Method::Get, "/photos/file/a.jpg");

    let registry = BlobRegistry::new();
    let loader = loader(&mock, &registry);

    let (view, _) = tokio::join!(loader.load("/photos/file/a.jpg", None), async {
        while mock.request_count() == 0 {
            tokio::task::yield_now().await;
        }
        loader.teardown();
        release.notify_one();
    });

    assert!(view.is_none());
    assert_eq!(registry.stats().created, 0);
    assert!(loader.current().is_none());
}
