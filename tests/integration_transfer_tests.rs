use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use davsync::{
    DavClient, DavConfig, ProgressFn, RemotePath, ServerType, StaticCredentials, TransferError,
};
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_client(server_url: String) -> DavClient {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
    let config = DavConfig::new(server_url, "testuser".to_string(), ServerType::Generic);
    let credentials = StaticCredentials::basic("testuser", "testpass");
    DavClient::new(config, credentials).expect("Failed to create WebDAV client")
}

#[tokio::test]
async fn test_mkcol_creates_collection() {
    let mock_server = MockServer::start().await;

    Mock::given(method("MKCOL"))
        .and(path("/Projects"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(mock_server.uri());
    let folder = RemotePath::new("/Projects").unwrap();
    client.mkcol(&folder).await.expect("MKCOL should succeed");
}

#[tokio::test]
async fn test_copy_sends_destination_and_overwrite() {
    let mock_server = MockServer::start().await;

    let destination_url = format!("{}/backup/report.pdf", mock_server.uri());
    Mock::given(method("COPY"))
        .and(path("/report.pdf"))
        .and(header("Destination", destination_url.as_str()))
        .and(header("Overwrite", "T"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(mock_server.uri());
    let source = RemotePath::new("/report.pdf").unwrap();
    let destination = RemotePath::new("/backup/report.pdf").unwrap();
    client.copy(&source, &destination).await.expect("COPY should succeed");
}

#[tokio::test]
async fn test_move_sends_destination_and_overwrite() {
    let mock_server = MockServer::start().await;

    let destination_url = format!("{}/renamed.txt", mock_server.uri());
    Mock::given(method("MOVE"))
        .and(path("/old.txt"))
        .and(header("Destination", destination_url.as_str()))
        .and(header("Overwrite", "T"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(mock_server.uri());
    let source = RemotePath::new("/old.txt").unwrap();
    let destination = RemotePath::new("/renamed.txt").unwrap();
    client.mv(&source, &destination).await.expect("MOVE should succeed");
}

#[tokio::test]
async fn test_delete_resource() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/obsolete.txt"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(mock_server.uri());
    let target = RemotePath::new("/obsolete.txt").unwrap();
    client.delete(&target).await.expect("DELETE should succeed");
}

#[tokio::test]
async fn test_get_returns_body_and_reports_progress() {
    let mock_server = MockServer::start().await;

    let payload = "the quick brown fox jumps over the lazy dog";
    Mock::given(method("GET"))
        .and(path("/fox.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(payload))
        .mount(&mock_server)
        .await;

    let client = create_test_client(mock_server.uri());
    let file = RemotePath::new("/fox.txt").unwrap();

    let reports: Arc<Mutex<Vec<(u64, Option<u64>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    let progress: ProgressFn = Arc::new(move |transferred, total| {
        sink.lock().unwrap().push((transferred, total));
    });

    let body = client.get(&file, Some(progress)).await.unwrap();
    assert_eq!(body, Bytes::from_static(payload.as_bytes()));

    let reports = reports.lock().unwrap();
    assert!(!reports.is_empty());
    let expected = payload.len() as u64;
    let mut previous = 0;
    for (transferred, total) in reports.iter() {
        assert!(*transferred >= previous);
        assert_eq!(*total, Some(expected));
        previous = *transferred;
    }
    assert_eq!(reports.last().unwrap().0, expected);
}

#[tokio::test]
async fn test_put_streams_exact_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/upload.txt"))
        .and(body_string("payload bytes"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(mock_server.uri());
    let target = RemotePath::new("/upload.txt").unwrap();
    client
        .put(&target, Bytes::from_static(b"payload bytes"), None)
        .await
        .expect("PUT should succeed");
}

#[tokio::test]
async fn test_put_reports_final_progress() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/counted.bin"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&mock_server)
        .await;

    let client = create_test_client(mock_server.uri());
    let target = RemotePath::new("/counted.bin").unwrap();

    let reports: Arc<Mutex<Vec<(u64, Option<u64>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    let progress: ProgressFn = Arc::new(move |transferred, total| {
        sink.lock().unwrap().push((transferred, total));
    });

    client
        .put(&target, Bytes::from(vec![7u8; 2048]), Some(progress))
        .await
        .unwrap();

    let reports = reports.lock().unwrap();
    assert!(!reports.is_empty());
    assert_eq!(reports.last().unwrap(), &(2048, Some(2048)));
}

#[tokio::test]
async fn test_server_error_is_recoverable_with_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky.txt"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(mock_server.uri());
    let file = RemotePath::new("/flaky.txt").unwrap();
    let err = client.get(&file, None).await.unwrap_err();

    match err {
        TransferError::Recoverable { status, .. } => {
            assert_eq!(status.map(|s| s.as_u16()), Some(503));
        }
        other => panic!("expected a recoverable error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cancel_all_aborts_in_flight_download() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0u8; 1024])
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&mock_server)
        .await;

    let client = create_test_client(mock_server.uri());
    let file = RemotePath::new("/slow.bin").unwrap();

    let worker = client.clone();
    let handle = tokio::spawn(async move { worker.get(&file, None).await });

    // Let the request reach the server before pulling the plug.
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.cancel_all();

    let result = handle.await.expect("task should not panic");
    assert!(matches!(result, Err(TransferError::Cancelled)));
}
