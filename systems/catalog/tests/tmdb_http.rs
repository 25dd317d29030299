use std::{
    io::{Read, Write},
    net::TcpListener,
    sync::mpsc,
    thread,
    time::Duration,
};

use storyworld_system_catalog::{CatalogError, CatalogSource, TmdbCatalog};

/// Serves exactly one HTTP response and reports the request line it received.
fn serve_once(status: &'static str, body: &'static str) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let address = listener.local_addr().expect("local addr");
    let (sender, receiver) = mpsc::channel();

    let _server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut buffer = [0_u8; 4096];
        let read = stream.read(&mut buffer).expect("read request");
        let request = String::from_utf8_lossy(&buffer[..read]).into_owned();
        let request_line = request.lines().next().unwrap_or_default().to_owned();
        sender.send(request_line).expect("report request");

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).expect("write response");
    });

    (format!("http://{address}/3"), receiver)
}

#[tokio::test]
async fn discover_request_carries_genres_and_page() {
    let (base_url, requests) = serve_once(
        "200 OK",
        r#"{"page":2,"total_pages":40,"results":[{"id":1,"title":"A","overview":"","genre_ids":[28],"poster_path":"/a.jpg"}]}"#,
    );
    let catalog =
        TmdbCatalog::with_endpoint("secret", base_url, Duration::from_secs(5)).expect("client");

    let page = catalog.fetch_page(&[28, 12, 37], 2).await.expect("page");
    assert_eq!(page.total_pages, 40);
    assert_eq!(page.items.len(), 1);

    let request_line = requests.recv().expect("request seen");
    assert!(request_line.starts_with("GET /3/discover/movie?"), "{request_line}");
    assert!(request_line.contains("api_key=secret"), "{request_line}");
    assert!(
        request_line.contains("with_genres=28%2C12%2C37"),
        "{request_line}"
    );
    assert!(request_line.contains("page=2"), "{request_line}");
}

#[tokio::test]
async fn error_statuses_are_reported() {
    let (base_url, _requests) = serve_once("401 Unauthorized", r#"{"status_code":7}"#);
    let catalog =
        TmdbCatalog::with_endpoint("wrong", base_url, Duration::from_secs(5)).expect("client");

    let error = catalog.fetch_page(&[35], 1).await.expect_err("unauthorized");
    assert_eq!(error, CatalogError::Status(401));
}

#[tokio::test]
async fn silent_servers_time_out() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let address = listener.local_addr().expect("local addr");
    let catalog = TmdbCatalog::with_endpoint(
        "key",
        format!("http://{address}/3"),
        Duration::from_millis(200),
    )
    .expect("client");

    let error = catalog.fetch_page(&[35], 1).await.expect_err("no response");
    assert_eq!(error, CatalogError::Timeout);
    drop(listener);
}

#[tokio::test]
async fn refused_connections_are_transport_errors() {
    let address = TcpListener::bind("127.0.0.1:0")
        .expect("bind")
        .local_addr()
        .expect("local addr");
    let catalog = TmdbCatalog::with_endpoint(
        "key",
        format!("http://{address}/3"),
        Duration::from_secs(5),
    )
    .expect("client");

    let error = catalog.fetch_page(&[35], 1).await.expect_err("nothing listening");
    assert!(matches!(error, CatalogError::Transport(_)), "{error:?}");
}
