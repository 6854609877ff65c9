//! Server tests over a real TCP listener

use std::time::{Duration, Instant};

use cache_test_backend::{Error, backend::Server, config::Config};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

async fn raw_get(addr: std::net::SocketAddr, path: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    stream
}

async fn read_response(mut stream: TcpStream) -> String {
    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .expect("response within 5s")
        .unwrap();
    response
}

#[tokio::test]
async fn serves_shaped_response() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let server = tokio::spawn(Server::new(Config::default()).serve(listener, async {
        let _ = rx.await;
    }));

    let response = read_response(raw_get(addr, "/api/max-age-header/30/status/302/timing/0").await).await;
    let lower = response.to_ascii_lowercase();

    assert!(response.starts_with("HTTP/1.1 302"), "{response}");
    assert!(lower.contains("cache-control: max-age=30"), "{response}");
    assert!(response.contains(r#""isCacheableHeaderSet":true"#), "{response}");

    tx.send(()).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_interrupts_running_delay() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(Config::default());
    let gate = server.gate();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve(listener, async {
        let _ = rx.await;
    }));

    let stream = raw_get(addr, "/api/timing/30").await;
    for _ in 0..500 {
        if gate.in_flight() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(gate.in_flight(), 1);

    let started = Instant::now();
    tx.send(()).unwrap();
    let response = read_response(stream).await;

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(started.elapsed() < Duration::from_secs(5));
    handle.await.unwrap().unwrap();
    assert_eq!(gate.available(), gate.capacity());
}

#[tokio::test]
async fn run_rejects_invalid_host() {
    let mut config = Config::default();
    config.server.host = "not a host".to_string();

    let err = Server::new(config).run().await.unwrap_err();
    assert!(matches!(err, Error::Config(msg) if msg.contains("Invalid host")));
}
