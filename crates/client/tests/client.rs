//! End-to-end tests against scripted loopback servers.
//!
//! Each test binds a real `TcpListener`, serves hand-written HTTP/1.1
//! responses, and checks the client's pooling and release behavior by
//! counting accepted connections.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use http::{HeaderMap, Method, StatusCode, Version};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use micro_client::client::{ClientConfig, HttpClient, RequestBody};
use micro_client::protocol::ClientError;

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn client(port: u16) -> HttpClient {
    HttpClient::new("127.0.0.1", port, ClientConfig::default()).unwrap()
}

/// Reads one request head (and any `Content-Length` body) off the stream.
async fn read_request(stream: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut block = [0u8; 1024];
    let mut body_expected = None;

    loop {
        if let Some(head_end) = find(&buf, b"\r\n\r\n") {
            let body_start = head_end + 4;
            let expected = *body_expected.get_or_insert_with(|| content_length_of(&buf[..head_end]));
            if buf.len() - body_start >= expected {
                return buf;
            }
        }
        let n = stream.read(&mut block).await.unwrap();
        if n == 0 {
            return buf;
        }
        buf.extend_from_slice(&block[..n]);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn content_length_of(head: &[u8]) -> usize {
    let text = String::from_utf8_lossy(head);
    text.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Serves `responses.len()` requests on a single accepted connection.
async fn serve_one_connection(listener: TcpListener, responses: Vec<&'static [u8]>) {
    let (mut stream, _) = listener.accept().await.unwrap();
    for response in responses {
        read_request(&mut stream).await;
        stream.write_all(response).await.unwrap();
        stream.flush().await.unwrap();
    }
}

/// Accepts connections forever, serving every request on each with the same
/// response and counting connections as they arrive.
fn serve_counting(listener: TcpListener, response: &'static [u8], connections: Arc<AtomicUsize>) {
    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else { return };
            connections.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                loop {
                    let request = read_request(&mut stream).await;
                    if request.is_empty() {
                        return;
                    }
                    if stream.write_all(response).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
}

#[tokio::test]
async fn keep_alive_reuses_one_socket() {
    let (listener, port) = bind().await;
    let connections = Arc::new(AtomicUsize::new(0));
    serve_counting(listener, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok", connections.clone());

    let client = client(port);
    for _ in 0..3 {
        let mut response = client.get("/").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&response.body().await.unwrap()[..], b"ok");
        assert!(response.should_keep_alive());
        response.release();
    }

    assert_eq!(connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn connection_close_discards_socket_but_body_reads() {
    let (listener, port) = bind().await;
    let connections = Arc::new(AtomicUsize::new(0));
    serve_counting(
        listener,
        b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 5\r\nConnection: close\r\n\r\noops!",
        connections.clone(),
    );

    let client = client(port);
    for _ in 0..2 {
        let mut response = client.get("/").await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        // the body is still fully readable despite the forced close
        assert_eq!(&response.body().await.unwrap()[..], b"oops!");
        assert!(!response.should_keep_alive());
        assert!(response.should_close());
        response.release();
    }

    // no reuse across `Connection: close`
    assert_eq!(connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn truncated_body_is_a_connection_closed_error() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request(&mut stream).await;
        stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial").await.unwrap();
        stream.shutdown().await.unwrap();
    });

    let client = client(port);
    let mut response = client.get("/").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let err = response.body().await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed { .. }), "got {err:?}");
    assert!(response.should_close());
}

#[tokio::test]
async fn chunked_body_end_to_end() {
    let (listener, port) = bind().await;
    tokio::spawn(serve_one_connection(
        listener,
        vec![
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
              5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        ],
    ));

    let client = client(port);
    let mut response = client.get("/").await.unwrap();
    assert_eq!(&response.body().await.unwrap()[..], b"hello world");
    assert!(response.should_keep_alive());
    response.release();
}

#[tokio::test]
async fn incremental_reads_and_readline() {
    let (listener, port) = bind().await;
    tokio::spawn(serve_one_connection(
        listener,
        vec![b"HTTP/1.1 200 OK\r\nContent-Length: 13\r\n\r\nalpha\nbeta\ngo"],
    ));

    let client = client(port);
    let mut response = client.get("/").await.unwrap();

    assert_eq!(&response.readline(b"\n").await.unwrap()[..], b"alpha\n");
    assert_eq!(&response.read(4).await.unwrap()[..], b"beta");
    assert_eq!(&response.readline(b"\n").await.unwrap()[..], b"\n");
    // past the last separator: the remainder comes back
    assert_eq!(&response.readline(b"\n").await.unwrap()[..], b"go");
    // exhausted body reads empty
    assert!(response.read(16).await.unwrap().is_empty());
    assert!(response.message_complete());
}

#[tokio::test]
async fn head_response_with_framing_headers_has_no_body_and_closes() {
    let (listener, port) = bind().await;
    let connections = Arc::new(AtomicUsize::new(0));
    serve_counting(listener, b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\n", connections.clone());

    let client = client(port);
    let mut response = client.head("/").await.unwrap();
    assert_eq!(response.content_length(), Some(10));
    assert!(response.body().await.unwrap().is_empty());
    // declared framing on a bodyless response: too ambiguous to reuse
    assert!(response.should_close());
    response.release();

    let mut second = client.head("/").await.unwrap();
    assert!(second.body().await.unwrap().is_empty());
    second.release();

    assert_eq!(connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn no_content_response_keeps_alive() {
    let (listener, port) = bind().await;
    let connections = Arc::new(AtomicUsize::new(0));
    serve_counting(listener, b"HTTP/1.1 204 No Content\r\n\r\n", connections.clone());

    let client = client(port);
    for _ in 0..2 {
        let mut response = client.get("/").await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().await.unwrap().is_empty());
        assert!(response.should_keep_alive());
        response.release();
    }

    assert_eq!(connections.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn http10_body_runs_until_close() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request(&mut stream).await;
        stream.write_all(b"HTTP/1.0 200 OK\r\n\r\nunframed body").await.unwrap();
        stream.shutdown().await.unwrap();
    });

    let client = client(port);
    let mut response = client.get("/").await.unwrap();
    assert_eq!(response.version(), Version::HTTP_10);
    assert_eq!(&response.body().await.unwrap()[..], b"unframed body");
    assert!(response.message_complete());
    assert!(response.should_close());
}

#[tokio::test]
async fn post_sends_body_with_content_length() {
    let (listener, port) = bind().await;
    let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        seen_tx.send(request).unwrap();
        stream.write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n").await.unwrap();
    });

    let client = client(port);
    let mut response = client.post("/submit", "name=value").await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    response.release();

    let request = seen_rx.await.unwrap();
    let text = String::from_utf8(request).unwrap();
    assert!(text.starts_with("POST /submit HTTP/1.1\r\n"), "got {text:?}");
    assert!(text.contains("content-length: 10\r\n"));
    assert!(text.ends_with("\r\n\r\nname=value"));
}

#[tokio::test]
async fn streamed_body_is_copied_to_the_wire() {
    let (listener, port) = bind().await;
    let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        seen_tx.send(request).unwrap();
        stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n").await.unwrap();
    });

    let payload = b"streamed payload".to_vec();
    let body = RequestBody::Stream {
        reader: Box::new(std::io::Cursor::new(payload.clone())),
        length: Some(payload.len() as u64),
    };

    let client = client(port);
    let mut response = client.request(Method::PUT, "/upload", HeaderMap::new(), body).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response.release();

    let text = String::from_utf8(seen_rx.await.unwrap()).unwrap();
    assert!(text.contains("content-length: 16\r\n"));
    assert!(text.ends_with("\r\n\r\nstreamed payload"));
}

#[tokio::test]
async fn stale_pooled_socket_is_retried() {
    let (listener, port) = bind().await;
    let connections = Arc::new(AtomicUsize::new(0));
    {
        let connections = connections.clone();
        tokio::spawn(async move {
            // first connection: one response, then server-side close
            let (mut stream, _) = listener.accept().await.unwrap();
            connections.fetch_add(1, Ordering::SeqCst);
            read_request(&mut stream).await;
            stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await.unwrap();
            stream.shutdown().await.unwrap();
            drop(stream);

            // second connection serves the retried request
            let (mut stream, _) = listener.accept().await.unwrap();
            connections.fetch_add(1, Ordering::SeqCst);
            read_request(&mut stream).await;
            stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nfresh").await.unwrap();
        });
    }

    let client = client(port);

    let mut first = client.get("/").await.unwrap();
    assert_eq!(&first.body().await.unwrap()[..], b"ok");
    assert!(first.should_keep_alive());
    first.release();

    // give the server-side FIN time to land so the pooled socket is stale
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut second = client.get("/").await.unwrap();
    assert_eq!(&second.body().await.unwrap()[..], b"fresh");
    second.release();

    assert_eq!(connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrency_is_bounded_by_pool_size() {
    let (listener, port) = bind().await;
    let connections = Arc::new(AtomicUsize::new(0));
    serve_counting(listener, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok", connections.clone());

    const POOL_SIZE: usize = 2;
    let config = ClientConfig { pool_size: POOL_SIZE, ..Default::default() };
    let client = Arc::new(HttpClient::new("127.0.0.1", port, config).unwrap());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let mut response = client.get("/").await.unwrap();
            assert_eq!(&response.body().await.unwrap()[..], b"ok");
            response.release();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // every request went through at most POOL_SIZE sockets
    assert!(connections.load(Ordering::SeqCst) <= POOL_SIZE);
}

#[tokio::test]
async fn slow_server_hits_network_timeout() {
    let (listener, port) = bind().await;
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        read_request(&mut stream).await;
        // never respond
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(stream);
    });

    let config = ClientConfig { network_timeout: Duration::from_millis(200), ..Default::default() };
    let client = HttpClient::new("127.0.0.1", port, config).unwrap();

    let err = client.get("/").await.unwrap_err();
    assert!(matches!(err, ClientError::NetworkTimeout { .. }), "got {err:?}");
}

#[tokio::test]
async fn dropped_response_never_pools_its_socket() {
    let (listener, port) = bind().await;
    let connections = Arc::new(AtomicUsize::new(0));
    serve_counting(listener, b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nbody", connections.clone());

    let client = client(port);

    // read to completion but drop without releasing
    let mut response = client.get("/").await.unwrap();
    let _ = response.body().await.unwrap();
    drop(response);

    let mut second = client.get("/").await.unwrap();
    assert_eq!(&second.body().await.unwrap()[..], b"body");
    second.release();

    assert_eq!(connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn closed_client_rejects_requests() {
    let (listener, port) = bind().await;
    let connections = Arc::new(AtomicUsize::new(0));
    serve_counting(listener, b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok", connections.clone());

    let client = client(port);
    let mut response = client.get("/").await.unwrap();
    let _ = response.body().await.unwrap();
    response.release();

    client.close();
    assert!(matches!(client.get("/").await, Err(ClientError::PoolClosed)));
}
