use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use ffwd_protocol::ProtocolError;

use super::*;
use crate::connection::LineConnectionFactory;
use crate::peer::{Address, ProtocolFamily};

struct TestDecoder {
    lines: Arc<Mutex<Vec<String>>>,
}

impl FrameDecoder for TestDecoder {
    fn name(&self) -> &'static str {
        "test"
    }

    fn decode_line(&self, line: &str) -> Result<(), ProtocolError> {
        if line.trim().is_empty() || line.starts_with("bad") {
            return Err(ProtocolError::malformed(line.to_string()));
        }
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}

fn test_decoder() -> (Arc<TestDecoder>, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    (
        Arc::new(TestDecoder {
            lines: Arc::clone(&lines),
        }),
        lines,
    )
}

fn loopback_endpoint(family: ProtocolFamily) -> BindEndpoint {
    BindEndpoint::new(
        family,
        Address::Inet {
            host: "127.0.0.1".into(),
            port: 0,
        },
    )
}

fn quick_retry() -> RetryConfig {
    RetryConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        attempt_timeout: None,
        timeout: Some(Duration::from_millis(200)),
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

#[tokio::test]
async fn test_stream_server_parses_lines_per_connection() {
    let (decoder, lines) = test_decoder();
    let server = BindServer::new(
        loopback_endpoint(ProtocolFamily::Tcp),
        Arc::new(LineConnectionFactory::new(decoder)),
        quick_retry(),
    );
    let cancel = CancellationToken::new();

    server.start(cancel.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"one\ntwo\nbad line\nthree\n").await.unwrap();
    stream.shutdown().await.unwrap();

    wait_until(|| lines.lock().len() == 3).await;
    assert_eq!(*lines.lock(), vec!["one", "two", "three"]);

    wait_until(|| server.metrics().snapshot().connections_active == 0).await;
    assert_eq!(server.metrics().snapshot().connections_total, 1);

    cancel.cancel();
}

#[tokio::test]
async fn test_stream_server_survives_malformed_peer() {
    let (decoder, lines) = test_decoder();
    let server = BindServer::new(
        loopback_endpoint(ProtocolFamily::Tcp),
        Arc::new(LineConnectionFactory::new(decoder)),
        quick_retry(),
    );
    let cancel = CancellationToken::new();
    server.start(cancel.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();

    // A peer that only sends garbage does not take the server down
    let mut bad = TcpStream::connect(addr).await.unwrap();
    bad.write_all(b"bad\nbad\n").await.unwrap();
    bad.shutdown().await.unwrap();

    let mut good = TcpStream::connect(addr).await.unwrap();
    good.write_all(b"fine\n").await.unwrap();
    good.shutdown().await.unwrap();

    wait_until(|| lines.lock().len() == 1).await;
    assert_eq!(*lines.lock(), vec!["fine"]);
    assert_eq!(server.metrics().snapshot().connections_total, 2);

    cancel.cancel();
}

#[tokio::test]
async fn test_bind_retry_gives_up_after_timeout() {
    // Hold the port so the bind keeps failing
    let holder = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = holder.local_addr().unwrap().port();

    let (decoder, _) = test_decoder();
    let endpoint = BindEndpoint::new(
        ProtocolFamily::Tcp,
        Address::Inet {
            host: "127.0.0.1".into(),
            port,
        },
    );
    let server = BindServer::new(
        endpoint,
        Arc::new(LineConnectionFactory::new(decoder)),
        quick_retry(),
    );

    let result = server.start(CancellationToken::new()).await;
    assert!(matches!(result, Err(TransportError::Bind { .. })));
}

#[tokio::test]
async fn test_bind_retries_until_port_frees_up() {
    let holder = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = holder.local_addr().unwrap().port();

    // Free the port shortly after the first failed attempts
    tokio::spawn(async move {
        sleep(Duration::from_millis(30)).await;
        drop(holder);
    });

    let (decoder, _) = test_decoder();
    let endpoint = BindEndpoint::new(
        ProtocolFamily::Tcp,
        Address::Inet {
            host: "127.0.0.1".into(),
            port,
        },
    );
    let retry = RetryConfig {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        attempt_timeout: None,
        timeout: Some(Duration::from_secs(5)),
    };
    let server = BindServer::new(
        endpoint,
        Arc::new(LineConnectionFactory::new(decoder)),
        retry,
    );

    server.start(CancellationToken::new()).await.unwrap();
}

#[tokio::test]
async fn test_datagram_server_splits_lines() {
    let (decoder, lines) = test_decoder();
    let server = DatagramServer::new(
        loopback_endpoint(ProtocolFamily::Udp),
        decoder,
        quick_retry(),
    );
    let cancel = CancellationToken::new();
    server.start(cancel.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(b"one\ntwo\n", addr).await.unwrap();
    socket.send_to(b"bad entry\nthree", addr).await.unwrap();

    wait_until(|| lines.lock().len() == 3).await;
    assert_eq!(*lines.lock(), vec!["one", "two", "three"]);
    assert_eq!(server.metrics().snapshot().errors, 1);

    cancel.cancel();
}
