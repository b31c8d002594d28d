// Shared primitives for one-time server bootstrapping across integration tests.
use std::{
    net::SocketAddr,
    // `Arc` shares data between threads; `OnceLock` writes a value only once.
    sync::{Arc, OnceLock},
    // Sleep durations are used in readiness polling loops.
    time::Duration,
};

use battleship_server::interface_adapters::codec::{self, Payload};
use tokio::net::TcpStream;

/// A thin wrapper over a raw connection to the test server, for driving the wire
/// protocol directly instead of going through a generated client.
pub struct TestClient {
    socket: TcpStream,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let socket = TcpStream::connect(addr).await.expect("connect to test server");
        Self { socket }
    }

    pub async fn send(&mut self, msg_type: u16, payload: &Payload) {
        codec::send_message(&mut self.socket, msg_type, payload)
            .await
            .expect("send frame");
    }

    pub async fn recv(&mut self) -> (u16, Payload) {
        codec::recv_message(&mut self.socket)
            .await
            .expect("recv frame")
    }
}

// Global address used by all tests after the server publishes its bound socket.
static SERVER_ADDR: OnceLock<SocketAddr> = OnceLock::new();
// One-time guard that ensures the server bootstrap path runs only once.
static SERVER_READY: OnceLock<()> = OnceLock::new();

// Ensure the test server is running and return the shared listen address.
pub fn ensure_server() -> SocketAddr {
    // Run initialization exactly once even if multiple tests call this function.
    SERVER_READY.get_or_init(|| {
        // Local one-time slot where the server thread publishes its bound address.
        let published_addr = Arc::new(OnceLock::<SocketAddr>::new());
        // Clone so the spawned thread can write into the same shared slot.
        let published_addr_thread = Arc::clone(&published_addr);
        // Spawn an OS thread so the server outlives individual `#[tokio::test]` runtimes.
        std::thread::spawn(move || {
            // Each server thread owns its own Tokio runtime.
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            // Run async server startup and serving on this dedicated runtime.
            runtime.block_on(async move {
                // Bind to an ephemeral port to avoid collisions with local services.
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                // Capture the exact address that was assigned by the OS.
                let addr = listener.local_addr().expect("get local addr");
                // Publish the address so test code can target the right server.
                let _ = published_addr_thread.set(addr);
                // Start serving requests until the test process exits.
                battleship_server::run(listener).await.expect("server failed");
            });
        });
        // Block until the address is published and the socket starts accepting.
        wait_for_server_readiness(published_addr);
    });

    // Return the stable shared address used by every test in this binary.
    *SERVER_ADDR.get().expect("server address should be initialized")
}

// Wait for address publication and then wait for the server socket to accept TCP
// connections.
fn wait_for_server_readiness(published_addr: Arc<OnceLock<SocketAddr>>) {
    // Poll until the server thread publishes the bound address.
    let addr = loop {
        if let Some(addr) = published_addr.get() {
            break *addr;
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    // Persist the address globally so every test gets the same endpoint.
    let _ = SERVER_ADDR.set(addr);

    // Retry for a short period to avoid racing server bind/accept.
    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    // Fail fast if startup never reached an accepting state.
    panic!("server did not become ready in time");
}
