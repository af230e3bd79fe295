//! Skips wiremock-based tests where localhost sockets cannot be bound.
//!
//! Set `BATCHFETCH_REQUIRE_SOCKET_TESTS=1` to turn a skip into a failure.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "BATCHFETCH_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Starts a mock server, or returns `None` (after logging why) when the
/// environment forbids binding a localhost socket.
#[track_caller]
pub fn mock_server_or_skip() -> impl Future<Output = Option<MockServer>> {
    let location = Location::caller();
    let bindable = TcpListener::bind("127.0.0.1:0").is_ok();
    async move {
        if bindable {
            return Some(MockServer::start().await);
        }
        let message = format!(
            "[socket-bound-test] cannot bind localhost socket at {}:{}",
            location.file(),
            location.line()
        );
        assert!(
            !sockets_required(),
            "{message}. Unset {REQUIRE_ENV} to allow skipping."
        );
        eprintln!("{message}. Skipping test. Set {REQUIRE_ENV}=1 to fail instead.");
        None
    }
}
