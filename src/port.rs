//! Loopback port selection for the child server.
//!
//! This is a check-then-release probe, not a reservation: another process
//! can take the port between the check and the child binding it.

use std::net::{IpAddr, SocketAddr};
use tokio::net::TcpListener;

use crate::config::PortRequest;
use crate::error::LaunchError;

pub const MAX_PORT_ATTEMPTS: u32 = 200;

pub async fn allocate(host: IpAddr, request: PortRequest, base: u16) -> Result<u16, LaunchError> {
    match request {
        PortRequest::Fixed(port) => Ok(port),
        PortRequest::Auto => find_available_port(host, base).await,
    }
}

async fn find_available_port(host: IpAddr, start: u16) -> Result<u16, LaunchError> {
    let mut attempts = 0;
    let mut candidate = Some(start.max(1));
    while let Some(port) = candidate {
        if attempts >= MAX_PORT_ATTEMPTS {
            break;
        }
        attempts += 1;
        match TcpListener::bind(SocketAddr::new(host, port)).await {
            Ok(listener) => {
                let bound = listener
                    .local_addr()
                    .map(|addr| addr.port())
                    .unwrap_or(port);
                drop(listener);
                return Ok(bound);
            }
            Err(err) => {
                log::debug!("Port {port} unavailable: {err}");
                candidate = port.checked_add(1);
            }
        }
    }
    Err(LaunchError::PortAllocationExhausted { start, attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn fixed_port_is_returned_unchecked() {
        let held = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let busy = held.local_addr().unwrap().port();

        let port = allocate(LOOPBACK, PortRequest::Fixed(busy), 3838).await.unwrap();
        assert_eq!(port, busy);
    }

    #[tokio::test]
    async fn auto_port_is_free_at_check_time() {
        let port = allocate(LOOPBACK, PortRequest::Auto, 20_000).await.unwrap();
        assert!(port >= 20_000);

        // Released immediately, so it can be bound again.
        let listener = TcpListener::bind((LOOPBACK, port)).await;
        assert!(listener.is_ok());
    }

    #[tokio::test]
    async fn occupied_base_port_is_skipped() {
        let held = TcpListener::bind((LOOPBACK, 0)).await.unwrap();
        let busy = held.local_addr().unwrap().port();
        if busy == u16::MAX {
            return;
        }

        let port = allocate(LOOPBACK, PortRequest::Auto, busy).await.unwrap();
        assert!(port > busy);
    }

    #[tokio::test]
    async fn search_stops_at_the_end_of_the_port_range() {
        let Ok(_held) = TcpListener::bind((LOOPBACK, u16::MAX)).await else {
            return;
        };
        let result = allocate(LOOPBACK, PortRequest::Auto, u16::MAX).await;
        assert!(matches!(
            result,
            Err(LaunchError::PortAllocationExhausted { start: u16::MAX, attempts: 1 })
        ));
    }
}
