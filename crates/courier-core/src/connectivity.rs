use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub trait ConnectivityProbe: Send + Sync {
    fn is_available(&self) -> bool;
}

/// Reachability flag driven by the host's own network callbacks.
#[derive(Clone, Debug)]
pub struct StaticConnectivity {
    available: Arc<AtomicBool>,
}

impl StaticConnectivity {
    pub fn new(available: bool) -> Self {
        Self {
            available: Arc::new(AtomicBool::new(available)),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl ConnectivityProbe for StaticConnectivity {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// Considers the network reachable when any of the configured endpoints
/// accepts a TCP connection within the timeout.
#[derive(Clone, Debug)]
pub struct TcpConnectivityProbe {
    endpoints: Vec<String>,
    timeout: Duration,
}

impl TcpConnectivityProbe {
    pub fn new(endpoints: impl IntoIterator<Item = impl Into<String>>, timeout: Duration) -> Self {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            timeout,
        }
    }

    fn reachable(&self, endpoint: &str) -> bool {
        let addresses: Vec<SocketAddr> = match endpoint.to_socket_addrs() {
            Ok(addresses) => addresses.collect(),
            Err(error) => {
                tracing::debug!(
                    endpoint,
                    error = %error,
                    "connectivity probe could not resolve endpoint"
                );
                return false;
            }
        };
        addresses
            .iter()
            .any(|address| TcpStream::connect_timeout(address, self.timeout).is_ok())
    }
}

impl ConnectivityProbe for TcpConnectivityProbe {
    fn is_available(&self) -> bool {
        self.endpoints.iter().any(|endpoint| self.reachable(endpoint))
    }
}
