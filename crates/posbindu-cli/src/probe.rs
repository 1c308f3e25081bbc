//! TCP reachability probe for the configured remote host.

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::Url;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    /// Probe the host and port of an http(s) base URL.
    pub fn from_base_url(base_url: &str) -> Option<Self> {
        let url = Url::parse(base_url).ok()?;
        Some(Self {
            host: url.host_str()?.to_string(),
            port: url.port_or_known_default()?,
            timeout: CONNECT_TIMEOUT,
        })
    }

    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `Some(true)` once any resolved address accepts a connection.
    /// `None` when the host resolves to nothing.
    pub async fn check(&self) -> Option<bool> {
        let addrs: Vec<SocketAddr> = match lookup_host((self.host.as_str(), self.port)).await {
            Ok(addrs) => addrs.collect(),
            Err(error) => {
                tracing::debug!(target = %self.target(), "Host lookup failed: {error}");
                return Some(false);
            }
        };
        if addrs.is_empty() {
            return None;
        }

        for addr in addrs {
            match timeout(self.timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_)) => return Some(true),
                Ok(Err(error)) => tracing::trace!(%addr, "Connect failed: {error}"),
                Err(_) => tracing::trace!(%addr, "Connect timed out"),
            }
        }
        Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_uses_scheme_default_port() {
        let probe = TcpProbe::from_base_url("https://posbindu.example.org/api").unwrap();
        assert_eq!(probe.target(), "posbindu.example.org:443");

        let probe = TcpProbe::from_base_url("http://localhost:8080").unwrap();
        assert_eq!(probe.target(), "localhost:8080");
    }

    #[test]
    fn probe_rejects_unparseable_url() {
        assert!(TcpProbe::from_base_url("not a url").is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn closed_local_port_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = TcpProbe::from_base_url(&format!("http://127.0.0.1:{port}")).unwrap();
        assert_eq!(probe.check().await, Some(false));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn open_local_port_is_reachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::from_base_url(&format!("http://127.0.0.1:{port}")).unwrap();
        assert_eq!(probe.check().await, Some(true));
    }
}
