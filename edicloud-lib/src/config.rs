use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Timeouts, retry budgets and ports shared by discovery, relay and proxy.
///
/// Built once per invocation and handed to every component by value or
/// reference; nothing reads configuration from global state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long to wait for one discovery reply
    pub udp_timeout: Duration,
    /// Receive timeout for every read on the relay connection
    pub tcp_timeout: Duration,
    /// Consecutive discovery failures before giving up
    pub udp_max_retries: u32,
    /// Reconnection attempts per relay operation before giving up
    pub tcp_max_retries: u32,
    /// Pause between retries of either kind
    pub retry_interval: Duration,
    /// Pause between discovery and the first relay connection
    pub settle_delay: Duration,
    /// Local port of the web proxy
    pub web_port: u16,
    /// Local address the web proxy binds to
    pub web_bind: IpAddr,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            udp_timeout: Duration::from_millis(10_000),
            tcp_timeout: Duration::from_millis(20_000),
            udp_max_retries: 10,
            tcp_max_retries: 10,
            retry_interval: Duration::from_millis(500),
            settle_delay: Duration::from_millis(300),
            web_port: 9999,
            web_bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

impl ClientConfig {
    pub fn with_udp_timeout(mut self, timeout: Duration) -> Self {
        self.udp_timeout = timeout;
        self
    }

    pub fn with_tcp_timeout(mut self, timeout: Duration) -> Self {
        self.tcp_timeout = timeout;
        self
    }

    pub fn with_udp_max_retries(mut self, retries: u32) -> Self {
        self.udp_max_retries = retries;
        self
    }

    pub fn with_tcp_max_retries(mut self, retries: u32) -> Self {
        self.tcp_max_retries = retries;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_web_port(mut self, port: u16) -> Self {
        self.web_port = port;
        self
    }

    pub fn with_web_bind(mut self, addr: IpAddr) -> Self {
        self.web_bind = addr;
        self
    }
}
