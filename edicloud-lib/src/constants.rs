// Protocol constants for the Edimax cloud relay

/// Rotation used for every message this client encrypts
pub const DEFAULT_ROTATION: u8 = 7;

/// First plaintext byte of every wire message (`<`)
pub const SENTINEL: u8 = 0x3C;

/// Terminator of text headers on the relay stream
pub const DOUBLE_CRLF: &[u8] = b"\r\n\r\n";

/// Consecutive empty reads after which a stream is considered dead
pub const ZERO_READ_LIMIT: u32 = 100;

/// Largest frame accepted from the relay (Pnv body or tunnelled HTTP response)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Largest browser request (head plus POST body) accepted by the local proxy
pub const MAX_PROXY_REQUEST_SIZE: usize = 64 * 1024;

/// Bytes requested from the socket per read
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Default cloud discovery host
pub const DEFAULT_CLOUD_HOST: &str = "www.myedimax.com";

/// Default cloud discovery UDP port
pub const DEFAULT_CLOUD_PORT: u16 = 8766;

/// Discovery command code
pub const DISCOVERY_CODE: u16 = 1030;

/// Dummy LAN address advertised in discovery requests (relay mode is always used)
pub const DUMMY_LAN_IP: &str = "192.168.1.2";

/// Dummy LAN port advertised in discovery requests
pub const DUMMY_LAN_PORT: u16 = 36587;

/// NAT type advertised in discovery requests
pub const NAT_TYPE: u8 = 7;

/// Firmware version advertised in discovery requests
pub const REQ_FW_VERSION: &str = "1.0#010000";

/// Receive buffer for one discovery reply
pub const UDP_BUFFER_SIZE: usize = 2048;

/// User name the devices expect in every credential
pub const ADMIN_USER: &str = "admin";

/// Size of the binary preamble in front of tunnelled HTTP responses
pub const TUNNEL_PREAMBLE_SIZE: usize = 12;

/// HTTP directive codes carried in the tunnel request
pub const TUNNEL_MEDIA_CODE: u16 = 1080;
pub const TUNNEL_MEDIA_VALUE: u8 = 4;
pub const TUNNEL_URL_CODE: u16 = 1100;

/// HTTP statuses accepted by the tunnel authentication check
pub const AUTH_OK_STATUSES: &[&str] = &["200", "301", "302"];

/// Camera snapshot path and its legacy alias
pub const SNAPSHOT_PATH: &str = "/mobile.jpg";
pub const LEGACY_SNAPSHOT_PATH: &str = "/snapshot.cgi";

/// Cache header injected on proxied script and style assets
pub const ASSET_CACHE_HEADER: &str = "Cache-Control: public, max-age=86400";

/// Weekday labels in schedule slot order
pub const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Days of power history requested by the `history` action
pub const HISTORY_DAYS: i64 = 14;

/// Hourly values per day bucket of power history
pub const HOURS_PER_DAY: usize = 24;
