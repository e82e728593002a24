//! HTTP/2 transport configuration

use serde::{Deserialize, Serialize};

/// HTTP/2 connection and behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct H2Config {
    /// WebPush server host
    #[serde(default = "default_host")]
    pub host: String,

    /// WebPush server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path prefix prepended to every request path (e.g. "/webpush")
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,

    /// Negotiate TLS with ALPN "h2"; plaintext prior-knowledge HTTP/2
    /// otherwise
    #[serde(default = "default_true")]
    pub tls: bool,

    /// Skip server certificate verification (self-signed test servers)
    #[serde(default)]
    pub trust_all: bool,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Connection retry attempts (0 = fail on first error)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between connection attempts in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8443
}

fn default_path_prefix() -> String {
    "/webpush".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    2
}

impl Default for H2Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path_prefix: default_path_prefix(),
            tls: true,
            trust_all: false,
            connect_timeout_seconds: default_connect_timeout(),
            retry_attempts: default_retry_attempts(),
            retry_delay_seconds: default_retry_delay(),
        }
    }
}

impl H2Config {
    /// Authority (`host:port`) used in request pseudo-headers.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn scheme(&self) -> &'static str {
        if self.tls {
            "https"
        } else {
            "http"
        }
    }
}
