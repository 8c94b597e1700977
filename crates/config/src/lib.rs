//! Typed, env-var-driven configuration for the discovery and IM gateway
//! processes, populated via `clap`'s `env` attribute with compiled-in
//! defaults — every field resolves to something usable against a local
//! Redis with no environment set at all.

use clap::Args;

/// Shared by any process that talks to Redis: the discovery service itself,
/// and the gateway's own registration client.
#[derive(Debug, Clone, Args)]
pub struct RedisArgs {
    #[arg(long, env = "IM_REDIS_ADDR", default_value = "127.0.0.1:6379")]
    pub addr: String,

    #[arg(long, env = "IM_REDIS_PASSWORD", default_value = "root")]
    pub password: String,

    #[arg(long, env = "IM_REDIS_DB", default_value_t = 0)]
    pub db: i64,
}

impl RedisArgs {
    /// A `redis://` connection URL built from these settings.
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}/{}", self.addr, self.db)
        } else {
            format!("redis://:{}@{}/{}", self.password, self.addr, self.db)
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct DiscoveryConfig {
    #[arg(long, env = "IM_DISCOVERY_ADDR", default_value = ":8085")]
    pub addr: String,

    #[command(flatten)]
    pub redis: RedisArgs,

    /// How often the local cache is refreshed from Redis.
    #[arg(long, env = "IM_DISCOVERY_REFRESH_SECS", default_value_t = 1)]
    pub refresh_interval_secs: u64,

    /// Deadline for a single refresh cycle.
    #[arg(long, env = "IM_DISCOVERY_REFRESH_TIMEOUT_SECS", default_value_t = 10)]
    pub refresh_timeout_secs: u64,
}

#[derive(Debug, Clone, Args)]
pub struct ImGatewayConfig {
    /// Address the TCP message socket listens on.
    #[arg(long, env = "IM_IMGATEWAY_ADDR", default_value = ":8086")]
    pub addr: String,

    /// Address the gRPC control-plane surface (`DelConn`) listens on.
    #[arg(long, env = "IM_IMGATEWAY_RPC_ADDR", default_value = "localhost:8087")]
    pub rpc_addr: String,

    /// Discovery service endpoint, used to register this replica and to
    /// resolve the API Gateway's own address.
    #[arg(long, env = "IM_IMGATEWAY_DISCOVERY_ENDPOINT", default_value = "localhost:8085")]
    pub discovery_endpoint: String,

    /// API Gateway RPC endpoint this process calls `GetSessionUserList` and
    /// `SendMessage` against.
    #[arg(long, env = "IM_IMGATEWAY_API_ADDR", default_value = "http://localhost:8088")]
    pub api_addr: String,

    /// Shared HMAC secret used to validate `CreateConn` bearer tokens.
    #[arg(long, env = "IM_IMGATEWAY_JWT_SECRET", default_value = "im-gateway-secret")]
    pub jwt_secret: String,

    /// Hard cap on `var_header_len + body_len` for a single inbound frame.
    #[arg(long, env = "IM_IMGATEWAY_MAX_FRAME_BYTES", default_value_t = 16 * 1024 * 1024)]
    pub max_frame_bytes: u32,

    #[command(flatten)]
    pub redis: RedisArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_url_includes_password_and_db() {
        let redis = RedisArgs {
            addr: "10.0.0.1:6379".into(),
            password: "hunter2".into(),
            db: 3,
        };
        assert_eq!(redis.url(), "redis://:hunter2@10.0.0.1:6379/3");
    }

    #[test]
    fn redis_url_omits_empty_password() {
        let redis = RedisArgs {
            addr: "10.0.0.1:6379".into(),
            password: String::new(),
            db: 0,
        };
        assert_eq!(redis.url(), "redis://10.0.0.1:6379/0");
    }
}
