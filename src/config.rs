/// Typed, once-constructed configuration for the sandbox service.
///
/// Replaces the "global mutable configuration read from many sites"
/// pattern the original service used: `SandboxConfig::load` builds one
/// value at startup (YAML -> env overrides -> defaults) and the binary
/// threads it through as a single `Arc<SandboxConfig>` shared by the
/// dispatcher, the runners, the dependency ticker, and the health
/// reporter.
use crate::types::{Result, SandboxError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub mcp: McpConfig,
    pub execution: ExecutionConfig,
    pub python: PythonConfig,
    pub node: NodeConfig,
    pub security: SecurityConfig,
    pub proxy: ProxyConfig,
    pub logging: LoggingConfig,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mcp: McpConfig::default(),
            execution: ExecutionConfig::default(),
            python: PythonConfig::default(),
            node: NodeConfig::default(),
            security: SecurityConfig::default(),
            proxy: ProxyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportMode {
    Stdio,
    SseHttp,
    StreamableHttp,
}

impl Default for TransportMode {
    fn default() -> Self {
        TransportMode::Stdio
    }
}

impl std::str::FromStr for TransportMode {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stdio" => Ok(TransportMode::Stdio),
            "sse" | "sse-http" | "sse_http" => Ok(TransportMode::SseHttp),
            "mcp" | "streamable-http" | "streamable_http" => Ok(TransportMode::StreamableHttp),
            other => Err(SandboxError::Config(format!("unknown transport mode '{}'", other))),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub mode: TransportMode,
    pub http_port: u16,
    pub base_url: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Stdio,
            http_port: 8080,
            base_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    pub name: String,
    pub version: String,
    pub transport: TransportConfig,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            name: "sandboxd".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            transport: TransportConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_workers: usize,
    pub max_requests: usize,
    /// Per-request wall-clock deadline.
    #[serde(with = "humantime_seconds")]
    pub worker_timeout: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_requests: 50,
            worker_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonConfig {
    pub path: String,
    pub lib_paths: Vec<String>,
    #[serde(with = "humantime_seconds")]
    pub deps_update_interval: Duration,
    pub requirements: Vec<String>,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            path: "/usr/local/bin/python3".to_string(),
            lib_paths: default_python_lib_paths(),
            deps_update_interval: Duration::from_secs(24 * 60 * 60),
            requirements: Vec::new(),
        }
    }
}

/// Mirrors the reference service's default Python `REQUIRED_FS` list.
pub fn default_python_lib_paths() -> Vec<String> {
    vec![
        "/usr/local/lib/python3.10".to_string(),
        "/usr/lib/python3.10".to_string(),
        "/usr/lib/python3".to_string(),
        "/usr/lib/x86_64-linux-gnu".to_string(),
        "/usr/lib/aarch64-linux-gnu".to_string(),
        "/etc/ssl/certs/ca-certificates.crt".to_string(),
        "/etc/nsswitch.conf".to_string(),
        "/etc/hosts".to_string(),
        "/etc/resolv.conf".to_string(),
        "/run/systemd/resolve/stub-resolv.conf".to_string(),
        "/run/resolvconf/resolv.conf".to_string(),
        "/etc/localtime".to_string(),
        "/usr/share/zoneinfo".to_string(),
        "/etc/timezone".to_string(),
    ]
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub path: String,
    pub lib_paths: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            path: "/usr/local/bin/node".to_string(),
            lib_paths: vec![
                "/etc/ssl/certs/ca-certificates.crt".to_string(),
                "/etc/nsswitch.conf".to_string(),
                "/etc/resolv.conf".to_string(),
                "/run/systemd/resolve/stub-resolv.conf".to_string(),
                "/etc/hosts".to_string(),
            ],
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeJsSecurityConfig {
    pub disable_seccomp: bool,
}

impl Default for NodeJsSecurityConfig {
    fn default() -> Self {
        Self { disable_seccomp: false }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub enable_network: bool,
    pub enable_preload: bool,
    pub allowed_syscalls: Vec<String>,
    pub nodejs: NodeJsSecurityConfig,
    /// Operator attestation that this process is not production-facing;
    /// gates whether `DISABLE_NODEJS_SECCOMP` is honoured at all.
    pub production: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_network: false,
            enable_preload: true,
            allowed_syscalls: Vec::new(),
            nodejs: NodeJsSecurityConfig::default(),
            production: true,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub socks5: Option<String>,
    pub http: Option<String>,
    pub https: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub show_log: bool,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            show_log: true,
            level: "info".to_string(),
        }
    }
}

impl SandboxConfig {
    /// Load from an optional YAML file, then apply environment-variable
    /// overrides, then fall back to defaults for anything still unset.
    /// stdio transport mode forces `show_log = false` so log output never
    /// shares stdout with the protocol frames.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p)
                    .map_err(|e| SandboxError::Config(format!("reading {}: {}", p.display(), e)))?;
                serde_yaml::from_str(&text)
                    .map_err(|e| SandboxError::Config(format!("parsing {}: {}", p.display(), e)))?
            }
            _ => SandboxConfig::default(),
        };

        config.apply_env_overrides();

        if config.mcp.transport.mode == TransportMode::Stdio {
            config.logging.show_log = false;
        }

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        use std::env;

        if let Ok(mode) = env::var("MCP_TRANSPORT") {
            if let Ok(parsed) = mode.parse() {
                self.mcp.transport.mode = parsed;
            }
        }
        if let Ok(port) = env::var("MCP_HTTP_PORT") {
            if let Ok(p) = port.parse() {
                self.mcp.transport.http_port = p;
            }
        }
        if let Ok(base_url) = env::var("MCP_BASE_URL") {
            self.mcp.transport.base_url = base_url;
        }

        if let Ok(v) = env::var("MAX_WORKERS") {
            if let Ok(n) = v.parse() {
                self.execution.max_workers = n;
            }
        }
        if let Ok(v) = env::var("MAX_REQUESTS") {
            if let Ok(n) = v.parse() {
                self.execution.max_requests = n;
            }
        }
        if let Ok(v) = env::var("WORKER_TIMEOUT") {
            if let Ok(secs) = v.parse() {
                self.execution.worker_timeout = Duration::from_secs(secs);
            }
        }

        if let Ok(v) = env::var("PYTHON_PATH") {
            self.python.path = v;
        }
        if let Ok(v) = env::var("PYTHON_LIB_PATH") {
            self.python.lib_paths = v.split(',').map(str::to_string).collect();
        }
        if let Ok(v) = env::var("PYTHON_DEPS_UPDATE_INTERVAL") {
            if let Ok(secs) = v.parse() {
                self.python.deps_update_interval = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = env::var("NODE_PATH") {
            self.node.path = v;
        }

        if let Ok(v) = env::var("ENABLE_NETWORK") {
            if let Ok(b) = v.parse() {
                self.security.enable_network = b;
            }
        }
        if let Ok(v) = env::var("ENABLE_PRELOAD") {
            if let Ok(b) = v.parse() {
                self.security.enable_preload = b;
            }
        }
        if let Ok(v) = env::var("ALLOWED_SYSCALLS") {
            self.security.allowed_syscalls = v.split(',').map(str::to_string).collect();
        }
        if let Ok(v) = env::var("DISABLE_NODEJS_SECCOMP") {
            if let Ok(b) = v.parse() {
                self.security.nodejs.disable_seccomp = b;
            }
        }

        if let Ok(v) = env::var("SOCKS5_PROXY") {
            self.proxy.socks5 = Some(v);
        }
        if let Ok(v) = env::var("HTTP_PROXY") {
            self.proxy.http = Some(v);
        }
        if let Ok(v) = env::var("HTTPS_PROXY") {
            self.proxy.https = Some(v);
        }

        if let Ok(v) = env::var("MCP_SHOW_LOG") {
            if let Ok(b) = v.parse() {
                self.logging.show_log = b;
            }
        }
        if let Ok(v) = env::var("MCP_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    /// Whether the Node.js seccomp-disable escape hatch should be honoured.
    /// Refused outright when the config marks this process as production,
    /// regardless of the environment variable.
    pub fn honour_nodejs_seccomp_disable(&self) -> bool {
        !self.security.production && self.security.nodejs.disable_seccomp
    }

    pub fn default_config_path() -> PathBuf {
        PathBuf::from("conf/mcp-config.yaml")
    }
}

/// Serde helper: (de)serialize a `Duration` as a plain integer seconds
/// field, matching the YAML schema's `worker_timeout: 60` style.
mod humantime_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_external_interface() {
        let config = SandboxConfig::default();
        assert_eq!(config.mcp.transport.mode, TransportMode::Stdio);
        assert_eq!(config.mcp.transport.http_port, 8080);
        assert_eq!(config.execution.max_workers, 4);
        assert_eq!(config.execution.max_requests, 50);
        assert_eq!(config.execution.worker_timeout, Duration::from_secs(60));
        assert_eq!(config.python.path, "/usr/local/bin/python3");
        assert_eq!(config.python.deps_update_interval, Duration::from_secs(24 * 3600));
        assert_eq!(config.node.path, "/usr/local/bin/node");
    }

    #[test]
    fn stdio_transport_suppresses_log_output() {
        let config = SandboxConfig::load(None).unwrap();
        assert!(!config.logging.show_log);
    }

    #[test]
    fn yaml_round_trip_preserves_overrides() {
        let yaml = "execution:\n  max_workers: 8\n  max_requests: 10\n  worker_timeout: 5\n";
        let parsed: SandboxConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed.execution.max_workers, 8);
        assert_eq!(parsed.execution.worker_timeout, Duration::from_secs(5));
        // Unspecified sections still default.
        assert_eq!(parsed.python.path, "/usr/local/bin/python3");
    }

    #[test]
    fn seccomp_disable_hatch_is_refused_in_production() {
        let mut config = SandboxConfig::default();
        config.security.nodejs.disable_seccomp = true;
        assert!(!config.honour_nodejs_seccomp_disable());
        config.security.production = false;
        assert!(config.honour_nodejs_seccomp_disable());
    }
}
