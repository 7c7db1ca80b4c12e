use serde::{Deserialize, Serialize};
use std::time::Duration;
use userstream_gateway::adapters::DEFAULT_ENDPOINT;
use userstream_gateway::{
    BackoffPolicy, ConnectionConfig, DmDeleteUserIdSource, LineDelivery, ParserOptions,
};
use userstream_ports::{Credential, Identity, IdentityId};

/// Root configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStreamConfigFile {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub stream: StreamConfigJson,
    #[serde(default)]
    pub backoff: BackoffConfigJson,
    #[serde(default)]
    pub parser: ParserConfigJson,
    #[serde(default)]
    pub identities: Vec<IdentityConfig>,
    /// Keywords tracked at startup
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_url")]
    pub url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self { url: default_url() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    Ordered,
    Concurrent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfigJson {
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default)]
    pub delivery: DeliveryMode,
    /// Queue size for ordered delivery
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Keyword changes within this window share one reconnect
    #[serde(default = "default_reconnect_coalesce_ms")]
    pub reconnect_coalesce_ms: u64,
}

impl Default for StreamConfigJson {
    fn default() -> Self {
        Self {
            read_timeout_secs: default_read_timeout_secs(),
            delivery: DeliveryMode::default(),
            channel_capacity: default_channel_capacity(),
            event_capacity: default_event_capacity(),
            reconnect_coalesce_ms: default_reconnect_coalesce_ms(),
        }
    }
}

impl StreamConfigJson {
    pub fn line_delivery(&self) -> LineDelivery {
        match self.delivery {
            DeliveryMode::Ordered => LineDelivery::Ordered {
                capacity: self.channel_capacity,
            },
            DeliveryMode::Concurrent => LineDelivery::Concurrent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfigJson {
    #[serde(default = "default_network_step_ms")]
    pub network_step_ms: u64,
    #[serde(default = "default_network_cap_ms")]
    pub network_cap_ms: u64,
    #[serde(default = "default_protocol_initial_ms")]
    pub protocol_initial_ms: u64,
    #[serde(default = "default_protocol_cap_ms")]
    pub protocol_cap_ms: u64,
    #[serde(default = "default_hard_error_limit")]
    pub hard_error_limit: u32,
}

impl Default for BackoffConfigJson {
    fn default() -> Self {
        Self {
            network_step_ms: default_network_step_ms(),
            network_cap_ms: default_network_cap_ms(),
            protocol_initial_ms: default_protocol_initial_ms(),
            protocol_cap_ms: default_protocol_cap_ms(),
            hard_error_limit: default_hard_error_limit(),
        }
    }
}

impl BackoffConfigJson {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy::default()
            .with_network(
                Duration::from_millis(self.network_step_ms),
                Duration::from_millis(self.network_cap_ms),
            )
            .with_protocol(
                Duration::from_millis(self.protocol_initial_ms),
                Duration::from_millis(self.protocol_cap_ms),
            )
            .with_hard_error_limit(self.hard_error_limit)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParserConfigJson {
    #[serde(default)]
    pub dm_delete_user_id: DmDeleteUserIdSource,
}

/// One account that may hold a stream connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub id: i64,
    pub screen_name: String,
    /// Bearer token, inline
    #[serde(default)]
    pub token: Option<String>,
    /// Name of an environment variable holding the bearer token
    #[serde(default)]
    pub token_env: Option<String>,
    #[serde(default = "default_true")]
    pub streaming_enabled: bool,
    #[serde(default)]
    pub receive_all_replies: bool,
    #[serde(default)]
    pub include_followings_activity: bool,
}

impl IdentityConfig {
    /// Inline token first, then the environment variable
    pub fn credential(&self) -> Option<Credential> {
        self.token
            .clone()
            .or_else(|| {
                self.token_env
                    .as_deref()
                    .and_then(|name| std::env::var(name).ok())
            })
            .filter(|t| !t.trim().is_empty())
            .map(Credential::new)
    }

    pub fn identity(&self, credential: Credential) -> Identity {
        Identity::new(IdentityId(self.id), self.screen_name.clone(), credential)
            .with_streaming_enabled(self.streaming_enabled)
            .with_all_replies(self.receive_all_replies)
            .with_followings_activity(self.include_followings_activity)
    }
}

impl UserStreamConfigFile {
    /// Runtime settings shared by every connection
    pub fn connection_config(&self) -> ConnectionConfig {
        let parser = ParserOptions::default().with_dm_delete_user_id(self.parser.dm_delete_user_id);
        ConnectionConfig::default()
            .with_read_timeout(Duration::from_secs(self.stream.read_timeout_secs))
            .with_delivery(self.stream.line_delivery())
            .with_backoff(self.backoff.policy())
            .with_parser(parser)
            .with_event_capacity(self.stream.event_capacity)
            .with_reconnect_coalesce(Duration::from_millis(self.stream.reconnect_coalesce_ms))
    }
}

fn default_url() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_read_timeout_secs() -> u64 {
    90
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_event_capacity() -> usize {
    64
}

fn default_reconnect_coalesce_ms() -> u64 {
    250
}

fn default_network_step_ms() -> u64 {
    250
}

fn default_network_cap_ms() -> u64 {
    16_000
}

fn default_protocol_initial_ms() -> u64 {
    5_000
}

fn default_protocol_cap_ms() -> u64 {
    320_000
}

fn default_hard_error_limit() -> u32 {
    3
}

fn default_true() -> bool {
    true
}
