use std::fmt;
use std::time::Duration;

/// Client identifier announced to the broker. Fixed per process.
pub const CLIENT_ID: &str = "MqttMenuBarApp";

/// Keep-alive interval negotiated with the broker.
pub const KEEP_ALIVE: Duration = Duration::from_secs(45);

/// Delay between a transport loss and the next connection attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Broker port used when the settings do not name one.
pub const DEFAULT_PORT: u16 = 1883;

/// Broker connection parameters, immutable for the lifetime of a supervisor.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16, topic: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            topic: topic.into(),
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    /// Names of the required fields that are missing or invalid.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.is_empty() {
            missing.push("broker");
        }
        if self.port == 0 {
            missing.push("port");
        }
        if self.topic.is_empty() {
            missing.push("topic");
        }
        missing
    }

    /// A config is complete iff host and topic are non-empty and port > 0.
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

impl fmt::Display for ConnectionConfig {
    /// Formats as "user@host:port [topic]"; the password never appears.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(user) = &self.username {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}:{} [{}]", self.host, self.port, self.topic)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("topic", &self.topic)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<set>"))
            .finish()
    }
}

/// Protocol level options for every session the supervisor opens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    pub client_id: String,
    pub keep_alive: Duration,
    pub clean_session: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            client_id: CLIENT_ID.to_string(),
            keep_alive: KEEP_ALIVE,
            clean_session: true,
        }
    }
}
