use std::time::Duration;

use crate::errors::ClientError;

const DEVELOPMENT_API_URL: &str = "http://localhost:5001";
const PRODUCTION_API_URL: &str = "https://api.flowstate.app";

/// Which backend deployment the client talks to by default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Deployment {
    #[default]
    Development,
    Production,
}

impl Deployment {
    /// Parses `development`/`dev` or `production`/`prod`, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn default_api_url(&self) -> &'static str {
        match self {
            Self::Development => DEVELOPMENT_API_URL,
            Self::Production => PRODUCTION_API_URL,
        }
    }
}

/// Configuration for `FlowStateClient`.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the chat backend.
    pub api_url: String,
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
    /// Timeout for non-streaming calls (health, thread, message).
    pub request_timeout: Duration,
    /// Optional limit on a whole streamed chat turn.
    pub stream_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            stream_timeout: None,
        }
    }

    pub fn for_deployment(deployment: Deployment) -> Self {
        Self::new(deployment.default_api_url())
    }

    /// Builds a config from `FLOWSTATE_ENV` and `FLOWSTATE_API_URL`.
    ///
    /// `FLOWSTATE_API_URL` wins over the deployment default when set.
    pub fn from_env() -> Result<Self, ClientError> {
        let deployment = match std::env::var("FLOWSTATE_ENV") {
            Ok(raw) if !raw.trim().is_empty() => Deployment::parse(&raw).ok_or_else(|| {
                ClientError::Config(format!("unrecognised FLOWSTATE_ENV value: {raw}"))
            })?,
            _ => Deployment::default(),
        };
        let mut config = Self::for_deployment(deployment);
        if let Ok(url) = std::env::var("FLOWSTATE_API_URL")
            && !url.trim().is_empty()
        {
            config.api_url = url.trim().to_string();
        }
        Ok(config)
    }

    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = Some(timeout);
        self
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
