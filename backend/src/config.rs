use std::env;
use std::time::Duration;

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SESSION_TTL_SECS: u64 = 60;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub openai_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub session_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            openai_url: DEFAULT_OPENAI_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("openai_url", &self.openai_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("session_ttl", &self.session_ttl)
            .finish()
    }
}

impl Config {
    /// Reads a `.env` file, if one is found, then the process environment. Variables already
    /// set in the process win over the file.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let api_key = lookup("OPENAI_API_KEY").filter(|key| !key.trim().is_empty());
        let openai_url = lookup("OPENAI_URL").unwrap_or(defaults.openai_url);
        let model = lookup("OPENAI_MODEL").unwrap_or(defaults.model);
        let port = match lookup("PORT") {
            Some(value) => parse_var("PORT", value)?,
            None => defaults.port,
        };
        let session_ttl = match lookup("TRIVIA_SESSION_TTL_SECS") {
            Some(value) => Duration::from_secs(parse_var("TRIVIA_SESSION_TTL_SECS", value)?),
            None => defaults.session_ttl,
        };

        Ok(Self {
            port,
            openai_url,
            model,
            api_key,
            session_ttl,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    let parsed = value.trim().parse();
    match parsed {
        Ok(parsed) => Ok(parsed),
        Err(_) => Err(ConfigError::Invalid { name, value }),
    }
}
