use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub submit_audio_url: String,
    pub analysis_backend_url: String,
    pub public_rps: u32,
    pub session_idle_secs: u64,
    pub livekit: Option<LiveKitConfig>,
}

#[derive(Debug, Clone)]
pub struct LiveKitConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
}

const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            submit_audio_url: get_env_url("SUBMIT_AUDIO_URL")?,
            analysis_backend_url: get_env_url("ANALYSIS_BACKEND_URL")?,
            public_rps: get_env_parse("PUBLIC_RPS")?,
            session_idle_secs: get_env_parse_or("SESSION_IDLE_SECS", DEFAULT_SESSION_IDLE_SECS)?,
            livekit: livekit_from_env(),
        })
    }
}

// The room credentials endpoint reports missing LiveKit settings per request,
// so an incomplete set is not a startup error.
fn livekit_from_env() -> Option<LiveKitConfig> {
    Some(LiveKitConfig {
        url: env::var("LIVEKIT_URL").ok()?,
        api_key: env::var("LIVEKIT_API_KEY").ok()?,
        api_secret: env::var("LIVEKIT_API_SECRET").ok()?,
    })
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_url(name: &str) -> Result<String> {
    let raw = get_env(name)?;
    url::Url::parse(&raw)
        .map_err(|e| Error::Config(format!("Invalid URL for {}: {}", name, e)))?;
    Ok(raw.trim_end_matches('/').to_string())
}

fn get_env_parse<T>(name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(name)?;
    raw.parse()
        .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(_) => get_env_parse(name),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
