use anyhow::{Context, Result};
use std::env;

pub const DEFAULT_FALLBACK_INSTRUCTOR: &str = "Dr. Sarah Smith";
const DEFAULT_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

#[derive(Debug, Clone)]
pub struct Config {
    /// When unset the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub host: String,
    pub port: u16,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub seed_demo_data: bool,
    pub fallback_instructor: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
        let max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(v) => v
                .parse()
                .with_context(|| format!("invalid DATABASE_MAX_CONNECTIONS: {v}"))?,
            Err(_) => 5,
        };
        let port = match env::var("PORT") {
            Ok(v) => v.parse().with_context(|| format!("invalid PORT: {v}"))?,
            Err(_) => 5000,
        };
        let seed_demo_data = match env::var("SEED_DEMO_DATA") {
            Ok(v) => parse_flag(&v).with_context(|| format!("invalid SEED_DEMO_DATA: {v}"))?,
            Err(_) => true,
        };

        Ok(Self {
            database_url,
            max_connections,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            allowed_origins: parse_origins(
                &env::var("ALLOWED_ORIGINS").unwrap_or_else(|_| DEFAULT_ORIGINS.into()),
            ),
            seed_demo_data,
            fallback_instructor: env::var("FALLBACK_INSTRUCTOR_NAME")
                .unwrap_or_else(|_| DEFAULT_FALLBACK_INSTRUCTOR.into()),
        })
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    if raw.trim() == "*" {
        return Vec::new();
    }
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
