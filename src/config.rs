use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::coordinator::PaneMode;
use crate::tmdb::DEFAULT_BASE;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_BIND: &str = "127.0.0.1:3147";

#[derive(Debug, Clone)]
pub struct Config {
    pub tmdb_api_key: String,
    pub tmdb_base_url: String,
    pub data_dir: PathBuf,
    pub pane_mode: PaneMode,
    pub bind: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let tmdb_api_key = env::var("TMDB_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Missing required environment variable: TMDB_API_KEY"))?;

        let tmdb_base_url = optional("TMDB_BASE_URL").unwrap_or_else(|| DEFAULT_BASE.to_string());
        let data_dir = PathBuf::from(
            optional("POPMOVIES_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
        );
        let pane_mode = match optional("POPMOVIES_PANE_MODE") {
            Some(raw) => raw
                .parse::<PaneMode>()
                .map_err(anyhow::Error::msg)
                .context("Invalid POPMOVIES_PANE_MODE")?,
            None => PaneMode::Dual,
        };
        let bind_raw = optional("POPMOVIES_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid POPMOVIES_BIND '{}'", bind_raw))?;

        Ok(Self {
            tmdb_api_key,
            tmdb_base_url,
            data_dir,
            pane_mode,
            bind,
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}
