//! Layered configuration: `REPLAY_*` environment variables over built-in
//! defaults, so the binary runs with zero configuration.

use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct Config {
    pub cache_dir: PathBuf,
    pub bind_addr: String,
    pub ready_wait_timeout_s: f64,
    pub pre_serialize_frame_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./replay-cache"),
            bind_addr: "0.0.0.0:8000".to_string(),
            ready_wait_timeout_s: model::READY_WAIT_TIMEOUT_S,
            pre_serialize_frame_limit: model::PRE_SERIALIZE_FRAME_LIMIT,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("REPLAY_CACHE_DIR") {
            cfg.cache_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("REPLAY_BIND_ADDR") {
            cfg.bind_addr = v;
        }
        if let Ok(v) = std::env::var("REPLAY_READY_WAIT_TIMEOUT_S") {
            if let Ok(parsed) = v.parse() {
                cfg.ready_wait_timeout_s = parsed;
            }
        }
        if let Ok(v) = std::env::var("REPLAY_PRE_SERIALIZE_FRAME_LIMIT") {
            if let Ok(parsed) = v.parse() {
                cfg.pre_serialize_frame_limit = parsed;
            }
        }
        cfg
    }
}
