use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// 동시 요청 수 기본값. 서버에 부담을 주지 않도록 10 이하를 권장한다.
pub const DEFAULT_MAX_REQUESTS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 인덱스 캐시 파일 경로.
    pub cache_file: PathBuf,
    /// MIDI 파일을 내려받을 디렉토리.
    pub download_dir: PathBuf,
    /// 동시 다운로드/페이지 요청 수.
    pub max_requests: usize,
    /// 다운로드 후 크기와 MD5 체크섬을 검증할지 여부.
    pub verify_downloads: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cache_file: PathBuf::from("cache.json"),
            download_dir: PathBuf::from("."),
            max_requests: DEFAULT_MAX_REQUESTS,
            verify_downloads: false,
        }
    }
}

fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".config")
        .join("vgmidi")
        .join("config.toml")
}

pub fn load_config() -> Config {
    let path = config_path();
    if !path.exists() {
        return Config::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(content) => toml::from_str(&content).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}

pub fn save_config(config: &Config) -> Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content)?;
    Ok(())
}
