use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::omap::OrderedMap;
use crate::core::system::System;
use crate::error::{Error, Result};

/// 디스크에 저장되는 카탈로그 캐시 문서.
///
/// urls에는 발견된 모든 시스템이 들어가고, systems에는 실제로 파싱까지
/// 끝난 섹션만 들어간다. 아직 가져오지 않은 시스템은 urls에만 남는다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheDoc {
    /// 시스템 이름 -> 시스템 페이지 절대 URL.
    pub urls: OrderedMap<String>,
    /// 시스템 이름 -> 캐시된 섹션.
    pub systems: OrderedMap<System>,
}

/// JSON 문자열을 캐시 문서로 읽는다.
/// 필수 키가 빠졌거나 형식이 다르면 MalformedCache로 실패한다.
pub fn from_json(text: &str) -> Result<CacheDoc> {
    serde_json::from_str(text).map_err(|e| Error::MalformedCache(e.to_string()))
}

pub fn to_json(doc: &CacheDoc) -> Result<String> {
    Ok(serde_json::to_string_pretty(doc)?)
}

/// 캐시 파일을 읽는다.
/// 파일이 없으면 빈 문서로 시작하고, 읽을 수 없거나 손상되었으면
/// 경고만 남기고 빈 문서로 시작한다. 캐시 손상은 치명적이지 않다.
pub fn load(path: &Path) -> CacheDoc {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("캐시 파일이 없어 새로 만든다: {}", path.display());
            return CacheDoc::default();
        }
        Err(e) => {
            warn!("캐시 파일을 읽지 못했다 ({}): {}", path.display(), e);
            return CacheDoc::default();
        }
    };

    match from_json(&text) {
        Ok(doc) => doc,
        Err(e) => {
            warn!("캐시 파일이 손상되어 빈 인덱스로 시작한다: {}", e);
            CacheDoc::default()
        }
    }
}

/// 캐시 문서를 파일에 기록한다. 상위 디렉토리가 없으면 만든다.
pub fn save(path: &Path, doc: &CacheDoc) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, to_json(doc)?)?;
    Ok(())
}
