use regex::Regex;

use crate::error::{Error, Result};
use crate::models::{Song, SongField};

/// 한 번의 검색에서 허용하는 최대 패턴 수.
/// 구조 키 2개(system, game)에 Song 필드 5개를 더한 값이다.
pub const MAX_PATTERNS: usize = 7;

/// search_by_regex가 쓰는 불변 검색 조건.
///
/// 모든 패턴은 부분 일치(substring)로 동작한다. 정확히 일치시키려면
/// 호출자가 ^와 $로 앵커해야 한다. 비어 있는 패턴은 모든 값과 일치한다.
#[derive(Debug, Default)]
pub struct RegexCriteria {
    system: Option<Regex>,
    game: Option<Regex>,
    fields: Vec<(SongField, Regex)>,
}

impl RegexCriteria {
    /// `(키, 패턴)` 쌍 목록에서 조건을 만든다.
    ///
    /// 키 "system"/"game"은 구조(시스템 이름, 게임 제목)에 걸리고,
    /// 나머지 키는 Song 필드 이름이어야 한다. 패턴이 MAX_PATTERNS보다
    /// 많으면 어떤 I/O도 일어나기 전에 TooManyPatterns로 실패한다.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self> {
        if pairs.len() > MAX_PATTERNS {
            return Err(Error::TooManyPatterns { max: MAX_PATTERNS, given: pairs.len() });
        }

        let mut criteria = RegexCriteria::default();
        for (key, pattern) in pairs {
            // 빈 패턴은 모든 값과 일치하므로 컴파일하지 않는다
            if pattern.is_empty() {
                continue;
            }
            let re = Regex::new(pattern)?;
            match key.as_str() {
                "system" => criteria.system = Some(re),
                "game" => criteria.game = Some(re),
                other => match SongField::parse(other) {
                    Some(field) => criteria.fields.push((field, re)),
                    None => return Err(Error::UnknownField(other.to_string())),
                },
            }
        }
        Ok(criteria)
    }

    /// (시스템, 게임, 곡)이 모든 패턴과 일치하는지 판정한다. 상태 없음.
    pub fn matches(&self, system: &str, game: &str, song: &Song) -> bool {
        if let Some(re) = &self.system {
            if !re.is_match(system) {
                return false;
            }
        }
        if let Some(re) = &self.game {
            if !re.is_match(game) {
                return false;
            }
        }
        self.fields.iter().all(|(field, re)| re.is_match(&song.field(*field)))
    }
}
