use serde::{Deserialize, Serialize};

use crate::core::omap::OrderedMap;
use crate::core::parser;
use crate::error::{ParseError, Result};
use crate::models::Song;
use crate::sources::{RawRow, SectionPage};

/// 게임 시스템(콘솔) 하나의 섹션: 게임 제목 -> 곡 목록.
/// 캐시 문서의 "systems" 항목과 필드 단위로 일치한다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    /// 시스템 페이지의 절대 URL.
    pub url: String,
    /// 페이지를 만든 VGMusic 인덱서 버전. 정보 제공용일 뿐 로직에는 쓰지 않는다.
    pub version: String,
    /// 서버가 내려준 엔티티 태그. 내용 변경 감지에만 쓰는 불투명한 값.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// 시스템을 만든 회사 (디렉토리 페이지의 분류 제목).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// 게임 제목 -> 곡 목록. 발견(파싱) 순서를 유지한다.
    pub games: OrderedMap<Vec<Song>>,
}

impl System {
    /// 가져온 페이지의 행들을 순서대로 해석해 섹션을 만든다.
    ///
    /// 헤더 행이 현재 게임 제목을 정하고, 곡 행은 현재 게임의 목록에
    /// 덧붙는다. 여백 행은 건너뛴다. 곡 행이 첫 헤더보다 먼저 나오면
    /// 페이지 구조가 깨진 것이므로 실패한다.
    pub fn from_page(page: &SectionPage, company: Option<String>) -> Result<Self> {
        let mut games: OrderedMap<Vec<Song>> = OrderedMap::new();
        let mut current_game: Option<String> = None;

        for row in &page.rows {
            match row {
                RawRow::Header(title) => {
                    current_game = Some(title.trim().to_string());
                }
                RawRow::Blank => {}
                RawRow::Song(cells) => {
                    let game = current_game
                        .as_deref()
                        .ok_or(ParseError::SongBeforeHeader)?;
                    let song = parser::parse_song(&page.url, &page.headers, cells)?;
                    games.entry_or_insert_with(game, Vec::new).push(song);
                }
            }
        }

        Ok(System {
            url: page.url.clone(),
            version: page.indexer_version.clone(),
            etag: page.etag.clone(),
            company,
            games,
        })
    }

    /// 곡이 하나도 없는 시스템의 말단 상태.
    /// "아직 가져오지 않음" 센티널과는 다른, 파싱이 끝난 상태다.
    pub fn empty(url: &str, company: Option<String>) -> Self {
        System {
            url: url.to_string(),
            version: String::new(),
            etag: None,
            company,
            games: OrderedMap::new(),
        }
    }

    /// 마지막으로 알려진 신선도 마커 (엔티티 태그).
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// 전체 곡 수. 캐시하지 않고 매번 다시 센다 (게임 수에 비례).
    pub fn total_songs(&self) -> usize {
        self.games.iter().map(|(_, songs)| songs.len()).sum()
    }
}
