use serde::{Deserialize, Serialize};

/// 게임 사운드트랙에 포함된 MIDI 곡 하나의 메타데이터.
/// 행 파싱 시점에 한 번 만들어진 뒤에는 변경되지 않는다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    /// MIDI 파일의 절대 다운로드 URL.
    pub url: String,
    /// 곡 제목.
    pub title: String,
    /// 파일 크기 (바이트).
    pub size: u64,
    /// MIDI로 시퀀싱한 사람.
    pub author: String,
    /// 곡 정보 페이지 URL에서 추출한 MD5 식별자.
    pub md5: String,
}

impl Song {
    /// 다운로드한 바이트가 기록된 크기, MD5와 모두 일치하는지 확인한다.
    /// 불일치 시 false를 반환할 뿐 에러를 내지 않는다 (최선 노력 검증).
    pub fn verify(&self, data: &[u8]) -> bool {
        if data.len() as u64 != self.size {
            return false;
        }
        format!("{:x}", md5::compute(data)) == self.md5
    }

    /// 검색 조건 매칭에 쓸 필드 값을 문자열로 반환한다.
    pub fn field(&self, field: SongField) -> String {
        match field {
            SongField::Url => self.url.clone(),
            SongField::Title => self.title.clone(),
            SongField::Size => self.size.to_string(),
            SongField::Author => self.author.clone(),
            SongField::Md5 => self.md5.clone(),
        }
    }

    pub fn summary(&self) -> String {
        format!("{} ({}, {} 바이트)", self.title, self.author, self.size)
    }
}

/// 정규식 검색의 대상이 되는 Song 필드.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SongField {
    Url,
    Title,
    Size,
    Author,
    Md5,
}

impl SongField {
    /// 검색 키 문자열을 필드로 변환한다. 모르는 이름이면 None.
    pub fn parse(name: &str) -> Option<SongField> {
        match name {
            "url" => Some(SongField::Url),
            "title" => Some(SongField::Title),
            "size" => Some(SongField::Size),
            "author" => Some(SongField::Author),
            "md5" => Some(SongField::Md5),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SongField::Url => "url",
            SongField::Title => "title",
            SongField::Size => "size",
            SongField::Author => "author",
            SongField::Md5 => "md5",
        }
    }
}
