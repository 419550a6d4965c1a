use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::core::parser::clean_header;
use crate::error::{ParseError, Result};
use crate::sources::{Cell, CatalogSource, DirectoryEntry, FetchOutcome, RawRow, SectionPage};

pub const VGMUSIC_URL: &str = "https://vgmusic.com";

/// VGMusic 웹사이트 스크래핑 클라이언트.
/// 인증 없이 페이지 HTML을 파싱하고, 공유 세션 하나로 모든 요청을 보낸다.
pub struct VgmusicClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

/// 페이지 하단 address 태그에서 인덱서 버전을 찾는다.
fn index_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([\d.]{3,}[^.])").unwrap())
}

impl VgmusicClient {
    /// 새 클라이언트를 생성한다. User-Agent와 요청 타임아웃을 설정한다.
    pub fn new() -> Result<Self> {
        Self::with_base_url(VGMUSIC_URL)
    }

    /// 기준 URL을 바꿔서 생성한다 (테스트나 미러 사이트용).
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    /// 메인 인덱스 HTML에서 시스템 목록을 뽑는다.
    ///
    /// 디렉토리는 회사 제목(p.menularge) 다음에 시스템 링크 목록(p.menu)이
    /// 오는 구조다. 첫 번째 menu 블록은 사이트 소개 링크라 건너뛴다.
    fn directory_from_html(&self, html: &str) -> Result<Vec<DirectoryEntry>> {
        let document = Html::parse_document(html);
        let p_sel = Selector::parse("p.menularge, p.menu").unwrap();
        let a_sel = Selector::parse("a[href]").unwrap();

        let mut entries = Vec::new();
        let mut company: Option<String> = None;
        let mut seen_menu = false;

        for el in document.select(&p_sel) {
            if has_class(&el, "menularge") {
                company = Some(text_of(&el));
                continue;
            }

            // 첫 menu 블록은 VGMusic 소개 메뉴다
            if !seen_menu {
                seen_menu = true;
                continue;
            }

            for link in el.select(&a_sel) {
                let href = match link.value().attr("href") {
                    Some(href) => href,
                    None => continue,
                };
                let name = text_of(&link);
                if name.is_empty() {
                    continue;
                }
                let url = self.join(href)?;
                entries.push(DirectoryEntry { name, url, company: company.clone() });
            }
        }

        if entries.is_empty() {
            return Err(ParseError::EmptyTable.into());
        }
        Ok(entries)
    }

    /// 시스템 페이지 HTML을 행 단위로 분해한다.
    fn section_from_html(url: &str, etag: Option<String>, html: &str) -> Result<SectionPage> {
        let document = Html::parse_document(html);
        let table_sel = Selector::parse("table").unwrap();
        let tr_sel = Selector::parse("tr").unwrap();
        let th_sel = Selector::parse("th.header").unwrap();
        let td_sel = Selector::parse("td").unwrap();
        let a_sel = Selector::parse("a[href]").unwrap();
        let address_sel = Selector::parse("address").unwrap();

        // 인덱서 버전은 정보 제공용이라 없어도 페이지를 버리지 않는다
        let indexer_version = document
            .select(&address_sel)
            .next()
            .and_then(|el| {
                index_version_re()
                    .captures(&text_of(&el))
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .unwrap_or_else(|| {
                debug!("인덱서 버전을 찾지 못했다: {}", url);
                String::new()
            });

        let table = document
            .select(&table_sel)
            .next()
            .ok_or(ParseError::EmptyTable)?;

        let headers: Vec<String> = table
            .select(&th_sel)
            .map(|th| clean_header(&text_of(&th)))
            .collect();

        let mut rows = Vec::new();
        for tr in table.select(&tr_sel) {
            // 열 이름을 담은 헤더 행(th)은 스키마로만 쓰고 건너뛴다
            if tr.select(&th_sel).next().is_some() {
                continue;
            }

            if has_class(&tr, "header") {
                rows.push(RawRow::Header(text_of(&tr)));
                continue;
            }

            let text = text_of(&tr);
            if text.is_empty() {
                rows.push(RawRow::Blank);
                continue;
            }

            let cells: Vec<Cell> = tr
                .select(&td_sel)
                .map(|td| Cell {
                    text: text_of(&td),
                    href: td
                        .select(&a_sel)
                        .next()
                        .and_then(|a| a.value().attr("href"))
                        .map(|h| h.to_string()),
                })
                .collect();
            rows.push(RawRow::Song(cells));
        }

        // 데이터 행이 하나도 없으면 곡이 없는 시스템이다
        if rows.iter().all(|row| matches!(row, RawRow::Blank)) {
            return Err(ParseError::EmptyTable.into());
        }

        Ok(SectionPage { url: url.to_string(), headers, rows, etag, indexer_version })
    }

    fn join(&self, href: &str) -> Result<String> {
        let base = reqwest::Url::parse(&format!("{}/", self.base_url))
            .map_err(|_| ParseError::InvalidCell {
                column: "href",
                value: self.base_url.clone(),
            })?;
        let joined = base.join(href).map_err(|_| ParseError::InvalidCell {
            column: "href",
            value: href.to_string(),
        })?;
        Ok(joined.to_string())
    }
}

impl CatalogSource for VgmusicClient {
    fn directory(&self) -> Result<Vec<DirectoryEntry>> {
        let html = self
            .client
            .get(format!("{}/", self.base_url))
            .send()?
            .error_for_status()?
            .text()?;
        self.directory_from_html(&html)
    }

    fn section_page(&self, url: &str, etag: Option<&str>) -> Result<FetchOutcome> {
        let resp = self.client.get(url).send()?.error_for_status()?;

        let current_etag = resp
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        // 엔티티 태그가 바이트 단위로 같으면 본문을 파싱하지 않는다.
        // 페이지에 표시되는 수정 시각은 실제 내용 변경보다 늦을 수 있어
        // 시각 비교는 쓰지 않는다.
        if let (Some(known), Some(current)) = (etag, current_etag.as_deref()) {
            if known == current {
                debug!("엔티티 태그 일치, 본문 생략: {}", url);
                return Ok(FetchOutcome::NotModified);
            }
        }

        let html = resp.text()?;
        Ok(FetchOutcome::Page(Self::section_from_html(url, current_etag, &html)?))
    }

    fn download(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self.client.get(url).send()?.error_for_status()?.bytes()?;
        Ok(bytes.to_vec())
    }
}

fn text_of(el: &ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn has_class(el: &ElementRef, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}
