use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::{debug, info, warn};

use crate::core::cache::{self, CacheDoc};
use crate::core::download::{self, DownloadReport};
use crate::core::search::RegexCriteria;
use crate::core::system::System;
use crate::error::{Error, ParseError, Result};
use crate::models::Song;
use crate::sources::{CatalogSource, FetchOutcome};

/// 섹션의 지연 로딩 상태.
/// Pending(아직 안 가져옴)과 "가져왔지만 곡이 없음"(빈 games의 Cached)을 구분한다.
enum SectionState {
    Pending,
    Cached(Arc<System>),
}

/// 시스템 하나의 이름/URL과 로딩 상태.
///
/// state 뮤텍스가 섹션별 클레임 역할을 한다. 같은 섹션을 동시에 요청한
/// 호출자들은 진행 중인 요청 하나에 합류(대기)하게 되므로, 섹션당 네트워크
/// 요청은 프로세스 수명 동안 최대 한 번만 나간다.
struct SectionSlot {
    name: String,
    url: String,
    company: Option<String>,
    state: Mutex<SectionState>,
}

impl SectionSlot {
    fn new(name: String, url: String, company: Option<String>, state: SectionState) -> Self {
        SectionSlot { name, url, company, state: Mutex::new(state) }
    }

    fn lock(&self) -> MutexGuard<'_, SectionState> {
        // 패닉으로 오염된 잠금은 회복해서 계속 쓴다. 임계 구역은 완성된 값의
        // 대입뿐이라 중간 상태가 남지 않는다.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// VGMusic 카탈로그 전체의 지연 인덱스.
///
/// 생성 시점에는 시스템 목록(이름과 URL)만 채우고, 각 시스템 페이지는
/// 처음 접근할 때 한 번만 가져와 파싱한다. 검색과 다운로드는 이미 캐시된
/// 섹션 위에서만 동작한다.
pub struct Catalog {
    source: Box<dyn CatalogSource>,
    slots: Vec<SectionSlot>,
    cache_path: Option<PathBuf>,
}

/// force_cache_all / refresh_all의 섹션별 결과 집계.
/// 한 섹션의 실패는 다른 섹션을 막지 않고 여기에 모인다.
#[derive(Debug, Default)]
pub struct CacheOutcome {
    pub cached: Vec<String>,
    pub failed: Vec<(String, Error)>,
}

impl Catalog {
    /// 메인 디렉토리 페이지에서 시스템 목록을 받아 카탈로그를 만든다.
    /// 섹션 내용은 아직 가져오지 않는다 (전부 센티널).
    pub fn from_directory(
        source: Box<dyn CatalogSource>,
        cache_path: Option<PathBuf>,
    ) -> Result<Self> {
        let entries = source.directory()?;
        let mut slots = Vec::with_capacity(entries.len());
        for entry in entries {
            info!("시스템 추가: {} ({})", entry.name, entry.url);
            slots.push(SectionSlot::new(
                entry.name,
                entry.url,
                entry.company,
                SectionState::Pending,
            ));
        }
        Ok(Catalog { source, slots, cache_path })
    }

    /// 캐시 문서에서 카탈로그를 복원한다. 네트워크 접근이 없다.
    /// 문서에 섹션 본문이 있는 시스템은 바로 Cached 상태가 되고,
    /// urls에만 있는 시스템은 센티널로 남는다.
    pub fn from_cache(
        source: Box<dyn CatalogSource>,
        doc: CacheDoc,
        cache_path: Option<PathBuf>,
    ) -> Self {
        let mut slots: Vec<SectionSlot> = Vec::with_capacity(doc.urls.len());
        for (name, url) in doc.urls.iter() {
            slots.push(SectionSlot::new(
                name.to_string(),
                url.clone(),
                None,
                SectionState::Pending,
            ));
        }
        for (name, system) in doc.systems {
            let company = system.company.clone();
            let url = system.url.clone();
            let state = SectionState::Cached(Arc::new(system));
            match slots.iter_mut().find(|slot| slot.name == name) {
                Some(slot) => {
                    slot.company = company;
                    slot.state = Mutex::new(state);
                }
                // urls에 빠진 시스템도 받아들여 키 집합을 일치시킨다
                None => slots.push(SectionSlot::new(name, url, company, state)),
            }
        }
        Catalog { source, slots, cache_path }
    }

    /// 캐시 파일이 있으면 그 문서로, 없거나 비어 있으면 디렉토리 페이지로
    /// 카탈로그를 연다.
    pub fn open(source: Box<dyn CatalogSource>, cache_path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = &cache_path {
            let doc = cache::load(path);
            if !doc.urls.is_empty() || !doc.systems.is_empty() {
                return Ok(Catalog::from_cache(source, doc, cache_path));
            }
        }
        Catalog::from_directory(source, cache_path)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.iter().any(|slot| slot.name == name)
    }

    /// 발견 순서대로 시스템 이름을 반환한다.
    pub fn system_names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.name.as_str()).collect()
    }

    pub fn company_of(&self, name: &str) -> Result<Option<String>> {
        Ok(self.slot(name)?.company.clone())
    }

    /// 섹션이 이미 파싱되어 있는지 (센티널이 아닌지) 확인한다.
    pub fn is_cached(&self, name: &str) -> Result<bool> {
        let slot = self.slot(name)?;
        let cached = matches!(&*slot.lock(), SectionState::Cached(_));
        Ok(cached)
    }

    fn slot(&self, name: &str) -> Result<&SectionSlot> {
        self.slots
            .iter()
            .find(|slot| slot.name == name)
            .ok_or_else(|| Error::UnknownSystem(name.to_string()))
    }

    /// 시스템 섹션을 반환한다.
    ///
    /// 처음 접근하는 섹션은 이 시점에 가져와 파싱하며, 이 작업은 프로세스
    /// 수명 동안 섹션당 최대 한 번이다 (명시적 refresh 제외). 같은 섹션에
    /// 대한 동시 호출은 중복 요청 없이 같은 결과를 본다.
    pub fn get(&self, name: &str) -> Result<Arc<System>> {
        let slot = self.slot(name)?;
        let mut state = slot.lock();
        if let SectionState::Cached(system) = &*state {
            return Ok(system.clone());
        }
        debug!("처음 접근하는 시스템: {}", name);
        self.fetch_locked(slot, &mut state)
    }

    /// 섹션을 조건부로 다시 가져온다.
    ///
    /// 저장된 엔티티 태그를 소스에 넘기고, 태그가 그대로면 기존 내용을
    /// 그대로 유지한다 (재파싱 없음). 내용이 바뀌었으면 섹션을 통째로
    /// 교체한다.
    pub fn refresh(&self, name: &str) -> Result<Arc<System>> {
        let slot = self.slot(name)?;
        let mut state = slot.lock();
        self.fetch_locked(slot, &mut state)
    }

    /// 잠금을 쥔 채 섹션을 가져와 상태를 갱신한다.
    fn fetch_locked(
        &self,
        slot: &SectionSlot,
        state: &mut SectionState,
    ) -> Result<Arc<System>> {
        let known_etag = match &*state {
            SectionState::Cached(system) => system.etag().map(|s| s.to_string()),
            SectionState::Pending => None,
        };

        info!("파싱: {}", slot.url);
        match self.source.section_page(&slot.url, known_etag.as_deref()) {
            Ok(FetchOutcome::NotModified) => match &*state {
                SectionState::Cached(system) => {
                    debug!("{}: 엔티티 태그가 같아 다시 파싱하지 않는다", slot.name);
                    Ok(system.clone())
                }
                SectionState::Pending => {
                    // 태그를 넘기지 않았는데 NotModified가 온 경우. 소스 쪽
                    // 계약 위반이지만 빈 섹션으로 처리해 진행은 가능하게 한다.
                    warn!("{}: 캐시된 내용이 없는데 NotModified를 받았다", slot.name);
                    let system = Arc::new(System::empty(&slot.url, slot.company.clone()));
                    *state = SectionState::Cached(system.clone());
                    Ok(system)
                }
            },
            Ok(FetchOutcome::Page(page)) => {
                let system = Arc::new(System::from_page(&page, slot.company.clone())?);
                info!(
                    "완료: {} (게임 {}개, 곡 {}개)",
                    slot.name,
                    system.games.len(),
                    system.total_songs()
                );
                *state = SectionState::Cached(system.clone());
                Ok(system)
            }
            // 곡이 하나도 없는 시스템은 에러가 아니라 빈 섹션이라는 말단 상태다
            Err(Error::Parse(ParseError::EmptyTable)) => {
                debug!("{}: 곡이 없는 시스템", slot.name);
                let system = Arc::new(System::empty(&slot.url, slot.company.clone()));
                *state = SectionState::Cached(system.clone());
                Ok(system)
            }
            Err(e) => Err(e),
        }
    }

    /// 모든 섹션의 지연 로딩을 병렬로 미리 수행한다 (이미 캐시된 섹션은 그대로).
    /// 전체 카탈로그 검색 전에 인덱스를 덥히는 용도다.
    pub fn force_cache_all(&self, max_concurrency: usize) -> CacheOutcome {
        self.fan_out(max_concurrency, false)
    }

    /// 모든 섹션을 엔티티 태그 기준으로 조건부 갱신한다.
    pub fn refresh_all(&self, max_concurrency: usize) -> CacheOutcome {
        self.fan_out(max_concurrency, true)
    }

    /// 고정된 개수의 워커로 모든 섹션에 fan-out하고, 전부 끝나면 섹션별
    /// 결과를 모아 돌려준다. 섹션 하나의 실패가 형제 작업을 취소하지 않는다.
    fn fan_out(&self, max_concurrency: usize, refresh: bool) -> CacheOutcome {
        let next = AtomicUsize::new(0);
        let workers = max_concurrency.clamp(1, self.slots.len().max(1));
        let (tx, rx) = mpsc::channel::<(usize, Result<()>)>();

        let mut results: Vec<(usize, Result<()>)> = Vec::with_capacity(self.slots.len());
        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let next = &next;
                scope.spawn(move || loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    if i >= self.slots.len() {
                        break;
                    }
                    let name = &self.slots[i].name;
                    let result = if refresh { self.refresh(name) } else { self.get(name) };
                    let _ = tx.send((i, result.map(|_| ())));
                });
            }
            drop(tx);
            for pair in rx {
                results.push(pair);
            }
        });

        // 완료 순서가 아니라 발견 순서대로 보고한다
        results.sort_by_key(|(i, _)| *i);
        let mut outcome = CacheOutcome::default();
        for (i, result) in results {
            let name = self.slots[i].name.clone();
            match result {
                Ok(()) => outcome.cached.push(name),
                Err(e) => {
                    warn!("섹션 캐싱 실패: {} ({})", name, e);
                    outcome.failed.push((name, e));
                }
            }
        }
        outcome
    }

    /// 술어로 곡을 검색한다.
    ///
    /// 이미 캐시된 섹션만 대상으로 하며 네트워크 접근이 전혀 없다. 전체
    /// 카탈로그를 검색하려면 먼저 force_cache_all을 불러야 한다. 결과는
    /// 시스템 발견 순서 -> 게임 순서 -> 행 순서를 그대로 따른다.
    pub fn search<F>(&self, mut criteria: F) -> Vec<Song>
    where
        F: FnMut(&str, &str, &Song) -> bool,
    {
        let mut songs = Vec::new();
        for slot in &self.slots {
            let system = match &*slot.lock() {
                SectionState::Cached(system) => system.clone(),
                SectionState::Pending => continue,
            };
            for (game, list) in system.games.iter() {
                for song in list {
                    if criteria(&slot.name, game, song) {
                        songs.push(song.clone());
                    }
                }
            }
        }
        songs
    }

    /// 정규식으로 곡을 검색한다.
    ///
    /// 키는 "system", "game" 또는 Song 필드 이름이고, 패턴은 부분 일치다
    /// (정확한 일치는 ^...$로 앵커). 패턴 개수 초과는 검색이 시작되기 전에
    /// 실패한다.
    pub fn search_by_regex(&self, patterns: &[(String, String)]) -> Result<Vec<Song>> {
        let criteria = RegexCriteria::from_pairs(patterns)?;
        Ok(self.search(|system, game, song| criteria.matches(system, game, song)))
    }

    /// 캐시된 모든 곡.
    pub fn all_songs(&self) -> Vec<Song> {
        self.search(|_, _, _| true)
    }

    /// 곡 목록을 내려받는다. 자세한 규칙은 download::download_all 참고.
    pub fn download(
        &self,
        songs: &[Song],
        dest: &Path,
        max_concurrency: usize,
        verify: bool,
    ) -> Result<DownloadReport> {
        download::download_all(self.source.as_ref(), songs, dest, max_concurrency, verify)
    }

    /// 현재 상태를 캐시 문서로 직렬화한다. 센티널 섹션은 urls에만 남는다.
    pub fn cache(&self) -> CacheDoc {
        let mut doc = CacheDoc::default();
        for slot in &self.slots {
            doc.urls.insert(slot.name.clone(), slot.url.clone());
            if let SectionState::Cached(system) = &*slot.lock() {
                doc.systems.insert(slot.name.clone(), (**system).clone());
            }
        }
        doc
    }

    /// 설정된 경로가 있으면 캐시 문서를 그 파일에 기록한다.
    pub fn save(&self) -> Result<()> {
        if let Some(path) = &self.cache_path {
            cache::save(path, &self.cache())?;
            info!("캐시 저장: {}", path.display());
        }
        Ok(())
    }

    /// 캐시를 저장하고 카탈로그를 닫는다. 네트워크 세션은 drop으로 해제된다.
    pub fn close(self) -> Result<()> {
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{Cell, DirectoryEntry, RawRow, SectionPage};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    /// 미리 등록한 페이지를 돌려주는 카탈로그 소스 스텁.
    struct StubSource {
        directory: Vec<DirectoryEntry>,
        pages: Mutex<HashMap<String, SectionPage>>,
        empty_urls: Vec<String>,
        fail_urls: Vec<String>,
        page_calls: AtomicUsize,
    }

    impl StubSource {
        fn new(systems: &[(&str, &str)]) -> Self {
            StubSource {
                directory: systems
                    .iter()
                    .map(|(name, url)| DirectoryEntry {
                        name: name.to_string(),
                        url: url.to_string(),
                        company: None,
                    })
                    .collect(),
                pages: Mutex::new(HashMap::new()),
                empty_urls: Vec::new(),
                fail_urls: Vec::new(),
                page_calls: AtomicUsize::new(0),
            }
        }

        fn set_page(&self, page: SectionPage) {
            self.pages.lock().unwrap().insert(page.url.clone(), page);
        }

        fn calls(&self) -> usize {
            self.page_calls.load(Ordering::SeqCst)
        }
    }

    impl CatalogSource for StubSource {
        fn directory(&self) -> Result<Vec<DirectoryEntry>> {
            Ok(self.directory.clone())
        }

        fn section_page(&self, url: &str, etag: Option<&str>) -> Result<FetchOutcome> {
            self.page_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_urls.iter().any(|u| u == url) {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "연결 실패",
                )));
            }
            if self.empty_urls.iter().any(|u| u == url) {
                return Err(ParseError::EmptyTable.into());
            }
            let page = self
                .pages
                .lock()
                .unwrap()
                .get(url)
                .expect("스텁에 등록되지 않은 URL")
                .clone();
            if let (Some(known), Some(current)) = (etag, page.etag.as_deref()) {
                if known == current {
                    return Ok(FetchOutcome::NotModified);
                }
            }
            Ok(FetchOutcome::Page(page))
        }

        fn download(&self, _url: &str) -> Result<Vec<u8>> {
            Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "다운로드 없음",
            )))
        }
    }

    fn song_cells(title: &str, md5: &str) -> Vec<Cell> {
        vec![
            Cell { text: title.to_string(), href: Some(format!("{}.mid", md5)) },
            Cell { text: "100 bytes".to_string(), href: None },
            Cell { text: "someone".to_string(), href: None },
            Cell { text: "0".to_string(), href: Some(format!("/file/{}.html", md5)) },
        ]
    }

    fn page(url: &str, etag: &str, games: &[(&str, &[&str])]) -> SectionPage {
        let mut rows = Vec::new();
        for (game, titles) in games {
            rows.push(RawRow::Header(game.to_string()));
            for (i, title) in titles.iter().enumerate() {
                rows.push(RawRow::Song(song_cells(title, &format!("{}{}", game.len(), i))));
            }
            rows.push(RawRow::Blank);
        }
        SectionPage {
            url: url.to_string(),
            headers: ["song_title", "file_size", "sequenced_by", "comments"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rows,
            etag: Some(etag.to_string()),
            indexer_version: "2.7".to_string(),
        }
    }

    const NES_URL: &str = "https://vgmusic.com/music/console/nintendo/nes/";
    const SNES_URL: &str = "https://vgmusic.com/music/console/nintendo/snes/";

    fn two_system_stub() -> StubSource {
        let stub = StubSource::new(&[("NES", NES_URL), ("SNES", SNES_URL)]);
        stub.set_page(page(NES_URL, "\"nes-1\"", &[("Chrono Trigger", &["Battle"])]));
        stub.set_page(page(
            SNES_URL,
            "\"snes-1\"",
            &[("Final Fantasy", &["Prelude", "Battle Theme"])],
        ));
        stub
    }

    #[test]
    fn test_lazy_get_end_to_end() {
        let catalog =
            Catalog::from_directory(Box::new(two_system_stub()), None).unwrap();
        assert_eq!(catalog.system_names(), vec!["NES", "SNES"]);

        let nes = catalog.get("NES").unwrap();
        let games: Vec<&str> = nes.games.keys().collect();
        assert_eq!(games, vec!["Chrono Trigger"]);
        assert_eq!(nes.total_songs(), 1);

        // SNES는 접근하기 전까지 센티널로 남는다
        assert!(!catalog.is_cached("SNES").unwrap());
        let doc = catalog.cache();
        assert!(doc.urls.contains_key("SNES"));
        assert!(doc.systems.get("SNES").is_none());
    }

    #[test]
    fn test_unknown_system() {
        let catalog =
            Catalog::from_directory(Box::new(two_system_stub()), None).unwrap();
        let err = catalog.get("N64").unwrap_err();
        assert!(matches!(err, Error::UnknownSystem(name) if name == "N64"));
    }

    #[test]
    fn test_get_fetches_at_most_once() {
        let stub = Arc::new(two_system_stub());
        let catalog =
            Catalog::from_directory(Box::new(SharedStub(stub.clone())), None).unwrap();
        catalog.get("NES").unwrap();
        catalog.get("NES").unwrap();
        assert_eq!(stub.calls(), 1);
    }

    /// Arc로 감싼 스텁을 Box<dyn CatalogSource>로 넘기기 위한 래퍼.
    struct SharedStub(Arc<StubSource>);

    impl CatalogSource for SharedStub {
        fn directory(&self) -> Result<Vec<DirectoryEntry>> {
            self.0.directory()
        }
        fn section_page(&self, url: &str, etag: Option<&str>) -> Result<FetchOutcome> {
            self.0.section_page(url, etag)
        }
        fn download(&self, url: &str) -> Result<Vec<u8>> {
            self.0.download(url)
        }
    }

    #[test]
    fn test_concurrent_gets_fetch_once() {
        let stub = Arc::new(two_system_stub());
        let catalog =
            Catalog::from_directory(Box::new(SharedStub(stub.clone())), None).unwrap();

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let system = catalog.get("NES").unwrap();
                    assert_eq!(system.total_songs(), 1);
                });
            }
        });

        assert_eq!(stub.calls(), 1, "동시 접근에도 요청은 한 번이어야 한다");
    }

    #[test]
    fn test_refresh_unchanged_etag_keeps_section() {
        let stub = Arc::new(two_system_stub());
        let catalog =
            Catalog::from_directory(Box::new(SharedStub(stub.clone())), None).unwrap();

        let first = catalog.get("NES").unwrap();
        let second = catalog.refresh("NES").unwrap();

        // 태그가 같으면 재파싱 없이 같은 섹션 객체가 유지된다
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(stub.calls(), 2);
    }

    #[test]
    fn test_refresh_changed_etag_replaces_wholesale() {
        let stub = Arc::new(two_system_stub());
        let catalog =
            Catalog::from_directory(Box::new(SharedStub(stub.clone())), None).unwrap();

        let first = catalog.get("NES").unwrap();
        stub.set_page(page(
            NES_URL,
            "\"nes-2\"",
            &[("Chrono Trigger", &["Battle", "Magus"])],
        ));

        let second = catalog.refresh("NES").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.total_songs(), 2);
        assert_eq!(second.etag(), Some("\"nes-2\""));
    }

    #[test]
    fn test_zero_song_system_becomes_empty_section() {
        let mut stub = StubSource::new(&[("Other", "https://vgmusic.com/music/other/")]);
        stub.empty_urls.push("https://vgmusic.com/music/other/".to_string());

        let catalog = Catalog::from_directory(Box::new(stub), None).unwrap();
        let system = catalog.get("Other").unwrap();
        assert!(system.games.is_empty());
        // 센티널이 아니라 파싱이 끝난 상태다
        assert!(catalog.is_cached("Other").unwrap());
    }

    #[test]
    fn test_search_never_touches_network() {
        let stub = Arc::new(two_system_stub());
        let catalog =
            Catalog::from_directory(Box::new(SharedStub(stub.clone())), None).unwrap();

        catalog.get("NES").unwrap();
        let calls_before = stub.calls();

        let songs = catalog.search(|_, _, _| true);
        // SNES는 센티널이므로 NES의 곡만 나온다
        assert_eq!(songs.len(), 1);
        assert_eq!(stub.calls(), calls_before);
    }

    #[test]
    fn test_search_order_is_discovery_order() {
        let catalog =
            Catalog::from_directory(Box::new(two_system_stub()), None).unwrap();
        catalog.force_cache_all(4);

        let titles: Vec<String> =
            catalog.search(|_, _, _| true).into_iter().map(|s| s.title).collect();
        // 시스템 발견 순서(NES, SNES) -> 행 순서
        assert_eq!(titles, vec!["Battle", "Prelude", "Battle Theme"]);

        // 같은 상태에서 검색은 항상 같은 결과를 낸다
        let again: Vec<String> =
            catalog.search(|_, _, _| true).into_iter().map(|s| s.title).collect();
        assert_eq!(again, titles);
    }

    #[test]
    fn test_search_by_regex_boundary() {
        let catalog =
            Catalog::from_directory(Box::new(two_system_stub()), None).unwrap();
        catalog.force_cache_all(4);

        let exact = catalog
            .search_by_regex(&[("title".to_string(), "^Battle$".to_string())])
            .unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].title, "Battle");

        let substring = catalog
            .search_by_regex(&[("title".to_string(), "Battle".to_string())])
            .unwrap();
        assert_eq!(substring.len(), 2);
    }

    #[test]
    fn test_force_cache_all_isolates_failures() {
        let mut stub = StubSource::new(&[
            ("NES", NES_URL),
            ("Broken", "https://vgmusic.com/music/broken/"),
            ("Other", "https://vgmusic.com/music/other/"),
        ]);
        stub.set_page(page(NES_URL, "\"nes-1\"", &[("Chrono Trigger", &["Battle"])]));
        stub.fail_urls.push("https://vgmusic.com/music/broken/".to_string());
        stub.empty_urls.push("https://vgmusic.com/music/other/".to_string());

        let catalog = Catalog::from_directory(Box::new(stub), None).unwrap();
        let outcome = catalog.force_cache_all(2);

        assert_eq!(outcome.cached, vec!["NES".to_string(), "Other".to_string()]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "Broken");
        // 실패한 섹션은 센티널로 남아 다음 시도에서 다시 가져올 수 있다
        assert!(!catalog.is_cached("Broken").unwrap());
        assert!(catalog.is_cached("NES").unwrap());
    }

    #[test]
    fn test_cache_round_trip_without_network() {
        let catalog =
            Catalog::from_directory(Box::new(two_system_stub()), None).unwrap();
        catalog.force_cache_all(4);
        let doc = catalog.cache();

        let text = cache::to_json(&doc).unwrap();
        let reloaded = cache::from_json(&text).unwrap();
        assert_eq!(reloaded, doc);

        // 복원된 카탈로그는 네트워크 없이 같은 구조와 순서를 보여야 한다
        let stub = Arc::new(StubSource::new(&[]));
        let restored =
            Catalog::from_cache(Box::new(SharedStub(stub.clone())), reloaded, None);
        assert_eq!(restored.system_names(), catalog.system_names());

        let titles: Vec<String> =
            restored.search(|_, _, _| true).into_iter().map(|s| s.title).collect();
        assert_eq!(titles, vec!["Battle", "Prelude", "Battle Theme"]);
        assert_eq!(stub.calls(), 0);

        let games_before = catalog.get("SNES").unwrap();
        let games_after = restored.get("SNES").unwrap();
        assert_eq!(games_after.games, games_before.games);
    }

    #[test]
    fn test_from_cache_keeps_sentinel_for_unfetched() {
        let catalog =
            Catalog::from_directory(Box::new(two_system_stub()), None).unwrap();
        catalog.get("NES").unwrap();
        let doc = catalog.cache();

        let stub = Arc::new(two_system_stub());
        let restored =
            Catalog::from_cache(Box::new(SharedStub(stub.clone())), doc, None);
        assert!(restored.is_cached("NES").unwrap());
        assert!(!restored.is_cached("SNES").unwrap());

        // 센티널 섹션은 접근 시점에 가져온다
        let snes = restored.get("SNES").unwrap();
        assert_eq!(snes.total_songs(), 2);
        assert_eq!(stub.calls(), 1);
    }

    #[test]
    fn test_refresh_all_mixes_conditional_and_fresh() {
        let stub = Arc::new(two_system_stub());
        let catalog =
            Catalog::from_directory(Box::new(SharedStub(stub.clone())), None).unwrap();

        // NES만 캐시된 상태에서 전체 갱신
        let nes_before = catalog.get("NES").unwrap();
        let outcome = catalog.refresh_all(2);
        assert!(outcome.failed.is_empty());
        assert_eq!(outcome.cached.len(), 2);

        // NES는 태그가 같아 유지되고, SNES는 새로 가져온다
        let nes_after = catalog.get("NES").unwrap();
        assert!(Arc::ptr_eq(&nes_before, &nes_after));
        assert!(catalog.is_cached("SNES").unwrap());
    }
}
