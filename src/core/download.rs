use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::Song;
use crate::sources::CatalogSource;

/// 곡 제목을 파일 시스템에 안전한 이름으로 바꾼다.
/// 영숫자와 공백 이외의 문자는 밑줄로 바꾸고, 연속된 밑줄은 하나로 합친 뒤
/// 양끝의 밑줄을 떼어 낸다.
pub fn sanitize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut prev_underscore = false;
    for c in title.chars() {
        if c.is_alphanumeric() || c == ' ' {
            out.push(c);
            prev_underscore = false;
        } else if !prev_underscore {
            out.push('_');
            prev_underscore = true;
        }
    }
    out.trim_matches('_').to_string()
}

/// 곡 제목에서 저장 파일명을 만든다.
pub fn song_filename(title: &str) -> String {
    format!("{}.mid", sanitize_title(title))
}

/// 배치 안에서 격리된 한 곡의 다운로드 실패.
#[derive(Debug)]
pub struct DownloadFailure {
    pub song: Song,
    pub error: Error,
}

/// 배치 다운로드 결과 집계. 한 곡의 실패가 배치를 중단시키지 않는다.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// 새로 저장한 곡과 경로.
    pub saved: Vec<(Song, PathBuf)>,
    /// 같은 이름의 파일이 이미 있어 건너뛴 곡과 경로.
    pub skipped: Vec<(Song, PathBuf)>,
    /// 실패한 곡과 원인.
    pub failed: Vec<DownloadFailure>,
}

impl DownloadReport {
    pub fn total(&self) -> usize {
        self.saved.len() + self.skipped.len() + self.failed.len()
    }
}

/// 곡 목록을 dest 디렉토리에 내려받는다.
///
/// 최대 max_concurrency개의 요청만 동시에 보내고, 전부 끝날 때까지
/// 기다린 뒤 곡별 결과를 모아 반환한다. 이미 존재하는 파일은 덮어쓰지
/// 않고 건너뛴 것으로 보고한다. 인자 오류(디렉토리 생성 실패 등)가
/// 아닌 한 개별 실패로 전체가 실패하지 않는다.
pub fn download_all(
    source: &dyn CatalogSource,
    songs: &[Song],
    dest: &Path,
    max_concurrency: usize,
    verify: bool,
) -> Result<DownloadReport> {
    std::fs::create_dir_all(dest)?;

    let mut report = DownloadReport::default();

    // 이미 있는 파일은 요청을 보내기 전에 걸러 낸다
    let mut pending: Vec<(Song, PathBuf)> = Vec::new();
    for song in songs {
        let path = dest.join(song_filename(&song.title));
        if path.is_file() {
            warn!("이미 존재하는 파일을 건너뛴다: {}", path.display());
            report.skipped.push((song.clone(), path));
        } else {
            pending.push((song.clone(), path));
        }
    }

    if pending.is_empty() {
        return Ok(report);
    }

    let next = AtomicUsize::new(0);
    let workers = max_concurrency.clamp(1, pending.len());
    let (tx, rx) = mpsc::channel::<(usize, Result<()>)>();

    let mut results: Vec<(usize, Result<()>)> = Vec::with_capacity(pending.len());
    thread::scope(|scope| {
        for _ in 0..workers {
            let tx = tx.clone();
            let next = &next;
            let pending = &pending;
            scope.spawn(move || loop {
                let i = next.fetch_add(1, Ordering::Relaxed);
                if i >= pending.len() {
                    break;
                }
                let (song, path) = &pending[i];
                let _ = tx.send((i, fetch_one(source, song, path, verify)));
            });
        }
        drop(tx);
        for pair in rx {
            results.push(pair);
        }
    });

    // 보고 순서는 요청 순서를 따른다 (완료 순서가 아니라)
    results.sort_by_key(|(i, _)| *i);
    for (i, result) in results {
        let (song, path) = pending[i].clone();
        match result {
            Ok(()) => report.saved.push((song, path)),
            Err(error) => report.failed.push(DownloadFailure { song, error }),
        }
    }

    Ok(report)
}

fn fetch_one(source: &dyn CatalogSource, song: &Song, path: &Path, verify: bool) -> Result<()> {
    info!("다운로드: {}", song.url);
    let data = source.download(&song.url)?;
    if verify && !song.verify(&data) {
        return Err(Error::DownloadVerification(format!(
            "{} (기대: {} 바이트 / md5 {})",
            song.title, song.size, song.md5
        )));
    }
    std::fs::write(path, data)?;
    Ok(())
}
