use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use dialoguer::Confirm;

use crate::config::{self, Config};
use crate::core::catalog::{CacheOutcome, Catalog};
use crate::models::Song;
use crate::sources::vgmusic::VgmusicClient;

/// 검색 결과를 한 번에 보여 줄 행 수.
const PAGE_SIZE: usize = 20;

#[derive(Parser)]
#[command(name = "vgmidi", about = "VGMusic 게임 음악 MIDI 인덱서 / 다운로더")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 인덱스 캐시 파일 경로 (기본값은 설정 파일을 따름)
    #[arg(short = 'c', long, global = true)]
    pub cache_file: Option<PathBuf>,

    /// MIDI 파일을 내려받을 디렉토리
    #[arg(short = 'd', long, global = true)]
    pub download_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// VGMusic 페이지를 파싱하여 캐시 파일만 갱신
    Parse,
    /// 캐시된 인덱스에서 곡 검색
    ///
    /// 검색 조건은 '<필드>=<정규식>' 형태다. 정규식은 부분 일치이며,
    /// 정확히 일치시키려면 ^와 $로 앵커해야 한다.
    /// 필드: system, game, url, title, size, author, md5
    ///
    /// 예: vgmidi search "system=^SNES$" "game=^Chrono Trigger$" "title=^[Mm]agus"
    Search {
        /// '<필드>=<정규식>' 형태의 검색 조건 목록
        query: Vec<String>,
    },
    /// 검색 결과의 MIDI 파일 다운로드 (조건이 없으면 전체 다운로드)
    Download {
        /// '<필드>=<정규식>' 형태의 검색 조건 목록
        query: Vec<String>,
        /// 동시 다운로드 수
        #[arg(short = 'n', long)]
        max_requests: Option<usize>,
        /// 다운로드 후 크기/MD5 검증
        #[arg(long)]
        verify: bool,
    },
}

pub fn run(cli: Cli) -> Result<()> {
    let cfg = config::load_config();
    let cache_file = cli.cache_file.unwrap_or_else(|| cfg.cache_file.clone());
    let download_dir = cli.download_dir.unwrap_or_else(|| cfg.download_dir.clone());

    match cli.command {
        Commands::Parse => cmd_parse(&cache_file, &cfg),
        Commands::Search { query } => cmd_search(&cache_file, &cfg, &query),
        Commands::Download { query, max_requests, verify } => cmd_download(
            &cache_file,
            &download_dir,
            &cfg,
            &query,
            max_requests.unwrap_or(cfg.max_requests),
            verify || cfg.verify_downloads,
        ),
    }
}

fn open_catalog(cache_file: &Path) -> Result<Catalog> {
    let source = VgmusicClient::new().context("VGMusic 클라이언트 생성에 실패했습니다")?;
    Catalog::open(Box::new(source), Some(cache_file.to_path_buf()))
        .context("카탈로그 초기화에 실패했습니다")
}

fn report_outcome(outcome: &CacheOutcome) {
    println!("{}개 시스템 캐시 완료", outcome.cached.len());
    for (name, error) in &outcome.failed {
        println!("캐시 실패: {} ({})", name, error);
    }
}

fn cmd_parse(cache_file: &Path, cfg: &Config) -> Result<()> {
    let catalog = open_catalog(cache_file)?;
    let outcome = catalog.refresh_all(cfg.max_requests);
    report_outcome(&outcome);
    catalog.close().context("캐시 저장에 실패했습니다")?;
    Ok(())
}

fn cmd_search(cache_file: &Path, cfg: &Config, query: &[String]) -> Result<()> {
    let patterns = parse_query(query)?;

    let catalog = open_catalog(cache_file)?;
    // 전체 카탈로그를 대상으로 검색하려면 먼저 모든 섹션을 덥혀야 한다
    let outcome = catalog.force_cache_all(cfg.max_requests);
    report_outcome(&outcome);

    let songs = catalog.search_by_regex(&patterns)?;
    display_songs(&songs)?;

    catalog.close().context("캐시 저장에 실패했습니다")?;
    Ok(())
}

fn cmd_download(
    cache_file: &Path,
    download_dir: &Path,
    cfg: &Config,
    query: &[String],
    max_requests: usize,
    verify: bool,
) -> Result<()> {
    let patterns = parse_query(query)?;

    let catalog = open_catalog(cache_file)?;
    let outcome = catalog.force_cache_all(cfg.max_requests);
    report_outcome(&outcome);

    let songs = if patterns.is_empty() {
        let sure = Confirm::new()
            .with_prompt("경고: VGMusic의 모든 MIDI 파일을 내려받으려 합니다. 계속할까요?")
            .default(false)
            .interact()?;
        if !sure {
            println!("취소했습니다.");
            catalog.close().context("캐시 저장에 실패했습니다")?;
            return Ok(());
        }
        catalog.all_songs()
    } else {
        catalog.search_by_regex(&patterns)?
    };

    if songs.is_empty() {
        println!("일치하는 곡이 없습니다.");
    } else {
        println!("{}곡 다운로드 시작 ({})", songs.len(), download_dir.display());
        let report = catalog
            .download(&songs, download_dir, max_requests, verify)
            .context("다운로드를 시작하지 못했습니다")?;

        println!(
            "저장 {}곡, 건너뜀 {}곡, 실패 {}곡",
            report.saved.len(),
            report.skipped.len(),
            report.failed.len()
        );
        for failure in &report.failed {
            println!("실패: {} ({})", failure.song.summary(), failure.error);
        }
    }

    catalog.close().context("캐시 저장에 실패했습니다")?;
    Ok(())
}

/// '<필드>=<정규식>' 목록을 (키, 패턴) 쌍으로 해석한다.
fn parse_query(query: &[String]) -> Result<Vec<(String, String)>> {
    query
        .iter()
        .map(|q| {
            q.split_once('=')
                .map(|(field, regex)| (field.to_string(), regex.to_string()))
                .with_context(|| format!("잘못된 검색 조건입니다 (형식: 필드=정규식): {}", q))
        })
        .collect()
}

/// 검색 결과를 페이지 단위 표로 보여 준다.
fn display_songs(songs: &[Song]) -> Result<()> {
    if songs.is_empty() {
        println!("일치하는 곡이 없습니다.");
        return Ok(());
    }

    for (page_no, page) in songs.chunks(PAGE_SIZE).enumerate() {
        if page_no > 0 {
            let more = Confirm::new()
                .with_prompt("계속 보시겠습니까?")
                .default(true)
                .interact()?;
            if !more {
                break;
            }
        }

        let mut table = Table::new();
        table.set_header(vec!["제목", "작성자", "크기(바이트)", "URL"]);
        for song in page {
            table.add_row(vec![
                Cell::new(&song.title),
                Cell::new(&song.author),
                Cell::new(song.size),
                Cell::new(&song.url),
            ]);
        }
        println!("{table}");
    }

    println!("\n총 {}곡", songs.len());
    Ok(())
}
