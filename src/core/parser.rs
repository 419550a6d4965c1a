use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ParseError, Result};
use crate::models::Song;
use crate::sources::Cell;

/// Normalize a header cell for use as a schema name.
///
/// "Song Title" -> "song_title", matching the column names used below.
pub fn clean_header(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// The info-page URL carries the file's md5: "/file/<md5>.html".
fn info_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/file/(.*)\.html").unwrap())
}

/// Parse one data row into a Song using the table's header schema.
///
/// Column meaning:
/// - "song_title": display text is the title; the cell link, joined against
///   the page base url, is the direct download url
/// - "file_size": leading integer token, in bytes
/// - "sequenced_by": author display text
/// - "comments": the cell link points at the info page whose name carries
///   the md5 identifier; the display text (comment count) is discarded
pub fn parse_song(base_url: &str, headers: &[String], cells: &[Cell]) -> Result<Song> {
    let mut url = None;
    let mut title = None;
    let mut size = None;
    let mut author = None;
    let mut md5 = None;

    for (header, cell) in headers.iter().zip(cells.iter()) {
        match header.as_str() {
            "song_title" => {
                let href = cell
                    .href
                    .as_deref()
                    .ok_or(ParseError::MissingColumn("song_title"))?;
                url = Some(join_url(base_url, href)?);
                title = Some(cell.text.trim().to_string());
            }
            "file_size" => {
                let token = cell
                    .text
                    .split_whitespace()
                    .next()
                    .ok_or_else(|| invalid_cell("file_size", &cell.text))?;
                let bytes: u64 = token
                    .parse()
                    .map_err(|_| invalid_cell("file_size", &cell.text))?;
                size = Some(bytes);
            }
            "sequenced_by" => {
                author = Some(cell.text.trim().to_string());
            }
            "comments" => {
                let href = cell
                    .href
                    .as_deref()
                    .ok_or(ParseError::MissingColumn("comments"))?;
                let captured = info_url_re()
                    .captures(href)
                    .and_then(|c| c.get(1))
                    .ok_or_else(|| invalid_cell("comments", href))?;
                md5 = Some(captured.as_str().to_string());
            }
            // Unknown columns are carried by the page but mean nothing to us.
            _ => {}
        }
    }

    Ok(Song {
        url: url.ok_or(ParseError::MissingColumn("song_title"))?,
        title: title.ok_or(ParseError::MissingColumn("song_title"))?,
        size: size.ok_or(ParseError::MissingColumn("file_size"))?,
        author: author.ok_or(ParseError::MissingColumn("sequenced_by"))?,
        md5: md5.ok_or(ParseError::MissingColumn("comments"))?,
    })
}

fn invalid_cell(column: &'static str, value: &str) -> ParseError {
    ParseError::InvalidCell { column, value: value.to_string() }
}

/// Join a possibly-relative href against the page base url.
fn join_url(base_url: &str, href: &str) -> Result<String> {
    let base = reqwest::Url::parse(base_url).map_err(|_| invalid_cell("song_title", base_url))?;
    let joined = base.join(href).map_err(|_| invalid_cell("song_title", href))?;
    Ok(joined.to_string())
}
