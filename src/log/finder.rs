use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref RE_LOG_FILE: Regex = Regex::new(r"^nwclientLog(\d+)\.txt$").unwrap();
}

/// One member of the numbered log family, as seen on this poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileEntry {
    pub path: PathBuf,
    pub number: u32,
    pub len: u64,
    pub modified: SystemTime,
}

/// Lists `nwclientLogN.txt` files in `dir`, lowest number first.
pub fn list_log_files(dir: &Path) -> io::Result<Vec<LogFileEntry>> {
    let mut entries: Vec<LogFileEntry> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let number = RE_LOG_FILE
                .captures(name.to_str()?)?
                .get(1)?
                .as_str()
                .parse::<u32>()
                .ok()?;
            // Files can vanish between read_dir and stat; skip them this round.
            let metadata = entry.metadata().ok().filter(|m| m.is_file())?;
            Some(LogFileEntry {
                path: entry.path(),
                number,
                len: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            })
        })
        .collect();
    entries.sort_by_key(|entry| entry.number);
    Ok(entries)
}

/// The file the game is currently writing: most recently modified, and on a
/// tie the lowest number, since that is the one a fresh session writes first.
pub fn select_active(entries: &[LogFileEntry]) -> Option<&LogFileEntry> {
    entries
        .iter()
        .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| b.number.cmp(&a.number)))
}

pub fn find_latest_log_file_in_dir(dir: &Path) -> Option<PathBuf> {
    let entries = list_log_files(dir).ok()?;
    select_active(&entries).map(|entry| entry.path.clone())
}

/// Where the game keeps its logs on this platform, most likely first.
pub fn default_log_directories() -> Vec<PathBuf> {
    if cfg!(windows) {
        vec![get_onedrive_logs_path(), get_regular_logs_path()]
    } else {
        vec![get_unix_logs_path(), get_unix_documents_logs_path()]
    }
}

/// Picks the directory to follow. A configured directory always wins; otherwise
/// the default location holding the most recently written log, falling back to
/// the first default so a missing directory can still be reported.
pub fn resolve_log_directory(configured: Option<&Path>) -> PathBuf {
    if let Some(dir) = configured {
        return dir.to_path_buf();
    }

    let candidates = default_log_directories();
    candidates
        .iter()
        .filter_map(|dir| {
            let entries = list_log_files(dir).ok()?;
            let modified = select_active(&entries)?.modified;
            Some((modified, dir))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, dir)| dir.clone())
        .or_else(|| candidates.first().cloned())
        .unwrap_or_default()
}

fn windows_home() -> String {
    std::env::var("USERPROFILE").unwrap_or_else(|_| {
        std::env::var("USERNAME")
            .map(|username| format!("C:\\Users\\{}", username))
            .unwrap_or_else(|_| "C:\\Users\\Default".to_string())
    })
}

fn unix_home() -> String {
    std::env::var("HOME").unwrap_or_else(|_| {
        std::env::var("USER")
            .map(|user| format!("/home/{}", user))
            .unwrap_or_else(|_| "/home/default".to_string())
    })
}

pub fn get_onedrive_logs_path() -> PathBuf {
    let mut path = PathBuf::from(windows_home());
    path.push("OneDrive");
    path.push("Documents");
    path.push("Neverwinter Nights");
    path.push("logs");
    path
}

pub fn get_regular_logs_path() -> PathBuf {
    let mut path = PathBuf::from(windows_home());
    path.push("Documents");
    path.push("Neverwinter Nights");
    path.push("logs");
    path
}

pub fn get_unix_logs_path() -> PathBuf {
    let mut path = PathBuf::from(unix_home());
    path.push(".local");
    path.push("share");
    path.push("Neverwinter Nights");
    path.push("logs");
    path
}

pub fn get_unix_documents_logs_path() -> PathBuf {
    let mut path = PathBuf::from(unix_home());
    path.push("Documents");
    path.push("Neverwinter Nights");
    path.push("logs");
    path
}
