/*!
 * /proc-Backed Process Query
 *
 * Reads `/proc/<pid>/stat` for the scheduler counters and
 * `/proc/<pid>/exe` for the image path. Field parsing is explicitly
 * fallible: a present-but-unreadable row reports `Malformed` rather than a
 * guessed value.
 */

use super::{ProcessQuery, ProcessRow, QueryError, QueryResult};
use crate::core::types::Pid;
use log::debug;
use std::io::ErrorKind;
use std::path::PathBuf;

/// stat(5) field positions, counted after the closing paren of comm
const STAT_PPID: usize = 1;
const STAT_UTIME: usize = 11;
const STAT_STIME: usize = 12;
const STAT_RSS_PAGES: usize = 21;

/// Process query backed by the Linux proc filesystem
#[derive(Debug, Clone)]
pub struct ProcPidQuery {
    page_size: u64,
}

impl ProcPidQuery {
    pub fn new() -> Self {
        // stat(5) reports rss in pages.
        let page_size = unsafe { nix::libc::sysconf(nix::libc::_SC_PAGESIZE) };
        Self {
            page_size: if page_size > 0 { page_size as u64 } else { 4096 },
        }
    }

    fn proc_dir(pid: Pid) -> PathBuf {
        PathBuf::from(format!("/proc/{}", pid))
    }
}

impl Default for ProcPidQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessQuery for ProcPidQuery {
    fn query(&self, pid: Pid) -> QueryResult<ProcessRow> {
        let dir = Self::proc_dir(pid);

        let stat = match std::fs::read_to_string(dir.join("stat")) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(QueryError::NotFound(pid));
            }
            Err(err) => return Err(QueryError::Io(err)),
        };

        let (parent_pid, user_time, system_time, rss_pages) = parse_stat(pid, &stat)?;

        // The exe link is withheld for processes we cannot ptrace; the
        // launch path treats an empty image as fatal, sanity checks ignore it.
        let image_path = match std::fs::read_link(dir.join("exe")) {
            Ok(path) => path.display().to_string(),
            Err(err) => {
                debug!("No image path for pid {}: {}", pid, err);
                String::new()
            }
        };

        Ok(ProcessRow {
            parent_pid,
            user_time,
            system_time,
            resident_size_bytes: rss_pages.saturating_mul(self.page_size),
            image_path,
        })
    }
}

/// Parse the ppid, utime, stime, and rss fields out of a stat(5) line.
///
/// The comm field is parenthesised and may itself contain spaces or parens,
/// so fields are counted from the last closing paren.
fn parse_stat(pid: Pid, contents: &str) -> QueryResult<(i64, u64, u64, u64)> {
    let malformed = |reason: &str| QueryError::Malformed {
        pid,
        reason: reason.to_string(),
    };

    let tail_start = contents
        .rfind(')')
        .ok_or_else(|| malformed("comm field not closed"))?;
    let fields: Vec<&str> = contents[tail_start + 1..].split_whitespace().collect();

    // state + ppid .. rss: anything shorter is a truncated row
    if fields.len() <= STAT_RSS_PAGES {
        return Err(malformed("truncated stat row"));
    }

    let parent_pid = fields[STAT_PPID]
        .parse::<i64>()
        .map_err(|_| malformed("unparseable ppid"))?;
    let user_time = fields[STAT_UTIME]
        .parse::<u64>()
        .map_err(|_| malformed("unparseable utime"))?;
    let system_time = fields[STAT_STIME]
        .parse::<u64>()
        .map_err(|_| malformed("unparseable stime"))?;
    let rss_pages = fields[STAT_RSS_PAGES]
        .parse::<u64>()
        .map_err(|_| malformed("unparseable rss"))?;

    Ok((parent_pid, user_time, system_time, rss_pages))
}
