//! External-tool adapter driving OpenSSH-compatible `ssh`/`scp` binaries
//!
//! Listing runs `ssh <host> ls -la <path>` and parses the long-format
//! output; copying runs one `scp` per source and parses its progress
//! lines. Passwords are fed through an `sshpass`-style wrapper via the
//! environment so they never appear on a command line.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use parking_lot::Mutex;
use regex::Regex;
use secrecy::ExposeSecret;

use crate::browser::types::{DirectoryEntry, EntryKind, FileSource};
use crate::config::ToolConfig;
use crate::error::ClientError;
use crate::session::SessionInfo;

use super::{
    BrowserModel, CancelToken, CopyOutcome, DirectoryListing, ListOutcome, ProgressEvent,
    ProgressUpdate, TransferClient, TransferTotals,
};

/// Transfer client backed by external OpenSSH-compatible tools.
pub struct ScpToolClient {
    config: ToolConfig,
}

impl ScpToolClient {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    /// Base command for a tool invocation, wrapped for password delivery
    /// when the session carries one.
    fn tool_command(&self, tool: &str, session: &SessionInfo) -> Command {
        match &session.password {
            Some(password) => {
                let mut cmd = Command::new(&self.config.sshpass_path);
                cmd.arg("-e").arg(tool);
                // Exposed only here, into the child environment
                cmd.env("SSHPASS", password.expose_secret());
                cmd
            }
            None => {
                let mut cmd = Command::new(tool);
                // Without a password, fail fast instead of prompting so a
                // rejected key surfaces as a retryable auth error
                cmd.arg("-o").arg("BatchMode=yes");
                cmd
            }
        }
    }

    fn common_args(&self, cmd: &mut Command, session: &SessionInfo, port_flag: &str) {
        cmd.arg(port_flag).arg(session.port.to_string());
        cmd.arg("-o")
            .arg(format!("ConnectTimeout={}", self.config.connect_timeout_secs));
        if let Some(identity) = &session.identity_file {
            cmd.arg("-i").arg(identity);
        }
        for extra in &self.config.extra_args {
            cmd.arg(extra);
        }
    }

    /// Endpoint spec as scp expects it: `user@host:path` for remote,
    /// plain path for local.
    fn endpoint_spec(session: &SessionInfo, entry: &DirectoryEntry) -> String {
        match entry.source {
            FileSource::Remote => {
                format!("{}:{}", session.user_at_host(), entry.path.to_string_lossy())
            }
            FileSource::Local => entry.path.to_string_lossy().to_string(),
        }
    }

    fn copy_one(
        &self,
        session: &SessionInfo,
        source: &DirectoryEntry,
        target: &DirectoryEntry,
        progress: &mut dyn FnMut(ProgressEvent),
        cancel: &CancelToken,
        totals: &mut TransferTotals,
    ) -> Result<CopyOutcome, ClientError> {
        let mut cmd = self.tool_command(&self.config.scp_path, session);
        // scp takes the port as -P, unlike ssh
        self.common_args(&mut cmd, session, "-P");
        if source.kind == EntryKind::Directory {
            cmd.arg("-r");
        }
        cmd.arg(Self::endpoint_spec(session, source));
        cmd.arg(Self::endpoint_spec(session, target));
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!("Running copy tool for {}", source.path.display());
        let mut child = cmd.spawn().map_err(|e| ClientError::Spawn {
            tool: self.config.scp_path.clone(),
            source: e,
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ClientError::Parse("copy tool produced no stdout handle".to_string())
        })?;
        let mut stderr = child.stderr.take();

        // Drain stderr off-thread so a chatty tool cannot deadlock us
        let stderr_reader = std::thread::spawn(move || {
            let mut buf = String::new();
            if let Some(pipe) = stderr.as_mut() {
                let _ = pipe.read_to_string(&mut buf);
            }
            buf
        });

        let child = Arc::new(Mutex::new(Some(child)));
        {
            let child = Arc::clone(&child);
            cancel.set_kill_hook(move || {
                if let Some(proc) = child.lock().as_mut() {
                    if let Err(e) = proc.kill() {
                        tracing::warn!("Failed to kill copy tool: {}", e);
                    }
                }
            });
        }

        let mut last_bytes = 0u64;
        for line in BufReader::new(stdout).lines() {
            let line = line?;
            if let Some(update) = parse_progress_line(&line) {
                last_bytes = update.bytes_transferred;
                progress(ProgressEvent {
                    file_complete: false,
                    update,
                });
            } else {
                tracing::trace!("Unrecognized copy tool output: {}", line);
            }
        }

        // Take the child out so the kill hook cannot contend with wait()
        let status = match child.lock().take() {
            Some(mut proc) => proc.wait()?,
            None => {
                cancel.clear_kill_hook();
                return Ok(CopyOutcome::Canceled);
            }
        };
        cancel.clear_kill_hook();
        let stderr_text = stderr_reader.join().unwrap_or_default();

        if cancel.is_canceled() {
            return Ok(CopyOutcome::Canceled);
        }

        if !status.success() {
            let message = if stderr_text.trim().is_empty() {
                format!("Copy tool exited with {}", status)
            } else {
                stderr_text.trim().to_string()
            };
            if is_auth_failure(&stderr_text) {
                return Ok(CopyOutcome::RetryAuthentication { message });
            }
            return Ok(CopyOutcome::Error { message });
        }

        let final_bytes = if last_bytes > 0 { last_bytes } else { source.size };
        totals.files_copied += 1;
        totals.bytes_transferred += final_bytes;
        progress(ProgressEvent {
            file_complete: true,
            update: ProgressUpdate {
                filename: source.name.clone(),
                bytes_transferred: final_bytes,
                percent_complete: 100,
                transfer_rate: String::new(),
                time_left: "00:00:00".to_string(),
            },
        });

        Ok(CopyOutcome::Success(*totals))
    }
}

impl BrowserModel for ScpToolClient {
    fn list_directory(&self, session: &SessionInfo, path: &DirectoryEntry) -> ListOutcome {
        if path.source != FileSource::Remote {
            return ListOutcome::Error {
                message: "Remote listing requested for a local path".to_string(),
            };
        }

        let path_str = path.path.to_string_lossy().to_string();
        let mut cmd = self.tool_command(&self.config.ssh_path, session);
        self.common_args(&mut cmd, session, "-p");
        cmd.arg(session.user_at_host());
        cmd.arg("--");
        cmd.arg(format!("ls -la '{}'", path_str.replace('\'', "'\\''")));
        cmd.stdin(Stdio::null());

        tracing::info!("Listing remote directory {}", path_str);
        let output = match cmd.output() {
            Ok(output) => output,
            Err(e) => {
                let err = ClientError::Spawn {
                    tool: self.config.ssh_path.clone(),
                    source: e,
                };
                tracing::error!("{}", err);
                return ListOutcome::Error {
                    message: err.to_string(),
                };
            }
        };

        let stderr_text = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            if is_auth_failure(&stderr_text) {
                return ListOutcome::RetryAuthentication { path: path.clone() };
            }
            let message = if stderr_text.trim().is_empty() {
                format!("Listing tool exited with {}", output.status)
            } else {
                stderr_text.trim().to_string()
            };
            return ListOutcome::Error { message };
        }

        let now = Utc::now();
        let mut entries = Vec::new();
        if path.path.parent().is_some() && path_str != "/" {
            entries.push(DirectoryEntry::parent_of(&path.path, FileSource::Remote));
        }
        for line in String::from_utf8_lossy(&output.stdout).lines() {
            match parse_listing_line(line, &path.path, now) {
                Some(entry) => entries.push(entry),
                None => tracing::debug!("Skipping unparsed listing line: {}", line),
            }
        }

        let file_count = entries.iter().filter(|e| e.is_file()).count();
        let dir_count = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Directory)
            .count();

        ListOutcome::Success(DirectoryListing {
            path: path.clone(),
            entries,
            file_count,
            dir_count,
            mount_count: 0,
        })
    }
}

impl TransferClient for ScpToolClient {
    fn copy_files(
        &self,
        session: &SessionInfo,
        sources: &[DirectoryEntry],
        target: &DirectoryEntry,
        progress: &mut dyn FnMut(ProgressEvent),
        cancel: &CancelToken,
    ) -> CopyOutcome {
        let mut totals = TransferTotals::default();

        for source in sources.iter().filter(|s| !s.is_parent()) {
            if cancel.is_canceled() {
                return CopyOutcome::Canceled;
            }
            match self.copy_one(session, source, target, progress, cancel, &mut totals) {
                Ok(CopyOutcome::Success(_)) => continue,
                Ok(other) => return other,
                Err(e) => {
                    cancel.clear_kill_hook();
                    tracing::error!("Copy tool failure: {}", e);
                    if cancel.is_canceled() {
                        return CopyOutcome::Canceled;
                    }
                    return CopyOutcome::Error {
                        message: e.to_string(),
                    };
                }
            }
        }

        CopyOutcome::Success(totals)
    }
}

/// Stderr markers that mean credentials were rejected rather than the
/// operation failing outright.
fn is_auth_failure(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("permission denied")
        || lower.contains("access denied")
        || lower.contains("authentication failed")
        || lower.contains("too many authentication failures")
        || lower.contains("incorrect password")
}

fn progress_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // "file.txt | 5120 kB | 512.0 kB/s | ETA: 00:00:10 | 43%"
        Regex::new(
            r"^\s*(?P<name>.+?)\s*\|\s*(?P<amount>\d+)\s*(?P<unit>B|kB|MB)\s*\|\s*(?P<rate>[^|]+?)\s*\|\s*ETA:\s*(?P<eta>[^|]+?)\s*\|\s*(?P<pct>\d{1,3})%\s*$",
        )
        .expect("progress regex is valid")
    })
}

/// Parse one tool progress line; returns `None` for anything that is not
/// a progress report.
pub fn parse_progress_line(line: &str) -> Option<ProgressUpdate> {
    let caps = progress_regex().captures(line)?;
    let amount: u64 = caps["amount"].parse().ok()?;
    let bytes = match &caps["unit"] {
        "kB" => amount * 1024,
        "MB" => amount * 1024 * 1024,
        _ => amount,
    };
    let percent: u8 = caps["pct"].parse::<u16>().ok()?.min(100) as u8;

    Some(ProgressUpdate {
        filename: caps["name"].to_string(),
        bytes_transferred: bytes,
        percent_complete: percent,
        transfer_rate: caps["rate"].to_string(),
        time_left: caps["eta"].to_string(),
    })
}

/// Parse one `ls -la` line into an entry under `dir`.
/// Returns `None` for the "total" header, "." / ".." rows, and anything
/// that does not look like long-format output.
pub fn parse_listing_line(line: &str, dir: &Path, now: DateTime<Utc>) -> Option<DirectoryEntry> {
    let cols: Vec<&str> = line.split_whitespace().collect();
    if cols.len() < 9 {
        return None;
    }

    let permissions = cols[0];
    let first = permissions.chars().next()?;
    if !matches!(first, '-' | 'd' | 'l' | 'b' | 'c' | 'p' | 's') {
        return None;
    }
    // links column keeps us honest about the format
    cols[1].parse::<u32>().ok()?;

    let size: u64 = cols[4].parse().ok()?;
    let mut name = cols[8..].join(" ");
    if first == 'l' {
        if let Some(idx) = name.find(" -> ") {
            name.truncate(idx);
        }
    }
    if name == "." || name == ".." {
        return None;
    }

    let kind = if first == 'd' {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    Some(DirectoryEntry {
        path: dir.join(&name),
        name,
        kind,
        source: FileSource::Remote,
        size,
        last_mod_time: parse_ls_mtime(cols[5], cols[6], cols[7], now),
        owner: Some(cols[2].to_string()),
        group: Some(cols[3].to_string()),
        permissions: Some(permissions.to_string()),
    })
}

/// `ls` prints "Mon DD HH:MM" for recent files and "Mon DD  YYYY" for
/// older ones.
fn parse_ls_mtime(
    month: &str,
    day: &str,
    clock_or_year: &str,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let month = match month {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    let day: u32 = day.parse().ok()?;

    if let Some((hour, minute)) = clock_or_year.split_once(':') {
        let hour: u32 = hour.parse().ok()?;
        let minute: u32 = minute.parse().ok()?;
        let candidate = Utc
            .with_ymd_and_hms(now.year(), month, day, hour, minute, 0)
            .single()?;
        // A recent-format date in the future belongs to last year
        if candidate > now {
            return Utc
                .with_ymd_and_hms(now.year() - 1, month, day, hour, minute, 0)
                .single();
        }
        Some(candidate)
    } else {
        let year: i32 = clock_or_year.parse().ok()?;
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).single()
    }
}
