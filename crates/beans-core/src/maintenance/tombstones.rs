//! Expired tombstone pass
//!
//! Tombstones are issue lines in `issues.jsonl` with status `tombstone`.
//! Once older than the TTL they are dropped by rewriting the log. Every other
//! line, including ones that fail to parse, is kept byte-for-byte in its
//! original order.

use super::{MaintenanceLock, MaintenanceOptions, RecordFailure, require_data_dir};
use crate::{Config, Error, Issue, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const ISSUES_FILE: &str = "issues.jsonl";

/// Outcome of an expired tombstone pass
#[derive(Debug, Clone, Serialize)]
pub struct TombstoneReport {
    pub log_path: PathBuf,
    /// False when issues.jsonl does not exist
    pub log_present: bool,
    pub dry_run: bool,
    /// Parsed records
    pub scanned: usize,
    pub tombstones: usize,
    /// Ids of expired tombstones (pruned unless dry run)
    pub expired: Vec<String>,
    /// Lines that failed to parse; kept in the log as-is
    pub malformed: Vec<RecordFailure>,
    /// Whether the log was replaced
    pub rewritten: bool,
}

impl TombstoneReport {
    fn new(log_path: PathBuf, dry_run: bool) -> Self {
        Self {
            log_path,
            log_present: false,
            dry_run,
            scanned: 0,
            tombstones: 0,
            expired: Vec::new(),
            malformed: Vec::new(),
            rewritten: false,
        }
    }

    fn apply(&mut self, plan: PrunePlan<'_>) {
        for failure in &plan.malformed {
            warn!(%failure, "Keeping unparsable line in issues.jsonl");
        }
        self.scanned = plan.scanned;
        self.tombstones = plan.tombstones;
        self.expired = plan.expired;
        self.malformed = plan.malformed;
    }
}

/// Prune expired tombstones using the TTL from config
pub fn expired_tombstones(repo_root: &Path) -> Result<TombstoneReport> {
    expired_tombstones_with(repo_root, &MaintenanceOptions::default())
}

/// Prune expired tombstones with explicit options
pub fn expired_tombstones_with(
    repo_root: &Path,
    opts: &MaintenanceOptions,
) -> Result<TombstoneReport> {
    let data_dir = require_data_dir(repo_root)?;
    let log_path = data_dir.join(ISSUES_FILE);
    let mut report = TombstoneReport::new(log_path.clone(), opts.dry_run);

    match fs::metadata(&log_path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %log_path.display(), "No issues.jsonl, nothing to prune");
            return Ok(report);
        }
        Err(e) => return Err(e.into()),
        Ok(meta) => {
            report.log_present = true;
            if meta.len() == 0 {
                debug!(path = %log_path.display(), "Empty issues.jsonl, nothing to prune");
                return Ok(report);
            }
        }
    }

    let ttl = opts
        .tombstone_ttl
        .unwrap_or_else(|| Config::load_or_default(&data_dir).maintenance.tombstone_ttl());

    // Report-only runs read the log and leave the directory alone
    let content = fs::read(&log_path)?;
    let plan = plan_prune(&content, opts.now, ttl);
    if plan.expired.is_empty() || opts.dry_run {
        report.apply(plan);
        return Ok(report);
    }

    // Another process may have rewritten the log since the first read, so
    // the plan is made again while the lock is held
    let _lock = MaintenanceLock::acquire(&log_path)?;
    let content = fs::read(&log_path)?;
    let plan = plan_prune(&content, opts.now, ttl);
    if plan.expired.is_empty() {
        debug!(path = %log_path.display(), "Tombstones already pruned by another run");
        report.apply(plan);
        return Ok(report);
    }

    let replacement = write_replacement(&log_path, &plan.keep)?;
    replace_log(replacement, &log_path)?;
    let kept = plan.keep.len();
    report.apply(plan);
    report.rewritten = true;

    info!(
        pruned = report.expired.len(),
        kept,
        ttl_days = ttl.num_days(),
        "Pruned expired tombstones"
    );
    Ok(report)
}

/// Which lines of the log survive
struct PrunePlan<'a> {
    keep: Vec<&'a [u8]>,
    scanned: usize,
    tombstones: usize,
    expired: Vec<String>,
    malformed: Vec<RecordFailure>,
}

fn plan_prune(content: &[u8], now: DateTime<Utc>, ttl: Duration) -> PrunePlan<'_> {
    let mut plan = PrunePlan {
        keep: Vec::new(),
        scanned: 0,
        tombstones: 0,
        expired: Vec::new(),
        malformed: Vec::new(),
    };

    for (idx, raw) in content.split(|&b| b == b'\n').enumerate() {
        if raw.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let line_no = idx + 1;

        let issue: Issue = match serde_json::from_slice(raw.trim_ascii()) {
            Ok(issue) => issue,
            Err(e) => {
                plan.malformed
                    .push(RecordFailure::new(format!("line {}", line_no), e.to_string()));
                plan.keep.push(raw);
                continue;
            }
        };
        plan.scanned += 1;

        if issue.status.is_tombstone() {
            plan.tombstones += 1;
        }
        if issue.is_expired_tombstone(now, ttl) {
            debug!(id = %issue.id, line = line_no, "Tombstone expired");
            plan.expired.push(issue.id);
            continue;
        }
        plan.keep.push(raw);
    }

    plan
}

/// Write surviving lines to a temp file beside the log and flush it to disk
fn write_replacement(log_path: &Path, lines: &[&[u8]]) -> Result<NamedTempFile> {
    let dir = log_path
        .parent()
        .ok_or_else(|| Error::Persistence(format!("no parent for {}", log_path.display())))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".issues.jsonl.")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    {
        let mut writer = BufWriter::new(&mut tmp);
        for line in lines {
            writer.write_all(line)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;

    if let Ok(meta) = fs::metadata(log_path)
        && let Err(e) = fs::set_permissions(tmp.path(), meta.permissions())
    {
        debug!(error = %e, "Could not copy permissions to replacement log");
    }
    Ok(tmp)
}

/// Atomically swap the replacement into place
///
/// On failure the temp file is removed and the original log is untouched.
fn replace_log(replacement: NamedTempFile, log_path: &Path) -> Result<()> {
    replacement.persist(log_path).map_err(|e| {
        Error::Persistence(format!("replace {}: {}", log_path.display(), e.error))
    })?;

    #[cfg(unix)]
    if let Some(dir) = log_path.parent() {
        fs::File::open(dir)?.sync_all()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_FILE;
    use crate::redirect::{DATA_DIR, REDIRECT_FILE};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn opts() -> MaintenanceOptions {
        MaintenanceOptions {
            now: now(),
            tombstone_ttl: Some(Duration::days(30)),
            ..Default::default()
        }
    }

    fn tombstone(id: &str, days_ago: i64) -> String {
        serde_json::json!({
            "id": id,
            "title": format!("deleted {id}"),
            "status": "tombstone",
            "deleted_at": (now() - Duration::days(days_ago)).to_rfc3339(),
            "deleted_by": "kim",
            "delete_reason": "duplicate",
        })
        .to_string()
    }

    fn open_issue(id: &str) -> String {
        serde_json::json!({"id": id, "title": format!("open {id}"), "status": "open"}).to_string()
    }

    fn listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn beans_dir(tmp: &TempDir) -> PathBuf {
        let dir = tmp.path().join(DATA_DIR);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_log(dir: &Path, lines: &[String]) -> PathBuf {
        let path = dir.join(ISSUES_FILE);
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_no_jsonl() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);

        let report = expired_tombstones(tmp.path()).unwrap();
        assert!(!report.log_present);
        assert!(!dir.join(ISSUES_FILE).exists());
    }

    #[test]
    fn test_no_beans_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            expired_tombstones(tmp.path()),
            Err(Error::MissingStore(_))
        ));
    }

    #[test]
    fn test_empty_jsonl() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        let path = dir.join(ISSUES_FILE);
        fs::write(&path, b"").unwrap();

        let report = expired_tombstones(tmp.path()).unwrap();
        assert!(report.log_present);
        assert!(!report.rewritten);
        assert_eq!(fs::read(&path).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_prunes_expired_keeps_survivor_in_place() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        let path = write_log(
            &dir,
            &[tombstone("bd-1", 90), tombstone("bd-2", 10), tombstone("bd-3", 45)],
        );

        let report = expired_tombstones_with(tmp.path(), &opts()).unwrap();
        assert!(report.rewritten);
        assert_eq!(report.tombstones, 3);
        assert_eq!(report.expired, vec!["bd-1".to_string(), "bd-3".to_string()]);

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{}\n", tombstone("bd-2", 10)));
    }

    #[test]
    fn test_survivors_keep_relative_order() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        let path = write_log(
            &dir,
            &[
                open_issue("bd-a"),
                tombstone("bd-b", 99),
                open_issue("bd-c"),
                tombstone("bd-d", 1),
                tombstone("bd-e", 60),
                open_issue("bd-f"),
            ],
        );

        expired_tombstones_with(tmp.path(), &opts()).unwrap();

        let ids: Vec<String> = fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str::<Issue>(l).unwrap().id)
            .collect();
        assert_eq!(ids, vec!["bd-a", "bd-c", "bd-d", "bd-f"]);
    }

    #[test]
    fn test_second_run_is_noop() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        let path = write_log(&dir, &[tombstone("bd-1", 90), open_issue("bd-2")]);

        let first = expired_tombstones_with(tmp.path(), &opts()).unwrap();
        assert!(first.rewritten);
        let after_first = fs::read(&path).unwrap();

        let second = expired_tombstones_with(tmp.path(), &opts()).unwrap();
        assert!(!second.rewritten);
        assert!(second.expired.is_empty());
        assert_eq!(fs::read(&path).unwrap(), after_first);
    }

    #[test]
    fn test_nothing_expired_leaves_file_untouched() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        let path = dir.join(ISSUES_FILE);
        // No trailing newline and a blank line: would change on rewrite
        let content = format!("{}\n\n{}", open_issue("bd-1"), tombstone("bd-2", 3));
        fs::write(&path, &content).unwrap();

        let report = expired_tombstones_with(tmp.path(), &opts()).unwrap();
        assert!(!report.rewritten);
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_malformed_lines_are_kept_verbatim() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        let path = write_log(
            &dir,
            &[
                "{not json".to_string(),
                tombstone("bd-1", 90),
                r#"{"title":"no id"}"#.to_string(),
                open_issue("bd-2"),
            ],
        );

        let report = expired_tombstones_with(tmp.path(), &opts()).unwrap();
        assert_eq!(report.expired, vec!["bd-1".to_string()]);
        assert_eq!(report.malformed.len(), 2);
        assert_eq!(report.malformed[0].record, "line 1");
        assert_eq!(report.malformed[1].record, "line 3");

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            format!("{{not json\n{}\n{}\n", r#"{"title":"no id"}"#, open_issue("bd-2"))
        );
    }

    #[test]
    fn test_unknown_fields_survive_rewrite() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        let custom = r#"{"id":"bd-9","title":"x","status":"open","priority":0,"dependencies":[{"depends_on_id":"bd-1"}]}"#;
        let path = write_log(&dir, &[tombstone("bd-1", 90), custom.to_string()]);

        expired_tombstones_with(tmp.path(), &opts()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{custom}\n"));
    }

    #[test]
    fn test_dry_run_prunes_nothing() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        let path = write_log(&dir, &[tombstone("bd-1", 90)]);
        let before = fs::read(&path).unwrap();

        let report = expired_tombstones_with(
            tmp.path(),
            &MaintenanceOptions {
                dry_run: true,
                ..opts()
            },
        )
        .unwrap();
        assert_eq!(report.expired, vec!["bd-1".to_string()]);
        assert!(!report.rewritten);
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_dry_run_leaves_directory_alone() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        write_log(&dir, &[tombstone("bd-1", 90), open_issue("bd-2")]);
        let before = listing(&dir);

        let report = expired_tombstones_with(
            tmp.path(),
            &MaintenanceOptions {
                dry_run: true,
                ..opts()
            },
        )
        .unwrap();
        assert_eq!(report.expired, vec!["bd-1".to_string()]);
        assert_eq!(listing(&dir), before);
    }

    #[test]
    fn test_nothing_expired_takes_no_lock() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        write_log(&dir, &[tombstone("bd-1", 3), open_issue("bd-2")]);

        let report = expired_tombstones_with(tmp.path(), &opts()).unwrap();
        assert!(!report.rewritten);
        assert_eq!(listing(&dir), vec![ISSUES_FILE.to_string()]);
    }

    #[test]
    fn test_expired_tombstone_with_odd_fields_is_pruned() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        let odd = r#"{"id":"bd-1","status":"tombstone","deleted_at":"2024-01-01T00:00:00Z","labels":null,"title":42}"#;
        let path = write_log(&dir, &[odd.to_string(), open_issue("bd-2")]);

        let report = expired_tombstones_with(tmp.path(), &opts()).unwrap();
        assert_eq!(report.expired, vec!["bd-1".to_string()]);
        assert!(report.malformed.is_empty());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("{}\n", open_issue("bd-2"))
        );
    }

    #[test]
    fn test_ttl_from_config() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        fs::write(dir.join(CONFIG_FILE), "[maintenance]\ntombstone_ttl_days = 100\n").unwrap();
        let path = write_log(&dir, &[tombstone("bd-1", 90), tombstone("bd-2", 120)]);

        let report = expired_tombstones_with(
            tmp.path(),
            &MaintenanceOptions {
                now: now(),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(report.expired, vec!["bd-2".to_string()]);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("{}\n", tombstone("bd-1", 90))
        );
    }

    #[test]
    fn test_follows_redirect() {
        let tmp = TempDir::new().unwrap();
        let shared = tmp.path().join("shared");
        fs::create_dir_all(&shared).unwrap();
        let path = write_log(&shared, &[tombstone("bd-1", 90), open_issue("bd-2")]);

        let project = tmp.path().join("project");
        let beans = project.join(DATA_DIR);
        fs::create_dir_all(&beans).unwrap();
        fs::write(beans.join(REDIRECT_FILE), shared.display().to_string()).unwrap();

        let report = expired_tombstones_with(&project, &opts()).unwrap();
        assert_eq!(report.log_path, path);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("{}\n", open_issue("bd-2"))
        );
    }

    #[test]
    fn test_interrupted_rewrite_leaves_original() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        let path = write_log(&dir, &[tombstone("bd-1", 90), open_issue("bd-2")]);
        let original = fs::read(&path).unwrap();

        // Replacement fully written, then the process dies before the swap
        let survivor = open_issue("bd-2");
        let replacement = write_replacement(&path, &[survivor.as_bytes()]).unwrap();
        let leftover = replacement.into_temp_path().keep().unwrap();
        assert!(leftover.exists());
        assert_eq!(fs::read(&path).unwrap(), original);

        // Next run ignores the leftover and prunes normally
        let report = expired_tombstones_with(tmp.path(), &opts()).unwrap();
        assert!(report.rewritten);
        assert!(report.malformed.is_empty());
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{survivor}\n"));
    }

    #[test]
    fn test_failed_swap_keeps_original() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        let path = write_log(&dir, &[tombstone("bd-1", 90)]);
        let original = fs::read(&path).unwrap();

        // Renaming a file over a non-empty directory fails
        let blocked = dir.join("blocked");
        fs::create_dir_all(blocked.join("inner")).unwrap();
        let replacement = write_replacement(&path, &[]).unwrap();
        let tmp_path = replacement.path().to_path_buf();

        assert!(matches!(
            replace_log(replacement, &blocked),
            Err(Error::Persistence(_))
        ));
        assert!(!tmp_path.exists());
        assert_eq!(fs::read(&path).unwrap(), original);
    }

    #[test]
    fn test_lock_is_released_after_pass() {
        let tmp = TempDir::new().unwrap();
        let dir = beans_dir(&tmp);
        let path = write_log(&dir, &[tombstone("bd-1", 90)]);

        expired_tombstones_with(tmp.path(), &opts()).unwrap();
        assert!(MaintenanceLock::try_acquire(&path).unwrap().is_some());
    }
}
