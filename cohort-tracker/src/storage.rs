use modwatch_core::{CohortManifest, CoreError, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

const PASS1_DIR: &str = "pass1";
const PASS2_DIR: &str = "pass2_complete";
const MANIFEST_PREFIX: &str = "cohort_ids_";

/// Which Pass 1 run a Pass 2 invocation should re-check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSelector {
    /// The run stamp Pass 1 reported.
    Run(String),
    /// Newest manifest on disk by creation time.
    Latest,
}

/// File naming under the data directory.
///
/// ```text
/// data/
///   cohort_ids_{stamp}.json
///   combined_pass1_{stamp}.csv
///   combined_complete_{stamp}.csv
///   pass1/{subreddit}_{stamp}.csv
///   pass2_complete/{subreddit}_complete_{stamp}.csv
/// ```
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pass1_dir(&self) -> PathBuf {
        self.root.join(PASS1_DIR)
    }

    pub fn pass2_dir(&self) -> PathBuf {
        self.root.join(PASS2_DIR)
    }

    pub fn ensure_dirs(&self) -> Result<(), CoreError> {
        fs::create_dir_all(self.pass1_dir())?;
        fs::create_dir_all(self.pass2_dir())?;
        Ok(())
    }

    pub fn pass1_table(&self, subreddit: &str, stamp: &str) -> PathBuf {
        self.pass1_dir().join(format!("{}_{}.csv", subreddit, stamp))
    }

    pub fn combined_pass1(&self, stamp: &str) -> PathBuf {
        self.root.join(format!("combined_pass1_{}.csv", stamp))
    }

    pub fn manifest(&self, stamp: &str) -> PathBuf {
        self.root.join(format!("{}{}.json", MANIFEST_PREFIX, stamp))
    }

    pub fn pass2_table(&self, subreddit: &str, stamp: &str) -> PathBuf {
        self.pass2_dir()
            .join(format!("{}_complete_{}.csv", subreddit, stamp))
    }

    pub fn combined_complete(&self, stamp: &str) -> PathBuf {
        self.root.join(format!("combined_complete_{}.csv", stamp))
    }

    /// Locates the manifest for `selector` and the run stamp it belongs to.
    pub fn resolve_manifest(&self, selector: &RunSelector) -> Result<(PathBuf, String), CoreError> {
        match selector {
            RunSelector::Run(stamp) => {
                let path = self.manifest(stamp);
                if !path.is_file() {
                    return Err(StorageError::ManifestNotFound {
                        path: path.display().to_string(),
                    }
                    .into());
                }
                Ok((path, stamp.clone()))
            }
            RunSelector::Latest => {
                let path = newest_file(&self.root, MANIFEST_PREFIX, ".json")?.ok_or_else(|| {
                    StorageError::ManifestNotFound {
                        path: self
                            .root
                            .join(format!("{}*.json", MANIFEST_PREFIX))
                            .display()
                            .to_string(),
                    }
                })?;
                let stamp = stamp_of(&path, MANIFEST_PREFIX, ".json").ok_or_else(|| {
                    CoreError::Internal {
                        message: format!("manifest {} has no run stamp", path.display()),
                    }
                })?;
                warn!(
                    "No run given, using newest manifest by creation time: {}",
                    path.display()
                );
                Ok((path, stamp))
            }
        }
    }

    /// The Pass 1 table written for `subreddit` in run `stamp`. When that
    /// exact file is gone, falls back to the newest table for the subreddit.
    pub fn resolve_pass1_table(&self, subreddit: &str, stamp: &str) -> Result<PathBuf, CoreError> {
        let exact = self.pass1_table(subreddit, stamp);
        if exact.is_file() {
            return Ok(exact);
        }

        let prefix = format!("{}_", subreddit);
        match newest_file(&self.pass1_dir(), &prefix, ".csv")? {
            Some(path) => {
                warn!(
                    "No Pass 1 table for r/{} in run {}, falling back to {}",
                    subreddit,
                    stamp,
                    path.display()
                );
                Ok(path)
            }
            None => Err(StorageError::NoMatchingFile {
                dir: self.pass1_dir().display().to_string(),
                pattern: format!("{}*.csv", prefix),
            }
            .into()),
        }
    }

    /// Pass 1 table to join for `subreddit`. An explicit run reads only its
    /// own table; `Latest` may fall back to an older one.
    pub fn locate_pass1_table(
        &self,
        selector: &RunSelector,
        subreddit: &str,
        stamp: &str,
    ) -> Result<PathBuf, CoreError> {
        match selector {
            RunSelector::Latest => self.resolve_pass1_table(subreddit, stamp),
            RunSelector::Run(_) => {
                let path = self.pass1_table(subreddit, stamp);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(StorageError::NoMatchingFile {
                        dir: self.pass1_dir().display().to_string(),
                        pattern: format!("{}_{}.csv", subreddit, stamp),
                    }
                    .into())
                }
            }
        }
    }
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let csv_error = |source| StorageError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    writer.flush()?;

    info!("Saved {} rows to {}", rows.len(), path.display());
    Ok(())
}

pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, CoreError> {
    let csv_error = |source| StorageError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(csv_error)?;

    debug!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

pub fn write_manifest(path: &Path, manifest: &CohortManifest) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(manifest)?)?;
    info!(
        "Cohort ids for {} subreddits saved to {}",
        manifest.len(),
        path.display()
    );
    Ok(())
}

pub fn read_manifest(path: &Path) -> Result<CohortManifest, CoreError> {
    if !path.is_file() {
        return Err(StorageError::ManifestNotFound {
            path: path.display().to_string(),
        }
        .into());
    }
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Newest `{prefix}{stamp}{suffix}` file in `dir`, by creation time
/// (modification time where the filesystem does not record creation).
/// The part between prefix and suffix must be a run stamp, so `news_` does
/// not pick up `news_politics_...` tables.
pub fn newest_file(dir: &Path, prefix: &str, suffix: &str) -> Result<Option<PathBuf>, CoreError> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || stamp_of(&path, prefix, suffix).is_none() {
            continue;
        }

        let metadata = entry.metadata()?;
        let created = metadata.created().or_else(|_| metadata.modified())?;
        let is_newer = match &newest {
            None => true,
            Some((best_time, best_path)) => (created, &path) > (*best_time, best_path),
        };
        if is_newer {
            newest = Some((created, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

fn stamp_of(path: &Path, prefix: &str, suffix: &str) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stamp = name.strip_prefix(prefix)?.strip_suffix(suffix)?;
    is_run_stamp(stamp).then(|| stamp.to_string())
}

/// `YYYYMMDD_HHMM`, see [`modwatch_core::RUN_STAMP_FORMAT`].
pub fn is_run_stamp(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    bytes.len() == 13
        && bytes.iter().enumerate().all(|(i, b)| match i {
            8 => *b == b'_',
            _ => b.is_ascii_digit(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use modwatch_core::{CombinedRecord, PostRecord};

    fn record(id: &str) -> PostRecord {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        PostRecord {
            post_fullname: id.to_string(),
            created_utc: created,
            captured_at_utc: created + chrono::Duration::seconds(30),
            post_age_seconds_at_capture: 30.0,
            subreddit: "test".to_string(),
            title: "Commas, \"quotes\"\nand newlines".to_string(),
            selftext: String::new(),
            domain: None,
            initial_score: 3,
            initial_num_comments: 1,
            initial_upvote_ratio: Some(0.75),
            link_flair_text: Some("Discussion".to_string()),
            author_username: "[deleted]".to_string(),
            author_account_age_days: None,
            author_total_karma: None,
            author_link_karma: None,
            author_comment_karma: None,
            author_is_verified: None,
            author_unavailable: true,
        }
    }

    #[test]
    fn test_layout_paths() {
        let layout = DataLayout::new("data");
        assert_eq!(
            layout.pass1_table("AskReddit", "20240301_1200"),
            PathBuf::from("data/pass1/AskReddit_20240301_1200.csv")
        );
        assert_eq!(
            layout.manifest("20240301_1200"),
            PathBuf::from("data/cohort_ids_20240301_1200.json")
        );
        assert_eq!(
            layout.pass2_table("AskReddit", "20240302_0800"),
            PathBuf::from("data/pass2_complete/AskReddit_complete_20240302_0800.csv")
        );
        assert_eq!(
            layout.combined_complete("20240302_0800"),
            PathBuf::from("data/combined_complete_20240302_0800.csv")
        );
    }

    #[test]
    fn test_pass1_table_survives_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pass1").join("test_20240301_1200.csv");
        let rows = vec![record("t3_a"), record("t3_b")];

        write_csv(&path, &rows).unwrap();
        let loaded: Vec<PostRecord> = read_csv(&path).unwrap();

        assert_eq!(loaded, rows);
    }

    #[test]
    fn test_unresolved_combined_row_writes_empty_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let combined = CombinedRecord::join(record("t3_b"), None);

        write_csv(&path, &[combined]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let header = text.lines().next().unwrap();

        assert!(header.starts_with("post_fullname,created_utc"));
        assert!(header.ends_with("rechecked_at_utc,tracking_state"));
        let empty_final_fields = ",".repeat(14);
        assert!(text
            .trim_end()
            .ends_with(&format!("true{}unresolved", empty_final_fields)));
    }

    #[test]
    fn test_manifest_read_write() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        let mut manifest = CohortManifest::new();
        manifest.insert("test", vec!["t3_a".into(), "t3_b".into()]);

        let path = layout.manifest("20240301_1200");
        write_manifest(&path, &manifest).unwrap();
        assert_eq!(read_manifest(&path).unwrap(), manifest);

        let missing = layout.manifest("19990101_0000");
        assert!(matches!(
            read_manifest(&missing),
            Err(CoreError::Storage(StorageError::ManifestNotFound { .. }))
        ));
    }

    #[test]
    fn test_resolve_manifest_by_run_and_latest() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());

        assert!(matches!(
            layout.resolve_manifest(&RunSelector::Latest),
            Err(CoreError::Storage(StorageError::ManifestNotFound { .. }))
        ));

        write_manifest(&layout.manifest("20240301_1200"), &CohortManifest::new()).unwrap();
        fs::write(dir.path().join("cohort_ids_notes.json"), "{}").unwrap();

        let (path, stamp) = layout.resolve_manifest(&RunSelector::Latest).unwrap();
        assert_eq!(path, layout.manifest("20240301_1200"));
        assert_eq!(stamp, "20240301_1200");

        let (path, _) = layout
            .resolve_manifest(&RunSelector::Run("20240301_1200".to_string()))
            .unwrap();
        assert_eq!(path, layout.manifest("20240301_1200"));

        assert!(layout
            .resolve_manifest(&RunSelector::Run("20240302_1200".to_string()))
            .is_err());
    }

    #[test]
    fn test_pass1_table_prefers_exact_run() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        layout.ensure_dirs().unwrap();

        write_csv(&layout.pass1_table("news", "20240301_1200"), &[record("t3_a")]).unwrap();
        write_csv(&layout.pass1_table("news", "20240302_1200"), &[record("t3_b")]).unwrap();
        write_csv(
            &layout.pass1_table("news_politics", "20240303_1200"),
            &[record("t3_c")],
        )
        .unwrap();

        assert_eq!(
            layout.resolve_pass1_table("news", "20240301_1200").unwrap(),
            layout.pass1_table("news", "20240301_1200")
        );

        assert_eq!(
            layout.resolve_pass1_table("news", "20240309_0000").unwrap(),
            layout.pass1_table("news", "20240302_1200")
        );

        assert!(matches!(
            layout.resolve_pass1_table("science", "20240301_1200"),
            Err(CoreError::Storage(StorageError::NoMatchingFile { .. }))
        ));
    }

    #[test]
    fn test_latest_is_decided_by_creation_time_not_name() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        // Outlasts coarse filesystem timestamp resolution.
        let gap = std::time::Duration::from_millis(1100);

        write_manifest(&layout.manifest("20240305_1200"), &CohortManifest::new()).unwrap();
        write_csv(&layout.pass1_table("news", "20240305_1200"), &[record("t3_a")]).unwrap();
        std::thread::sleep(gap);
        write_manifest(&layout.manifest("20240301_1200"), &CohortManifest::new()).unwrap();
        write_csv(&layout.pass1_table("news", "20240301_1200"), &[record("t3_b")]).unwrap();

        let (path, stamp) = layout.resolve_manifest(&RunSelector::Latest).unwrap();
        assert_eq!(path, layout.manifest("20240301_1200"));
        assert_eq!(stamp, "20240301_1200");

        assert_eq!(
            layout.resolve_pass1_table("news", "20240401_0000").unwrap(),
            layout.pass1_table("news", "20240301_1200")
        );
        assert_eq!(
            newest_file(dir.path(), "cohort_ids_", ".json").unwrap(),
            Some(layout.manifest("20240301_1200"))
        );
    }

    #[test]
    fn test_explicit_run_never_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        write_csv(&layout.pass1_table("news", "20240301_1200"), &[record("t3_a")]).unwrap();

        let run = RunSelector::Run("20240302_1200".to_string());
        assert!(layout
            .locate_pass1_table(&run, "news", "20240302_1200")
            .is_err());
        assert_eq!(
            layout
                .locate_pass1_table(&RunSelector::Latest, "news", "20240302_1200")
                .unwrap(),
            layout.pass1_table("news", "20240301_1200")
        );
    }

    #[test]
    fn test_run_stamp_validation() {
        assert!(is_run_stamp("20240301_1200"));
        assert!(!is_run_stamp("politics_20240301_1200"));
        assert!(!is_run_stamp("2024-03-01"));
    }
}
