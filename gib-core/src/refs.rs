//! Ref naming
//!
//! Snapshots are refs named `refs/<namespace>/<backup>/snapshots/<timestamp>`.
//! A backup has no record of its own; it is whatever set of refs shares the
//! `<backup>` segment. Timestamps are fixed width so that the lexicographic
//! maximum under a backup's prefix is the latest snapshot.

use chrono::NaiveDateTime;

use crate::config::Config;
use crate::error::{GibError, Result};
use crate::object::is_valid_entry_name;

/// chrono format of snapshot names, e.g. `20120209_153000`
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `refs/<namespace>/`
pub fn namespace_prefix(config: &Config) -> String {
    format!("refs/{}/", config.namespace)
}

/// Prefix listing all snapshots of one backup
pub fn snapshots_prefix(config: &Config, backup: &str) -> String {
    format!("{}{}/snapshots/", namespace_prefix(config), backup)
}

/// Prefix for `list`: one backup, or every backup when `backup` is `None`
pub fn catalog_prefix(config: &Config, backup: Option<&str>) -> String {
    match backup {
        Some(backup) => format!("{}{}/", namespace_prefix(config), backup),
        None => namespace_prefix(config),
    }
}

/// Full ref name of a snapshot
pub fn snapshot_ref(config: &Config, backup: &str, snapshot: &str) -> String {
    format!("{}{}", snapshots_prefix(config, backup), snapshot)
}

/// Drop the `refs/<namespace>/` prefix from a ref name
pub fn strip_namespace<'a>(config: &Config, refname: &'a str) -> &'a str {
    refname
        .strip_prefix(&namespace_prefix(config))
        .unwrap_or(refname)
}

/// Snapshot name for the given (local) time
pub fn timestamp_name(now: NaiveDateTime) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// Backup and snapshot names must be a single ref path component
pub fn validate_name(what: &str, name: &str) -> Result<()> {
    if is_valid_entry_name(name) && !name.ends_with(".lock") && !name.chars().any(char::is_control) {
        Ok(())
    } else {
        Err(GibError::Usage(format!("Invalid {} name '{}'", what, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2012, 2, 9)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_ref_layout() {
        let config = Config::default();
        assert_eq!(
            snapshot_ref(&config, "home", "20120209_153000"),
            "refs/gib/home/snapshots/20120209_153000"
        );
        assert_eq!(catalog_prefix(&config, None), "refs/gib/");
        assert_eq!(catalog_prefix(&config, Some("home")), "refs/gib/home/");
    }

    #[test]
    fn test_strip_namespace() {
        let config = Config::default();
        assert_eq!(
            strip_namespace(&config, "refs/gib/home/snapshots/20120209_153000"),
            "home/snapshots/20120209_153000"
        );
        assert_eq!(strip_namespace(&config, "refs/other/x"), "refs/other/x");
    }

    #[test]
    fn test_timestamps_sort_chronologically() {
        let earlier = timestamp_name(at(9, 59, 59));
        let later = timestamp_name(at(10, 0, 0));
        assert_eq!(earlier, "20120209_095959");
        assert!(earlier < later);
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("backup", "home").is_ok());
        assert!(validate_name("backup", "my-docs_2").is_ok());
        for bad in ["", ".", "..", "a/b", "x.lock", "tab\there"] {
            assert!(validate_name("backup", bad).is_err(), "{bad:?}");
        }
    }
}
