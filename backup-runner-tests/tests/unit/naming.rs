//! Unit tests for the artifact naming convention

use chrono::{TimeZone, Utc};
use rstest::rstest;
use test_utils::{artifact_on, sample_artifacts, ArtifactNaming};

#[rstest]
#[case("pg-backup_2024-01-01_02-00-00.dump", true)]
#[case("pg-backup_2024-01-01_02-00-00.sql", true)]
#[case("pg-backup_2024-01-01_02-00-00.sql.gz", true)]
#[case("pg-backup_2024-01-01_02-00-00.tar", true)]
#[case("pg-backup_2024-01-01_02-00-00.zip", false)]
#[case("other_2024-01-01_02-00-00.dump", false)]
#[case("pg-backup_", false)]
#[case("README.md", false)]
#[case("readme.txt", false)]
#[case("pg-backup_2024-01-01.dump", true)]
#[case("pg-backup_2024-01-01.dump.tmp", false)]
#[case("pg-backup_2024-01-01.dump.partial", false)]
fn test_default_convention(#[case] name: &str, #[case] expected: bool) {
    assert_eq!(ArtifactNaming::default().matches(name), expected);
}

#[rstest]
#[case(".dump", true)]
#[case(".sql.gz", true)]
#[case("dump", false)]
#[case(".gz", false)]
fn test_approved_extensions(#[case] extension: &str, #[case] expected: bool) {
    assert_eq!(ArtifactNaming::default().approves_extension(extension), expected);
}

#[test]
fn test_artifact_name_layout() {
    let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
    let name = ArtifactNaming::default().artifact_name(at, ".sql");
    assert_eq!(name, "pg-backup_2024-03-09_14-05-07.sql");
}

#[test]
fn test_lexicographic_order_is_chronological() {
    let names = sample_artifacts(48);
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert!(artifact_on(9) < artifact_on(10));
}

#[test]
fn test_custom_prefix() {
    let naming = ArtifactNaming::new("db_", &[".sql.gz"]);
    let name = naming.artifact_name(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), ".sql.gz");
    assert!(naming.matches(&name));
    assert!(!ArtifactNaming::default().matches(&name));
}
