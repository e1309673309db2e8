//! Test fixtures and sample data
//!
//! Provides pre-built artifact names and configuration templates for testing.

use backup_runner::storage::ArtifactNaming;
use chrono::{Duration, TimeZone, Utc};
use std::path::Path;

/// Artifact name for the default naming convention at the given day of January 2024
pub fn artifact_on(day: u32) -> String {
    let at = Utc
        .with_ymd_and_hms(2024, 1, day, 2, 0, 0)
        .single()
        .expect("valid fixture date");
    ArtifactNaming::default().artifact_name(at, ".dump")
}

/// `count` artifact names, one per hour, oldest first
pub fn sample_artifacts(count: usize) -> Vec<String> {
    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid fixture date");
    let naming = ArtifactNaming::default();
    (0..count)
        .map(|i| naming.artifact_name(start + Duration::hours(i as i64), ".dump"))
        .collect()
}

/// Objects that share a store with backups but are not backups
pub fn foreign_objects() -> Vec<&'static str> {
    vec!["README.md", "other_2024-01-01_00-00-00.dump", "pg-backup_2024-01-01.zip", "pg-backup_2024-01-01.txt"]
}

/// Write `names` as small files into `dir`
pub fn create_artifacts(dir: &Path, names: &[String]) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    for name in names {
        std::fs::write(dir.join(name), format!("contents of {}", name))?;
    }
    Ok(())
}

/// Minimal valid config TOML template
pub fn minimal_config_toml() -> &'static str {
    r#"
[backup]
schedule = "0 2 * * *"

[storage]
type = "local"
[storage.local]
path = "{store}"
"#
}

/// Config with every section filled in
pub fn full_config_toml() -> &'static str {
    r#"
[backup]
schedule = "@hourly"
retention_count = 24
run_on_startup = true
timeout_minutes = 15
single_flight = true
utc = true

[storage]
type = "s3"
[storage.s3]
bucket = "backups"
region = "eu-west-1"
endpoint = "http://minio:9000"
path_style = true
prefix = "postgres"
access_key = "minio"
secret_key = "minio123"

[artifacts]
prefix = "db_"
extensions = [".sql.gz"]

[logging]
directory = "{logs}"
level = "debug"
max_files = 3
format = "json"

[notifications]
discord_webhook_url = "https://discord.com/api/webhooks/123/abc"
notify_on = ["failure", "success"]

[command]
name = "postgres"
dump = "pg_dump mydb | gzip > {output}"
test = "pg_isready"
extension = ".sql.gz"
"#
}

/// Fill `{store}` and `{logs}` placeholders in a template
pub fn render_config(template: &str, root: &Path) -> String {
    template
        .replace("{store}", &root.join("store").display().to_string())
        .replace("{logs}", &root.join("logs").display().to_string())
}
