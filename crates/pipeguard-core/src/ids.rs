use chrono::Utc;
use uuid::Uuid;

/// Human-scannable artifact id: `<PREFIX>-<yyyymmdd>-<8 hex>`.
pub fn artifact_id(prefix: &str) -> String {
    let date = Utc::now().format("%Y%m%d");
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    format!("{}-{}-{}", prefix, date, suffix)
}

pub fn uuid_id() -> String {
    Uuid::new_v4().to_string()
}

/// UTC timestamp in the archive filename format.
pub fn archive_timestamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}
