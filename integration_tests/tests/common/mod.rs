#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use inventory_common::{Announcement, InsightsMessage};
use inventory_ingest::classify::classify;
use inventory_ingest::store::PgInstanceStore;
use sqlx::PgPool;
use tokio::time::{sleep, Duration};

async fn wait_for_db_ready(db_url: &str) -> PgPool {
    let mut attempts = 10;
    while attempts > 0 {
        match PgPool::connect(db_url).await {
            Ok(pool) => return pool,
            Err(e) => {
                println!("Waiting for DB to be ready... ({})", e);
                sleep(Duration::from_secs(2)).await;
                attempts -= 1;
            }
        }
    }
    panic!("database at {} never became ready", db_url);
}

/// Connects to `DATABASE_URL`, migrates and empties every table. Returns `None` when no database
/// is configured so the calling test can skip.
pub async fn setup_store() -> Option<PgInstanceStore> {
    dotenvy::dotenv().ok();
    let Ok(db_url) = std::env::var("DATABASE_URL") else {
        println!("DATABASE_URL not set, skipping");
        return None;
    };

    let store = PgInstanceStore::from_pool(wait_for_db_ready(&db_url).await);
    store.migrate().await.expect("Failed to run migration");

    sqlx::query("TRUNCATE runtime_instance, jar_hash RESTART IDENTITY CASCADE")
        .execute(store.pool())
        .await
        .expect("Failed to truncate tables");

    Some(store)
}

pub fn fixture(name: &str) -> String {
    let path: PathBuf = [
        env!("CARGO_MANIFEST_DIR"),
        "..",
        "src",
        "ingest",
        "tests",
        "fixtures",
        name,
    ]
    .iter()
    .collect();
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("fixture {:?}: {}", path, e))
}

pub fn announce() -> Announcement {
    Announcement {
        account_id: Some("accountId".to_string()),
        org_id: "12345".to_string(),
        content_type: String::new(),
        url: None,
        timestamp: Utc.with_ymd_and_hms(2023, 4, 1, 1, 0, 0).unwrap(),
        request_id: None,
        is_runtimes: false,
    }
}

pub fn message(payload: &str) -> InsightsMessage {
    classify(&announce(), payload).expect("payload should classify")
}

pub fn jvm_payload(hostname: &str, jars: &[&str]) -> String {
    serde_json::json!({
        "basic": {"system.hostname": hostname, "jvm.report_time": 1_680_310_800_000_i64},
        "jars": jars,
    })
    .to_string()
}

pub fn update_payload(linking_hash: &str, jars: &[&str]) -> String {
    serde_json::json!({
        "updated-jars": {"idHash": linking_hash, "jars": jars},
    })
    .to_string()
}

pub fn gzip(body: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).unwrap();
    encoder.finish().unwrap()
}

/// A gzip-compressed insights archive holding `payloads` under the data directory.
pub fn archive(payloads: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, body) in payloads {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        let path = format!(
            "insights-archive/data/var/tmp/insights-runtimes/uploads/{}",
            name
        );
        builder
            .append_data(&mut header, path, body.as_bytes())
            .unwrap();
    }
    gzip(&builder.into_inner().unwrap())
}
