use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use inventory_ingest::clock::SystemClock;
use inventory_ingest::config::Config;
use inventory_ingest::dedupe::RecentPayloads;
use inventory_ingest::fetch::StaticObjectStore;
use inventory_ingest::store::{InstanceStore, MemoryInstanceStore, StoreBackend};
use inventory_ingest::{Channel, Pipeline, ReconciliationEngine, WorkerPool};
use tokio::io::BufReader;
use tokio::runtime::Handle;

fn fixture(name: &str) -> String {
    let path: PathBuf = [env!("CARGO_MANIFEST_DIR"), "tests", "fixtures", name]
        .iter()
        .collect();
    std::fs::read_to_string(&path).unwrap()
}

fn gzip(body: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).unwrap();
    encoder.finish().unwrap()
}

fn single_line(json: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(json).unwrap();
    value.to_string()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dry_run_backend_applies_snapshots() {
    let config = Config::default();

    let mut objects = StaticObjectStore::new();
    objects.insert(
        "http://s3.localhost/insights-upload-perma/runtimes.json.gz",
        gzip(fixture("jvm_instance.json").as_bytes()),
    );

    let pipeline = Pipeline::new(
        &config,
        Arc::new(objects),
        Arc::new(RecentPayloads::from_config(&config)),
        Arc::new(SystemClock),
        ReconciliationEngine::new(
            StoreBackend::Memory(MemoryInstanceStore::new()),
            config.serialize_by_linking_hash,
        ),
        Handle::current(),
    );
    let pool = WorkerPool::new(Arc::new(pipeline), config.max_workers);

    let input = single_line(&fixture("incoming_announce.json"));
    let stats = pool
        .run(Channel::Announce, BufReader::new(input.as_bytes()))
        .await
        .unwrap();

    assert_eq!(stats.received, 1);
    assert_eq!(stats.applied, 1);

    let counts = pool.pipeline().engine().store().counts().await.unwrap();
    assert_eq!(counts.instances, 1);
    assert_eq!(counts.instance_jar_hashes, 1);
}
