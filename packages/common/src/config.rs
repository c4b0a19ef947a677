use serde::Deserialize;

/// Variant generator pool and scheduling configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorSettings {
    /// Number of concurrent generation workers. Default: 4.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Target percentage of dequeues served from the interactive queue under
    /// contention, in [0, 100]. Default: 90.
    #[serde(default = "default_high_priority_weight")]
    pub high_priority_weight: u8,
}

fn default_worker_count() -> usize {
    4
}
fn default_high_priority_weight() -> u8 {
    90
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            high_priority_weight: default_high_priority_weight(),
        }
    }
}

/// Staleness thresholds and cadence for the failure sweepers.
#[derive(Debug, Deserialize, Clone)]
pub struct SweepSettings {
    /// Pending assets older than this are reclaimed. Default: 3600.
    #[serde(default = "default_asset_older_than_secs")]
    pub asset_older_than_secs: u64,
    /// Pending variants older than this are reclaimed. Default: 1800.
    #[serde(default = "default_variant_older_than_secs")]
    pub variant_older_than_secs: u64,
    /// Interval between sweep passes. Default: 300.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
    /// Maximum outbox events consumed per reaper pass. Default: 100.
    #[serde(default = "default_reap_batch_size")]
    pub reap_batch_size: u64,
}

fn default_asset_older_than_secs() -> u64 {
    3600
}
fn default_variant_older_than_secs() -> u64 {
    1800
}
fn default_scan_interval_secs() -> u64 {
    300
}
fn default_reap_batch_size() -> u64 {
    100
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            asset_older_than_secs: default_asset_older_than_secs(),
            variant_older_than_secs: default_variant_older_than_secs(),
            scan_interval_secs: default_scan_interval_secs(),
            reap_batch_size: default_reap_batch_size(),
        }
    }
}

/// Object store configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Base directory for the filesystem backend. Default: "./data/objects".
    #[serde(default = "default_root_dir")]
    pub root_dir: String,
    /// Bucket new variants are written to. Default: "assets".
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Maximum object size in bytes. Default: 64 MiB.
    #[serde(default = "default_max_object_size")]
    pub max_object_size: u64,
}

fn default_root_dir() -> String {
    "./data/objects".into()
}
fn default_bucket() -> String {
    "assets".into()
}
fn default_max_object_size() -> u64 {
    64 * 1024 * 1024
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            bucket: default_bucket(),
            max_object_size: default_max_object_size(),
        }
    }
}
