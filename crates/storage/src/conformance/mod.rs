//! Conformance test suite for `PublishingStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `PublishingStore` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Source keys**: id order, paged selection, flag updates
//! - **Staging**: job isolation, used flags, clearing
//! - **Federation**: inbound batch uniqueness and outcomes, polling cursor
//! - **Concurrency**: racing inserts of the same batch tag
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use dkpublish_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod federation;
mod keys;
mod snapshot;
mod staging;

use std::fmt;
use std::future::Future;

use dkpublish_core::{DailyKey, DiagnosisKey, FederationTekInfo, LocalTekInfo};
use time::macros::datetime;
use time::OffsetDateTime;

use crate::record::{InboundBatchRecord, StagedKey};
use crate::PublishingStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "snapshot", "keys", "federation").
    pub category: String,
    /// Test name (e.g. "uncommitted_keys_invisible").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: PublishingStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(keys::run_key_tests(&factory).await);
    results.extend(staging::run_staging_tests(&factory).await);
    results.extend(federation::run_federation_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

const TEST_ROLLING_START: i32 = 2_668_032;

fn test_time() -> OffsetDateTime {
    datetime!(2020-10-23 12:00:00 UTC)
}

fn make_local_key(byte: u8) -> DiagnosisKey {
    DiagnosisKey::local(
        DailyKey::new(vec![byte; 16], TEST_ROLLING_START, 144),
        LocalTekInfo::default(),
    )
}

fn make_federation_key(byte: u8) -> DiagnosisKey {
    DiagnosisKey::federation(
        DailyKey::new(vec![byte; 16], TEST_ROLLING_START, 144),
        FederationTekInfo {
            country_of_origin: "DE".to_string(),
            ..FederationTekInfo::default()
        },
    )
}

fn make_staged_key(source_id: Option<i64>, byte: u8) -> StagedKey {
    StagedKey {
        id: 0,
        source_id,
        daily_key: DailyKey::new(vec![byte; 16], TEST_ROLLING_START, 144),
        local: LocalTekInfo::default(),
        federation: FederationTekInfo::default(),
        used: false,
    }
}

fn make_inbound_batch(tag: &str) -> InboundBatchRecord {
    InboundBatchRecord::new(tag, test_time().date(), vec![1, 2, 3], test_time())
}

async fn insert_committed_keys<S: PublishingStore>(
    s: &S,
    keys: Vec<DiagnosisKey>,
) -> Result<Vec<i64>, String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_diagnosis_keys(&mut snap, keys)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    let all = s.list_diagnosis_keys().await.map_err(|e| e.to_string())?;
    all.iter()
        .map(|k| k.id.ok_or_else(|| "stored key has no id".to_string()))
        .collect()
}
