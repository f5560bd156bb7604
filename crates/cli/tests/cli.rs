//! CLI integration tests.
//!
//! Uses `assert_cmd` to spawn the `dkpublish` binary and checks exit codes,
//! stdout and stderr. Every test works inside its own temp directory.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

fn dkpublish() -> Command {
    cargo_bin_cmd!("dkpublish")
}

/// Rolling start number of the UTC day before today.
fn yesterday_rolling_start() -> i64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs() as i64;
    (secs / 86_400 - 1) * 144
}

fn source_key(byte: u8) -> Value {
    json!({
        "id": null,
        "daily_key": {
            "key_data": vec![byte; 16],
            "rolling_start_number": yesterday_rolling_start(),
            "rolling_period": 144
        },
        "origin": "Local",
        "published_locally": false,
        "published_to_federation": false,
        "ready_for_cleanup": null,
        "local": {
            "transmission_risk_level": "High",
            "days_since_symptoms_onset": 1,
            "symptomatic": "Symptomatic",
            "report_type": "ConfirmedTest"
        },
        "federation": {
            "countries_of_interest": [],
            "country_of_origin": "",
            "report_type": "Unknown",
            "days_since_symptoms_onset": 0
        }
    })
}

fn keygen(dir: &Path, name: &str) -> PathBuf {
    let prefix = dir.join(name);
    dkpublish()
        .args(["keygen", "--out", prefix.to_str().unwrap()])
        .assert()
        .success();
    prefix
}

fn with_ext(prefix: &Path, ext: &str) -> PathBuf {
    prefix.with_extension(ext)
}

/// Keys for both EKS signers, a seed file with `count` keys and a config
/// pointing at them.
struct Fixture {
    dir: TempDir,
    national: PathBuf,
    platform: PathBuf,
    config: PathBuf,
    seed: PathBuf,
}

fn fixture(count: u8) -> Fixture {
    let dir = TempDir::new().unwrap();
    let national = keygen(dir.path(), "national");
    let platform = keygen(dir.path(), "platform");

    let config = dir.path().join("dkpublish.toml");
    fs::write(
        &config,
        format!(
            "[signing]\nnational_key = '{}'\nplatform_key = '{}'\n",
            with_ext(&national, "secret").display(),
            with_ext(&platform, "secret").display()
        ),
    )
    .unwrap();

    let seed = dir.path().join("keys.json");
    let keys: Vec<Value> = (0..count).map(source_key).collect();
    fs::write(&seed, serde_json::to_string(&keys).unwrap()).unwrap();

    Fixture {
        dir,
        national,
        platform,
        config,
        seed,
    }
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    dkpublish()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Diagnosis key publication pipeline"));
}

#[test]
fn version_exits_0() {
    dkpublish()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("dkpublish"));
}

#[test]
fn run_without_kinds_is_usage_error() {
    dkpublish().arg("run").assert().failure();
}

// ──────────────────────────────────────────────
// 2. keygen
// ──────────────────────────────────────────────

#[test]
fn keygen_writes_secret_and_public_files() {
    let dir = TempDir::new().unwrap();
    let prefix = dir.path().join("national");
    dkpublish()
        .args(["keygen", "--out", prefix.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated Ed25519 keypair"));

    assert!(with_ext(&prefix, "secret").exists());
    assert!(with_ext(&prefix, "pub").exists());
}

// ──────────────────────────────────────────────
// 3. run
// ──────────────────────────────────────────────

#[test]
fn eks_run_publishes_and_verifies() {
    let fx = fixture(1);
    let out = fx.dir.path().join("out");

    let output = dkpublish()
        .arg("--config")
        .arg(&fx.config)
        .args(["run", "eks", "--seed"])
        .arg(&fx.seed)
        .arg("--out")
        .arg(&out)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["eks"]["input_count"], 1);
    let artifacts = result["artifacts"].as_array().unwrap();
    assert_eq!(artifacts.len(), 1);

    let archive = PathBuf::from(artifacts[0].as_str().unwrap());
    assert!(archive.exists());
    dkpublish()
        .arg("verify")
        .arg(&archive)
        .arg("--national-pub")
        .arg(with_ext(&fx.national, "pub"))
        .arg("--platform-pub")
        .arg(with_ext(&fx.platform, "pub"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"national_signature_valid\": true"));
}

#[test]
fn verify_rejects_wrong_public_key() {
    let fx = fixture(2);
    let out = fx.dir.path().join("out");
    dkpublish()
        .arg("--config")
        .arg(&fx.config)
        .args(["run", "eks", "--seed"])
        .arg(&fx.seed)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    let archive = fs::read_dir(&out).unwrap().next().unwrap().unwrap().path();
    let stranger = keygen(fx.dir.path(), "stranger");
    dkpublish()
        .arg("verify")
        .arg(&archive)
        .arg("--national-pub")
        .arg(with_ext(&stranger, "pub"))
        .arg("--platform-pub")
        .arg(with_ext(&fx.platform, "pub"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("signature verification failed"));
}

#[test]
fn eks_without_signing_keys_fails() {
    let fx = fixture(1);
    dkpublish()
        .args(["run", "eks", "--seed"])
        .arg(&fx.seed)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("signing.national_key"));
}

#[test]
fn import_runs_without_configuration() {
    dkpublish()
        .args(["run", "import"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"batches\": 0"));
}

#[test]
fn malformed_config_fails() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("bad.toml");
    fs::write(&config, "[eks]\ntek_count_min = \"many\"\n").unwrap();
    dkpublish()
        .arg("--config")
        .arg(&config)
        .args(["run", "import"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("could not parse"));
}

#[test]
fn malformed_seed_fails() {
    let dir = TempDir::new().unwrap();
    let seed = dir.path().join("keys.json");
    fs::write(&seed, "{ not json").unwrap();
    dkpublish()
        .args(["run", "import", "--seed"])
        .arg(&seed)
        .assert()
        .failure()
        .stderr(predicate::str::contains("keys.json"));
}

// ──────────────────────────────────────────────
// 4. schedule
// ──────────────────────────────────────────────

#[test]
fn schedule_stops_after_requested_ticks() {
    let fx = fixture(1);
    dkpublish()
        .arg("--config")
        .arg(&fx.config)
        .args(["schedule", "--ticks", "1", "--seed"])
        .arg(&fx.seed)
        .assert()
        .success()
        .stderr(predicate::str::contains("scheduler stopped"));
}
