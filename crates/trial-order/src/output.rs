use crate::config::DesignParams;
use crate::trial::Trial;
use crate::TrialOrder;
use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub const RUN_SCHEMA_VERSION: &str = "trial_order_v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub schema_version: String,
    pub participant: u32,
    pub session: usize,
    pub run: usize,
    pub trials: Vec<Trial>,
}

#[derive(Debug, Clone)]
pub struct WrittenRun {
    pub session: usize,
    pub run: usize,
    pub path: PathBuf,
    pub trials: usize,
    pub digest: String,
}

pub fn run_file_path(out_dir: &Path, participant: u32, session: usize, run: usize) -> PathBuf {
    out_dir.join(format!(
        "trial_order_p{}_s{}_r{}.json",
        participant, session, run
    ))
}

pub fn manifest_path(out_dir: &Path, participant: u32) -> PathBuf {
    out_dir.join(format!("manifest_p{}.json", participant))
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .map_err(|e| anyhow!("failed to create directory {}: {}", path.display(), e))
}

pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

fn record_bytes(record: &RunRecord) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(record)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Writes one file per run, then the manifest. Existing files for the same
/// participant are replaced.
pub fn write_trial_order(
    order: &TrialOrder,
    params: &DesignParams,
    out_dir: &Path,
) -> Result<Vec<WrittenRun>> {
    ensure_dir(out_dir)?;
    let mut written = Vec::new();
    for (session_i, session) in order.sessions.iter().enumerate() {
        for (run_i, run) in session.iter().enumerate() {
            let record = RunRecord {
                schema_version: RUN_SCHEMA_VERSION.to_string(),
                participant: order.participant,
                session: session_i + 1,
                run: run_i + 1,
                trials: run.clone(),
            };
            let bytes = record_bytes(&record)?;
            let path = run_file_path(out_dir, order.participant, session_i + 1, run_i + 1);
            atomic_write_bytes(&path, &bytes)?;
            info!(
                participant = order.participant,
                session = session_i + 1,
                run = run_i + 1,
                trials = run.len(),
                path = %path.display(),
                "wrote trial order"
            );
            written.push(WrittenRun {
                session: session_i + 1,
                run: run_i + 1,
                path,
                trials: run.len(),
                digest: sha256_bytes(&bytes),
            });
        }
    }

    let runs: Vec<_> = written
        .iter()
        .map(|w| {
            json!({
                "session": w.session,
                "run": w.run,
                "file": w.path.file_name().map(|n| n.to_string_lossy().to_string()),
                "trials": w.trials,
                "digest": w.digest,
            })
        })
        .collect();
    let manifest = json!({
        "schema_version": "trial_order_manifest_v1",
        "participant": order.participant,
        "generator_version": concat!("rust-", env!("CARGO_PKG_VERSION")),
        "created_at": Utc::now().to_rfc3339(),
        "stimulus_seed_base": params.stimulus_seed_base,
        "verb_seed_base": params.verb_seed_base,
        "runs": runs,
    });
    atomic_write_bytes(
        &manifest_path(out_dir, order.participant),
        &serde_json::to_vec_pretty(&manifest)?,
    )?;
    Ok(written)
}

pub fn read_run_record(path: &Path) -> Result<RunRecord> {
    let data = fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read trial order {}: {}", path.display(), e))?;
    let record: RunRecord = serde_json::from_str(&data)?;
    if record.schema_version != RUN_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported trial order schema_version: {}",
            record.schema_version
        ));
    }
    Ok(record)
}
