// ─────────────────────────────────────────────────────────────────────
// SCPN Fusion Core — Continuation Checkpoints
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Persistence of per-step equilibrium snapshots.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use fusion_types::error::FusionResult;
use serde::{Deserialize, Serialize};

use crate::equilibrium::EquilibriumSnapshot;

/// Receives the equilibrium after every continuation step.
pub trait CheckpointSink {
    fn record(&mut self, step: usize, snapshot: &EquilibriumSnapshot) -> FusionResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub step: usize,
    pub snapshot: EquilibriumSnapshot,
}

/// One JSON object per line, flushed after every step.
#[derive(Debug)]
pub struct JsonCheckpoint {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonCheckpoint {
    /// Create (or truncate) the checkpoint file.
    pub fn create(path: impl AsRef<Path>) -> FusionResult<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = BufWriter::new(File::create(&path)?);
        Ok(JsonCheckpoint { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_all(path: impl AsRef<Path>) -> FusionResult<Vec<CheckpointRecord>> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }
}

impl CheckpointSink for JsonCheckpoint {
    fn record(&mut self, step: usize, snapshot: &EquilibriumSnapshot) -> FusionResult<()> {
        let record = CheckpointRecord {
            step,
            snapshot: snapshot.clone(),
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        log::debug!("checkpoint step {step} written to {}", self.path.display());
        Ok(())
    }
}

impl CheckpointSink for Vec<CheckpointRecord> {
    fn record(&mut self, step: usize, snapshot: &EquilibriumSnapshot) -> FusionResult<()> {
        self.push(CheckpointRecord {
            step,
            snapshot: snapshot.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equilibrium::{Equilibrium, Resolution, RotationProfile};
    use ndarray::Array1;

    #[test]
    fn test_json_lines_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let res = Resolution { m: 2, n: 1, m_nodes: 4, n_nodes: 2 };
        let eq = Equilibrium::new(2, res, RotationProfile::Iota, (2, 3), 1.5);
        let mut sink = JsonCheckpoint::create(&path).unwrap();
        sink.record(0, &eq.snapshot()).unwrap();
        sink.record(1, &eq.snapshot()).unwrap();
        drop(sink);

        let records = JsonCheckpoint::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].step, 1);
        let back = Equilibrium::from_snapshot(&records[0].snapshot).unwrap();
        assert_eq!(back.state(), eq.state());
        assert_eq!(back.resolution(), res);
    }

    #[test]
    fn test_state_survives_bit_for_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bits.jsonl");
        let res = Resolution { m: 2, n: 0, m_nodes: 4, n_nodes: 0 };
        let eq = Equilibrium::new(1, res, RotationProfile::Current, (2, 2), 1.0);
        let x = Array1::from_iter((0..eq.state().len()).map(|i| {
            if i == 0 {
                -0.1
            } else {
                (0.7 * i as f64).sin() / 3.0 + 1e-17 * i as f64
            }
        }));
        let eq = eq.with_state(&x).unwrap();
        let mut sink = JsonCheckpoint::create(&path).unwrap();
        sink.record(0, &eq.snapshot()).unwrap();
        drop(sink);

        let records = JsonCheckpoint::read_all(&path).unwrap();
        let back = Equilibrium::from_snapshot(&records[0].snapshot).unwrap().state();
        for (a, b) in back.iter().zip(x.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = JsonCheckpoint::read_all("/nonexistent/checkpoint.jsonl").unwrap_err();
        assert!(matches!(err, fusion_types::error::FusionError::Io(_)));
    }
}
