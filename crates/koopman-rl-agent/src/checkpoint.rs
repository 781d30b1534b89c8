//! JSON checkpoints for agent parameters
//!
//! Checkpoints carry the policy layer stack and the critic weights. Writes
//! go through a sibling temp file and a rename so a crash mid-write never
//! leaves a truncated checkpoint behind.

use std::fs;
use std::path::Path;

use ndarray::Array1;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use koopman_rl_core::{KoopmanError, Result};

use crate::nn::Dense;

/// Serialized agent state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Policy network layers, input to output
    pub policy_layers: Vec<Dense>,
    /// Critic weights over the state dictionary
    pub value_weights: Array1<f64>,
    /// Episodes completed when the checkpoint was taken
    pub episodes_completed: usize,
}

/// Write a checkpoint atomically (temp file, then rename)
pub fn save_checkpoint<T: Serialize>(path: &Path, checkpoint: &T) -> Result<()> {
    let json = serde_json::to_string(checkpoint)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a checkpoint; any failure here is fatal for training resumption
pub fn load_checkpoint<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path).map_err(|e| {
        KoopmanError::Checkpoint(format!("cannot read {}: {e}", path.display()))
    })?;
    serde_json::from_str(&json)
        .map_err(|e| KoopmanError::Checkpoint(format!("cannot parse {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample_checkpoint() -> Checkpoint {
        Checkpoint {
            policy_layers: vec![Dense {
                weight: array![[1.0, 2.0], [3.0, 4.0]],
                bias: array![0.5, -0.5],
            }],
            value_weights: array![0.1, 0.2, 0.3],
            episodes_completed: 42,
        }
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        let original = sample_checkpoint();
        save_checkpoint(&path, &original).unwrap();
        let restored = load_checkpoint::<Checkpoint>(&path).unwrap();
        assert_eq!(restored.episodes_completed, 42);
        assert_eq!(restored.value_weights, original.value_weights);
        assert_eq!(
            restored.policy_layers[0].weight,
            original.policy_layers[0].weight
        );
    }

    #[test]
    fn floats_survive_the_round_trip_bit_exactly() {
        // Trained weights are arbitrary doubles with no short decimal form;
        // the serde_json float_roundtrip feature keeps the reload bit-exact.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        let original = Checkpoint {
            policy_layers: vec![Dense {
                weight: array![[std::f64::consts::PI, 1.0 / 3.0], [2.0f64.sqrt(), 1e-300]],
                bias: array![-std::f64::consts::E, f64::MIN_POSITIVE],
            }],
            value_weights: array![0.1 + 0.2, (-7.3f64).exp()],
            episodes_completed: 1,
        };
        save_checkpoint(&path, &original).unwrap();
        let restored = load_checkpoint::<Checkpoint>(&path).unwrap();
        for (a, b) in restored.policy_layers[0]
            .weight
            .iter()
            .chain(restored.policy_layers[0].bias.iter())
            .zip(
                original.policy_layers[0]
                    .weight
                    .iter()
                    .chain(original.policy_layers[0].bias.iter()),
            )
        {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(restored.value_weights, original.value_weights);
    }

    #[test]
    fn missing_file_is_a_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(
            load_checkpoint::<Checkpoint>(&path),
            Err(KoopmanError::Checkpoint(_))
        ));
    }

    #[test]
    fn corrupt_file_is_a_checkpoint_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_checkpoint::<Checkpoint>(&path),
            Err(KoopmanError::Checkpoint(_))
        ));
    }

    #[test]
    fn overwrite_replaces_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        let mut ckpt = sample_checkpoint();
        save_checkpoint(&path, &ckpt).unwrap();
        ckpt.episodes_completed = 100;
        save_checkpoint(&path, &ckpt).unwrap();
        assert_eq!(
            load_checkpoint::<Checkpoint>(&path).unwrap().episodes_completed,
            100
        );
    }
}
