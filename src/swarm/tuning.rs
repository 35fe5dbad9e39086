//! Live-tunable swarm parameters.
//!
//! One process-wide record behind a mutex. Steering code copies the whole
//! record out at the start of a call, so a mid-tick update can never make one
//! axis observe a different `max_speed` than another.

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwarmTuning {
    /// Formation-force weight.
    pub cohesion: f64,
    /// Separation radius in meters, doubling as the separation-force weight.
    pub separation: f64,
    /// Alignment-force weight.
    pub alignment: f64,
    /// Per-axis velocity clamp, m/s.
    pub max_speed: f64,
    /// Commanded swarm altitude, meters.
    pub target_altitude: f64,
    /// Desired number of agents; the tick loop resizes toward it.
    pub swarm_size: usize,
}

impl Default for SwarmTuning {
    fn default() -> Self {
        SwarmTuning {
            cohesion: 1.0,
            separation: 10.0,
            alignment: 1.0,
            max_speed: 5.0,
            target_altitude: 20.0,
            swarm_size: 9,
        }
    }
}

/// Partial update from a `swarm_settings` control message. Absent fields
/// preserve the current value; a non-integer `swarm_size` fails to parse and
/// the whole message is discarded upstream.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TuningPatch {
    #[serde(default)]
    pub cohesion: Option<f64>,
    #[serde(default)]
    pub separation: Option<f64>,
    #[serde(default)]
    pub alignment: Option<f64>,
    #[serde(default)]
    pub max_speed: Option<f64>,
    #[serde(default)]
    pub target_altitude: Option<f64>,
    #[serde(default)]
    pub swarm_size: Option<usize>,
}

/// Guarded access to the shared tuning record. The lock is held only across
/// a field copy.
pub struct TuningStore {
    inner: Mutex<SwarmTuning>,
}

impl TuningStore {
    pub fn new(initial: SwarmTuning) -> Self {
        TuningStore {
            inner: Mutex::new(initial),
        }
    }

    pub fn get(&self) -> SwarmTuning {
        *self.inner.lock()
    }

    pub fn set(&self, tuning: SwarmTuning) {
        *self.inner.lock() = tuning;
    }

    pub fn apply(&self, patch: TuningPatch) {
        let mut tuning = self.inner.lock();
        if let Some(v) = patch.cohesion {
            tuning.cohesion = v;
        }
        if let Some(v) = patch.separation {
            tuning.separation = v;
        }
        if let Some(v) = patch.alignment {
            tuning.alignment = v;
        }
        if let Some(v) = patch.max_speed {
            tuning.max_speed = v;
        }
        if let Some(v) = patch.target_altitude {
            tuning.target_altitude = v;
        }
        if let Some(v) = patch.swarm_size {
            tuning.swarm_size = v.max(1);
        }
        info!(
            cohesion = tuning.cohesion,
            separation = tuning.separation,
            alignment = tuning.alignment,
            max_speed = tuning.max_speed,
            target_altitude = tuning.target_altitude,
            swarm_size = tuning.swarm_size,
            "[Tuning] Updated swarm settings"
        );
    }
}

impl Default for TuningStore {
    fn default() -> Self {
        Self::new(SwarmTuning::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let t = SwarmTuning::default();
        assert_eq!(
            (t.cohesion, t.separation, t.alignment, t.max_speed, t.target_altitude, t.swarm_size),
            (1.0, 10.0, 1.0, 5.0, 20.0, 9)
        );
    }

    #[test]
    fn partial_patch_preserves_missing_fields() {
        let store = TuningStore::default();
        let patch: TuningPatch =
            serde_json::from_str(r#"{"max_speed": 8.0, "swarm_size": 12}"#).unwrap();
        store.apply(patch);
        let t = store.get();
        assert_eq!(t.max_speed, 8.0);
        assert_eq!(t.swarm_size, 12);
        assert_eq!(t.cohesion, 1.0);
        assert_eq!(t.separation, 10.0);
    }

    #[test]
    fn fractional_swarm_size_is_rejected_by_type() {
        assert!(serde_json::from_str::<TuningPatch>(r#"{"swarm_size": 9.5}"#).is_err());
    }

    #[test]
    fn swarm_size_floor_is_one() {
        let store = TuningStore::default();
        store.apply(TuningPatch {
            swarm_size: Some(0),
            ..TuningPatch::default()
        });
        assert_eq!(store.get().swarm_size, 1);
    }
}
