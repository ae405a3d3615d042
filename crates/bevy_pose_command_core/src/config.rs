use serde::{Deserialize, Serialize};

/// Tunables for pose evaluation. Every field has a default, so RON config files only need to
/// name the values they override.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseCommandConfig {
    pub arena: ArenaConfig,
    /// Bytes reserved for a single character's instruction stream.
    pub command_stream_capacity: usize,
    /// Squared length under which an accumulated rotation is replaced by identity when normalized.
    pub normalize_epsilon: f32,
    /// Allowed deviation from unit length checked by `VerifyFull` in debug builds.
    pub verify_tolerance: f32,
    pub ik: IkConfig,
}

impl Default for PoseCommandConfig {
    fn default() -> Self {
        Self {
            arena: ArenaConfig::default(),
            command_stream_capacity: 4 * 1024,
            normalize_epsilon: 1e-8,
            verify_tolerance: 1e-3,
            ik: IkConfig::default(),
        }
    }
}

impl PoseCommandConfig {
    pub fn from_ron_str(source: &str) -> Result<Self, ron::error::SpannedError> {
        ron::de::from_str(source)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Size of each bucket the arena reserves. Larger requests get a dedicated bucket.
    pub bucket_size: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            bucket_size: 16 * 1024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IkConfig {
    /// Targets whose effective weight is at or below this value are skipped.
    pub weight_threshold: f32,
    pub ccd_iterations: u32,
    /// Distance from the goal at which the CCD solver stops iterating.
    pub ccd_tolerance: f32,
    /// How far short of full extension the analytic solvers keep a chain, in world units.
    pub max_reach_offset: f32,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            weight_threshold: 0.01,
            ccd_iterations: 16,
            ccd_tolerance: 1e-4,
            max_reach_offset: 0.01,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_ron_keeps_defaults() {
        let config = PoseCommandConfig::from_ron_str("(ik: (ccd_iterations: 4))").unwrap();
        assert_eq!(config.ik.ccd_iterations, 4);
        assert_eq!(config.ik.weight_threshold, IkConfig::default().weight_threshold);
        assert_eq!(config.arena, ArenaConfig::default());
    }

    #[test]
    fn malformed_ron_is_rejected() {
        assert!(PoseCommandConfig::from_ron_str("(arena: 12)").is_err());
    }
}
