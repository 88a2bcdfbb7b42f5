//! Tunable parameters for triangulation and interpolation.

use crate::dtm::BreaklineStrategy;
use crate::error::Result;

/// Settings shared by a [`crate::model::TerrainModel`] and its derived
/// structures. Every field has a default, so partial JSON files are accepted.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Number of neighbours blended by inverse-distance weighting.
    pub idw_neighbors: usize,
    /// Planar distance under which an IDW query snaps to a stored point.
    pub coincidence_epsilon: f64,
    /// Perpendicular distance under which barycentric interpolation follows
    /// a break line instead of the containing triangle.
    pub breakline_tolerance: f64,
    /// Upper bound on re-triangulation passes while enforcing break lines.
    pub max_refinement_passes: usize,
    pub breakline_strategy: BreaklineStrategy,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            idw_neighbors: 5,
            coincidence_epsilon: 1e-9,
            breakline_tolerance: 0.01,
            max_refinement_passes: 24,
            breakline_strategy: BreaklineStrategy::Constrained,
        }
    }
}

impl TerrainConfig {
    /// Saves this configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Loads a configuration from a JSON file.
    pub fn load(path: &str) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}
