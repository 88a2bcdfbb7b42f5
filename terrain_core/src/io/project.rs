//! JSON terrain documents.
//!
//! A document holds a name, the points as `[id, x, y, z]` rows and the break
//! lines as `[start, end]` id pairs. Loading goes through [`TerrainModel`] so
//! ids and break lines are validated on the way in.

use serde::{Deserialize, Serialize};

use crate::config::TerrainConfig;
use crate::error::Result;
use crate::model::TerrainModel;
use crate::store::{CoordinateCodec, TerrainPoint};

/// JSON form of a terrain: points as `[id, x, y, z]` rows and break lines as
/// `[start, end]` id pairs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TerrainDocument {
    #[serde(default)]
    pub name: String,
    pub points: Vec<TerrainPoint>,
    #[serde(default)]
    pub break_lines: Vec<(u64, u64)>,
}

impl TerrainDocument {
    pub fn from_model<C: CoordinateCodec>(model: &TerrainModel<C>) -> Self {
        Self {
            name: model.name().to_string(),
            points: model.store().iter().collect(),
            break_lines: model.break_lines().iter().map(|b| (b.start, b.end)).collect(),
        }
    }

    /// Builds a model, validating every point and break line.
    pub fn into_model<C: CoordinateCodec>(self, config: TerrainConfig) -> Result<TerrainModel<C>> {
        let mut model = TerrainModel::with_config(self.name, config);
        model.add_points(self.points)?;
        for (start, end) in self.break_lines {
            model.add_break_line(start, end)?;
        }
        Ok(model)
    }
}

pub fn read_terrain_json(path: &str) -> Result<TerrainDocument> {
    let contents = crate::io::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn write_terrain_json(path: &str, document: &TerrainDocument) -> Result<()> {
    let json = serde_json::to_string_pretty(document)?;
    crate::io::write_string(path, &json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TerrainError;

    #[test]
    fn parses_rows() {
        let doc: TerrainDocument = serde_json::from_str(
            r#"{"name": "hill", "points": [[1, 0, 0, 1.5], [2, 1, 0, 2], [3, 0, 1, 3]],
                "break_lines": [[1, 2]]}"#,
        )
        .unwrap();
        assert_eq!(doc.points.len(), 3);
        assert_eq!(doc.points[0].z(), 1.5);
        let model: TerrainModel = doc.into_model(TerrainConfig::default()).unwrap();
        assert_eq!(model.name(), "hill");
        assert_eq!(model.break_lines().len(), 1);
    }

    #[test]
    fn break_lines_are_optional() {
        let doc: TerrainDocument = serde_json::from_str(r#"{"points": [[4, 1, 2, 3]]}"#).unwrap();
        assert!(doc.break_lines.is_empty());
        assert!(doc.name.is_empty());
    }

    #[test]
    fn invalid_references_fail() {
        let doc = TerrainDocument {
            name: "bad".into(),
            points: vec![TerrainPoint::new(1, 0.0, 0.0, 0.0).unwrap()],
            break_lines: vec![(1, 2)],
        };
        let err = doc.into_model::<crate::store::Exact>(TerrainConfig::default()).unwrap_err();
        assert!(matches!(err, TerrainError::NotFound(2)));
    }

    #[test]
    fn file_round_trip() {
        let mut model: TerrainModel = TerrainModel::new("site");
        model
            .add_points([
                TerrainPoint::new(1, 0.0, 0.0, 0.0).unwrap(),
                TerrainPoint::new(2, 3.0, 0.0, 1.0).unwrap(),
                TerrainPoint::new(3, 0.0, 3.0, 2.0).unwrap(),
            ])
            .unwrap();
        model.add_break_line(2, 3).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        write_terrain_json(path, &TerrainDocument::from_model(&model)).unwrap();
        let doc = read_terrain_json(path).unwrap();
        assert_eq!(doc, TerrainDocument::from_model(&model));
        assert_eq!(doc.break_lines, vec![(2, 3)]);
    }
}
