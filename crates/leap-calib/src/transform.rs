use glam::{Mat4, Vec3, Vec4};

/// Affine transform mapping sensor space into the camera's coordinate space:
/// rotation plus translation over a homogeneous `[0, 0, 0, 1]` bottom row.
/// Immutable once published; a redone calibration replaces it wholesale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationTransform {
    mat: Mat4,
}

impl CalibrationTransform {
    pub const IDENTITY: Self = Self {
        mat: Mat4::IDENTITY,
    };

    /// Build from a row-major 4x4 layout.
    pub fn from_rows(rows: [[f32; 4]; 4]) -> Self {
        Self {
            mat: Mat4::from_cols_array_2d(&rows).transpose(),
        }
    }

    /// Build from 9 row-major rotation terms and a translation, with the
    /// bottom-right homogeneous term fixed at 1.
    pub fn from_rotation_translation(r: [f32; 9], t: [f32; 3]) -> Self {
        Self::from_rows([
            [r[0], r[1], r[2], t[0]],
            [r[3], r[4], r[5], t[1]],
            [r[6], r[7], r[8], t[2]],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Row-major 4x4 layout.
    pub fn rows(&self) -> [[f32; 4]; 4] {
        self.mat.transpose().to_cols_array_2d()
    }

    /// Whether the transform can be inverted.
    pub fn is_invertible(&self) -> bool {
        self.mat.determinant().abs() > f32::EPSILON
    }

    /// Map one sensor-space vector into camera space.
    ///
    /// The vector is promoted to homogeneous coordinates with w = 1,
    /// multiplied by the transform, its y component negated (the camera is
    /// modeled as a pinhole whose y axis points down), then divided by w.
    /// Directions take the same path as positions, not an inverse-transpose;
    /// the sensor host's solver expects exactly this mapping.
    pub fn apply(&self, v: Vec3) -> Vec3 {
        let mut hom: Vec4 = self.mat * v.extend(1.0);
        hom.y = -hom.y;
        hom = hom / hom.w;
        hom.truncate()
    }

    /// [`apply`](Self::apply) over plain component triples, for wire structs
    /// that store their vectors as flat scalar fields.
    pub fn apply_array(&self, v: [f32; 3]) -> [f32; 3] {
        self.apply(Vec3::from_array(v)).to_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_only_flips_y() {
        let t = CalibrationTransform::IDENTITY;
        assert_eq!(t.apply(Vec3::new(1.0, 2.0, 3.0)), Vec3::new(1.0, -2.0, 3.0));
    }

    #[test]
    fn rotation_translation_layout_is_row_major() {
        let t = CalibrationTransform::from_rotation_translation(
            [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            [5.0, 6.0, 7.0],
        );
        let rows = t.rows();
        assert_eq!(rows[0], [1.0, 0.0, 0.0, 5.0]);
        assert_eq!(rows[1], [0.0, 1.0, 0.0, 6.0]);
        assert_eq!(rows[2], [0.0, 0.0, 1.0, 7.0]);
        assert_eq!(rows[3], [0.0, 0.0, 0.0, 1.0]);
        // Translation applies before the y flip.
        assert_eq!(
            t.apply(Vec3::new(1.0, 1.0, 1.0)),
            Vec3::new(6.0, -7.0, 8.0)
        );
    }

    #[test]
    fn rows_round_trip() {
        let rows = [
            [0.0, -1.0, 0.0, 0.5],
            [1.0, 0.0, 0.0, -0.25],
            [0.0, 0.0, 1.0, 2.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        assert_eq!(CalibrationTransform::from_rows(rows).rows(), rows);
    }

    #[test]
    fn degenerate_linear_part_is_not_invertible() {
        let zero = CalibrationTransform::from_rows([[0.0; 4]; 4]);
        assert!(!zero.is_invertible());
        assert!(CalibrationTransform::IDENTITY.is_invertible());
    }
}
