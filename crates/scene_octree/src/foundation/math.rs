//! Math utilities and types
//!
//! Provides the vector, matrix and quaternion aliases used by the node
//! hierarchy and the spatial index, plus a decomposed TRS [`Transform`].

pub use nalgebra::{
    Vector2, Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Coordinate space used by relative transform operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformSpace {
    /// The node's own rotated frame
    #[default]
    Local,
    /// The parent node's frame
    Parent,
    /// World space
    World,
}

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Convert to a transformation matrix (translation * rotation * scale)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Extension methods on 4x4 affine matrices
pub trait Mat4Ext {
    /// Translation column of an affine matrix
    fn translation_part(&self) -> Vec3;

    /// Transform a point (w = 1)
    fn transform_point3(&self, point: Vec3) -> Vec3;

    /// Transform a direction (w = 0)
    fn transform_vector3(&self, vector: Vec3) -> Vec3;
}

impl Mat4Ext for Mat4 {
    fn translation_part(&self) -> Vec3 {
        Vec3::new(self.m14, self.m24, self.m34)
    }

    fn transform_point3(&self, point: Vec3) -> Vec3 {
        self.transform_point(&Point3::from(point)).coords
    }

    fn transform_vector3(&self, vector: Vec3) -> Vec3 {
        self.transform_vector(&vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_matrix_applies_scale_before_translation() {
        let transform = Transform {
            position: Vec3::new(10.0, 0.0, 0.0),
            scale: Vec3::new(2.0, 2.0, 2.0),
            ..Default::default()
        };

        let point = transform.to_matrix().transform_point3(Vec3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(point, Vec3::new(12.0, 2.0, 2.0), epsilon = 1e-6);
    }

    #[test]
    fn test_mat4_ext_point_and_vector() {
        let matrix = Mat4::new_translation(&Vec3::new(0.0, 5.0, 0.0));
        assert_relative_eq!(matrix.transform_point3(Vec3::zeros()), Vec3::new(0.0, 5.0, 0.0));
        assert_relative_eq!(matrix.transform_vector3(Vec3::x()), Vec3::x());
        assert_relative_eq!(matrix.translation_part(), Vec3::new(0.0, 5.0, 0.0));
    }
}
