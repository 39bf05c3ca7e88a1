//! Object placement

use glam::{EulerRot, Mat4, Quat, Vec3};

/// Position, Euler rotation (degrees) and scale with a cached model matrix.
///
/// Fields are private so that every mutation goes through a setter and the
/// cached matrix can never drift from its components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    position: Vec3,
    rotation: Vec3,
    scale: Vec3,
    matrix: Mat4,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            matrix: Mat4::IDENTITY,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create transform from position, rotation (euler angles in degrees), and scale
    pub fn from_components(position: Vec3, rotation: Vec3, scale: Vec3) -> Self {
        let mut transform = Self {
            position,
            rotation,
            scale,
            matrix: Mat4::IDENTITY,
        };
        transform.update();
        transform
    }

    pub fn from_position(position: Vec3) -> Self {
        Self::from_components(position, Vec3::ZERO, Vec3::ONE)
    }

    fn update(&mut self) {
        let rotation = Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        );
        self.matrix = Mat4::from_scale_rotation_translation(self.scale, rotation, self.position);
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Euler angles in degrees
    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.update();
    }

    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.rotation = rotation;
        self.update();
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.update();
    }

    /// Translate by an offset
    pub fn translate(&mut self, offset: Vec3) {
        self.set_position(self.position + offset);
    }

    /// Model matrix: translate * rotate * scale
    pub fn matrix(&self) -> Mat4 {
        self.matrix
    }

    /// Get the normal matrix (inverse transpose of model matrix)
    pub fn normal_matrix(&self) -> Mat4 {
        self.matrix.inverse().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_follows_setters() {
        let mut transform = Transform::new();
        assert_eq!(transform.matrix(), Mat4::IDENTITY);

        transform.set_position(Vec3::new(1.0, 2.0, 3.0));
        transform.set_scale(Vec3::splat(2.0));
        let point = transform.matrix().transform_point3(Vec3::ONE);
        assert!((point - Vec3::new(3.0, 4.0, 5.0)).length() < 1e-5);
    }

    #[test]
    fn test_rotation_is_in_degrees() {
        let transform = Transform::from_components(Vec3::ZERO, Vec3::new(0.0, 90.0, 0.0), Vec3::ONE);
        let rotated = transform.matrix().transform_vector3(Vec3::X);
        assert!((rotated - Vec3::NEG_Z).length() < 1e-5);
    }
}
