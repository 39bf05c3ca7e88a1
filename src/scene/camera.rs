//! Camera system

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Camera projection type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in degrees
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: 45.0,
            aspect: 4.0 / 3.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl Projection {
    /// GL clip-space matrix (depth in [-1, 1])
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh_gl(fov_y.to_radians(), aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh_gl(left, right, bottom, top, near, far),
        }
    }

    pub fn near(&self) -> f32 {
        match self {
            Projection::Perspective { near, .. } | Projection::Orthographic { near, .. } => *near,
        }
    }

    pub fn far(&self) -> f32 {
        match self {
            Projection::Perspective { far, .. } | Projection::Orthographic { far, .. } => *far,
        }
    }
}

/// Camera uniform block (`Matrices`, binding 0)
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniformData {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec4,
}

/// Free-flying camera with an optional locked target
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    direction: Vec3,
    world_up: Vec3,
    target: Option<Vec3>,
    projection: Projection,
    /// Distance per second of held key
    pub speed: f32,
    /// Radians per pixel of mouse motion
    pub sensitivity: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 1.0),
            direction: Vec3::NEG_Z,
            world_up: Vec3::Y,
            target: None,
            projection: Projection::default(),
            speed: 0.2,
            sensitivity: 0.001,
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        let mut camera = Self::default();
        camera.position = position;
        camera.set_direction(target - position);
        camera
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Normalized view direction
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn target(&self) -> Option<Vec3> {
        self.target
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Move the camera; a locked target keeps being looked at
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        if let Some(target) = self.target {
            self.look_towards(target - position);
        }
    }

    /// Look along `direction`, releasing any target lock
    pub fn set_direction(&mut self, direction: Vec3) {
        self.target = None;
        self.look_towards(direction);
    }

    /// Lock onto `target`, or release the lock with `None`
    pub fn set_look_at(&mut self, target: Option<Vec3>) {
        self.target = target;
        if let Some(target) = target {
            self.look_towards(target - self.position);
        }
    }

    fn look_towards(&mut self, direction: Vec3) {
        if let Some(direction) = direction.try_normalize() {
            self.direction = direction;
        }
    }

    /// Perspective projection, field of view in degrees
    pub fn set_perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.projection = Projection::Perspective {
            fov_y,
            aspect,
            near,
            far,
        };
    }

    pub fn set_orthographic(
        &mut self,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) {
        self.projection = Projection::Orthographic {
            left,
            right,
            bottom,
            top,
            near,
            far,
        };
    }

    /// Switch projection kind, keeping the clip planes
    pub fn set_projection_mode(&mut self, orthographic: bool) {
        let (near, far) = (self.projection.near(), self.projection.far());
        self.projection = if orthographic {
            Projection::Orthographic {
                left: -10.0,
                right: 10.0,
                bottom: -10.0,
                top: 10.0,
                near,
                far,
            }
        } else {
            Projection::Perspective {
                fov_y: 45.0,
                aspect: 4.0 / 3.0,
                near,
                far,
            }
        };
    }

    /// Update aspect ratio for perspective projection
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        if let Projection::Perspective { aspect, .. } = &mut self.projection {
            if height > 0.0 {
                *aspect = width / height;
            }
        }
    }

    /// Camera-space right vector
    pub fn right(&self) -> Vec3 {
        self.direction
            .cross(self.world_up)
            .try_normalize()
            .unwrap_or(Vec3::X)
    }

    pub fn up(&self) -> Vec3 {
        self.right().cross(self.direction)
    }

    /// Apply held W/A/S/D keys for `dt` seconds
    pub fn process_key(&mut self, w: bool, a: bool, s: bool, d: bool, dt: f32) {
        let step = self.speed * dt;
        let right = self.right();
        let mut offset = Vec3::ZERO;
        if w {
            offset += self.direction;
        }
        if s {
            offset -= self.direction;
        }
        if a {
            offset -= right;
        }
        if d {
            offset += right;
        }
        self.set_position(self.position + offset * step);
    }

    /// Turn by mouse motion, releasing any target lock
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        let limit = 89.0f32.to_radians();
        let yaw = self.direction.z.atan2(self.direction.x) + dx * self.sensitivity;
        let pitch = (self.direction.y.clamp(-1.0, 1.0).asin() - dy * self.sensitivity)
            .clamp(-limit, limit);
        self.set_direction(Vec3::new(
            yaw.cos() * pitch.cos(),
            pitch.sin(),
            yaw.sin() * pitch.cos(),
        ));
    }

    /// Get the view matrix
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction, self.world_up)
    }

    /// Get the projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    /// Get combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn uniform_data(&self) -> CameraUniformData {
        CameraUniformData {
            view: self.view_matrix(),
            projection: self.projection_matrix(),
            position: self.position.extend(1.0),
        }
    }
}
