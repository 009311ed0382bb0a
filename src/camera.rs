use glam::{Mat4, Vec3};

/// A perspective camera for the host scene.
///
/// The hologram pass uses it to draw captured objects with the same
/// transforms as the main camera and to reconstruct world positions from the
/// captured depth.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub fov: f32, // radians
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_2, // 90 degrees
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(mut self, x: f32, y: f32, z: f32) -> Self {
        self.position = Vec3::new(x, y, z);
        self
    }

    pub fn looking_at(mut self, target_x: f32, target_y: f32, target_z: f32) -> Self {
        let forward = Vec3::new(target_x, target_y, target_z) - self.position;
        self.forward = forward.normalize_or_zero();
        self
    }

    pub fn with_fov(mut self, fov_degrees: f32) -> Self {
        self.fov = fov_degrees.to_radians();
        self
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    /// Right-handed perspective projection with a `[0, 1]` depth range.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov, aspect, self.near, self.far)
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_in_front_projects_inside_depth_range() {
        let camera = Camera::new().at(0.0, 0.0, 5.0).looking_at(0.0, 0.0, 0.0);
        let clip = camera.view_projection(1.0) * Vec3::ZERO.extend(1.0);
        let depth = clip.z / clip.w;
        assert!(depth > 0.0 && depth < 1.0);
        assert!((clip.x / clip.w).abs() < 1e-5);
    }

    #[test]
    fn inverse_view_projection_round_trips() {
        let camera = Camera::new().at(1.0, 2.0, 6.0).looking_at(0.0, 0.0, 0.0);
        let view_proj = camera.view_projection(16.0 / 9.0);
        let world = Vec3::new(0.5, -0.25, 0.0);
        let ndc = view_proj.project_point3(world);
        let back = view_proj.inverse().project_point3(ndc);
        assert!((back - world).length() < 1e-3);
    }
}
