//! # Camera Implementation
//!
//! Free-fly camera math: the view transform, the perspective projection and
//! the controller that turns player actions into motion.
//!
//! ## Key Components
//! - `Camera`: position and orientation in world space
//! - `Projection`: perspective projection settings
//! - `CameraController`: accumulates one frame of player input
//! - `CameraUniform`: packed camera data for the terrain shader

use cgmath::*;
use std::f32::consts::FRAC_PI_2;
use web_time::Duration;

use crate::engine_state::PlayerAction;

/// Converts OpenGL clip space (z in [-1, 1]) to wgpu clip space (z in [0, 1]).
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Pitch limit just short of straight up or down
const SAFE_FRAC_PI_2: f32 = FRAC_PI_2 - 0.0001;

/// Mouse deltas below this many pixels are treated as jitter.
const MOUSE_DEAD_ZONE: f64 = 0.5;

/// A first-person camera in world space.
#[derive(Debug)]
pub struct Camera {
    /// The camera's position in world space
    pub position: Point3<f32>,
    /// Rotation around the Y axis
    pub yaw: Rad<f32>,
    /// Rotation around the camera's right axis
    pub pitch: Rad<f32>,
}

impl Camera {
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
    ) -> Self {
        Self {
            position: position.into(),
            yaw: yaw.into(),
            pitch: pitch.into(),
        }
    }

    /// Unit vector the camera is looking along.
    pub fn forward(&self) -> Vector3<f32> {
        let (yaw_sin, yaw_cos) = self.yaw.0.sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.0.sin_cos();
        Vector3::new(pitch_cos * yaw_cos, pitch_sin, pitch_cos * yaw_sin).normalize()
    }

    /// The world-to-view transform.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.forward(), Vector3::unit_y())
    }

    /// Applies and clears the controller's accumulated input.
    ///
    /// Horizontal movement follows the yaw only, so looking down does not
    /// slow walking. Space and shift move along the world Y axis.
    pub fn get_controller_updates_and_reset_controller(
        &mut self,
        controller: &mut CameraController,
        dt: Duration,
    ) {
        let dt = dt.as_secs_f32();
        let step = controller.speed * dt;

        let (yaw_sin, yaw_cos) = self.yaw.0.sin_cos();
        let forward = Vector3::new(yaw_cos, 0.0, yaw_sin);
        let right = Vector3::new(-yaw_sin, 0.0, yaw_cos);
        self.position += forward * (controller.amount_forward - controller.amount_backward) * step;
        self.position += right * (controller.amount_right - controller.amount_left) * step;
        self.position.y += (controller.amount_up - controller.amount_down) * step;

        self.yaw += Rad(controller.rotate_horizontal) * controller.sensitivity * dt;
        self.pitch += Rad(-controller.rotate_vertical) * controller.sensitivity * dt;
        self.pitch = Rad(self.pitch.0.clamp(-SAFE_FRAC_PI_2, SAFE_FRAC_PI_2));

        controller.reset();
    }
}

/// Perspective projection settings.
#[derive(Debug)]
pub struct Projection {
    /// Width over height
    aspect: f32,
    /// Vertical field of view
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: Self::aspect_ratio(width, height),
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    /// Follows a viewport resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = Self::aspect_ratio(width, height);
    }

    /// Minimized windows report zero sizes; both sides count as at least one pixel.
    fn aspect_ratio(width: u32, height: u32) -> f32 {
        width.max(1) as f32 / height.max(1) as f32
    }

    /// The view-to-clip transform in wgpu clip space.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// Accumulates one frame of movement and look input.
#[derive(Debug)]
pub struct CameraController {
    // Movement, 1.0 while the key is down
    amount_left: f32,
    amount_right: f32,
    amount_forward: f32,
    amount_backward: f32,
    amount_up: f32,
    amount_down: f32,

    // Mouse deltas in pixels
    rotate_horizontal: f32,
    rotate_vertical: f32,

    speed: f32,
    sensitivity: f32,
}

impl CameraController {
    /// # Arguments
    /// * `speed` - Movement speed in world units per second
    /// * `sensitivity` - Radians turned per second for each pixel of mouse motion
    pub fn new(speed: f32, sensitivity: f32) -> Self {
        Self {
            amount_left: 0.0,
            amount_right: 0.0,
            amount_forward: 0.0,
            amount_backward: 0.0,
            amount_up: 0.0,
            amount_down: 0.0,
            rotate_horizontal: 0.0,
            rotate_vertical: 0.0,
            speed,
            sensitivity,
        }
    }

    /// Records the actions held down this frame.
    pub fn intake_actions(&mut self, actions: &PlayerAction) {
        let held = |active: bool| if active { 1.0 } else { 0.0 };
        self.amount_forward = held(actions.move_forward);
        self.amount_backward = held(actions.move_backward);
        self.amount_left = held(actions.move_left);
        self.amount_right = held(actions.move_right);
        self.amount_up = held(actions.move_up);
        self.amount_down = held(actions.move_down);

        if let Some((delta_x, delta_y)) = actions.rotate_view {
            if delta_x.abs() > MOUSE_DEAD_ZONE {
                self.rotate_horizontal = delta_x as f32;
            }
            if delta_y.abs() > MOUSE_DEAD_ZONE {
                self.rotate_vertical = delta_y as f32;
            }
        }
    }

    /// Whether applying the controller would move or turn the camera.
    pub fn has_updates(&self) -> bool {
        self.amount_forward != self.amount_backward
            || self.amount_left != self.amount_right
            || self.amount_up != self.amount_down
            || self.rotate_horizontal != 0.0
            || self.rotate_vertical != 0.0
    }

    fn reset(&mut self) {
        self.rotate_horizontal = 0.0;
        self.rotate_vertical = 0.0;
        self.amount_up = 0.0;
        self.amount_down = 0.0;
        self.amount_left = 0.0;
        self.amount_right = 0.0;
        self.amount_forward = 0.0;
        self.amount_backward = 0.0;
    }
}

/// Camera data as laid out in the terrain shader's uniform.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    // cgmath types are not Pod, so matrices are stored as plain arrays
    view_proj: [[f32; 4]; 4],
    view_proj_inverse: [[f32; 4]; 4],
    position: [f32; 4],
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_proj: Matrix4::identity().into(),
            view_proj_inverse: Matrix4::identity().into(),
            position: [0.0; 4],
        }
    }

    /// Refreshes the matrices and position from `camera` and `projection`.
    pub fn update_view_proj_and_pos(&mut self, camera: &Camera, projection: &Projection) {
        let view_proj = projection.calc_matrix() * camera.calc_matrix();
        self.view_proj = view_proj.into();
        // A degenerate projection has no inverse; the shader only uses it for
        // lighting direction, so identity is an acceptable stand-in.
        self.view_proj_inverse = view_proj.invert().unwrap_or_else(Matrix4::identity).into();
        self.position = [camera.position.x, camera.position.y, camera.position.z, 1.0];
    }
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walking_forward() -> PlayerAction {
        PlayerAction {
            move_forward: true,
            ..PlayerAction::default()
        }
    }

    #[test]
    fn forward_moves_along_the_yaw() {
        let mut camera = Camera::new((0.0, 10.0, 0.0), Deg(0.0), Deg(-30.0));
        let mut controller = CameraController::new(4.0, 1.0);
        controller.intake_actions(&walking_forward());
        assert!(controller.has_updates());

        camera.get_controller_updates_and_reset_controller(
            &mut controller,
            Duration::from_millis(500),
        );

        assert!((camera.position.x - 2.0).abs() < 1e-5);
        assert!((camera.position.y - 10.0).abs() < 1e-5);
        assert!(camera.position.z.abs() < 1e-5);
        assert!(!controller.has_updates());
    }

    #[test]
    fn opposing_keys_cancel_out() {
        let mut controller = CameraController::new(4.0, 1.0);
        controller.intake_actions(&PlayerAction {
            move_up: true,
            move_down: true,
            ..PlayerAction::default()
        });
        assert!(!controller.has_updates());
    }

    #[test]
    fn pitch_is_clamped() {
        let mut camera = Camera::new((0.0, 0.0, 0.0), Deg(0.0), Deg(0.0));
        let mut controller = CameraController::new(1.0, 1.0);
        controller.intake_actions(&PlayerAction {
            rotate_view: Some((0.0, -10_000.0)),
            ..PlayerAction::default()
        });
        camera.get_controller_updates_and_reset_controller(&mut controller, Duration::from_secs(1));
        assert!(camera.pitch.0 <= SAFE_FRAC_PI_2);
        assert!(camera.forward().y > 0.99);
    }

    #[test]
    fn zero_sized_viewports_keep_a_finite_projection() {
        let mut projection = Projection::new(800, 600, Deg(45.0), 0.1, 100.0);
        projection.resize(0, 0);
        let matrix = projection.calc_matrix();
        let cells: [[f32; 4]; 4] = matrix.into();
        assert!(cells.iter().flatten().all(|cell| cell.is_finite()));
    }

    #[test]
    fn uniform_carries_the_camera_position() {
        let camera = Camera::new((1.0, 2.0, 3.0), Deg(90.0), Deg(0.0));
        let projection = Projection::new(16, 9, Deg(60.0), 0.1, 500.0);
        let mut uniform = CameraUniform::new();
        uniform.update_view_proj_and_pos(&camera, &projection);
        assert_eq!(uniform.position, [1.0, 2.0, 3.0, 1.0]);
        assert_ne!(uniform.view_proj, CameraUniform::new().view_proj);
    }
}
