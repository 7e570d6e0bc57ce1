use crate::scene::CameraState;
use glam::{Mat4, Quat, Vec3};
use std::sync::Arc;

pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 2000.0;
const MIN_ZOOM: f32 = 0.01;
const MAX_ZOOM: f32 = 1000.0;

/// Holder of the one authoritative camera snapshot.
///
/// Writers publish a whole new snapshot; readers keep the `Arc` they were handed for the
/// duration of a frame, so no view ever sees a half-written state.
#[derive(Debug, Clone)]
pub struct CameraHub {
    current: Arc<CameraState>,
    generation: u64,
}

impl CameraHub {
    pub fn new(initial: CameraState) -> Self {
        Self {
            current: Arc::new(initial),
            generation: 0,
        }
    }

    pub fn publish(&mut self, state: CameraState) {
        self.current = Arc::new(state);
        self.generation += 1;
    }

    pub fn snapshot(&self) -> Arc<CameraState> {
        Arc::clone(&self.current)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replaces the shared state and asks the control view to adopt it.
    /// A later request in the same frame overwrites an earlier one.
    pub fn request_reset(&mut self, mut state: CameraState) {
        state.reset_requested = true;
        self.publish(state);
    }

    pub fn reset_pending(&self) -> bool {
        self.current.reset_requested
    }

    /// Clears the reset flag, leaving the rest of the snapshot untouched.
    fn consume_reset(&mut self) -> Option<CameraState> {
        if !self.current.reset_requested {
            return None;
        }
        let mut state = *self.current;
        state.reset_requested = false;
        self.publish(state);
        Some(state)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// Driven by interaction; never reads the shared state.
    Interactive,
    /// Adopting a reset snapshot; lasts for a single frame step.
    Applying,
}

/// Orthographic arcball-style controller owned by the interactive view.
#[derive(Debug, Clone, Copy)]
pub struct CameraController {
    pub position: Vec3,
    pub orientation: Quat,
    pub target: Vec3,
    pub zoom: f32,
    mode: ControlMode,
}

impl CameraController {
    pub fn from_state(state: &CameraState) -> Self {
        let position = Vec3::from_array(state.position);
        let orientation = quat_from_state(state);
        let forward = orientation * Vec3::NEG_Z;
        let distance = position.length().max(1.0);
        Self {
            position,
            orientation,
            target: position + forward * distance,
            zoom: sanitize_zoom(state.zoom),
            mode: ControlMode::Interactive,
        }
    }

    #[cfg(test)]
    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    pub fn basis(&self) -> (Vec3, Vec3, Vec3) {
        let forward = self.orientation * Vec3::NEG_Z;
        let right = self.orientation * Vec3::X;
        let up = self.orientation * Vec3::Y;
        (forward, right, up)
    }

    /// Rotates the camera around `pivot`. Deltas are radians about the camera's own up and
    /// right axes, so repeated drags never lock at the poles.
    pub fn orbit_around(&mut self, pivot: Vec3, yaw_delta: f32, pitch_delta: f32) {
        let (_, right, up) = self.basis();
        let rotation = Quat::from_axis_angle(up, -yaw_delta) * Quat::from_axis_angle(right, -pitch_delta);
        let offset = self.position - pivot;
        self.position = pivot + rotation * offset;
        self.orientation = (rotation * self.orientation).normalize();
    }

    pub fn orbit(&mut self, yaw_delta: f32, pitch_delta: f32) {
        self.orbit_around(self.target, yaw_delta, pitch_delta);
    }

    /// Moves camera and target together, in world units at zoom 1.
    pub fn pan(&mut self, right_amount: f32, up_amount: f32) {
        let (_, right, up) = self.basis();
        let delta = (right * right_amount + up * up_amount) / self.zoom;
        self.position += delta;
        self.target += delta;
    }

    pub fn zoom_by(&mut self, factor: f32) {
        if factor.is_finite() && factor > 0.0 {
            self.zoom = sanitize_zoom(self.zoom * factor);
        }
    }

    pub fn state(&self) -> CameraState {
        let (forward, _, _) = self.basis();
        CameraState {
            position: self.position.to_array(),
            orientation: self.orientation.to_array(),
            zoom: self.zoom,
            world_direction: forward.to_array(),
            reset_requested: false,
        }
    }

    /// Publishes the current transform after an interaction-induced change.
    pub fn publish(&self, hub: &mut CameraHub) {
        if self.mode == ControlMode::Interactive {
            hub.publish(self.state());
        }
    }

    /// Per-frame step. Adopts a pending reset exactly once and clears the flag; returns
    /// whether a reset was applied.
    pub fn sync(&mut self, hub: &mut CameraHub) -> bool {
        let Some(state) = hub.consume_reset() else {
            return false;
        };
        self.mode = ControlMode::Applying;
        let adopted = Self::from_state(&state);
        self.position = adopted.position;
        self.orientation = adopted.orientation;
        self.target = adopted.target;
        self.zoom = adopted.zoom;
        log::debug!("Camera reset applied at generation {}", hub.generation());
        self.mode = ControlMode::Interactive;
        true
    }
}

fn sanitize_zoom(zoom: f32) -> f32 {
    if zoom.is_finite() && zoom > 0.0 {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}

fn quat_from_state(state: &CameraState) -> Quat {
    let quat = Quat::from_array(state.orientation);
    if quat.length_squared() > 1e-8 && quat.is_finite() {
        quat.normalize()
    } else {
        Quat::IDENTITY
    }
}

/// Camera of one render view, rebuilt wholesale from a snapshot each frame.
#[derive(Debug, Clone, Copy)]
pub struct ViewCamera {
    pub position: Vec3,
    pub direction: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
}

impl ViewCamera {
    /// `extent` is the view's pixel size, `scale` the render scale it was enlarged by; framing
    /// is identical at any scale.
    pub fn from_state(state: &CameraState, extent: (u32, u32), scale: f32) -> Self {
        let position = Vec3::from_array(state.position);
        let orientation = quat_from_state(state);
        let zoom = sanitize_zoom(state.zoom) * scale.max(f32::EPSILON);
        let half_width = extent.0 as f32 / (2.0 * zoom);
        let half_height = extent.1 as f32 / (2.0 * zoom);

        let view = Mat4::from_rotation_translation(orientation, position).inverse();
        let projection = Mat4::orthographic_rh(
            -half_width,
            half_width,
            -half_height,
            half_height,
            NEAR_PLANE,
            FAR_PLANE,
        );
        Self {
            position,
            direction: orientation * Vec3::NEG_Z,
            view,
            projection,
        }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

#[cfg(test)]
mod tests {
    use super::{CameraController, CameraHub, ControlMode, ViewCamera};
    use crate::scene::CameraState;
    use glam::Vec3;

    fn close(a: [f32; 3], b: [f32; 3]) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-3)
    }

    #[test]
    fn default_state_looks_down_negative_z_at_origin() {
        let camera = CameraController::from_state(&CameraState::default());
        let (forward, right, up) = camera.basis();
        assert!(close(forward.to_array(), [0.0, 0.0, -1.0]));
        assert!(close(right.to_array(), [1.0, 0.0, 0.0]));
        assert!(close(up.to_array(), [0.0, 1.0, 0.0]));
        assert!(close(camera.target.to_array(), [0.0, 0.0, 0.0]));
    }

    #[test]
    fn orbit_keeps_distance_and_faces_pivot() {
        let mut camera = CameraController::from_state(&CameraState::default());
        camera.orbit(0.7, -0.4);
        camera.orbit(-2.0, 1.3);
        assert!((camera.position.length() - 150.0).abs() < 1e-2);
        let (forward, _, _) = camera.basis();
        let to_pivot = (camera.target - camera.position).normalize();
        assert!(forward.dot(to_pivot) > 0.9999);
    }

    #[test]
    fn interaction_publishes_and_leaves_reset_clear() {
        let mut hub = CameraHub::new(CameraState::default());
        let mut camera = CameraController::from_state(&hub.snapshot());
        camera.zoom_by(2.0);
        camera.pan(10.0, 0.0);
        camera.publish(&mut hub);

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.zoom, 10.0);
        assert!((snapshot.position[0] - 1.0).abs() < 1e-5);
        assert!(!snapshot.reset_requested);
        assert!(!camera.sync(&mut hub));
    }

    #[test]
    fn reset_is_applied_once_and_cleared() {
        let mut hub = CameraHub::new(CameraState::default());
        let mut camera = CameraController::from_state(&hub.snapshot());
        camera.orbit(1.0, 0.5);
        camera.publish(&mut hub);

        hub.request_reset(CameraState::default());
        assert!(camera.sync(&mut hub));
        assert_eq!(camera.mode(), ControlMode::Interactive);
        assert!(!hub.reset_pending());
        assert!(close(camera.position.to_array(), [0.0, 0.0, 150.0]));

        // Live interaction after the reset is not overwritten on the next frame.
        camera.orbit(0.3, 0.0);
        camera.publish(&mut hub);
        let moved = camera.position;
        assert!(!camera.sync(&mut hub));
        assert_eq!(camera.position, moved);
    }

    #[test]
    fn back_to_back_resets_apply_the_latest_once() {
        let mut hub = CameraHub::new(CameraState::default());
        let mut camera = CameraController::from_state(&hub.snapshot());

        hub.request_reset(CameraState {
            position: [0.0, 0.0, 50.0],
            ..CameraState::default()
        });
        hub.request_reset(CameraState {
            position: [0.0, 0.0, 80.0],
            zoom: 2.0,
            ..CameraState::default()
        });

        assert!(camera.sync(&mut hub));
        assert!(close(camera.position.to_array(), [0.0, 0.0, 80.0]));
        assert_eq!(camera.zoom, 2.0);
        assert!(!camera.sync(&mut hub));
        assert!(!hub.snapshot().reset_requested);
    }

    #[test]
    fn view_camera_framing_is_independent_of_scale() {
        let state = CameraState::default();
        let base = ViewCamera::from_state(&state, (512, 512), 1.0);
        let doubled = ViewCamera::from_state(&state, (1024, 1024), 2.0);
        let point = Vec3::new(20.0, -10.0, 0.0);
        let a = base.view_projection().project_point3(point);
        let b = doubled.view_projection().project_point3(point);
        assert!((a - b).length() < 1e-5);
        // 512 px at zoom 5 spans 102.4 world units.
        assert!((a.x - 20.0 / 51.2).abs() < 1e-5);
    }
}
