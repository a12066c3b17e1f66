//! Vulkan camera matrices
//!
//! View space is right-handed with the camera looking down -Z. Clip space is
//! Vulkan's: Y points down and depth maps to [0, 1].

use nalgebra::{Isometry3, Matrix4, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};

/// Field of view as the four half-angles in radians
///
/// Left and down are negative for a centered view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fov {
    /// Angle to the left edge
    pub angle_left: f32,
    /// Angle to the right edge
    pub angle_right: f32,
    /// Angle to the top edge
    pub angle_up: f32,
    /// Angle to the bottom edge
    pub angle_down: f32,
}

impl Fov {
    /// Symmetric frustum from a vertical angle and aspect ratio
    pub fn symmetric(fov_y: f32, aspect: f32) -> Self {
        let half_y = fov_y * 0.5;
        let half_x = (half_y.tan() * aspect).atan();
        Self {
            angle_left: -half_x,
            angle_right: half_x,
            angle_up: half_y,
            angle_down: -half_y,
        }
    }
}

/// Position and orientation of a view in world space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Orientation quaternion as [x, y, z, w]
    pub orientation: [f32; 4],
    /// Position
    pub position: [f32; 3],
}

impl Pose {
    /// Identity pose at the origin
    pub const IDENTITY: Self = Self {
        orientation: [0.0, 0.0, 0.0, 1.0],
        position: [0.0, 0.0, 0.0],
    };
}

/// Projection for a possibly asymmetric frustum
pub fn projection(fov: &Fov, near: f32, far: f32) -> Matrix4<f32> {
    let tan_left = fov.angle_left.tan();
    let tan_right = fov.angle_right.tan();
    let tan_up = fov.angle_up.tan();
    let tan_down = fov.angle_down.tan();

    let width = tan_right - tan_left;
    // Y down in clip space
    let height = tan_down - tan_up;

    Matrix4::new(
        2.0 / width, 0.0, (tan_right + tan_left) / width, 0.0,
        0.0, 2.0 / height, (tan_up + tan_down) / height, 0.0,
        0.0, 0.0, -far / (far - near), -(far * near) / (far - near),
        0.0, 0.0, -1.0, 0.0,
    )
}

/// View matrix looking from `eye` towards `target`
pub fn look_at(eye: [f32; 3], target: [f32; 3], up: [f32; 3]) -> Matrix4<f32> {
    Matrix4::look_at_rh(&Point3::from(eye), &Point3::from(target), &Vector3::from(up))
}

/// View matrix of a tracked pose
pub fn pose_view(pose: &Pose) -> Matrix4<f32> {
    let [x, y, z, w] = pose.orientation;
    let rotation = UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z));
    let translation = Translation3::from(Vector3::from(pose.position));
    Isometry3::from_parts(translation, rotation).inverse().to_homogeneous()
}
