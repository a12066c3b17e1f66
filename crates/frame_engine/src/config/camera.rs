//! Camera configuration for windowed viewports

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Look-at camera with a symmetric perspective projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Eye position
    pub eye: [f32; 3],
    /// Point the camera looks at
    pub target: [f32; 3],
    /// Up direction
    pub up: [f32; 3],
    /// Vertical field of view in degrees
    pub fov_y_degrees: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            eye: [2.0, 2.0, 2.0],
            target: [0.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0],
            fov_y_degrees: 90.0,
            near: 0.01,
            far: 1000.0,
        }
    }
}

impl CameraConfig {
    /// Set eye and target
    pub fn looking_at(mut self, eye: [f32; 3], target: [f32; 3]) -> Self {
        self.eye = eye;
        self.target = target;
        self
    }

    /// Set the clip range
    pub fn with_clip(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// Check ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.near > 0.0 && self.far > self.near) {
            return Err(ConfigError::Invalid(format!(
                "camera clip range must satisfy 0 < near < far, got {}..{}",
                self.near, self.far
            )));
        }
        if !(self.fov_y_degrees > 0.0 && self.fov_y_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "camera fov must be in (0, 180) degrees, got {}",
                self.fov_y_degrees
            )));
        }
        if self.eye == self.target {
            return Err(ConfigError::Invalid("camera eye and target coincide".to_string()));
        }
        Ok(())
    }
}
