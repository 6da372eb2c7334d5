//! Head-tracking state attached to a view.

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use super::eye::Eye;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observer {
    eye_positions: [Vec3; 3],
    inverse_head: Mat4,
    eye_base: f32,
}

impl Observer {
    pub fn new(eye_base: f32) -> Self {
        let mut observer = Self {
            eye_positions: [Vec3::ZERO; 3],
            inverse_head: Mat4::IDENTITY,
            eye_base,
        };
        observer.set_head(Mat4::IDENTITY);
        observer
    }

    pub fn eye_base(&self) -> f32 {
        self.eye_base
    }

    pub fn set_eye_base(&mut self, eye_base: f32) {
        self.eye_base = eye_base;
        let head = self.inverse_head.inverse();
        self.set_head(head);
    }

    /// Update the tracked head matrix, recomputing world-space eye
    /// positions and the cached inverse.
    pub fn set_head(&mut self, head: Mat4) {
        let half_base = self.eye_base * 0.5;
        self.eye_positions[Eye::Cyclop.index()] = head.transform_point3(Vec3::ZERO);
        self.eye_positions[Eye::Left.index()] =
            head.transform_point3(Vec3::new(-half_base, 0.0, 0.0));
        self.eye_positions[Eye::Right.index()] =
            head.transform_point3(Vec3::new(half_base, 0.0, 0.0));
        self.inverse_head = head.inverse();
    }

    /// Pin an eye to an explicit world position, bypassing the head
    /// matrix. Used by fixed multi-viewer installations.
    pub fn set_eye_position(&mut self, eye: Eye, position: Vec3) {
        self.eye_positions[eye.index()] = position;
    }

    pub fn eye_position(&self, eye: Eye) -> Vec3 {
        self.eye_positions[eye.index()]
    }

    pub fn inverse_head(&self) -> Mat4 {
        self.inverse_head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_translation_moves_all_eyes() {
        let mut observer = Observer::new(0.06);
        observer.set_head(Mat4::from_translation(Vec3::new(0.0, 1.7, 2.0)));
        assert_eq!(
            observer.eye_position(Eye::Cyclop),
            Vec3::new(0.0, 1.7, 2.0)
        );
        assert_eq!(
            observer.eye_position(Eye::Left),
            Vec3::new(-0.03, 1.7, 2.0)
        );
        assert_eq!(
            observer.eye_position(Eye::Right),
            Vec3::new(0.03, 1.7, 2.0)
        );
        let restored = observer
            .inverse_head()
            .transform_point3(Vec3::new(0.0, 1.7, 2.0));
        assert!(restored.length() < 1e-6);
    }
}
