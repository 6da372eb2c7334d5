//! Projection surface descriptions and the wall-space frustum data
//! derived from them.

use glam::{EulerRot, Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// A physical screen described by three of its corners, in world
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub bottom_left: Vec3,
    pub bottom_right: Vec3,
    pub top_left: Vec3,
}

impl Wall {
    pub fn width(&self) -> f32 {
        (self.bottom_right - self.bottom_left).length()
    }

    pub fn height(&self) -> f32 {
        (self.top_left - self.bottom_left).length()
    }
}

impl Default for Wall {
    fn default() -> Self {
        // 4:3 wall one meter behind the origin.
        Wall {
            bottom_left: Vec3::new(-0.8, -0.5, -1.0),
            bottom_right: Vec3::new(0.8, -0.5, -1.0),
            top_left: Vec3::new(-0.8, 0.7, -1.0),
        }
    }
}

/// A projector described by its mount point, throw distance, field of
/// view and head/pitch/roll orientation, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub origin: Vec3,
    pub distance: f32,
    pub fov: [f32; 2],
    pub hpr: Vec3,
}

impl Default for Projection {
    fn default() -> Self {
        Projection {
            origin: Vec3::ZERO,
            distance: 1.0,
            fov: [77.3196, 53.1301],
            hpr: Vec3::ZERO,
        }
    }
}

/// Whether the projection surface is fixed in the world or attached to
/// the observer's head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrustumKind {
    Fixed,
    HeadMounted,
}

/// The resolved projection surface: physical extent plus the
/// world-to-wall transform feeding the off-axis frustum math.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrustumData {
    pub width: f32,
    pub height: f32,
    pub transform: Mat4,
    pub kind: FrustumKind,
}

impl FrustumData {
    pub fn from_wall(wall: &Wall, kind: FrustumKind) -> Self {
        let width = wall.width();
        let height = wall.height();
        let u = (wall.bottom_right - wall.bottom_left) / width;
        let v = (wall.top_left - wall.bottom_left) / height;
        let n = u.cross(v).normalize();

        // Rows u, v, n rotate world axes into wall space.
        let rotation = Mat4::from_cols(
            Vec4::new(u.x, v.x, n.x, 0.0),
            Vec4::new(u.y, v.y, n.y, 0.0),
            Vec4::new(u.z, v.z, n.z, 0.0),
            Vec4::W,
        );
        let center = (wall.bottom_left + wall.bottom_right + (wall.top_left - wall.bottom_left)) * 0.5;

        FrustumData {
            width,
            height,
            transform: rotation * Mat4::from_translation(-center),
            kind,
        }
    }

    pub fn from_projection(projection: &Projection, kind: FrustumKind) -> Self {
        let width = 2.0 * projection.distance * (projection.fov[0].to_radians() * 0.5).tan();
        let height = 2.0 * projection.distance * (projection.fov[1].to_radians() * 0.5).tan();

        let rotation = Mat4::from_euler(
            EulerRot::YXZ,
            projection.hpr.x.to_radians(),
            projection.hpr.y.to_radians(),
            projection.hpr.z.to_radians(),
        );
        let wall_to_world = Mat4::from_translation(projection.origin)
            * rotation
            * Mat4::from_translation(Vec3::new(0.0, 0.0, -projection.distance));

        FrustumData {
            width,
            height,
            transform: wall_to_world.inverse(),
            kind,
        }
    }
}

impl Default for FrustumData {
    fn default() -> Self {
        FrustumData::from_wall(&Wall::default(), FrustumKind::Fixed)
    }
}

/// Off-axis frustum planes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frustumf {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Frustumf {
    fn default() -> Self {
        Frustumf {
            left: -0.8,
            right: 0.8,
            bottom: -0.5,
            top: 0.5,
            near: 0.1,
            far: 10.0,
        }
    }
}
