//! View: a named projection surface replicated to render clients.

use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::object::{Distributed, InputStream, OutputStream, StreamError};

use super::frustum::{Projection, Wall};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum ViewKind {
    None = 0,
    Wall = 1,
    Projection = 2,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct ViewDirty: u32 {
        const WALL = 1 << 0;
        const PROJECTION = 1 << 1;
        const EYE_BASE = 1 << 2;
        const NAME = 1 << 3;
    }
}

/// Projection surface state. Mutators flag dirty bits; only the dirty
/// subset ships in each delta.
#[derive(Debug, Clone)]
pub struct View {
    kind: ViewKind,
    wall: Wall,
    projection: Projection,
    eye_base: f32,
    name: String,
    dirty: ViewDirty,
}

impl Default for View {
    fn default() -> Self {
        Self {
            kind: ViewKind::None,
            wall: Wall::default(),
            projection: Projection::default(),
            eye_base: 0.0,
            name: String::new(),
            dirty: ViewDirty::empty(),
        }
    }
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn wall(&self) -> &Wall {
        &self.wall
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn eye_base(&self) -> f32 {
        self.eye_base
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_wall(&mut self, wall: Wall) {
        self.wall = wall;
        self.kind = ViewKind::Wall;
        self.dirty |= ViewDirty::WALL;
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.kind = ViewKind::Projection;
        self.dirty |= ViewDirty::PROJECTION;
    }

    pub fn set_eye_base(&mut self, eye_base: f32) {
        self.eye_base = eye_base;
        self.dirty |= ViewDirty::EYE_BASE;
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.dirty |= ViewDirty::NAME;
    }

    fn serialize(&self, os: &mut OutputStream, dirty: ViewDirty) {
        os.write_u32(self.kind as u32);
        if self.kind == ViewKind::None {
            return;
        }
        os.write_u32(dirty.bits());
        if dirty.contains(ViewDirty::WALL) {
            write_vec3(os, self.wall.bottom_left);
            write_vec3(os, self.wall.bottom_right);
            write_vec3(os, self.wall.top_left);
        }
        if dirty.contains(ViewDirty::PROJECTION) {
            write_vec3(os, self.projection.origin);
            os.write_f32(self.projection.distance);
            os.write_f32(self.projection.fov[0]);
            os.write_f32(self.projection.fov[1]);
            write_vec3(os, self.projection.hpr);
        }
        if dirty.contains(ViewDirty::EYE_BASE) {
            os.write_f32(self.eye_base);
        }
        if dirty.contains(ViewDirty::NAME) {
            os.write_string(&self.name);
        }
    }
}

fn write_vec3(os: &mut OutputStream, v: Vec3) {
    os.write_f32(v.x);
    os.write_f32(v.y);
    os.write_f32(v.z);
}

fn read_vec3(is: &mut InputStream) -> Result<Vec3, StreamError> {
    Ok(Vec3::new(is.read_f32()?, is.read_f32()?, is.read_f32()?))
}

impl Distributed for View {
    fn pack(&mut self, os: &mut OutputStream) {
        let dirty = self.dirty;
        self.serialize(os, dirty);
        self.dirty = ViewDirty::empty();
    }

    fn pack_full(&self, os: &mut OutputStream) {
        self.serialize(os, ViewDirty::all());
    }

    fn unpack(&mut self, is: &mut InputStream) -> Result<(), StreamError> {
        self.kind = match is.read_u32()? {
            0 => ViewKind::None,
            1 => ViewKind::Wall,
            2 => ViewKind::Projection,
            _ => return Err(StreamError::InvalidValue("view kind")),
        };
        if self.kind == ViewKind::None {
            self.dirty = ViewDirty::empty();
            return Ok(());
        }
        let dirty = ViewDirty::from_bits(is.read_u32()?)
            .ok_or(StreamError::InvalidValue("view dirty mask"))?;
        if dirty.contains(ViewDirty::WALL) {
            self.wall = Wall {
                bottom_left: read_vec3(is)?,
                bottom_right: read_vec3(is)?,
                top_left: read_vec3(is)?,
            };
        }
        if dirty.contains(ViewDirty::PROJECTION) {
            self.projection = Projection {
                origin: read_vec3(is)?,
                distance: is.read_f32()?,
                fov: [is.read_f32()?, is.read_f32()?],
                hpr: read_vec3(is)?,
            };
        }
        if dirty.contains(ViewDirty::EYE_BASE) {
            self.eye_base = is.read_f32()?;
        }
        if dirty.contains(ViewDirty::NAME) {
            self.name = is.read_string()?;
        }
        Ok(())
    }

    fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn full_state_round_trips() {
        let mut view = View::new();
        view.set_wall(Wall {
            bottom_left: Vec3::new(-1.0, -1.0, -1.0),
            bottom_right: Vec3::new(1.0, -1.0, -1.0),
            top_left: Vec3::new(-1.0, 1.0, -1.0),
        });
        view.set_eye_base(0.06);
        view.set_name("front");

        let mut os = OutputStream::new();
        view.pack_full(&mut os);

        let mut copy = View::new();
        copy.unpack(&mut InputStream::new(os.into_bytes()))
            .expect("unpack");
        assert_eq!(copy.kind(), ViewKind::Wall);
        assert_eq!(copy.wall(), view.wall());
        assert_eq!(copy.eye_base(), 0.06);
        assert_eq!(copy.name(), "front");
    }

    #[test]
    fn delta_carries_exactly_the_dirty_fields() {
        let mut view = View::new();
        view.set_wall(Wall::default());
        let mut os = OutputStream::new();
        view.pack(&mut os);
        // type + dirty mask + 9 wall floats
        assert_eq!(os.len(), 4 + 4 + 9 * 4);
        assert!(!view.is_dirty());

        view.set_eye_base(0.07);
        let mut os = OutputStream::new();
        view.pack(&mut os);
        // type + dirty mask + eye base
        assert_eq!(os.len(), 4 + 4 + 4);
    }

    #[test]
    fn untyped_view_serializes_as_bare_tag() {
        let mut view = View::new();
        view.set_name("unused"); // dirty, but the type is still NONE
        let mut os = OutputStream::new();
        view.pack(&mut os);
        assert_eq!(os.len(), 4);

        let mut copy = View::new();
        copy.unpack(&mut InputStream::new(os.into_bytes()))
            .expect("unpack");
        assert_eq!(copy.kind(), ViewKind::None);
    }
}
