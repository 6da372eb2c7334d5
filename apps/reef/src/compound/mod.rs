//! The server-side rendering plan: a forest of compounds, each
//! describing one rendering subtask on a channel.
//!
//! Attributes are resolved top-down once per frame; afterwards every
//! inherited query is O(1) on the cached state.

pub mod traverse;

use crate::model::{
    ColorMask, Eye, Eyes, FrustumData, Pixel, PixelViewport, Range, StereoMode, SubPixel, Tasks,
    Viewport, Zoom,
};
use crate::server::cluster::{ChannelId, Cluster};
use crate::server::frame::FrameId;
use crate::server::ConfigError;

pub use traverse::{accept, accept_forest, CompoundVisitor, VisitorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompoundId(pub u32);

impl std::fmt::Display for CompoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "compound-{}", self.0)
    }
}

/// Locally configured attributes. `None` means "inherit".
#[derive(Debug, Clone, Default)]
pub struct CompoundAttrs {
    pub channel: Option<ChannelId>,
    pub viewport: Viewport,
    pub range: Range,
    pub pixel: Pixel,
    pub subpixel: SubPixel,
    pub zoom: Zoom,
    pub period: Option<u32>,
    pub phase: Option<u32>,
    pub eyes: Option<Eyes>,
    pub tasks: Tasks,
    pub stereo_mode: Option<StereoMode>,
    pub anaglyph_left: Option<ColorMask>,
    pub anaglyph_right: Option<ColorMask>,
    pub max_fps: Option<f32>,
    pub frustum: Option<FrustumData>,
}

/// Root-down accumulated state, valid after `resolve_inherit`.
#[derive(Debug, Clone, Copy)]
pub struct Inherit {
    pub channel: Option<ChannelId>,
    pub vp: Viewport,
    pub pvp: PixelViewport,
    pub overdraw: [i32; 4],
    pub range: Range,
    pub pixel: Pixel,
    pub subpixel: SubPixel,
    pub zoom: Zoom,
    pub period: u32,
    pub phase: u32,
    pub eyes: Eyes,
    pub tasks: Tasks,
    pub stereo_mode: Option<StereoMode>,
    pub anaglyph_left: ColorMask,
    pub anaglyph_right: ColorMask,
    pub max_fps: f32,
    pub frustum: FrustumData,
    pub active: bool,
}

impl Default for Inherit {
    fn default() -> Self {
        Self {
            channel: None,
            vp: Viewport::FULL,
            pvp: PixelViewport::default(),
            overdraw: [0; 4],
            range: Range::ALL,
            pixel: Pixel::ALL,
            subpixel: SubPixel::ALL,
            zoom: Zoom::NONE,
            period: 1,
            phase: 0,
            eyes: Eyes::all(),
            tasks: Tasks::empty(),
            stereo_mode: None,
            anaglyph_left: ColorMask::ALL,
            anaglyph_right: ColorMask::ALL,
            max_fps: f32::MAX,
            frustum: FrustumData::default(),
            active: false,
        }
    }
}

#[derive(Debug)]
pub struct Compound {
    name: Option<String>,
    parent: Option<CompoundId>,
    children: Vec<CompoundId>,
    attrs: CompoundAttrs,
    input_frames: Vec<FrameId>,
    output_frames: Vec<FrameId>,
    task_id: u32,
    inherit: Inherit,
}

#[derive(Debug, Default)]
pub struct CompoundTree {
    compounds: Vec<Compound>,
    roots: Vec<CompoundId>,
}

impl CompoundTree {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, parent: Option<CompoundId>, attrs: CompoundAttrs) -> CompoundId {
        let id = CompoundId(self.compounds.len() as u32);
        self.compounds.push(Compound {
            name: None,
            parent,
            children: Vec::new(),
            attrs,
            input_frames: Vec::new(),
            output_frames: Vec::new(),
            task_id: id.0 + 1,
            inherit: Inherit::default(),
        });
        id
    }

    pub fn add_root(&mut self, attrs: CompoundAttrs) -> CompoundId {
        let id = self.push(None, attrs);
        self.roots.push(id);
        id
    }

    pub fn add_child(&mut self, parent: CompoundId, attrs: CompoundAttrs) -> CompoundId {
        let id = self.push(Some(parent), attrs);
        self.compounds[parent.0 as usize].children.push(id);
        id
    }

    pub fn set_name(&mut self, id: CompoundId, name: impl Into<String>) {
        self.compounds[id.0 as usize].name = Some(name.into());
    }

    pub fn add_input_frame(&mut self, id: CompoundId, frame: FrameId) {
        self.compounds[id.0 as usize].input_frames.push(frame);
    }

    pub fn add_output_frame(&mut self, id: CompoundId, frame: FrameId) {
        self.compounds[id.0 as usize].output_frames.push(frame);
    }

    pub fn len(&self) -> usize {
        self.compounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compounds.is_empty()
    }

    pub fn roots(&self) -> &[CompoundId] {
        &self.roots
    }

    pub fn ids(&self) -> impl Iterator<Item = CompoundId> + '_ {
        (0..self.compounds.len()).map(|index| CompoundId(index as u32))
    }

    pub fn name(&self, id: CompoundId) -> Option<&str> {
        self.compounds[id.0 as usize].name.as_deref()
    }

    pub fn parent(&self, id: CompoundId) -> Option<CompoundId> {
        self.compounds[id.0 as usize].parent
    }

    pub fn children(&self, id: CompoundId) -> &[CompoundId] {
        &self.compounds[id.0 as usize].children
    }

    pub fn is_leaf(&self, id: CompoundId) -> bool {
        self.compounds[id.0 as usize].children.is_empty()
    }

    pub fn attrs(&self, id: CompoundId) -> &CompoundAttrs {
        &self.compounds[id.0 as usize].attrs
    }

    pub fn set_zoom(&mut self, id: CompoundId, zoom: Zoom) {
        self.compounds[id.0 as usize].attrs.zoom = zoom;
    }

    pub fn task_id(&self, id: CompoundId) -> u32 {
        self.compounds[id.0 as usize].task_id
    }

    pub fn input_frames(&self, id: CompoundId) -> &[FrameId] {
        &self.compounds[id.0 as usize].input_frames
    }

    pub fn output_frames(&self, id: CompoundId) -> &[FrameId] {
        &self.compounds[id.0 as usize].output_frames
    }

    pub fn local_channel(&self, id: CompoundId) -> Option<ChannelId> {
        self.compounds[id.0 as usize].attrs.channel
    }

    pub fn inherit(&self, id: CompoundId) -> &Inherit {
        &self.compounds[id.0 as usize].inherit
    }

    /// Inherited task mask; a compound without a destination channel
    /// carries no executable tasks.
    pub fn inherit_tasks(&self, id: CompoundId) -> Tasks {
        let inherit = &self.compounds[id.0 as usize].inherit;
        if inherit.channel.is_none() {
            Tasks::empty()
        } else {
            inherit.tasks
        }
    }

    pub fn test_inherit_task(&self, id: CompoundId, task: Tasks) -> bool {
        self.inherit_tasks(id).contains(task)
    }

    pub fn is_inherit_active(&self, id: CompoundId, eye: Eye) -> bool {
        let inherit = &self.compounds[id.0 as usize].inherit;
        inherit.active && inherit.eyes.contains_eye(eye)
    }

    /// True when `eye` is the last pass this compound participates in,
    /// given the configuration's active eye set.
    pub fn is_last_inherit_eye(&self, id: CompoundId, eye: Eye, active: Eyes) -> bool {
        let inherit = &self.compounds[id.0 as usize].inherit;
        (inherit.eyes & active).is_last(eye)
    }

    /// Structural validation, run at config load.
    pub fn validate(&self, cluster: &Cluster) -> Result<(), ConfigError> {
        for id in self.ids() {
            let compound = &self.compounds[id.0 as usize];
            if let Some(channel) = compound.attrs.channel {
                if !cluster.has_channel(channel) {
                    return Err(ConfigError::UnknownChannel(id, channel));
                }
            }
            if !compound.attrs.pixel.is_valid() {
                return Err(ConfigError::InvalidPixel(id));
            }
            if compound.attrs.period == Some(0) {
                return Err(ConfigError::InvalidPeriod(id));
            }

            // Walk the parent chain; a chain longer than the arena
            // means a cycle.
            let mut steps = 0usize;
            let mut cursor = compound.parent;
            while let Some(parent) = cursor {
                steps += 1;
                if steps > self.compounds.len() {
                    return Err(ConfigError::CompoundCycle(id));
                }
                cursor = self.compounds[parent.0 as usize].parent;
            }
        }
        Ok(())
    }

    /// One top-down pass computing the inherited state of every
    /// compound for `frame_number`. Deterministic and idempotent.
    pub fn resolve_inherit(&mut self, cluster: &Cluster, frame_number: u32) {
        let mut stack: Vec<CompoundId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let parent_inherit = self.compounds[id.0 as usize]
                .parent
                .map(|parent| self.compounds[parent.0 as usize].inherit);
            self.resolve_one(cluster, frame_number, id, parent_inherit);
            let compound = &self.compounds[id.0 as usize];
            stack.extend(compound.children.iter().rev().copied());
        }
    }

    fn resolve_one(
        &mut self,
        cluster: &Cluster,
        frame_number: u32,
        id: CompoundId,
        parent: Option<Inherit>,
    ) {
        let is_root = parent.is_none();
        let mut inherit = parent.unwrap_or_default();
        let attrs = self.compounds[id.0 as usize].attrs.clone();

        if attrs.channel.is_some() {
            inherit.channel = attrs.channel;
        }

        // A new destination channel re-bases the viewport space;
        // otherwise the local viewport is a sub-rectangle of the
        // inherited one.
        if attrs.channel.is_some() || is_root {
            inherit.vp = attrs.viewport;
        } else {
            inherit.vp = attrs.viewport.applied_to(&inherit.vp);
        }
        if let Some(channel) = inherit.channel {
            let native = cluster.channel(channel).pvp;
            inherit.pvp = native.applied(&inherit.vp);
            // Re-derive the fraction from the snapped pixels so the
            // viewport is pixel-correct relative to the channel.
            inherit.vp = native.coverage_of(&inherit.pvp);
            inherit.overdraw = cluster.channel(channel).overdraw;
        } else {
            inherit.pvp = PixelViewport::default();
        }

        inherit.range = attrs.range.applied_to(&inherit.range);
        inherit.pixel = attrs.pixel.applied_to(&inherit.pixel);
        inherit.subpixel = attrs.subpixel.applied_to(&inherit.subpixel);
        inherit.zoom = attrs.zoom.applied_to(&inherit.zoom);

        if let Some(period) = attrs.period {
            inherit.phase += attrs.phase.unwrap_or(0) * inherit.period;
            inherit.period *= period;
        }

        if let Some(eyes) = attrs.eyes {
            inherit.eyes &= eyes;
        }
        inherit.tasks |= attrs.tasks;

        if attrs.stereo_mode.is_some() {
            inherit.stereo_mode = attrs.stereo_mode;
        }
        if let Some(mask) = attrs.anaglyph_left {
            inherit.anaglyph_left = mask;
        }
        if let Some(mask) = attrs.anaglyph_right {
            inherit.anaglyph_right = mask;
        }
        if let Some(max_fps) = attrs.max_fps {
            inherit.max_fps = max_fps;
        }
        if let Some(frustum) = attrs.frustum {
            inherit.frustum = frustum;
        }

        inherit.active = inherit.channel.is_some()
            && frame_number % inherit.period == inherit.phase % inherit.period;

        self.compounds[id.0 as usize].inherit = inherit;
    }
}
