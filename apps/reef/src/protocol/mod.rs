//! Task packets addressed to cluster entities.

pub mod wire;

use glam::Mat4;
use reef_bus::PeerId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{ColorMask, Eye, Frustumf, Pixel, PixelViewport, Range, SubPixel, Viewport, Zoom};
use crate::object::{ObjectVersion, RouteId};

pub use wire::{decode_packet, encode_packet, WireError};

/// The immutable state bundle shipped with every rendering task.
/// Built once per compound visit, consumed by packet emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderContext {
    pub frame_id: u128,
    pub pvp: PixelViewport,
    pub overdraw: [i32; 4],
    pub vp: Viewport,
    pub range: Range,
    pub pixel: Pixel,
    pub subpixel: SubPixel,
    pub zoom: Zoom,
    pub period: u32,
    pub phase: u32,
    pub offset: [i32; 2],
    pub eye: Eye,
    pub buffer: u32,
    pub buffer_mask: ColorMask,
    pub view: ObjectVersion,
    pub task_id: u32,
    pub frustum: Frustumf,
    pub head_transform: Mat4,
    pub ortho: Frustumf,
    pub ortho_transform: Mat4,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            frame_id: 0,
            pvp: PixelViewport::default(),
            overdraw: [0; 4],
            vp: Viewport::FULL,
            range: Range::ALL,
            pixel: Pixel::ALL,
            subpixel: SubPixel::ALL,
            zoom: Zoom::NONE,
            period: 1,
            phase: 0,
            offset: [0; 2],
            eye: Eye::Cyclop,
            buffer: wire::BUFFER_BACK,
            buffer_mask: ColorMask::ALL,
            view: ObjectVersion::NONE,
            task_id: 0,
            frustum: Frustumf::default(),
            head_transform: Mat4::IDENTITY,
            ortho: Frustumf::default(),
            ortho_transform: Mat4::IDENTITY,
        }
    }
}

/// One rendering operation for a cluster entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskPacket {
    ChannelFrameClear {
        context: RenderContext,
    },
    ChannelFrameDraw {
        context: RenderContext,
        finish: bool,
    },
    ChannelFrameDrawFinish,
    ChannelFrameReadback {
        context: RenderContext,
        frames: Vec<ObjectVersion>,
    },
    ChannelFrameTransmit {
        context: RenderContext,
        frame_data: ObjectVersion,
        client_node: Uuid,
        peer: PeerId,
    },
    ChannelFrameAssemble {
        context: RenderContext,
        frames: Vec<ObjectVersion>,
    },
    ChannelFrameViewStart {
        context: RenderContext,
    },
    ChannelFrameViewFinish {
        context: RenderContext,
    },
    WindowFrameDrawFinish,
    PipeFrameDrawFinish,
    NodeFrameDrawFinish,
}

impl TaskPacket {
    pub fn label(&self) -> &'static str {
        match self {
            TaskPacket::ChannelFrameClear { .. } => "clear",
            TaskPacket::ChannelFrameDraw { .. } => "draw",
            TaskPacket::ChannelFrameDrawFinish => "channel draw finish",
            TaskPacket::ChannelFrameReadback { .. } => "readback",
            TaskPacket::ChannelFrameTransmit { .. } => "transmit",
            TaskPacket::ChannelFrameAssemble { .. } => "assemble",
            TaskPacket::ChannelFrameViewStart { .. } => "view start",
            TaskPacket::ChannelFrameViewFinish { .. } => "view finish",
            TaskPacket::WindowFrameDrawFinish => "window draw finish",
            TaskPacket::PipeFrameDrawFinish => "pipe draw finish",
            TaskPacket::NodeFrameDrawFinish => "node draw finish",
        }
    }
}

/// A task packet bound to its destination object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub object: RouteId,
    pub frame_number: u32,
    pub frame_id: u128,
    pub body: TaskPacket,
}

/// A packet routed to the peer hosting its destination object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressedPacket {
    pub peer: PeerId,
    pub packet: Packet,
}
