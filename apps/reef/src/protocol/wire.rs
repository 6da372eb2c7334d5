//! Binary packet codec.
//!
//! Layout, all little-endian:
//! `<u32 size><u32 command><u32 objectIDHigh><u32 objectIDLow>
//!  <u32 frameNumber><u128 frameID><payload>`
//! where `size` covers the whole packet including the header.

use bytes::Bytes;
use glam::Mat4;
use reef_bus::PeerId;
use thiserror::Error;

use crate::model::{ColorMask, Eye, Frustumf, Pixel, PixelViewport, Range, SubPixel, Viewport, Zoom};
use crate::object::{InputStream, ObjectVersion, OutputStream, RouteId, StreamError};

use super::{Packet, RenderContext, TaskPacket};

const CMD_CHANNEL_CLEAR: u32 = 0;
const CMD_CHANNEL_DRAW: u32 = 1;
const CMD_CHANNEL_DRAW_FINISH: u32 = 2;
const CMD_CHANNEL_READBACK: u32 = 3;
const CMD_CHANNEL_TRANSMIT: u32 = 4;
const CMD_CHANNEL_ASSEMBLE: u32 = 5;
const CMD_CHANNEL_VIEW_START: u32 = 6;
const CMD_CHANNEL_VIEW_FINISH: u32 = 7;
const CMD_WINDOW_DRAW_FINISH: u32 = 8;
const CMD_PIPE_DRAW_FINISH: u32 = 9;
const CMD_NODE_DRAW_FINISH: u32 = 10;

/// Header bytes before the payload.
pub const HEADER_LEN: usize = 4 + 4 + 4 + 4 + 4 + 16;

// GL-equivalent draw buffer names.
pub const BUFFER_FRONT_LEFT: u32 = 0x0400;
pub const BUFFER_FRONT_RIGHT: u32 = 0x0401;
pub const BUFFER_BACK_LEFT: u32 = 0x0402;
pub const BUFFER_BACK_RIGHT: u32 = 0x0403;
pub const BUFFER_FRONT: u32 = 0x0404;
pub const BUFFER_BACK: u32 = 0x0405;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("unknown command: {0}")]
    UnknownCommand(u32),
    #[error("unknown eye value: {0}")]
    UnknownEye(u32),
    #[error("invalid color mask bits: {0:#x}")]
    InvalidColorMask(u32),
    #[error("packet size {header} does not match buffer length {actual}")]
    SizeMismatch { header: u32, actual: usize },
    #[error(transparent)]
    Stream(#[from] StreamError),
}

fn command_of(body: &TaskPacket) -> u32 {
    match body {
        TaskPacket::ChannelFrameClear { .. } => CMD_CHANNEL_CLEAR,
        TaskPacket::ChannelFrameDraw { .. } => CMD_CHANNEL_DRAW,
        TaskPacket::ChannelFrameDrawFinish => CMD_CHANNEL_DRAW_FINISH,
        TaskPacket::ChannelFrameReadback { .. } => CMD_CHANNEL_READBACK,
        TaskPacket::ChannelFrameTransmit { .. } => CMD_CHANNEL_TRANSMIT,
        TaskPacket::ChannelFrameAssemble { .. } => CMD_CHANNEL_ASSEMBLE,
        TaskPacket::ChannelFrameViewStart { .. } => CMD_CHANNEL_VIEW_START,
        TaskPacket::ChannelFrameViewFinish { .. } => CMD_CHANNEL_VIEW_FINISH,
        TaskPacket::WindowFrameDrawFinish => CMD_WINDOW_DRAW_FINISH,
        TaskPacket::PipeFrameDrawFinish => CMD_PIPE_DRAW_FINISH,
        TaskPacket::NodeFrameDrawFinish => CMD_NODE_DRAW_FINISH,
    }
}

pub fn encode_packet(packet: &Packet) -> Bytes {
    let mut payload = OutputStream::with_capacity(384);
    match &packet.body {
        TaskPacket::ChannelFrameClear { context }
        | TaskPacket::ChannelFrameViewStart { context }
        | TaskPacket::ChannelFrameViewFinish { context } => {
            encode_context(&mut payload, context);
        }
        TaskPacket::ChannelFrameDraw { context, finish } => {
            encode_context(&mut payload, context);
            payload.write_bool(*finish);
        }
        TaskPacket::ChannelFrameReadback { context, frames }
        | TaskPacket::ChannelFrameAssemble { context, frames } => {
            encode_context(&mut payload, context);
            payload.write_object_versions(frames);
        }
        TaskPacket::ChannelFrameTransmit {
            context,
            frame_data,
            client_node,
            peer,
        } => {
            encode_context(&mut payload, context);
            payload.write_object_version(frame_data);
            payload.write_uuid(*client_node);
            payload.write_u64(peer.0);
        }
        TaskPacket::ChannelFrameDrawFinish
        | TaskPacket::WindowFrameDrawFinish
        | TaskPacket::PipeFrameDrawFinish
        | TaskPacket::NodeFrameDrawFinish => {}
    }

    let mut os = OutputStream::with_capacity(HEADER_LEN + payload.len());
    os.write_u32((HEADER_LEN + payload.len()) as u32);
    os.write_u32(command_of(&packet.body));
    os.write_u32(packet.object.high());
    os.write_u32(packet.object.low());
    os.write_u32(packet.frame_number);
    os.write_u128(packet.frame_id);
    os.write_bytes(payload.as_slice());
    os.into_bytes()
}

pub fn decode_packet(bytes: &[u8]) -> Result<Packet, WireError> {
    let mut is = InputStream::from_slice(bytes);
    let size = is.read_u32()?;
    if size as usize != bytes.len() {
        return Err(WireError::SizeMismatch {
            header: size,
            actual: bytes.len(),
        });
    }
    let command = is.read_u32()?;
    let object = RouteId::from_halves(is.read_u32()?, is.read_u32()?);
    let frame_number = is.read_u32()?;
    let frame_id = is.read_u128()?;

    let body = match command {
        CMD_CHANNEL_CLEAR => TaskPacket::ChannelFrameClear {
            context: decode_context(&mut is, frame_id)?,
        },
        CMD_CHANNEL_DRAW => {
            let context = decode_context(&mut is, frame_id)?;
            let finish = is.read_bool()?;
            TaskPacket::ChannelFrameDraw { context, finish }
        }
        CMD_CHANNEL_DRAW_FINISH => TaskPacket::ChannelFrameDrawFinish,
        CMD_CHANNEL_READBACK => {
            let context = decode_context(&mut is, frame_id)?;
            let frames = is.read_object_versions()?;
            TaskPacket::ChannelFrameReadback { context, frames }
        }
        CMD_CHANNEL_TRANSMIT => {
            let context = decode_context(&mut is, frame_id)?;
            let frame_data = is.read_object_version()?;
            let client_node = is.read_uuid()?;
            let peer = PeerId(is.read_u64()?);
            TaskPacket::ChannelFrameTransmit {
                context,
                frame_data,
                client_node,
                peer,
            }
        }
        CMD_CHANNEL_ASSEMBLE => {
            let context = decode_context(&mut is, frame_id)?;
            let frames = is.read_object_versions()?;
            TaskPacket::ChannelFrameAssemble { context, frames }
        }
        CMD_CHANNEL_VIEW_START => TaskPacket::ChannelFrameViewStart {
            context: decode_context(&mut is, frame_id)?,
        },
        CMD_CHANNEL_VIEW_FINISH => TaskPacket::ChannelFrameViewFinish {
            context: decode_context(&mut is, frame_id)?,
        },
        CMD_WINDOW_DRAW_FINISH => TaskPacket::WindowFrameDrawFinish,
        CMD_PIPE_DRAW_FINISH => TaskPacket::PipeFrameDrawFinish,
        CMD_NODE_DRAW_FINISH => TaskPacket::NodeFrameDrawFinish,
        other => return Err(WireError::UnknownCommand(other)),
    };

    Ok(Packet {
        object,
        frame_number,
        frame_id,
        body,
    })
}

fn encode_frustum(os: &mut OutputStream, frustum: &Frustumf) {
    os.write_f32(frustum.left);
    os.write_f32(frustum.right);
    os.write_f32(frustum.bottom);
    os.write_f32(frustum.top);
    os.write_f32(frustum.near);
    os.write_f32(frustum.far);
}

fn decode_frustum(is: &mut InputStream) -> Result<Frustumf, StreamError> {
    Ok(Frustumf {
        left: is.read_f32()?,
        right: is.read_f32()?,
        bottom: is.read_f32()?,
        top: is.read_f32()?,
        near: is.read_f32()?,
        far: is.read_f32()?,
    })
}

fn encode_mat4(os: &mut OutputStream, matrix: &Mat4) {
    os.write_f32s(&matrix.to_cols_array());
}

fn decode_mat4(is: &mut InputStream) -> Result<Mat4, StreamError> {
    let mut array = [0.0f32; 16];
    is.read_f32s(&mut array)?;
    Ok(Mat4::from_cols_array(&array))
}

fn encode_context(os: &mut OutputStream, context: &RenderContext) {
    os.write_i32(context.pvp.x);
    os.write_i32(context.pvp.y);
    os.write_i32(context.pvp.w);
    os.write_i32(context.pvp.h);
    os.write_f32(context.vp.x);
    os.write_f32(context.vp.y);
    os.write_f32(context.vp.w);
    os.write_f32(context.vp.h);
    for value in context.overdraw {
        os.write_i32(value);
    }
    os.write_f32(context.range.start);
    os.write_f32(context.range.end);
    os.write_i32(context.pixel.x as i32);
    os.write_i32(context.pixel.y as i32);
    os.write_i32(context.pixel.w as i32);
    os.write_i32(context.pixel.h as i32);
    // Subpixel occupies four lanes like the other decompositions; the
    // trailing two are reserved.
    os.write_i32(context.subpixel.index as i32);
    os.write_i32(context.subpixel.size as i32);
    os.write_i32(0);
    os.write_i32(0);
    os.write_f32(context.zoom.x);
    os.write_f32(context.zoom.y);
    os.write_u32(context.period);
    os.write_u32(context.phase);
    os.write_i32(context.offset[0]);
    os.write_i32(context.offset[1]);
    os.write_u32(context.eye as u32);
    os.write_u32(context.buffer);
    os.write_u32(context.buffer_mask.bits());
    os.write_uuid(context.view.id);
    os.write_u128(context.view.version);
    os.write_u32(context.task_id);
    encode_frustum(os, &context.frustum);
    encode_mat4(os, &context.head_transform);
    encode_frustum(os, &context.ortho);
    encode_mat4(os, &context.ortho_transform);
}

fn decode_context(is: &mut InputStream, frame_id: u128) -> Result<RenderContext, WireError> {
    let pvp = PixelViewport::new(is.read_i32()?, is.read_i32()?, is.read_i32()?, is.read_i32()?);
    let vp = Viewport::new(is.read_f32()?, is.read_f32()?, is.read_f32()?, is.read_f32()?);
    let mut overdraw = [0i32; 4];
    for slot in overdraw.iter_mut() {
        *slot = is.read_i32()?;
    }
    let range = Range::new(is.read_f32()?, is.read_f32()?);
    let pixel = Pixel::new(
        is.read_i32()? as u32,
        is.read_i32()? as u32,
        is.read_i32()? as u32,
        is.read_i32()? as u32,
    );
    let subpixel = SubPixel::new(is.read_i32()? as u32, is.read_i32()? as u32);
    is.read_i32()?;
    is.read_i32()?;
    let zoom = Zoom::new(is.read_f32()?, is.read_f32()?);
    let period = is.read_u32()?;
    let phase = is.read_u32()?;
    let offset = [is.read_i32()?, is.read_i32()?];
    let eye_bits = is.read_u32()?;
    let eye = Eye::from_bits(eye_bits).ok_or(WireError::UnknownEye(eye_bits))?;
    let buffer = is.read_u32()?;
    let mask_bits = is.read_u32()?;
    let buffer_mask =
        ColorMask::from_bits(mask_bits).ok_or(WireError::InvalidColorMask(mask_bits))?;
    let view = ObjectVersion::new(is.read_uuid()?, is.read_u128()?);
    let task_id = is.read_u32()?;
    let frustum = decode_frustum(is)?;
    let head_transform = decode_mat4(is)?;
    let ortho = decode_frustum(is)?;
    let ortho_transform = decode_mat4(is)?;

    Ok(RenderContext {
        frame_id,
        pvp,
        overdraw,
        vp,
        range,
        pixel,
        subpixel,
        zoom,
        period,
        phase,
        offset,
        eye,
        buffer,
        buffer_mask,
        view,
        task_id,
        frustum,
        head_transform,
        ortho,
        ortho_transform,
    })
}
