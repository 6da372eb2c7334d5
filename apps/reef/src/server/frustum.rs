//! Off-axis frustum and head-transform computation.

use glam::{Mat4, Vec3, Vec4};

use crate::compound::{CompoundId, Inherit};
use crate::model::{
    ColorMask, Eye, FrustumKind, Frustumf, Pixel, PixelViewport, StereoMode, Viewport,
};
use crate::protocol::wire::{
    BUFFER_BACK, BUFFER_BACK_LEFT, BUFFER_BACK_RIGHT, BUFFER_FRONT, BUFFER_FRONT_LEFT,
    BUFFER_FRONT_RIGHT,
};
use crate::protocol::RenderContext;
use crate::server::cluster::{ChannelEntity, DrawableConfig};
use crate::server::{FrameError, ViewSlot};

// [stereo][doublebuffered][eye index]
const DRAW_BUFFER: [[[u32; 3]; 2]; 2] = [
    [
        [BUFFER_FRONT, BUFFER_FRONT, BUFFER_FRONT],
        [BUFFER_BACK, BUFFER_BACK, BUFFER_BACK],
    ],
    [
        [BUFFER_FRONT, BUFFER_FRONT_LEFT, BUFFER_FRONT_RIGHT],
        [BUFFER_BACK, BUFFER_BACK_LEFT, BUFFER_BACK_RIGHT],
    ],
];

/// Draw buffer for one eye pass. QUAD stereo selects per-eye buffers
/// on stereo-capable drawables; everything else shares FRONT/BACK.
pub fn draw_buffer(
    stereo_mode: Option<StereoMode>,
    drawable: &DrawableConfig,
    eye: Eye,
) -> u32 {
    let stereo = match stereo_mode {
        Some(StereoMode::Quad) => drawable.stereo as usize,
        _ => 0,
    };
    DRAW_BUFFER[stereo][drawable.doublebuffered as usize][eye.index()]
}

/// Color write mask for one eye pass; only ANAGLYPH stereo restricts
/// it.
pub fn draw_buffer_mask(inherit: &Inherit, eye: Eye) -> ColorMask {
    if inherit.stereo_mode != Some(StereoMode::Anaglyph) {
        return ColorMask::ALL;
    }
    match eye {
        Eye::Left => inherit.anaglyph_left,
        Eye::Right => inherit.anaglyph_right,
        Eye::Cyclop => ColorMask::ALL,
    }
}

/// World-space eye position for a pass. A tracked observer on a fixed
/// surface supplies the real position; otherwise the eyes sit at
/// ±eye_base/2 on the x axis.
pub fn eye_position(
    inherit: &Inherit,
    view: Option<&ViewSlot>,
    default_eye_base: f32,
    eye: Eye,
) -> Vec3 {
    let observer = view.and_then(|slot| slot.observer.as_ref());
    if let Some(observer) = observer {
        if inherit.frustum.kind == FrustumKind::Fixed {
            return observer.eye_position(eye);
        }
    }

    let eye_base_2 = 0.5
        * observer
            .map(|observer| observer.eye_base())
            .unwrap_or(default_eye_base);
    match eye {
        Eye::Left => Vec3::new(-eye_base_2, 0.0, 0.0),
        Eye::Right => Vec3::new(eye_base_2, 0.0, 0.0),
        Eye::Cyclop => Vec3::ZERO,
    }
}

fn inverse_head(view: Option<&ViewSlot>) -> Mat4 {
    view.and_then(|slot| slot.observer.as_ref())
        .map(|observer| observer.inverse_head())
        .unwrap_or(Mat4::IDENTITY)
}

/// `H[c].xyz = M[c].xyz − eye · M[c].w` per column, fourth row kept:
/// the wall transform with the eye translated into the origin.
fn head_transform(xfm: &Mat4, eye: Vec3) -> Mat4 {
    let shift = |column: Vec4| {
        Vec4::new(
            column.x - eye.x * column.w,
            column.y - eye.y * column.w,
            column.z - eye.z * column.w,
            column.w,
        )
    };
    Mat4::from_cols(
        shift(xfm.x_axis),
        shift(xfm.y_axis),
        shift(xfm.z_axis),
        shift(xfm.w_axis),
    )
}

/// Off-axis corners for one eye in wall space, then jittered for
/// pixel decomposition and cropped to the inherited viewport.
fn compute_corners(
    mut frustum: Frustumf,
    width: f32,
    height: f32,
    pixel: &Pixel,
    vp: &Viewport,
    dest_pvp: &PixelViewport,
    eye: Vec3,
    ortho: bool,
) -> Frustumf {
    let ratio = if ortho { 1.0 } else { frustum.near / eye.z };
    let width_2 = width * 0.5;
    let height_2 = height * 0.5;

    if eye.z > 0.0 || ortho {
        frustum.left = (-width_2 - eye.x) * ratio;
        frustum.right = (width_2 - eye.x) * ratio;
        frustum.bottom = (-height_2 - eye.y) * ratio;
        frustum.top = (height_2 - eye.y) * ratio;
    } else {
        // Eye behind the wall plane: mirror the x axis.
        frustum.left = (width_2 - eye.x) * ratio;
        frustum.right = (-width_2 - eye.x) * ratio;
        frustum.bottom = (height_2 + eye.y) * ratio;
        frustum.top = (-height_2 + eye.y) * ratio;
    }

    if *pixel != Pixel::ALL && pixel.is_valid() {
        if pixel.w > 1 {
            let frustum_width = frustum.right - frustum.left;
            let pixel_width = frustum_width / dest_pvp.w as f32;
            let jitter = pixel_width * pixel.x as f32 - pixel_width * 0.5;
            frustum.left += jitter;
            frustum.right += jitter;
        }
        if pixel.h > 1 {
            let frustum_height = frustum.bottom - frustum.top;
            let pixel_height = frustum_height / dest_pvp.h as f32;
            let jitter = pixel_height * pixel.y as f32 + pixel_height * 0.5;
            frustum.top -= jitter;
            frustum.bottom -= jitter;
        }
    }

    // The inherited viewport is pixel-correct, so the sub-frustum
    // scales proportionally.
    if *vp != Viewport::FULL && vp.is_valid() {
        let frustum_width = frustum.right - frustum.left;
        frustum.left += frustum_width * vp.x;
        frustum.right = frustum.left + frustum_width * vp.w;

        let frustum_height = frustum.top - frustum.bottom;
        frustum.bottom += frustum_height * vp.y;
        frustum.top = frustum.bottom + frustum_height * vp.h;
    }

    frustum
}

/// Fill the perspective and ortho frusta plus head transforms of a
/// render context.
pub fn compute(
    context: &mut RenderContext,
    inherit: &Inherit,
    compound: CompoundId,
    dest: &ChannelEntity,
    view: Option<&ViewSlot>,
    default_eye_base: f32,
    eye: Eye,
) -> Result<(), FrameError> {
    let data = &inherit.frustum;
    let eye_world = eye_position(inherit, view, default_eye_base, eye);
    let eye_wall = data.transform.transform_point3(eye_world);
    if eye_wall.z == 0.0 {
        return Err(FrameError::EyeOnWall(compound));
    }

    let base = Frustumf {
        near: dest.near,
        far: dest.far,
        ..Frustumf::default()
    };

    // Perspective path.
    context.frustum = compute_corners(
        base,
        data.width,
        data.height,
        &inherit.pixel,
        &inherit.vp,
        &dest.pvp,
        eye_wall,
        false,
    );
    context.head_transform = head_transform(&data.transform, eye_wall);

    // Ortho path: corners from the cyclop eye, then sheared per eye.
    let cyclop_world = eye_position(inherit, view, default_eye_base, Eye::Cyclop);
    let cyclop_wall = data.transform.transform_point3(cyclop_world);
    context.ortho = compute_corners(
        base,
        data.width,
        data.height,
        &inherit.pixel,
        &inherit.vp,
        &dest.pvp,
        cyclop_wall,
        true,
    );
    context.ortho_transform = head_transform(&data.transform, eye_wall);
    context.ortho_transform.z_axis.x += (cyclop_wall.x - eye_wall.x) / eye_wall.z;
    context.ortho_transform.z_axis.y += (cyclop_wall.y - eye_wall.y) / eye_wall.z;

    if data.kind == FrustumKind::HeadMounted {
        let inverse = inverse_head(view);
        context.head_transform *= inverse;
        context.ortho_transform *= inverse;
    }

    Ok(())
}
