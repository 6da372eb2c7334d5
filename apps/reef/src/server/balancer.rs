//! Frame-rate driven zoom balancing.
//!
//! A balancer watches one compound's channel statistics and steers the
//! compound zoom so the channel converges on a target frame rate. The
//! readback zoom trades resolution for speed, so shrinking the zoom
//! speeds the frame up.

use tracing::debug;

use crate::compound::{CompoundId, CompoundTree};
use crate::model::Zoom;
use crate::server::cluster::{ChannelId, Cluster};

const MAX_WINDOW_SAMPLES: u32 = 100;
const MIN_ZOOM_PIXELS: f32 = 128.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticKind {
    ChannelClear,
    ChannelDraw,
    ChannelAssemble,
    ChannelReadback,
    ChannelTransmit,
}

/// One timed channel operation, in milliseconds on the client clock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistic {
    pub kind: StatisticKind,
    pub start_ms: f32,
    pub end_ms: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptMode {
    /// React to the last frame only, damped.
    Quick,
    /// Average a window of frames before adapting.
    Averaged,
}

#[derive(Debug)]
pub struct DfrBalancer {
    compound: CompoundId,
    channel: ChannelId,
    mode: AdaptMode,
    target_fps: f32,
    damping: f32,
    fps_last_frame: f32,
    average: f32,
    count: u32,
    window: u32,
    new_value_ready: bool,
    frozen: bool,
}

impl DfrBalancer {
    pub fn new(
        compound: CompoundId,
        channel: ChannelId,
        mode: AdaptMode,
        target_fps: f32,
        damping: f32,
    ) -> Self {
        let damping = damping.clamp(0.0, 1.0);
        Self {
            compound,
            channel,
            mode,
            target_fps,
            damping,
            fps_last_frame: target_fps,
            average: 0.0,
            count: 0,
            window: (MAX_WINDOW_SAMPLES as f32 * damping) as u32 + 1,
            new_value_ready: false,
            frozen: false,
        }
    }

    pub fn compound(&self) -> CompoundId {
        self.compound
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    /// Ingest one frame's channel statistics. The frame time spans
    /// from the first clear to the last compositing operation.
    pub fn notify_load(&mut self, frame_number: u32, statistics: &[Statistic]) {
        let mut start = f32::MAX;
        let mut end = 0.0f32;
        for statistic in statistics {
            match statistic.kind {
                StatisticKind::ChannelClear => start = start.min(statistic.start_ms),
                StatisticKind::ChannelAssemble
                | StatisticKind::ChannelReadback
                | StatisticKind::ChannelTransmit => end = end.max(statistic.end_ms),
                StatisticKind::ChannelDraw => {}
            }
        }
        if start == f32::MAX {
            return;
        }
        let time = end - start;
        if time <= 0.0 {
            return;
        }

        self.new_value_ready = true;
        self.fps_last_frame = 1000.0 / time;
        self.average += self.fps_last_frame;
        self.count += 1;
        debug!(
            target = "server::balancer",
            frame_number,
            time_ms = time,
            fps = self.fps_last_frame,
            "channel load sample"
        );
    }

    /// Adjust the compound zoom for the next frame.
    pub fn update(&mut self, tree: &mut CompoundTree, cluster: &Cluster) {
        if self.frozen {
            tree.set_zoom(self.compound, Zoom::NONE);
            return;
        }

        let factor = match self.mode {
            AdaptMode::Quick => {
                if !self.new_value_ready {
                    return;
                }
                self.new_value_ready = false;
                ((self.fps_last_frame / self.target_fps).sqrt() - 1.0) * self.damping + 1.0
            }
            AdaptMode::Averaged => {
                if self.count <= self.window {
                    return;
                }
                let average = self.average / self.count as f32;
                self.average = 0.0;
                self.count = 0;
                (average / self.target_fps).sqrt()
            }
        };

        let mut zoom = tree.attrs(self.compound).zoom;
        zoom.x *= factor;
        zoom.y *= factor;

        // Clamp between a 128-pixel floor and the channel's native
        // resolution, relative to the parent's pixel viewport.
        let Some(parent) = tree.parent(self.compound) else {
            return;
        };
        let parent_pvp = tree.inherit(parent).pvp;
        if !parent_pvp.has_area() {
            return;
        }
        let channel_pvp = cluster.channel(self.channel).pvp;

        let min_zoom = MIN_ZOOM_PIXELS / (parent_pvp.w.min(parent_pvp.h) as f32);
        let max_zoom = (channel_pvp.w as f32 / parent_pvp.w as f32)
            .min(channel_pvp.h as f32 / parent_pvp.h as f32);

        zoom.x = zoom.x.clamp(min_zoom, max_zoom);
        zoom.y = zoom.x;
        tree.set_zoom(self.compound, zoom);
    }
}
