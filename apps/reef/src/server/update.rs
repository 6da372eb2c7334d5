//! The per-(channel, eye) frame update pass.
//!
//! One visitor walks the whole compound forest for one channel and
//! one eye, emitting the ordered task packets for that pass: view
//! start, clear, draw, the draw-finish cascade, assemble, readback
//! with its transmit plan, and view finish.

use std::collections::HashSet;

use reef_bus::PeerId;
use tracing::trace;

use crate::compound::{CompoundId, CompoundTree, CompoundVisitor, VisitorResult};
use crate::model::{Eye, Eyes, Tasks};
use crate::object::{ObjectVersion, RouteId};
use crate::protocol::{AddressedPacket, Packet, RenderContext, TaskPacket};
use crate::server::cluster::{ChannelId, Cluster};
use crate::server::frame::FrameStore;
use crate::server::{frustum, FrameError, ViewSlot};

pub struct ChannelUpdateVisitor<'a> {
    channel: ChannelId,
    eye: Eye,
    frame_id: u128,
    frame_number: u32,
    active_eyes: Eyes,
    default_eye_base: f32,
    cluster: &'a mut Cluster,
    frames: &'a FrameStore,
    views: &'a [ViewSlot],
    out: &'a mut Vec<AddressedPacket>,
    updated: bool,
}

impl<'a> ChannelUpdateVisitor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        channel: ChannelId,
        eye: Eye,
        frame_id: u128,
        frame_number: u32,
        active_eyes: Eyes,
        default_eye_base: f32,
        cluster: &'a mut Cluster,
        frames: &'a FrameStore,
        views: &'a [ViewSlot],
        out: &'a mut Vec<AddressedPacket>,
    ) -> Self {
        Self {
            channel,
            eye,
            frame_id,
            frame_number,
            active_eyes,
            default_eye_base,
            cluster,
            frames,
            views,
            out,
            updated: false,
        }
    }

    /// True when this pass emitted at least one task.
    pub fn updated(&self) -> bool {
        self.updated
    }

    fn skip_compound(&self, tree: &CompoundTree, id: CompoundId) -> bool {
        tree.local_channel(id) != Some(self.channel)
            || !tree.is_inherit_active(id, self.eye)
            || tree.inherit_tasks(id).is_empty()
    }

    fn send(&mut self, object: RouteId, body: TaskPacket) {
        let node = self.cluster.node_of_channel(self.channel);
        let peer = self.cluster.node(node).peer;
        trace!(
            target = "frame::tasks",
            channel = %self.cluster.channel(self.channel).name,
            eye = ?self.eye,
            task = body.label(),
            "emit"
        );
        self.out.push(AddressedPacket {
            peer,
            packet: Packet {
                object,
                frame_number: self.frame_number,
                frame_id: self.frame_id,
                body,
            },
        });
    }

    fn send_to_channel(&mut self, body: TaskPacket) {
        let route = self.cluster.channel(self.channel).route;
        self.send(route, body);
    }

    fn setup_render_context(
        &self,
        tree: &CompoundTree,
        id: CompoundId,
    ) -> Result<RenderContext, FrameError> {
        let inherit = tree.inherit(id);
        let Some(dest_id) = inherit.channel else {
            return Err(FrameError::MissingChannel(id));
        };
        let dest = self.cluster.channel(dest_id);
        let drawable = self.cluster.window(dest.window).drawable;
        let view = dest.view.and_then(|index| self.views.get(index));

        let mut context = RenderContext {
            frame_id: self.frame_id,
            pvp: inherit.pvp,
            overdraw: inherit.overdraw,
            vp: inherit.vp,
            range: inherit.range,
            pixel: inherit.pixel,
            subpixel: inherit.subpixel,
            zoom: inherit.zoom,
            period: inherit.period,
            phase: inherit.phase,
            offset: [inherit.pvp.x, inherit.pvp.y],
            eye: self.eye,
            buffer: frustum::draw_buffer(inherit.stereo_mode, &drawable, self.eye),
            buffer_mask: frustum::draw_buffer_mask(inherit, self.eye),
            view: view
                .map(|slot| slot.cell.reference())
                .unwrap_or(ObjectVersion::NONE),
            task_id: tree.task_id(id),
            ..RenderContext::default()
        };

        frustum::compute(
            &mut context,
            inherit,
            id,
            dest,
            view,
            self.default_eye_base,
            self.eye,
        )?;
        Ok(context)
    }

    /// Fold the compound's frame-rate cap into the owning window so
    /// the render loop can throttle.
    fn update_frame_rate(&mut self, tree: &CompoundTree, id: CompoundId) {
        let max_fps = tree.inherit(id).max_fps;
        let window_id = self.cluster.window_of_channel(self.channel);
        let window = self.cluster.window_mut(window_id);
        if max_fps < window.max_fps {
            window.max_fps = max_fps;
        }
    }

    /// Emit the draw-finish cascade once the channel's last drawing
    /// compound has completed its last eye pass. Every stage emits at
    /// most once per frame, gated by the parent's last-drawer field.
    fn update_draw_finish(&mut self, tree: &CompoundTree, id: CompoundId) {
        let last = self.cluster.channel(self.channel).last_draw_compound;
        if let Some(last) = last {
            if last != id {
                return;
            }
        }
        if !tree.is_last_inherit_eye(id, self.eye, self.active_eyes) {
            return;
        }
        if last.is_none() {
            // Channel without a drawing compound: the first compound
            // to finish its eye passes reports for it.
            self.cluster.channel_mut(self.channel).last_draw_compound = Some(id);
        }

        let channel_route = self.cluster.channel(self.channel).route;
        self.send(channel_route, TaskPacket::ChannelFrameDrawFinish);

        let window_id = self.cluster.window_of_channel(self.channel);
        if self.cluster.window(window_id).last_draw_channel != Some(self.channel) {
            return;
        }
        let window_route = self.cluster.window(window_id).route;
        self.send(window_route, TaskPacket::WindowFrameDrawFinish);

        let pipe_id = self.cluster.pipe_of_channel(self.channel);
        if self.cluster.pipe(pipe_id).last_draw_window != Some(window_id) {
            return;
        }
        let pipe_route = self.cluster.pipe(pipe_id).route;
        self.send(pipe_route, TaskPacket::PipeFrameDrawFinish);

        let node_id = self.cluster.node_of_channel(self.channel);
        if self.cluster.node(node_id).last_draw_pipe != Some(pipe_id) {
            return;
        }
        let node_route = self.cluster.node(node_id).route;
        self.send(node_route, TaskPacket::NodeFrameDrawFinish);
    }

    fn update_view_start(&mut self, tree: &CompoundTree, id: CompoundId, context: &RenderContext) {
        if !tree.test_inherit_task(id, Tasks::VIEW) {
            return;
        }
        self.send_to_channel(TaskPacket::ChannelFrameViewStart {
            context: context.clone(),
        });
    }

    fn update_view_finish(&mut self, tree: &CompoundTree, id: CompoundId, context: &RenderContext) {
        if !tree.test_inherit_task(id, Tasks::VIEW) {
            return;
        }
        self.send_to_channel(TaskPacket::ChannelFrameViewFinish {
            context: context.clone(),
        });
    }

    fn send_clear(&mut self, context: &RenderContext) {
        self.send_to_channel(TaskPacket::ChannelFrameClear {
            context: context.clone(),
        });
        self.updated = true;
    }

    fn update_assemble(&mut self, tree: &CompoundTree, id: CompoundId, context: &RenderContext) {
        if !tree.test_inherit_task(id, Tasks::ASSEMBLE) {
            return;
        }

        let frames: Vec<ObjectVersion> = tree
            .input_frames(id)
            .iter()
            .filter(|frame| self.frames.has_data(**frame, self.eye))
            .map(|frame| self.frames.reference(*frame))
            .collect();
        if frames.is_empty() {
            return;
        }

        self.send_to_channel(TaskPacket::ChannelFrameAssemble {
            context: context.clone(),
            frames,
        });
        self.updated = true;
    }

    fn update_readback(&mut self, tree: &CompoundTree, id: CompoundId, context: &RenderContext) {
        if !tree.test_inherit_task(id, Tasks::READBACK) {
            return;
        }

        let outputs: Vec<_> = tree
            .output_frames(id)
            .iter()
            .copied()
            .filter(|frame| self.frames.has_data(*frame, self.eye))
            .collect();
        if outputs.is_empty() {
            return;
        }

        let references: Vec<ObjectVersion> = outputs
            .iter()
            .map(|frame| self.frames.reference(*frame))
            .collect();
        self.send_to_channel(TaskPacket::ChannelFrameReadback {
            context: context.clone(),
            frames: references,
        });
        self.updated = true;

        // One transmit per distinct consumer peer, excluding our own.
        let own_node = self.cluster.node_of_channel(self.channel);
        let own_peer = self.cluster.node(own_node).peer;
        for output in outputs {
            let mut peers: HashSet<PeerId> = HashSet::new();
            for input in self.frames.consumers(output, self.eye).to_vec() {
                let consumer_channel = self.frames.channel_of(input);
                let consumer_node = self.cluster.node_of_channel(consumer_channel);
                let peer = self.cluster.node(consumer_node).peer;
                if peer == own_peer || peers.contains(&peer) {
                    continue;
                }
                let client_node = self.cluster.node(consumer_node).object;
                let frame_data = self.frames.data_reference(output, self.eye);
                self.send_to_channel(TaskPacket::ChannelFrameTransmit {
                    context: context.clone(),
                    frame_data,
                    client_node,
                    peer,
                });
                peers.insert(peer);
            }
        }
    }

    fn update_post_draw(
        &mut self,
        tree: &CompoundTree,
        id: CompoundId,
        context: &RenderContext,
    ) {
        self.update_assemble(tree, id, context);
        self.update_readback(tree, id, context);
        self.update_view_finish(tree, id, context);
    }
}

impl CompoundVisitor for ChannelUpdateVisitor<'_> {
    type Error = FrameError;

    fn visit_pre(
        &mut self,
        tree: &CompoundTree,
        id: CompoundId,
    ) -> Result<VisitorResult, FrameError> {
        if !tree.is_inherit_active(id, self.eye) {
            return Ok(VisitorResult::Prune);
        }

        self.update_draw_finish(tree, id);

        if self.skip_compound(tree, id) {
            return Ok(VisitorResult::Continue);
        }

        let context = self.setup_render_context(tree, id)?;
        self.update_frame_rate(tree, id);
        self.update_view_start(tree, id, &context);
        if tree.test_inherit_task(id, Tasks::CLEAR) {
            self.send_clear(&context);
        }
        Ok(VisitorResult::Continue)
    }

    fn visit_leaf(
        &mut self,
        tree: &CompoundTree,
        id: CompoundId,
    ) -> Result<VisitorResult, FrameError> {
        if !tree.is_inherit_active(id, self.eye) {
            return Ok(VisitorResult::Continue);
        }

        if self.skip_compound(tree, id) {
            self.update_draw_finish(tree, id);
            return Ok(VisitorResult::Continue);
        }

        let context = self.setup_render_context(tree, id)?;
        self.update_frame_rate(tree, id);
        self.update_view_start(tree, id, &context);

        if tree.test_inherit_task(id, Tasks::CLEAR) {
            self.send_clear(&context);
        }
        if tree.test_inherit_task(id, Tasks::DRAW) {
            // The finish flag forces a GL finish so statistics
            // listeners get exact timings.
            let finish = self.cluster.channel(self.channel).listeners > 0;
            self.send_to_channel(TaskPacket::ChannelFrameDraw {
                context: context.clone(),
                finish,
            });
            self.updated = true;
        }

        self.update_draw_finish(tree, id);
        self.update_post_draw(tree, id, &context);
        Ok(VisitorResult::Continue)
    }

    fn visit_post(
        &mut self,
        tree: &CompoundTree,
        id: CompoundId,
    ) -> Result<VisitorResult, FrameError> {
        if self.skip_compound(tree, id) {
            return Ok(VisitorResult::Continue);
        }

        let context = self.setup_render_context(tree, id)?;
        self.update_post_draw(tree, id, &context);
        Ok(VisitorResult::Continue)
    }
}
