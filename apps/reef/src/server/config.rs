//! One running configuration: the resource cluster, the compound
//! forest, views and frames, plus the per-frame update loop that
//! turns all of it into task packets.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::compound::{accept_forest, CompoundId, CompoundTree};
use crate::config::Settings;
use crate::model::{Eye, Eyes, Observer, Tasks, View};
use crate::object::{MasterCell, Role};
use crate::protocol::{AddressedPacket, TaskPacket};
use crate::server::balancer::{DfrBalancer, Statistic};
use crate::server::cluster::{ChannelId, Cluster};
use crate::server::frame::{FrameId, FrameStore};
use crate::server::update::ChannelUpdateVisitor;
use crate::server::{ConfigError, FrameError, ViewSlot};
use crate::telemetry;

/// Events reported from render clients back to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A node finished drawing a frame.
    NodeFrameFinished { node: Uuid, frame_number: u32 },
    /// Timed channel operations for the balancers.
    Statistics {
        channel: ChannelId,
        frame_number: u32,
        statistics: Vec<Statistic>,
    },
    /// GPU-side failure on a channel. The frame is lost on that
    /// channel; the orchestrator keeps going.
    RenderError {
        channel: ChannelId,
        frame_number: u32,
        message: String,
    },
}

pub struct Config {
    cluster: Cluster,
    tree: CompoundTree,
    views: Vec<ViewSlot>,
    frames: FrameStore,
    balancers: Vec<DfrBalancer>,
    active_eyes: Eyes,
    settings: Settings,
    tracker: FrameTracker,
}

impl Config {
    pub fn new(
        cluster: Cluster,
        tree: CompoundTree,
        settings: Settings,
    ) -> Result<Self, ConfigError> {
        if tree.is_empty() {
            return Err(ConfigError::EmptyTree);
        }
        tree.validate(&cluster)?;
        Ok(Self {
            cluster,
            tree,
            views: Vec::new(),
            frames: FrameStore::new(),
            balancers: Vec::new(),
            active_eyes: Eyes::CYCLOP,
            settings,
            tracker: FrameTracker::default(),
        })
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn tree(&self) -> &CompoundTree {
        &self.tree
    }

    pub fn frames(&self) -> &FrameStore {
        &self.frames
    }

    pub fn active_eyes(&self) -> Eyes {
        self.active_eyes
    }

    pub fn set_active_eyes(&mut self, eyes: Eyes) {
        self.active_eyes = eyes;
    }

    /// Register a view; returns its slot index for channel wiring.
    pub fn add_view(&mut self, view: View, observer: Option<Observer>) -> usize {
        let cell = MasterCell::new(view);
        self.cluster
            .registry_mut()
            .attach(cell.id(), Role::Master)
            .expect("fresh uuid cannot collide");
        self.views.push(ViewSlot { cell, observer });
        self.views.len() - 1
    }

    pub fn view(&self, index: usize) -> &ViewSlot {
        &self.views[index]
    }

    pub fn view_mut(&mut self, index: usize) -> &mut ViewSlot {
        &mut self.views[index]
    }

    pub fn set_channel_view(&mut self, channel: ChannelId, view: usize) {
        self.cluster.channel_mut(channel).view = Some(view);
    }

    pub fn add_output_frame(
        &mut self,
        compound: CompoundId,
        name: impl Into<String>,
    ) -> Result<FrameId, ConfigError> {
        let Some(channel) = self.tree.local_channel(compound) else {
            return Err(ConfigError::FrameWithoutChannel(compound));
        };
        let id = self
            .frames
            .add_output(self.cluster.registry_mut(), name, compound, channel);
        self.tree.add_output_frame(compound, id);
        Ok(id)
    }

    pub fn add_input_frame(
        &mut self,
        compound: CompoundId,
        name: impl Into<String>,
    ) -> Result<FrameId, ConfigError> {
        let Some(channel) = self.tree.local_channel(compound) else {
            return Err(ConfigError::FrameWithoutChannel(compound));
        };
        let id = self
            .frames
            .add_input(self.cluster.registry_mut(), name, compound, channel);
        self.tree.add_input_frame(compound, id);
        Ok(id)
    }

    /// Wire producers to consumers. Run once after all frames are
    /// declared.
    pub fn connect_frames(&mut self) {
        self.frames.connect();
    }

    /// Attach a balancer; its channel gains a statistics listener,
    /// which also makes draws finish-synchronized for exact timings.
    pub fn add_balancer(&mut self, balancer: DfrBalancer) {
        self.cluster.channel_mut(balancer.channel()).listeners += 1;
        self.balancers.push(balancer);
    }

    /// Channel statistics reported back from a render client.
    pub fn notify_statistics(
        &mut self,
        channel: ChannelId,
        frame_number: u32,
        statistics: &[Statistic],
    ) {
        for balancer in &mut self.balancers {
            if balancer.channel() == channel {
                balancer.notify_load(frame_number, statistics);
            }
        }
    }

    /// Advance one frame: resolve inheritance, cycle frame data, run
    /// one visitor per (channel, eye) pass and collect every task
    /// packet of the frame in emission order.
    pub fn update_frame(
        &mut self,
        frame_number: u32,
        frame_id: u128,
    ) -> Result<Vec<AddressedPacket>, FrameError> {
        let update_started = Instant::now();

        for balancer in &mut self.balancers {
            balancer.update(&mut self.tree, &self.cluster);
        }

        self.tree.resolve_inherit(&self.cluster, frame_number);
        self.cluster.reset_frame_state();
        self.cycle_frame_data(frame_number);
        self.prepare_last_drawers();

        let mut out = Vec::new();
        let channels: Vec<ChannelId> = self.cluster.channel_ids().collect();
        for channel in channels {
            for eye in Eye::PASS_ORDER {
                if !self.active_eyes.contains_eye(eye) {
                    continue;
                }
                let mut visitor = ChannelUpdateVisitor::new(
                    channel,
                    eye,
                    frame_id,
                    frame_number,
                    self.active_eyes,
                    self.settings.eye_base,
                    &mut self.cluster,
                    &self.frames,
                    &self.views,
                    &mut out,
                );
                accept_forest(&self.tree, &mut visitor)?;
            }
        }

        let expected = expected_nodes(&self.cluster, &out);
        self.tracker
            .begin(frame_number, expected, self.settings.frame_timeout);
        telemetry::frame_sampled(out.len(), update_started.elapsed());
        debug!(
            target = "server::frame",
            frame_number,
            packets = out.len(),
            "frame update emitted"
        );
        Ok(out)
    }

    /// A render node reported its draw finish for a frame.
    /// Returns true when the frame is now complete.
    pub fn notify_node_finish(&mut self, node: Uuid, frame_number: u32) -> bool {
        self.tracker.notify_node_finish(frame_number, node)
    }

    /// Feed one client event into the orchestrator. Render errors are
    /// surfaced to the operator and never stop the frame loop.
    pub fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::NodeFrameFinished { node, frame_number } => {
                self.notify_node_finish(node, frame_number);
            }
            ClientEvent::Statistics {
                channel,
                frame_number,
                statistics,
            } => {
                self.notify_statistics(channel, frame_number, &statistics);
            }
            ClientEvent::RenderError {
                channel,
                frame_number,
                message,
            } => {
                error!(
                    target = "server::frame",
                    channel = %self.cluster.channel(channel).name,
                    frame_number,
                    %message,
                    "render error reported by client"
                );
            }
        }
    }

    pub fn is_frame_complete(&self, frame_number: u32) -> bool {
        self.tracker.is_complete(frame_number)
    }

    /// Abandon frames past their wall-time budget. Later frames
    /// proceed; nothing is rolled back.
    pub fn expire_frames(&mut self) -> Vec<u32> {
        let expired = self.tracker.expire(Instant::now());
        for frame_number in &expired {
            warn!(
                target = "server::frame",
                frame_number, "frame timed out, abandoning"
            );
        }
        expired
    }

    /// Set every output frame's per-eye data version for this frame,
    /// for the eyes its producing compound is active on.
    fn cycle_frame_data(&mut self, frame_number: u32) {
        // Frame 0 still needs a non-null version to mark data ready.
        let version = frame_number as u128 + 1;
        for compound in self.tree.ids() {
            if !self.tree.test_inherit_task(compound, Tasks::READBACK) {
                continue;
            }
            for eye in Eye::PASS_ORDER {
                if !self.active_eyes.contains_eye(eye)
                    || !self.tree.is_inherit_active(compound, eye)
                {
                    continue;
                }
                for frame in self.tree.output_frames(compound).to_vec() {
                    self.frames.cycle_data(frame, eye, version);
                }
            }
        }
    }

    /// Precompute the "last drawer" fields that terminate the
    /// draw-finish cascade: the last drawing compound per channel,
    /// then the last drawing channel/window/pipe up the hierarchy.
    fn prepare_last_drawers(&mut self) {
        let mut order: Vec<CompoundId> = Vec::new();
        let mut stack: Vec<CompoundId> = self.tree.roots().iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.tree.children(id).iter().rev().copied());
        }

        for id in order {
            if !self.tree.is_leaf(id) {
                continue;
            }
            let Some(channel) = self.tree.local_channel(id) else {
                continue;
            };
            let inherit = self.tree.inherit(id);
            if !inherit.active
                || !self.tree.inherit_tasks(id).contains(Tasks::DRAW)
                || (inherit.eyes & self.active_eyes).is_empty()
            {
                continue;
            }
            self.cluster.channel_mut(channel).last_draw_compound = Some(id);
        }

        // Walk members in creation order; the last drawing member of
        // each parent wins.
        let nodes: Vec<_> = self.cluster.node_ids().collect();
        for node in nodes {
            let pipes = self.cluster.node(node).pipes.clone();
            let mut last_pipe = None;
            for pipe in pipes {
                let windows = self.cluster.pipe(pipe).windows.clone();
                let mut last_window = None;
                for window in windows {
                    let channels = self.cluster.window(window).channels.clone();
                    let mut last_channel = None;
                    for channel in channels {
                        if self.cluster.channel(channel).last_draw_compound.is_some() {
                            last_channel = Some(channel);
                        }
                    }
                    if let Some(channel) = last_channel {
                        self.cluster.window_mut(window).last_draw_channel = Some(channel);
                        last_window = Some(window);
                    }
                }
                if let Some(window) = last_window {
                    self.cluster.pipe_mut(pipe).last_draw_window = Some(window);
                    last_pipe = Some(pipe);
                }
            }
            if let Some(pipe) = last_pipe {
                self.cluster.node_mut(node).last_draw_pipe = Some(pipe);
            }
        }
    }
}

fn expected_nodes(cluster: &Cluster, out: &[AddressedPacket]) -> HashSet<Uuid> {
    let mut nodes = HashSet::new();
    for packet in out {
        if matches!(packet.packet.body, TaskPacket::NodeFrameDrawFinish) {
            if let Ok(object) = cluster.registry().object_at(packet.packet.object) {
                nodes.insert(object);
            }
        }
    }
    nodes
}

#[derive(Debug)]
struct FrameStatus {
    expected: HashSet<Uuid>,
    finished: HashSet<Uuid>,
    deadline: Instant,
}

/// Tracks outstanding frames against their node draw-finish set.
#[derive(Debug, Default)]
pub struct FrameTracker {
    frames: HashMap<u32, FrameStatus>,
}

impl FrameTracker {
    pub fn begin(&mut self, frame_number: u32, expected: HashSet<Uuid>, timeout: Duration) {
        self.frames.insert(
            frame_number,
            FrameStatus {
                expected,
                finished: HashSet::new(),
                deadline: Instant::now() + timeout,
            },
        );
    }

    pub fn notify_node_finish(&mut self, frame_number: u32, node: Uuid) -> bool {
        let Some(status) = self.frames.get_mut(&frame_number) else {
            return false;
        };
        status.finished.insert(node);
        let complete = status.expected.is_subset(&status.finished);
        if complete {
            self.frames.remove(&frame_number);
        }
        complete
    }

    pub fn is_complete(&self, frame_number: u32) -> bool {
        match self.frames.get(&frame_number) {
            Some(status) => status.expected.is_subset(&status.finished),
            // Completed frames are retired from the map.
            None => true,
        }
    }

    /// Remove frames past their deadline, returning their numbers.
    pub fn expire(&mut self, now: Instant) -> Vec<u32> {
        let expired: Vec<u32> = self
            .frames
            .iter()
            .filter(|(_, status)| now >= status.deadline)
            .map(|(frame, _)| *frame)
            .collect();
        for frame in &expired {
            self.frames.remove(frame);
        }
        expired
    }
}
