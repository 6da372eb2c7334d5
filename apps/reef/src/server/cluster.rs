//! The rendering resource hierarchy: nodes host pipes, pipes host
//! windows, windows host channels. Entities live in arenas owned by
//! the cluster; references between them are plain indices.

use reef_bus::PeerId;
use uuid::Uuid;

use crate::compound::CompoundId;
use crate::model::PixelViewport;
use crate::object::{LocalNode, Role, RouteId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

/// GL drawable capabilities of a window, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawableConfig {
    pub stereo: bool,
    pub doublebuffered: bool,
}

impl Default for DrawableConfig {
    fn default() -> Self {
        Self {
            stereo: false,
            doublebuffered: true,
        }
    }
}

#[derive(Debug)]
pub struct NodeEntity {
    pub name: String,
    pub object: Uuid,
    pub route: RouteId,
    pub peer: PeerId,
    pub pipes: Vec<PipeId>,
    pub last_draw_pipe: Option<PipeId>,
}

#[derive(Debug)]
pub struct PipeEntity {
    pub node: NodeId,
    pub object: Uuid,
    pub route: RouteId,
    pub windows: Vec<WindowId>,
    pub last_draw_window: Option<WindowId>,
}

#[derive(Debug)]
pub struct WindowEntity {
    pub pipe: PipeId,
    pub object: Uuid,
    pub route: RouteId,
    pub drawable: DrawableConfig,
    pub channels: Vec<ChannelId>,
    pub max_fps: f32,
    pub last_draw_channel: Option<ChannelId>,
}

#[derive(Debug)]
pub struct ChannelEntity {
    pub window: WindowId,
    pub name: String,
    pub object: Uuid,
    pub route: RouteId,
    pub pvp: PixelViewport,
    pub overdraw: [i32; 4],
    pub near: f32,
    pub far: f32,
    pub view: Option<usize>,
    pub last_draw_compound: Option<CompoundId>,
    pub listeners: usize,
}

#[derive(Debug)]
pub struct Cluster {
    nodes: Vec<NodeEntity>,
    pipes: Vec<PipeEntity>,
    windows: Vec<WindowEntity>,
    channels: Vec<ChannelEntity>,
    registry: LocalNode,
}

impl Cluster {
    pub fn node(&self, id: NodeId) -> &NodeEntity {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut NodeEntity {
        &mut self.nodes[id.0 as usize]
    }

    pub fn pipe(&self, id: PipeId) -> &PipeEntity {
        &self.pipes[id.0 as usize]
    }

    pub fn pipe_mut(&mut self, id: PipeId) -> &mut PipeEntity {
        &mut self.pipes[id.0 as usize]
    }

    pub fn window(&self, id: WindowId) -> &WindowEntity {
        &self.windows[id.0 as usize]
    }

    pub fn window_mut(&mut self, id: WindowId) -> &mut WindowEntity {
        &mut self.windows[id.0 as usize]
    }

    pub fn channel(&self, id: ChannelId) -> &ChannelEntity {
        &self.channels[id.0 as usize]
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> &mut ChannelEntity {
        &mut self.channels[id.0 as usize]
    }

    pub fn has_channel(&self, id: ChannelId) -> bool {
        (id.0 as usize) < self.channels.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = ChannelId> {
        (0..self.channels.len() as u32).map(ChannelId)
    }

    pub fn window_of_channel(&self, id: ChannelId) -> WindowId {
        self.channels[id.0 as usize].window
    }

    pub fn pipe_of_channel(&self, id: ChannelId) -> PipeId {
        self.window(self.window_of_channel(id)).pipe
    }

    pub fn node_of_channel(&self, id: ChannelId) -> NodeId {
        self.pipe(self.pipe_of_channel(id)).node
    }

    pub fn node_by_object(&self, object: Uuid) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.object == object)
            .map(|index| NodeId(index as u32))
    }

    pub fn registry(&self) -> &LocalNode {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut LocalNode {
        &mut self.registry
    }

    /// Clear per-frame bookkeeping. Runs between frames; inherited
    /// compound state is immutable while a frame is in flight.
    pub fn reset_frame_state(&mut self) {
        for node in &mut self.nodes {
            node.last_draw_pipe = None;
        }
        for pipe in &mut self.pipes {
            pipe.last_draw_window = None;
        }
        for window in &mut self.windows {
            window.last_draw_channel = None;
            window.max_fps = f32::MAX;
        }
        for channel in &mut self.channels {
            channel.last_draw_compound = None;
        }
    }
}

/// Builds a cluster, attaching every entity to the server's object
/// registry as it goes.
#[derive(Debug)]
pub struct ClusterBuilder {
    nodes: Vec<NodeEntity>,
    pipes: Vec<PipeEntity>,
    windows: Vec<WindowEntity>,
    channels: Vec<ChannelEntity>,
    registry: LocalNode,
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterBuilder {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            pipes: Vec::new(),
            windows: Vec::new(),
            channels: Vec::new(),
            registry: LocalNode::new(),
        }
    }

    fn attach(&mut self) -> (Uuid, RouteId) {
        let object = Uuid::new_v4();
        let route = self
            .registry
            .attach(object, Role::Master)
            .expect("fresh uuid cannot collide");
        (object, route)
    }

    pub fn node(&mut self, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let (object, route) = self.attach();
        self.nodes.push(NodeEntity {
            name: name.into(),
            object,
            route,
            peer: PeerId(id.0 as u64 + 1),
            pipes: Vec::new(),
            last_draw_pipe: None,
        });
        id
    }

    pub fn pipe(&mut self, node: NodeId) -> PipeId {
        let id = PipeId(self.pipes.len() as u32);
        let (object, route) = self.attach();
        self.pipes.push(PipeEntity {
            node,
            object,
            route,
            windows: Vec::new(),
            last_draw_window: None,
        });
        self.nodes[node.0 as usize].pipes.push(id);
        id
    }

    pub fn window(&mut self, pipe: PipeId, drawable: DrawableConfig) -> WindowId {
        let id = WindowId(self.windows.len() as u32);
        let (object, route) = self.attach();
        self.windows.push(WindowEntity {
            pipe,
            object,
            route,
            drawable,
            channels: Vec::new(),
            max_fps: f32::MAX,
            last_draw_channel: None,
        });
        self.pipes[pipe.0 as usize].windows.push(id);
        id
    }

    pub fn channel(
        &mut self,
        window: WindowId,
        name: impl Into<String>,
        pvp: PixelViewport,
    ) -> ChannelId {
        let id = ChannelId(self.channels.len() as u32);
        let (object, route) = self.attach();
        self.channels.push(ChannelEntity {
            window,
            name: name.into(),
            object,
            route,
            pvp,
            overdraw: [0; 4],
            near: 0.1,
            far: 10.0,
            view: None,
            last_draw_compound: None,
            listeners: 0,
        });
        self.windows[window.0 as usize].channels.push(id);
        id
    }

    pub fn set_channel_planes(&mut self, channel: ChannelId, near: f32, far: f32) {
        let entity = &mut self.channels[channel.0 as usize];
        entity.near = near;
        entity.far = far;
    }

    pub fn build(self) -> Cluster {
        Cluster {
            nodes: self.nodes,
            pipes: self.pipes,
            windows: self.windows,
            channels: self.channels,
            registry: self.registry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_lookups_walk_upwards() {
        let mut builder = ClusterBuilder::new();
        let node = builder.node("render0");
        let pipe = builder.pipe(node);
        let window = builder.window(pipe, DrawableConfig::default());
        let channel = builder.channel(window, "c0", PixelViewport::new(0, 0, 800, 600));
        let cluster = builder.build();

        assert_eq!(cluster.window_of_channel(channel), window);
        assert_eq!(cluster.pipe_of_channel(channel), pipe);
        assert_eq!(cluster.node_of_channel(channel), node);
        assert_eq!(cluster.node(node).peer, PeerId(1));
    }

    #[test]
    fn every_entity_gets_a_distinct_route() {
        let mut builder = ClusterBuilder::new();
        let node = builder.node("render0");
        let pipe = builder.pipe(node);
        let window = builder.window(pipe, DrawableConfig::default());
        let channel = builder.channel(window, "c0", PixelViewport::new(0, 0, 800, 600));
        let cluster = builder.build();

        let routes = [
            cluster.node(node).route,
            cluster.pipe(pipe).route,
            cluster.window(window).route,
            cluster.channel(channel).route,
        ];
        for (i, a) in routes.iter().enumerate() {
            for b in &routes[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(cluster.registry().len(), 4);
    }
}
