//! Output and input frames for cross-node compositing.
//!
//! A readback compound writes an output frame; assemble compounds on
//! other channels consume it through input frames of the same name.
//! Both sides are distributed handles; the pixel payload travels as a
//! separate frame-data object whose per-eye version tells consumers
//! what to sync to.

use uuid::Uuid;

use crate::compound::CompoundId;
use crate::model::Eye;
use crate::object::{LocalNode, ObjectVersion, Role, RouteId, Version, VERSION_NONE};
use crate::server::cluster::ChannelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Output,
    Input,
}

#[derive(Debug)]
pub struct FrameEntity {
    pub name: String,
    pub kind: FrameKind,
    pub compound: CompoundId,
    pub channel: ChannelId,
    pub object: Uuid,
    pub route: RouteId,
    pub data_object: Uuid,
    pub version: Version,
    data_versions: [Version; 3],
    /// Input frames: the producing output frame, wired by `connect`.
    pub linked_output: Option<FrameId>,
    /// Output frames: consuming input frames, per eye.
    consumers: [Vec<FrameId>; 3],
}

#[derive(Debug, Default)]
pub struct FrameStore {
    frames: Vec<FrameEntity>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        registry: &mut LocalNode,
        name: String,
        kind: FrameKind,
        compound: CompoundId,
        channel: ChannelId,
    ) -> FrameId {
        let object = Uuid::new_v4();
        let route = registry
            .attach(object, Role::Master)
            .expect("fresh uuid cannot collide");
        let id = FrameId(self.frames.len() as u32);
        self.frames.push(FrameEntity {
            name,
            kind,
            compound,
            channel,
            object,
            route,
            data_object: Uuid::new_v4(),
            version: VERSION_NONE,
            data_versions: [VERSION_NONE; 3],
            linked_output: None,
            consumers: [Vec::new(), Vec::new(), Vec::new()],
        });
        id
    }

    pub fn add_output(
        &mut self,
        registry: &mut LocalNode,
        name: impl Into<String>,
        compound: CompoundId,
        channel: ChannelId,
    ) -> FrameId {
        self.push(registry, name.into(), FrameKind::Output, compound, channel)
    }

    pub fn add_input(
        &mut self,
        registry: &mut LocalNode,
        name: impl Into<String>,
        compound: CompoundId,
        channel: ChannelId,
    ) -> FrameId {
        self.push(registry, name.into(), FrameKind::Input, compound, channel)
    }

    /// Wire input frames to the output frame of the same name, for
    /// every eye. Runs once per config update.
    pub fn connect(&mut self) {
        let pairs: Vec<(usize, usize)> = self
            .frames
            .iter()
            .enumerate()
            .filter(|(_, frame)| frame.kind == FrameKind::Input)
            .filter_map(|(input_index, input)| {
                self.frames
                    .iter()
                    .position(|candidate| {
                        candidate.kind == FrameKind::Output && candidate.name == input.name
                    })
                    .map(|output_index| (input_index, output_index))
            })
            .collect();

        for frame in &mut self.frames {
            frame.linked_output = None;
            for eye_consumers in &mut frame.consumers {
                eye_consumers.clear();
            }
        }
        for (input_index, output_index) in pairs {
            self.frames[input_index].linked_output = Some(FrameId(output_index as u32));
            for eye in Eye::PASS_ORDER {
                self.frames[output_index].consumers[eye.index()].push(FrameId(input_index as u32));
            }
        }
    }

    pub fn get(&self, id: FrameId) -> &FrameEntity {
        &self.frames[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn channel_of(&self, id: FrameId) -> ChannelId {
        self.frames[id.0 as usize].channel
    }

    pub fn consumers(&self, id: FrameId, eye: Eye) -> &[FrameId] {
        &self.frames[id.0 as usize].consumers[eye.index()]
    }

    /// Cycle an output frame's payload version for one eye at frame
    /// start. The frame handle itself moves to the same version.
    pub fn cycle_data(&mut self, id: FrameId, eye: Eye, version: Version) {
        let frame = &mut self.frames[id.0 as usize];
        frame.data_versions[eye.index()] = version;
        frame.version = version;
    }

    fn resolve(&self, id: FrameId) -> &FrameEntity {
        let frame = &self.frames[id.0 as usize];
        match frame.linked_output {
            Some(output) => &self.frames[output.0 as usize],
            None => frame,
        }
    }

    /// A frame is ready on an eye once its payload version for that
    /// eye is set. Inputs mirror their producing output.
    pub fn has_data(&self, id: FrameId, eye: Eye) -> bool {
        self.resolve(id).data_versions[eye.index()] != VERSION_NONE
    }

    pub fn data_version(&self, id: FrameId, eye: Eye) -> Version {
        self.resolve(id).data_versions[eye.index()]
    }

    /// Reference to the frame handle object.
    pub fn reference(&self, id: FrameId) -> ObjectVersion {
        let frame = &self.frames[id.0 as usize];
        ObjectVersion::new(frame.object, frame.version)
    }

    /// Reference to the frame payload for one eye.
    pub fn data_reference(&self, id: FrameId, eye: Eye) -> ObjectVersion {
        let producer = self.resolve(id);
        ObjectVersion::new(producer.data_object, producer.data_versions[eye.index()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_mirror_their_producer() {
        let mut registry = LocalNode::new();
        let mut store = FrameStore::new();
        let output = store.add_output(&mut registry, "tile", CompoundId(0), ChannelId(0));
        let input = store.add_input(&mut registry, "tile", CompoundId(1), ChannelId(1));
        let orphan = store.add_input(&mut registry, "other", CompoundId(1), ChannelId(1));
        store.connect();

        assert!(!store.has_data(input, Eye::Cyclop));
        store.cycle_data(output, Eye::Cyclop, 7);
        assert!(store.has_data(input, Eye::Cyclop));
        assert!(!store.has_data(input, Eye::Left));
        assert!(!store.has_data(orphan, Eye::Cyclop));
        assert_eq!(store.data_version(input, Eye::Cyclop), 7);
        assert_eq!(
            store.data_reference(input, Eye::Cyclop),
            store.data_reference(output, Eye::Cyclop)
        );
        assert_eq!(store.consumers(output, Eye::Cyclop), &[input]);
    }
}
