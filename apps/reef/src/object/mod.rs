//! Versioned replicated objects.
//!
//! A master cell owns the authoritative state, allocates versions and
//! broadcasts deltas; slave cells buffer incoming deltas and apply
//! them in arrival order when asked to catch up. `sync` is the only
//! blocking operation in the layer.

pub mod local_node;
pub mod stream;

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use local_node::{deserialize_children, ChildObject, ChildOwner, LocalNode, RouteId};
pub use stream::{InputStream, OutputStream, StreamError};

/// Object version. Monotonically increasing on commit.
pub type Version = u128;

pub const VERSION_NONE: Version = 0;
pub const VERSION_HEAD: Version = Version::MAX;

/// Reference to a replicated object at a point in its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectVersion {
    pub id: Uuid,
    pub version: Version,
}

impl ObjectVersion {
    pub const NONE: ObjectVersion = ObjectVersion {
        id: Uuid::nil(),
        version: VERSION_NONE,
    };

    pub fn new(id: Uuid, version: Version) -> Self {
        Self { id, version }
    }

    pub fn is_none(&self) -> bool {
        self.id.is_nil()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
    Unattached,
}

#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("object {0} is not mapped on this node")]
    Unmapped(Uuid),
    #[error("no object mapped at route {0}")]
    UnmappedRoute(u64),
    #[error("object {0} is already mapped")]
    AlreadyMapped(Uuid),
    #[error("requested version {requested} is ahead of committed head {head}")]
    Version { requested: Version, head: Version },
    #[error("delta channel closed before version {0} arrived")]
    ChannelClosed(Version),
    #[error("delta stream: {0}")]
    Stream(#[from] StreamError),
}

/// State that can ship itself as dirty-gated deltas.
pub trait Distributed {
    /// Serialize the dirty subset and clear the dirty mask.
    fn pack(&mut self, os: &mut OutputStream);
    /// Serialize the full instance state, leaving the mask untouched.
    fn pack_full(&self, os: &mut OutputStream);
    /// Apply one delta or one full instance.
    fn unpack(&mut self, is: &mut InputStream) -> Result<(), StreamError>;
    fn is_dirty(&self) -> bool;
}

/// One committed change set.
#[derive(Debug, Clone)]
pub struct Delta {
    pub version: Version,
    pub payload: Bytes,
}

/// Master side of a replicated object.
pub struct MasterCell<T: Distributed> {
    id: Uuid,
    version: Version,
    body: T,
    head: Arc<Mutex<Version>>,
    subscribers: Vec<crossbeam_channel::Sender<Delta>>,
}

impl<T: Distributed> MasterCell<T> {
    pub fn new(body: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: VERSION_NONE,
            body,
            head: Arc::new(Mutex::new(VERSION_NONE)),
            subscribers: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn reference(&self) -> ObjectVersion {
        ObjectVersion::new(self.id, self.version)
    }

    pub fn body(&self) -> &T {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut T {
        &mut self.body
    }

    /// Commit pending changes as the next version and broadcast the
    /// delta to all mapped slaves. No-op when nothing is dirty.
    pub fn commit(&mut self) -> Option<Delta> {
        if !self.body.is_dirty() {
            return None;
        }
        let mut os = OutputStream::new();
        self.body.pack(&mut os);
        self.version += 1;
        *self.head.lock() = self.version;
        let delta = Delta {
            version: self.version,
            payload: os.into_bytes(),
        };
        self.subscribers
            .retain(|tx| tx.send(delta.clone()).is_ok());
        Some(delta)
    }

    /// Map a new slave at the master's current version. The slave body
    /// is initialized from the full instance data.
    pub fn attach_slave(&mut self, mut body: T) -> Result<SlaveCell<T>, ObjectError> {
        let mut os = OutputStream::new();
        self.body.pack_full(&mut os);
        let mut is = InputStream::new(os.into_bytes());
        body.unpack(&mut is)?;

        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        Ok(SlaveCell {
            id: self.id,
            version: self.version,
            body,
            head: Arc::clone(&self.head),
            rx,
        })
    }
}

/// Slave side of a replicated object.
pub struct SlaveCell<T: Distributed> {
    id: Uuid,
    version: Version,
    body: T,
    head: Arc<Mutex<Version>>,
    rx: crossbeam_channel::Receiver<Delta>,
}

impl<T: Distributed> SlaveCell<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn body(&self) -> &T {
        &self.body
    }

    /// Apply buffered deltas in arrival order until the applied
    /// version reaches `target`. `VERSION_HEAD` catches up to the
    /// master's committed head. Requesting a version past the head is
    /// an error and applies nothing.
    pub fn sync(&mut self, target: Version) -> Result<Version, ObjectError> {
        let head = *self.head.lock();
        let goal = if target == VERSION_HEAD { head } else { target };
        if goal > head {
            return Err(ObjectError::Version {
                requested: goal,
                head,
            });
        }
        while self.version < goal {
            let delta = self
                .rx
                .recv()
                .map_err(|_| ObjectError::ChannelClosed(goal))?;
            let mut is = InputStream::new(delta.payload);
            self.body.unpack(&mut is)?;
            self.version = delta.version;
        }
        Ok(self.version)
    }
}
