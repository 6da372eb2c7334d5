//! Per-process object registry.
//!
//! Objects are registered by their owning process and mapped by peers
//! on first reference. Packet addressing uses compact 64-bit route
//! ids assigned at attach time; full UUIDs travel only inside
//! `ObjectVersion` references.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use super::{ObjectError, ObjectVersion, Role, Version, VERSION_HEAD};
use super::stream::InputStream;

/// Session-local packet address of an attached object.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct RouteId(pub u64);

impl RouteId {
    pub const fn high(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn low(self) -> u32 {
        self.0 as u32
    }

    pub const fn from_halves(high: u32, low: u32) -> Self {
        RouteId(((high as u64) << 32) | low as u64)
    }
}

impl std::fmt::Display for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "route-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Registration {
    pub route: RouteId,
    pub role: Role,
}

/// Object registry of one process.
#[derive(Debug, Default)]
pub struct LocalNode {
    objects: HashMap<Uuid, Registration>,
    by_route: HashMap<RouteId, Uuid>,
    next_route: u64,
}

impl LocalNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an object, allocating its route id.
    pub fn attach(&mut self, id: Uuid, role: Role) -> Result<RouteId, ObjectError> {
        if self.objects.contains_key(&id) {
            return Err(ObjectError::AlreadyMapped(id));
        }
        self.next_route += 1;
        let route = RouteId(self.next_route);
        self.objects.insert(id, Registration { route, role });
        self.by_route.insert(route, id);
        debug!(target = "object::registry", object = %id, %route, "attached");
        Ok(route)
    }

    pub fn detach(&mut self, id: Uuid) -> bool {
        match self.objects.remove(&id) {
            Some(registration) => {
                self.by_route.remove(&registration.route);
                debug!(target = "object::registry", object = %id, "detached");
                true
            }
            None => false,
        }
    }

    pub fn registration(&self, id: Uuid) -> Option<Registration> {
        self.objects.get(&id).copied()
    }

    pub fn route_of(&self, id: Uuid) -> Result<RouteId, ObjectError> {
        self.objects
            .get(&id)
            .map(|registration| registration.route)
            .ok_or(ObjectError::Unmapped(id))
    }

    pub fn object_at(&self, route: RouteId) -> Result<Uuid, ObjectError> {
        self.by_route
            .get(&route)
            .copied()
            .ok_or(ObjectError::UnmappedRoute(route.0))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// A child element of a replicated object list.
pub trait ChildObject {
    fn id(&self) -> Uuid;
    fn is_attached(&self) -> bool;
    fn is_master(&self) -> bool;
    /// Adopt the identity and version of a serialized reference.
    fn adopt(&mut self, reference: ObjectVersion);
    /// Catch up to the given version (`VERSION_HEAD` for masters).
    fn sync_to(&mut self, version: Version) -> Result<Version, ObjectError>;
}

/// The object owning a child list; allocates and reclaims children.
pub trait ChildOwner<C: ChildObject> {
    fn create_child(&mut self) -> C;
    fn release_child(&mut self, child: C);
    fn is_master(&self) -> bool;
}

/// Rebuild a child list from its serialized form.
///
/// Existing children are synced to the serialized version (masters to
/// head), new children are allocated by the owner and mapped at the
/// serialized version, and children absent from the stream are
/// unmapped and released. A zero uuid keeps a null placeholder slot.
pub fn deserialize_children<C, O>(
    node: &mut LocalNode,
    is: &mut InputStream,
    owner: &mut O,
    old: Vec<Option<C>>,
) -> Result<Vec<Option<C>>, ObjectError>
where
    C: ChildObject,
    O: ChildOwner<C>,
{
    let references = is.read_object_versions()?;
    let mut old: Vec<C> = old.into_iter().flatten().collect();
    let mut result = Vec::with_capacity(references.len());

    for reference in references {
        if reference.is_none() {
            result.push(None);
            continue;
        }

        if let Some(pos) = old.iter().position(|child| child.id() == reference.id) {
            let mut child = old.remove(pos);
            if owner.is_master() {
                child.sync_to(VERSION_HEAD)?;
            } else {
                child.sync_to(reference.version)?;
            }
            result.push(Some(child));
        } else {
            let mut child = owner.create_child();
            child.adopt(reference);
            node.attach(reference.id, Role::Slave)?;
            result.push(Some(child));
        }
    }

    for child in old {
        if child.is_attached() && !child.is_master() {
            node.detach(child.id());
        }
        owner.release_child(child);
    }

    Ok(result)
}
