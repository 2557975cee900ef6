//! Stable identities for GL objects.
//!
//! A `ResourceId` names a GL object independently of its native handle. Native
//! handles get reused: after `glDeleteTextures`, the driver is free to hand out
//! the same name for the next texture. Resource ids never are. During capture,
//! each id maps to the object's "current" native handle; during replay, the
//! same id maps to whatever "live" handle the replay context created for it.

use crate::error::IdentityError;

use gleam::gl::GLuint;
use serde::Serialize;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A process-wide unique, never reused, identity for a GL object.
///
/// Ids are ordered by creation time, which the capture code uses to tell
/// whether an object was created inside the frame being captured.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ResourceId(u64);

impl ResourceId {
    /// The id of GL's "no object" name, zero.
    pub const NULL: ResourceId = ResourceId(0);

    pub fn fresh() -> ResourceId {
        ResourceId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the id the next call to `fresh` will return, or a later one.
    pub fn peek_next() -> ResourceId {
        ResourceId(NEXT_ID.load(Ordering::Relaxed))
    }

    pub fn is_null(self) -> bool {
        self == ResourceId::NULL
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    /// Reconstitute an id read from a capture.
    pub fn from_raw(raw: u64) -> ResourceId {
        ResourceId(raw)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "res#{}", self.0)
    }
}

macro_rules! resource_kinds {
    ( $( $kind:ident = $code:literal, $shared:expr; )* ) => {
        /// The closed set of GL object types this crate tracks.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        pub enum ResourceKind {
            $( $kind = $code, )*
        }

        impl ResourceKind {
            pub const ALL: &'static [ResourceKind] = &[ $( ResourceKind::$kind, )* ];

            pub fn code(self) -> u32 {
                self as u32
            }

            pub fn from_code(code: u32) -> Option<ResourceKind> {
                match code {
                    $( $code => Some(ResourceKind::$kind), )*
                    _ => None,
                }
            }

            /// True if objects of this kind are visible to every context in a
            /// share group. Container objects belong to a single context.
            pub fn is_shared(self) -> bool {
                match self {
                    $( ResourceKind::$kind => $shared, )*
                }
            }
        }
    }
}

resource_kinds! {
    Buffer = 1, true;
    Texture = 2, true;
    Renderbuffer = 3, true;
    Framebuffer = 4, false;
    VertexArray = 5, false;
    TransformFeedback = 6, false;
    Program = 7, true;
    ProgramPipeline = 8, false;
    Shader = 9, true;
    Query = 10, false;
    Sync = 11, true;
    Sampler = 12, true;
}

impl ResourceKind {
    /// How many updates an idle record may accumulate before the capture layer
    /// stops tracking its history and re-fetches it at each capture instead.
    pub fn high_traffic_threshold(self) -> u32 {
        match self {
            ResourceKind::Buffer => 60,
            ResourceKind::Texture => 20,
            _ => 32,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ContextId(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ShareGroup(pub u32);

/// A GL context, as passed explicitly to the capture layer when it becomes
/// current.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GlContext {
    pub id: ContextId,
    pub share_group: ShareGroup,
}

impl GlContext {
    pub fn new(id: u32, share_group: u32) -> GlContext {
        GlContext {
            id: ContextId(id),
            share_group: ShareGroup(share_group),
        }
    }

    /// The namespace in which this context allocates objects of `kind`.
    pub fn namespace(&self, kind: ResourceKind) -> Namespace {
        if kind.is_shared() {
            Namespace::Shared(self.share_group)
        } else {
            Namespace::Context(self.id)
        }
    }

    /// Whether `resource`'s state can be read while this context is current.
    pub fn can_access(&self, resource: &GlResource) -> bool {
        self.namespace(resource.kind) == resource.namespace
    }

    /// The native object named `name` of type `kind`, as seen from this
    /// context.
    pub fn resource(&self, kind: ResourceKind, name: GLuint) -> GlResource {
        GlResource {
            namespace: self.namespace(kind),
            kind,
            name,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Namespace {
    Shared(ShareGroup),
    Context(ContextId),
}

/// A native GL object: a name, qualified by its type and by the context or
/// share group that allocated it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct GlResource {
    pub namespace: Namespace,
    pub kind: ResourceKind,
    pub name: GLuint,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Capture,
    Replay,
}

/// The mapping between resource ids and native handles.
pub struct ResourceIdentity {
    role: Role,

    /// Capture: the handle each registered id currently names.
    current: HashMap<ResourceId, GlResource>,

    /// Replay: the handle the replay context created for each logged id.
    live: HashMap<ResourceId, GlResource>,

    /// The reverse of whichever of `current` and `live` is in use.
    by_handle: HashMap<GlResource, ResourceId>,

    /// Replay: every id the log being replayed creates somewhere.
    declared: HashSet<ResourceId>,
}

impl ResourceIdentity {
    pub fn new(role: Role) -> ResourceIdentity {
        ResourceIdentity {
            role,
            current: HashMap::new(),
            live: HashMap::new(),
            by_handle: HashMap::new(),
            declared: HashSet::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Assign a fresh id to the newly created object `handle`.
    pub fn register(&mut self, handle: GlResource) -> Result<ResourceId, IdentityError> {
        if let Some(&existing) = self.by_handle.get(&handle) {
            return Err(IdentityError::AlreadyRegistered(handle, existing));
        }
        let id = ResourceId::fresh();
        self.handles_mut().insert(id, handle);
        self.by_handle.insert(handle, id);
        Ok(id)
    }

    /// Forget `id`'s handle, after the object has been deleted. The id is
    /// never handed out again.
    pub fn release(&mut self, id: ResourceId) -> Option<GlResource> {
        let handle = self.handles_mut().remove(&id)?;
        self.by_handle.remove(&handle);
        Some(handle)
    }

    pub fn id_for(&self, handle: &GlResource) -> Option<ResourceId> {
        self.by_handle.get(handle).copied()
    }

    /// Note that the log being replayed creates `id` at some point.
    pub fn declare(&mut self, id: ResourceId) {
        self.declared.insert(id);
    }

    /// Associate the logged `id` with the object replay just created for it.
    pub fn add_live(&mut self, id: ResourceId, handle: GlResource) {
        if let Some(old) = self.live.insert(id, handle) {
            self.by_handle.remove(&old);
        }
        self.by_handle.insert(handle, id);
    }

    pub fn erase_live(&mut self, id: ResourceId) {
        if let Some(handle) = self.live.remove(&id) {
            self.by_handle.remove(&handle);
        }
    }

    /// Return the native handle `id` names in the active role.
    pub fn resolve(&self, id: ResourceId) -> Result<GlResource, IdentityError> {
        if let Some(handle) = self.handles().get(&id) {
            return Ok(*handle);
        }
        if self.role == Role::Replay && self.declared.contains(&id) {
            return Err(IdentityError::NotYetLive(id));
        }
        Err(IdentityError::UnknownResource(id))
    }

    /// Like `resolve`, but return only the GL name, and map `NULL` to zero.
    pub fn resolve_name(&self, id: ResourceId) -> Result<GLuint, IdentityError> {
        if id.is_null() {
            return Ok(0);
        }
        Ok(self.resolve(id)?.name)
    }

    /// Every id with a handle in the active role, and its handle.
    pub fn entries(&self) -> impl Iterator<Item = (ResourceId, GlResource)> + '_ {
        self.handles().iter().map(|(&id, &handle)| (id, handle))
    }

    pub fn len(&self) -> usize {
        self.handles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles().is_empty()
    }

    fn handles(&self) -> &HashMap<ResourceId, GlResource> {
        match self.role {
            Role::Capture => &self.current,
            Role::Replay => &self.live,
        }
    }

    fn handles_mut(&mut self) -> &mut HashMap<ResourceId, GlResource> {
        match self.role {
            Role::Capture => &mut self.current,
            Role::Replay => &mut self.live,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> GlContext {
        GlContext::new(1, 1)
    }

    #[test]
    fn ids_are_never_reused() {
        let mut identity = ResourceIdentity::new(Role::Capture);
        let handle = ctx().resource(ResourceKind::Texture, 7);

        let first = identity.register(handle).unwrap();
        assert_eq!(identity.resolve(first).unwrap(), handle);
        assert_eq!(identity.release(first), Some(handle));

        // The driver hands out the same name again.
        let second = identity.register(handle).unwrap();
        assert_ne!(first, second);
        assert!(second > first);
        assert_eq!(identity.id_for(&handle), Some(second));
        assert_eq!(
            identity.resolve(first),
            Err(IdentityError::UnknownResource(first))
        );
    }

    #[test]
    fn double_registration() {
        let mut identity = ResourceIdentity::new(Role::Capture);
        let handle = ctx().resource(ResourceKind::Buffer, 3);
        let id = identity.register(handle).unwrap();
        assert_eq!(
            identity.register(handle),
            Err(IdentityError::AlreadyRegistered(handle, id))
        );
    }

    #[test]
    fn not_yet_live() {
        let mut identity = ResourceIdentity::new(Role::Replay);
        let logged = ResourceId::from_raw(1000);
        let other = ResourceId::from_raw(1001);
        identity.declare(logged);

        assert_eq!(identity.resolve(logged), Err(IdentityError::NotYetLive(logged)));
        assert_eq!(identity.resolve(other), Err(IdentityError::UnknownResource(other)));

        let live = ctx().resource(ResourceKind::Buffer, 42);
        identity.add_live(logged, live);
        assert_eq!(identity.resolve(logged), Ok(live));
        assert_eq!(identity.resolve_name(logged), Ok(42));
        assert_eq!(identity.resolve_name(ResourceId::NULL), Ok(0));

        identity.erase_live(logged);
        assert_eq!(identity.resolve(logged), Err(IdentityError::NotYetLive(logged)));
    }

    #[test]
    fn container_objects_are_per_context() {
        let a = GlContext::new(1, 9);
        let b = GlContext::new(2, 9);
        let fbo = a.resource(ResourceKind::Framebuffer, 1);
        let tex = a.resource(ResourceKind::Texture, 1);
        assert!(a.can_access(&fbo));
        assert!(!b.can_access(&fbo));
        assert!(b.can_access(&tex));
    }
}
