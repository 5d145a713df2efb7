//! Identity-bearing in-memory handles.
//!
//! A [`Remotable`] is the in-memory side of a slot: two handles are the same
//! object exactly when they share one allocation. Handles are reference
//! counted, so the last clone to drop is the moment the object becomes
//! unreachable. A single reclaim hook can be attached to observe that moment.

use std::any::Any;
use std::cell::OnceCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::TypeError;

static NEXT_REMOTABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Remotable`]. Never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemotableId(u64);

impl RemotableId {
    fn next() -> Self {
        Self(NEXT_REMOTABLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RemotableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type ReclaimHook = Box<dyn FnOnce()>;

struct RemotableCell {
    id: RemotableId,
    label: String,
    payload: Option<Box<dyn Any>>,
    on_reclaim: OnceCell<ReclaimHook>,
}

impl Drop for RemotableCell {
    fn drop(&mut self) {
        if let Some(hook) = self.on_reclaim.take() {
            hook();
        }
    }
}

/// An object with pointer identity that can be marshaled by slot.
#[derive(Clone)]
pub struct Remotable(Rc<RemotableCell>);

impl Remotable {
    /// Create a plain remotable with no payload.
    pub fn new(label: impl Into<String>) -> Self {
        Self(Rc::new(RemotableCell {
            id: RemotableId::next(),
            label: label.into(),
            payload: None,
            on_reclaim: OnceCell::new(),
        }))
    }

    /// Create a remotable that carries manager-specific data.
    pub fn with_payload<T: Any>(label: impl Into<String>, payload: T) -> Self {
        Self(Rc::new(RemotableCell {
            id: RemotableId::next(),
            label: label.into(),
            payload: Some(Box::new(payload)),
            on_reclaim: OnceCell::new(),
        }))
    }

    pub fn id(&self) -> RemotableId {
        self.0.id
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    /// Borrow the payload if it has type `T`.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.0.payload.as_ref()?.downcast_ref::<T>()
    }

    pub fn downgrade(&self) -> WeakRemotable {
        WeakRemotable {
            id: self.0.id,
            inner: Rc::downgrade(&self.0),
        }
    }

    /// Number of live handles to this object.
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Attach the hook that runs when the last handle drops.
    ///
    /// At most one hook may be attached.
    pub fn on_reclaim(&self, hook: impl FnOnce() + 'static) -> Result<(), TypeError> {
        self.0
            .on_reclaim
            .set(Box::new(hook))
            .map_err(|_| TypeError::HookAlreadyRegistered(self.0.id.as_u64()))
    }
}

impl PartialEq for Remotable {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Remotable {}

impl Hash for Remotable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Remotable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Remotable({} {:?})", self.0.id, self.0.label)
    }
}

/// A non-owning back-reference to a [`Remotable`].
#[derive(Clone)]
pub struct WeakRemotable {
    id: RemotableId,
    inner: Weak<RemotableCell>,
}

impl WeakRemotable {
    pub fn id(&self) -> RemotableId {
        self.id
    }

    /// The remotable, if any handle to it is still alive.
    pub fn upgrade(&self) -> Option<Remotable> {
        self.inner.upgrade().map(Remotable)
    }

    pub fn is_live(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for WeakRemotable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakRemotable")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}
