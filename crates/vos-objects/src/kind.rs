use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use vos_types::{Slot, Value};

use crate::error::VomResult;
use crate::manager::VirtualObjectManager;
use crate::object::VirtualObject;
use crate::state::StateView;

type Initializer = Box<dyn Fn(&[Value]) -> VomResult<BTreeMap<String, Value>>>;
type Method = Box<dyn Fn(&mut StateView<'_>, &[Value]) -> VomResult<Value>>;

/// Behavior shared by every instance of a kind.
///
/// The initializer fixes the set of fields; methods may read and write
/// those fields through a [`StateView`] but cannot add new ones.
///
/// ```ignore
/// let counter = KindDefinition::new("counter", |_| {
///     Ok(BTreeMap::from([("count".to_string(), Value::Int(0))]))
/// })
/// .method("increment", |state, _| {
///     let next = state.get("count")?.as_int()? + 1;
///     state.set("count", next)?;
///     Ok(Value::Int(next))
/// });
/// ```
pub struct KindDefinition {
    tag: String,
    init: Initializer,
    methods: BTreeMap<String, Method>,
}

impl KindDefinition {
    pub fn new(
        tag: impl Into<String>,
        init: impl Fn(&[Value]) -> VomResult<BTreeMap<String, Value>> + 'static,
    ) -> Self {
        Self {
            tag: tag.into(),
            init: Box::new(init),
            methods: BTreeMap::new(),
        }
    }

    /// Add a named method. A later method with the same name replaces it.
    pub fn method(
        mut self,
        name: impl Into<String>,
        body: impl Fn(&mut StateView<'_>, &[Value]) -> VomResult<Value> + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Box::new(body));
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    pub(crate) fn initial_state(&self, args: &[Value]) -> VomResult<BTreeMap<String, Value>> {
        (self.init)(args)
    }

    pub(crate) fn find_method(
        &self,
        name: &str,
    ) -> Option<&dyn Fn(&mut StateView<'_>, &[Value]) -> VomResult<Value>> {
        self.methods.get(name).map(|m| m.as_ref())
    }
}

impl fmt::Debug for KindDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindDefinition")
            .field("tag", &self.tag)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A registered kind.
#[derive(Debug)]
pub(crate) struct KindRecord {
    pub(crate) kind_id: u64,
    pub(crate) durable: bool,
    pub(crate) definition: KindDefinition,
}

/// Handle returned by kind registration; makes new instances.
#[derive(Clone)]
pub struct KindHandle {
    vom: VirtualObjectManager,
    kind: Rc<KindRecord>,
}

impl KindHandle {
    pub(crate) fn new(vom: VirtualObjectManager, kind: Rc<KindRecord>) -> Self {
        Self { vom, kind }
    }

    pub fn kind_id(&self) -> u64 {
        self.kind.kind_id
    }

    pub fn tag(&self) -> &str {
        self.kind.definition.tag()
    }

    pub fn is_durable(&self) -> bool {
        self.kind.durable
    }

    /// Create a new instance: allocate its slot, persist its initial record,
    /// and return its representative.
    pub fn instantiate(&self, args: &[Value]) -> VomResult<VirtualObject> {
        self.vom.instantiate(&self.kind, args)
    }

    /// Returns `true` if `slot` names an instance of this kind.
    pub fn owns(&self, slot: &Slot) -> bool {
        slot.is_virtual() && slot.kind_id() == Some(self.kind.kind_id)
    }
}

impl fmt::Debug for KindHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindHandle")
            .field("kind_id", &self.kind.kind_id)
            .field("tag", &self.kind.definition.tag())
            .field("durable", &self.kind.durable)
            .finish()
    }
}
