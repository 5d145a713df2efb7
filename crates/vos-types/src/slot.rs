use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// The category of thing a slot names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SlotType {
    /// An object: plain export, virtual instance, or imported presence.
    Object,
    /// A device node.
    Device,
    /// A promise.
    Promise,
}

impl SlotType {
    fn tag(self) -> char {
        match self {
            Self::Object => 'o',
            Self::Device => 'd',
            Self::Promise => 'p',
        }
    }

    fn from_tag(c: char) -> Option<Self> {
        match c {
            'o' => Some(Self::Object),
            'd' => Some(Self::Device),
            'p' => Some(Self::Promise),
            _ => None,
        }
    }
}

impl fmt::Display for SlotType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => write!(f, "object"),
            Self::Device => write!(f, "device"),
            Self::Promise => write!(f, "promise"),
        }
    }
}

/// Which side allocated the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Allocator {
    /// Allocated by this process (`+`).
    Local,
    /// Allocated elsewhere and imported (`-`).
    Remote,
}

impl Allocator {
    fn sign(self) -> char {
        match self {
            Self::Local => '+',
            Self::Remote => '-',
        }
    }
}

/// Stable identifier for a persisted object, import, or collection.
///
/// Text form: `<type><allocator>[d]<id>[/<instance>]`, for example `o+5`
/// (plain export), `o-3` (import), `o+12/4` (instance 4 of kind 12), and
/// `o+d12/4` (durable instance). Slots are immutable and never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slot {
    slot_type: SlotType,
    allocator: Allocator,
    id: u64,
    instance: Option<u64>,
    durable: bool,
}

impl Slot {
    /// A plain object exported by this process.
    pub const fn export(id: u64) -> Self {
        Self {
            slot_type: SlotType::Object,
            allocator: Allocator::Local,
            id,
            instance: None,
            durable: false,
        }
    }

    /// An object imported from another process (a presence).
    pub const fn import(id: u64) -> Self {
        Self {
            slot_type: SlotType::Object,
            allocator: Allocator::Remote,
            id,
            instance: None,
            durable: false,
        }
    }

    /// A promise slot.
    pub const fn promise(id: u64, allocator: Allocator) -> Self {
        Self {
            slot_type: SlotType::Promise,
            allocator,
            id,
            instance: None,
            durable: false,
        }
    }

    /// A device slot.
    pub const fn device(id: u64, allocator: Allocator) -> Self {
        Self {
            slot_type: SlotType::Device,
            allocator,
            id,
            instance: None,
            durable: false,
        }
    }

    /// Instance `instance` of the virtual kind `kind_id`.
    pub const fn virtual_instance(kind_id: u64, instance: u64, durable: bool) -> Self {
        Self {
            slot_type: SlotType::Object,
            allocator: Allocator::Local,
            id: kind_id,
            instance: Some(instance),
            durable,
        }
    }

    pub fn slot_type(&self) -> SlotType {
        self.slot_type
    }

    pub fn allocator(&self) -> Allocator {
        self.allocator
    }

    /// The primary id: export number, import number, or kind id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The instance number, for virtual instances only.
    pub fn instance(&self) -> Option<u64> {
        self.instance
    }

    /// The kind id, for virtual instances only.
    pub fn kind_id(&self) -> Option<u64> {
        self.instance.map(|_| self.id)
    }

    /// Returns `true` for virtual object instances (paged through a store).
    pub fn is_virtual(&self) -> bool {
        self.instance.is_some()
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_local(&self) -> bool {
        self.allocator == Allocator::Local
    }

    pub fn is_object(&self) -> bool {
        self.slot_type == SlotType::Object
    }

    fn invalid(text: &str, reason: impl Into<String>) -> TypeError {
        TypeError::InvalidSlot {
            slot: text.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.slot_type.tag(), self.allocator.sign())?;
        if self.durable {
            write!(f, "d")?;
        }
        write!(f, "{}", self.id)?;
        if let Some(instance) = self.instance {
            write!(f, "/{instance}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({self})")
    }
}

fn parse_number(text: &str, part: &str) -> Result<u64, TypeError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Slot::invalid(text, format!("expected decimal digits, got {part:?}")));
    }
    if part.len() > 1 && part.starts_with('0') {
        return Err(Slot::invalid(text, "leading zero"));
    }
    part.parse::<u64>()
        .map_err(|e| Slot::invalid(text, e.to_string()))
}

impl FromStr for Slot {
    type Err = TypeError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut chars = text.chars();
        let slot_type = chars
            .next()
            .and_then(SlotType::from_tag)
            .ok_or_else(|| Self::invalid(text, "unknown type tag"))?;
        let allocator = match chars.next() {
            Some('+') => Allocator::Local,
            Some('-') => Allocator::Remote,
            _ => return Err(Self::invalid(text, "missing allocator sign")),
        };
        let rest = chars.as_str();
        let (durable, rest) = match rest.strip_prefix('d') {
            Some(stripped) => (true, stripped),
            None => (false, rest),
        };
        let (id, instance) = match rest.split_once('/') {
            Some((id, instance)) => (
                parse_number(text, id)?,
                Some(parse_number(text, instance)?),
            ),
            None => (parse_number(text, rest)?, None),
        };

        if instance.is_some() {
            if slot_type != SlotType::Object {
                return Err(Self::invalid(text, "only objects can be virtual"));
            }
            if allocator != Allocator::Local {
                return Err(Self::invalid(text, "virtual instances are always local"));
            }
        } else if durable {
            return Err(Self::invalid(text, "durable flag requires an instance"));
        }

        Ok(Self {
            slot_type,
            allocator,
            id,
            instance,
            durable,
        })
    }
}

impl TryFrom<String> for Slot {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Slot> for String {
    fn from(slot: Slot) -> Self {
        slot.to_string()
    }
}

/// Allocation namespace for fresh identifiers.
///
/// Every tag has its own monotonically increasing counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KindTag {
    /// Plain exports and kind ids (`o+N`).
    Export,
    /// Locally allocated promises (`p+N`).
    Promise,
    /// Collection ids. Not slot-bearing on its own.
    Collection,
    /// Instances of one virtual kind (`o+K/N`).
    Instance { kind_id: u64, durable: bool },
}

impl KindTag {
    /// Name of the counter backing this tag.
    ///
    /// Durable and ephemeral instances of the same kind share one counter.
    pub fn counter_name(&self) -> String {
        match self {
            Self::Export => "export".to_string(),
            Self::Promise => "promise".to_string(),
            Self::Collection => "collection".to_string(),
            Self::Instance { kind_id, .. } => format!("instance.{kind_id}"),
        }
    }

    /// The slot the `n`th allocation under this tag names, if any.
    pub fn slot_for(&self, n: u64) -> Option<Slot> {
        match *self {
            Self::Export => Some(Slot::export(n)),
            Self::Promise => Some(Slot::promise(n, Allocator::Local)),
            Self::Collection => None,
            Self::Instance { kind_id, durable } => {
                Some(Slot::virtual_instance(kind_id, n, durable))
            }
        }
    }
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.counter_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display_forms() {
        assert_eq!(Slot::export(5).to_string(), "o+5");
        assert_eq!(Slot::import(3).to_string(), "o-3");
        assert_eq!(Slot::virtual_instance(12, 4, false).to_string(), "o+12/4");
        assert_eq!(Slot::virtual_instance(12, 4, true).to_string(), "o+d12/4");
        assert_eq!(Slot::promise(7, Allocator::Local).to_string(), "p+7");
        assert_eq!(Slot::device(2, Allocator::Remote).to_string(), "d-2");
    }

    #[test]
    fn parse_virtual_instance() {
        let slot: Slot = "o+12/4".parse().unwrap();
        assert!(slot.is_virtual());
        assert!(!slot.is_durable());
        assert_eq!(slot.kind_id(), Some(12));
        assert_eq!(slot.instance(), Some(4));
    }

    #[test]
    fn parse_durable_instance() {
        let slot: Slot = "o+d3/1".parse().unwrap();
        assert!(slot.is_durable());
        assert_eq!(slot, Slot::virtual_instance(3, 1, true));
    }

    #[test]
    fn parse_import() {
        let slot: Slot = "o-9".parse().unwrap();
        assert!(!slot.is_local());
        assert!(!slot.is_virtual());
        assert_eq!(slot.kind_id(), None);
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "o", "x+1", "o*1", "o+", "o+a", "o+1/", "o+01", "p+1/2", "o-1/2", "o+d5"] {
            assert!(bad.parse::<Slot>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn serde_uses_text_form() {
        let slot = Slot::virtual_instance(2, 9, false);
        let json = serde_json::to_string(&slot).unwrap();
        assert_eq!(json, "\"o+2/9\"");
        let back: Slot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, slot);
        assert!(serde_json::from_str::<Slot>("\"nonsense\"").is_err());
    }

    #[test]
    fn kind_tag_allocation() {
        assert_eq!(KindTag::Export.slot_for(4), Some(Slot::export(4)));
        assert_eq!(KindTag::Collection.slot_for(4), None);
        let tag = KindTag::Instance {
            kind_id: 7,
            durable: true,
        };
        assert_eq!(tag.slot_for(1), Some(Slot::virtual_instance(7, 1, true)));
        assert_eq!(
            tag.counter_name(),
            KindTag::Instance {
                kind_id: 7,
                durable: false
            }
            .counter_name()
        );
    }

    proptest! {
        #[test]
        fn text_form_parses_back(kind in 0u64..10_000, instance in proptest::option::of(0u64..10_000), durable: bool) {
            let slot = match instance {
                Some(n) => Slot::virtual_instance(kind, n, durable),
                None => Slot::export(kind),
            };
            let parsed: Slot = slot.to_string().parse().unwrap();
            prop_assert_eq!(parsed, slot);
        }
    }
}
