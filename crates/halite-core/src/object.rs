//! The object model.
//!
//! Every host-visible entity implements [`Object`]. The trait exposes the
//! class hierarchy, the interfaces the object answers to and its
//! properties. State shared by all objects (id, owner, name, custom string
//! properties) lives in [`ObjectCore`].
//!
//! # Properties
//!
//! Each object describes its properties with a static table of
//! [`PropertySpec`]s. The table is the source of truth for existence, type,
//! access and qualifier handling: the dispatcher consults it before calling
//! [`Object::get_property`] or [`Object::set_property`], so implementations
//! only ever see values of the declared kind.

use std::any::Any;
use std::sync::{Arc, RwLock, Weak};

use crate::context::Context;
use crate::error::{Error, Missing, Result};
use crate::registry::Registry;
use crate::types::{class, custom_type, selector, ClassId, ObjectId, PropertyAddress, PropertySelector};
use crate::value::{CustomPropertyInfo, Value, ValueKind};

// =============================================================================
// Interfaces
// =============================================================================

/// Capabilities an object can be queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interface {
    /// Base reference counting interface, answered by every object.
    Unknown,
    /// The driver entry interface, answered by the plugin.
    Driver,
    /// Property access.
    Properties,
    /// IO cycle operations.
    Io,
}

impl Interface {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "unknown interface",
            Self::Driver => "driver interface",
            Self::Properties => "property interface",
            Self::Io => "IO interface",
        }
    }
}

/// Result of a successful interface query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceBinding {
    pub interface: Interface,
    pub object: ObjectId,
}

// =============================================================================
// Property descriptors
// =============================================================================

/// Who may access a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    ReadWrite,
}

impl Access {
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

/// How a property uses the qualifier argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    /// The qualifier is ignored.
    None,
    /// An optional qualifier of this kind.
    Optional(ValueKind),
    /// A mandatory qualifier of this kind.
    Required(ValueKind),
    /// The input arrives in the output buffer and is converted in place.
    InPlace,
}

/// Static description of one property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySpec {
    pub selector: PropertySelector,
    pub kind: ValueKind,
    pub access: Access,
    pub qualifier: Qualifier,
}

impl PropertySpec {
    pub const fn read(selector: PropertySelector, kind: ValueKind) -> Self {
        Self {
            selector,
            kind,
            access: Access::Read,
            qualifier: Qualifier::None,
        }
    }

    pub const fn read_write(selector: PropertySelector, kind: ValueKind) -> Self {
        Self {
            selector,
            kind,
            access: Access::ReadWrite,
            qualifier: Qualifier::None,
        }
    }

    pub const fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = qualifier;
        self
    }
}

/// Properties every object has.
pub const BASE_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::read(selector::BASE_CLASS, ValueKind::U32),
    PropertySpec::read(selector::CLASS, ValueKind::U32),
    PropertySpec::read(selector::OWNER, ValueKind::Object),
    PropertySpec::read(selector::NAME, ValueKind::String),
    PropertySpec::read(selector::MANUFACTURER, ValueKind::String),
    PropertySpec::read(selector::OWNED_OBJECTS, ValueKind::ObjectList)
        .with_qualifier(Qualifier::Optional(ValueKind::U32List)),
    PropertySpec::read(selector::CUSTOM_PROPERTY_INFO_LIST, ValueKind::CustomInfoList),
];

// =============================================================================
// ObjectCore
// =============================================================================

struct CustomProperty {
    selector: PropertySelector,
    writable: bool,
    value: String,
}

/// State shared by all objects.
pub struct ObjectCore {
    id: ObjectId,
    owner: ObjectId,
    /// Class chain, most derived first. Always ends with the object class.
    classes: &'static [ClassId],
    context: Weak<Context>,
    name: RwLock<String>,
    manufacturer: RwLock<String>,
    custom: RwLock<Vec<CustomProperty>>,
}

impl ObjectCore {
    pub fn new(context: &Arc<Context>, id: ObjectId, owner: ObjectId, classes: &'static [ClassId]) -> Self {
        Self::with_context(Arc::downgrade(context), id, owner, classes)
    }

    /// Core with no context. Notifications go nowhere.
    pub fn detached(id: ObjectId, owner: ObjectId, classes: &'static [ClassId]) -> Self {
        Self::with_context(Weak::new(), id, owner, classes)
    }

    fn with_context(context: Weak<Context>, id: ObjectId, owner: ObjectId, classes: &'static [ClassId]) -> Self {
        debug_assert!(!classes.is_empty());
        Self {
            id,
            owner,
            classes,
            context,
            name: RwLock::new(String::new()),
            manufacturer: RwLock::new(String::new()),
            custom: RwLock::new(Vec::new()),
        }
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        *self.name.write().unwrap_or_else(|e| e.into_inner()) = name.into();
        self
    }

    pub fn with_manufacturer(self, manufacturer: impl Into<String>) -> Self {
        *self.manufacturer.write().unwrap_or_else(|e| e.into_inner()) = manufacturer.into();
        self
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn owner(&self) -> ObjectId {
        self.owner
    }

    pub fn class_id(&self) -> ClassId {
        self.classes.first().copied().unwrap_or(class::OBJECT)
    }

    pub fn base_class_id(&self) -> ClassId {
        self.classes.get(1).copied().unwrap_or(class::OBJECT)
    }

    /// True if `class` is this object's class or one of its ancestors.
    pub fn is_instance(&self, class: ClassId) -> bool {
        class == class::OBJECT || self.classes.contains(&class)
    }

    pub fn name(&self) -> String {
        self.name.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Rename the object and notify the host.
    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write().unwrap_or_else(|e| e.into_inner()) = name.into();
        self.notify(&[selector::NAME]);
    }

    pub fn manufacturer(&self) -> String {
        self.manufacturer.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The owning context.
    ///
    /// Fails once the driver instance is gone.
    pub fn context(&self) -> Result<Arc<Context>> {
        self.context.upgrade().ok_or(Error::AlreadyRetiring(self.id))
    }

    /// Notify the host that global properties of this object changed.
    pub fn notify(&self, selectors: &[PropertySelector]) {
        let addresses: Vec<_> = selectors.iter().map(|&s| PropertyAddress::global(s)).collect();
        self.notify_addresses(&addresses);
    }

    pub fn notify_addresses(&self, addresses: &[PropertyAddress]) {
        if let Some(context) = self.context.upgrade() {
            context.notify(self.id, addresses);
        }
    }

    // -------------------------------------------------------------------------
    // Custom properties
    // -------------------------------------------------------------------------

    /// Add a string property under a selector of the caller's choosing.
    ///
    /// Fails if the selector is already a base property or already added.
    pub fn add_custom_property(
        &self,
        selector: PropertySelector,
        initial: impl Into<String>,
        writable: bool,
    ) -> Result<()> {
        if BASE_PROPERTIES.iter().any(|p| p.selector == selector) {
            return Err(Error::InvalidValue(format!(
                "{} is a built-in property",
                halite_utils::code_to_string(selector)
            )));
        }
        let mut custom = self.custom.write().unwrap_or_else(|e| e.into_inner());
        if custom.iter().any(|p| p.selector == selector) {
            return Err(Error::InvalidValue(format!(
                "custom property {} already exists",
                halite_utils::code_to_string(selector)
            )));
        }
        custom.push(CustomProperty {
            selector,
            writable,
            value: initial.into(),
        });
        drop(custom);
        self.notify(&[selector::CUSTOM_PROPERTY_INFO_LIST]);
        Ok(())
    }

    pub fn custom_property(&self, selector: PropertySelector) -> Option<String> {
        self.custom
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|p| p.selector == selector)
            .map(|p| p.value.clone())
    }

    /// Store a new value for a custom property and notify the host.
    pub fn set_custom_property(&self, selector: PropertySelector, value: impl Into<String>) -> Result<()> {
        let mut custom = self.custom.write().unwrap_or_else(|e| e.into_inner());
        let property = custom
            .iter_mut()
            .find(|p| p.selector == selector)
            .ok_or(Error::NotFound(Missing::Property(selector)))?;
        property.value = value.into();
        drop(custom);
        self.notify(&[selector]);
        Ok(())
    }

    fn custom_spec(&self, selector: PropertySelector) -> Option<PropertySpec> {
        self.custom
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|p| p.selector == selector)
            .map(|p| {
                if p.writable {
                    PropertySpec::read_write(selector, ValueKind::String)
                } else {
                    PropertySpec::read(selector, ValueKind::String)
                }
            })
    }

    fn custom_info(&self) -> Vec<CustomPropertyInfo> {
        self.custom
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|p| CustomPropertyInfo {
                selector: p.selector,
                data_type: custom_type::STRING,
                qualifier_type: custom_type::NONE,
            })
            .collect()
    }

    /// Write a custom property. Every other base property is read-only.
    pub fn set_base_property(&self, address: &PropertyAddress, value: &Value) -> Result<()> {
        match self.custom_spec(address.selector) {
            Some(spec) if spec.access.is_writable() => {
                self.set_custom_property(address.selector, value.as_str()?)
            }
            Some(_) => Err(Error::NotWritable(address.selector)),
            None if BASE_PROPERTIES.iter().any(|p| p.selector == address.selector) => {
                Err(Error::NotWritable(address.selector))
            }
            None => Err(Error::NotFound(Missing::Property(address.selector))),
        }
    }
}

impl std::fmt::Debug for ObjectCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCore")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("class", &halite_utils::code_to_string(self.class_id()))
            .finish()
    }
}

// =============================================================================
// Object
// =============================================================================

/// A host-visible object.
pub trait Object: Any + Send + Sync {
    fn core(&self) -> &ObjectCore;

    fn as_any(&self) -> &dyn Any;

    fn id(&self) -> ObjectId {
        self.core().id()
    }

    fn owner(&self) -> ObjectId {
        self.core().owner()
    }

    fn class_id(&self) -> ClassId {
        self.core().class_id()
    }

    fn base_class_id(&self) -> ClassId {
        self.core().base_class_id()
    }

    fn is_instance(&self, class: ClassId) -> bool {
        self.core().is_instance(class)
    }

    /// Interfaces this object answers to.
    fn interfaces(&self) -> &'static [Interface] {
        &[Interface::Unknown, Interface::Properties]
    }

    /// Resolve an interface on this object.
    ///
    /// Idempotent: the same query always yields the same binding.
    fn query_interface(&self, interface: Interface) -> Result<InterfaceBinding> {
        if self.interfaces().contains(&interface) {
            Ok(InterfaceBinding {
                interface,
                object: self.id(),
            })
        } else {
            Err(Error::NotSupported(interface.name()))
        }
    }

    /// Properties specific to this object's class.
    fn property_specs(&self) -> &'static [PropertySpec] {
        &[]
    }

    /// Find the descriptor for an address.
    fn find_property(&self, address: &PropertyAddress) -> Option<PropertySpec> {
        self.property_specs()
            .iter()
            .chain(BASE_PROPERTIES)
            .find(|p| p.selector == address.selector)
            .copied()
            .or_else(|| self.core().custom_spec(address.selector))
    }

    fn has_property(&self, address: &PropertyAddress) -> bool {
        self.find_property(address).is_some()
    }

    /// Ids of the objects owned by this object.
    fn owned_objects(&self) -> Vec<ObjectId> {
        Vec::new()
    }

    /// Read a property.
    ///
    /// `qualifier` is decoded according to the property's descriptor.
    /// Implementations handle their own selectors and fall back to
    /// [`base_property`] for the rest.
    fn get_property(&self, address: &PropertyAddress, qualifier: Option<&Value>) -> Result<Value>;

    /// Write a property.
    ///
    /// `value` already has the declared kind. Implementations validate it
    /// completely before changing any state.
    fn set_property(&self, address: &PropertyAddress, value: &Value) -> Result<()> {
        self.core().set_base_property(address, value)
    }

    /// Unregister objects owned by this one. Called once when it retires.
    fn retire_children(&self, _registry: &Registry) {}
}

/// Read one of the properties every object has.
pub fn base_property(object: &dyn Object, address: &PropertyAddress, qualifier: Option<&Value>) -> Result<Value> {
    let core = object.core();
    let value = match address.selector {
        selector::BASE_CLASS => Value::U32(object.base_class_id()),
        selector::CLASS => Value::U32(object.class_id()),
        selector::OWNER => Value::Object(object.owner()),
        selector::NAME => Value::String(core.name()),
        selector::MANUFACTURER => Value::String(core.manufacturer()),
        selector::OWNED_OBJECTS => {
            let owned = object.owned_objects();
            let owned = match qualifier {
                Some(classes) => filter_by_class(core, owned, &classes.as_u32_list()?),
                None => owned,
            };
            Value::ObjectList(owned)
        }
        selector::CUSTOM_PROPERTY_INFO_LIST => Value::CustomInfoList(core.custom_info()),
        other => core
            .custom_property(other)
            .map(Value::String)
            .ok_or(Error::NotFound(Missing::Property(other)))?,
    };
    Ok(value)
}

/// Keep the objects that are instances of any class in `classes`.
///
/// An empty class list keeps everything.
fn filter_by_class(core: &ObjectCore, ids: Vec<ObjectId>, classes: &[ClassId]) -> Vec<ObjectId> {
    if classes.is_empty() {
        return ids;
    }
    let Ok(context) = core.context() else {
        return Vec::new();
    };
    let registry = context.registry();
    ids.into_iter()
        .filter(|&id| {
            registry
                .lookup(id)
                .is_some_and(|child| classes.iter().any(|&c| child.is_instance(c)))
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts how often the probed object was dropped.
    #[derive(Clone, Default)]
    pub struct Probe(Arc<AtomicUsize>);

    impl Probe {
        pub fn drop_count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }

        pub fn is_dropped(&self) -> bool {
            self.drop_count() > 0
        }
    }

    /// Minimal object for registry tests.
    pub struct ProbeObject {
        core: ObjectCore,
        probe: Probe,
    }

    impl ProbeObject {
        pub fn new(id: ObjectId, probe: Probe) -> Self {
            Self {
                core: ObjectCore::detached(id, ObjectId::UNKNOWN, &[class::OBJECT]),
                probe,
            }
        }
    }

    impl Drop for ProbeObject {
        fn drop(&mut self) {
            self.probe.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl Object for ProbeObject {
        fn core(&self) -> &ObjectCore {
            &self.core
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn get_property(&self, address: &PropertyAddress, qualifier: Option<&Value>) -> Result<Value> {
            base_property(self, address, qualifier)
        }
    }
}
