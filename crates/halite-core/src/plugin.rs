//! The plugin object.
//!
//! Root of the object tree. It always has id [`ObjectId::PLUGIN`] and owns
//! the devices the driver publishes.

use std::any::Any;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::device::{Device, DeviceParameters};
use crate::error::{Error, Missing, Result};
use crate::object::{base_property, Interface, Object, ObjectCore, PropertySpec, Qualifier};
use crate::registry::{ObjectRef, Registry};
use crate::types::{class, selector, ClassId, ObjectId, PropertyAddress};
use crate::value::{Value, ValueKind};

const CLASSES: &[ClassId] = &[class::PLUGIN, class::OBJECT];

const PROPERTIES: &[PropertySpec] = &[
    PropertySpec::read(selector::DEVICE_LIST, ValueKind::ObjectList),
    PropertySpec::read(selector::TRANSLATE_UID_TO_DEVICE, ValueKind::Object)
        .with_qualifier(Qualifier::Required(ValueKind::String)),
    PropertySpec::read(selector::BOX_LIST, ValueKind::ObjectList),
    PropertySpec::read(selector::CLOCK_DEVICE_LIST, ValueKind::ObjectList),
    PropertySpec::read(selector::RESOURCE_BUNDLE, ValueKind::String),
];

/// Construction parameters of the plugin.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginParameters {
    pub manufacturer: String,
    /// Path of the resource bundle, relative to the driver bundle.
    pub resource_bundle: String,
}

impl PluginParameters {
    pub fn new(manufacturer: impl Into<String>) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            ..Self::default()
        }
    }

    pub fn with_resource_bundle(mut self, path: impl Into<String>) -> Self {
        self.resource_bundle = path.into();
        self
    }
}

/// The plugin object.
pub struct Plugin {
    core: ObjectCore,
    resource_bundle: String,
    devices: RwLock<Vec<ObjectId>>,
}

impl Plugin {
    pub fn new(context: &Arc<Context>, params: PluginParameters) -> Self {
        Self {
            core: ObjectCore::new(context, ObjectId::PLUGIN, ObjectId::UNKNOWN, CLASSES)
                .with_name(params.manufacturer.clone())
                .with_manufacturer(params.manufacturer),
            resource_bundle: params.resource_bundle,
            devices: RwLock::new(Vec::new()),
        }
    }

    /// Register and activate the plugin in `context`.
    pub fn install(context: &Arc<Context>, params: PluginParameters) -> Result<ObjectRef> {
        let registry = context.registry();
        registry.insert(Box::new(Self::new(context, params)))?;
        registry.activate(ObjectId::PLUGIN)?;
        registry.get(ObjectId::PLUGIN)
    }

    /// Create, register and activate a device.
    pub fn add_device(&self, params: DeviceParameters) -> Result<ObjectId> {
        params.validate()?;
        let context = self.core.context()?;
        let id = {
            // Held across the UID check and the push so two devices can
            // never claim the same UID.
            let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
            if !params.device_uid.is_empty()
                && find_by_uid(context.registry(), &devices, &params.device_uid).is_some()
            {
                return Err(Error::InvalidValue(format!(
                    "device uid {:?} is already in use",
                    params.device_uid
                )));
            }
            let id = context
                .registry()
                .register(|id| Device::new(&context, id, ObjectId::PLUGIN, params))?;
            devices.push(id);
            id
        };
        context.registry().activate(id)?;
        log::info!("plugin: added device {id}");
        self.core
            .notify(&[selector::DEVICE_LIST, selector::OWNED_OBJECTS]);
        Ok(id)
    }

    /// Retire a device and everything it owns.
    pub fn remove_device(&self, id: ObjectId) -> Result<()> {
        {
            let mut devices = self.devices.write().unwrap_or_else(|e| e.into_inner());
            let index = devices
                .iter()
                .position(|d| *d == id)
                .ok_or(Error::NotFound(Missing::Device(id)))?;
            devices.remove(index);
        }
        self.core.context()?.registry().unregister(id)?;
        log::info!("plugin: removed device {id}");
        self.core
            .notify(&[selector::DEVICE_LIST, selector::OWNED_OBJECTS]);
        Ok(())
    }

    pub fn devices(&self) -> Vec<ObjectId> {
        self.devices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Pin one of this plugin's devices.
    pub fn device(&self, id: ObjectId) -> Result<ObjectRef> {
        if !self.devices().contains(&id) {
            return Err(Error::NotFound(Missing::Device(id)));
        }
        let device = self.core.context()?.registry().get(id)?;
        if device.downcast_ref::<Device>().is_none() {
            return Err(Error::NotFound(Missing::Device(id)));
        }
        Ok(device)
    }

    /// Find a device by its UID.
    pub fn device_by_uid(&self, uid: &str) -> Option<ObjectId> {
        let context = self.core.context().ok()?;
        find_by_uid(context.registry(), &self.devices(), uid)
    }
}

fn find_by_uid(registry: &Registry, devices: &[ObjectId], uid: &str) -> Option<ObjectId> {
    devices.iter().copied().find(|&id| {
        registry
            .lookup(id)
            .is_some_and(|pin| pin.downcast_ref::<Device>().is_some_and(|d| d.uid() == uid))
    })
}

impl Object for Plugin {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn interfaces(&self) -> &'static [Interface] {
        &[Interface::Unknown, Interface::Driver, Interface::Properties]
    }

    fn property_specs(&self) -> &'static [PropertySpec] {
        PROPERTIES
    }

    fn owned_objects(&self) -> Vec<ObjectId> {
        self.devices()
    }

    fn get_property(&self, address: &PropertyAddress, qualifier: Option<&Value>) -> Result<Value> {
        let value = match address.selector {
            selector::DEVICE_LIST => Value::ObjectList(self.devices()),
            selector::TRANSLATE_UID_TO_DEVICE => {
                let uid = qualifier
                    .ok_or_else(|| Error::InvalidValue("missing device uid".into()))?
                    .as_str()?;
                Value::Object(self.device_by_uid(uid).unwrap_or(ObjectId::UNKNOWN))
            }
            selector::BOX_LIST | selector::CLOCK_DEVICE_LIST => Value::ObjectList(Vec::new()),
            selector::RESOURCE_BUNDLE => Value::String(self.resource_bundle.clone()),
            _ => return base_property(self, address, qualifier),
        };
        Ok(value)
    }

    fn retire_children(&self, registry: &Registry) {
        let devices = std::mem::take(&mut *self.devices.write().unwrap_or_else(|e| e.into_inner()));
        for id in devices {
            if let Err(err) = registry.unregister(id) {
                log::warn!("plugin: failed to retire device {id}: {err}");
            }
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin")
            .field("devices", &self.devices())
            .finish()
    }
}
