//! Mute controls.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::{base_property, Object, ObjectCore, PropertySpec};
use crate::types::{class, selector, ClassId, ControlScope, ObjectId, PropertyAddress, PropertyElement, ELEMENT_MAIN};
use crate::value::{Value, ValueKind};

const CLASSES: &[ClassId] = &[
    class::MUTE_CONTROL,
    class::BOOLEAN_CONTROL,
    class::CONTROL,
    class::OBJECT,
];

const PROPERTIES: &[PropertySpec] = &[
    PropertySpec::read(selector::CONTROL_SCOPE, ValueKind::U32),
    PropertySpec::read(selector::CONTROL_ELEMENT, ValueKind::U32),
    PropertySpec::read_write(selector::BOOLEAN_VALUE, ValueKind::U32),
];

/// Construction parameters of a mute control.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MuteParameters {
    pub name: String,
    pub scope: ControlScope,
    pub element: PropertyElement,
    pub muted: bool,
}

impl MuteParameters {
    pub fn new(scope: ControlScope) -> Self {
        Self {
            scope,
            element: ELEMENT_MAIN,
            ..Self::default()
        }
    }
}

/// A mute control object.
pub struct MuteControl {
    core: ObjectCore,
    scope: ControlScope,
    element: PropertyElement,
    muted: AtomicBool,
}

impl MuteControl {
    pub fn new(context: &Arc<Context>, id: ObjectId, device: ObjectId, params: MuteParameters) -> Self {
        Self {
            core: ObjectCore::new(context, id, device, CLASSES).with_name(params.name),
            scope: params.scope,
            element: params.element,
            muted: AtomicBool::new(params.muted),
        }
    }

    pub fn scope(&self) -> ControlScope {
        self.scope
    }

    /// Current state. Realtime safe.
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::Relaxed)
    }

    pub fn set_muted(&self, muted: bool) {
        if self.muted.swap(muted, Ordering::Relaxed) != muted {
            self.core.notify(&[selector::BOOLEAN_VALUE]);
        }
    }
}

impl Object for MuteControl {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn property_specs(&self) -> &'static [PropertySpec] {
        PROPERTIES
    }

    fn get_property(&self, address: &PropertyAddress, qualifier: Option<&Value>) -> Result<Value> {
        match address.selector {
            selector::CONTROL_SCOPE => Ok(Value::U32(self.scope.code())),
            selector::CONTROL_ELEMENT => Ok(Value::U32(self.element)),
            selector::BOOLEAN_VALUE => Ok(Value::from_bool(self.is_muted())),
            _ => base_property(self, address, qualifier),
        }
    }

    fn set_property(&self, address: &PropertyAddress, value: &Value) -> Result<()> {
        match address.selector {
            selector::BOOLEAN_VALUE => match value.as_u32()? {
                0 => self.set_muted(false),
                1 => self.set_muted(true),
                other => return Err(Error::InvalidValue(format!("{other} is not a boolean"))),
            },
            _ => return self.core.set_base_property(address, value),
        }
        Ok(())
    }
}

impl std::fmt::Debug for MuteControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MuteControl")
            .field("id", &self.id())
            .field("muted", &self.is_muted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle() {
        let context = Arc::new(Context::new());
        let mute = MuteControl::new(&context, ObjectId(5), ObjectId(2), MuteParameters::default());
        let address = PropertyAddress::global(selector::BOOLEAN_VALUE);

        assert_eq!(mute.get_property(&address, None), Ok(Value::U32(0)));
        mute.set_property(&address, &Value::U32(1)).unwrap();
        assert!(mute.is_muted());
        assert!(mute.set_property(&address, &Value::U32(7)).is_err());
        assert!(mute.is_muted());
    }

    #[test]
    fn test_classes() {
        let context = Arc::new(Context::new());
        let mute = MuteControl::new(&context, ObjectId(5), ObjectId(2), MuteParameters::new(ControlScope::Input));
        assert_eq!(mute.class_id(), class::MUTE_CONTROL);
        assert_eq!(mute.base_class_id(), class::BOOLEAN_CONTROL);
        assert!(mute.is_instance(class::CONTROL));
        assert_eq!(mute.scope(), ControlScope::Input);
    }
}
