//! Volume controls.
//!
//! A volume control is a level control with a scalar value in `0.0..=1.0`
//! and a decibel value within the control's range. The scalar is the
//! stored state; decibels are derived through a linear curve.
//!
//! The control only reports the level. Applying it to audio is up to the
//! device's IO handler, which can read [`VolumeControl::scalar`] without
//! locking.

use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::object::{base_property, Object, ObjectCore, PropertySpec, Qualifier};
use crate::types::{class, selector, ClassId, ControlScope, ObjectId, PropertyAddress, PropertyElement, ELEMENT_MAIN};
use crate::value::{Value, ValueKind, ValueRange};

const CLASSES: &[ClassId] = &[
    class::VOLUME_CONTROL,
    class::LEVEL_CONTROL,
    class::CONTROL,
    class::OBJECT,
];

const PROPERTIES: &[PropertySpec] = &[
    PropertySpec::read(selector::CONTROL_SCOPE, ValueKind::U32),
    PropertySpec::read(selector::CONTROL_ELEMENT, ValueKind::U32),
    PropertySpec::read_write(selector::SCALAR_VALUE, ValueKind::F32),
    PropertySpec::read_write(selector::DECIBEL_VALUE, ValueKind::F32),
    PropertySpec::read(selector::DECIBEL_RANGE, ValueKind::Range),
    PropertySpec::read(selector::CONVERT_SCALAR_TO_DECIBELS, ValueKind::F32)
        .with_qualifier(Qualifier::InPlace),
    PropertySpec::read(selector::CONVERT_DECIBELS_TO_SCALAR, ValueKind::F32)
        .with_qualifier(Qualifier::InPlace),
];

// =============================================================================
// Curve
// =============================================================================

/// Linear mapping between scalar and decibel values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeCurve {
    min_db: f32,
    max_db: f32,
}

impl VolumeCurve {
    /// # Panics
    /// Panics if `min_db >= max_db`.
    pub fn new(min_db: f32, max_db: f32) -> Self {
        assert!(min_db < max_db, "volume range must not be empty");
        Self { min_db, max_db }
    }

    pub fn decibel_range(&self) -> ValueRange {
        ValueRange::new(f64::from(self.min_db), f64::from(self.max_db))
    }

    /// Map a scalar to decibels. Out-of-range scalars are clamped.
    pub fn scalar_to_db(&self, scalar: f32) -> f32 {
        let scalar = if scalar.is_nan() { 0.0 } else { scalar.clamp(0.0, 1.0) };
        self.min_db + scalar * (self.max_db - self.min_db)
    }

    /// Map decibels to a scalar. Out-of-range values are clamped.
    pub fn db_to_scalar(&self, db: f32) -> f32 {
        if db.is_nan() {
            return 0.0;
        }
        let db = db.clamp(self.min_db, self.max_db);
        (db - self.min_db) / (self.max_db - self.min_db)
    }
}

impl Default for VolumeCurve {
    fn default() -> Self {
        Self::new(-96.0, 0.0)
    }
}

// =============================================================================
// Parameters
// =============================================================================

/// Construction parameters of a volume control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeParameters {
    pub name: String,
    pub scope: ControlScope,
    pub element: PropertyElement,
    pub min_db: f32,
    pub max_db: f32,
    /// Initial scalar value.
    pub scalar: f32,
}

impl Default for VolumeParameters {
    fn default() -> Self {
        Self {
            name: String::new(),
            scope: ControlScope::Output,
            element: ELEMENT_MAIN,
            min_db: -96.0,
            max_db: 0.0,
            scalar: 1.0,
        }
    }
}

impl VolumeParameters {
    pub fn new(scope: ControlScope) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }

    pub fn with_range(mut self, min_db: f32, max_db: f32) -> Self {
        self.min_db = min_db;
        self.max_db = max_db;
        self
    }

    pub fn with_scalar(mut self, scalar: f32) -> Self {
        self.scalar = scalar;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min_db < self.max_db) {
            return Err(Error::InvalidValue(format!(
                "empty decibel range {}..{}",
                self.min_db, self.max_db
            )));
        }
        check_scalar(self.scalar)
    }
}

fn check_scalar(scalar: f32) -> Result<()> {
    if (0.0..=1.0).contains(&scalar) {
        Ok(())
    } else {
        Err(Error::InvalidValue(format!("scalar {scalar} outside 0..1")))
    }
}

// =============================================================================
// VolumeControl
// =============================================================================

/// A volume control object.
pub struct VolumeControl {
    core: ObjectCore,
    scope: ControlScope,
    element: PropertyElement,
    curve: VolumeCurve,
    scalar: AtomicU32,
}

impl VolumeControl {
    /// Parameters must have passed [`VolumeParameters::validate`].
    pub fn new(context: &Arc<Context>, id: ObjectId, device: ObjectId, params: VolumeParameters) -> Self {
        Self {
            core: ObjectCore::new(context, id, device, CLASSES).with_name(params.name),
            scope: params.scope,
            element: params.element,
            curve: VolumeCurve::new(params.min_db, params.max_db),
            scalar: AtomicU32::new(params.scalar.to_bits()),
        }
    }

    pub fn scope(&self) -> ControlScope {
        self.scope
    }

    pub fn element(&self) -> PropertyElement {
        self.element
    }

    pub fn curve(&self) -> VolumeCurve {
        self.curve
    }

    /// Current scalar value. Realtime safe.
    pub fn scalar(&self) -> f32 {
        f32::from_bits(self.scalar.load(Ordering::Relaxed))
    }

    pub fn decibels(&self) -> f32 {
        self.curve.scalar_to_db(self.scalar())
    }

    /// Set the scalar value. Values outside `0.0..=1.0` are rejected.
    pub fn set_scalar(&self, scalar: f32) -> Result<()> {
        check_scalar(scalar)?;
        self.store(scalar);
        Ok(())
    }

    /// Set the decibel value. Values outside the range are rejected.
    pub fn set_decibels(&self, db: f32) -> Result<()> {
        if !self.curve.decibel_range().contains(f64::from(db)) {
            return Err(Error::InvalidValue(format!("{db} dB outside volume range")));
        }
        self.store(self.curve.db_to_scalar(db));
        Ok(())
    }

    fn store(&self, scalar: f32) {
        let previous = self.scalar.swap(scalar.to_bits(), Ordering::Relaxed);
        if previous != scalar.to_bits() {
            self.core
                .notify(&[selector::SCALAR_VALUE, selector::DECIBEL_VALUE]);
        }
    }
}

impl Object for VolumeControl {
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
        let value = match address.selector {
            selector::CONTROL_SCOPE => Value::U32(self.scope.code()),
            selector::CONTROL_ELEMENT => Value::U32(self.element),
            selector::SCALAR_VALUE => Value::F32(self.scalar()),
            selector::DECIBEL_VALUE => Value::F32(self.decibels()),
            selector::DECIBEL_RANGE => Value::Range(self.curve.decibel_range()),
            selector::CONVERT_SCALAR_TO_DECIBELS => {
                let input = qualifier.ok_or(Error::InvalidValue("missing input value".into()))?;
                Value::F32(self.curve.scalar_to_db(input.as_f32()?))
            }
            selector::CONVERT_DECIBELS_TO_SCALAR => {
                let input = qualifier.ok_or(Error::InvalidValue("missing input value".into()))?;
                Value::F32(self.curve.db_to_scalar(input.as_f32()?))
            }
            _ => return base_property(self, address, qualifier),
        };
        Ok(value)
    }

    fn set_property(&self, address: &PropertyAddress, value: &Value) -> Result<()> {
        match address.selector {
            selector::SCALAR_VALUE => self.set_scalar(value.as_f32()?),
            selector::DECIBEL_VALUE => self.set_decibels(value.as_f32()?),
            _ => self.core.set_base_property(address, value),
        }
    }
}

impl std::fmt::Debug for VolumeControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolumeControl")
            .field("id", &self.id())
            .field("scalar", &self.scalar())
            .finish()
    }
}
