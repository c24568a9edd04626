//! The driver instance handed to the host.
//!
//! A [`Driver`] owns the [`Context`] of one plugin. Its first field is the
//! vtable pointer, so a pointer to the driver is a valid
//! `AudioServerPlugInDriverRef`. The plugin object itself is created lazily
//! on the first successful `QueryInterface`.

use std::sync::{Arc, Mutex};

use halite_core::{
    Context, Dispatcher, DriverConfig, Error, Host, Interface, LogTracer, Missing, ObjectId, Operation, Plugin,
    PluginParameters, Result,
};

use crate::bridge::DRIVER_INTERFACE;
use crate::host::FfiHost;
use crate::sys::{CFUUIDBytes, DriverInterface, DriverRef, HostRef, DRIVER_INTERFACE_UUID, IUNKNOWN_UUID};

/// Callback that populates a freshly created plugin.
pub type SetupFn = dyn Fn(&Plugin) -> Result<()> + Send + Sync;

/// One driver instance.
#[repr(C)]
pub struct Driver {
    /// Must stay the first field: the host dereferences the driver as a
    /// pointer to this pointer.
    interface: *const DriverInterface,
    context: Arc<Context>,
    dispatcher: Dispatcher,
    params: PluginParameters,
    setup: Box<SetupFn>,
    plugin_lock: Mutex<()>,
}

// SAFETY: `interface` always points at the immutable static vtable.
unsafe impl Send for Driver {}
// SAFETY: see above; every other field is Sync.
unsafe impl Sync for Driver {}

impl Driver {
    /// A driver with the platform context and no devices.
    pub fn new(params: PluginParameters) -> Self {
        Self::with_context(params, Arc::new(Self::default_context()))
    }

    pub fn with_context(params: PluginParameters, context: Arc<Context>) -> Self {
        Self {
            interface: &DRIVER_INTERFACE,
            dispatcher: Dispatcher::new(Arc::clone(&context)),
            context,
            params,
            setup: Box::new(|_| Ok(())),
            plugin_lock: Mutex::new(()),
        }
    }

    /// Run `setup` every time the plugin object is created.
    pub fn with_setup(mut self, setup: impl Fn(&Plugin) -> Result<()> + Send + Sync + 'static) -> Self {
        self.setup = Box::new(setup);
        self
    }

    /// Build the plugin from a declarative configuration.
    pub fn with_config(config: DriverConfig) -> Self {
        Self::new(config.plugin.clone()).with_setup(move |plugin| config.apply(plugin).map(|_| ()))
    }

    /// Context with log tracing, platform strings and the host clock.
    pub fn default_context() -> Context {
        Context::new()
            .with_tracer(Arc::new(LogTracer::default()))
            .with_strings(crate::strings::platform_strings())
            .with_clock(crate::clock::platform_clock())
    }

    /// The pointer the host uses for every call.
    pub fn as_driver_ref(&self) -> DriverRef {
        &self.interface as *const *const DriverInterface as DriverRef
    }

    /// Recover the driver behind a host reference.
    ///
    /// Returns `None` unless `driver` points at a driver using this crate's
    /// vtable.
    ///
    /// # Safety
    ///
    /// `driver` must be null or point at readable memory holding a pointer.
    pub unsafe fn from_ref<'a>(driver: DriverRef) -> Option<&'a Self> {
        if driver.is_null() {
            return None;
        }
        // SAFETY: non-null and readable per the caller.
        let interface = unsafe { *driver };
        if !std::ptr::eq(interface, &DRIVER_INTERFACE) {
            return None;
        }
        // SAFETY: only `Driver` stores our vtable in its first field, and
        // `Driver` is repr(C).
        Some(unsafe { &*(driver as *const Self) })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    // -------------------------------------------------------------------------
    // Plugin lifecycle
    // -------------------------------------------------------------------------

    /// Create and populate the plugin object unless it already exists.
    ///
    /// Fails with `NotReady` while a torn down plugin is still referenced.
    pub fn ensure_plugin(&self) -> Result<()> {
        let _guard = self.plugin_lock.lock().unwrap_or_else(|e| e.into_inner());
        let registry = self.context.registry();
        if registry.lookup(ObjectId::PLUGIN).is_some() {
            return Ok(());
        }
        let pin = Plugin::install(&self.context, self.params.clone()).map_err(|err| match err {
            Error::AlreadyRetiring(id) => {
                log::warn!("previous plugin {id} is still referenced");
                Error::NotReady(id)
            }
            err => err,
        })?;
        let plugin = pin
            .downcast_ref::<Plugin>()
            .ok_or(Error::NotFound(Missing::Object(ObjectId::PLUGIN)))?;
        if let Err(err) = (self.setup)(plugin) {
            log::error!("plugin setup failed: {err}");
            drop(pin);
            registry.unregister(ObjectId::PLUGIN)?;
            return Err(err);
        }
        log::info!(
            "plugin created with {} device(s)",
            plugin.devices().len()
        );
        Ok(())
    }

    /// Answer `QueryInterface`. On success the plugin holds one more host
    /// reference.
    pub fn query_interface(&self, uuid: &CFUUIDBytes) -> Result<()> {
        self.dispatcher.trace(Operation::QueryInterface, ObjectId::PLUGIN, || {
            let interface = interface_for(uuid).ok_or(Error::NotSupported("interface"))?;
            self.ensure_plugin()?;
            let registry = self.context.registry();
            registry.get(ObjectId::PLUGIN)?.query_interface(interface)?;
            registry.add_ref(ObjectId::PLUGIN)?;
            Ok(())
        })
    }

    pub fn add_ref(&self) -> u32 {
        self.dispatcher
            .trace(Operation::AddRef, ObjectId::PLUGIN, || {
                self.context.registry().add_ref(ObjectId::PLUGIN)
            })
            .map_or(0, saturate)
    }

    pub fn release(&self) -> u32 {
        self.dispatcher
            .trace(Operation::Release, ObjectId::PLUGIN, || {
                self.context.registry().release(ObjectId::PLUGIN)
            })
            .map_or(0, saturate)
    }

    /// Store the host interface and make sure the plugin exists.
    ///
    /// # Safety
    ///
    /// `host` must be null or valid for as long as the driver is used.
    pub unsafe fn initialize(&self, host: HostRef) -> Result<()> {
        self.dispatcher.trace(Operation::Initialize, ObjectId::PLUGIN, || {
            self.ensure_plugin()?;
            // SAFETY: forwarded from the caller.
            let host = unsafe { FfiHost::new(host) };
            if host.is_none() {
                log::warn!("initialized without a host interface");
            }
            self.context
                .set_host(host.map(|h| Arc::new(h) as Arc<dyn Host>));
            Ok(())
        })
    }

    /// Drop the plugin object and the host.
    ///
    /// A later `QueryInterface` builds a fresh plugin.
    pub fn teardown(&self) -> Result<()> {
        let _guard = self.plugin_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.context.set_host(None);
        self.context.registry().unregister(ObjectId::PLUGIN)
    }
}

fn interface_for(uuid: &CFUUIDBytes) -> Option<Interface> {
    if *uuid == IUNKNOWN_UUID {
        Some(Interface::Unknown)
    } else if *uuid == DRIVER_INTERFACE_UUID {
        Some(Interface::Driver)
    } else {
        None
    }
}

fn saturate(count: usize) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("params", &self.params)
            .field("objects", &self.context.registry().len())
            .finish_non_exhaustive()
    }
}
