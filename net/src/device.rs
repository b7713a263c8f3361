//! The device hosting application entities.
//!
//! A [`Device`] is shared by reference between the application entities
//! it owns, so all of its state is behind interior mutability.
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use snafu::ensure;
use tracing::warn;

use crate::dimse::DimseRequestHandler;
use crate::error::{DuplicateAeTitleSnafu, Result};

/// A network device hosting a set of application entities.
///
/// # Example
///
/// ```
/// # use dicom_net::device::Device;
/// let device = Device::new("archive")
///     .with_limit_open_associations(8);
/// assert!(device.is_installed());
/// assert!(!device.is_limit_of_open_associations_exceeded());
/// ```
pub struct Device {
    name: String,
    installed: AtomicBool,
    limit_open_associations: AtomicUsize,
    open_associations: AtomicUsize,
    ae_titles: Mutex<BTreeSet<String>>,
    properties: RwLock<HashMap<String, String>>,
    dimse_handler: RwLock<Option<Arc<dyn DimseRequestHandler>>>,
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("installed", &self.is_installed())
            .field("limit_open_associations", &self.limit_open_associations())
            .field("open_associations", &self.number_of_open_associations())
            .field("ae_titles", &self.ae_titles())
            .finish_non_exhaustive()
    }
}

impl Device {
    /// Create an installed device
    /// with no limit on the number of open associations.
    pub fn new(name: impl Into<String>) -> Self {
        Device {
            name: name.into(),
            installed: AtomicBool::new(true),
            limit_open_associations: AtomicUsize::new(0),
            open_associations: AtomicUsize::new(0),
            ae_titles: Mutex::new(BTreeSet::new()),
            properties: RwLock::new(HashMap::new()),
            dimse_handler: RwLock::new(None),
        }
    }

    /// Override whether the device is installed.
    pub fn with_installed(self, installed: bool) -> Self {
        self.set_installed(installed);
        self
    }

    /// Override the maximum number of open associations
    /// (`0` means unlimited).
    pub fn with_limit_open_associations(self, limit: usize) -> Self {
        self.set_limit_open_associations(limit);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_installed(&self) -> bool {
        self.installed.load(Ordering::Acquire)
    }

    pub fn set_installed(&self, installed: bool) {
        self.installed.store(installed, Ordering::Release);
    }

    pub fn limit_open_associations(&self) -> usize {
        self.limit_open_associations.load(Ordering::Acquire)
    }

    pub fn set_limit_open_associations(&self, limit: usize) {
        self.limit_open_associations.store(limit, Ordering::Release);
    }

    pub fn number_of_open_associations(&self) -> usize {
        self.open_associations.load(Ordering::Acquire)
    }

    /// Whether more associations are open than the device allows.
    pub fn is_limit_of_open_associations_exceeded(&self) -> bool {
        let limit = self.limit_open_associations();
        let exceeded = limit > 0 && self.number_of_open_associations() > limit;
        if exceeded {
            warn!(
                "Device {}: number of open associations exceeds limit of {}",
                self.name, limit
            );
        }
        exceeded
    }

    /// Account for a newly opened association.
    ///
    /// The association is accounted for
    /// until the returned guard is dropped.
    pub fn open_association(self: &Arc<Self>) -> OpenAssociation {
        self.open_associations.fetch_add(1, Ordering::AcqRel);
        OpenAssociation {
            device: Arc::clone(self),
        }
    }

    /// The AE titles of the application entities on this device.
    pub fn ae_titles(&self) -> Vec<String> {
        self.titles().iter().cloned().collect()
    }

    pub fn contains_ae_title(&self, ae_title: &str) -> bool {
        self.titles().contains(ae_title)
    }

    fn titles(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.ae_titles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Index an application entity under the given AE title,
    /// failing if the title is already taken on this device.
    pub(crate) fn register_ae_title(&self, ae_title: &str) -> Result<()> {
        let mut titles = self.titles();
        ensure!(
            !titles.contains(ae_title),
            DuplicateAeTitleSnafu {
                ae_title,
                device: &self.name,
            }
        );
        titles.insert(ae_title.to_string());
        Ok(())
    }

    pub(crate) fn unregister_ae_title(&self, ae_title: &str) -> bool {
        self.titles().remove(ae_title)
    }

    /// Retrieve a device property.
    pub fn property(&self, key: &str) -> Option<String> {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Set a device property, returning its previous value.
    pub fn set_property(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.properties
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into())
    }

    pub fn remove_property(&self, key: &str) -> Option<String> {
        self.properties
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// The device-wide DIMSE request handler,
    /// used by application entities without a handler of their own.
    pub fn dimse_handler(&self) -> Option<Arc<dyn DimseRequestHandler>> {
        self.dimse_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_dimse_handler(&self, handler: Option<Arc<dyn DimseRequestHandler>>) {
        *self
            .dimse_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = handler;
    }
}

/// Guard accounting for one open association on a device.
#[derive(Debug)]
pub struct OpenAssociation {
    device: Arc<Device>,
}

impl OpenAssociation {
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for OpenAssociation {
    fn drop(&mut self) {
        self.device.open_associations.fetch_sub(1, Ordering::AcqRel);
    }
}
