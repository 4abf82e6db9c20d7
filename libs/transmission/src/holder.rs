//! Data holders
//!
//! A holder owns the current value of one data variant for its transformer.
//! It is the single source of truth that queries read from; when publishing
//! is enabled, every update is also pushed onto the transformer's outgoing
//! data path.

use crate::identifier::TransformerId;
use crate::message::{DataVariant, Transmission};
use crate::outlet::Outlet;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;

/// Read access to a holder's current value as a family data item
pub(crate) trait DataSource<D>: Send + Sync {
    fn snapshot(&self) -> D;
}

struct HolderCell<P: Transmission, T> {
    owner: TransformerId,
    value: Mutex<T>,
    publish: bool,
    outlet: Arc<Outlet<P::Data>>,
}

impl<P, T> HolderCell<P, T>
where
    P: Transmission,
    T: DataVariant<P::Data>,
{
    fn emit(&self, value: T) {
        if let Err(e) = self.outlet.emit(value.into_data()) {
            warn!(
                transformer = %self.owner,
                data = %T::KEY,
                error = %e,
                "Dropped data update"
            );
        }
    }
}

impl<P, T> DataSource<P::Data> for HolderCell<P, T>
where
    P: Transmission,
    T: DataVariant<P::Data>,
{
    fn snapshot(&self) -> P::Data {
        self.value.lock().clone().into_data()
    }
}

/// Handle to one data variant owned by a transformer
pub struct DataHolder<P: Transmission, T> {
    cell: Arc<HolderCell<P, T>>,
    _family: PhantomData<fn() -> P>,
}

impl<P: Transmission, T> Clone for DataHolder<P, T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            _family: PhantomData,
        }
    }
}

impl<P, T> DataHolder<P, T>
where
    P: Transmission,
    T: DataVariant<P::Data>,
{
    pub(crate) fn new(
        owner: TransformerId,
        initial: T,
        publish: bool,
        outlet: Arc<Outlet<P::Data>>,
    ) -> Self {
        let cell = Arc::new(HolderCell {
            owner,
            value: Mutex::new(initial.clone()),
            publish,
            outlet,
        });
        if publish {
            cell.emit(initial);
        }
        Self {
            cell,
            _family: PhantomData,
        }
    }

    pub(crate) fn source(&self) -> Arc<dyn DataSource<P::Data>> {
        self.cell.clone()
    }

    /// Latest completed value
    pub fn get(&self) -> T {
        self.cell.value.lock().clone()
    }

    /// Atomic read-modify-write.
    ///
    /// Concurrent updates are serialized. When publishing, the new value is
    /// emitted before the lock is released, so the data stream carries
    /// values in update order.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> T {
        let mut value = self.cell.value.lock();
        let next = f(&value);
        *value = next.clone();
        if self.cell.publish {
            self.cell.emit(next.clone());
        }
        next
    }

    pub fn set(&self, value: T) -> T {
        self.update(|_| value)
    }

    pub fn publishes(&self) -> bool {
        self.cell.publish
    }
}
