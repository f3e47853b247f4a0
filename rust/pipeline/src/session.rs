// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Kernel session and model lifetime.
//!
//! A kernel keeps one implicit active model, so at most one [`Session`] may
//! be open per process. Models are only reachable through a [`ModelScope`],
//! which removes its model when dropped, whether the stage returned, failed
//! or panicked.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

use intake_mesh_kernel::{GeometryKernel, KernelError};

use crate::error::SessionError;

static SESSION_OPEN: AtomicBool = AtomicBool::new(false);

/// Exclusive owner of a geometry kernel for the duration of one run.
pub struct Session<K: GeometryKernel> {
    kernel: K,
}

impl<K: GeometryKernel> Session<K> {
    /// Open the process-wide session and size the kernel's worker pool.
    pub fn open(mut kernel: K, threads: usize) -> Result<Self, SessionError> {
        if SESSION_OPEN
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::AlreadyOpen);
        }
        if let Err(e) = kernel.set_threads(threads) {
            SESSION_OPEN.store(false, Ordering::Release);
            return Err(e.into());
        }
        tracing::debug!(threads, "Opened kernel session");
        Ok(Self { kernel })
    }

    /// Add a model that lives as long as the returned scope.
    pub fn model(&mut self, name: &str) -> Result<ModelScope<'_, K>, KernelError> {
        self.kernel.add_model(name)?;
        Ok(ModelScope {
            kernel: &mut self.kernel,
            name: name.to_string(),
        })
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn is_open() -> bool {
        SESSION_OPEN.load(Ordering::Acquire)
    }
}

impl<K: GeometryKernel> Drop for Session<K> {
    fn drop(&mut self) {
        if self.kernel.has_model() {
            let _ = self.kernel.remove_model();
        }
        SESSION_OPEN.store(false, Ordering::Release);
        tracing::debug!("Closed kernel session");
    }
}

/// The kernel with exactly one active model.
pub struct ModelScope<'s, K: GeometryKernel> {
    kernel: &'s mut K,
    name: String,
}

impl<K: GeometryKernel> Deref for ModelScope<'_, K> {
    type Target = K;

    fn deref(&self) -> &K {
        self.kernel
    }
}

impl<K: GeometryKernel> DerefMut for ModelScope<'_, K> {
    fn deref_mut(&mut self) -> &mut K {
        self.kernel
    }
}

impl<K: GeometryKernel> Drop for ModelScope<'_, K> {
    fn drop(&mut self) {
        if let Err(e) = self.kernel.remove_model() {
            tracing::warn!(model = %self.name, error = %e, "Failed to remove model");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use intake_mesh_kernel::BuiltinKernel;
    use std::sync::{Mutex, MutexGuard};

    static SERIAL: Mutex<()> = Mutex::new(());

    /// Session tests share the process-wide flag.
    pub(crate) fn serial() -> MutexGuard<'static, ()> {
        SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn test_single_session_per_process() {
        let _guard = serial();
        let session = Session::open(BuiltinKernel::new(), 1).unwrap();
        assert!(Session::<BuiltinKernel>::is_open());
        assert!(matches!(
            Session::open(BuiltinKernel::new(), 1),
            Err(SessionError::AlreadyOpen)
        ));
        drop(session);
        assert!(!Session::<BuiltinKernel>::is_open());
        let _again = Session::open(BuiltinKernel::new(), 1).unwrap();
    }

    #[test]
    fn test_scope_removes_model() {
        let _guard = serial();
        let mut session = Session::open(BuiltinKernel::new(), 1).unwrap();
        {
            let scope = session.model("a").unwrap();
            assert!(scope.has_model());
        }
        assert!(!session.kernel().has_model());
        let scope = session.model("b").unwrap();
        drop(scope);
        assert!(!session.kernel().has_model());
    }

    #[test]
    fn test_scope_cleans_up_on_panic() {
        let _guard = serial();
        let mut session = Session::open(BuiltinKernel::new(), 1).unwrap();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = session.model("boom").unwrap();
            panic!("stage blew up");
        }));
        assert!(outcome.is_err());
        assert!(!session.kernel().has_model());
    }
}
