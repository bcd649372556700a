// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

pub(crate) use self::lock::Lock;

mod lock {
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    /// Thread safe lock: just wraps a `Mutex`. Clones share the lock.
    pub(crate) struct Lock<A> {
        lock: Arc<Mutex<A>>,
    }

    impl<A> Lock<A> {
        pub(crate) fn new(value: A) -> Self {
            Lock {
                lock: Arc::new(Mutex::new(value)),
            }
        }

        /// Lock the contents. A panic while the lock was held doesn't leave
        /// the contents half-updated for our uses, so poisoning is ignored.
        #[inline]
        pub(crate) fn lock(&self) -> MutexGuard<'_, A> {
            self.lock.lock().unwrap_or_else(PoisonError::into_inner)
        }

        pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
            Arc::ptr_eq(&self.lock, &other.lock)
        }
    }

    impl<A> Clone for Lock<A> {
        fn clone(&self) -> Self {
            Lock {
                lock: self.lock.clone(),
            }
        }
    }
}
