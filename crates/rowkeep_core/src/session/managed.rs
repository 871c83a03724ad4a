use crate::repo::error::{RepoError, RepoResult};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Shared handle to an attached entity.
///
/// Every load of the same identity within one session yields a clone of the
/// same handle, so mutations through any clone are seen by dirty checking.
pub struct Managed<E>(Rc<RefCell<E>>);

impl<E> Managed<E> {
    pub(crate) fn new(entity: E) -> Self {
        Self(Rc::new(RefCell::new(entity)))
    }

    /// Panics if the entity is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, E> {
        self.0.borrow()
    }

    /// Panics if the entity is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, E> {
        self.0.borrow_mut()
    }

    /// Whether both handles point at the same attached instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn try_borrow(&self) -> RepoResult<Ref<'_, E>> {
        self.0.try_borrow().map_err(|_| {
            RepoError::InvalidState("entity is mutably borrowed while the session reads it".into())
        })
    }

    pub(crate) fn try_borrow_mut(&self) -> RepoResult<RefMut<'_, E>> {
        self.0.try_borrow_mut().map_err(|_| {
            RepoError::InvalidState("entity is borrowed while the session writes it".into())
        })
    }
}

impl<E: Clone> Managed<E> {
    /// Detached copy of the current state.
    pub fn cloned(&self) -> E {
        self.0.borrow().clone()
    }
}

impl<E> Clone for Managed<E> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<E: Debug> Debug for Managed<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0.try_borrow() {
            Ok(entity) => f.debug_tuple("Managed").field(&*entity).finish(),
            Err(_) => f.write_str("Managed(<borrowed>)"),
        }
    }
}
