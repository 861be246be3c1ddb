/// Backend buffer object and its user registry
///
/// Structures that cache an object's identity (descriptor info, bound vertex
/// streams, ...) hold an `ObjectUser`. The object keeps weak back-references to
/// them in a slot map. When the object is destroyed or renamed every user is
/// invalidated first, and must `refresh` before trusting its cached view again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use slotmap::{new_key_type, Key, KeyData, SlotMap};
use crate::buffer::device::{ObjectAllocation, ObjectHandle};

new_key_type! {
    /// Slot of one user in an object's registry
    pub struct UserKey;
}

/// Identity of an object as cached by its users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectView {
    pub handle: ObjectHandle,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Default)]
struct UserCell {
    view: Mutex<Option<ObjectView>>,
    /// `KeyData::as_ffi` of the registry slot, 0 when unregistered
    key: AtomicU64,
}

impl UserCell {
    fn set_view(&self, view: Option<ObjectView>) {
        if let Ok(mut cached) = self.view.lock() {
            *cached = view;
        }
    }

    fn key(&self) -> Option<UserKey> {
        match self.key.load(Ordering::Acquire) {
            0 => None,
            raw => Some(UserKey::from(KeyData::from_ffi(raw))),
        }
    }
}

/// Back-reference to a `BufferObject`
///
/// Clones share the same cell, so a registered user can be handed to several
/// holders.
#[derive(Debug, Clone, Default)]
pub struct ObjectUser {
    cell: Arc<UserCell>,
}

impl ObjectUser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the cached view still matches the object
    pub fn is_valid(&self) -> bool {
        self.view().is_some()
    }

    /// Cached view, `None` once invalidated
    pub fn view(&self) -> Option<ObjectView> {
        self.cell.view.lock().ok().and_then(|v| *v)
    }

    /// Re-read the identity of `object`
    pub fn refresh(&self, object: &BufferObject) -> ObjectView {
        let view = object.view();
        self.cell.set_view(Some(view));
        view
    }

    /// Whether this user sits in some object's registry
    pub fn is_registered(&self) -> bool {
        self.cell.key().is_some()
    }
}

/// A live backend object
#[derive(Debug)]
pub struct BufferObject {
    handle: ObjectHandle,
    offset: u64,
    size: u64,
    users: SlotMap<UserKey, Weak<UserCell>>,
}

impl BufferObject {
    pub fn new(allocation: ObjectAllocation, size: u64) -> Self {
        Self {
            handle: allocation.handle,
            offset: allocation.offset,
            size,
            users: SlotMap::with_key(),
        }
    }

    pub fn handle(&self) -> ObjectHandle {
        self.handle
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn view(&self) -> ObjectView {
        ObjectView {
            handle: self.handle,
            offset: self.offset,
            size: self.size,
        }
    }

    /// Add `user` to the registry; it starts invalid until refreshed
    ///
    /// A user belongs to one object at a time.
    pub fn register(&mut self, user: &ObjectUser) {
        if self.owns(user) {
            return;
        }
        let key = self.users.insert(Arc::downgrade(&user.cell));
        user.cell.key.store(key.data().as_ffi(), Ordering::Release);
    }

    pub fn unregister(&mut self, user: &ObjectUser) {
        if !self.owns(user) {
            return;
        }
        if let Some(key) = user.cell.key() {
            self.users.remove(key);
            user.cell.key.store(0, Ordering::Release);
        }
    }

    /// Whether `user` is registered on this object
    pub fn owns(&self, user: &ObjectUser) -> bool {
        user.cell
            .key()
            .and_then(|key| self.users.get(key))
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(&user.cell)))
    }

    /// Drop every cached view
    pub fn invalidate_users(&mut self) {
        self.users.retain(|_, weak| match weak.upgrade() {
            Some(cell) => {
                cell.set_view(None);
                true
            }
            None => false,
        });
    }

    /// Invalidate every user and move them to `new_object`
    pub fn transfer_users_to(&mut self, new_object: &mut BufferObject) {
        self.invalidate_users();
        for (_, weak) in self.users.drain() {
            if let Some(cell) = weak.upgrade() {
                let key = new_object.users.insert(Arc::downgrade(&cell));
                cell.key.store(key.data().as_ffi(), Ordering::Release);
            }
        }
    }

    /// Invalidate and forget every user, before the object is destroyed
    pub fn release_users(&mut self) {
        self.invalidate_users();
        for (_, weak) in self.users.drain() {
            if let Some(cell) = weak.upgrade() {
                cell.key.store(0, Ordering::Release);
            }
        }
    }

    /// Number of users still alive
    pub fn user_count(&self) -> usize {
        self.users.values().filter(|w| w.strong_count() > 0).count()
    }
}

#[cfg(test)]
#[path = "object_tests.rs"]
mod tests;
