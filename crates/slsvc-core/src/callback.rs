//! Callback lists: named, prioritized subscription points owned by modules.
//!
//! A module registers a list under a name, other modules subscribe handlers
//! to it with a priority, and the owner dispatches it. Dispatch runs the
//! handlers from highest to lowest priority and stops at the first one that
//! returns nonzero.
//!
//! Handlers may add or remove subscriptions on the list being dispatched,
//! including their own. Removal during dispatch only tombstones the entry;
//! tombstones are compacted away once the outermost dispatch of that list
//! finishes. Entries added during dispatch are skipped by every pass that
//! was already running; passes started afterwards (nested ones included)
//! see them.

use crate::error::CallbackError;
use crate::module::{Module, ModuleId};
use crate::registry::Runtime;
use crate::telemetry::spans;
use std::any::Any;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, error, trace};

/// Lowest accepted callback priority.
pub const CALLBACK_PRIORITY_MIN: i32 = -10000;
/// Highest accepted callback priority.
pub const CALLBACK_PRIORITY_MAX: i32 = 10000;

/// Index of a callback list within its owning module.
///
/// Valid until unregistered; never reused for the module's lifetime.
pub type CallbackId = usize;

/// Which half of a reconfiguration a `"reconfigure"` dispatch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconfigurePhase {
    /// Before any module has re-read its configuration.
    Before,
    /// After every module's new configuration was committed.
    After,
}

/// Arguments passed to callback handlers.
#[derive(Clone, Copy)]
pub enum CallbackArgs<'a> {
    /// No payload.
    None,
    /// A module finished loading.
    LoadModule {
        /// The new module.
        module: ModuleId,
        /// Its identifier.
        name: &'a str,
    },
    /// A module was unlinked and is about to be freed.
    UnloadModule {
        /// The departing module; no longer loaded.
        module: ModuleId,
        /// Its identifier.
        name: &'a str,
    },
    /// Configuration is being reloaded.
    Reconfigure(ReconfigurePhase),
    /// Module-defined payload; handlers downcast to the type they expect.
    Custom(&'a (dyn Any + 'static)),
}

impl<'a> CallbackArgs<'a> {
    /// Downcast a [`CallbackArgs::Custom`] payload.
    pub fn custom<T: Any>(&self) -> Option<&'a T> {
        match *self {
            Self::Custom(payload) => payload.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for CallbackArgs<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::LoadModule { module, name } => f
                .debug_struct("LoadModule")
                .field("module", module)
                .field("name", name)
                .finish(),
            Self::UnloadModule { module, name } => f
                .debug_struct("UnloadModule")
                .field("module", module)
                .field("name", name)
                .finish(),
            Self::Reconfigure(phase) => f.debug_tuple("Reconfigure").field(phase).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

type HandlerFn = dyn Fn(&Runtime, &CallbackArgs<'_>) -> i32;

/// A callback handler.
///
/// Cloning shares the underlying closure; [`Runtime::remove_callback`]
/// matches handlers by that identity, so keep a clone of whatever you add.
#[derive(Clone)]
pub struct Callback(Rc<HandlerFn>);

impl Callback {
    /// Wrap a handler closure. A nonzero return stops the dispatch.
    pub fn new(handler: impl Fn(&Runtime, &CallbackArgs<'_>) -> i32 + 'static) -> Self {
        Self(Rc::new(handler))
    }

    /// Whether both values refer to the same handler.
    pub fn same_as(&self, other: &Callback) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }

    fn call(&self, rt: &Runtime, args: &CallbackArgs<'_>) -> i32 {
        (self.0)(rt, args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Rc::as_ptr(&self.0))
    }
}

struct Subscriber {
    /// `None` once tombstoned.
    handler: Option<Callback>,
    owner: ModuleId,
    priority: i32,
    /// Dispatch frames open when this entry was added. Frames below this
    /// index started earlier and skip it.
    added_at_depth: usize,
}

/// One named callback list.
pub(crate) struct CallbackList {
    name: String,
    subscribers: Vec<Subscriber>,
    /// Next index to visit, one entry per in-flight dispatch (innermost last).
    cursors: Vec<usize>,
    tombstoned: bool,
}

impl CallbackList {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: Vec::new(),
            cursors: Vec::new(),
            tombstoned: false,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn dispatching(&self) -> bool {
        !self.cursors.is_empty()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|s| s.handler.is_some())
            .count()
    }

    /// Insert after every entry of equal or higher priority.
    fn insert(&mut self, handler: Callback, owner: ModuleId, priority: i32) {
        let pos = self
            .subscribers
            .iter()
            .position(|s| s.priority < priority)
            .unwrap_or(self.subscribers.len());
        let added_at_depth = self.cursors.len();
        self.subscribers.insert(
            pos,
            Subscriber {
                handler: Some(handler),
                owner,
                priority,
                added_at_depth,
            },
        );
        for cursor in &mut self.cursors {
            if pos < *cursor {
                *cursor += 1;
            }
        }
    }

    /// Remove `handler` as subscribed by `owner`, returning the dropped
    /// handler when it was physically removed.
    fn remove(&mut self, handler: &Callback, owner: ModuleId) -> Result<Option<Callback>, CallbackError> {
        let matches = |s: &Subscriber| s.handler.as_ref().is_some_and(|h| h.same_as(handler));
        let Some(idx) = self
            .subscribers
            .iter()
            .position(|s| matches(s) && s.owner == owner)
        else {
            return Err(match self.subscribers.iter().find(|s| matches(s)) {
                Some(other) => CallbackError::NotOwner {
                    name: self.name.clone(),
                    owner: other.owner,
                },
                None => CallbackError::NotSubscribed(self.name.clone()),
            });
        };

        if self.dispatching() {
            self.tombstoned = true;
            Ok(self.subscribers[idx].handler.take())
        } else {
            Ok(self.subscribers.remove(idx).handler)
        }
    }

    /// Remove every subscription held by `owner`. Used when scrubbing after
    /// an unload; tombstones instead when dispatch is in flight.
    pub(crate) fn remove_owned_by(&mut self, owner: ModuleId) -> Vec<Callback> {
        let mut removed = Vec::new();
        if self.dispatching() {
            for sub in self.subscribers.iter_mut().filter(|s| s.owner == owner) {
                if let Some(handler) = sub.handler.take() {
                    removed.push(handler);
                    self.tombstoned = true;
                }
            }
        } else {
            self.subscribers.retain_mut(|s| {
                if s.owner != owner {
                    return true;
                }
                removed.extend(s.handler.take());
                false
            });
        }
        removed
    }

    fn begin(&mut self) -> usize {
        self.cursors.push(0);
        self.cursors.len() - 1
    }

    /// Advance dispatch frame `frame` to the next runnable handler.
    fn advance(&mut self, frame: usize) -> Option<Callback> {
        let cursor = self.cursors.get_mut(frame)?;
        while let Some(sub) = self.subscribers.get(*cursor) {
            *cursor += 1;
            if frame < sub.added_at_depth {
                continue;
            }
            if let Some(handler) = &sub.handler {
                return Some(handler.clone());
            }
        }
        None
    }

    /// Close dispatch frame `frame`; the outermost frame compacts tombstones.
    fn finish(&mut self, frame: usize) {
        self.cursors.truncate(frame);
        // A later pass may reuse this frame index and must see these entries.
        for sub in &mut self.subscribers {
            sub.added_at_depth = sub.added_at_depth.min(frame);
        }
        if self.dispatching() {
            return;
        }
        if self.tombstoned {
            self.subscribers.retain(|s| s.handler.is_some());
            self.tombstoned = false;
        }
    }
}

fn list_mut(modules: &mut [Module], module: ModuleId, id: CallbackId) -> Result<&mut CallbackList, CallbackError> {
    let owner = modules
        .iter_mut()
        .find(|m| m.id == module)
        .ok_or(CallbackError::NoSuchModule(module))?;
    owner
        .callbacks
        .get_mut(id)
        .and_then(Option::as_mut)
        .ok_or(CallbackError::InvalidId(id))
}

impl Runtime {
    /// Create a callback list named `name` on `module`.
    pub fn register_callback(&self, module: ModuleId, name: &str) -> Result<CallbackId, CallbackError> {
        let mut modules = self.modules.borrow_mut();
        let owner = modules
            .iter_mut()
            .find(|m| m.id == module)
            .ok_or(CallbackError::NoSuchModule(module))?;
        if owner.callback(name).is_some() {
            return Err(CallbackError::Duplicate {
                module: owner.name.clone(),
                name: name.to_string(),
            });
        }
        owner.callbacks.push(Some(CallbackList::new(name)));
        let id = owner.callbacks.len() - 1;
        debug!(module = %owner.name, callback = %name, id, "Callback registered");
        Ok(id)
    }

    /// Destroy a callback list. Its id stays reserved.
    pub fn unregister_callback(&self, module: ModuleId, id: CallbackId) -> Result<(), CallbackError> {
        let dropped = {
            let mut modules = self.modules.borrow_mut();
            let owner = modules
                .iter_mut()
                .find(|m| m.id == module)
                .ok_or(CallbackError::NoSuchModule(module))?;
            let list = owner
                .callbacks
                .get_mut(id)
                .and_then(Option::take)
                .ok_or(CallbackError::InvalidId(id))?;
            debug!(module = %owner.name, callback = %list.name, id, "Callback unregistered");
            list
        };
        drop(dropped);
        Ok(())
    }

    /// Subscribe `handler` (owned by `subscriber`) to the list `name` on `module`.
    pub fn add_callback(
        &self,
        module: ModuleId,
        name: &str,
        handler: &Callback,
        priority: i32,
        subscriber: ModuleId,
    ) -> Result<(), CallbackError> {
        if !(CALLBACK_PRIORITY_MIN..=CALLBACK_PRIORITY_MAX).contains(&priority) {
            return Err(CallbackError::PriorityOutOfRange(priority));
        }
        let mut modules = self.modules.borrow_mut();
        if !modules.iter().any(|m| m.id == subscriber) {
            return Err(CallbackError::NoSuchModule(subscriber));
        }
        let owner = modules
            .iter_mut()
            .find(|m| m.id == module)
            .ok_or(CallbackError::NoSuchModule(module))?;
        let owner_name = owner.name.clone();
        let list = owner
            .callback_mut(name)
            .ok_or_else(|| CallbackError::NoSuchCallback {
                module: owner_name.clone(),
                name: name.to_string(),
            })?;
        list.insert(handler.clone(), subscriber, priority);
        trace!(module = %owner_name, callback = %name, priority, subscriber = %subscriber, "Handler added");
        Ok(())
    }

    /// Withdraw `handler` from the list `name` on `module`.
    ///
    /// Only the module that added a handler may remove it.
    pub fn remove_callback(
        &self,
        module: ModuleId,
        name: &str,
        handler: &Callback,
        subscriber: ModuleId,
    ) -> Result<(), CallbackError> {
        let removed = {
            let mut modules = self.modules.borrow_mut();
            let owner = modules
                .iter_mut()
                .find(|m| m.id == module)
                .ok_or(CallbackError::NoSuchModule(module))?;
            let owner_name = owner.name.clone();
            let list = owner
                .callback_mut(name)
                .ok_or_else(|| CallbackError::NoSuchCallback {
                    module: owner_name.clone(),
                    name: name.to_string(),
                })?;
            match list.remove(handler, subscriber) {
                Ok(removed) => removed,
                Err(e @ CallbackError::NotOwner { .. }) => {
                    error!(module = %owner_name, callback = %name, subscriber = %subscriber, "BUG: attempt to remove another module's handler");
                    return Err(e);
                }
                Err(e) => return Err(e),
            }
        };
        drop(removed);
        Ok(())
    }

    /// Look up a callback list id by name.
    pub fn callback_id(&self, module: ModuleId, name: &str) -> Option<CallbackId> {
        let modules = self.modules.borrow();
        let owner = modules.iter().find(|m| m.id == module)?;
        owner.callback(name).map(|(id, _)| id)
    }

    /// Number of live (non-tombstoned) handlers on a list.
    pub fn subscriber_count(&self, module: ModuleId, id: CallbackId) -> Option<usize> {
        let modules = self.modules.borrow();
        let owner = modules.iter().find(|m| m.id == module)?;
        owner.callbacks.get(id)?.as_ref().map(CallbackList::live_count)
    }

    /// Run the handlers of a callback list in priority order.
    ///
    /// Returns the first nonzero handler result, or `0` if every handler
    /// returned zero (or there were none). If the list or its owner goes away
    /// mid-dispatch, the pass simply ends.
    pub fn dispatch(&self, module: ModuleId, id: CallbackId, args: &CallbackArgs<'_>) -> Result<i32, CallbackError> {
        let frame = list_mut(&mut self.modules.borrow_mut(), module, id)?.begin();
        let _span = spans::dispatch(module, id).entered();
        self.enter_module_code();

        let mut result = 0;
        loop {
            let next = match list_mut(&mut self.modules.borrow_mut(), module, id) {
                Ok(list) => list.advance(frame),
                Err(_) => None,
            };
            let Some(handler) = next else { break };
            let rv = handler.call(self, args);
            if rv != 0 {
                trace!(result = rv, "Dispatch stopped by handler");
                result = rv;
                break;
            }
        }

        if let Ok(list) = list_mut(&mut self.modules.borrow_mut(), module, id) {
            list.finish(frame);
        }
        self.leave_module_code();
        Ok(result)
    }

    /// [`dispatch`](Self::dispatch) by list name.
    pub fn dispatch_named(&self, module: ModuleId, name: &str, args: &CallbackArgs<'_>) -> Result<i32, CallbackError> {
        let id = {
            let modules = self.modules.borrow();
            let owner = modules
                .iter()
                .find(|m| m.id == module)
                .ok_or(CallbackError::NoSuchModule(module))?;
            owner
                .callback(name)
                .map(|(id, _)| id)
                .ok_or_else(|| CallbackError::NoSuchCallback {
                    module: owner.name.clone(),
                    name: name.to_string(),
                })?
        };
        self.dispatch(module, id, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> ModuleId {
        ModuleId::from_raw(raw).unwrap()
    }

    fn noop() -> Callback {
        Callback::new(|_, _| 0)
    }

    fn order(list: &CallbackList) -> Vec<i32> {
        list.subscribers.iter().map(|s| s.priority).collect()
    }

    #[test]
    fn insert_keeps_descending_priority_and_stability() {
        let mut list = CallbackList::new("test");
        let (h1, h2, h3) = (noop(), noop(), noop());
        list.insert(h1.clone(), id(2), 5);
        list.insert(h2.clone(), id(2), 10);
        list.insert(h3.clone(), id(2), 5);
        assert_eq!(order(&list), vec![10, 5, 5]);
        assert!(list.subscribers[0].handler.as_ref().unwrap().same_as(&h2));
        assert!(list.subscribers[1].handler.as_ref().unwrap().same_as(&h1));
        assert!(list.subscribers[2].handler.as_ref().unwrap().same_as(&h3));
    }

    #[test]
    fn remove_enforces_ownership() {
        let mut list = CallbackList::new("test");
        let h = noop();
        list.insert(h.clone(), id(2), 0);
        assert_eq!(
            list.remove(&h, id(3)).unwrap_err(),
            CallbackError::NotOwner {
                name: "test".into(),
                owner: id(2)
            }
        );
        assert!(list.remove(&h, id(2)).unwrap().is_some());
        assert_eq!(
            list.remove(&h, id(2)).unwrap_err(),
            CallbackError::NotSubscribed("test".into())
        );
    }

    #[test]
    fn removal_while_dispatching_tombstones_then_compacts() {
        let mut list = CallbackList::new("test");
        let (a, b) = (noop(), noop());
        list.insert(a.clone(), id(2), 0);
        list.insert(b.clone(), id(2), 0);

        let frame = list.begin();
        assert!(list.advance(frame).unwrap().same_as(&a));
        list.remove(&b, id(2)).unwrap();
        assert_eq!(list.subscribers.len(), 2);
        assert_eq!(list.live_count(), 1);
        assert!(list.advance(frame).is_none());
        list.finish(frame);
        assert_eq!(list.subscribers.len(), 1);
    }

    #[test]
    fn insert_before_cursor_does_not_replay_entries() {
        let mut list = CallbackList::new("test");
        let (low, high) = (noop(), noop());
        list.insert(low.clone(), id(2), 0);

        let frame = list.begin();
        assert!(list.advance(frame).unwrap().same_as(&low));
        list.insert(high.clone(), id(2), 100);
        assert!(list.advance(frame).is_none());
        list.finish(frame);

        let frame = list.begin();
        assert!(list.advance(frame).unwrap().same_as(&high));
        assert!(list.advance(frame).unwrap().same_as(&low));
        list.finish(frame);
    }

    #[test]
    fn entry_added_in_outer_frame_is_visible_to_later_nested_frame() {
        let mut list = CallbackList::new("test");
        let (a, late) = (noop(), noop());
        list.insert(a.clone(), id(2), 10);

        let outer = list.begin();
        assert!(list.advance(outer).unwrap().same_as(&a));
        list.insert(late.clone(), id(2), 0);

        let inner = list.begin();
        assert!(list.advance(inner).unwrap().same_as(&a));
        assert!(list.advance(inner).unwrap().same_as(&late));
        list.finish(inner);

        assert!(list.advance(outer).is_none());
        list.finish(outer);
        assert!(list.subscribers.iter().all(|s| s.added_at_depth == 0));
    }

    #[test]
    fn entry_added_in_nested_frame_is_visible_to_its_successor() {
        let mut list = CallbackList::new("test");
        let (a, late) = (noop(), noop());
        list.insert(a.clone(), id(2), 10);

        let outer = list.begin();
        list.advance(outer);
        let inner = list.begin();
        list.advance(inner);
        list.insert(late.clone(), id(2), 0);
        assert!(list.advance(inner).is_none());
        list.finish(inner);

        let again = list.begin();
        assert!(list.advance(again).unwrap().same_as(&a));
        assert!(list.advance(again).unwrap().same_as(&late));
        list.finish(again);
        assert!(list.advance(outer).is_none());
        list.finish(outer);
    }

    #[test]
    fn nested_frames_defer_compaction_to_outermost() {
        let mut list = CallbackList::new("test");
        let (a, b) = (noop(), noop());
        list.insert(a.clone(), id(2), 0);
        list.insert(b.clone(), id(2), 0);

        let outer = list.begin();
        list.advance(outer);
        let inner = list.begin();
        list.remove(&a, id(2)).unwrap();
        assert!(list.advance(inner).unwrap().same_as(&b));
        list.finish(inner);
        assert_eq!(list.subscribers.len(), 2);
        list.finish(outer);
        assert_eq!(list.subscribers.len(), 1);
    }

    #[test]
    fn remove_owned_by_drops_only_that_owner() {
        let mut list = CallbackList::new("test");
        list.insert(noop(), id(2), 0);
        list.insert(noop(), id(3), 0);
        list.insert(noop(), id(2), 1);
        assert_eq!(list.remove_owned_by(id(2)).len(), 2);
        assert_eq!(list.live_count(), 1);
        assert_eq!(list.subscribers[0].owner, id(3));
    }

    #[test]
    fn custom_args_downcast() {
        let payload = String::from("PRIVMSG");
        let args = CallbackArgs::Custom(&payload);
        assert_eq!(args.custom::<String>().map(String::as_str), Some("PRIVMSG"));
        assert!(args.custom::<u32>().is_none());
        assert!(CallbackArgs::None.custom::<String>().is_none());
    }
}
