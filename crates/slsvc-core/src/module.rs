//! Module identities and the per-module record kept by the registry.

use crate::callback::CallbackList;
use crate::config::DirectiveTable;
use crate::registry::Runtime;
use crate::source::ModuleImage;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// Module initializer. Returns `true` on success.
pub type InitFn = fn(&Runtime, ModuleId) -> bool;

/// Module exit routine. The flag is `true` during shutdown, when a `false`
/// return is logged but does not stop the unload.
pub type ExitFn = fn(&Runtime, ModuleId, bool) -> bool;

/// Identity of a loaded module.
///
/// Ids are handed out from a monotonic counter and never reused within one
/// [`Runtime`], so a stale id simply stops resolving after its module unloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(NonZeroU64);

impl ModuleId {
    /// The core pseudo-module. Always present.
    pub const CORE: ModuleId = ModuleId(NonZeroU64::MIN);

    pub(crate) fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Self-pointer slot exported by every module.
///
/// The loader stores the module's [`ModuleId`] here right after the module
/// passes symbol validation and clears it again on unload, so module code
/// can always ask "who am I" without threading the id around.
#[derive(Debug, Default)]
pub struct ModuleSlot(AtomicU64);

impl ModuleSlot {
    /// An empty slot, usable in a `static`.
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// The owning module's id, if the module is loaded.
    pub fn get(&self) -> Option<ModuleId> {
        ModuleId::from_raw(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, id: ModuleId) {
        self.0.store(id.get(), Ordering::Release);
    }

    pub(crate) fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }
}

/// Everything the loader extracted from a module image.
pub(crate) struct Linkage {
    pub(crate) slot: &'static ModuleSlot,
    pub(crate) version: u32,
    pub(crate) directives: Option<&'static DirectiveTable>,
    pub(crate) init: InitFn,
    pub(crate) exit: ExitFn,
}

/// One loaded module.
///
/// Field order matters: callback lists (which may hold closures created by
/// module code) are dropped before the image that code lives in.
pub(crate) struct Module {
    pub(crate) id: ModuleId,
    pub(crate) name: String,
    pub(crate) callbacks: Vec<Option<CallbackList>>,
    /// Modules depending on this one. May contain repeats.
    pub(crate) dependents: Vec<ModuleId>,
    pub(crate) linkage: Option<Linkage>,
    pub(crate) unloading: bool,
    pub(crate) image: Option<Box<dyn ModuleImage>>,
}

impl Module {
    pub(crate) fn core(name: &str) -> Self {
        Self {
            id: ModuleId::CORE,
            name: name.to_string(),
            callbacks: Vec::new(),
            dependents: Vec::new(),
            linkage: None,
            unloading: false,
            image: None,
        }
    }

    pub(crate) fn new(
        id: ModuleId,
        name: &str,
        image: Box<dyn ModuleImage>,
        linkage: Linkage,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            callbacks: Vec::new(),
            dependents: Vec::new(),
            linkage: Some(linkage),
            unloading: false,
            image: Some(image),
        }
    }

    pub(crate) fn directives(&self) -> Option<&'static DirectiveTable> {
        self.linkage.as_ref().and_then(|l| l.directives)
    }

    /// Whether anything other than the module itself depends on it.
    pub(crate) fn in_use(&self) -> bool {
        self.dependents.iter().any(|d| *d != self.id)
    }

    pub(crate) fn callback(&self, name: &str) -> Option<(usize, &CallbackList)> {
        self.callbacks
            .iter()
            .enumerate()
            .find_map(|(i, slot)| slot.as_ref().filter(|l| l.name() == name).map(|l| (i, l)))
    }

    pub(crate) fn callback_mut(&mut self, name: &str) -> Option<&mut CallbackList> {
        self.callbacks
            .iter_mut()
            .flatten()
            .find(|l| l.name() == name)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dependents", &self.dependents)
            .field("callbacks", &self.callbacks.iter().flatten().count())
            .finish()
    }
}
