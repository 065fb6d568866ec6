//! Dependency tracking between modules ("use counts").
//!
//! `use_module(m, by)` records `by` as a dependent of `m`; while `m` has any
//! dependents it cannot be unloaded. The dependents relation must stay
//! acyclic, which is checked on every insertion. Both calls report misuse
//! through the log only, since callers have nothing useful to do about it.

use crate::module::{Module, ModuleId};
use crate::registry::Runtime;
use std::collections::HashSet;
use tracing::{error, trace};

/// Whether `target` is reachable from `from` by following dependents.
/// Self-edges are skipped.
fn reachable(modules: &[Module], from: ModuleId, target: ModuleId) -> bool {
    let mut seen = HashSet::from([from]);
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        let Some(module) = modules.iter().find(|m| m.id == node) else {
            continue;
        };
        for &dep in &module.dependents {
            if dep == node {
                continue;
            }
            if dep == target {
                return true;
            }
            if seen.insert(dep) {
                stack.push(dep);
            }
        }
    }
    false
}

impl Runtime {
    /// Record that `by` depends on `module`.
    pub fn use_module(&self, module: ModuleId, by: ModuleId) {
        let mut modules = self.modules.borrow_mut();
        if module == by {
            error!(module = %module, "BUG: module tried to use itself");
            return;
        }
        if !modules.iter().any(|m| m.id == by) {
            error!(module = %module, by = %by, "BUG: use_module by a module that is not loaded");
            return;
        }
        if reachable(&modules, by, module) {
            error!(module = %module, by = %by, "BUG: use_module would create a dependency cycle");
            return;
        }
        let Some(target) = modules.iter_mut().find(|m| m.id == module) else {
            error!(module = %module, by = %by, "BUG: use_module on a module that is not loaded");
            return;
        };
        target.dependents.push(by);
        trace!(module = %target.name, by = %by, count = target.dependents.len(), "Module used");
    }

    /// Drop one record of `by` depending on `module`.
    pub fn unuse_module(&self, module: ModuleId, by: ModuleId) {
        let mut modules = self.modules.borrow_mut();
        let Some(target) = modules.iter_mut().find(|m| m.id == module) else {
            error!(module = %module, by = %by, "BUG: unuse_module on a module that is not loaded");
            return;
        };
        if target.dependents.is_empty() {
            error!(module = %target.name, by = %by, "BUG: unuse_module on a module with no dependents");
            return;
        }
        let Some(pos) = target.dependents.iter().position(|d| *d == by) else {
            error!(module = %target.name, by = %by, "BUG: unuse_module by a module that never used it");
            return;
        };
        target.dependents.swap_remove(pos);
        trace!(module = %target.name, by = %by, count = target.dependents.len(), "Module unused");
    }

    /// Current dependents of `module` (with repeats), empty if not loaded.
    pub fn dependents(&self, module: ModuleId) -> Vec<ModuleId> {
        self.modules
            .borrow()
            .iter()
            .find(|m| m.id == module)
            .map(|m| m.dependents.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(raw: u64, dependents: &[u64]) -> Module {
        let mut m = Module::core("test");
        m.id = ModuleId::from_raw(raw).unwrap();
        m.dependents = dependents
            .iter()
            .map(|&d| ModuleId::from_raw(d).unwrap())
            .collect();
        m
    }

    fn id(raw: u64) -> ModuleId {
        ModuleId::from_raw(raw).unwrap()
    }

    #[test]
    fn reachability_follows_transitive_dependents() {
        // 2 <- 3 <- 4 (4 depends on 3, 3 depends on 2)
        let modules = vec![module(2, &[3]), module(3, &[4]), module(4, &[])];
        assert!(reachable(&modules, id(2), id(4)));
        assert!(!reachable(&modules, id(4), id(2)));
    }

    #[test]
    fn reachability_ignores_self_edges() {
        let modules = vec![module(2, &[2]), module(3, &[])];
        assert!(!reachable(&modules, id(2), id(3)));
    }
}
