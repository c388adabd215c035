// Userdata arena and collector.
//
// Host objects boxed as userdata live in slots of this arena; scripts only
// ever hold a `UserdataRef` (slot index + generation). Tables and closures
// are reference counted and need no collector, but they are traversed here
// because they are what keeps userdata reachable.
//
// A cycle is a full stop-the-world mark & sweep:
// - Mark: everything reachable from the roots the state hands in
// - Sweep: unmarked objects that were finalized already (or have no
//   `__gc`) are released; unmarked objects with a pending `__gc` are
//   flagged finalized, kept for this cycle and returned to the state, which
//   runs the finalizers
//
// An object is therefore finalized at most once, and released in the first
// cycle after finalization in which it is still unreachable.
//
// Tables and closures that enter the state are also tracked weakly. Plain
// reference counting cannot free cycles among them (a self-referencing
// table, a recursive local function), so closing the state empties every
// tracked object and breaks those cycles.

use crate::lua_value::{
    LuaClosure, LuaFunction, LuaTable, LuaTableRef, LuaValue, NativeClosure, UserdataRef,
};
use ahash::{AHashMap, AHashSet};
use smol_str::SmolStr;
use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

const MIN_TRACKED_PRUNE: usize = 1024;

/// A boxed host object plus the per-instance metadata the bridge needs
pub(crate) struct UserdataEntry {
    pub value: Box<dyn Any>,
    pub type_name: SmolStr,
    pub metatable: Option<LuaTableRef>,
    /// Allocation order, used to finalize in reverse on close
    pub seq: u64,
    marked: bool,
    finalized: bool,
}

struct Slot {
    generation: u32,
    entry: Option<UserdataEntry>,
}

/// Finalizers the state has to run after a cycle
#[derive(Default)]
pub struct GcActions {
    pub to_finalize: Vec<(UserdataRef, LuaValue)>,
}

enum TrackedObject {
    Table(Weak<RefCell<LuaTable>>),
    Lua(Weak<LuaClosure>),
    Native(Weak<NativeClosure>),
}

impl TrackedObject {
    fn upgrade(&self) -> Option<LuaValue> {
        match self {
            TrackedObject::Table(weak) => LuaTableRef::upgrade(weak).map(LuaValue::Table),
            TrackedObject::Lua(weak) => weak.upgrade().map(|c| LuaValue::Function(LuaFunction::Lua(c))),
            TrackedObject::Native(weak) => weak.upgrade().map(|c| LuaValue::Function(LuaFunction::Native(c))),
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            TrackedObject::Table(weak) => weak.strong_count() > 0,
            TrackedObject::Lua(weak) => weak.strong_count() > 0,
            TrackedObject::Native(weak) => weak.strong_count() > 0,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GcStats {
    pub cycles: u64,
    pub freed: u64,
    pub finalized: u64,
}

pub struct GC {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    live: usize,
    next_seq: u64,
    allocs_since_cycle: usize,
    /// Tables and closures seen by the state, keyed by address
    tracked: AHashMap<usize, TrackedObject>,
    prune_tracked_at: usize,
    /// Set while a cycle or its finalizers run; blocks re-entry
    pub(crate) running: bool,
    stats: GcStats,
}

impl GC {
    pub fn new() -> Self {
        GC {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
            next_seq: 0,
            allocs_since_cycle: 0,
            tracked: AHashMap::new(),
            prune_tracked_at: MIN_TRACKED_PRUNE,
            running: false,
            stats: GcStats::default(),
        }
    }

    pub fn alloc(&mut self, value: Box<dyn Any>, type_name: &str, metatable: Option<LuaTableRef>) -> UserdataRef {
        let entry = UserdataEntry {
            value,
            type_name: SmolStr::new(type_name),
            metatable,
            seq: self.next_seq,
            marked: false,
            finalized: false,
        };
        self.next_seq += 1;
        self.live += 1;
        self.allocs_since_cycle += 1;

        match self.free_list.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                UserdataRef::new(index, slot.generation)
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                UserdataRef::new((self.slots.len() - 1) as u32, 0)
            }
        }
    }

    pub(crate) fn get(&self, handle: UserdataRef) -> Option<&UserdataEntry> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    pub(crate) fn get_mut(&mut self, handle: UserdataRef) -> Option<&mut UserdataEntry> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_mut()
    }

    pub fn metatable(&self, handle: UserdataRef) -> Option<LuaTableRef> {
        self.get(handle).and_then(|e| e.metatable.clone())
    }

    #[inline]
    pub fn live(&self) -> usize {
        self.live
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    pub fn should_collect(&self, threshold: usize) -> bool {
        !self.running && self.allocs_since_cycle >= threshold.max(1)
    }

    /// Remember a table or closure so [`break_cycles`](Self::break_cycles)
    /// can reach it even after scripts dropped every path to it
    pub fn track(&mut self, value: &LuaValue) {
        let (key, object) = match value {
            LuaValue::Table(table) => (table.as_ptr(), TrackedObject::Table(table.downgrade())),
            LuaValue::Function(func) => {
                let object = match func {
                    LuaFunction::Lua(closure) => TrackedObject::Lua(Rc::downgrade(closure)),
                    LuaFunction::Native(closure) => TrackedObject::Native(Rc::downgrade(closure)),
                };
                (func.as_ptr(), object)
            }
            _ => return,
        };
        // An address freed and reused replaces the dead entry
        self.tracked.insert(key, object);
        if self.tracked.len() >= self.prune_tracked_at {
            self.prune_tracked();
        }
    }

    fn prune_tracked(&mut self) {
        self.tracked.retain(|_, object| object.is_alive());
        self.prune_tracked_at = (self.tracked.len() * 2).max(MIN_TRACKED_PRUNE);
    }

    /// Run mark and sweep. Returns the objects whose finalizers must run now.
    pub fn full_collect(&mut self, roots: &[LuaValue]) -> GcActions {
        self.allocs_since_cycle = 0;
        self.stats.cycles += 1;
        self.prune_tracked();

        let mut marker = Marker {
            gc: self,
            seen: AHashSet::new(),
            pending: roots.to_vec(),
        };
        marker.propagate();

        self.sweep()
    }

    fn sweep(&mut self) -> GcActions {
        let mut actions = GcActions::default();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(entry) = slot.entry.as_mut() else {
                continue;
            };
            if entry.marked {
                entry.marked = false;
                continue;
            }

            let finalizer = if entry.finalized {
                None
            } else {
                finalizer_of(entry)
            };
            match finalizer {
                Some(gc_fn) => {
                    entry.finalized = true;
                    actions
                        .to_finalize
                        .push((UserdataRef::new(index as u32, slot.generation), gc_fn));
                }
                None => {
                    slot.entry = None;
                    slot.generation = slot.generation.wrapping_add(1);
                    self.free_list.push(index as u32);
                    self.live -= 1;
                    self.stats.freed += 1;
                }
            }
        }
        self.stats.finalized += actions.to_finalize.len() as u64;
        actions
    }

    /// Flag every not yet finalized object as finalized and hand back their
    /// finalizers, newest first. Used when the state is closed.
    pub fn finalize_all(&mut self) -> GcActions {
        let mut pending: Vec<(u64, UserdataRef, LuaValue)> = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(entry) = slot.entry.as_mut() else {
                continue;
            };
            if entry.finalized {
                continue;
            }
            entry.finalized = true;
            if let Some(gc_fn) = finalizer_of(entry) {
                pending.push((entry.seq, UserdataRef::new(index as u32, slot.generation), gc_fn));
            }
        }
        pending.sort_by(|a, b| b.0.cmp(&a.0));
        self.stats.finalized += pending.len() as u64;
        GcActions {
            to_finalize: pending.into_iter().map(|(_, h, f)| (h, f)).collect(),
        }
    }

    /// Drop every boxed object. Handles still held anywhere become stale.
    pub fn release_all(&mut self) {
        for slot in self.slots.iter_mut() {
            if slot.entry.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.stats.freed += 1;
            }
        }
        self.free_list = (0..self.slots.len() as u32).rev().collect();
        self.live = 0;
    }

    /// Empty every tracked table and closure plus everything reachable from
    /// them and from `roots`: tables lose their entries and metatable,
    /// script closures get their captured variables set to nil. Whatever
    /// was held only through a cycle is dropped here.
    pub fn break_cycles(&mut self, roots: Vec<LuaValue>) {
        let mut pending = roots;
        pending.extend(self.tracked.drain().filter_map(|(_, object)| object.upgrade()));
        self.prune_tracked_at = MIN_TRACKED_PRUNE;

        let mut seen = AHashSet::new();
        let mut reached = Vec::new();
        while let Some(value) = pending.pop() {
            match &value {
                LuaValue::Table(table) => {
                    if !seen.insert(table.as_ptr()) {
                        continue;
                    }
                    let table = table.borrow();
                    for (key, value) in table.iter() {
                        push_collectable(&mut pending, key);
                        push_collectable(&mut pending, value);
                    }
                    if let Some(mt) = table.metatable() {
                        pending.push(LuaValue::Table(mt));
                    }
                }
                LuaValue::Function(func) => {
                    if !seen.insert(func.as_ptr()) {
                        continue;
                    }
                    match func {
                        LuaFunction::Lua(closure) => {
                            for cell in &closure.upvalues {
                                push_collectable(&mut pending, &cell.borrow());
                            }
                        }
                        LuaFunction::Native(closure) => {
                            for value in &closure.upvalues {
                                push_collectable(&mut pending, value);
                            }
                        }
                    }
                }
                _ => continue,
            }
            reached.push(value);
        }

        for value in &reached {
            match value {
                LuaValue::Table(table) => {
                    let contents = std::mem::replace(&mut *table.borrow_mut(), LuaTable::new());
                    drop(contents);
                }
                LuaValue::Function(LuaFunction::Lua(closure)) => {
                    for cell in &closure.upvalues {
                        let captured = cell.replace(LuaValue::Nil);
                        drop(captured);
                    }
                }
                _ => {}
            }
        }
    }
}

impl Default for GC {
    fn default() -> Self {
        Self::new()
    }
}

fn finalizer_of(entry: &UserdataEntry) -> Option<LuaValue> {
    let gc_fn = entry.metatable.as_ref()?.get_str("__gc");
    if gc_fn.is_nil() { None } else { Some(gc_fn) }
}

struct Marker<'a> {
    gc: &'a mut GC,
    /// Tables and closures already traversed, by address
    seen: AHashSet<usize>,
    pending: Vec<LuaValue>,
}

impl Marker<'_> {
    fn propagate(&mut self) {
        while let Some(value) = self.pending.pop() {
            match value {
                LuaValue::Table(table) => self.mark_table(&table),
                LuaValue::Function(func) => self.mark_function(&func),
                LuaValue::Userdata(handle) => self.mark_userdata(handle),
                _ => {}
            }
        }
    }

    fn mark_table(&mut self, table: &LuaTableRef) {
        if !self.seen.insert(table.as_ptr()) {
            return;
        }
        let table = table.borrow();
        for (key, value) in table.iter() {
            push_collectable(&mut self.pending, key);
            push_collectable(&mut self.pending, value);
        }
        if let Some(mt) = table.metatable() {
            self.pending.push(LuaValue::Table(mt));
        }
    }

    fn mark_function(&mut self, func: &LuaFunction) {
        if !self.seen.insert(func.as_ptr()) {
            return;
        }
        match func {
            LuaFunction::Lua(closure) => {
                for cell in &closure.upvalues {
                    push_collectable(&mut self.pending, &cell.borrow());
                }
            }
            LuaFunction::Native(closure) => {
                for value in &closure.upvalues {
                    push_collectable(&mut self.pending, value);
                }
            }
        }
    }

    fn mark_userdata(&mut self, handle: UserdataRef) {
        let Some(entry) = self.gc.get_mut(handle) else {
            return;
        };
        if entry.marked {
            return;
        }
        entry.marked = true;
        if let Some(mt) = entry.metatable.clone() {
            self.pending.push(LuaValue::Table(mt));
        }
    }
}

#[inline]
fn push_collectable(pending: &mut Vec<LuaValue>, value: &LuaValue) {
    if matches!(value, LuaValue::Table(_) | LuaValue::Function(_) | LuaValue::Userdata(_)) {
        pending.push(value.clone());
    }
}
