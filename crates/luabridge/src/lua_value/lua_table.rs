// Script-native associative table.
// Entries keep insertion order so `next` can walk them while fields are
// cleared; cleared entries stay as tombstones until the next growth.

use super::{LuaValue, UserdataRef, lua_convert};
use ahash::AHashMap;
use smol_str::SmolStr;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

/// Hashable identity of a table key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TableKey {
    Boolean(bool),
    Integer(i64),
    Float(u64),
    String(SmolStr),
    /// Tables and functions, compared by address
    Object(usize),
    Userdata(UserdataRef),
}

impl TableKey {
    /// `None` for keys that can never be stored (nil and NaN)
    fn from_value(value: &LuaValue) -> Option<TableKey> {
        Some(match value {
            LuaValue::Nil => return None,
            LuaValue::Boolean(b) => TableKey::Boolean(*b),
            LuaValue::Integer(i) => TableKey::Integer(*i),
            LuaValue::Float(f) => {
                if f.is_nan() {
                    return None;
                }
                match lua_convert::float_to_integer(*f) {
                    Some(i) => TableKey::Integer(i),
                    None => TableKey::Float(f.to_bits()),
                }
            }
            LuaValue::String(s) => TableKey::String(s.clone()),
            LuaValue::Table(t) => TableKey::Object(t.as_ptr()),
            LuaValue::Function(f) => TableKey::Object(f.as_ptr()),
            LuaValue::Userdata(u) => TableKey::Userdata(*u),
        })
    }
}

#[derive(Default)]
pub struct LuaTable {
    entries: Vec<(LuaValue, LuaValue)>,
    index: AHashMap<TableKey, usize>,
    tombstones: usize,
    metatable: Option<LuaTableRef>,
}

impl LuaTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        LuaTable {
            entries: Vec::with_capacity(capacity),
            index: AHashMap::with_capacity(capacity),
            tombstones: 0,
            metatable: None,
        }
    }

    pub fn raw_get(&self, key: &LuaValue) -> LuaValue {
        match TableKey::from_value(key) {
            Some(k) => self.get_by_key(&k),
            None => LuaValue::Nil,
        }
    }

    pub fn get_str(&self, key: &str) -> LuaValue {
        self.get_by_key(&TableKey::String(SmolStr::new(key)))
    }

    pub fn get_int(&self, key: i64) -> LuaValue {
        self.get_by_key(&TableKey::Integer(key))
    }

    fn get_by_key(&self, key: &TableKey) -> LuaValue {
        match self.index.get(key) {
            Some(&pos) => self.entries[pos].1.clone(),
            None => LuaValue::Nil,
        }
    }

    /// Raw assignment. Fails for nil and NaN keys with the engine's message.
    pub fn raw_set(&mut self, key: LuaValue, value: LuaValue) -> Result<(), &'static str> {
        let Some(k) = TableKey::from_value(&key) else {
            return Err(if key.is_nil() { "index is nil" } else { "index is NaN" });
        };

        if let Some(&pos) = self.index.get(&k) {
            let slot = &mut self.entries[pos].1;
            match (slot.is_nil(), value.is_nil()) {
                (false, true) => self.tombstones += 1,
                (true, false) => self.tombstones -= 1,
                _ => {}
            }
            *slot = value;
            return Ok(());
        }

        if value.is_nil() {
            return Ok(());
        }

        if self.tombstones > 8 && self.tombstones * 2 > self.entries.len() {
            self.compact();
        }

        // Normalise integral float keys so 1.0 and 1 share a slot
        let key = match &k {
            TableKey::Integer(i) if key.is_number() => LuaValue::Integer(*i),
            _ => key,
        };
        self.index.insert(k, self.entries.len());
        self.entries.push((key, value));
        Ok(())
    }

    pub fn set_str(&mut self, key: &str, value: LuaValue) {
        // String keys are always valid
        let _ = self.raw_set(LuaValue::String(SmolStr::new(key)), value);
    }

    pub fn set_int(&mut self, key: i64, value: LuaValue) {
        let _ = self.raw_set(LuaValue::Integer(key), value);
    }

    fn compact(&mut self) {
        self.entries.retain(|(_, v)| !v.is_nil());
        self.index.clear();
        for (pos, (key, _)) in self.entries.iter().enumerate() {
            if let Some(k) = TableKey::from_value(key) {
                self.index.insert(k, pos);
            }
        }
        self.tombstones = 0;
    }

    /// Border of the sequence part: the largest `n` with `t[n] ~= nil` and
    /// `t[n+1] == nil`, counting up from 1.
    pub fn len(&self) -> i64 {
        let mut n = 0;
        while !self.get_int(n + 1).is_nil() {
            n += 1;
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() == self.tombstones
    }

    /// Traversal step for `next`. `Err(())` when `key` is not in the table.
    #[allow(clippy::result_unit_err)]
    pub fn next(&self, key: &LuaValue) -> Result<Option<(LuaValue, LuaValue)>, ()> {
        let start = if key.is_nil() {
            0
        } else {
            let k = TableKey::from_value(key).ok_or(())?;
            *self.index.get(&k).ok_or(())? + 1
        };

        Ok(self.entries[start.min(self.entries.len())..]
            .iter()
            .find(|(_, v)| !v.is_nil())
            .cloned())
    }

    /// Live key/value pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&LuaValue, &LuaValue)> {
        self.entries.iter().filter(|(_, v)| !v.is_nil()).map(|(k, v)| (k, v))
    }

    pub fn metatable(&self) -> Option<LuaTableRef> {
        self.metatable.clone()
    }

    pub fn set_metatable(&mut self, metatable: Option<LuaTableRef>) {
        self.metatable = metatable;
    }
}

/// Shared handle to a table. Identity is the allocation address.
#[derive(Clone)]
pub struct LuaTableRef(Rc<RefCell<LuaTable>>);

impl LuaTableRef {
    pub fn new(table: LuaTable) -> Self {
        LuaTableRef(Rc::new(RefCell::new(table)))
    }

    pub(crate) fn downgrade(&self) -> Weak<RefCell<LuaTable>> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<RefCell<LuaTable>>) -> Option<Self> {
        weak.upgrade().map(LuaTableRef)
    }

    #[inline]
    pub fn borrow(&self) -> Ref<'_, LuaTable> {
        self.0.borrow()
    }

    #[inline]
    pub fn borrow_mut(&self) -> RefMut<'_, LuaTable> {
        self.0.borrow_mut()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &LuaTableRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[inline]
    pub fn as_ptr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const u8 as usize
    }

    pub fn get(&self, key: &LuaValue) -> LuaValue {
        self.borrow().raw_get(key)
    }

    pub fn get_str(&self, key: &str) -> LuaValue {
        self.borrow().get_str(key)
    }

    pub fn set_str(&self, key: &str, value: LuaValue) {
        self.borrow_mut().set_str(key, value);
    }

    pub fn metatable(&self) -> Option<LuaTableRef> {
        self.borrow().metatable()
    }
}

impl Default for LuaTableRef {
    fn default() -> Self {
        LuaTableRef::new(LuaTable::new())
    }
}

impl fmt::Debug for LuaTableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table: {:#x}", self.as_ptr())
    }
}
