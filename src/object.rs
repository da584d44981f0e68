// File: src/object.rs
//
// The Monkey value universe. Booleans and null are process-wide shared
// singletons compared by pointer identity; strings, arrays, hashes, and
// compiled functions are reference-counted so equality checks at the VM
// level can rely on `Rc::ptr_eq` for identity rather than content
// comparison.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::bytecode::Instructions;

#[derive(Debug, Clone)]
pub enum Object {
    Integer(i64),
    Boolean(Rc<bool>),
    Null(Rc<()>),
    Str(Rc<String>),
    Array(Rc<Vec<Object>>),
    Hash(Rc<HashMap<HashKey, (Object, Object)>>),
    CompiledFunction(Rc<CompiledFunction>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A deterministic `(type-tag, 64-bit key)` pair for the hashable subset
/// of the value universe (integer, boolean, string). Equal content always
/// produces an equal key; the type tag keeps an integer from colliding
/// with a boolean or string that happens to hash the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub type_tag: &'static str,
    pub value: u64,
}

pub static TRUE: Lazy<Object> = Lazy::new(|| Object::Boolean(Rc::new(true)));
pub static FALSE: Lazy<Object> = Lazy::new(|| Object::Boolean(Rc::new(false)));
pub static NULL: Lazy<Object> = Lazy::new(|| Object::Null(Rc::new(())));

/// Maps a native bool to the shared `TRUE`/`FALSE` singleton.
pub fn native_bool_to_object(value: bool) -> Object {
    if value {
        TRUE.clone()
    } else {
        FALSE.clone()
    }
}

impl Object {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Object::Integer(_) => "INTEGER",
            Object::Boolean(_) => "BOOLEAN",
            Object::Null(_) => "NULL",
            Object::Str(_) => "STRING",
            Object::Array(_) => "ARRAY",
            Object::Hash(_) => "HASH",
            Object::CompiledFunction(_) => "COMPILED_FUNCTION",
        }
    }

    pub fn inspect(&self) -> String {
        match self {
            Object::Integer(v) => v.to_string(),
            Object::Boolean(v) => v.to_string(),
            Object::Null(_) => "null".to_string(),
            Object::Str(s) => s.as_ref().clone(),
            Object::Array(elements) => {
                let parts: Vec<String> = elements.iter().map(Object::inspect).collect();
                format!("[{}]", parts.join(", "))
            }
            Object::Hash(pairs) => {
                let parts: Vec<String> = pairs
                    .values()
                    .map(|(k, v)| format!("{}: {}", k.inspect(), v.inspect()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Object::CompiledFunction(f) => format!("CompiledFunction[{:p}]", Rc::as_ptr(f)),
        }
    }

    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Object::Integer(v) => Some(HashKey { type_tag: "INTEGER", value: *v as u64 }),
            Object::Boolean(v) => {
                Some(HashKey { type_tag: "BOOLEAN", value: if **v { 1 } else { 0 } })
            }
            Object::Str(s) => {
                use std::hash::{Hash, Hasher};
                let mut hasher = std::collections::hash_map::DefaultHasher::new();
                s.hash(&mut hasher);
                Some(HashKey { type_tag: "STRING", value: hasher.finish() })
            }
            _ => None,
        }
    }

    /// Reference/content equality as the VM's `OpEqual`/`OpNotEqual` require:
    /// integers compare by value, everything else by identity (strings
    /// included; only `+` concatenates by content).
    pub fn identical(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::Integer(a), Object::Integer(b)) => a == b,
            (Object::Boolean(a), Object::Boolean(b)) => Rc::ptr_eq(a, b),
            (Object::Null(a), Object::Null(b)) => Rc::ptr_eq(a, b),
            (Object::Str(a), Object::Str(b)) => Rc::ptr_eq(a, b),
            (Object::Array(a), Object::Array(b)) => Rc::ptr_eq(a, b),
            (Object::Hash(a), Object::Hash(b)) => Rc::ptr_eq(a, b),
            (Object::CompiledFunction(a), Object::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.inspect())
    }
}
