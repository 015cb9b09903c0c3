//! Unit registry — defines code units and shares them by content.
//!
//! Semantically identical evaluators compile to identical normalized `eval`
//! instruction streams; the registry keys loaded units by the Murmur3-F
//! digest of that stream, with the normalized string itself as the collision
//! guard. Concurrent `define` calls for equal content race to insert once;
//! the loser drops its unit and adopts the winner's.

use crate::digest::{content_digest, normalized_method_text};
use crate::error::CompileError;
use crate::types::TypeRegistry;
use crate::unit::{self, LoadedUnit, EVAL_METHOD};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::trace;

/// Dedup identity: digest plus the normalized string as collision guard.
///
/// The digest comparison gives the early exit; the string comparison makes
/// equality exact. The cached 32-bit hash feeds the map's hasher without
/// rehashing the string on every probe.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EntryKey {
    digest: [u8; 16],
    normalized: String,
    cached_hash: u32,
}

impl EntryKey {
    fn new(digest: [u8; 16], normalized: String) -> Self {
        let cached_hash = u32::from_be_bytes(digest[..4].try_into().expect("digest is 16 bytes"));
        Self {
            digest,
            normalized,
            cached_hash,
        }
    }
}

impl Hash for EntryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.cached_hash);
    }
}

/// Registry of defined units, shared by content.
pub struct UnitRegistry {
    types: Arc<TypeRegistry>,
    /// Simple/fully-qualified name → unit. Last definition of a name wins.
    units: DashMap<String, Arc<LoadedUnit>>,
    /// Content identity → the one surviving unit for that content.
    entries: DashMap<EntryKey, Arc<LoadedUnit>>,
}

impl UnitRegistry {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self {
            types,
            units: DashMap::new(),
            entries: DashMap::new(),
        }
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Define every `{name: bytes}` entry, deduplicating by content.
    ///
    /// Returns the unit actually installed for each name — for a duplicate
    /// definition that is the previously loaded unit, and the fresh bytes
    /// are discarded.
    pub fn define(
        &self,
        byte_code: &BTreeMap<String, Vec<u8>>,
    ) -> Result<Vec<Arc<LoadedUnit>>, CompileError> {
        let mut installed = Vec::with_capacity(byte_code.len());

        for (name, bytes) in byte_code {
            // Cheap pre-parse for the dedup key; full verification and
            // linking only happen for content seen for the first time.
            let decoded = crate::chunk::decode_unit(bytes)
                .map_err(|e| CompileError::new(format!("defining '{name}': {}", e.message)))?;
            let normalized = normalized_method_text(&decoded, EVAL_METHOD).ok_or_else(|| {
                CompileError::new(format!("defining '{name}': unit has no {EVAL_METHOD} method"))
            })?;
            let key = EntryKey::new(content_digest(&normalized), normalized);

            let existing = self.entries.get(&key).map(|e| e.value().clone());
            let unit = match existing {
                Some(unit) => {
                    trace!(%name, shared = %unit.name(), "equal content, sharing unit");
                    unit
                }
                None => {
                    let loaded = unit::load(bytes, &self.types)
                        .map_err(|e| CompileError::new(format!("defining '{name}': {}", e.message)))?;
                    // A racing insert of the same key resolves to one
                    // surviving unit; the loser's bytes are dropped here.
                    self.entries.entry(key).or_insert(loaded).value().clone()
                }
            };

            self.units.insert(name.clone(), unit.clone());
            installed.push(unit);
        }

        Ok(installed)
    }

    /// Exact name lookup.
    pub fn lookup(&self, name: &str) -> Option<Arc<LoadedUnit>> {
        self.units.get(name).map(|entry| entry.value().clone())
    }

    /// Number of distinct content entries (for dedup assertions).
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of installed names.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{CodeBuilder, NumKind, Op, UnitBuilder};
    use ruse_ast::ValueKind;

    fn unit_bytes(class_name: &str, lhs: i32) -> Vec<u8> {
        let mut builder = UnitBuilder::new(class_name);
        let a = builder.const_int(lhs);
        let b = builder.const_int(1);
        let mut code = CodeBuilder::new();
        code.emit(Op::Const(a));
        code.emit(Op::Const(b));
        code.emit(Op::Add(NumKind::Int));
        code.emit(Op::Return(ValueKind::Int));
        builder.add_method("eval", "(Ljava/lang/Object;)Ljava/lang/Object;", 2, code.finish().unwrap());
        builder.build()
    }

    fn registry() -> UnitRegistry {
        UnitRegistry::new(TypeRegistry::with_builtins())
    }

    #[test]
    fn define_is_idempotent() {
        let registry = registry();
        let bytes = unit_bytes("ruse.generated.A", 41);
        let map = BTreeMap::from([("ruse.generated.A".to_string(), bytes)]);

        let first = registry.define(&map).unwrap();
        let second = registry.define(&map).unwrap();

        assert_eq!(registry.entry_count(), 1);
        assert_eq!(registry.unit_count(), 1);
        assert!(Arc::ptr_eq(&first[0], &second[0]));
    }

    #[test]
    fn equal_content_shares_one_unit_across_names() {
        let registry = registry();
        // Different unit names, identical eval bodies
        let a = BTreeMap::from([("A".to_string(), unit_bytes("A", 41))]);
        let b = BTreeMap::from([("B".to_string(), unit_bytes("B", 41))]);

        let ua = registry.define(&a).unwrap();
        let ub = registry.define(&b).unwrap();

        assert_eq!(registry.entry_count(), 1);
        assert_eq!(registry.unit_count(), 2);
        assert!(Arc::ptr_eq(&ua[0], &ub[0]));
        assert!(Arc::ptr_eq(
            &registry.lookup("A").unwrap(),
            &registry.lookup("B").unwrap()
        ));
    }

    #[test]
    fn different_content_stays_distinct() {
        let registry = registry();
        registry
            .define(&BTreeMap::from([("A".to_string(), unit_bytes("A", 41))]))
            .unwrap();
        registry
            .define(&BTreeMap::from([("B".to_string(), unit_bytes("B", 99))]))
            .unwrap();
        assert_eq!(registry.entry_count(), 2);
    }

    #[test]
    fn lookup_miss_is_none() {
        assert!(registry().lookup("ghost").is_none());
    }

    #[test]
    fn malformed_bytes_fail_and_are_not_cached() {
        let registry = registry();
        let map = BTreeMap::from([("bad".to_string(), b"not a unit".to_vec())]);
        assert!(registry.define(&map).is_err());
        assert_eq!(registry.entry_count(), 0);
        assert!(registry.lookup("bad").is_none());
    }

    #[test]
    fn concurrent_defines_converge() {
        let registry = Arc::new(registry());
        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = Arc::clone(&registry);
            handles.push(std::thread::spawn(move || {
                let name = format!("ruse.generated.T{i}");
                let map = BTreeMap::from([(name, unit_bytes("ruse.generated.X", 41))]);
                registry.define(&map).unwrap();
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        // All eight names, one shared content entry
        assert_eq!(registry.entry_count(), 1);
        assert_eq!(registry.unit_count(), 8);
        let first = registry.lookup("ruse.generated.T0").unwrap();
        for i in 1..8 {
            let other = registry.lookup(&format!("ruse.generated.T{i}")).unwrap();
            assert!(Arc::ptr_eq(&first, &other));
        }
    }
}
