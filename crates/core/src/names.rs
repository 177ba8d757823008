//! The name table: interned identifiers and fresh-name allocation.
//!
//! Interns strings to deduplicate identifiers and enable fast equality via
//! [`NameRef`] handles. Synthetic names minted during desugaring and
//! rewriting go through [`NameTable::fresh_unique`], which qualifies a base
//! name with a kind tag and a per-scope counter.

use parking_lot::RwLock;
use phf::phf_set;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A unique identifier for an interned name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameRef(u32);

impl NameRef {
    pub fn new(id: u32) -> Self {
        NameRef(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameRef({})", self.0)
    }
}

/// Which phase minted a fresh name. The kind is folded into the mangled
/// spelling so names from different phases can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKind {
    /// Temporaries introduced by the desugar pass.
    Desugar,
    /// Singleton value classes synthesized by the enum-class rewrite.
    TEnum,
}

/// Names with special meaning to desugaring, rewriting, or later phases.
/// Pre-interned at table construction so lookups during lowering are
/// guaranteed cache hits.
static WELL_KNOWN: phf::Set<&'static str> = phf_set! {
    "to_s", "to_a", "to_h", "concat", "merge", "intern", "call", "each",
    "new", "slice", "[]", "==", "===", "!", "|", "<splat>",
    "block_given?", "super", "defined?", "alias_method", "undef", "`",
    "callWithSplat", "callWithSplatAndBlock", "callWithBlock", "expandSplat",
    "Rational", "Complex", "T", "Enum",
    "<blk>", "<singleton>",
    "destructureArg", "assignTemp", "blockPassTemp", "forTemp", "rescueTemp",
    "andAnd", "orOr",
    "describe", "it", "before", "after", "initialize", "<after>", "enums",
    "let", "unsafe", "<self-new>", "instance", "extend", "include",
    "abstract!", "sealed!", "final!", "sig", "void", "const_set",
};

/// Pre-resolved handles for the well-known names. Cheap to copy; the desugar
/// and rewrite passes read these on every arm.
#[derive(Debug, Clone, Copy, Default)]
pub struct Knowns {
    pub to_s: NameRef,
    pub to_a: NameRef,
    pub to_h: NameRef,
    pub concat: NameRef,
    pub merge: NameRef,
    pub intern: NameRef,
    pub call: NameRef,
    pub each: NameRef,
    pub new_: NameRef,
    pub slice: NameRef,
    pub index: NameRef,
    pub eq_eq: NameRef,
    pub triple_eq: NameRef,
    pub bang: NameRef,
    pub or_op: NameRef,
    pub splat: NameRef,
    pub block_given: NameRef,
    pub super_: NameRef,
    pub defined: NameRef,
    pub alias_method: NameRef,
    pub undef: NameRef,
    pub backtick: NameRef,
    pub call_with_splat: NameRef,
    pub call_with_splat_and_block: NameRef,
    pub call_with_block: NameRef,
    pub expand_splat: NameRef,
    pub rational: NameRef,
    pub complex: NameRef,
    pub t_const: NameRef,
    pub enum_const: NameRef,
    pub blk_arg: NameRef,
    pub singleton_class: NameRef,
    pub destructure_arg: NameRef,
    pub assign_temp: NameRef,
    pub block_pass_temp: NameRef,
    pub for_temp: NameRef,
    pub rescue_temp: NameRef,
    pub and_and: NameRef,
    pub or_or: NameRef,
    pub describe: NameRef,
    pub it: NameRef,
    pub before: NameRef,
    pub after: NameRef,
    pub initialize: NameRef,
    pub after_angles: NameRef,
    pub enums: NameRef,
    pub let_: NameRef,
    pub unsafe_: NameRef,
    pub self_new: NameRef,
    pub instance: NameRef,
    pub extend: NameRef,
    pub include: NameRef,
    pub abstract_bang: NameRef,
    pub sealed_bang: NameRef,
    pub final_bang: NameRef,
    pub sig: NameRef,
    pub void: NameRef,
    pub const_set: NameRef,
    pub empty: NameRef,
}

/// Statistics about name table performance.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameTableStats {
    pub total_interns: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub unique_names: usize,
}

impl NameTableStats {
    pub fn hit_rate(&self) -> f64 {
        if self.total_interns == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / self.total_interns as f64) * 100.0
        }
    }
}

/// The name table for one compilation.
#[derive(Serialize, Deserialize)]
pub struct NameTable {
    #[serde(skip)]
    map: HashMap<String, NameRef>,
    strings: Vec<String>,
    #[serde(skip)]
    known: Knowns,
    #[serde(skip)]
    stats: NameTableStats,
}

impl NameTable {
    pub fn new() -> Self {
        let mut table = NameTable {
            map: HashMap::new(),
            strings: Vec::new(),
            known: Knowns::default(),
            stats: NameTableStats::default(),
        };
        for s in WELL_KNOWN.iter() {
            table.intern(s);
        }
        table.known = table.install_knowns();
        table
    }

    fn install_knowns(&mut self) -> Knowns {
        Knowns {
            to_s: self.intern("to_s"),
            to_a: self.intern("to_a"),
            to_h: self.intern("to_h"),
            concat: self.intern("concat"),
            merge: self.intern("merge"),
            intern: self.intern("intern"),
            call: self.intern("call"),
            each: self.intern("each"),
            new_: self.intern("new"),
            slice: self.intern("slice"),
            index: self.intern("[]"),
            eq_eq: self.intern("=="),
            triple_eq: self.intern("==="),
            bang: self.intern("!"),
            or_op: self.intern("|"),
            splat: self.intern("<splat>"),
            block_given: self.intern("block_given?"),
            super_: self.intern("super"),
            defined: self.intern("defined?"),
            alias_method: self.intern("alias_method"),
            undef: self.intern("undef"),
            backtick: self.intern("`"),
            call_with_splat: self.intern("callWithSplat"),
            call_with_splat_and_block: self.intern("callWithSplatAndBlock"),
            call_with_block: self.intern("callWithBlock"),
            expand_splat: self.intern("expandSplat"),
            rational: self.intern("Rational"),
            complex: self.intern("Complex"),
            t_const: self.intern("T"),
            enum_const: self.intern("Enum"),
            blk_arg: self.intern("<blk>"),
            singleton_class: self.intern("<singleton>"),
            destructure_arg: self.intern("destructureArg"),
            assign_temp: self.intern("assignTemp"),
            block_pass_temp: self.intern("blockPassTemp"),
            for_temp: self.intern("forTemp"),
            rescue_temp: self.intern("rescueTemp"),
            and_and: self.intern("andAnd"),
            or_or: self.intern("orOr"),
            describe: self.intern("describe"),
            it: self.intern("it"),
            before: self.intern("before"),
            after: self.intern("after"),
            initialize: self.intern("initialize"),
            after_angles: self.intern("<after>"),
            enums: self.intern("enums"),
            let_: self.intern("let"),
            unsafe_: self.intern("unsafe"),
            self_new: self.intern("<self-new>"),
            instance: self.intern("instance"),
            extend: self.intern("extend"),
            include: self.intern("include"),
            abstract_bang: self.intern("abstract!"),
            sealed_bang: self.intern("sealed!"),
            final_bang: self.intern("final!"),
            sig: self.intern("sig"),
            void: self.intern("void"),
            const_set: self.intern("const_set"),
            empty: self.intern(""),
        }
    }

    /// Intern a string, returning its handle.
    pub fn intern(&mut self, s: &str) -> NameRef {
        self.stats.total_interns += 1;

        if let Some(&name) = self.map.get(s) {
            self.stats.cache_hits += 1;
            return name;
        }

        self.stats.cache_misses += 1;
        let name = NameRef::new(self.strings.len() as u32);
        let string = s.to_string();
        self.strings.push(string.clone());
        self.map.insert(string, name);
        self.stats.unique_names = self.strings.len();
        name
    }

    /// Get the string for a handle.
    pub fn resolve(&self, name: NameRef) -> Option<&str> {
        self.strings.get(name.as_u32() as usize).map(|s| s.as_str())
    }

    /// Mint a fresh name qualified by `kind` and `counter`.
    ///
    /// The same `(kind, base, counter)` triple always yields the same
    /// `NameRef`; distinct triples yield distinct refs. Callers keep a
    /// per-scope counter and pre-increment it before each call.
    pub fn fresh_unique(&mut self, kind: UniqueKind, base: NameRef, counter: u32) -> NameRef {
        let base_str = self.resolve(base).unwrap_or("").to_string();
        let mangled = match kind {
            UniqueKind::Desugar => format!("<{}${}>", base_str, counter),
            UniqueKind::TEnum if counter <= 1 => format!("<TEnum-{}>", base_str),
            UniqueKind::TEnum => format!("<TEnum-{}${}>", base_str, counter),
        };
        self.intern(&mangled)
    }

    /// The setter spelling of a method name (`m` becomes `m=`).
    pub fn setter(&mut self, name: NameRef) -> NameRef {
        let s = format!("{}=", self.resolve(name).unwrap_or(""));
        self.intern(&s)
    }

    /// Pre-resolved well-known names.
    pub fn known(&self) -> Knowns {
        self.known
    }

    /// Whether `s` is one of the names with special downstream meaning.
    pub fn is_well_known(s: &str) -> bool {
        WELL_KNOWN.contains(s)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn stats(&self) -> NameTableStats {
        self.stats
    }

    /// Rebuild the lookup map and well-known handles from the string store.
    /// Needed after deserialization since both are skipped.
    pub fn rebuild(&mut self) {
        self.map.clear();
        for (idx, s) in self.strings.iter().enumerate() {
            self.map.insert(s.clone(), NameRef::new(idx as u32));
        }
        self.known = self.install_knowns();
        self.stats.unique_names = self.strings.len();
    }

    /// Serialize the interned strings to bytes.
    pub fn serialize_to_bytes(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
    }

    /// Deserialize a table from bytes produced by [`serialize_to_bytes`].
    ///
    /// [`serialize_to_bytes`]: NameTable::serialize_to_bytes
    pub fn deserialize_from_bytes(bytes: &[u8]) -> Result<Self, bincode::error::DecodeError> {
        let mut table: NameTable =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?.0;
        table.rebuild();
        Ok(table)
    }
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe name table handle for drivers that parallelize across files.
/// Name allocation is serialized behind the lock, as the concurrency model
/// requires.
pub struct SharedNameTable {
    inner: Arc<RwLock<NameTable>>,
}

impl SharedNameTable {
    pub fn new() -> Self {
        SharedNameTable {
            inner: Arc::new(RwLock::new(NameTable::new())),
        }
    }

    pub fn intern(&self, s: &str) -> NameRef {
        self.inner.write().intern(s)
    }

    pub fn resolve(&self, name: NameRef) -> Option<String> {
        self.inner.read().resolve(name).map(String::from)
    }

    pub fn fresh_unique(&self, kind: UniqueKind, base: NameRef, counter: u32) -> NameRef {
        self.inner.write().fresh_unique(kind, base, counter)
    }

    pub fn known(&self) -> Knowns {
        self.inner.read().known()
    }

    /// Run `f` with exclusive access to the underlying table. A per-file
    /// pass (desugar, rewrite) holds the lock for the whole unit.
    pub fn with<R>(&self, f: impl FnOnce(&mut NameTable) -> R) -> R {
        f(&mut self.inner.write())
    }

    pub fn clone_handle(&self) -> Self {
        SharedNameTable {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for SharedNameTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for SharedNameTable {
    fn clone(&self) -> Self {
        self.clone_handle()
    }
}
