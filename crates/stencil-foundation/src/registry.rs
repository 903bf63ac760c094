//! Host function metadata.
//!
//! The dependency analyzer needs to know which `tp.<module>.<function>` calls
//! block (prompts, cancellable I/O). That knowledge is passed in as a
//! [`FunctionRegistry`] capability rather than looked up globally.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Scheduling-relevant properties of a host function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionFlags {
    /// No side effects; result depends only on arguments.
    pub pure: bool,
    /// Must not run concurrently with later blocks (e.g. interactive prompt).
    pub barrier: bool,
    /// Long-running and observes cancellation.
    pub cancellable: bool,
}

impl FunctionFlags {
    /// A pure function.
    pub const PURE: FunctionFlags = FunctionFlags {
        pure: true,
        barrier: false,
        cancellable: false,
    };

    /// A barrier function.
    pub const BARRIER: FunctionFlags = FunctionFlags {
        pure: false,
        barrier: true,
        cancellable: false,
    };

    /// A cancellable function.
    pub const CANCELLABLE: FunctionFlags = FunctionFlags {
        pure: false,
        barrier: false,
        cancellable: true,
    };

    /// Whether a block calling this function is a scheduling barrier.
    pub fn is_blocking(&self) -> bool {
        self.barrier || self.cancellable
    }
}

/// Lookup of host function metadata by module and function name.
pub trait FunctionRegistry: Send + Sync {
    /// Flags for `tp.<module>.<function>`, or `None` if unknown.
    fn flags(&self, module: &str, function: &str) -> Option<FunctionFlags>;
}

/// In-memory registry keyed by `"module.function"`.
///
/// Deserializes from a JSON object such as
/// `{ "system.prompt": { "barrier": true } }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticRegistry {
    entries: IndexMap<String, FunctionFlags>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the flags of `module.function`.
    pub fn register(&mut self, module: &str, function: &str, flags: FunctionFlags) {
        self.entries.insert(format!("{module}.{function}"), flags);
    }

    /// Builder form of [`StaticRegistry::register`].
    pub fn with(mut self, module: &str, function: &str, flags: FunctionFlags) -> Self {
        self.register(module, function, flags);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `("module.function", flags)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FunctionFlags)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FunctionRegistry for StaticRegistry {
    fn flags(&self, module: &str, function: &str) -> Option<FunctionFlags> {
        self.entries.get(&format!("{module}.{function}")).copied()
    }
}
