use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

/// Answers whether files stored under a module's `moddata` may render inline.
pub type TrustPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct ModuleHandler {
    trust: Option<TrustPredicate>,
}

impl ModuleHandler {
    /// Installed module without a trust predicate; its files always download.
    pub fn without_trust() -> Self { Self { trust: None } }

    pub fn with_trust<F>(f: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self { trust: Some(Arc::new(f)) }
    }
}

impl fmt::Debug for ModuleHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandler").field("trust", &self.trust.is_some()).finish()
    }
}

/// Installed activity modules keyed by sanitized name.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    handlers: BTreeMap<String, ModuleHandler>,
}

static UNSAFE_DIR_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap());

/// Strip everything but `[A-Za-z0-9_-]`, the only characters allowed in a module name.
pub fn sanitize_module_name(raw: &str) -> String {
    UNSAFE_DIR_CHARS.replace_all(raw, "").into_owned()
}

impl ModuleRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn register(&mut self, name: &str, handler: ModuleHandler) {
        self.handlers.insert(sanitize_module_name(name), handler);
    }

    pub fn is_installed(&self, name: &str) -> bool {
        let key = sanitize_module_name(name);
        !key.is_empty() && self.handlers.contains_key(&key)
    }

    /// `Some(trusted)` when the module registered a predicate, `None` otherwise.
    pub fn trust(&self, name: &str) -> Option<bool> {
        let handler = self.handlers.get(&sanitize_module_name(name))?;
        handler.trust.as_ref().map(|f| f())
    }

    pub fn installed(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(|k| k.as_str())
    }
}
