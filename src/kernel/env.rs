//! Immutable environments mapping identifiers to variables

use std::fmt;
use std::sync::Arc;

use crate::error::KernelError;
use crate::kernel::feature::Ident;
use crate::kernel::value::Value;
use crate::kernel::var::Var;

/// Identifier binding in a frame
#[derive(Debug, Clone)]
pub struct EnvEntry {
    pub ident: Ident,
    pub var: Var,
}

impl EnvEntry {
    pub fn new(ident: impl Into<Ident>, var: Var) -> Self {
        EnvEntry {
            ident: ident.into(),
            var,
        }
    }
}

struct EnvFrame {
    parent: Option<Env>,
    entries: Vec<EnvEntry>,
}

/// Chained frame of identifier bindings. Never mutated after construction.
#[derive(Clone)]
pub struct Env(Arc<EnvFrame>);

impl Env {
    pub fn empty() -> Self {
        Env::new(None, Vec::new())
    }

    pub fn new(parent: Option<Env>, entries: Vec<EnvEntry>) -> Self {
        Env(Arc::new(EnvFrame { parent, entries }))
    }

    /// Child frame on top of this one
    pub fn extend(&self, entries: Vec<EnvEntry>) -> Env {
        Env::new(Some(self.clone()), entries)
    }

    /// Child frame binding each identifier to a fresh unbound variable
    pub fn extend_fresh(&self, idents: &[Ident]) -> Env {
        self.extend(
            idents
                .iter()
                .map(|ident| EnvEntry::new(ident.clone(), Var::new()))
                .collect(),
        )
    }

    /// Look up the nearest binding of `ident`
    pub fn get(&self, ident: &Ident) -> Option<Var> {
        let mut frame = Some(self);
        while let Some(env) = frame {
            // Later entries shadow earlier ones in the same frame
            if let Some(entry) = env.0.entries.iter().rev().find(|e| &e.ident == ident) {
                return Some(entry.var.clone());
            }
            frame = env.0.parent.as_ref();
        }
        None
    }

    pub fn var(&self, ident: &Ident) -> Result<Var, KernelError> {
        self.get(ident)
            .ok_or_else(|| KernelError::IdentNotFound(ident.to_string()))
    }

    /// Entries of this frame only
    pub fn entries(&self) -> &[EnvEntry] {
        &self.0.entries
    }

    pub fn parent(&self) -> Option<&Env> {
        self.0.parent.as_ref()
    }

    /// Frame binding each identifier to a variable holding the given value
    pub fn with_values<I>(parent: Option<Env>, values: I) -> Env
    where
        I: IntoIterator<Item = (Ident, Value)>,
    {
        Env::new(
            parent,
            values
                .into_iter()
                .map(|(ident, value)| EnvEntry::new(ident, Var::bound(value)))
                .collect(),
        )
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let idents: Vec<&str> = self.0.entries.iter().map(|e| e.ident.as_str()).collect();
        f.debug_struct("Env")
            .field("entries", &idents)
            .field("has_parent", &self.0.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_through_parent() {
        let root = Env::with_values(None, vec![(Ident::new("x"), Value::int32(1))]);
        let child = root.extend_fresh(&[Ident::new("y")]);
        assert!(child.var(&Ident::new("x")).unwrap().is_bound());
        assert!(!child.var(&Ident::new("y")).unwrap().is_bound());
        assert!(matches!(
            child.var(&Ident::new("z")),
            Err(KernelError::IdentNotFound(_))
        ));
    }

    #[test]
    fn test_child_shadows_parent() {
        let root = Env::with_values(None, vec![(Ident::new("x"), Value::int32(1))]);
        let child = Env::with_values(Some(root), vec![(Ident::new("x"), Value::int32(2))]);
        let value = child.var(&Ident::new("x")).unwrap().resolve_value().unwrap();
        assert_eq!(value.to_string(), "2");
    }
}
