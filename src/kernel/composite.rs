//! Records, tuples and native objects
//!
//! Every composite has a label and fields sorted by [`Feature`] order, so
//! `feature_at` is strictly increasing and `select` is a binary search.
//! Native objects expose their operations through an [`ObjProcTable`]: one
//! static table per object type, shared by every instance.

use std::fmt;
use std::sync::Arc;

use crate::error::{KernelError, KernelResult};
use crate::kernel::actor::ActorRefObj;
use crate::kernel::env::Env;
use crate::kernel::feature::Feature;
use crate::kernel::instr::Operand;
use crate::kernel::machine::Machine;
use crate::kernel::native::cell::CellObj;
use crate::kernel::proc::{ObjProcBinding, Proc};
use crate::kernel::value::{Literal, Printer, Value, ValueOrVar};

/// Indexed access shared by records and objects
pub trait Composite {
    fn label(&self) -> Literal;

    fn field_count(&self) -> usize;

    fn feature_at(&self, index: usize) -> Result<Feature, KernelError>;

    fn value_at(&self, index: usize) -> Result<ValueOrVar, KernelError>;

    fn select(&self, feature: &Feature) -> Result<ValueOrVar, KernelError>;

    fn field_at(&self, index: usize) -> Result<(Feature, ValueOrVar), KernelError> {
        Ok((self.feature_at(index)?, self.value_at(index)?))
    }
}

/// Record field
#[derive(Debug, Clone)]
pub struct Field {
    pub feature: Feature,
    pub value: ValueOrVar,
}

/// Labelled record. A tuple is a record whose features are `0..n`.
#[derive(Debug, Clone)]
pub struct Rec {
    label: Literal,
    fields: Vec<Field>,
}

impl Rec {
    pub fn builder() -> RecBuilder {
        RecBuilder::new()
    }

    /// Tuple with features `0..values.len()`
    pub fn tuple(label: Literal, values: Vec<ValueOrVar>) -> Rec {
        Rec {
            label,
            fields: values
                .into_iter()
                .enumerate()
                .map(|(i, value)| Field {
                    feature: Feature::Int(i as i64),
                    value,
                })
                .collect(),
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_tuple(&self) -> bool {
        self.fields
            .iter()
            .enumerate()
            .all(|(i, field)| field.feature == Feature::Int(i as i64))
    }

    fn index_of(&self, feature: &Feature) -> Option<usize> {
        self.fields
            .binary_search_by(|field| field.feature.cmp(feature))
            .ok()
    }

    pub fn contains(&self, feature: &Feature) -> bool {
        self.index_of(feature).is_some()
    }

    /// Same label with each field value replaced
    pub(crate) fn map_values<F>(&self, mut f: F) -> KernelResult<Rec>
    where
        F: FnMut(&ValueOrVar) -> KernelResult<ValueOrVar>,
    {
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            fields.push(Field {
                feature: field.feature.clone(),
                value: f(&field.value)?,
            });
        }
        Ok(Rec {
            label: self.label.clone(),
            fields,
        })
    }

    pub(crate) fn fmt_fields(&self, f: &mut fmt::Formatter<'_>, printer: &mut Printer) -> fmt::Result {
        match &self.label {
            Literal::Null => {}
            Literal::Str(s) => write!(f, "{}#", s)?,
            other => write!(f, "{}#", other)?,
        }
        let tuple = self.is_tuple();
        f.write_str(if tuple { "[" } else { "{" })?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if !tuple {
                match &field.feature {
                    Feature::Str(s) => write!(f, "{}: ", s)?,
                    other => write!(f, "{}: ", other)?,
                }
            }
            printer.value_or_var(f, &field.value)?;
        }
        f.write_str(if tuple { "]" } else { "}" })
    }
}

impl Composite for Rec {
    fn label(&self) -> Literal {
        self.label.clone()
    }

    fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn feature_at(&self, index: usize) -> Result<Feature, KernelError> {
        self.fields
            .get(index)
            .map(|field| field.feature.clone())
            .ok_or(KernelError::IndexOutOfBounds {
                index,
                count: self.fields.len(),
            })
    }

    fn value_at(&self, index: usize) -> Result<ValueOrVar, KernelError> {
        self.fields
            .get(index)
            .map(|field| field.value.clone())
            .ok_or(KernelError::IndexOutOfBounds {
                index,
                count: self.fields.len(),
            })
    }

    fn select(&self, feature: &Feature) -> Result<ValueOrVar, KernelError> {
        self.index_of(feature)
            .map(|index| self.fields[index].value.clone())
            .ok_or_else(|| KernelError::feature_not_found(feature, self))
    }
}

impl fmt::Display for Rec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Printer::new().rec(f, self)
    }
}

/// Builds a record, sorting fields and rejecting duplicate features
#[derive(Debug, Default)]
pub struct RecBuilder {
    label: Option<Literal>,
    fields: Vec<Field>,
}

impl RecBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(mut self, label: Literal) -> Self {
        self.label = Some(label);
        self
    }

    pub fn field(mut self, feature: impl Into<Feature>, value: impl Into<ValueOrVar>) -> Self {
        self.add(feature.into(), value.into());
        self
    }

    pub fn add(&mut self, feature: Feature, value: ValueOrVar) {
        self.fields.push(Field { feature, value });
    }

    pub fn build(mut self) -> Result<Rec, KernelError> {
        self.fields.sort_by(|a, b| a.feature.cmp(&b.feature));
        if let Some(pair) = self.fields.windows(2).find(|w| w[0].feature == w[1].feature) {
            return Err(KernelError::InvalidArgument(format!(
                "duplicate feature {}",
                pair[0].feature
            )));
        }
        Ok(Rec {
            label: self.label.unwrap_or(Literal::Null),
            fields: self.fields,
        })
    }
}

/// Native procedure operating on an object of type `T`
pub type ObjProc<T> = fn(&T, &[Operand], &Env, &mut Machine) -> KernelResult<()>;

/// Named procedure table entry
pub struct ObjProcEntry<T: 'static> {
    pub name: &'static str,
    pub proc: ObjProc<T>,
}

/// Immutable procedure table shared by all instances of an object type.
/// Entries must be sorted by name.
pub struct ObjProcTable<T: 'static> {
    entries: &'static [ObjProcEntry<T>],
}

impl<T: 'static> ObjProcTable<T> {
    pub const fn new(entries: &'static [ObjProcEntry<T>]) -> Self {
        ObjProcTable { entries }
    }

    pub fn field_count(&self) -> usize {
        self.entries.len()
    }

    pub fn feature_at(&self, index: usize) -> Result<Feature, KernelError> {
        self.entry(index).map(|entry| Feature::str(entry.name))
    }

    pub fn entry(&self, index: usize) -> Result<&'static ObjProcEntry<T>, KernelError> {
        self.entries.get(index).ok_or(KernelError::IndexOutOfBounds {
            index,
            count: self.entries.len(),
        })
    }

    /// Index of the entry named by `feature`
    pub fn index_of(&self, feature: &Feature) -> Option<usize> {
        match feature {
            Feature::Str(name) => self
                .entries
                .binary_search_by(|entry| (*entry.name).cmp(&**name))
                .ok(),
            _ => None,
        }
    }

    pub fn is_sorted(&self) -> bool {
        self.entries.windows(2).all(|w| w[0].name < w[1].name)
    }
}

/// Native object
#[derive(Debug, Clone)]
pub enum Obj {
    Cell(Arc<CellObj>),
    ActorRef(ActorRefObj),
}

impl Obj {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Obj::Cell(_) => "Cell",
            Obj::ActorRef(_) => "ActorRef",
        }
    }

    fn table_index(&self, feature: &Feature) -> Option<usize> {
        match self {
            Obj::Cell(_) => CellObj::procs().index_of(feature),
            Obj::ActorRef(_) => ActorRefObj::procs().index_of(feature),
        }
    }

    fn bind(&self, index: usize) -> ValueOrVar {
        ValueOrVar::Value(Value::Proc(Proc::Bound(ObjProcBinding::new(self.clone(), index))))
    }

    /// Run the table entry at `index` against this object
    pub(crate) fn apply_entry(
        &self,
        index: usize,
        args: &[Operand],
        env: &Env,
        machine: &mut Machine,
    ) -> KernelResult<()> {
        match self {
            Obj::Cell(cell) => (CellObj::procs().entry(index)?.proc)(cell, args, env, machine),
            Obj::ActorRef(actor) => {
                (ActorRefObj::procs().entry(index)?.proc)(actor, args, env, machine)
            }
        }
    }

    pub(crate) fn entry_name(&self, index: usize) -> &'static str {
        let entry = match self {
            Obj::Cell(_) => CellObj::procs().entry(index).map(|e| e.name),
            Obj::ActorRef(_) => ActorRefObj::procs().entry(index).map(|e| e.name),
        };
        entry.unwrap_or("?")
    }

    /// Same object instance
    pub fn same(&self, other: &Obj) -> bool {
        match (self, other) {
            (Obj::Cell(a), Obj::Cell(b)) => Arc::ptr_eq(a, b),
            (Obj::ActorRef(a), Obj::ActorRef(b)) => a.same(b),
            _ => false,
        }
    }
}

impl Composite for Obj {
    fn label(&self) -> Literal {
        Literal::Null
    }

    fn field_count(&self) -> usize {
        match self {
            Obj::Cell(_) => CellObj::procs().field_count(),
            Obj::ActorRef(_) => ActorRefObj::procs().field_count(),
        }
    }

    fn feature_at(&self, index: usize) -> Result<Feature, KernelError> {
        match self {
            Obj::Cell(_) => CellObj::procs().feature_at(index),
            Obj::ActorRef(_) => ActorRefObj::procs().feature_at(index),
        }
    }

    fn value_at(&self, index: usize) -> Result<ValueOrVar, KernelError> {
        if index >= self.field_count() {
            return Err(KernelError::IndexOutOfBounds {
                index,
                count: self.field_count(),
            });
        }
        Ok(self.bind(index))
    }

    fn select(&self, feature: &Feature) -> Result<ValueOrVar, KernelError> {
        self.table_index(feature)
            .map(|index| self.bind(index))
            .ok_or_else(|| KernelError::feature_not_found(feature, self))
    }
}

impl fmt::Display for Obj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Obj::Cell(_) => f.write_str("<cell>"),
            Obj::ActorRef(actor) => write!(f, "<actor {}>", actor.address()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Rec {
        Rec::builder()
            .field("b", Value::int32(2))
            .field(Feature::Int(0), Value::int32(0))
            .field("a", Value::int32(1))
            .field(Feature::Null, Value::null())
            .build()
            .unwrap()
    }

    #[test]
    fn test_fields_sorted_on_build() {
        let rec = sample();
        let features: Vec<Feature> = (0..rec.field_count())
            .map(|i| rec.feature_at(i).unwrap())
            .collect();
        assert_eq!(
            features,
            vec![Feature::str("a"), Feature::str("b"), Feature::Int(0), Feature::Null]
        );
    }

    #[test]
    fn test_select_and_bounds() {
        let rec = sample();
        assert_eq!(rec.select(&Feature::str("b")).unwrap().to_string(), "2");
        assert!(matches!(
            rec.select(&Feature::str("zz")),
            Err(KernelError::FeatureNotFound { .. })
        ));
        assert!(matches!(
            rec.feature_at(4),
            Err(KernelError::IndexOutOfBounds { index: 4, count: 4 })
        ));
    }

    #[test]
    fn test_duplicate_feature_rejected() {
        let result = Rec::builder()
            .field("a", Value::int32(1))
            .field("a", Value::int32(2))
            .build();
        assert!(matches!(result, Err(KernelError::InvalidArgument(_))));
    }

    #[test]
    fn test_display_tuple_and_record() {
        let tuple = Rec::tuple(Literal::Null, vec![Value::int32(1).into(), Value::int32(2).into()]);
        assert_eq!(tuple.to_string(), "[1, 2]");
        let rec = Rec::builder()
            .label(Literal::str("error"))
            .field("name", Value::str("X"))
            .build()
            .unwrap();
        assert_eq!(rec.to_string(), "error#{name: 'X'}");
    }

    #[test]
    fn test_proc_tables_sorted() {
        assert!(CellObj::procs().is_sorted());
        assert!(ActorRefObj::procs().is_sorted());
    }
}
