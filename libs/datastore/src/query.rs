//! Typed query predicates and update patches
//!
//! Filters used to be free-form documents assembled at every call site.
//! Here they are a closed set of tagged clauses that compile down to the
//! same wire-level filter, so call sites stay typo-proof and the backends
//! can interpret them uniformly.

use bson::{Bson, Document, doc};

/// A conjunction of predicate clauses over one collection.
///
/// Clauses on the same field with different operators merge into a single
/// operator document on the wire (`{"x": {"$gte": a, "$lte": b}}`).
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone)]
enum Clause {
    Eq(String, Bson),
    Ne(String, Bson),
    Gte(String, Bson),
    Lte(String, Bson),
    In(String, Vec<Bson>),
    Regex(String, String),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field equals value.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.clauses.push(Clause::Eq(field.into(), value.into()));
        self
    }

    /// Field differs from value; also matches records lacking the field.
    pub fn ne(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.clauses.push(Clause::Ne(field.into(), value.into()));
        self
    }

    /// Field is greater than or equal to value.
    pub fn gte(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.clauses.push(Clause::Gte(field.into(), value.into()));
        self
    }

    /// Field is less than or equal to value.
    pub fn lte(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.clauses.push(Clause::Lte(field.into(), value.into()));
        self
    }

    /// Field value is one of the given values.
    pub fn is_in(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<Bson>>,
    ) -> Self {
        self.clauses.push(Clause::In(
            field.into(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Field matches the regular expression pattern.
    pub fn regex(mut self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.clauses
            .push(Clause::Regex(field.into(), pattern.into()));
        self
    }

    /// At least one of the sub-filters matches.
    pub fn or(mut self, branches: Vec<Filter>) -> Self {
        self.clauses.push(Clause::Or(branches));
        self
    }

    /// Excludes soft-deleted records (`isDeleted != true`).
    pub fn not_deleted(self) -> Self {
        self.ne(crate::record::FIELD_DELETED, true)
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Compile to the wire-level filter document.
    pub fn to_document(&self) -> Document {
        let mut wire = Document::new();
        for clause in &self.clauses {
            match clause {
                Clause::Eq(field, value) => {
                    wire.insert(field, value.clone());
                }
                Clause::Ne(field, value) => {
                    operator(&mut wire, field, "$ne", value.clone());
                }
                Clause::Gte(field, value) => {
                    operator(&mut wire, field, "$gte", value.clone());
                }
                Clause::Lte(field, value) => {
                    operator(&mut wire, field, "$lte", value.clone());
                }
                Clause::In(field, values) => {
                    operator(&mut wire, field, "$in", Bson::Array(values.clone()));
                }
                Clause::Regex(field, pattern) => {
                    operator(&mut wire, field, "$regex", Bson::String(pattern.clone()));
                }
                Clause::Or(branches) => {
                    let docs: Vec<Bson> = branches
                        .iter()
                        .map(|branch| Bson::Document(branch.to_document()))
                        .collect();
                    wire.insert("$or", Bson::Array(docs));
                }
            }
        }
        wire
    }
}

fn operator(wire: &mut Document, field: &str, op: &str, value: Bson) {
    match wire.get_mut(field) {
        Some(Bson::Document(existing)) if existing.keys().all(|k| k.starts_with('$')) => {
            existing.insert(op, value);
        }
        _ => {
            wire.insert(field, doc! { op: value });
        }
    }
}

/// An update patch; compiles to a `$set` wire document.
///
/// The `_updated_at` stamp is not set here; the store re-stamps it on
/// every update regardless of what the patch contains.
#[derive(Debug, Clone, Default)]
pub struct Patch {
    set: Document,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    /// Marks the matched records soft-deleted.
    pub fn soft_delete(self) -> Self {
        self.set(crate::record::FIELD_DELETED, true)
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Compile to the wire-level update document.
    pub fn to_document(&self) -> Document {
        doc! { "$set": self.set.clone() }
    }
}
