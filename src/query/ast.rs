//! Query abstract syntax tree.

use crate::core::types::Operator;

/// A parsed query: `[in profiles] root (link item)*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ast {
    pub profiles: ProfileSelector,
    pub root: QueryItem,
    pub sequence: Vec<LinkedItem>,
}

impl Ast {
    /// Root followed by every linked item, in query order.
    pub fn items(&self) -> impl Iterator<Item = &QueryItem> {
        std::iter::once(&self.root).chain(self.sequence.iter().map(|l| &l.item))
    }
}

/// Which profiles the query runs under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProfileSelector {
    #[default]
    All,
    Explicit(Vec<String>),
}

/// One item of the query path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryItem {
    pub type_ref: TypeRef,
    pub modifiers: Vec<Modifier>,
}

impl QueryItem {
    pub fn new(type_ref: TypeRef) -> Self {
        Self {
            type_ref,
            modifiers: Vec::new(),
        }
    }

    pub fn with(mut self, modifier: Modifier) -> Self {
        self.modifiers.push(modifier);
        self
    }
}

/// `type` or `namespace.type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Unqualified(String),
    Qualified { namespace: String, type_name: String },
}

impl std::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unqualified(t) => write!(f, "{}", t),
            Self::Qualified {
                namespace,
                type_name,
            } => write!(f, "{}.{}", namespace, type_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    /// `:a,b` or `:*`
    Attrs(AttrSelection),
    /// `?attr eq 'value'`
    Search(SearchExpr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrSelection {
    All,
    Named(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchExpr {
    pub attr: String,
    pub op: Operator,
    pub value: String,
}

/// `-` (short) or `=` (full). Both link the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMarker {
    Short,
    Full,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedItem {
    pub link: LinkMarker,
    pub item: QueryItem,
}
