//! Declarative structured extraction over a parsed document tree.
//!
//! A [`SelectorSpec`] describes the shape of the data inside a page: each
//! field is either a *leaf* (one path expression yielding scalar values) or
//! an *inner node* (a path expression selecting child nodes plus a nested
//! spec applied to each child). [`extract`] walks the spec recursively and
//! returns nested records, so a vendor connector is just a spec plus a
//! cleaning function — no per-vendor traversal code.
//!
//! The tree-query mechanism itself is pluggable through [`PathLookup`];
//! [`css::CssLookup`] implements it with CSS selectors, but anything that
//! deterministically returns an ordered match list satisfies the contract.
//!
//! ## Failure containment
//!
//! One malformed rule or one failing path expression never aborts the
//! record: the field is logged and set to [`FieldValue::Absent`], an
//! explicit marker rather than a silent null, and every other field is
//! still extracted. A path expression that matches nothing is an empty
//! scalar list, not an error.
//!
//! No normalization (whitespace, case, joining) happens here — the output
//! is byte-for-byte what the document contains. Joining multi-valued
//! leaves into table cells is a table-construction policy; see
//! [`records_to_table`].

pub mod css;

use crate::error::PathError;
use crate::table::{Table, Value};
use tracing::{debug, warn};

/// One field rule inside a [`SelectorSpec`].
///
/// `Malformed` can only arise from [`SelectorSpec::from_json`]; the typed
/// builder API constructs `Leaf` and `Inner` exclusively.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorRule {
    /// A single path expression yielding a list of scalar values.
    Leaf(String),
    /// A path expression selecting child nodes, plus a spec for each child.
    Inner(String, SelectorSpec),
    /// An untyped rule that was neither a string nor a (path, spec) pair.
    /// Carries the offending JSON text for the diagnostic.
    Malformed(String),
}

/// An ordered mapping of field name → [`SelectorRule`]. Names are unique
/// within a level; evaluation follows insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectorSpec {
    fields: Vec<(String, SelectorRule)>,
}

impl SelectorSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a leaf field. Replaces any existing rule with the same name.
    pub fn leaf(mut self, name: &str, path: &str) -> Self {
        self.insert(name, SelectorRule::Leaf(path.to_string()));
        self
    }

    /// Add an inner-node field with a nested spec.
    pub fn inner(mut self, name: &str, path: &str, spec: SelectorSpec) -> Self {
        self.insert(name, SelectorRule::Inner(path.to_string(), spec));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, SelectorRule)> {
        self.fields.iter()
    }

    /// Build a spec from untyped JSON, mirroring the dict-shaped specs the
    /// connectors were originally written with:
    ///
    /// ```json
    /// {
    ///   "Pubs": ["article", { "Name": "h1.entry-title ::text",
    ///                         "URL":  "div.particulars a ::attr(href)" }],
    ///   "Alerts": "span.alert ::text"
    /// }
    /// ```
    ///
    /// A string is a leaf; a two-element `[path, object]` array is an inner
    /// node; anything else becomes [`SelectorRule::Malformed`] so the bad
    /// field degrades at extraction time instead of failing the whole spec.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let mut spec = SelectorSpec::new();
        let Some(object) = json.as_object() else {
            warn!("Selector spec is not a JSON object: {json}");
            return spec;
        };

        for (name, rule) in object {
            let parsed = match rule {
                serde_json::Value::String(path) => SelectorRule::Leaf(path.clone()),
                serde_json::Value::Array(pair) if pair.len() == 2 => {
                    match (pair[0].as_str(), pair[1].as_object()) {
                        (Some(path), Some(_)) => {
                            SelectorRule::Inner(path.to_string(), Self::from_json(&pair[1]))
                        }
                        _ => SelectorRule::Malformed(rule.to_string()),
                    }
                }
                other => SelectorRule::Malformed(other.to_string()),
            };
            spec.insert(name, parsed);
        }
        spec
    }

    fn insert(&mut self, name: &str, rule: SelectorRule) {
        if let Some(existing) = self.fields.iter_mut().find(|(n, _)| n == name) {
            existing.1 = rule;
        } else {
            self.fields.push((name.to_string(), rule));
        }
    }
}

/// Evaluates path expressions against one node of a parsed document.
///
/// Implementations must be deterministic: the same node and path always
/// yield the same ordered match list. An expression that matches nothing
/// returns an empty list, not an error; `Err` is reserved for expressions
/// that cannot be evaluated at all (e.g. a syntactically invalid selector).
pub trait PathLookup {
    type Node: Clone;

    /// Child nodes matched by `path` under `node`.
    fn nodes(&self, node: &Self::Node, path: &str) -> Result<Vec<Self::Node>, PathError>;

    /// Scalar values matched by `path` under `node`.
    fn values(&self, node: &Self::Node, path: &str) -> Result<Vec<String>, PathError>;
}

/// The value of one extracted field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<N: Clone> {
    /// Leaf result: zero or more scalar values, document order.
    Scalars(Vec<String>),
    /// Inner-node result: one extraction per matched child.
    Records(Vec<Extracted<N>>),
    /// Explicit marker for a malformed rule or a failed path expression.
    Absent,
}

/// A freshly extracted record: ordered field name → [`FieldValue`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecord<N: Clone> {
    fields: Vec<(String, FieldValue<N>)>,
}

impl<N: Clone> ExtractedRecord<N> {
    pub fn get(&self, name: &str) -> Option<&FieldValue<N>> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, FieldValue<N>)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Result of [`extract`]: the node itself for an empty spec, a record
/// otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted<N: Clone> {
    Node(N),
    Record(ExtractedRecord<N>),
}

impl<N: Clone> Extracted<N> {
    pub fn as_record(&self) -> Option<&ExtractedRecord<N>> {
        match self {
            Extracted::Record(r) => Some(r),
            Extracted::Node(_) => None,
        }
    }
}

/// Recursively map a [`SelectorSpec`] over a document node.
///
/// * Empty spec → `Extracted::Node(node)`, the identity escape hatch for
///   values that need no further extraction.
/// * Leaf rule → `lookup.values(node, path)` under the field name.
/// * Inner rule → `lookup.nodes(node, path)`, then a recursive extraction
///   of the nested spec over each child.
/// * Malformed rule or path failure → diagnostic + [`FieldValue::Absent`];
///   the rest of the record is unaffected.
pub fn extract<L: PathLookup>(
    lookup: &L,
    node: &L::Node,
    spec: &SelectorSpec,
) -> Extracted<L::Node> {
    if spec.is_empty() {
        debug!("Empty spec: returning node unchanged");
        return Extracted::Node(node.clone());
    }

    let mut fields = Vec::with_capacity(spec.fields.len());

    for (name, rule) in spec.iter() {
        let value = match rule {
            SelectorRule::Leaf(path) => match lookup.values(node, path) {
                Ok(scalars) => FieldValue::Scalars(scalars),
                Err(e) => {
                    warn!("Field '{name}': {e}. Marking absent");
                    FieldValue::Absent
                }
            },
            SelectorRule::Inner(path, nested) => match lookup.nodes(node, path) {
                Ok(children) => FieldValue::Records(
                    children
                        .iter()
                        .map(|child| extract(lookup, child, nested))
                        .collect(),
                ),
                Err(e) => {
                    warn!("Field '{name}': {e}. Marking absent");
                    FieldValue::Absent
                }
            },
            SelectorRule::Malformed(repr) => {
                warn!("Field '{name}': bad rule {repr}. Marking absent");
                FieldValue::Absent
            }
        };
        fields.push((name.clone(), value));
    }

    Extracted::Record(ExtractedRecord { fields })
}

/// Assemble a table from extracted records, one row per record.
///
/// Multi-valued leaf fields are joined with `separator`; an empty match
/// list and an absent field both become `Null` — downstream stages treat
/// empty and absent as equivalent. Nested record fields do not fit a flat
/// row and become `Null` (callers wanting them should extract at the
/// child level instead).
pub fn records_to_table<N: Clone>(records: &[&ExtractedRecord<N>], separator: &str) -> Table {
    let mut table = Table::new();
    for record in records {
        let mut pairs = Vec::with_capacity(record.len());
        for (name, value) in record.iter() {
            let cell = match value {
                FieldValue::Scalars(scalars) if scalars.is_empty() => Value::Null,
                FieldValue::Scalars(scalars) => Value::Str(scalars.join(separator)),
                FieldValue::Records(_) => {
                    debug!("Field '{name}' holds nested records; writing Null");
                    Value::Null
                }
                FieldValue::Absent => Value::Null,
            };
            pairs.push((name.clone(), cell));
        }
        table.push_row(pairs);
    }
    table
}
