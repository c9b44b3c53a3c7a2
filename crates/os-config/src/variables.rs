//! # Variable Resolver
//!
//! Resolves `variables { ... }` blocks so the rest of a config can refer to
//! `var.<name>`. Variables may reference each other in any order:
//!
//! ```hcl
//! variables {
//!   a = var.b + 1
//!   b = 2
//!   c = { x = var.a, y = [var.b, 3] }
//!   var "d" { value = upper("x") }
//! }
//! ```
//!
//! ## Algorithm
//!
//! Every attribute is inserted into an arena-backed tree keyed by path.
//! Array and object literals are expanded into child nodes so that a
//! reference like `var.c.y[0]` can be resolved without evaluating the rest
//! of `c`. Resolution is lazy and depth-first:
//!
//! 1. A reference is matched against the tree by walking its static path
//!    and stopping at the first node that already has a value.
//! 2. Entering a node that is being resolved but has no value yet means the
//!    variable depends on itself; a single `CircularReference` diagnostic is
//!    raised and resolution stops.
//! 3. A leaf is evaluated in a cloned context where `var` is bound to a tree
//!    holding only the values it references.
//! 4. Once all children of a map or list have values, the node is folded
//!    into a single object or tuple value.

use crate::diagnostics::{Diagnostic, DiagnosticKind, SourceRange};
use hcl::eval::{Context, Evaluate};
use hcl::expr::{Expression, ObjectKey, TemplateExpr, TraversalOperator};
use hcl::template::{Directive, Element, Template};
use hcl::{Block, Body, Map, Structure, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::trace;

/// Identifier of the block that declares variables.
pub const VARIABLES_BLOCK: &str = "variables";

/// Identifier of the named-variable block inside `variables`.
const VAR_BLOCK: &str = "var";

/// Name under which resolved variables are bound.
pub const VAR_NAMESPACE: &str = "var";

/// One step of a variable path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Name(String),
    Index(usize),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A `variables` block together with the file it came from.
#[derive(Debug, Clone)]
pub struct SourcedBlock {
    pub filename: String,
    pub block: Block,
}

/// Move every `variables` block out of `body`, at any depth.
#[must_use]
pub fn split_variables(body: Body, filename: &str) -> (Body, Vec<SourcedBlock>) {
    let mut found = Vec::new();
    let rest = strip_variables(body, filename, &mut found);
    (rest, found)
}

fn strip_variables(body: Body, filename: &str, found: &mut Vec<SourcedBlock>) -> Body {
    body.into_iter()
        .filter_map(|structure| match structure {
            Structure::Block(block) if block.identifier.as_str() == VARIABLES_BLOCK => {
                found.push(SourcedBlock {
                    filename: filename.to_string(),
                    block,
                });
                None
            }
            Structure::Block(mut block) => {
                block.body = strip_variables(block.body, filename, found);
                Some(Structure::Block(block))
            }
            other => Some(other),
        })
        .collect()
}

/// Resolve `blocks` and bind the result as `var` in `ctx`.
pub fn resolve_variables(blocks: &[SourcedBlock], ctx: &mut Context<'_>) -> Result<(), Diagnostic> {
    let mut tree = VariableTree::new();
    for sourced in blocks {
        tree.insert_block(sourced)?;
    }
    let value = tree.resolve(ctx)?;
    ctx.declare_var(VAR_NAMESPACE, value);
    Ok(())
}

type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Scalar,
    Map,
    List,
}

#[derive(Debug, Clone)]
struct Node {
    key: Key,
    parent: Option<NodeId>,
    shape: Shape,
    /// Unresolved expression; only set on scalar nodes.
    expr: Option<Expression>,
    value: Option<Value>,
    /// Declared element count of a map or list.
    size: usize,
    visited: bool,
    children: Vec<NodeId>,
    location: SourceRange,
}

/// Arena of variable nodes rooted at `var`.
#[derive(Debug, Clone)]
pub struct VariableTree {
    nodes: Vec<Node>,
}

impl Default for VariableTree {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableTree {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                key: Key::Name(VAR_NAMESPACE.to_string()),
                parent: None,
                shape: Shape::Map,
                expr: None,
                value: None,
                size: 0,
                visited: false,
                children: Vec::new(),
                location: SourceRange::file(""),
            }],
        }
    }

    /// Insert the contents of one `variables` block.
    pub fn insert_block(&mut self, sourced: &SourcedBlock) -> Result<(), Diagnostic> {
        let location = SourceRange::new(sourced.filename.clone(), VARIABLES_BLOCK);
        self.insert_body(ROOT, &sourced.block.body, &location, true)
    }

    fn insert_body(
        &mut self,
        parent: NodeId,
        body: &Body,
        location: &SourceRange,
        top_level: bool,
    ) -> Result<(), Diagnostic> {
        let mut attributes: Vec<_> = body.attributes().collect();
        attributes.sort_by(|a, b| a.key.as_str().cmp(b.key.as_str()));
        for attr in attributes {
            let key = attr.key.as_str();
            self.insert_expr(parent, Key::Name(key.to_string()), &attr.expr, location.attr(key))?;
        }

        let mut blocks: Vec<_> = body.blocks().collect();
        blocks.sort_by_key(|b| block_path(b));
        for block in blocks {
            let mut path = block_path(block);
            if top_level && block.identifier.as_str() == VAR_BLOCK {
                path.remove(0);
                if path.is_empty() {
                    return Err(Diagnostic::error(
                        DiagnosticKind::Variable,
                        "Missing variable name",
                        "a var block requires a name label",
                    )
                    .at(location.attr(VAR_BLOCK)));
                }
            }
            let mut node = parent;
            let mut node_location = location.clone();
            for name in &path {
                node_location = node_location.attr(name);
                let child = self.map_child(node, Key::Name(name.clone()), &node_location);
                self.nodes[node].size = self.nodes[node].children.len();
                node = child;
            }
            self.insert_body(node, &block.body, &node_location, false)?;
        }

        self.nodes[parent].size = self.nodes[parent].children.len();
        Ok(())
    }

    fn insert_expr(
        &mut self,
        parent: NodeId,
        key: Key,
        expr: &Expression,
        location: SourceRange,
    ) -> Result<(), Diagnostic> {
        match expr {
            Expression::Array(items) => {
                let id = self.reset_child(parent, key, Shape::List, None, location.clone());
                self.nodes[id].size = items.len();
                for (i, item) in items.iter().enumerate() {
                    self.insert_expr(id, Key::Index(i), item, location.index(i))?;
                }
            }
            Expression::Object(object) => {
                let id = self.reset_child(parent, key, Shape::Map, None, location.clone());
                self.nodes[id].size = object.len();
                let mut seen = HashSet::new();
                for (object_key, value) in object {
                    let name = literal_key(object_key, &location)?;
                    if !seen.insert(name.clone()) {
                        return Err(Diagnostic::error(
                            DiagnosticKind::Variable,
                            "Duplicate map key",
                            format!("key {name:?} is defined more than once"),
                        )
                        .at(location.clone()));
                    }
                    let child_location = location.attr(&name);
                    self.insert_expr(id, Key::Name(name), value, child_location)?;
                }
            }
            other => {
                self.reset_child(parent, key, Shape::Scalar, Some(other.clone()), location);
            }
        }
        Ok(())
    }

    /// Create `key` under `parent`, or reset the existing node in place.
    fn reset_child(
        &mut self,
        parent: NodeId,
        key: Key,
        shape: Shape,
        expr: Option<Expression>,
        location: SourceRange,
    ) -> NodeId {
        let node = Node {
            key: key.clone(),
            parent: Some(parent),
            shape,
            expr,
            value: None,
            size: 0,
            visited: false,
            children: Vec::new(),
            location,
        };
        if let Some(existing) = self.find_child(parent, &key) {
            self.nodes[existing] = node;
            return existing;
        }
        let id = self.nodes.len();
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        id
    }

    /// Existing map child named `key`, or a fresh empty one.
    fn map_child(&mut self, parent: NodeId, key: Key, location: &SourceRange) -> NodeId {
        match self.find_child(parent, &key) {
            Some(existing) if self.nodes[existing].shape == Shape::Map => existing,
            _ => self.reset_child(parent, key, Shape::Map, None, location.clone()),
        }
    }

    fn find_child(&self, parent: NodeId, key: &Key) -> Option<NodeId> {
        let node = &self.nodes[parent];
        let wanted = match (node.shape, key) {
            (Shape::Map, Key::Index(i)) => Key::Name(i.to_string()),
            (Shape::List, Key::Name(name)) => match name.parse() {
                Ok(i) => Key::Index(i),
                Err(_) => return None,
            },
            _ => key.clone(),
        };
        node.children
            .iter()
            .copied()
            .find(|&child| self.nodes[child].key == wanted)
    }

    /// Resolve every variable and return the `var` object.
    pub fn resolve(&mut self, ctx: &Context<'_>) -> Result<Value, Diagnostic> {
        for id in self.nodes[ROOT].children.clone() {
            self.resolve_node(id, ctx)?;
        }
        self.fold(ROOT);
        Ok(self.nodes[ROOT]
            .value
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    fn resolve_node(&mut self, id: NodeId, ctx: &Context<'_>) -> Result<(), Diagnostic> {
        if self.nodes[id].value.is_some() {
            return Ok(());
        }
        if self.nodes[id].visited {
            return Err(Diagnostic::error(
                DiagnosticKind::CircularReference,
                "Circular reference detected",
                format!("variable var.{} refers to itself", self.path_string(id)),
            )
            .at(self.nodes[id].location.clone()));
        }
        self.nodes[id].visited = true;
        trace!(variable = %self.path_string(id), "Resolving variable");

        if self.nodes[id].shape != Shape::Scalar {
            for child in self.nodes[id].children.clone() {
                self.resolve_node(child, ctx)?;
            }
            self.fold(id);
            return Ok(());
        }

        let Some(expr) = self.nodes[id].expr.clone() else {
            self.nodes[id].value = Some(Value::Null);
            return Ok(());
        };

        let references = references(&expr);
        let result = if references.is_empty() {
            expr.evaluate(ctx)
        } else {
            let mut targets = Vec::new();
            for path in &references {
                if path.is_empty() {
                    targets.extend(self.nodes[ROOT].children.iter().copied());
                    continue;
                }
                let (target, depth) = self.closest_match(path);
                if depth > 0 {
                    targets.push(target);
                }
            }
            for &target in &targets {
                self.resolve_node(target, ctx)?;
            }
            let mut scoped = ctx.clone();
            scoped.declare_var(VAR_NAMESPACE, self.filtered(&targets));
            expr.evaluate(&scoped)
        };

        let value = result.map_err(|err| {
            Diagnostic::error(
                DiagnosticKind::Evaluation,
                "Failed to evaluate variable",
                format!("var.{}: {err}", self.path_string(id)),
            )
            .at(self.nodes[id].location.clone())
        })?;
        self.nodes[id].value = Some(value);
        Ok(())
    }

    /// Deepest node along `path`, stopping at the first resolved node.
    fn closest_match(&self, path: &[Key]) -> (NodeId, usize) {
        let mut current = ROOT;
        let mut depth = 0;
        for key in path {
            if current != ROOT && self.nodes[current].value.is_some() {
                break;
            }
            match self.find_child(current, key) {
                Some(child) => {
                    current = child;
                    depth += 1;
                }
                None => break,
            }
        }
        (current, depth)
    }

    /// Fold a map or list whose children all have values.
    fn fold(&mut self, id: NodeId) {
        let node = &self.nodes[id];
        if node.value.is_some() || node.shape == Shape::Scalar || node.children.len() != node.size
        {
            return;
        }
        let mut values = Vec::with_capacity(node.children.len());
        for &child in &node.children {
            match &self.nodes[child].value {
                Some(value) => values.push((self.nodes[child].key.to_string(), value.clone())),
                None => return,
            }
        }
        let value = match node.shape {
            Shape::List => Value::Array(values.into_iter().map(|(_, v)| v).collect()),
            _ => Value::Object(values.into_iter().collect()),
        };
        self.nodes[id].value = Some(value);
    }

    /// A `var` object holding only the values of `targets`.
    fn filtered(&self, targets: &[NodeId]) -> Value {
        let mut root = Partial::Branch(Shape::Map, BTreeMap::new());
        for &target in targets {
            let chain = self.chain(target);
            self.place(&mut root, &chain);
        }
        root.into_value()
    }

    fn place(&self, slot: &mut Partial, chain: &[NodeId]) {
        let Some((&first, rest)) = chain.split_first() else {
            return;
        };
        let Partial::Branch(_, children) = slot else {
            return;
        };
        let node = &self.nodes[first];
        if rest.is_empty() {
            let value = node.value.clone().unwrap_or(Value::Null);
            children.insert(node.key.clone(), Partial::Full(value));
            return;
        }
        let entry = children
            .entry(node.key.clone())
            .or_insert_with(|| Partial::Branch(node.shape, BTreeMap::new()));
        self.place(entry, rest);
    }

    /// Node ids from the first level below the root down to `id`.
    fn chain(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ROOT {
                break;
            }
            chain.push(node);
            current = self.nodes[node].parent;
        }
        chain.reverse();
        chain
    }

    fn path_string(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.chain(id) {
            match &self.nodes[node].key {
                Key::Name(name) if out.is_empty() => out.push_str(name),
                Key::Name(name) => {
                    out.push('.');
                    out.push_str(name);
                }
                Key::Index(i) => out.push_str(&format!("[{i}]")),
            }
        }
        out
    }
}

/// Partially populated `var` tree used for scoped evaluation.
enum Partial {
    Full(Value),
    Branch(Shape, BTreeMap<Key, Partial>),
}

impl Partial {
    fn into_value(self) -> Value {
        match self {
            Self::Full(value) => value,
            Self::Branch(Shape::List, children) => {
                let len = children
                    .keys()
                    .filter_map(|k| match k {
                        Key::Index(i) => Some(i + 1),
                        Key::Name(_) => None,
                    })
                    .max()
                    .unwrap_or(0);
                let mut items = vec![Value::Null; len];
                for (key, child) in children {
                    if let Key::Index(i) = key {
                        items[i] = child.into_value();
                    }
                }
                Value::Array(items)
            }
            Self::Branch(_, children) => Value::Object(
                children
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.into_value()))
                    .collect(),
            ),
        }
    }
}

fn block_path(block: &Block) -> Vec<String> {
    std::iter::once(block.identifier.to_string())
        .chain(block.labels.iter().map(|l| l.as_str().to_string()))
        .collect()
}

/// Literal text of an object key.
fn literal_key(key: &ObjectKey, location: &SourceRange) -> Result<String, Diagnostic> {
    let expr = match key {
        ObjectKey::Identifier(ident) => return Ok(ident.to_string()),
        ObjectKey::Expression(expr) => expr,
        #[allow(unreachable_patterns)]
        _ => {
            return Err(non_literal_key(false, location));
        }
    };
    match expr {
        Expression::String(s) => Ok(s.clone()),
        Expression::Number(n) => Ok(n.to_string()),
        Expression::TemplateExpr(template) => match template.as_ref() {
            TemplateExpr::QuotedString(s) if !s.contains("${") && !s.contains("%{") => {
                Ok(s.clone())
            }
            _ => Err(non_literal_key(!references(expr).is_empty(), location)),
        },
        other => Err(non_literal_key(!references(other).is_empty(), location)),
    }
}

fn non_literal_key(has_var: bool, location: &SourceRange) -> Diagnostic {
    let summary = if has_var {
        "variable reference in map key"
    } else {
        "map keys must be literal"
    };
    Diagnostic::error(
        DiagnosticKind::Variable,
        summary,
        "object keys inside variables must be identifiers, strings or numbers",
    )
    .at(location.clone())
}

/// Static paths of every `var` reference inside `expr`.
///
/// A bare `var` yields an empty path. Dynamic traversal steps truncate the
/// path to its static prefix.
#[must_use]
pub fn references(expr: &Expression) -> Vec<Vec<Key>> {
    let mut out = Vec::new();
    collect_references(expr, &mut out);
    out
}

fn collect_references(expr: &Expression, out: &mut Vec<Vec<Key>>) {
    match expr {
        Expression::Variable(var) if var.as_str() == VAR_NAMESPACE => out.push(Vec::new()),
        Expression::Traversal(traversal) => {
            match &traversal.expr {
                Expression::Variable(var) if var.as_str() == VAR_NAMESPACE => {
                    out.push(static_path(&traversal.operators));
                }
                inner => collect_references(inner, out),
            }
            for op in &traversal.operators {
                if let TraversalOperator::Index(index) = op {
                    collect_references(index, out);
                }
            }
        }
        Expression::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        Expression::Object(object) => {
            for (key, value) in object {
                if let ObjectKey::Expression(key) = key {
                    collect_references(key, out);
                }
                collect_references(value, out);
            }
        }
        Expression::TemplateExpr(template) => {
            if let Ok(template) = Template::from_expr(template) {
                collect_template(&template, out);
            }
        }
        Expression::FuncCall(call) => {
            for arg in &call.args {
                collect_references(arg, out);
            }
        }
        Expression::Parenthesis(inner) => collect_references(inner, out),
        Expression::Conditional(cond) => {
            collect_references(&cond.cond_expr, out);
            collect_references(&cond.true_expr, out);
            collect_references(&cond.false_expr, out);
        }
        Expression::Operation(op) => match op.as_ref() {
            hcl::expr::Operation::Unary(unary) => collect_references(&unary.expr, out),
            hcl::expr::Operation::Binary(binary) => {
                collect_references(&binary.lhs_expr, out);
                collect_references(&binary.rhs_expr, out);
            }
        },
        Expression::ForExpr(for_expr) => {
            collect_references(&for_expr.collection_expr, out);
            if let Some(key_expr) = &for_expr.key_expr {
                collect_references(key_expr, out);
            }
            collect_references(&for_expr.value_expr, out);
            if let Some(cond_expr) = &for_expr.cond_expr {
                collect_references(cond_expr, out);
            }
        }
        _ => {}
    }
}

fn collect_template(template: &Template, out: &mut Vec<Vec<Key>>) {
    for element in template.elements() {
        match element {
            Element::Interpolation(interpolation) => collect_references(&interpolation.expr, out),
            Element::Directive(directive) => match directive {
                Directive::If(if_directive) => {
                    collect_references(&if_directive.cond_expr, out);
                    collect_template(&if_directive.true_template, out);
                    if let Some(false_template) = &if_directive.false_template {
                        collect_template(false_template, out);
                    }
                }
                Directive::For(for_directive) => {
                    collect_references(&for_directive.collection_expr, out);
                    collect_template(&for_directive.template, out);
                }
            },
            Element::Literal(_) => {}
        }
    }
}

fn static_path(operators: &[TraversalOperator]) -> Vec<Key> {
    let mut path = Vec::new();
    for op in operators {
        match op {
            TraversalOperator::GetAttr(ident) => path.push(Key::Name(ident.to_string())),
            TraversalOperator::Index(Expression::Number(n)) => match n.as_u64() {
                Some(i) => path.push(Key::Index(i as usize)),
                None => break,
            },
            TraversalOperator::Index(Expression::String(s)) => path.push(Key::Name(s.clone())),
            TraversalOperator::LegacyIndex(i) => path.push(Key::Index(*i as usize)),
            _ => break,
        }
    }
    path
}
