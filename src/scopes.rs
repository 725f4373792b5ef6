//! Scope resolution for module-level import bindings
//!
//! Walks a parsed module once, building a lexical scope tree
//! (module/class/function nesting) and recording, for every name load that
//! resolves to a module-level import declaration, a reference together with
//! its enclosing scope. The graph is an arena of scopes addressed by opaque
//! handles with side tables for bindings and references; it is read-only once
//! built.

use rustpython_parser::ast;
use rustpython_parser::ast::Ranged;
use std::collections::{HashMap, HashSet};

use crate::error::Result;

/// Handle of a scope in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeId(pub usize);

/// Handle of a module-level import declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingId(pub usize);

/// Lexical scope kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Class,
    Function,
}

/// Where an import statement can be inserted inside a function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyAnchor {
    /// Line start of the first (possibly decorated) non-docstring body
    /// statement, plus the indentation shared by the body.
    Stmt { line_start: usize, indent: String },
    /// Body is a single docstring; insertion goes on a fresh line after it.
    AfterDocstring { doc_end: usize, indent: String },
    /// Body shares a line with the `def` header; nothing can be injected.
    Inline,
}

/// How a name is bound directly within one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalKind {
    Name,
    Import,
    Global,
    Nonlocal,
}

/// A node in the lexical nesting tree.
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub name: String,
    /// Dotted path from module scope, e.g. `outer.inner` (empty for module).
    pub qualified_name: String,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Injection site; `Some` only for function scopes.
    pub anchor: Option<BodyAnchor>,
    bindings: HashMap<String, LocalKind>,
}

/// Statement-level shape of an import declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportKind {
    /// `import a.b, c as d`
    Plain,
    /// `from .module import x as y`
    From { module: Option<String>, level: u32 },
}

/// One alias of an import declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedName {
    /// Module path or symbol exactly as written.
    pub name: String,
    /// `as` alias, when present.
    pub alias: Option<String>,
    /// Name the alias introduces into module scope.
    pub binding: String,
}

/// One module-level import declaration.
#[derive(Debug, Clone)]
pub struct ImportBinding {
    pub kind: ImportKind,
    pub names: Vec<ImportedName>,
    pub is_wildcard: bool,
    /// Canonical source text; equality on this drives deduplication.
    pub text: String,
    /// Byte span of the statement in the original source.
    pub start: usize,
    pub end: usize,
    /// 1-based line range of the statement in the original source.
    pub line_range: (usize, usize),
}

impl ImportBinding {
    /// Names this declaration introduces into module scope.
    pub fn binding_names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|n| n.binding.as_str())
    }
}

/// A use of a name that resolved to a module-level import binding.
#[derive(Debug, Clone)]
pub struct Reference {
    pub binding: BindingId,
    /// The module-scope name that was referenced.
    pub name: String,
    /// Scope the reference occurs in.
    pub scope: ScopeId,
    /// True for class base-list / class decorator / class keyword references.
    pub keep_forcing: bool,
}

/// Scope tree plus import bindings and resolved references for one unit.
#[derive(Debug)]
pub struct ScopeGraph {
    scopes: Vec<Scope>,
    bindings: Vec<ImportBinding>,
    references: Vec<Reference>,
    /// Bindings whose names are also rebound by non-import module statements;
    /// relocating those would change which value the name holds.
    forced_keep: HashSet<BindingId>,
}

impl ScopeGraph {
    /// Build the scope graph for a parsed module.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree violates structural assumptions the
    /// resolver depends on.
    pub fn build(suite: &[ast::Stmt], source: &str) -> Result<Self> {
        let lines = LineIndex::new(source);

        let mut bindings = Vec::new();
        let mut import_index = HashMap::new();
        collect_module_imports(suite, source, &lines, &mut bindings, &mut import_index);

        let mut collector = BindingCollector::default();
        collector.collect_suite(suite);

        let mut forced_keep = HashSet::new();
        for (id, binding) in bindings.iter().enumerate() {
            if binding
                .binding_names()
                .any(|name| collector.assigned.contains(name))
            {
                forced_keep.insert(BindingId(id));
            }
        }

        let module_scope = Scope {
            kind: ScopeKind::Module,
            name: "<module>".to_string(),
            qualified_name: String::new(),
            parent: None,
            children: Vec::new(),
            anchor: None,
            bindings: collector.bindings,
        };

        let mut resolver = Resolver {
            source,
            lines,
            import_index,
            graph: ScopeGraph {
                scopes: vec![module_scope],
                bindings,
                references: Vec::new(),
                forced_keep,
            },
            stack: vec![ScopeId(0)],
        };
        resolver.visit_body(suite);
        Ok(resolver.graph)
    }

    #[must_use]
    pub fn module_scope(&self) -> ScopeId {
        ScopeId(0)
    }

    #[must_use]
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    #[must_use]
    pub fn bindings(&self) -> &[ImportBinding] {
        &self.bindings
    }

    #[must_use]
    pub fn binding(&self, id: BindingId) -> &ImportBinding {
        &self.bindings[id.0]
    }

    #[must_use]
    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    /// All references that resolved to the given binding.
    pub fn references_of(&self, id: BindingId) -> impl Iterator<Item = &Reference> {
        self.references.iter().filter(move |r| r.binding == id)
    }

    /// Whether a binding's name is also rebound by a non-import module
    /// statement.
    #[must_use]
    pub fn is_forced_keep(&self, id: BindingId) -> bool {
        self.forced_keep.contains(&id)
    }

    /// Nearest enclosing function scope, including `id` itself.
    #[must_use]
    pub fn nearest_function(&self, id: ScopeId) -> Option<ScopeId> {
        let mut current = Some(id);
        while let Some(scope_id) = current {
            let scope = &self.scopes[scope_id.0];
            if matches!(scope.kind, ScopeKind::Function) {
                return Some(scope_id);
            }
            current = scope.parent;
        }
        None
    }
}

/// Byte-offset to 1-based line number lookup.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        for (idx, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                starts.push(idx + 1);
            }
        }
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&start| start <= offset)
    }
}

fn alias_binding_name(alias: &ast::Alias) -> String {
    if let Some(asname) = &alias.asname {
        asname.to_string()
    } else {
        alias
            .name
            .as_str()
            .split('.')
            .next()
            .unwrap_or(alias.name.as_str())
            .to_string()
    }
}

fn make_import_binding(
    kind: ImportKind,
    names: Vec<ImportedName>,
    is_wildcard: bool,
    range: std::ops::Range<usize>,
    source: &str,
    lines: &LineIndex,
) -> ImportBinding {
    let text = source[range.clone()].trim().to_string();
    let first_line = lines.line_of(range.start);
    let last_line = lines.line_of(range.end.saturating_sub(1).max(range.start));
    ImportBinding {
        kind,
        names,
        is_wildcard,
        text,
        start: range.start,
        end: range.end,
        line_range: (first_line, last_line),
    }
}

/// Register every import statement reachable at module scope (including ones
/// nested in module-level `if`/`try`/loop blocks) without descending into
/// function or class bodies.
fn collect_module_imports(
    suite: &[ast::Stmt],
    source: &str,
    lines: &LineIndex,
    bindings: &mut Vec<ImportBinding>,
    index: &mut HashMap<String, BindingId>,
) {
    for stmt in suite {
        match stmt {
            ast::Stmt::Import(import) => {
                let names = import
                    .names
                    .iter()
                    .map(|alias| ImportedName {
                        name: alias.name.to_string(),
                        alias: alias.asname.as_ref().map(ToString::to_string),
                        binding: alias_binding_name(alias),
                    })
                    .collect();
                let range = usize::from(import.range().start())..usize::from(import.range().end());
                let binding = make_import_binding(ImportKind::Plain, names, false, range, source, lines);
                register_binding(binding, bindings, index);
            }
            ast::Stmt::ImportFrom(import_from) => {
                let level = import_from.level.as_ref().map_or(0, ast::Int::to_u32);
                let module = import_from.module.as_ref().map(ToString::to_string);
                let is_wildcard = import_from
                    .names
                    .iter()
                    .any(|alias| alias.name.as_str() == "*");
                let names = if is_wildcard {
                    Vec::new()
                } else {
                    import_from
                        .names
                        .iter()
                        .map(|alias| ImportedName {
                            name: alias.name.to_string(),
                            alias: alias.asname.as_ref().map(ToString::to_string),
                            binding: alias.asname.as_ref().unwrap_or(&alias.name).to_string(),
                        })
                        .collect()
                };
                let range = usize::from(import_from.range().start())
                    ..usize::from(import_from.range().end());
                let binding = make_import_binding(
                    ImportKind::From { module, level },
                    names,
                    is_wildcard,
                    range,
                    source,
                    lines,
                );
                register_binding(binding, bindings, index);
            }
            ast::Stmt::If(if_stmt) => {
                collect_module_imports(&if_stmt.body, source, lines, bindings, index);
                collect_module_imports(&if_stmt.orelse, source, lines, bindings, index);
            }
            ast::Stmt::While(while_stmt) => {
                collect_module_imports(&while_stmt.body, source, lines, bindings, index);
                collect_module_imports(&while_stmt.orelse, source, lines, bindings, index);
            }
            ast::Stmt::For(for_stmt) => {
                collect_module_imports(&for_stmt.body, source, lines, bindings, index);
                collect_module_imports(&for_stmt.orelse, source, lines, bindings, index);
            }
            ast::Stmt::With(with_stmt) => {
                collect_module_imports(&with_stmt.body, source, lines, bindings, index);
            }
            ast::Stmt::Try(try_stmt) => {
                collect_module_imports(&try_stmt.body, source, lines, bindings, index);
                for handler in &try_stmt.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    collect_module_imports(&handler.body, source, lines, bindings, index);
                }
                collect_module_imports(&try_stmt.orelse, source, lines, bindings, index);
                collect_module_imports(&try_stmt.finalbody, source, lines, bindings, index);
            }
            ast::Stmt::TryStar(try_stmt) => {
                collect_module_imports(&try_stmt.body, source, lines, bindings, index);
                for handler in &try_stmt.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    collect_module_imports(&handler.body, source, lines, bindings, index);
                }
                collect_module_imports(&try_stmt.orelse, source, lines, bindings, index);
                collect_module_imports(&try_stmt.finalbody, source, lines, bindings, index);
            }
            ast::Stmt::Match(match_stmt) => {
                for case in &match_stmt.cases {
                    collect_module_imports(&case.body, source, lines, bindings, index);
                }
            }
            _ => {}
        }
    }
}

fn register_binding(
    binding: ImportBinding,
    bindings: &mut Vec<ImportBinding>,
    index: &mut HashMap<String, BindingId>,
) {
    let id = BindingId(bindings.len());
    for name in binding.binding_names() {
        // First declaration of a name wins for resolution purposes.
        index.entry(name.to_string()).or_insert(id);
    }
    bindings.push(binding);
}

fn merge_local(existing: LocalKind, incoming: LocalKind) -> LocalKind {
    use LocalKind::{Global, Import, Name, Nonlocal};
    match (existing, incoming) {
        (Global, _) | (_, Global) => Global,
        (Nonlocal, _) | (_, Nonlocal) => Nonlocal,
        (Import, _) | (_, Import) => Import,
        _ => Name,
    }
}

/// Collects the names bound directly in one scope, without descending into
/// nested function or class bodies.
#[derive(Default)]
struct BindingCollector {
    bindings: HashMap<String, LocalKind>,
    /// Names bound by something other than an import statement.
    assigned: HashSet<String>,
}

impl BindingCollector {
    fn set(&mut self, name: &str, kind: LocalKind) {
        match self.bindings.get(name).copied() {
            Some(existing) => {
                let merged = merge_local(existing, kind);
                if merged != existing {
                    self.bindings.insert(name.to_string(), merged);
                }
            }
            None => {
                self.bindings.insert(name.to_string(), kind);
            }
        }
    }

    fn bind_name(&mut self, name: &str) {
        self.assigned.insert(name.to_string());
        self.set(name, LocalKind::Name);
    }

    fn bind_import(&mut self, name: &str) {
        self.set(name, LocalKind::Import);
    }

    fn bind_parameters(&mut self, args: &ast::Arguments) {
        for param in &args.posonlyargs {
            self.bind_name(param.def.arg.as_ref());
        }
        for param in &args.args {
            self.bind_name(param.def.arg.as_ref());
        }
        if let Some(vararg) = &args.vararg {
            self.bind_name(vararg.arg.as_ref());
        }
        for param in &args.kwonlyargs {
            self.bind_name(param.def.arg.as_ref());
        }
        if let Some(kwarg) = &args.kwarg {
            self.bind_name(kwarg.arg.as_ref());
        }
    }

    fn collect_suite(&mut self, suite: &[ast::Stmt]) {
        for stmt in suite {
            self.collect_stmt(stmt);
        }
    }

    fn collect_stmt(&mut self, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::FunctionDef(func) => self.bind_name(func.name.as_ref()),
            ast::Stmt::AsyncFunctionDef(func) => self.bind_name(func.name.as_ref()),
            ast::Stmt::ClassDef(class_def) => self.bind_name(class_def.name.as_ref()),
            ast::Stmt::Import(import) => {
                for alias in &import.names {
                    self.bind_import(&alias_binding_name(alias));
                }
            }
            ast::Stmt::ImportFrom(import_from) => {
                for alias in &import_from.names {
                    if alias.name.as_str() == "*" {
                        continue;
                    }
                    self.bind_import(&alias_binding_name(alias));
                }
            }
            ast::Stmt::Global(global) => {
                for name in &global.names {
                    self.set(name.as_str(), LocalKind::Global);
                }
            }
            ast::Stmt::Nonlocal(nonlocal) => {
                for name in &nonlocal.names {
                    self.set(name.as_str(), LocalKind::Nonlocal);
                }
            }
            ast::Stmt::Assign(assign) => {
                for target in &assign.targets {
                    self.collect_target(target);
                }
            }
            ast::Stmt::AnnAssign(assign) => self.collect_target(&assign.target),
            ast::Stmt::AugAssign(assign) => self.collect_target(&assign.target),
            ast::Stmt::For(for_stmt) => {
                self.collect_target(&for_stmt.target);
                self.collect_suite(&for_stmt.body);
                self.collect_suite(&for_stmt.orelse);
            }
            ast::Stmt::AsyncFor(for_stmt) => {
                self.collect_target(&for_stmt.target);
                self.collect_suite(&for_stmt.body);
                self.collect_suite(&for_stmt.orelse);
            }
            ast::Stmt::While(while_stmt) => {
                self.collect_suite(&while_stmt.body);
                self.collect_suite(&while_stmt.orelse);
            }
            ast::Stmt::If(if_stmt) => {
                self.collect_suite(&if_stmt.body);
                self.collect_suite(&if_stmt.orelse);
            }
            ast::Stmt::With(with_stmt) => {
                for item in &with_stmt.items {
                    if let Some(optional_vars) = &item.optional_vars {
                        self.collect_target(optional_vars);
                    }
                }
                self.collect_suite(&with_stmt.body);
            }
            ast::Stmt::AsyncWith(with_stmt) => {
                for item in &with_stmt.items {
                    if let Some(optional_vars) = &item.optional_vars {
                        self.collect_target(optional_vars);
                    }
                }
                self.collect_suite(&with_stmt.body);
            }
            ast::Stmt::Try(try_stmt) => {
                self.collect_suite(&try_stmt.body);
                for handler in &try_stmt.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    if let Some(name) = &handler.name {
                        self.bind_name(name.as_ref());
                    }
                    self.collect_suite(&handler.body);
                }
                self.collect_suite(&try_stmt.orelse);
                self.collect_suite(&try_stmt.finalbody);
            }
            ast::Stmt::TryStar(try_stmt) => {
                self.collect_suite(&try_stmt.body);
                for handler in &try_stmt.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    if let Some(name) = &handler.name {
                        self.bind_name(name.as_ref());
                    }
                    self.collect_suite(&handler.body);
                }
                self.collect_suite(&try_stmt.orelse);
                self.collect_suite(&try_stmt.finalbody);
            }
            ast::Stmt::Match(match_stmt) => {
                for case in &match_stmt.cases {
                    self.collect_pattern(&case.pattern);
                    self.collect_suite(&case.body);
                }
            }
            _ => {}
        }
    }

    fn collect_target(&mut self, expr: &ast::Expr) {
        match expr {
            ast::Expr::Name(name) => self.bind_name(name.id.as_str()),
            ast::Expr::Tuple(tuple) => {
                for elt in &tuple.elts {
                    self.collect_target(elt);
                }
            }
            ast::Expr::List(list) => {
                for elt in &list.elts {
                    self.collect_target(elt);
                }
            }
            ast::Expr::Starred(starred) => self.collect_target(&starred.value),
            // Attribute / subscript targets bind nothing in this scope.
            _ => {}
        }
    }

    fn collect_pattern(&mut self, pattern: &ast::Pattern) {
        match pattern {
            ast::Pattern::MatchAs(pat) => {
                if let Some(name) = &pat.name {
                    self.bind_name(name.as_ref());
                }
                if let Some(sub) = &pat.pattern {
                    self.collect_pattern(sub);
                }
            }
            ast::Pattern::MatchStar(pat) => {
                if let Some(name) = &pat.name {
                    self.bind_name(name.as_ref());
                }
            }
            ast::Pattern::MatchSequence(seq) => {
                for sub in &seq.patterns {
                    self.collect_pattern(sub);
                }
            }
            ast::Pattern::MatchMapping(map) => {
                if let Some(rest) = &map.rest {
                    self.bind_name(rest.as_ref());
                }
                for sub in &map.patterns {
                    self.collect_pattern(sub);
                }
            }
            ast::Pattern::MatchClass(class) => {
                for sub in &class.patterns {
                    self.collect_pattern(sub);
                }
                for sub in &class.kwd_patterns {
                    self.collect_pattern(sub);
                }
            }
            ast::Pattern::MatchOr(pat) => {
                for sub in &pat.patterns {
                    self.collect_pattern(sub);
                }
            }
            _ => {}
        }
    }
}

struct Resolver<'a> {
    source: &'a str,
    lines: LineIndex,
    import_index: HashMap<String, BindingId>,
    graph: ScopeGraph,
    stack: Vec<ScopeId>,
}

impl Resolver<'_> {
    fn current_scope(&self) -> ScopeId {
        *self.stack.last().expect("scope stack is never empty")
    }

    fn push_scope(
        &mut self,
        kind: ScopeKind,
        name: &str,
        bindings: HashMap<String, LocalKind>,
        anchor: Option<BodyAnchor>,
    ) -> ScopeId {
        let parent = self.current_scope();
        let parent_qualified = &self.graph.scopes[parent.0].qualified_name;
        let qualified_name = if parent_qualified.is_empty() {
            name.to_string()
        } else {
            format!("{parent_qualified}.{name}")
        };
        let id = ScopeId(self.graph.scopes.len());
        self.graph.scopes.push(Scope {
            kind,
            name: name.to_string(),
            qualified_name,
            parent: Some(parent),
            children: Vec::new(),
            anchor,
            bindings,
        });
        self.graph.scopes[parent.0].children.push(id);
        self.stack.push(id);
        id
    }

    fn pop_scope(&mut self) {
        self.stack.pop();
    }

    /// Resolve a name load through the lexical chain. Returns the module-level
    /// import binding it lands on, if any.
    fn resolve(&self, name: &str) -> Option<BindingId> {
        let start = self.current_scope();
        let mut current = Some(start);
        while let Some(id) = current {
            let scope = &self.graph.scopes[id.0];
            // Class scopes are invisible to code nested inside them.
            let visible = !matches!(scope.kind, ScopeKind::Class) || id == start;
            if visible {
                match scope.bindings.get(name).copied() {
                    Some(LocalKind::Global) => return self.import_index.get(name).copied(),
                    Some(LocalKind::Nonlocal) | None => {}
                    Some(LocalKind::Name | LocalKind::Import) => {
                        if matches!(scope.kind, ScopeKind::Module) {
                            return self.import_index.get(name).copied();
                        }
                        // Shadowed by a local binding; not a module import use.
                        return None;
                    }
                }
            }
            current = scope.parent;
        }
        None
    }

    fn record(&mut self, name: &str, keep_forcing: bool) {
        let Some(binding) = self.resolve(name) else {
            return;
        };
        let scope = self.current_scope();
        tracing::trace!(name, scope = scope.0, "resolved import reference");
        self.graph.references.push(Reference {
            binding,
            name: name.to_string(),
            scope,
            keep_forcing,
        });
    }

    fn visit_body(&mut self, body: &[ast::Stmt]) {
        for stmt in body {
            self.visit_stmt(stmt);
        }
    }

    fn handle_function(
        &mut self,
        name: &ast::Identifier,
        args: &ast::Arguments,
        returns: Option<&ast::Expr>,
        decorator_list: &[ast::Expr],
        body: &[ast::Stmt],
        def_start: usize,
    ) {
        // Decorators, annotations and defaults are evaluated in the enclosing
        // scope at definition time.
        for decorator in decorator_list {
            self.visit_expr(decorator, false);
        }
        self.visit_parameters(args);
        if let Some(returns) = returns {
            self.visit_expr(returns, false);
        }

        let mut collector = BindingCollector::default();
        collector.bind_parameters(args);
        collector.collect_suite(body);

        let anchor = self.compute_anchor(body, def_start);
        self.push_scope(ScopeKind::Function, name.as_ref(), collector.bindings, Some(anchor));
        self.visit_body(body);
        self.pop_scope();
    }

    fn visit_parameters(&mut self, args: &ast::Arguments) {
        for param in args
            .posonlyargs
            .iter()
            .chain(&args.args)
            .chain(&args.kwonlyargs)
        {
            if let Some(annotation) = &param.def.annotation {
                self.visit_expr(annotation, false);
            }
            if let Some(default) = &param.default {
                self.visit_expr(default, false);
            }
        }
        if let Some(vararg) = &args.vararg {
            if let Some(annotation) = &vararg.annotation {
                self.visit_expr(annotation, false);
            }
        }
        if let Some(kwarg) = &args.kwarg {
            if let Some(annotation) = &kwarg.annotation {
                self.visit_expr(annotation, false);
            }
        }
    }

    /// Decide where imports can be injected into a function body: after the
    /// leading docstring if the body is nothing else, otherwise at the line
    /// start of the first real statement (or its first decorator).
    fn compute_anchor(&self, body: &[ast::Stmt], def_start: usize) -> BodyAnchor {
        let (doc, rest) = match body.split_first() {
            Some((first, rest)) if is_docstring(first) => (Some(first), rest),
            Some(_) => (None, body),
            None => return BodyAnchor::Inline,
        };

        let def_line = self.lines.line_of(def_start);
        match rest.first() {
            Some(stmt) => {
                let offset = anchor_offset(stmt);
                if self.lines.line_of(offset) == def_line {
                    return BodyAnchor::Inline;
                }
                let (line_start, indent) = self.line_start_and_indent(offset);
                // A decorator expression's span starts past the `@` marker,
                // so a whitespace-then-`@` prefix is still a clean line start.
                let prefix = self.source[line_start..offset].trim();
                if !prefix.is_empty() && prefix != "@" {
                    // Statement shares its line with something else.
                    return BodyAnchor::Inline;
                }
                BodyAnchor::Stmt { line_start, indent }
            }
            None => {
                let Some(doc) = doc else {
                    return BodyAnchor::Inline;
                };
                let doc_start = usize::from(doc.range().start());
                if self.lines.line_of(doc_start) == def_line {
                    return BodyAnchor::Inline;
                }
                let (_, indent) = self.line_start_and_indent(doc_start);
                BodyAnchor::AfterDocstring {
                    doc_end: usize::from(doc.range().end()),
                    indent,
                }
            }
        }
    }

    fn line_start_and_indent(&self, offset: usize) -> (usize, String) {
        let line_start = self.source[..offset].rfind('\n').map_or(0, |idx| idx + 1);
        let indent: String = self.source[line_start..]
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .collect();
        (line_start, indent)
    }

    fn visit_stmt(&mut self, stmt: &ast::Stmt) {
        match stmt {
            ast::Stmt::FunctionDef(func) => {
                self.handle_function(
                    &func.name,
                    &func.args,
                    func.returns.as_deref(),
                    &func.decorator_list,
                    &func.body,
                    usize::from(func.range().start()),
                );
            }
            ast::Stmt::AsyncFunctionDef(func) => {
                self.handle_function(
                    &func.name,
                    &func.args,
                    func.returns.as_deref(),
                    &func.decorator_list,
                    &func.body,
                    usize::from(func.range().start()),
                );
            }
            ast::Stmt::ClassDef(class_def) => {
                // Base list, keywords and decorators evaluate in the enclosing
                // scope and pin their imports at module level.
                for decorator in &class_def.decorator_list {
                    self.visit_expr(decorator, true);
                }
                for base in &class_def.bases {
                    self.visit_expr(base, true);
                }
                for keyword in &class_def.keywords {
                    self.visit_expr(&keyword.value, true);
                }
                let mut collector = BindingCollector::default();
                collector.collect_suite(&class_def.body);
                self.push_scope(
                    ScopeKind::Class,
                    class_def.name.as_ref(),
                    collector.bindings,
                    None,
                );
                self.visit_body(&class_def.body);
                self.pop_scope();
            }
            ast::Stmt::Import(_) | ast::Stmt::ImportFrom(_) => {}
            ast::Stmt::Expr(expr_stmt) => self.visit_expr(&expr_stmt.value, false),
            ast::Stmt::Assign(assign) => {
                self.visit_expr(&assign.value, false);
                for target in &assign.targets {
                    self.visit_expr(target, false);
                }
            }
            ast::Stmt::AnnAssign(assign) => {
                self.visit_expr(&assign.annotation, false);
                if let Some(value) = &assign.value {
                    self.visit_expr(value, false);
                }
                self.visit_expr(&assign.target, false);
            }
            ast::Stmt::AugAssign(assign) => {
                self.visit_expr(&assign.value, false);
                self.visit_expr(&assign.target, false);
            }
            ast::Stmt::Return(ret) => {
                if let Some(value) = &ret.value {
                    self.visit_expr(value, false);
                }
            }
            ast::Stmt::Delete(delete) => {
                for target in &delete.targets {
                    self.visit_expr(target, false);
                }
            }
            ast::Stmt::Raise(raise) => {
                if let Some(exc) = &raise.exc {
                    self.visit_expr(exc, false);
                }
                if let Some(cause) = &raise.cause {
                    self.visit_expr(cause, false);
                }
            }
            ast::Stmt::Assert(assert) => {
                self.visit_expr(&assert.test, false);
                if let Some(msg) = &assert.msg {
                    self.visit_expr(msg, false);
                }
            }
            ast::Stmt::For(for_stmt) => {
                self.visit_expr(&for_stmt.iter, false);
                self.visit_expr(&for_stmt.target, false);
                self.visit_body(&for_stmt.body);
                self.visit_body(&for_stmt.orelse);
            }
            ast::Stmt::AsyncFor(for_stmt) => {
                self.visit_expr(&for_stmt.iter, false);
                self.visit_expr(&for_stmt.target, false);
                self.visit_body(&for_stmt.body);
                self.visit_body(&for_stmt.orelse);
            }
            ast::Stmt::While(while_stmt) => {
                self.visit_expr(&while_stmt.test, false);
                self.visit_body(&while_stmt.body);
                self.visit_body(&while_stmt.orelse);
            }
            ast::Stmt::If(if_stmt) => {
                self.visit_expr(&if_stmt.test, false);
                self.visit_body(&if_stmt.body);
                self.visit_body(&if_stmt.orelse);
            }
            ast::Stmt::With(with_stmt) => {
                for item in &with_stmt.items {
                    self.visit_expr(&item.context_expr, false);
                    if let Some(optional_vars) = &item.optional_vars {
                        self.visit_expr(optional_vars, false);
                    }
                }
                self.visit_body(&with_stmt.body);
            }
            ast::Stmt::AsyncWith(with_stmt) => {
                for item in &with_stmt.items {
                    self.visit_expr(&item.context_expr, false);
                    if let Some(optional_vars) = &item.optional_vars {
                        self.visit_expr(optional_vars, false);
                    }
                }
                self.visit_body(&with_stmt.body);
            }
            ast::Stmt::Try(try_stmt) => {
                self.visit_body(&try_stmt.body);
                for handler in &try_stmt.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    if let Some(type_) = &handler.type_ {
                        self.visit_expr(type_, false);
                    }
                    self.visit_body(&handler.body);
                }
                self.visit_body(&try_stmt.orelse);
                self.visit_body(&try_stmt.finalbody);
            }
            ast::Stmt::TryStar(try_stmt) => {
                self.visit_body(&try_stmt.body);
                for handler in &try_stmt.handlers {
                    let ast::ExceptHandler::ExceptHandler(handler) = handler;
                    if let Some(type_) = &handler.type_ {
                        self.visit_expr(type_, false);
                    }
                    self.visit_body(&handler.body);
                }
                self.visit_body(&try_stmt.orelse);
                self.visit_body(&try_stmt.finalbody);
            }
            ast::Stmt::Match(match_stmt) => {
                self.visit_expr(&match_stmt.subject, false);
                for case in &match_stmt.cases {
                    if let Some(guard) = &case.guard {
                        self.visit_expr(guard, false);
                    }
                    self.visit_body(&case.body);
                }
            }
            _ => {}
        }
    }

    fn visit_expr(&mut self, expr: &ast::Expr, keep_forcing: bool) {
        match expr {
            ast::Expr::Name(name) => {
                if matches!(name.ctx, ast::ExprContext::Load) {
                    self.record(name.id.as_str(), keep_forcing);
                }
            }
            ast::Expr::Attribute(attr) => self.visit_expr(&attr.value, keep_forcing),
            ast::Expr::Subscript(subscript) => {
                self.visit_expr(&subscript.value, keep_forcing);
                self.visit_expr(&subscript.slice, keep_forcing);
            }
            ast::Expr::Starred(starred) => self.visit_expr(&starred.value, keep_forcing),
            ast::Expr::Call(call) => {
                self.visit_expr(&call.func, keep_forcing);
                for arg in &call.args {
                    self.visit_expr(arg, keep_forcing);
                }
                for keyword in &call.keywords {
                    self.visit_expr(&keyword.value, keep_forcing);
                }
            }
            ast::Expr::BinOp(binop) => {
                self.visit_expr(&binop.left, keep_forcing);
                self.visit_expr(&binop.right, keep_forcing);
            }
            ast::Expr::UnaryOp(unary) => self.visit_expr(&unary.operand, keep_forcing),
            ast::Expr::BoolOp(bool_op) => {
                for value in &bool_op.values {
                    self.visit_expr(value, keep_forcing);
                }
            }
            ast::Expr::Compare(compare) => {
                self.visit_expr(&compare.left, keep_forcing);
                for comparator in &compare.comparators {
                    self.visit_expr(comparator, keep_forcing);
                }
            }
            ast::Expr::IfExp(if_exp) => {
                self.visit_expr(&if_exp.test, keep_forcing);
                self.visit_expr(&if_exp.body, keep_forcing);
                self.visit_expr(&if_exp.orelse, keep_forcing);
            }
            ast::Expr::Lambda(lambda) => {
                // Lambda parameters get no scope of their own; a shadowed name
                // can only add a spurious reference, which errs toward keeping
                // the import alive.
                for param in lambda
                    .args
                    .posonlyargs
                    .iter()
                    .chain(&lambda.args.args)
                    .chain(&lambda.args.kwonlyargs)
                {
                    if let Some(default) = &param.default {
                        self.visit_expr(default, keep_forcing);
                    }
                }
                self.visit_expr(&lambda.body, keep_forcing);
            }
            ast::Expr::Dict(dict) => {
                for key in dict.keys.iter().flatten() {
                    self.visit_expr(key, keep_forcing);
                }
                for value in &dict.values {
                    self.visit_expr(value, keep_forcing);
                }
            }
            ast::Expr::Set(set_expr) => {
                for elt in &set_expr.elts {
                    self.visit_expr(elt, keep_forcing);
                }
            }
            ast::Expr::List(list) => {
                for elt in &list.elts {
                    self.visit_expr(elt, keep_forcing);
                }
            }
            ast::Expr::Tuple(tuple) => {
                for elt in &tuple.elts {
                    self.visit_expr(elt, keep_forcing);
                }
            }
            ast::Expr::ListComp(comp) => {
                for gen in &comp.generators {
                    self.visit_expr(&gen.iter, keep_forcing);
                    for if_ in &gen.ifs {
                        self.visit_expr(if_, keep_forcing);
                    }
                }
                self.visit_expr(&comp.elt, keep_forcing);
            }
            ast::Expr::SetComp(comp) => {
                for gen in &comp.generators {
                    self.visit_expr(&gen.iter, keep_forcing);
                    for if_ in &gen.ifs {
                        self.visit_expr(if_, keep_forcing);
                    }
                }
                self.visit_expr(&comp.elt, keep_forcing);
            }
            ast::Expr::DictComp(comp) => {
                for gen in &comp.generators {
                    self.visit_expr(&gen.iter, keep_forcing);
                    for if_ in &gen.ifs {
                        self.visit_expr(if_, keep_forcing);
                    }
                }
                self.visit_expr(&comp.key, keep_forcing);
                self.visit_expr(&comp.value, keep_forcing);
            }
            ast::Expr::GeneratorExp(comp) => {
                for gen in &comp.generators {
                    self.visit_expr(&gen.iter, keep_forcing);
                    for if_ in &gen.ifs {
                        self.visit_expr(if_, keep_forcing);
                    }
                }
                self.visit_expr(&comp.elt, keep_forcing);
            }
            ast::Expr::Await(await_expr) => self.visit_expr(&await_expr.value, keep_forcing),
            ast::Expr::Yield(yield_expr) => {
                if let Some(value) = &yield_expr.value {
                    self.visit_expr(value, keep_forcing);
                }
            }
            ast::Expr::YieldFrom(yield_from) => self.visit_expr(&yield_from.value, keep_forcing),
            ast::Expr::JoinedStr(joined) => {
                for value in &joined.values {
                    self.visit_expr(value, keep_forcing);
                }
            }
            ast::Expr::FormattedValue(formatted) => {
                self.visit_expr(&formatted.value, keep_forcing);
                if let Some(spec) = &formatted.format_spec {
                    self.visit_expr(spec, keep_forcing);
                }
            }
            ast::Expr::NamedExpr(named) => self.visit_expr(&named.value, keep_forcing),
            ast::Expr::Slice(slice) => {
                if let Some(lower) = &slice.lower {
                    self.visit_expr(lower, keep_forcing);
                }
                if let Some(upper) = &slice.upper {
                    self.visit_expr(upper, keep_forcing);
                }
                if let Some(step) = &slice.step {
                    self.visit_expr(step, keep_forcing);
                }
            }
            _ => {}
        }
    }
}

fn is_docstring(stmt: &ast::Stmt) -> bool {
    if let ast::Stmt::Expr(expr_stmt) = stmt {
        if let ast::Expr::Constant(constant) = expr_stmt.value.as_ref() {
            return matches!(constant.value, ast::Constant::Str(_));
        }
    }
    false
}

fn anchor_offset(stmt: &ast::Stmt) -> usize {
    let decorated_start = match stmt {
        ast::Stmt::FunctionDef(func) => func.decorator_list.first().map(|d| d.range().start()),
        ast::Stmt::AsyncFunctionDef(func) => func.decorator_list.first().map(|d| d.range().start()),
        ast::Stmt::ClassDef(class_def) => {
            class_def.decorator_list.first().map(|d| d.range().start())
        }
        _ => None,
    };
    usize::from(decorated_start.unwrap_or_else(|| stmt.range().start()))
}
