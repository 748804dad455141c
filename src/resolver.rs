//! Expands template/custom usages, applies inherit/delete/insert, resolves
//! variable references, and flattens style selectors (spec §4.5).
//!
//! Grounded on `examples/original_source/CHTL/include/CHTL/Resolver/Resolver.h`:
//! `ResolveTemplate`/`VisitElementNode`/`VisitStyleNode` map to the
//! functions below, but as a transforming pass that returns a new tree
//! (Design Note 9) instead of mutating `AstNodePtr` in place.

use std::collections::{HashMap, HashSet};

use crate::ast::*;
use crate::config::Config;
use crate::diagnostics::{Diagnostic, ErrorKind, Reporter};
use crate::global_map::GlobalMap;
use crate::selectors;

#[derive(Debug, Clone)]
enum ExpandedDef {
    Style(Vec<Declaration>),
    Element(Vec<AstNode>),
    Var(Vec<(String, String)>),
}

pub struct Resolver<'a> {
    globals: &'a GlobalMap,
    config: &'a Config,
    file: String,
    cache: HashMap<String, ExpandedDef>,
    reporter: Reporter,
    class_counter: i64,
}

impl<'a> Resolver<'a> {
    pub fn new(globals: &'a GlobalMap, config: &'a Config, file: impl Into<String>) -> Self {
        Self {
            globals,
            config,
            file: file.into(),
            cache: HashMap::new(),
            reporter: Reporter::new(),
            class_counter: config.index_initial_count,
        }
    }

    #[tracing::instrument(skip_all, name = "resolver.resolve")]
    pub fn resolve(mut self, program: ProgramNode) -> (ProgramNode, Reporter) {
        let children = self.resolve_nodes(program.children, "");
        (
            ProgramNode {
                use_html5: program.use_html5,
                children,
            },
            self.reporter,
        )
    }

    fn resolve_nodes(&mut self, nodes: Vec<AstNode>, namespace: &str) -> Vec<AstNode> {
        let mut out = Vec::new();
        for node in nodes {
            match node {
                // Declarations and already-consumed imports don't emit
                // anything themselves; only usage sites do.
                AstNode::TemplateDefinition(_) | AstNode::Import(_) | AstNode::Config(_) => {}
                AstNode::Namespace(ns) => {
                    let child_ns = if namespace.is_empty() { ns.name.clone() } else { format!("{namespace}.{}", ns.name) };
                    let children = self.resolve_nodes(ns.children, &child_ns);
                    out.push(AstNode::Namespace(Box::new(NamespaceNode { name: ns.name, children })));
                }
                AstNode::Element(e) => out.push(self.resolve_element(*e, namespace)),
                AstNode::Style(style) => {
                    let mut rules = Vec::new();
                    self.resolve_style_rules(style.rules, namespace, &None, &None, &mut rules);
                    out.push(AstNode::Style(StyleNode { rules }));
                }
                AstNode::TemplateUsage(usage) => {
                    let mut visiting = HashSet::new();
                    match self.expand_usage(*usage, namespace, &mut visiting) {
                        Ok(expanded) => out.extend(expanded),
                        Err(diag) => self.reporter.push(diag),
                    }
                }
                other => out.push(other),
            }
        }
        out
    }

    fn resolve_element(&mut self, e: ElementNode, namespace: &str) -> AstNode {
        let mut attributes: Vec<AttributeNode> = e
            .attributes
            .into_iter()
            .map(|mut attr| {
                attr.value = self.resolve_value(&attr.value, namespace, attr.line);
                attr
            })
            .collect();

        let manual_class = attributes.iter().find(|a| a.key == "class").map(|a| first_token(&a.value));
        let manual_id = attributes.iter().find(|a| a.key == "id").map(|a| a.value.clone());

        let style = e.style.map(|s| self.resolve_style(s, namespace, &manual_class, &manual_id, &mut attributes));

        let children = self.resolve_nodes(e.children, namespace);

        AstNode::Element(Box::new(ElementNode {
            tag: e.tag,
            attributes,
            style,
            script: e.script,
            children,
            line: e.line,
        }))
    }

    /// Resolves `&` to the enclosing element's class/id (synthesizing one
    /// if necessary), flattens [`SelectorBlockNode`]s, and expands any
    /// `@Style` template/custom usage found inside the style block.
    fn resolve_style(
        &mut self,
        style: StyleNode,
        namespace: &str,
        manual_class: &Option<String>,
        manual_id: &Option<String>,
        attributes: &mut Vec<AttributeNode>,
    ) -> StyleNode {
        let (first_class, first_id) = selectors::first_class_and_id(&style);
        let anchor_class = manual_class.clone().or(first_class);
        let anchor_id = manual_id.clone().or(first_id);

        let needs_anchor = style_uses_ampersand(&style) && anchor_class.is_none() && anchor_id.is_none();
        let anchor_class = if needs_anchor {
            let synthesized = format!("chtl-auto-{}", self.class_counter);
            self.class_counter += 1;
            attributes.insert(0, AttributeNode { key: "class".into(), value: synthesized.clone(), line: 0 });
            Some(synthesized)
        } else {
            anchor_class
        };

        let mut rules = Vec::new();
        self.resolve_style_rules(style.rules, namespace, &anchor_class, &anchor_id, &mut rules);
        StyleNode { rules }
    }

    fn resolve_style_rules(
        &mut self,
        nodes: Vec<AstNode>,
        namespace: &str,
        anchor_class: &Option<String>,
        anchor_id: &Option<String>,
        out: &mut Vec<AstNode>,
    ) {
        for node in nodes {
            match node {
                AstNode::StyleRule(mut r) => {
                    r.selector = substitute_ampersand(&r.selector, anchor_class, anchor_id);
                    r.declarations = r
                        .declarations
                        .into_iter()
                        .map(|mut d| {
                            d.value = self.resolve_value(&d.value, namespace, 0);
                            d
                        })
                        .collect();
                    out.push(AstNode::StyleRule(r));
                }
                AstNode::InlineStyleRule(mut r) => {
                    r.declarations = r
                        .declarations
                        .into_iter()
                        .map(|mut d| {
                            d.value = self.resolve_value(&d.value, namespace, 0);
                            d
                        })
                        .collect();
                    out.push(AstNode::InlineStyleRule(r));
                }
                AstNode::SelectorBlock(b) => {
                    let selector = substitute_ampersand(&b.selector, anchor_class, anchor_id);
                    // A nested selector block desugars into a standalone
                    // style rule per nested declaration group plus
                    // recursively-flattened nested blocks.
                    let mut declarations = Vec::new();
                    let mut nested = Vec::new();
                    for rule in b.rules {
                        match rule {
                            AstNode::InlineStyleRule(r) => declarations.extend(r.declarations),
                            other => nested.push(other),
                        }
                    }
                    if !declarations.is_empty() {
                        out.push(AstNode::StyleRule(StyleRuleNode {
                            selector: selector.clone(),
                            declarations: declarations
                                .into_iter()
                                .map(|mut d| {
                                    d.value = self.resolve_value(&d.value, namespace, 0);
                                    d
                                })
                                .collect(),
                        }));
                    }
                    self.resolve_style_rules(nested, namespace, anchor_class, anchor_id, out);
                }
                AstNode::TemplateUsage(usage) => {
                    let mut visiting = HashSet::new();
                    match self.expand_usage(*usage, namespace, &mut visiting) {
                        Ok(expanded) => self.resolve_style_rules(expanded, namespace, anchor_class, anchor_id, out),
                        Err(diag) => self.reporter.push(diag),
                    }
                }
                AstNode::Delete(_) => {
                    // A bare `delete` inside a style block with nothing to
                    // delete from (no enclosing custom usage) is a no-op;
                    // deletes inside template/custom bodies are consumed
                    // during `expand_usage`/`expand_template_def`.
                }
                other => out.push(other),
            }
        }
    }

    fn resolve_value(&mut self, value: &str, namespace: &str, line: u32) -> String {
        if let Some((group, key)) = parse_var_usage_text(value) {
            match self.globals.lookup_template(namespace, TemplateCategory::Var, group) {
                Some(def) => match def.var_bindings.iter().find(|(k, _)| k == key) {
                    Some((_, v)) => return v.clone(),
                    None => {
                        self.reporter.push(Diagnostic::error(
                            ErrorKind::UnresolvedVariable,
                            &self.file,
                            line,
                            1,
                            format!("variable group `{group}` has no key `{key}`"),
                        ));
                        return String::new();
                    }
                },
                None => {
                    self.reporter.push(Diagnostic::error(
                        ErrorKind::UnresolvedVariable,
                        &self.file,
                        line,
                        1,
                        format!("undefined variable group `{group}`"),
                    ));
                    return String::new();
                }
            }
        }
        value.to_string()
    }

    /// Expands a `TemplateUsageNode` into the AST fragment it stands for,
    /// applying the usage's own override block afterward.
    fn expand_usage(&mut self, usage: TemplateUsageNode, namespace: &str, visiting: &mut HashSet<String>) -> Result<Vec<AstNode>, Diagnostic> {
        let def = self
            .globals
            .lookup_template(namespace, usage.category, &usage.name)
            .cloned()
            .ok_or_else(|| {
                Diagnostic::error(
                    ErrorKind::UnresolvedTemplate,
                    &self.file,
                    usage.line,
                    1,
                    format!("undefined {} `{}`", usage.category, usage.name),
                )
            })?;

        if !usage.overrides.is_empty() && !def.is_custom {
            self.reporter.push(Diagnostic::error(
                ErrorKind::InvalidDelete,
                &self.file,
                usage.line,
                1,
                format!("`{}` is a [Template], not a [Custom]; it cannot be overridden at the usage site", usage.name),
            ));
        }

        let expanded = self.expand_template_def(&def, namespace, visiting)?;
        let fragment = match (usage.category, expanded) {
            (TemplateCategory::Style, ExpandedDef::Style(decls)) => {
                vec![AstNode::InlineStyleRule(InlineStyleRuleNode { declarations: decls })]
            }
            (TemplateCategory::Element, ExpandedDef::Element(children)) => children,
            (TemplateCategory::Var, ExpandedDef::Var(_)) => Vec::new(),
            _ => unreachable!("category matches the expansion kind it produced"),
        };

        if def.is_custom && !usage.overrides.is_empty() {
            Ok(self.apply_overrides(fragment, usage.overrides, namespace))
        } else {
            Ok(fragment)
        }
    }

    /// Expands a template/custom *definition* (its own `inherit`/`delete`
    /// chain), memoized by fully-qualified name (spec §4.5 point 5).
    fn expand_template_def(&mut self, def: &TemplateDefinitionNode, namespace: &str, visiting: &mut HashSet<String>) -> Result<ExpandedDef, Diagnostic> {
        let fq = crate::global_map::qualify(namespace, &format!("{}#{}", def.category, def.name));
        if let Some(cached) = self.cache.get(&fq) {
            return Ok(cached.clone());
        }
        if !visiting.insert(fq.clone()) {
            return Err(Diagnostic::error(
                ErrorKind::CyclicInherit,
                &self.file,
                def.line,
                1,
                format!("cyclic inherit chain involving `{}`", def.name),
            ));
        }

        let mut decls: Vec<Declaration> = Vec::new();
        let mut children: Vec<AstNode> = Vec::new();
        let mut bindings: Vec<(String, String)> = Vec::new();

        for inherit in &def.inherits {
            let parent = self.globals.lookup_template(namespace, def.category, &inherit.name).cloned().ok_or_else(|| {
                Diagnostic::error(
                    ErrorKind::UnresolvedTemplate,
                    &self.file,
                    inherit.line,
                    1,
                    format!("`inherit {}`: no such {} in scope", inherit.name, def.category),
                )
            })?;
            if parent.category != def.category {
                return Err(Diagnostic::error(
                    ErrorKind::TypeMismatch,
                    &self.file,
                    inherit.line,
                    1,
                    format!(
                        "`{}` ({}) cannot inherit `{}` ({})",
                        def.name, def.category, parent.name, parent.category
                    ),
                ));
            }
            match self.expand_template_def(&parent, namespace, visiting)? {
                ExpandedDef::Style(d) => decls.extend(d),
                ExpandedDef::Element(c) => children.extend(c),
                ExpandedDef::Var(b) => bindings.extend(b),
            }
        }

        match def.category {
            TemplateCategory::Style => {
                for node in &def.body {
                    if let AstNode::InlineStyleRule(r) = node {
                        decls.extend(r.declarations.clone());
                    }
                }
            }
            TemplateCategory::Element => {
                children.extend(
                    def.body
                        .iter()
                        .filter(|n| !matches!(n, AstNode::Delete(_) | AstNode::Insert(_)))
                        .cloned(),
                );
            }
            TemplateCategory::Var => {
                bindings.extend(def.var_bindings.clone());
            }
        }

        for node in &def.body {
            match node {
                AstNode::Delete(delete) => {
                    decls.retain(|d| d.property != delete.target);
                    children.retain(|c| !node_matches_selector(c, &delete.target));
                }
                AstNode::Insert(insert) if def.category == TemplateCategory::Element => {
                    if let Err(diag) = apply_insert(&mut children, (**insert).clone(), &self.file) {
                        self.reporter.push(diag);
                    }
                }
                _ => {}
            }
        }

        let expanded = match def.category {
            TemplateCategory::Style => ExpandedDef::Style(dedup_declarations(decls)),
            TemplateCategory::Element => ExpandedDef::Element(children),
            TemplateCategory::Var => ExpandedDef::Var(bindings),
        };
        visiting.remove(&fq);
        self.cache.insert(fq, expanded.clone());
        Ok(expanded)
    }

    fn apply_overrides(&mut self, mut fragment: Vec<AstNode>, overrides: Vec<AstNode>, _namespace: &str) -> Vec<AstNode> {
        for over in overrides {
            match over {
                AstNode::Delete(delete) => {
                    fragment.retain(|n| !node_matches_selector(n, &delete.target));
                    if let Some(AstNode::InlineStyleRule(r)) = fragment.first_mut() {
                        r.declarations.retain(|d| d.property != delete.target);
                    }
                }
                AstNode::Insert(insert) => {
                    if let Err(diag) = apply_insert(&mut fragment, *insert, &self.file) {
                        self.reporter.push(diag);
                    }
                }
                AstNode::Attribute(attr) => {
                    if let Some(AstNode::Element(e)) = fragment.first_mut() {
                        e.attributes.retain(|a| a.key != attr.key);
                        e.attributes.push(attr);
                    }
                }
                _ => {}
            }
        }
        fragment
    }
}

/// Splices `insert`'s payload into `fragment` at the position it names.
/// Shared between usage-site overrides and in-definition inserts (a custom
/// `[Custom] @Element` body may itself `insert` into what it inherits).
fn apply_insert(fragment: &mut Vec<AstNode>, insert: InsertNode, file: &str) -> Result<(), Diagnostic> {
    match insert.position {
        InsertPosition::AtTop => {
            for node in insert.payload.into_iter().rev() {
                fragment.insert(0, node);
            }
        }
        InsertPosition::AtBottom => fragment.extend(insert.payload),
        InsertPosition::Before | InsertPosition::After | InsertPosition::Replace => {
            let idx = fragment.iter().position(|n| node_matches_selector(n, &insert.target));
            match idx {
                Some(i) => match insert.position {
                    InsertPosition::Before => {
                        for (k, node) in insert.payload.into_iter().enumerate() {
                            fragment.insert(i + k, node);
                        }
                    }
                    InsertPosition::After => {
                        for (k, node) in insert.payload.into_iter().enumerate() {
                            fragment.insert(i + 1 + k, node);
                        }
                    }
                    InsertPosition::Replace => {
                        fragment.remove(i);
                        for (k, node) in insert.payload.into_iter().enumerate() {
                            fragment.insert(i + k, node);
                        }
                    }
                    _ => unreachable!(),
                },
                None => {
                    return Err(Diagnostic::error(
                        ErrorKind::InvalidInsertTarget,
                        file,
                        insert.line,
                        1,
                        format!("insert target `{}` not found in expansion", insert.target),
                    ))
                }
            }
        }
    }
    Ok(())
}

fn dedup_declarations(decls: Vec<Declaration>) -> Vec<Declaration> {
    let mut out: Vec<Declaration> = Vec::new();
    for d in decls {
        out.retain(|existing| existing.property != d.property);
        out.push(d);
    }
    out
}

fn node_matches_selector(node: &AstNode, target: &str) -> bool {
    match node {
        AstNode::Element(e) => e.tag == target,
        AstNode::StyleRule(r) => r.selector == target,
        AstNode::Attribute(a) => a.key == target,
        _ => false,
    }
}

fn style_uses_ampersand(style: &StyleNode) -> bool {
    fn check(nodes: &[AstNode]) -> bool {
        nodes.iter().any(|n| match n {
            AstNode::StyleRule(r) => r.selector.contains('&'),
            AstNode::SelectorBlock(b) => b.selector.contains('&') || check(&b.rules),
            _ => false,
        })
    }
    check(&style.rules)
}

fn substitute_ampersand(selector: &str, class: &Option<String>, id: &Option<String>) -> String {
    if !selector.contains('&') {
        return selector.to_string();
    }
    let anchor = class.as_ref().map(|c| format!(".{c}")).or_else(|| id.as_ref().map(|i| format!("#{i}"))).unwrap_or_default();
    selector.replace('&', &anchor)
}

fn first_token(value: &str) -> String {
    value.split_whitespace().next().unwrap_or(value).trim_start_matches('.').to_string()
}

/// Recognizes the `Group(Key)` textual form the parser produces for
/// variable-group usage in value position.
fn parse_var_usage_text(value: &str) -> Option<(&str, &str)> {
    let open = value.find('(')?;
    if !value.ends_with(')') {
        return None;
    }
    let group = &value[..open];
    let key = &value[open + 1..value.len() - 1];
    if group.is_empty() || key.is_empty() || !group.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some((group, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn run(src: &str) -> (ProgramNode, Reporter) {
        let config = Config::default();
        let mut lr = Reporter::new();
        let tokens = Lexer::new(src, &config).tokenize(&mut lr, "t.chtl");
        let (program, globals, parse_reporter) = Parser::new(tokens, src, &config, "t.chtl").parse();
        let mut reporter = Reporter::new();
        reporter.merge(parse_reporter);
        let (resolved, resolve_reporter) = Resolver::new(&globals, &config, "t.chtl").resolve(program);
        reporter.merge(resolve_reporter);
        (resolved, reporter)
    }

    #[test]
    fn template_usage_expands_to_declarations() {
        let (program, reporter) = run("[Template] @Style Btn { color: blue; } div { style { @Style Btn; } }");
        assert!(!reporter.has_errors());
        let AstNode::Element(e) = &program.children[0] else { panic!() };
        let style = e.style.as_ref().unwrap();
        assert!(style.rules.iter().any(|r| matches!(r, AstNode::InlineStyleRule(ir) if ir.declarations.iter().any(|d| d.value == "blue"))));
    }

    #[test]
    fn inherit_then_delete_drops_background() {
        let (program, reporter) = run(
            "[Template] @Style A { color: red; background: white; } \
             [Template] @Style B { inherit A; delete background; } \
             div { style { @Style B; } }",
        );
        assert!(!reporter.has_errors());
        let AstNode::Element(e) = &program.children[0] else { panic!() };
        let style = e.style.as_ref().unwrap();
        let AstNode::InlineStyleRule(r) = &style.rules[0] else { panic!() };
        assert_eq!(r.declarations.len(), 1);
        assert_eq!(r.declarations[0].property, "color");
    }

    #[test]
    fn no_leftover_usage_nodes_after_resolution() {
        let (program, reporter) = run("[Template] @Style Btn { color: blue; } div { style { @Style Btn; } }");
        assert!(!reporter.has_errors());
        assert!(!program.children.iter().any(AstNode::contains_unresolved));
    }

    #[test]
    fn resolver_is_idempotent_on_its_own_output() {
        let (program, _) = run("[Template] @Style Btn { color: blue; } div { style { @Style Btn; } }");
        let config = Config::default();
        let globals = GlobalMap::new();
        let (program2, reporter2) = Resolver::new(&globals, &config, "t.chtl").resolve(program.clone());
        assert!(!reporter2.has_errors());
        assert_eq!(program, program2);
    }

    #[test]
    fn unresolved_template_is_fatal() {
        let (_, reporter) = run("div { style { @Style Nope; } }");
        assert!(reporter.has_errors());
    }
}
