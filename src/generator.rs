//! Walks the resolved AST and emits HTML while accumulating CSS and JS
//! buffers (spec §4.6), grounded on
//! `examples/original_source/CHTL/include/CHTL/Generator/Generator.h`'s
//! `Visit*` method split — translated from string-accumulating methods on
//! `this` into a struct of named buffers, since there is no shared-pointer
//! tree to walk by reference here.

use std::fmt::Write as _;

use crate::ast::*;
use crate::chtljs;
use crate::config::Config;
use crate::diagnostics::{Diagnostic, ErrorKind, Reporter};
use crate::global_map::GlobalMap;
use crate::selectors;

const VOID_ELEMENTS: &[&str] = &["br", "img", "input", "meta", "link", "hr", "area", "base", "col", "embed", "param", "source", "track", "wbr"];

/// The generator's raw output, kept in the same shape as the original
/// `IntermediateCompilationResult` (spec §2 step 7) so the dispatcher can
/// combine or inspect each category independently.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GeneratedOutput {
    pub html: String,
    pub chtl_css: String,
    pub chtl_js: String,
    pub chtljs_js: String,
    pub raw_css: String,
    pub raw_js: String,
    pub emit_html5_doctype: bool,
}

impl GeneratedOutput {
    pub fn css(&self) -> String {
        format!("{}{}", self.chtl_css, self.raw_css)
    }

    pub fn js(&self) -> String {
        format!("{}{}{}", self.chtl_js, self.chtljs_js, self.raw_js)
    }
}

pub struct Generator<'a> {
    globals: &'a GlobalMap,
    config: &'a Config,
    file: String,
    out: GeneratedOutput,
    reporter: Reporter,
    class_counter: i64,
}

impl<'a> Generator<'a> {
    pub fn new(globals: &'a GlobalMap, config: &'a Config, file: impl Into<String>) -> Self {
        Self {
            globals,
            config,
            file: file.into(),
            out: GeneratedOutput::default(),
            reporter: Reporter::new(),
            class_counter: config.index_initial_count,
        }
    }

    #[tracing::instrument(skip_all, name = "generator.generate")]
    pub fn generate(mut self, program: &ProgramNode) -> (GeneratedOutput, Reporter) {
        self.out.emit_html5_doctype = program.use_html5;
        if program.use_html5 {
            self.out.html.push_str("<!DOCTYPE html>");
        }
        self.visit_nodes(&program.children, "");
        (self.out, self.reporter)
    }

    fn visit_nodes(&mut self, nodes: &[AstNode], namespace: &str) {
        for node in nodes {
            self.visit_node(node, namespace);
        }
    }

    fn visit_node(&mut self, node: &AstNode, namespace: &str) {
        match node {
            AstNode::Element(e) => self.visit_element(e, namespace),
            AstNode::Text(t) => self.out.html.push_str(&escape_html(&t.value)),
            AstNode::Comment(c) if c.is_generator => {
                let _ = write!(self.out.html, "<!--{}-->", c.content);
            }
            AstNode::Origin(o) => self.emit_origin_body(o),
            AstNode::OriginUsage(usage) => self.visit_origin_usage(usage, namespace),
            AstNode::Namespace(ns) => {
                let child_ns = if namespace.is_empty() { ns.name.clone() } else { format!("{namespace}.{}", ns.name) };
                self.visit_nodes(&ns.children, &child_ns);
            }
            AstNode::Style(style) => self.emit_global_style(style),
            AstNode::Script(script) => self.emit_script(script),
            _ => {}
        }
    }

    fn visit_element(&mut self, e: &ElementNode, namespace: &str) {
        let mut attributes = e.attributes.clone();
        self.apply_selector_automation(e, &mut attributes);
        let attributes = collapse_duplicates(attributes, &self.file, &mut self.reporter);

        let is_void = VOID_ELEMENTS.contains(&e.tag.as_str());
        let _ = write!(self.out.html, "<{}", e.tag);
        for attr in &attributes {
            let _ = write!(self.out.html, " {}=\"{}\"", attr.key, escape_attr(&attr.value));
        }
        if is_void {
            self.out.html.push_str(" />");
        } else {
            self.out.html.push('>');
        }

        if let Some(style) = &e.style {
            self.emit_element_style(style, &attributes);
        }
        if let Some(script) = &e.script {
            self.emit_script(script);
        }

        if !is_void {
            self.visit_nodes(&e.children, namespace);
            let _ = write!(self.out.html, "</{}>", e.tag);
        }
    }

    /// Synthesizes `class`/`id` attributes from the first class/id selector
    /// found in the style block, then again for the script block's
    /// enhanced selectors, per spec §4.6 "Selector automation". Skips a
    /// category already satisfied by a manual (or resolver-synthesized,
    /// for `&`) attribute.
    fn apply_selector_automation(&mut self, e: &ElementNode, attributes: &mut Vec<AttributeNode>) {
        let has_class = attributes.iter().any(|a| a.key == "class");
        let has_id = attributes.iter().any(|a| a.key == "id");

        let (mut class, mut id) = e.style.as_ref().map(selectors::first_class_and_id).unwrap_or((None, None));

        if class.is_none() && !has_class {
            if let Some(style) = &e.style {
                if style_has_inline_declarations(style) {
                    class = Some(self.next_synthetic_class());
                }
            }
        }

        if let Some(script) = &e.script {
            let (script_class, script_id) = first_enhanced_selector(&script.raw_body);
            if class.is_none() {
                class = script_class.filter(|_| !self.config.disable_script_auto_add_class);
            }
            if id.is_none() {
                id = script_id.filter(|_| !self.config.disable_script_auto_add_id);
            }
        }

        if !has_class && !self.config.disable_style_auto_add_class {
            if let Some(class) = class {
                attributes.insert(0, AttributeNode { key: "class".into(), value: class, line: e.line });
            }
        }
        if !has_id && !self.config.disable_style_auto_add_id {
            if let Some(id) = id {
                attributes.insert(0, AttributeNode { key: "id".into(), value: id, line: e.line });
            }
        }
    }

    fn next_synthetic_class(&mut self) -> String {
        let name = format!("chtl-style-{}", self.class_counter);
        self.class_counter += 1;
        name
    }

    fn emit_element_style(&mut self, style: &StyleNode, attributes: &[AttributeNode]) {
        let anchor_class = attributes.iter().find(|a| a.key == "class").map(|a| a.value.clone());
        let anchor_id = attributes.iter().find(|a| a.key == "id").map(|a| a.value.clone());
        let mut inline_decls: Vec<Declaration> = Vec::new();

        for rule in &style.rules {
            match rule {
                AstNode::StyleRule(r) => self.emit_css_rule(&r.selector, &r.declarations),
                AstNode::InlineStyleRule(r) => inline_decls.extend(r.declarations.clone()),
                _ => {}
            }
        }

        if !inline_decls.is_empty() {
            let selector = anchor_class.map(|c| format!(".{c}")).or_else(|| anchor_id.map(|i| format!("#{i}")));
            match selector {
                Some(selector) => self.emit_css_rule(&selector, &inline_decls),
                None => self.reporter.push(Diagnostic::warning(
                    ErrorKind::InvalidDelete,
                    &self.file,
                    0,
                    1,
                    "inline style declarations have no anchor class/id to scope to; dropped",
                )),
            }
        }
    }

    fn emit_global_style(&mut self, style: &StyleNode) {
        for rule in &style.rules {
            if let AstNode::StyleRule(r) = rule {
                self.emit_css_rule(&r.selector, &r.declarations);
            }
        }
    }

    fn emit_css_rule(&mut self, selector: &str, declarations: &[Declaration]) {
        let _ = write!(self.out.chtl_css, "{selector} {{ ");
        for decl in declarations {
            let _ = write!(self.out.chtl_css, "{}: {}; ", decl.property, decl.value);
        }
        self.out.chtl_css.push_str("}\n");
    }

    fn emit_script(&mut self, script: &ScriptNode) {
        let lowered = chtljs::lower_script(&script.raw_body, script.line);
        let _ = writeln!(self.out.chtl_js, "/* {}:{} */", self.file, script.line);
        self.out.chtl_js.push_str(&lowered.plain_js);
        self.out.chtl_js.push('\n');
        self.out.chtljs_js.push_str(&lowered.chtljs_generated);
    }

    fn emit_origin_body(&mut self, origin: &OriginNode) {
        match origin.origin_type.as_str() {
            "@Html" => self.out.html.push_str(&origin.body),
            "@Style" => self.out.raw_css.push_str(&origin.body),
            "@JavaScript" => self.out.raw_js.push_str(&origin.body),
            _ => self.out.raw_js.push_str(&origin.body),
        }
    }

    fn visit_origin_usage(&mut self, usage: &OriginUsageNode, namespace: &str) {
        match self.globals.lookup_origin(namespace, &usage.origin_type, &usage.name).cloned() {
            Some(origin) => self.emit_origin_body(&origin),
            None => self.reporter.push(Diagnostic::error(
                ErrorKind::UnresolvedTemplate,
                &self.file,
                0,
                1,
                format!("undefined origin `{}` `{}`", usage.origin_type, usage.name),
            )),
        }
    }
}

fn style_has_inline_declarations(style: &StyleNode) -> bool {
    style.rules.iter().any(|r| matches!(r, AstNode::InlineStyleRule(ir) if !ir.declarations.is_empty()))
}

/// Scans a script body's raw text for the first `{{.class}}` / `{{#id}}`
/// enhanced selector, for script-side selector automation.
fn first_enhanced_selector(raw_body: &str) -> (Option<String>, Option<String>) {
    let mut class = None;
    let mut id = None;
    let mut rest = raw_body;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        let inner = after[..end].trim();
        if let Some(name) = inner.strip_prefix('.') {
            if class.is_none() && !name.is_empty() {
                class = Some(name.to_string());
            }
        } else if let Some(name) = inner.strip_prefix('#') {
            if id.is_none() && !name.is_empty() {
                id = Some(name.to_string());
            }
        }
        if class.is_some() && id.is_some() {
            break;
        }
        rest = &after[end + 2..];
    }
    (class, id)
}

/// Collapses duplicate attribute keys (last write wins), reporting each
/// collision (spec §4.6 "duplicates collapse with last-write-wins after a
/// diagnostic").
fn collapse_duplicates(attributes: Vec<AttributeNode>, file: &str, reporter: &mut Reporter) -> Vec<AttributeNode> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: std::collections::HashMap<String, AttributeNode> = std::collections::HashMap::new();
    for attr in attributes {
        if let Some(existing) = latest.get(&attr.key) {
            reporter.push(Diagnostic::warning(
                ErrorKind::DuplicateSymbol,
                file,
                attr.line,
                1,
                format!("duplicate attribute `{}` (previous value `{}` overwritten)", attr.key, existing.value),
            ));
        } else {
            order.push(attr.key.clone());
        }
        latest.insert(attr.key.clone(), attr);
    }
    order.into_iter().map(|k| latest.remove(&k).unwrap()).collect()
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::resolver::Resolver;

    fn run(src: &str) -> (GeneratedOutput, Reporter) {
        let config = Config::default();
        let mut lr = Reporter::new();
        let tokens = Lexer::new(src, &config).tokenize(&mut lr, "t.chtl");
        let (program, globals, parse_reporter) = Parser::new(tokens, src, &config, "t.chtl").parse();
        let (resolved, resolve_reporter) = Resolver::new(&globals, &config, "t.chtl").resolve(program);
        let (output, gen_reporter) = Generator::new(&globals, &config, "t.chtl").generate(&resolved);
        let mut reporter = Reporter::new();
        reporter.merge(parse_reporter);
        reporter.merge(resolve_reporter);
        reporter.merge(gen_reporter);
        (output, reporter)
    }

    #[test]
    fn hello_element_scenario() {
        let (out, reporter) = run("use html5; div { text { Hello } }");
        assert!(!reporter.has_errors());
        assert_eq!(out.html, "<!DOCTYPE html><div>Hello</div>");
        assert!(out.css().is_empty());
        assert!(out.js().is_empty());
    }

    #[test]
    fn local_style_auto_class_scenario() {
        let (out, reporter) = run("div { style { .card { color: red; } } text { hi } }");
        assert!(!reporter.has_errors());
        assert_eq!(out.html, "<div class=\"card\">hi</div>");
        assert!(out.css().contains(".card { color: red; }"));
    }

    #[test]
    fn template_expansion_scenario() {
        let (out, reporter) = run("[Template] @Style Btn { color: blue; } div { style { @Style Btn; } }");
        assert!(!reporter.has_errors());
        assert!(out.css().contains("color: blue;"));
        assert!(out.html.contains("class=\""));
    }

    #[test]
    fn inherit_and_delete_scenario() {
        let (out, reporter) = run(
            "[Template] @Style A { color: red; background: white; } \
             [Template] @Style B { inherit A; delete background; } \
             div { style { @Style B; } }",
        );
        assert!(!reporter.has_errors());
        assert!(out.css().contains("color: red;"));
        assert!(!out.css().contains("background"));
    }

    #[test]
    fn void_element_self_closes() {
        let (out, reporter) = run("img { src: \"a.png\"; }");
        assert!(!reporter.has_errors());
        assert_eq!(out.html, "<img src=\"a.png\" />");
    }

    #[test]
    fn duplicate_attribute_collapses_with_diagnostic() {
        let (out, reporter) = run("div { id: a; id: b; text { x } }");
        assert!(out.html.contains("id=\"b\""));
        assert!(!out.html.contains("id=\"a\""));
        assert!(reporter.diagnostics().iter().any(|d| d.kind == ErrorKind::DuplicateSymbol));
    }
}
