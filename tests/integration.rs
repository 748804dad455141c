//! End-to-end scenarios, one per spec case.

use std::collections::HashMap;

use chtl::config::Config;
use chtl::diagnostics::ErrorKind;
use chtl::dispatcher::CompilerDispatcher;
use chtl::import_resolver::ModuleLoader;

#[test]
fn hello_element() {
    let config = Config::default();
    let (result, reporter) = chtl::compile("use html5; div { text { Hello } }", "hello.chtl", &config);
    assert!(!reporter.has_errors());
    assert_eq!(result.initial_html, "<!DOCTYPE html><div>Hello</div>");
    assert!(result.css().is_empty());
    assert!(result.js().is_empty());
}

#[test]
fn local_style_with_auto_class() {
    let config = Config::default();
    let (result, reporter) = chtl::compile(
        "div { style { .card { color: red; } } text { hi } }",
        "card.chtl",
        &config,
    );
    assert!(!reporter.has_errors());
    assert_eq!(result.initial_html, "<div class=\"card\">hi</div>");
    assert!(result.css().contains(".card"));
    assert!(result.css().contains("color: red;"));
}

#[test]
fn template_expansion() {
    let config = Config::default();
    let (result, reporter) = chtl::compile(
        "[Template] @Style Btn { color: blue; } div { style { @Style Btn; } }",
        "btn.chtl",
        &config,
    );
    assert!(!reporter.has_errors());
    assert!(result.css().contains("color: blue;"));
}

#[test]
fn inherit_then_delete() {
    let config = Config::default();
    let (result, reporter) = chtl::compile(
        "[Template] @Style A { color: red; background: white; } \
         [Template] @Style B { inherit A; delete background; } \
         div { style { @Style B; } }",
        "inherit.chtl",
        &config,
    );
    assert!(!reporter.has_errors());
    assert!(result.css().contains("color: red;"));
    assert!(!result.css().contains("background"));
}

/// In-memory loader keyed by the literal path string used in `[Import] ... from "..."`.
struct MapLoader(HashMap<&'static str, &'static str>);

impl ModuleLoader for MapLoader {
    fn load(&self, path: &str, _official: bool) -> Result<(String, String), String> {
        self.0
            .get(path)
            .map(|src| (path.to_string(), src.to_string()))
            .ok_or_else(|| format!("no such module `{path}`"))
    }
}

#[test]
fn import_with_alias_succeeds_and_unknown_reference_is_reported() {
    let config = Config::default();
    let mut modules = HashMap::new();
    modules.insert("a", "[Template] @Style Btn { color: red; }");
    let loader = MapLoader(modules);

    let source_ok = "[Import] [Template] @Style Btn from \"a\" as Red; div { style { @Style Red; } }";
    let (result, reporter) = CompilerDispatcher::new(&config, &loader).compile(source_ok, "b.chtl");
    assert!(!reporter.has_errors());
    assert!(result.css().contains("color: red;"));

    let source_bad = "[Import] [Template] @Style Btn from \"a\"; div { style { @Style NotImported; } }";
    let (_, reporter) = CompilerDispatcher::new(&config, &loader).compile(source_bad, "b.chtl");
    assert!(reporter
        .diagnostics()
        .iter()
        .any(|d| d.kind == ErrorKind::UnresolvedTemplate));
}

#[test]
fn inline_configuration_block_applies_to_its_own_file() {
    let config = Config::default();
    let (result, reporter) = chtl::compile(
        "[Configuration] { DISABLE_STYLE_AUTO_ADD_CLASS = true; } \
         div { style { .card { color: red; } } text { hi } }",
        "configured.chtl",
        &config,
    );
    assert!(!reporter.has_errors());
    assert_eq!(result.initial_html, "<div>hi</div>");
}

#[test]
fn chtljs_lowering_produces_runtime_calls() {
    let config = Config::default();
    let (result, reporter) = chtl::compile(
        "div { script { {{.x}}.listen({ click: fn }); } }",
        "script.chtl",
        &config,
    );
    assert!(!reporter.has_errors());
    let js = result.js();
    assert!(js.contains("CHTLJS_SELECT(\".x\")"));
    assert!(js.contains("CHTLJS_LISTEN"));
}
