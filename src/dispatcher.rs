//! Stitches the pipeline stages together and assembles the final
//! artifact bundle (spec §2 step 7), grounded on
//! `examples/original_source/CHTL/CompilerDispatcher.h`.

use crate::ast::ProgramNode;
use crate::config::Config;
use crate::diagnostics::Reporter;
use crate::generator::Generator;
use crate::import_resolver::{ImportResolver, ModuleLoader, NullModuleLoader};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::Scanner;
use crate::validators::{BalancedCssValidator, CssValidator, JsValidator, OxcJsValidator};
use crate::watchdog::WatchdogGuard;

/// The compiler's full output for one compilation unit, mirroring the
/// original's `IntermediateCompilationResult` field-for-field.
#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateCompilationResult {
    pub initial_html: String,
    pub chtl_generated_css: String,
    pub chtl_generated_js: String,
    pub chtljs_generated_js: String,
    pub raw_css: String,
    pub raw_js: String,
    pub emit_html5_doctype: bool,
    pub ast: ProgramNode,
}

impl IntermediateCompilationResult {
    pub fn css(&self) -> String {
        format!("{}{}", self.chtl_generated_css, self.raw_css)
    }

    pub fn js(&self) -> String {
        format!("{}{}{}", self.chtl_generated_js, self.chtljs_generated_js, self.raw_js)
    }
}

pub struct CompilerDispatcher<'a> {
    config: &'a Config,
    loader: &'a dyn ModuleLoader,
    js_validator: &'a dyn JsValidator,
    css_validator: &'a dyn CssValidator,
}

impl<'a> CompilerDispatcher<'a> {
    pub fn new(config: &'a Config, loader: &'a dyn ModuleLoader) -> Self {
        Self {
            config,
            loader,
            js_validator: &OxcJsValidator,
            css_validator: &BalancedCssValidator,
        }
    }

    pub fn with_validators(mut self, js: &'a dyn JsValidator, css: &'a dyn CssValidator) -> Self {
        self.js_validator = js;
        self.css_validator = css;
        self
    }

    /// Runs the full pipeline (scan → lex → parse → import-resolve →
    /// resolve → generate → validate) on one source file, honoring the
    /// configured watchdog timeout.
    #[tracing::instrument(skip_all, name = "dispatcher.compile", fields(file))]
    pub fn compile(&self, source: &str, file: &str) -> (IntermediateCompilationResult, Reporter) {
        let _guard = WatchdogGuard::arm(self.config.timeout_ms, {
            let file = file.to_string();
            move || {
                tracing::error!(file, "compilation exceeded watchdog timeout");
                std::process::exit(124);
            }
        });

        let mut reporter = Reporter::new();

        // The original pre-scans the `[Configuration]` block before lexing
        // (spec §6): an in-source block must already be in effect for this
        // file's own scan/lex/parse, not just visible to later readers.
        let effective_config = self.prescan_config(source, file);

        let _slices = Scanner::new(source, &effective_config).scan(&mut reporter, file);
        let tokens = Lexer::new(source, &effective_config).tokenize(&mut reporter, file);
        let (program, mut globals, parse_reporter) = Parser::new(tokens, source, &effective_config, file).parse();
        reporter.merge(parse_reporter);

        ImportResolver::new(&effective_config, self.loader).resolve(&program, &mut globals, file, &mut reporter);

        let (resolved, resolve_reporter) = Resolver::new(&globals, &effective_config, file).resolve(program);
        reporter.merge(resolve_reporter);

        let (generated, gen_reporter) = Generator::new(&globals, &effective_config, file).generate(&resolved);
        reporter.merge(gen_reporter);

        let css = generated.chtl_css.clone();
        if let Err(diag) = self.css_validator.validate(&css, file) {
            reporter.push(diag);
        }
        let js = format!("{}{}", generated.chtl_js, generated.chtljs_js);
        if !js.trim().is_empty() {
            if let Err(diag) = self.js_validator.validate(&js, file) {
                reporter.push(diag);
            }
        }

        let result = IntermediateCompilationResult {
            initial_html: generated.html,
            chtl_generated_css: generated.chtl_css,
            chtl_generated_js: generated.chtl_js,
            chtljs_generated_js: generated.chtljs_js,
            raw_css: generated.raw_css,
            raw_js: generated.raw_js,
            emit_html5_doctype: generated.emit_html5_doctype,
            ast: resolved,
        };
        (result, reporter)
    }

    /// Lexes and parses `source` once with the dispatcher's base config,
    /// purely to discover an unnamed `[Configuration]` block, and returns
    /// the merged config the real compilation should use. Diagnostics from
    /// this pass are discarded; the real pass re-reports anything genuinely
    /// wrong. Named configuration blocks (`[Configuration] [MyName] { ... }`)
    /// are stored for later lookup but never apply automatically.
    fn prescan_config(&self, source: &str, file: &str) -> Config {
        let mut scratch = Reporter::new();
        let tokens = Lexer::new(source, self.config).tokenize(&mut scratch, file);
        let (_, globals, _) = Parser::new(tokens, source, self.config, file).parse();
        globals.lookup_configuration("default").cloned().unwrap_or_else(|| self.config.clone())
    }
}

/// Convenience entry point for callers that don't need a custom
/// [`ModuleLoader`] or custom validators (e.g. library embedders, tests).
pub fn compile(source: &str, file: &str, config: &Config) -> (IntermediateCompilationResult, Reporter) {
    let loader = NullModuleLoader;
    CompilerDispatcher::new(config, &loader).compile(source, file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_hello_element_end_to_end() {
        let config = Config::default();
        let (result, reporter) = compile("use html5; div { text { Hello } }", "t.chtl", &config);
        assert!(!reporter.has_errors());
        assert_eq!(result.initial_html, "<!DOCTYPE html><div>Hello</div>");
        assert!(result.css().is_empty());
        assert!(result.js().is_empty());
    }

    #[test]
    fn unresolved_template_is_reported_but_other_errors_still_surface() {
        let config = Config::default();
        let (_, reporter) = compile("div { style { @Style Missing; } } span { style { @Style AlsoMissing; } }", "t.chtl", &config);
        assert_eq!(reporter.diagnostics().iter().filter(|d| d.kind == crate::diagnostics::ErrorKind::UnresolvedTemplate).count(), 2);
    }
}
