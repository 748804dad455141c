//! Import resolution: locates each [`ImportNode`]'s target file, compiles
//! it far enough to populate a [`GlobalMap`], and merges its symbols into
//! the importer's map under alias/except rules (spec §4.4).
//!
//! File-system search itself is a collaborator concern (spec §1): this
//! module only needs a name → source lookup, exposed as [`ModuleLoader`],
//! grounded on `examples/original_source/src_new/CHTL/CHTLLoader/CHTLLoader.h`'s
//! `Resolve(name) -> path` shape.

use std::collections::HashSet;

use crate::ast::{AstNode, ImportCategory, ImportNode, ProgramNode};
use crate::config::Config;
use crate::diagnostics::{Diagnostic, ErrorKind, Reporter};
use crate::global_map::GlobalMap;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::scanner::Scanner;

/// Resolves an import path to a canonical identifier (used for cycle
/// detection) and the module's source text.
pub trait ModuleLoader {
    fn load(&self, path: &str, official: bool) -> Result<(String, String), String>;
}

/// A loader with no search roots configured; every import fails. Useful
/// for library callers that only want the in-memory pipeline and handle
/// imports themselves, or for unit tests.
#[derive(Debug, Default)]
pub struct NullModuleLoader;

impl ModuleLoader for NullModuleLoader {
    fn load(&self, path: &str, _official: bool) -> Result<(String, String), String> {
        Err(format!("no module loader configured to resolve `{path}`"))
    }
}

pub struct ImportResolver<'a> {
    config: &'a Config,
    loader: &'a dyn ModuleLoader,
}

impl<'a> ImportResolver<'a> {
    pub fn new(config: &'a Config, loader: &'a dyn ModuleLoader) -> Self {
        Self { config, loader }
    }

    /// Walk every `ImportNode` in `program` (recursively, including inside
    /// namespaces) and merge the resulting symbols into `globals`.
    #[tracing::instrument(skip_all, name = "import_resolver.resolve")]
    pub fn resolve(
        &self,
        program: &ProgramNode,
        globals: &mut GlobalMap,
        file: &str,
        reporter: &mut Reporter,
    ) {
        let mut in_progress = HashSet::new();
        in_progress.insert(file.to_string());
        self.walk(&program.children, "", globals, file, reporter, &mut in_progress);
    }

    fn walk(
        &self,
        nodes: &[AstNode],
        namespace: &str,
        globals: &mut GlobalMap,
        file: &str,
        reporter: &mut Reporter,
        in_progress: &mut HashSet<String>,
    ) {
        for node in nodes {
            match node {
                AstNode::Import(import) => self.resolve_one(import, namespace, globals, file, reporter, in_progress),
                AstNode::Namespace(ns) => {
                    let child_ns = if namespace.is_empty() {
                        ns.name.clone()
                    } else {
                        format!("{namespace}.{}", ns.name)
                    };
                    self.walk(&ns.children, &child_ns, globals, file, reporter, in_progress);
                }
                _ => {}
            }
        }
    }

    fn resolve_one(
        &self,
        import: &ImportNode,
        namespace: &str,
        globals: &mut GlobalMap,
        file: &str,
        reporter: &mut Reporter,
        in_progress: &mut HashSet<String>,
    ) {
        let official = import.path.starts_with("chtl::");
        let (canonical, source) = match self.loader.load(&import.path, official) {
            Ok(v) => v,
            Err(message) => {
                reporter.push(Diagnostic::error(
                    ErrorKind::UnresolvedImport,
                    file,
                    import.line,
                    1,
                    format!("cannot resolve import `{}`: {message}", import.path),
                ));
                return;
            }
        };

        if in_progress.contains(&canonical) {
            let mut members: Vec<&str> = in_progress.iter().map(String::as_str).collect();
            members.sort_unstable();
            reporter.push(Diagnostic::error(
                ErrorKind::CyclicImport,
                file,
                import.line,
                1,
                format!("cyclic import detected: {}", members.join(" -> ")),
            ));
            return;
        }

        in_progress.insert(canonical.clone());
        let mut imported_globals = GlobalMap::new();
        self.compile_symbols(&source, &canonical, &mut imported_globals, reporter, in_progress);
        in_progress.remove(&canonical);

        let names: Option<Vec<String>> = match (import.category, &import.item_name) {
            (ImportCategory::File, _) => None,
            (_, Some(name)) => Some(vec![name.clone()]),
            (_, None) => None,
        };
        let alias = import.alias.clone();
        let rename = move |bare: &str| -> String { alias.clone().unwrap_or_else(|| bare.to_string()) };

        if let Err(diag) = globals.merge_from(
            &imported_globals,
            namespace,
            names.as_deref(),
            &import.except,
            rename,
            file,
            import.line,
        ) {
            reporter.push(diag);
        }

        if let Some(item_name) = &import.item_name {
            if !imported_globals.contains_bare_name(item_name) {
                reporter.push(Diagnostic::error(
                    ErrorKind::UnresolvedTemplate,
                    file,
                    import.line,
                    1,
                    format!("`{item_name}` not found in `{}`", import.path),
                ));
            }
        }
    }

    /// Runs the scanner (for slice-coverage/lexical validation), lexer and
    /// parser on `source`, recursing into its own imports, and writes the
    /// resulting symbols into `out`.
    fn compile_symbols(
        &self,
        source: &str,
        file: &str,
        out: &mut GlobalMap,
        reporter: &mut Reporter,
        in_progress: &mut HashSet<String>,
    ) {
        let _slices = Scanner::new(source, self.config).scan(reporter, file);
        let tokens = Lexer::new(source, self.config).tokenize(reporter, file);
        let (program, globals, parse_reporter) = Parser::new(tokens, source, self.config, file).parse();
        reporter.merge(parse_reporter);
        *out = globals;
        self.walk(&program.children, "", out, file, reporter, in_progress);
    }
}
