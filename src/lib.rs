//! # chtl
//!
//! A compiler for CHTL, a superset markup language that compiles to plain
//! HTML, CSS and JavaScript, plus its embedded CHTL-JS scripting dialect.
//!
//! ## Pipeline
//!
//! 1. [`scanner`] splits raw source into CHTL / CHTL-JS / CSS / JS slices.
//! 2. [`lexer`] tokenizes the CHTL slices.
//! 3. [`parser`] builds the [`ast`] and a [`global_map::GlobalMap`] of
//!    every template, custom and origin declaration.
//! 4. [`import_resolver`] pulls in symbols from `[Import]` statements.
//! 5. [`resolver`] expands template/custom usages (with inheritance,
//!    `delete` and `insert` overrides) into plain element trees.
//! 6. [`generator`] walks the resolved tree and emits HTML, CSS and JS.
//! 7. [`chtljs`] lowers the CHTL-JS dialect embedded in `script {}` bodies.
//! 8. [`dispatcher`] assembles the stages above into one `compile()` call.
//!
//! [`diagnostics`] carries the accumulating-reporter error model used by
//! every stage, [`config`] carries the crate-wide compile options, and
//! [`watchdog`] enforces the optional wall-clock timeout around a
//! compilation.

pub mod ast;
pub mod chtljs;
pub mod config;
pub mod diagnostics;
pub mod dispatcher;
pub mod generator;
pub mod global_map;
pub mod import_resolver;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod selectors;
pub mod token;
pub mod validators;
pub mod watchdog;

pub use config::Config;
pub use diagnostics::{Diagnostic, ErrorKind, Reporter, Severity};
pub use dispatcher::{compile, CompilerDispatcher, IntermediateCompilationResult};
