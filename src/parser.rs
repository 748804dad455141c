//! Recursive-descent parser with one-token lookahead (spec §4.3).
//!
//! Grounded on `examples/original_source/CHTL/include/CHTL/Parser/Parser.h`:
//! the method names below (`ParseElement`, `ParseStyleRule`, `Synchronize`,
//! …) mirror that header one-for-one, translated from a mutable
//! `std::shared_ptr<Base>` tree into the flat [`crate::ast::AstNode`] enum.

use crate::ast::*;
use crate::config::{CompileListener, Config};
use crate::diagnostics::{Diagnostic, ErrorKind, Reporter};
use crate::global_map::GlobalMap;
use crate::token::{Token, TokenType};

pub struct Parser<'a> {
    tokens: Vec<Token>,
    source: &'a str,
    config: &'a Config,
    file: String,
    pos: usize,
    namespace_stack: Vec<String>,
    globals: GlobalMap,
    reporter: Reporter,
    listeners: Vec<Box<dyn CompileListener>>,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, source: &'a str, config: &'a Config, file: impl Into<String>) -> Self {
        Self {
            tokens,
            source,
            config,
            file: file.into(),
            pos: 0,
            namespace_stack: Vec::new(),
            globals: GlobalMap::new(),
            reporter: Reporter::new(),
            listeners: Vec::new(),
        }
    }

    /// Registers a [`CompileListener`] invoked at each declaration
    /// boundary, mirroring the original implementation's
    /// `CompileTimeListener` hook (see `DESIGN.md`).
    pub fn with_listener(mut self, listener: Box<dyn CompileListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    fn notify_declaration(&mut self, kind: &str, name: &str, line: u32) {
        for listener in self.listeners.iter_mut() {
            listener.on_declaration(kind, name, line);
        }
    }

    #[tracing::instrument(skip_all, name = "parser.parse")]
    pub fn parse(mut self) -> (ProgramNode, GlobalMap, Reporter) {
        let mut use_html5 = false;
        let mut children = Vec::new();

        while !self.is_at_end() {
            if self.check(TokenType::Use) {
                self.advance();
                if self.check(TokenType::Html5) {
                    self.advance();
                    use_html5 = true;
                }
                self.consume_optional(TokenType::Semicolon);
                continue;
            }
            match self.parse_declaration() {
                Some(node) => children.push(node),
                None => {
                    if !self.is_at_end() {
                        self.synchronize();
                    }
                }
            }
        }

        (ProgramNode { use_html5, children }, self.globals, self.reporter)
    }

    // ---- token-stream utilities ----

    fn is_at_end(&self) -> bool {
        matches!(self.peek().ty, TokenType::EndOfFile)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let i = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[i]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, ty: TokenType) -> bool {
        self.peek().ty == ty
    }

    fn check_at(&self, offset: usize, ty: TokenType) -> bool {
        self.peek_at(offset).ty == ty
    }

    fn matches(&mut self, types: &[TokenType]) -> bool {
        if types.contains(&self.peek().ty) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, ty: TokenType, message: &str) -> Option<Token> {
        if self.check(ty) {
            Some(self.advance())
        } else {
            self.error(message);
            None
        }
    }

    fn consume_optional(&mut self, ty: TokenType) -> bool {
        if self.check(ty) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&mut self, message: &str) {
        let tok = self.peek().clone();
        self.reporter.push(Diagnostic::error(
            ErrorKind::SyntaxError,
            &self.file,
            tok.line,
            tok.column,
            format!("{message} (found `{}`)", tok.lexeme),
        ));
    }

    /// Consume tokens until the next `;` or a `}` at the current brace
    /// depth, so independent later errors still surface (spec §4.3).
    fn synchronize(&mut self) {
        let mut depth = 0i32;
        while !self.is_at_end() {
            match self.peek().ty {
                TokenType::Semicolon if depth == 0 => {
                    self.advance();
                    return;
                }
                TokenType::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenType::RBrace => {
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                    depth -= 1;
                    self.advance();
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn current_namespace(&self) -> String {
        self.namespace_stack.join(".")
    }

    // ---- top-level declarations ----

    fn parse_declaration(&mut self) -> Option<AstNode> {
        match self.peek().ty {
            TokenType::GeneratorComment => Some(self.parse_generator_comment()),
            TokenType::Import => self.parse_import_node(),
            TokenType::Namespace => self.parse_namespace_node(),
            TokenType::Configuration => self.parse_config_node(),
            TokenType::Template => self.parse_template_definition(false),
            TokenType::Custom => self.parse_template_definition(true),
            TokenType::Origin => self.parse_origin_node(),
            TokenType::Style => Some(AstNode::Style(self.parse_style_node())),
            TokenType::Script => Some(AstNode::Script(self.parse_script_node(true))),
            TokenType::TypeIdentifier => self.parse_template_usage(),
            TokenType::Identifier => {
                let tag = self.advance();
                if self.check(TokenType::LBrace) {
                    Some(self.parse_element(tag))
                } else {
                    self.error("expected `{` to start an element body");
                    None
                }
            }
            _ => {
                self.error("expected a declaration");
                None
            }
        }
    }

    fn parse_generator_comment(&mut self) -> AstNode {
        let tok = self.advance();
        AstNode::Comment(CommentNode {
            is_generator: true,
            content: tok.lexeme,
        })
    }

    // ---- elements ----

    fn parse_element(&mut self, tag: Token) -> AstNode {
        self.consume(TokenType::LBrace, "expected `{` after element tag");
        let mut attributes = Vec::new();
        let mut style = None;
        let mut script = None;
        let mut children = Vec::new();

        while !self.check(TokenType::RBrace) && !self.is_at_end() {
            if self.check(TokenType::Identifier) && self.check_at(1, TokenType::Colon) {
                attributes.push(self.parse_attribute());
                continue;
            }
            if self.check(TokenType::Text) {
                children.push(self.parse_text_node());
                continue;
            }
            if self.check(TokenType::Style) {
                style = Some(self.parse_style_node());
                continue;
            }
            if self.check(TokenType::Script) {
                script = Some(self.parse_script_node(false));
                continue;
            }
            if self.check(TokenType::GeneratorComment) {
                children.push(self.parse_generator_comment());
                continue;
            }
            if self.check(TokenType::TypeIdentifier) {
                if let Some(node) = self.parse_template_usage() {
                    children.push(node);
                }
                continue;
            }
            if self.check(TokenType::Insert) {
                if let Some(node) = self.parse_insert_node() {
                    children.push(node);
                }
                continue;
            }
            if self.check(TokenType::Delete) {
                children.push(AstNode::Delete(self.parse_delete_node()));
                continue;
            }
            if self.check(TokenType::Identifier) {
                let nested_tag = self.advance();
                if self.check(TokenType::LBrace) {
                    children.push(self.parse_element(nested_tag));
                    continue;
                }
                self.error("expected `{` to start a nested element body");
                continue;
            }
            self.error("unexpected token in element body");
            self.synchronize();
        }
        self.consume(TokenType::RBrace, "expected `}` to close element body");

        AstNode::Element(Box::new(ElementNode {
            tag: tag.lexeme,
            attributes,
            style,
            script,
            children,
            line: tag.line,
        }))
    }

    fn parse_attribute(&mut self) -> AttributeNode {
        let key = self.advance();
        self.consume(TokenType::Colon, "expected `:` after attribute key");
        let value = self.parse_value_expr();
        self.consume_optional(TokenType::Semicolon);
        AttributeNode {
            key: key.lexeme,
            value,
            line: key.line,
        }
    }

    /// A value in attribute/declaration position: quoted string, unquoted
    /// literal, or a `Group(Key)` variable-group usage rendered inline as
    /// its textual form (the resolver substitutes the real value later).
    fn parse_value_expr(&mut self) -> String {
        match self.peek().ty {
            TokenType::String | TokenType::LiteralString | TokenType::Identifier | TokenType::Number => {
                let tok = self.advance();
                if self.check(TokenType::LParen) {
                    // `Group(Key)` variable usage: keep the literal textual
                    // form; the resolver re-parses it via `VarUsageNode`
                    // substitution once it has the full declaration context.
                    self.advance();
                    let key = self.advance();
                    self.consume(TokenType::RParen, "expected `)` to close variable usage");
                    format!("{}({})", tok.lexeme, key.lexeme)
                } else {
                    tok.lexeme
                }
            }
            _ => {
                self.error("expected a value");
                String::new()
            }
        }
    }

    fn parse_text_node(&mut self) -> AstNode {
        self.advance(); // `text`
        self.consume(TokenType::LBrace, "expected `{` after `text`");
        let mut parts = Vec::new();
        while !self.check(TokenType::RBrace) && !self.is_at_end() {
            parts.push(self.advance().lexeme);
        }
        self.consume(TokenType::RBrace, "expected `}` to close text block");
        AstNode::Text(TextNode {
            value: parts.join(" "),
        })
    }

    // ---- style ----

    fn parse_style_node(&mut self) -> StyleNode {
        self.advance(); // `style`
        self.consume(TokenType::LBrace, "expected `{` after `style`");
        let mut rules = Vec::new();
        while !self.check(TokenType::RBrace) && !self.is_at_end() {
            if self.check(TokenType::TypeIdentifier) {
                if let Some(node) = self.parse_template_usage() {
                    rules.push(node);
                }
                continue;
            }
            if self.check(TokenType::Delete) {
                rules.push(AstNode::Delete(self.parse_delete_node()));
                continue;
            }
            if self.is_selector_head() {
                rules.push(self.parse_selector_or_style_rule());
                continue;
            }
            if self.check(TokenType::Identifier) && self.check_at(1, TokenType::Colon) {
                rules.push(self.parse_inline_declarations_as_rule());
                continue;
            }
            self.error("unexpected token in style block");
            self.synchronize();
        }
        self.consume(TokenType::RBrace, "expected `}` to close style block");
        StyleNode { rules }
    }

    fn is_selector_head(&self) -> bool {
        matches!(self.peek().ty, TokenType::Dot | TokenType::Hash | TokenType::Ampersand)
            || (self.check(TokenType::Identifier) && self.check_at(1, TokenType::LBrace))
    }

    /// Parses a `.card { … }` / `#id { … }` / `&:hover { … }` style rule, or
    /// (when the selector itself contains `&`) a nested [`SelectorBlockNode`].
    fn parse_selector_or_style_rule(&mut self) -> AstNode {
        let selector = self.parse_selector_text();
        self.consume(TokenType::LBrace, "expected `{` after selector");
        let has_nested_rule = self.check(TokenType::Identifier) && !self.check_at(1, TokenType::Colon);
        if has_nested_rule || self.peek_contains_selector_ahead() {
            let mut nested = Vec::new();
            while !self.check(TokenType::RBrace) && !self.is_at_end() {
                if self.is_selector_head() {
                    nested.push(self.parse_selector_or_style_rule());
                } else if self.check(TokenType::Identifier) && self.check_at(1, TokenType::Colon) {
                    nested.push(self.parse_inline_declarations_as_rule());
                } else {
                    self.error("unexpected token in nested selector block");
                    self.synchronize();
                }
            }
            self.consume(TokenType::RBrace, "expected `}` to close selector block");
            return AstNode::SelectorBlock(Box::new(SelectorBlockNode { selector, rules: nested }));
        }
        let declarations = self.parse_declaration_list();
        self.consume(TokenType::RBrace, "expected `}` to close style rule");
        AstNode::StyleRule(StyleRuleNode { selector, declarations })
    }

    fn peek_contains_selector_ahead(&self) -> bool {
        false
    }

    fn parse_selector_text(&mut self) -> String {
        let mut text = String::new();
        loop {
            match self.peek().ty {
                TokenType::Dot | TokenType::Hash | TokenType::Ampersand => {
                    text.push_str(&self.advance().lexeme);
                }
                TokenType::Identifier | TokenType::Colon => {
                    text.push_str(&self.advance().lexeme);
                }
                _ => break,
            }
        }
        text
    }

    fn parse_inline_declarations_as_rule(&mut self) -> AstNode {
        let declarations = self.parse_declaration_list();
        AstNode::InlineStyleRule(InlineStyleRuleNode { declarations })
    }

    fn parse_declaration_list(&mut self) -> Vec<Declaration> {
        let mut declarations = Vec::new();
        while self.check(TokenType::Identifier) && self.check_at(1, TokenType::Colon) {
            let property = self.advance().lexeme;
            self.advance(); // colon
            let value = self.parse_value_expr();
            self.consume_optional(TokenType::Semicolon);
            declarations.push(Declaration { property, value });
        }
        declarations
    }

    // ---- script ----

    fn parse_script_node(&mut self, is_global: bool) -> ScriptNode {
        let kw = self.advance(); // `script`
        self.consume(TokenType::LBrace, "expected `{` after `script`");
        let body_start = self.peek().start_byte;
        let line = self.peek().line;
        let mut depth = 1i32;
        while depth > 0 && !self.is_at_end() {
            match self.peek().ty {
                TokenType::LBrace => depth += 1,
                TokenType::RBrace => depth -= 1,
                _ => {}
            }
            if depth == 0 {
                break;
            }
            self.advance();
        }
        let body_end = self.peek().start_byte;
        let raw_body = self.source[body_start..body_end].trim_end().to_string();
        self.consume(TokenType::RBrace, "expected `}` to close script block");
        let _ = kw;
        ScriptNode { raw_body, is_global, line }
    }

    // ---- templates & customs ----

    fn parse_template_definition(&mut self, is_custom: bool) -> Option<AstNode> {
        let section_line = self.peek().line;
        self.advance(); // [Template] | [Custom]
        let type_tok = self.consume(TokenType::TypeIdentifier, "expected a type identifier (@Style/@Element/@Var)")?;
        let category = TemplateCategory::from_type_identifier(&type_tok.lexeme)?;
        let name_tok = self.consume(TokenType::Identifier, "expected a template name")?;
        self.consume(TokenType::LBrace, "expected `{` to start template body")?;

        let mut body = Vec::new();
        let mut var_bindings = Vec::new();
        let mut inherits = Vec::new();

        while !self.check(TokenType::RBrace) && !self.is_at_end() {
            if self.check(TokenType::Inherit) {
                inherits.push(self.parse_inherit_node());
                continue;
            }
            if self.check(TokenType::Delete) {
                body.push(AstNode::Delete(self.parse_delete_node()));
                continue;
            }
            if self.check(TokenType::Insert) {
                if let Some(node) = self.parse_insert_node() {
                    body.push(node);
                }
                continue;
            }
            if category == TemplateCategory::Var && self.check(TokenType::Identifier) && self.check_at(1, TokenType::Equal) {
                let key = self.advance().lexeme;
                self.advance(); // '='
                let value = self.parse_value_expr();
                self.consume_optional(TokenType::Semicolon);
                var_bindings.push((key, value));
                continue;
            }
            if self.check(TokenType::Identifier) && self.check_at(1, TokenType::Colon) {
                let property = self.advance().lexeme;
                self.advance();
                let value = self.parse_value_expr();
                self.consume_optional(TokenType::Semicolon);
                body.push(AstNode::InlineStyleRule(InlineStyleRuleNode {
                    declarations: vec![Declaration { property, value }],
                }));
                continue;
            }
            if category == TemplateCategory::Element && self.check(TokenType::Identifier) {
                let tag = self.advance();
                if self.check(TokenType::LBrace) {
                    body.push(self.parse_element(tag));
                    continue;
                }
                self.error("expected `{` to start nested element in @Element template");
                continue;
            }
            self.error("unexpected token in template body");
            self.synchronize();
        }
        self.consume(TokenType::RBrace, "expected `}` to close template body");

        let def = TemplateDefinitionNode {
            category,
            name: name_tok.lexeme,
            body,
            var_bindings,
            inherits,
            is_custom,
            line: section_line,
        };
        if let Err(diag) = self.globals.insert_template(&self.current_namespace(), def.clone(), &self.file) {
            self.reporter.push(diag);
        }
        self.notify_declaration(if is_custom { "custom" } else { "template" }, &def.name, def.line);
        Some(AstNode::TemplateDefinition(Box::new(def)))
    }

    fn parse_inherit_node(&mut self) -> InheritNode {
        let tok = self.advance(); // `inherit`
        // optional category prefix, e.g. `inherit @Style Base;`
        if self.check(TokenType::TypeIdentifier) {
            self.advance();
        }
        let name = self.consume(TokenType::Identifier, "expected an inherit target name");
        self.consume_optional(TokenType::Semicolon);
        InheritNode {
            name: name.map(|t| t.lexeme).unwrap_or_default(),
            line: tok.line,
        }
    }

    fn parse_delete_node(&mut self) -> DeleteNode {
        let tok = self.advance(); // `delete`
        let mut target = String::new();
        while !self.check(TokenType::Semicolon) && !self.check(TokenType::RBrace) && !self.is_at_end() {
            target.push_str(&self.advance().lexeme);
        }
        self.consume_optional(TokenType::Semicolon);
        DeleteNode { target, line: tok.line }
    }

    fn parse_insert_node(&mut self) -> Option<AstNode> {
        let tok = self.advance(); // `insert`
        let position = match self.peek().ty {
            TokenType::Before => {
                self.advance();
                InsertPosition::Before
            }
            TokenType::After => {
                self.advance();
                InsertPosition::After
            }
            TokenType::Replace => {
                self.advance();
                InsertPosition::Replace
            }
            TokenType::AtTop => {
                self.advance();
                InsertPosition::AtTop
            }
            TokenType::AtBottom => {
                self.advance();
                InsertPosition::AtBottom
            }
            _ => {
                self.error("expected before/after/replace/at top/at bottom after `insert`");
                return None;
            }
        };
        let mut target = String::new();
        while !self.check(TokenType::LBrace) && !self.is_at_end() {
            target.push_str(&self.advance().lexeme);
        }
        self.consume(TokenType::LBrace, "expected `{` to start insert payload")?;
        let mut payload = Vec::new();
        while !self.check(TokenType::RBrace) && !self.is_at_end() {
            if self.check(TokenType::Identifier) && self.check_at(1, TokenType::LBrace) {
                let tag = self.advance();
                payload.push(self.parse_element(tag));
            } else if self.check(TokenType::Identifier) && self.check_at(1, TokenType::Colon) {
                payload.push(AstNode::Attribute(self.parse_attribute()));
            } else {
                self.error("unexpected token in insert payload");
                self.synchronize();
            }
        }
        self.consume(TokenType::RBrace, "expected `}` to close insert payload");
        Some(AstNode::Insert(Box::new(InsertNode {
            position,
            target,
            payload,
            line: tok.line,
        })))
    }

    fn parse_template_usage(&mut self) -> Option<AstNode> {
        let type_tok = self.advance();
        let category = TemplateCategory::from_type_identifier(&type_tok.lexeme);
        let Some(category) = category else {
            // `@Html`/`@JavaScript`/custom origin type usage as an
            // OriginUsageNode, or a `@Var Group(Key)` value reference.
            return self.parse_non_template_type_identifier(type_tok);
        };
        let name_tok = self.consume(TokenType::Identifier, "expected a template/custom name")?;

        if self.check(TokenType::Semicolon) {
            self.advance();
            return Some(AstNode::TemplateUsage(Box::new(TemplateUsageNode {
                category,
                name: name_tok.lexeme,
                overrides: Vec::new(),
                line: type_tok.line,
            })));
        }

        if self.check(TokenType::LBrace) {
            self.advance();
            let mut overrides = Vec::new();
            while !self.check(TokenType::RBrace) && !self.is_at_end() {
                if self.check(TokenType::Delete) {
                    overrides.push(AstNode::Delete(self.parse_delete_node()));
                } else if self.check(TokenType::Insert) {
                    if let Some(node) = self.parse_insert_node() {
                        overrides.push(node);
                    }
                } else if self.check(TokenType::Identifier) && self.check_at(1, TokenType::Colon) {
                    overrides.push(AstNode::Attribute(self.parse_attribute()));
                } else {
                    self.error("unexpected token in template usage override block");
                    self.synchronize();
                }
            }
            self.consume(TokenType::RBrace, "expected `}` to close usage override block");
            return Some(AstNode::TemplateUsage(Box::new(TemplateUsageNode {
                category,
                name: name_tok.lexeme,
                overrides,
                line: type_tok.line,
            })));
        }

        self.consume_optional(TokenType::Semicolon);
        Some(AstNode::TemplateUsage(Box::new(TemplateUsageNode {
            category,
            name: name_tok.lexeme,
            overrides: Vec::new(),
            line: type_tok.line,
        })))
    }

    fn parse_non_template_type_identifier(&mut self, type_tok: Token) -> Option<AstNode> {
        if self.config.is_known_origin_type(&type_tok.lexeme) || type_tok.lexeme == "@Html" || type_tok.lexeme == "@JavaScript" {
            let name = if self.check(TokenType::Identifier) {
                Some(self.advance().lexeme)
            } else {
                None
            };
            self.consume_optional(TokenType::Semicolon);
            return name.map(|name| {
                AstNode::OriginUsage(OriginUsageNode {
                    origin_type: type_tok.lexeme.clone(),
                    name,
                })
            });
        }
        self.error(&format!("unrecognized type identifier `{}`", type_tok.lexeme));
        None
    }

    // ---- origin ----

    fn parse_origin_node(&mut self) -> Option<AstNode> {
        self.advance(); // [Origin]
        let type_tok = self.consume(TokenType::TypeIdentifier, "expected an origin type (@Html/@Style/@JavaScript/…)")?;
        let name = if self.check(TokenType::Identifier) {
            Some(self.advance().lexeme)
        } else {
            None
        };
        self.consume(TokenType::LBrace, "expected `{` to start origin body")?;
        let body_start = self.peek().start_byte;
        let mut depth = 1i32;
        while depth > 0 && !self.is_at_end() {
            match self.peek().ty {
                TokenType::LBrace => depth += 1,
                TokenType::RBrace => depth -= 1,
                _ => {}
            }
            if depth == 0 {
                break;
            }
            self.advance();
        }
        let body_end = self.peek().start_byte;
        let body = self.source[body_start..body_end].trim().to_string();
        self.consume(TokenType::RBrace, "expected `}` to close origin body");

        let node = OriginNode {
            origin_type: type_tok.lexeme,
            name,
            body,
        };
        if let Err(diag) = self.globals.insert_origin(&self.current_namespace(), node.clone(), &self.file, type_tok.line) {
            self.reporter.push(diag);
        }
        self.notify_declaration("origin", node.name.as_deref().unwrap_or(""), type_tok.line);
        Some(AstNode::Origin(node))
    }

    // ---- import ----

    fn parse_import_node(&mut self) -> Option<AstNode> {
        let tok = self.advance(); // [Import]
        let (category, specific_type, item_name) = if self.check(TokenType::Template) || self.check(TokenType::Custom) {
            let cat = if self.check(TokenType::Template) {
                ImportCategory::Template
            } else {
                ImportCategory::Custom
            };
            self.advance();
            let specific_type = if self.check(TokenType::TypeIdentifier) {
                Some(self.advance().lexeme)
            } else {
                None
            };
            let item_name = if self.check(TokenType::Identifier) {
                Some(self.advance().lexeme)
            } else {
                None
            };
            (cat, specific_type, item_name)
        } else if self.check(TokenType::Origin) {
            self.advance();
            let specific_type = if self.check(TokenType::TypeIdentifier) {
                Some(self.advance().lexeme)
            } else {
                None
            };
            let item_name = if self.check(TokenType::Identifier) {
                Some(self.advance().lexeme)
            } else {
                None
            };
            (ImportCategory::Origin, specific_type, item_name)
        } else if self.check(TokenType::TypeIdentifier) && self.peek().lexeme == "@Chtl" {
            self.advance();
            (ImportCategory::File, None, None)
        } else {
            self.error("expected [Template]/[Custom]/[Origin] or @Chtl after [Import]");
            (ImportCategory::File, None, None)
        };

        self.consume(TokenType::From, "expected `from` in import statement")?;
        let path_tok = self.consume(TokenType::String, "expected a quoted path after `from`")?;

        let alias = if self.check(TokenType::As) {
            self.advance();
            Some(self.consume(TokenType::Identifier, "expected an alias name after `as`")?.lexeme)
        } else {
            None
        };

        let mut except = Vec::new();
        if self.check(TokenType::Except) {
            self.advance();
            loop {
                if let Some(name) = self.consume(TokenType::Identifier, "expected a name after `except`") {
                    except.push(name.lexeme);
                }
                if self.check(TokenType::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.consume_optional(TokenType::Semicolon);

        Some(AstNode::Import(ImportNode {
            category,
            specific_type,
            item_name,
            alias,
            path: path_tok.lexeme,
            except,
            line: tok.line,
        }))
    }

    // ---- namespace ----

    fn parse_namespace_node(&mut self) -> Option<AstNode> {
        self.advance(); // [Namespace]
        let name_tok = self.consume(TokenType::Identifier, "expected a namespace name")?;
        self.consume(TokenType::LBrace, "expected `{` to start namespace body")?;
        self.notify_declaration("namespace", &name_tok.lexeme, name_tok.line);
        self.namespace_stack.push(name_tok.lexeme.clone());
        let mut children = Vec::new();
        while !self.check(TokenType::RBrace) && !self.is_at_end() {
            match self.parse_declaration() {
                Some(node) => children.push(node),
                None => {
                    if !self.is_at_end() {
                        self.synchronize();
                    }
                }
            }
        }
        self.namespace_stack.pop();
        self.consume(TokenType::RBrace, "expected `}` to close namespace body");
        Some(AstNode::Namespace(Box::new(NamespaceNode {
            name: name_tok.lexeme,
            children,
        })))
    }

    // ---- configuration ----

    fn parse_config_node(&mut self) -> Option<AstNode> {
        self.advance(); // [Configuration]
        let name = if self.check(TokenType::LBracket) {
            // `[Configuration] [MyName] { ... }` named variant.
            self.advance();
            let n = self.consume(TokenType::Identifier, "expected a configuration name")?.lexeme;
            self.consume(TokenType::RBracket, "expected `]`")?;
            Some(n)
        } else {
            None
        };
        self.consume(TokenType::LBrace, "expected `{` to start configuration body")?;

        let mut node = ConfigNode::default();
        let mut config = self.config.clone();

        while !self.check(TokenType::RBrace) && !self.is_at_end() {
            if self.check(TokenType::Name) {
                self.advance();
                self.consume(TokenType::LBrace, "expected `{` after [Name]")?;
                while self.check(TokenType::Identifier) && self.check_at(1, TokenType::Equal) {
                    let key = self.advance().lexeme;
                    self.advance();
                    let value = self.parse_value_expr();
                    self.consume_optional(TokenType::Semicolon);
                    config.keyword_renames.insert(key.clone(), value.clone());
                    node.name_block.push((key, value));
                }
                self.consume(TokenType::RBrace, "expected `}` to close [Name] block");
                continue;
            }
            if self.check(TokenType::OriginType) {
                self.advance();
                self.consume(TokenType::LBrace, "expected `{` after [OriginType]")?;
                while self.check(TokenType::TypeIdentifier) {
                    let tag = self.advance().lexeme;
                    self.consume_optional(TokenType::Semicolon);
                    config.custom_origin_types.push(tag.clone());
                    node.origin_type_block.push(tag);
                }
                self.consume(TokenType::RBrace, "expected `}` to close [OriginType] block");
                continue;
            }
            if self.check(TokenType::Identifier) && self.check_at(1, TokenType::Equal) {
                let key = self.advance().lexeme;
                self.advance();
                let value = self.parse_value_expr();
                self.consume_optional(TokenType::Semicolon);
                if !config.apply_setting(&key, &value) {
                    let tok = self.previous().clone();
                    self.reporter.push(Diagnostic::error(
                        ErrorKind::ConfigValueInvalid,
                        &self.file,
                        tok.line,
                        tok.column,
                        format!("unknown configuration key `{key}`"),
                    ));
                }
                node.settings.push((key, value));
                continue;
            }
            self.error("unexpected token in [Configuration] body");
            self.synchronize();
        }
        self.consume(TokenType::RBrace, "expected `}` to close configuration body");

        self.globals.insert_configuration(name.as_deref().unwrap_or("default"), config);
        Some(AstNode::Config(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse(src: &str) -> (ProgramNode, GlobalMap, Reporter) {
        let config = Config::default();
        let mut lex_reporter = Reporter::new();
        let tokens = Lexer::new(src, &config).tokenize(&mut lex_reporter, "t.chtl");
        Parser::new(tokens, src, &config, "t.chtl").parse()
    }

    #[test]
    fn parses_hello_element() {
        let (program, _, reporter) = parse("div { text { Hello } }");
        assert!(!reporter.has_errors());
        assert_eq!(program.children.len(), 1);
        match &program.children[0] {
            AstNode::Element(e) => assert_eq!(e.tag, "div"),
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn parses_local_style_with_class_selector() {
        let (program, _, reporter) = parse("div { style { .card { color: red; } } text { hi } }");
        assert!(!reporter.has_errors());
        let AstNode::Element(e) = &program.children[0] else { panic!() };
        let style = e.style.as_ref().unwrap();
        assert_eq!(style.rules.len(), 1);
        assert!(matches!(style.rules[0], AstNode::StyleRule(_)));
    }

    #[test]
    fn parses_template_definition_and_usage() {
        let (program, globals, reporter) = parse(
            "[Template] @Style Btn { color: blue; } div { style { @Style Btn; } }",
        );
        assert!(!reporter.has_errors());
        assert_eq!(globals.template_count(), 1);
        assert_eq!(program.children.len(), 2);
    }

    #[test]
    fn parses_inherit_and_delete() {
        let (_, globals, reporter) = parse(
            "[Template] @Style A { color: red; background: white; } \
             [Template] @Style B { inherit A; delete background; }",
        );
        assert!(!reporter.has_errors());
        let b = globals.lookup_template("", crate::ast::TemplateCategory::Style, "B").unwrap();
        assert_eq!(b.inherits.len(), 1);
        assert_eq!(b.inherits[0].name, "A");
    }

    #[test]
    fn parses_namespace_scoped_templates() {
        let (_, globals, reporter) = parse("[Namespace] ui { [Template] @Style Btn { color: red; } }");
        assert!(!reporter.has_errors());
        assert!(globals.lookup_template("ui", crate::ast::TemplateCategory::Style, "Btn").is_some());
    }

    #[test]
    fn script_body_is_captured_verbatim() {
        let (program, _, reporter) = parse("div { script { let a = 1;\n  let b = 2; } }");
        assert!(!reporter.has_errors());
        let AstNode::Element(e) = &program.children[0] else { panic!() };
        let script = e.script.as_ref().unwrap();
        assert!(script.raw_body.contains("let a = 1;"));
        assert!(script.raw_body.contains("let b = 2;"));
    }

    #[test]
    fn unknown_bracketed_config_key_is_reported() {
        let (_, _, reporter) = parse("[Configuration] { NOT_REAL = true; }");
        assert!(reporter.has_errors());
    }

    #[test]
    fn named_configuration_block_is_stored_under_its_name() {
        let (_, globals, reporter) = parse("[Configuration] [MyName] { DISABLE_STYLE_AUTO_ADD_CLASS = true; }");
        assert!(!reporter.has_errors());
        let named = globals.lookup_configuration("MyName").expect("named config stored");
        assert!(named.disable_style_auto_add_class);
        assert!(globals.lookup_configuration("default").is_none());
    }
}
