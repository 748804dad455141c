//! Process-local symbol table for templates, customs, origins and
//! configurations (spec §3 "GlobalMap").
//!
//! Grounded on `examples/original_source/CHTL/include/CHTL/Resolver/Resolver.h`
//! and `Parser.h`'s `GlobalMap`/`NamespaceStack` fields: symbols are keyed
//! by fully-qualified dotted name and referenced by name, never by pointer
//! (Design Note 9), which rules out reference cycles in the data structure
//! itself.

use std::collections::HashMap;

use crate::ast::{OriginNode, TemplateCategory, TemplateDefinitionNode};
use crate::diagnostics::{Diagnostic, ErrorKind};

/// Joins a namespace path and a bare name into the map's storage key.
pub fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

/// `@Style Foo` and `@Element Foo` in the same namespace are distinct
/// symbols, so category participates in the storage key.
fn template_key(namespace: &str, category: TemplateCategory, name: &str) -> String {
    qualify(namespace, &format!("{category}#{name}"))
}

fn origin_key(namespace: &str, origin_type: &str, name: &str) -> String {
    qualify(namespace, &format!("{origin_type}#{name}"))
}

#[derive(Debug, Default)]
pub struct GlobalMap {
    templates: HashMap<String, TemplateDefinitionNode>,
    customs: HashMap<String, TemplateDefinitionNode>,
    origins: HashMap<String, OriginNode>,
    configurations: HashMap<String, crate::config::Config>,
}

impl GlobalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_template(&mut self, namespace: &str, def: TemplateDefinitionNode, file: &str) -> Result<(), Diagnostic> {
        let key = template_key(namespace, def.category, &def.name);
        let table = if def.is_custom { &mut self.customs } else { &mut self.templates };
        if table.contains_key(&key) {
            return Err(Diagnostic::error(
                ErrorKind::DuplicateSymbol,
                file,
                def.line,
                1,
                format!("duplicate {} definition `{}` in namespace `{}`", def.category, def.name, namespace),
            ));
        }
        table.insert(key, def);
        Ok(())
    }

    pub fn insert_origin(&mut self, namespace: &str, origin: OriginNode, file: &str, line: u32) -> Result<(), Diagnostic> {
        let Some(name) = origin.name.clone() else {
            // Anonymous origins are never looked up by name; store under a
            // synthetic unique key so they still round-trip through merges.
            let key = format!("{}#anon{}", qualify(namespace, &origin.origin_type), self.origins.len());
            self.origins.insert(key, origin);
            return Ok(());
        };
        let key = origin_key(namespace, &origin.origin_type, &name);
        if self.origins.contains_key(&key) {
            return Err(Diagnostic::error(
                ErrorKind::DuplicateSymbol,
                file,
                line,
                1,
                format!("duplicate origin definition `{name}` in namespace `{namespace}`"),
            ));
        }
        self.origins.insert(key, origin);
        Ok(())
    }

    pub fn insert_configuration(&mut self, name: &str, config: crate::config::Config) {
        self.configurations.insert(name.to_string(), config);
    }

    /// Look up a template/custom of the given category, falling back from
    /// `namespace` through its ancestors to the default (empty) namespace.
    pub fn lookup_template(&self, namespace: &str, category: TemplateCategory, name: &str) -> Option<&TemplateDefinitionNode> {
        for ns in namespace_fallback_chain(namespace) {
            let key = template_key(&ns, category, name);
            if let Some(def) = self.templates.get(&key).or_else(|| self.customs.get(&key)) {
                return Some(def);
            }
        }
        None
    }

    pub fn lookup_origin(&self, namespace: &str, origin_type: &str, name: &str) -> Option<&OriginNode> {
        for ns in namespace_fallback_chain(namespace) {
            let key = origin_key(&ns, origin_type, name);
            if let Some(o) = self.origins.get(&key) {
                return Some(o);
            }
        }
        None
    }

    pub fn lookup_configuration(&self, name: &str) -> Option<&crate::config::Config> {
        self.configurations.get(name)
    }

    /// Merge `other` into `self` under an import's alias rules. `rename`
    /// maps an imported bare name to the importer-visible name (identity if
    /// no `as` alias). Name collision within the same namespace is fatal
    /// (spec §4.4 "Merging policy"); cross-namespace duplicates are fine.
    pub fn merge_from(
        &mut self,
        other: &GlobalMap,
        namespace: &str,
        names: Option<&[String]>,
        except: &[String],
        rename: impl Fn(&str) -> String,
        file: &str,
        line: u32,
    ) -> Result<(), Diagnostic> {
        let should_take = |bare: &str| -> bool {
            if except.iter().any(|e| e == bare) {
                return false;
            }
            match names {
                Some(allow) => allow.iter().any(|n| n == bare),
                None => true,
            }
        };

        for def in other.templates.values().chain(other.customs.values()) {
            if !should_take(&def.name) {
                continue;
            }
            let mut def = def.clone();
            def.name = rename(&def.name);
            self.insert_template(namespace, def, file)?;
        }
        for origin in other.origins.values() {
            let Some(bare) = &origin.name else { continue };
            if !should_take(bare) {
                continue;
            }
            let mut origin = origin.clone();
            origin.name = Some(rename(bare));
            self.insert_origin(namespace, origin, file, line)?;
        }
        Ok(())
    }

    pub fn template_count(&self) -> usize {
        self.templates.len() + self.customs.len()
    }

    /// True if any template, custom, or origin (in any category/namespace)
    /// has this bare name. Used by the import resolver to report an
    /// unresolved specific-item import without needing to know the
    /// category up front.
    pub fn contains_bare_name(&self, name: &str) -> bool {
        self.templates.values().any(|d| d.name == name)
            || self.customs.values().any(|d| d.name == name)
            || self.origins.values().any(|o| o.name.as_deref() == Some(name))
    }
}

/// `current`, then each ancestor namespace, then the default namespace.
fn namespace_fallback_chain(namespace: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = namespace.to_string();
    loop {
        chain.push(current.clone());
        match current.rsplit_once('.') {
            Some((parent, _)) => current = parent.to_string(),
            None => break,
        }
    }
    if namespace.is_empty() {
        chain
    } else {
        chain.push(String::new());
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::TemplateCategory;

    fn template(name: &str) -> TemplateDefinitionNode {
        TemplateDefinitionNode {
            category: TemplateCategory::Style,
            name: name.to_string(),
            body: vec![],
            var_bindings: vec![],
            inherits: vec![],
            is_custom: false,
            line: 1,
        }
    }

    #[test]
    fn duplicate_in_same_namespace_is_fatal() {
        let mut map = GlobalMap::new();
        map.insert_template("", template("Btn"), "a.chtl").unwrap();
        let err = map.insert_template("", template("Btn"), "a.chtl").unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateSymbol);
    }

    #[test]
    fn different_categories_do_not_collide() {
        let mut map = GlobalMap::new();
        map.insert_template("", template("Btn"), "a.chtl").unwrap();
        let mut element = template("Btn");
        element.category = TemplateCategory::Element;
        map.insert_template("", element, "a.chtl").unwrap();
        assert!(map.lookup_template("", TemplateCategory::Style, "Btn").is_some());
        assert!(map.lookup_template("", TemplateCategory::Element, "Btn").is_some());
    }

    #[test]
    fn cross_namespace_duplicate_is_allowed() {
        let mut map = GlobalMap::new();
        map.insert_template("ns1", template("Btn"), "a.chtl").unwrap();
        map.insert_template("ns2", template("Btn"), "a.chtl").unwrap();
        assert!(map.lookup_template("ns1", TemplateCategory::Style, "Btn").is_some());
        assert!(map.lookup_template("ns2", TemplateCategory::Style, "Btn").is_some());
    }

    #[test]
    fn lookup_falls_back_to_default_namespace() {
        let mut map = GlobalMap::new();
        map.insert_template("", template("Btn"), "a.chtl").unwrap();
        assert!(map.lookup_template("some.nested", TemplateCategory::Style, "Btn").is_some());
    }
}
