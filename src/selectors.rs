//! Shared selector-scanning helpers used by both the resolver (`&`
//! resolution) and the generator (selector automation), so the "first
//! class/id selector in a style block" scan lives in exactly one place
//! (spec §4.6 groups four copies of this rule into one).

use crate::ast::{AstNode, StyleNode};

fn bare_name(selector: &str) -> Option<String> {
    let trimmed = selector.trim();
    let rest = trimmed.strip_prefix('.').or_else(|| trimmed.strip_prefix('#'))?;
    let name: String = rest.chars().take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_').collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Returns `(first_class_selector_bare_name, first_id_selector_bare_name)`
/// found anywhere in `style`'s top-level rules, in source order.
pub fn first_class_and_id(style: &StyleNode) -> (Option<String>, Option<String>) {
    let mut class = None;
    let mut id = None;
    scan_rules(&style.rules, &mut class, &mut id);
    (class, id)
}

fn scan_rules(rules: &[AstNode], class: &mut Option<String>, id: &mut Option<String>) {
    for rule in rules {
        match rule {
            AstNode::StyleRule(r) => classify(&r.selector, class, id),
            AstNode::SelectorBlock(b) => {
                classify(&b.selector, class, id);
                scan_rules(&b.rules, class, id);
            }
            _ => {}
        }
        if class.is_some() && id.is_some() {
            return;
        }
    }
}

fn classify(selector: &str, class: &mut Option<String>, id: &mut Option<String>) {
    let trimmed = selector.trim();
    if trimmed.starts_with('.') && class.is_none() {
        *class = bare_name(trimmed);
    } else if trimmed.starts_with('#') && id.is_none() {
        *id = bare_name(trimmed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::StyleRuleNode;

    #[test]
    fn finds_first_class_selector() {
        let style = StyleNode {
            rules: vec![
                AstNode::StyleRule(StyleRuleNode {
                    selector: ".card".into(),
                    declarations: vec![],
                }),
                AstNode::StyleRule(StyleRuleNode {
                    selector: "#hero".into(),
                    declarations: vec![],
                }),
            ],
        };
        let (class, id) = first_class_and_id(&style);
        assert_eq!(class.as_deref(), Some("card"));
        assert_eq!(id.as_deref(), Some("hero"));
    }
}
