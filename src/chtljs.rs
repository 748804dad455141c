//! Lowers CHTL-JS constructs (enhanced selectors, `listen`, `animate`,
//! `vir`, state-overloaded markers) to plain JavaScript (spec §4.7).
//!
//! Grounded on `examples/original_source/UnifiedScanner/...` for the slice
//! shapes this consumes, and on the recovered `iNeverAway` builtin
//! mentioned in `original_source/CHTL/JS/JSCompiler.h`'s comment block.

use std::collections::HashMap;

use crate::scanner::{CodeSlice, Scanner, SliceType};

/// Lowered output of one `script {}` body, split the way the dispatcher's
/// `IntermediateCompilationResult` keeps plain-JS and CHTL-JS-generated
/// code in separate buffers.
pub struct LoweredScript {
    pub plain_js: String,
    pub chtljs_generated: String,
}

pub fn lower_script(raw_body: &str, base_line: u32) -> LoweredScript {
    let slices = Scanner::secondary_slice_script(raw_body, 0, base_line);
    let mut plain_js = String::new();
    let mut chtljs_generated = String::new();
    let mut states: HashMap<String, Vec<(String, String)>> = HashMap::new();

    for slice in &slices {
        match slice.ty {
            SliceType::Js => plain_js.push_str(&slice.content),
            SliceType::ChtlJs => lower_one(slice, &mut chtljs_generated, &mut states),
            _ => {}
        }
    }

    for (name, variants) in states {
        chtljs_generated.push_str(&emit_state_dispatcher(&name, &variants));
    }

    LoweredScript { plain_js, chtljs_generated }
}

fn lower_one(slice: &CodeSlice, out: &mut String, states: &mut HashMap<String, Vec<(String, String)>>) {
    let content = slice.content.trim();
    if let Some(rest) = content.strip_prefix("{{") {
        lower_selector_chain(rest, out);
        return;
    }
    if let Some(rest) = content.strip_prefix("listen") {
        out.push_str("CHTLJS_LISTEN");
        out.push_str(&wrap_call_args(rest));
        return;
    }
    if let Some(rest) = content.strip_prefix("animate") {
        out.push_str("CHTLJS_ANIMATE");
        out.push_str(&wrap_call_args(rest));
        return;
    }
    if let Some(rest) = content.strip_prefix("iNeverAway") {
        out.push_str("CHTLJS_NEVER_AWAY");
        out.push_str(&wrap_call_args(rest));
        return;
    }
    if let Some(rest) = content.strip_prefix("vir") {
        out.push_str(&lower_vir(rest.trim_start()));
        return;
    }
    if let Some((name, state, body)) = parse_state_marker(content) {
        states.entry(name).or_default().push((state, body));
        return;
    }
    out.push_str(content);
}

/// Lowers `{{sel}}` plus whatever the scanner chained onto it (spec §4.7),
/// e.g. `{{.x}}.listen({ click: fn })` → one connected expression instead
/// of leaving the selector and its call as two unrelated fragments.
fn lower_selector_chain(after_open: &str, out: &mut String) {
    let close = after_open.find("}}").unwrap_or(after_open.len());
    out.push_str(&lower_selector(after_open[..close].trim()));
    let rest = after_open[(close + 2).min(after_open.len())..].trim_start();
    out.push_str(&rewrite_chain(rest));
}

/// Rewrites a `.name(...)`/`.name{...}` chain tail: renames `listen` /
/// `animate` / `iNeverAway` segments to their runtime call names (matching
/// the standalone forms below) and turns a brace-only argument into a
/// parenthesized call so the result is valid JS.
fn rewrite_chain(rest: &str) -> String {
    let bytes = rest.as_bytes();
    let mut out = String::new();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] != b'.' {
            out.push(bytes[i] as char);
            i += 1;
            continue;
        }
        let mut k = i + 1;
        while k < bytes.len() && ((bytes[k] as char).is_alphanumeric() || bytes[k] == b'_') {
            k += 1;
        }
        let name = &rest[i + 1..k];
        let mapped = builtin_call_name(name).unwrap_or(name);
        let mut j = k;
        while j < bytes.len() && (bytes[j] as char).is_whitespace() {
            j += 1;
        }
        if j < bytes.len() && bytes[j] == b'{' {
            if let Some(close) = crate::scanner::find_matching(bytes, j, b'}') {
                out.push('.');
                out.push_str(mapped);
                out.push('(');
                out.push_str(rest[j..=close].trim());
                out.push(')');
                i = close + 1;
                continue;
            }
        } else if j < bytes.len() && bytes[j] == b'(' {
            if let Some(close) = crate::scanner::find_matching(bytes, j, b')') {
                out.push('.');
                out.push_str(mapped);
                out.push_str(&rest[j..=close]);
                i = close + 1;
                continue;
            }
        }
        out.push('.');
        out.push_str(name);
        i = k;
    }
    out
}

fn builtin_call_name(name: &str) -> Option<&'static str> {
    match name {
        "listen" => Some("CHTLJS_LISTEN"),
        "animate" => Some("CHTLJS_ANIMATE"),
        "iNeverAway" => Some("CHTLJS_NEVER_AWAY"),
        _ => None,
    }
}

/// Turns a bare keyword's trailing argument text into a proper call:
/// `({ ... })` stays as-is, `{ ... }` (brace-call form, no parens) gets
/// wrapped so `listen { click: fn }` lowers to a call, not a dangling block.
fn wrap_call_args(rest: &str) -> String {
    let trimmed = rest.trim();
    if trimmed.starts_with('{') {
        format!("({trimmed})")
    } else {
        trimmed.to_string()
    }
}

/// `{{sel1 sel2}}` → `CHTLJS_SELECT("sel1").querySelector("sel2")...`
/// (spec §4.7: "nested selectors split on whitespace become chained
/// querySelector-equivalent calls").
fn lower_selector(inner: &str) -> String {
    let mut parts = inner.split_whitespace();
    let Some(first) = parts.next() else {
        return "CHTLJS_SELECT(\"\")".to_string();
    };
    let mut out = format!("CHTLJS_SELECT(\"{}\")", escape_js_string(first));
    for part in parts {
        out.push_str(&format!(".querySelector(\"{}\")", escape_js_string(part)));
    }
    out
}

/// `vir name { body }` → `const name = { body };` (compile-time inlining of
/// later references is not implemented; callers use `name` as a plain
/// object).
fn lower_vir(rest: &str) -> String {
    let name_end = rest.find(|c: char| c.is_whitespace() || c == '{').unwrap_or(rest.len());
    let name = &rest[..name_end];
    let body = rest[name_end..].trim();
    let body = body.strip_prefix('{').and_then(|b| b.strip_suffix('}')).unwrap_or(body).trim();
    format!("const {name} = {{ {body} }};")
}

/// Detects `Name<State> { body }` and returns `(name, state, body)`.
fn parse_state_marker(content: &str) -> Option<(String, String, String)> {
    let lt = content.find('<')?;
    let gt = content[lt..].find('>')? + lt;
    let name = content[..lt].trim().to_string();
    let state = content[lt + 1..gt].trim().to_string();
    if name.is_empty() || state.is_empty() {
        return None;
    }
    let rest = content[gt + 1..].trim();
    let body = rest.strip_prefix('{').and_then(|b| b.strip_suffix('}'))?.trim().to_string();
    Some((name, state, body))
}

/// Merges every `Name<State> { ... }` occurrence into one exported
/// function plus a generated state setter (spec §4.7 last bullet).
fn emit_state_dispatcher(name: &str, variants: &[(String, String)]) -> String {
    let mut out = String::new();
    out.push_str(&format!("let __chtljs_state_{name} = \"{}\";\n", variants[0].0));
    out.push_str(&format!("function {name}(...args) {{\n"));
    for (i, (state, body)) in variants.iter().enumerate() {
        let keyword = if i == 0 { "if" } else { "else if" };
        out.push_str(&format!("  {keyword} (__chtljs_state_{name} === \"{state}\") {{ {body} }}\n"));
    }
    out.push_str("}\n");
    out.push_str(&format!("function set{name}State(state) {{ __chtljs_state_{name} = state; }}\n"));
    out
}

fn escape_js_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_call_is_lowered() {
        let out = lower_script("{{.x}}.listen({ click: fn });", 1);
        assert!(out.chtljs_generated.contains("CHTLJS_SELECT(\".x\").CHTLJS_LISTEN({ click: fn })"));
        assert!(!out.plain_js.contains('.'));
    }

    #[test]
    fn brace_call_form_gains_parens() {
        let out = lower_script("listen { click: fn };", 1);
        assert!(out.chtljs_generated.contains("CHTLJS_LISTEN({ click: fn })"));
    }

    #[test]
    fn plain_js_is_preserved_verbatim() {
        let out = lower_script("let a = 1;", 1);
        assert_eq!(out.plain_js, "let a = 1;");
        assert!(out.chtljs_generated.is_empty());
    }

    #[test]
    fn state_markers_merge_into_one_dispatcher() {
        let out = lower_script("Btn<On> { console.log('on'); } Btn<Off> { console.log('off'); }", 1);
        assert_eq!(out.chtljs_generated.matches("function Btn").count(), 1);
        assert!(out.chtljs_generated.contains("__chtljs_state_Btn"));
    }

    #[test]
    fn chained_selector_produces_queryselector_calls() {
        let lowered = lower_selector(".parent .child");
        assert_eq!(lowered, "CHTLJS_SELECT(\".parent\").querySelector(\".child\")");
    }
}
