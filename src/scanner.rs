//! Unified scanner: partitions raw source into typed [`CodeSlice`]s.
//!
//! Grounded on
//! `examples/original_source/UnifiedScanner/include/UnifiedScanner/CHTLUnifiedScanner.h`:
//! the `ScanState` enum, `AddSlice`, and the CHTL/CHTL-JS pattern
//! predicates below mirror that header's shape. The scanner's slices feed
//! two consumers: (1) the CSS/JS buffers get raw global `style{}`/`script{}`
//! bodies and CHTL-JS sub-slices routed straight through, and (2) the
//! lexer/parser still tokenizes the *entire* source directly (local
//! style/script bodies share CHTL's selector/declaration grammar, so they
//! are not opaque to the parser the way a global block is) — see
//! `DESIGN.md` for the reconciliation of this with spec §4.1/§4.2.

use crate::config::Config;
use crate::diagnostics::{Diagnostic, ErrorKind, Reporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceType {
    Chtl,
    ChtlJs,
    Css,
    Js,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSlice {
    pub content: String,
    pub ty: SliceType,
    pub start: usize,
    pub end: usize,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Chtl,
    LocalStyle,
    LocalScript,
    GlobalStyle,
    GlobalScript,
}

pub struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    config: &'a Config,
    pos: usize,
    line: u32,
    chtl_depth: i32,
    slices: Vec<CodeSlice>,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str, config: &'a Config) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            config,
            pos: 0,
            line: 1,
            chtl_depth: 0,
            slices: Vec::new(),
        }
    }

    /// Run the scanner to completion, returning slices covering the whole
    /// input with no gaps or overlaps (spec §8 "Slice coverage").
    #[tracing::instrument(skip_all, name = "scanner.scan")]
    pub fn scan(mut self, reporter: &mut Reporter, file: &str) -> Vec<CodeSlice> {
        let mut chtl_start = 0usize;
        let mut chtl_start_line = self.line;

        while self.pos < self.bytes.len() {
            if let Some((keyword_end, is_style, block_open)) = self.peek_style_or_script_keyword() {
                let is_top_level = self.chtl_depth == 0;
                // Keep the keyword and opening brace in the CHTL slice.
                self.pos = block_open + 1;
                self.flush_chtl(chtl_start, self.pos, chtl_start_line);

                let body_start_line = self.line_at(self.pos);
                let body_start = self.pos;
                match self.scan_balanced_block(reporter, file) {
                    Ok(body_end) => {
                        let body = &self.source[body_start..body_end];
                        if is_style {
                            self.slices.push(CodeSlice {
                                content: body.to_string(),
                                ty: SliceType::Css,
                                start: body_start,
                                end: body_end,
                                line: body_start_line,
                            });
                        } else {
                            self.slices.extend(Self::secondary_slice_script(
                                body,
                                body_start,
                                body_start_line,
                            ));
                        }
                        let _ = is_top_level; // local/global only affects generator routing, not slice typing
                        self.pos = body_end;
                        chtl_start = self.pos;
                        chtl_start_line = self.line_at(self.pos);
                    }
                    Err(diag) => {
                        reporter.push(diag);
                        self.pos = self.bytes.len();
                        chtl_start = self.pos;
                    }
                }
                let _ = keyword_end;
                continue;
            }

            match self.bytes[self.pos] {
                b'{' => {
                    self.chtl_depth += 1;
                    self.pos += 1;
                }
                b'}' => {
                    self.chtl_depth -= 1;
                    self.pos += 1;
                }
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                b'"' | b'\'' => {
                    if let Err(diag) = self.skip_string(file) {
                        reporter.push(diag);
                        self.pos = self.bytes.len();
                        break;
                    }
                }
                _ => self.pos += 1,
            }
        }

        self.flush_chtl(chtl_start, self.pos, chtl_start_line);
        self.slices
    }

    fn flush_chtl(&mut self, start: usize, end: usize, line: u32) {
        if end > start {
            self.slices.push(CodeSlice {
                content: self.source[start..end].to_string(),
                ty: SliceType::Chtl,
                start,
                end,
                line,
            });
        }
    }

    fn line_at(&self, byte_pos: usize) -> u32 {
        1 + self.source[..byte_pos.min(self.source.len())]
            .bytes()
            .filter(|&b| b == b'\n')
            .count() as u32
    }

    /// If the cursor is at a `style {` / `script {` keyword (honoring
    /// `[Name]` renames), return (keyword end, is_style, position of `{`).
    fn peek_style_or_script_keyword(&self) -> Option<(usize, bool, usize)> {
        let rest = &self.source[self.pos..];
        if !is_word_boundary(self.source, self.pos) {
            return None;
        }
        let style_kw = self.config.keyword("style");
        let script_kw = self.config.keyword("script");
        for (kw, is_style) in [(style_kw, true), (script_kw, false)] {
            if let Some(tail) = rest.strip_prefix(kw) {
                if tail.chars().next().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                    continue;
                }
                let after_kw = self.pos + kw.len();
                let mut i = after_kw;
                let b = self.source.as_bytes();
                while i < b.len() && (b[i] as char).is_whitespace() {
                    i += 1;
                }
                if i < b.len() && b[i] == b'{' {
                    return Some((after_kw, is_style, i));
                }
            }
        }
        None
    }

    /// String/comment-aware scan to the matching `}` for a block whose `{`
    /// was already consumed. Returns the byte offset of that `}`.
    fn scan_balanced_block(&mut self, _reporter: &mut Reporter, file: &str) -> Result<usize, Diagnostic> {
        let mut depth = 1i32;
        let start_line = self.line;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'{' => {
                    depth += 1;
                    self.pos += 1;
                }
                b'}' => {
                    depth -= 1;
                    let here = self.pos;
                    self.pos += 1;
                    if depth == 0 {
                        return Ok(here);
                    }
                }
                b'"' | b'\'' | b'`' => self.skip_string(file)?,
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    self.pos += 2;
                    while self.pos < self.bytes.len()
                        && !(self.bytes[self.pos] == b'*' && self.bytes.get(self.pos + 1) == Some(&b'/'))
                    {
                        if self.bytes[self.pos] == b'\n' {
                            self.line += 1;
                        }
                        self.pos += 1;
                    }
                    self.pos = (self.pos + 2).min(self.bytes.len());
                }
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
        Err(Diagnostic::error(
            ErrorKind::LexicalError,
            file,
            start_line,
            1,
            "unbalanced braces: unterminated style/script block",
        ))
    }

    fn skip_string(&mut self, file: &str) -> Result<(), Diagnostic> {
        let quote = self.bytes[self.pos];
        let start_line = self.line;
        self.pos += 1;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b == b'\\' {
                self.pos += 2;
                continue;
            }
            if b == b'\n' {
                self.line += 1;
            }
            if b == quote {
                self.pos += 1;
                return Ok(());
            }
            self.pos += 1;
        }
        Err(Diagnostic::error(
            ErrorKind::LexicalError,
            file,
            start_line,
            1,
            "unterminated string literal",
        ))
    }

    /// Splits a script block's body into interleaved `CHTL_JS`/`JS` slices
    /// (spec §4.1 "secondary slicing"). Exposed so [`crate::chtljs`] can
    /// reuse it directly on a parsed `ScriptNode`'s raw body.
    pub(crate) fn secondary_slice_script(body: &str, base_offset: usize, base_line: u32) -> Vec<CodeSlice> {
        let mut out = Vec::new();
        let bytes = body.as_bytes();
        let mut i = 0usize;
        let mut plain_start = 0usize;

        let flush_plain = |out: &mut Vec<CodeSlice>, s: usize, e: usize| {
            if e > s {
                out.push(CodeSlice {
                    content: body[s..e].to_string(),
                    ty: SliceType::Js,
                    start: base_offset + s,
                    end: base_offset + e,
                    line: base_line + body[..s].matches('\n').count() as u32,
                });
            }
        };

        while i < bytes.len() {
            if bytes[i] == b'{' && bytes.get(i + 1) == Some(&b'{') {
                flush_plain(&mut out, plain_start, i);
                let start = i;
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'}' && bytes.get(i + 1) == Some(&b'}')) {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
                // `{{sel}}.listen(...)` chains a call directly onto the
                // selector with no separator; keep it in the same slice so
                // lowering doesn't strand the connecting `.` in plain JS.
                i = extend_through_chain(bytes, i);
                out.push(CodeSlice {
                    content: body[start..i].to_string(),
                    ty: SliceType::ChtlJs,
                    start: base_offset + start,
                    end: base_offset + i,
                    line: base_line + body[..start].matches('\n').count() as u32,
                });
                plain_start = i;
                continue;
            }

            if is_word_boundary(body, i) {
                if let Some(kw_len) = chtl_js_keyword_at(&body[i..]) {
                    let after = i + kw_len;
                    let mut j = after;
                    while j < bytes.len() && (bytes[j] as char).is_whitespace() {
                        j += 1;
                    }
                    // state marker: `Name<State> {` is handled by the general
                    // identifier scan below via `<` after an identifier; the
                    // keyword table only covers listen/animate/vir/iNeverAway.
                    if j < bytes.len() && (bytes[j] == b'{' || bytes[j] == b'(') {
                        flush_plain(&mut out, plain_start, i);
                        let start = i;
                        let close = matching_delim(bytes, j);
                        let end = find_matching(bytes, j, close).map(|e| e + 1).unwrap_or(bytes.len());
                        out.push(CodeSlice {
                            content: body[start..end].to_string(),
                            ty: SliceType::ChtlJs,
                            start: base_offset + start,
                            end: base_offset + end,
                            line: base_line + body[..start].matches('\n').count() as u32,
                        });
                        i = end;
                        plain_start = i;
                        continue;
                    }
                }
                if let Some(end) = state_marker_at(body, i) {
                    flush_plain(&mut out, plain_start, i);
                    out.push(CodeSlice {
                        content: body[i..end].to_string(),
                        ty: SliceType::ChtlJs,
                        start: base_offset + i,
                        end: base_offset + end,
                        line: base_line + body[..i].matches('\n').count() as u32,
                    });
                    i = end;
                    plain_start = i;
                    continue;
                }
            }

            i += 1;
        }
        flush_plain(&mut out, plain_start, bytes.len());
        out
    }
}

fn matching_delim(bytes: &[u8], open_pos: usize) -> u8 {
    if bytes[open_pos] == b'{' {
        b'}'
    } else {
        b')'
    }
}

/// Scan forward from `open_pos` (pointing at an opening delimiter) to the
/// matching closing delimiter, string/comment-naive (good enough for the
/// CHTL-JS constructs, which do not nest raw braces inside string bodies
/// in ways that defeat a depth counter). Shared with [`crate::chtljs`],
/// which reuses it to find the closing delimiter of a chained call.
pub(crate) fn find_matching(bytes: &[u8], open_pos: usize, close: u8) -> Option<usize> {
    let open = bytes[open_pos];
    let mut depth = 0i32;
    let mut i = open_pos;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' || b == b'\'' || b == b'`' {
            let q = b;
            i += 1;
            while i < bytes.len() && bytes[i] != q {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
        } else if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Extends `i` (just past a `{{…}}` selector) through any immediately
/// chained `.name(...)`/`.name{...}` call segments, so `{{.x}}.listen(...)`
/// stays one slice instead of stranding the connecting `.` as plain JS.
fn extend_through_chain(bytes: &[u8], mut i: usize) -> usize {
    loop {
        let mut j = i;
        while j < bytes.len() && (bytes[j] as char).is_whitespace() {
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b'.' {
            return i;
        }
        let mut k = j + 1;
        while k < bytes.len() && ((bytes[k] as char).is_alphanumeric() || bytes[k] == b'_') {
            k += 1;
        }
        if k == j + 1 {
            return i;
        }
        let mut m = k;
        while m < bytes.len() && (bytes[m] as char).is_whitespace() {
            m += 1;
        }
        if m >= bytes.len() || (bytes[m] != b'(' && bytes[m] != b'{') {
            return i;
        }
        let close = matching_delim(bytes, m);
        match find_matching(bytes, m, close) {
            Some(end) => i = end + 1,
            None => return i,
        }
    }
}

fn chtl_js_keyword_at(s: &str) -> Option<usize> {
    for kw in ["listen", "animate", "vir", "iNeverAway"] {
        if let Some(tail) = s.strip_prefix(kw) {
            if !tail.chars().next().is_some_and(|c| c.is_alphanumeric() || c == '_') {
                return Some(kw.len());
            }
        }
    }
    None
}

/// Detects a `Name<State> {` state-overload marker head and returns the
/// byte offset just past its matching `}`, or `None` if this position is
/// not such a marker.
fn state_marker_at(body: &str, i: usize) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut j = i;
    while j < bytes.len() && ((bytes[j] as char).is_alphanumeric() || bytes[j] == b'_') {
        j += 1;
    }
    if j == i || j >= bytes.len() || bytes[j] != b'<' {
        return None;
    }
    let mut k = j + 1;
    while k < bytes.len() && bytes[k] != b'>' {
        if !((bytes[k] as char).is_alphanumeric() || bytes[k] == b'_') {
            return None;
        }
        k += 1;
    }
    if k >= bytes.len() {
        return None;
    }
    k += 1; // past '>'
    while k < bytes.len() && (bytes[k] as char).is_whitespace() {
        k += 1;
    }
    if k >= bytes.len() || bytes[k] != b'{' {
        return None;
    }
    find_matching(bytes, k, b'}').map(|e| e + 1)
}

fn is_word_boundary(s: &str, pos: usize) -> bool {
    if pos == 0 {
        return true;
    }
    match s.as_bytes().get(pos - 1) {
        Some(b) => !((*b as char).is_alphanumeric() || *b == b'_'),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(src: &str) -> (Vec<CodeSlice>, Reporter) {
        let config = Config::default();
        let mut reporter = Reporter::new();
        let slices = Scanner::new(src, &config).scan(&mut reporter, "test.chtl");
        (slices, reporter)
    }

    #[test]
    fn slice_coverage_is_gapless() {
        let src = "div { style { .card { color: red; } } text { hi } }";
        let (slices, reporter) = scan(src);
        assert!(!reporter.has_errors());
        let mut rebuilt = String::new();
        for slice in &slices {
            rebuilt.push_str(&src[slice.start..slice.end]);
        }
        assert_eq!(rebuilt, src);
    }

    #[test]
    fn local_style_block_is_css_slice() {
        let src = "div { style { color: red; } }";
        let (slices, _) = scan(src);
        assert!(slices.iter().any(|s| s.ty == SliceType::Css));
    }

    #[test]
    fn script_block_splits_chtljs_from_js() {
        let src = "div { script { {{.x}}.listen({ click: fn }); let a = 1; } }";
        let (slices, _) = scan(src);
        assert!(slices.iter().any(|s| s.ty == SliceType::ChtlJs));
        assert!(slices.iter().any(|s| s.ty == SliceType::Js));
    }

    #[test]
    fn selector_and_chained_call_stay_one_slice() {
        let src = "div { script { {{.x}}.listen({ click: fn }); } }";
        let (slices, _) = scan(src);
        let chtljs: Vec<_> = slices.iter().filter(|s| s.ty == SliceType::ChtlJs).collect();
        assert_eq!(chtljs.len(), 1);
        assert_eq!(chtljs[0].content, "{{.x}}.listen({ click: fn })");
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let src = "div { style { content: \"unterminated } }";
        let (_, reporter) = scan(src);
        assert!(reporter.has_errors());
    }
}
