//! Lightweight symbol extraction (SPEC_FULL.md §3 Symbol, §4.2), reusing the
//! same definition-header pattern the chunker uses to find chunk boundaries,
//! but classifying and recording the individual match rather than a body.

use crate::types::{FileType, Symbol, SymbolKind};
use regex::Regex;
use std::sync::OnceLock;

pub fn extract_symbols(file_type: FileType, content: &str) -> Vec<Symbol> {
    match file_type {
        FileType::Python => extract_with(content, python_regex(), |caps| {
            if caps.name("class").is_some() {
                SymbolKind::Class
            } else {
                SymbolKind::Function
            }
        }),
        FileType::Rust => extract_with(content, rust_regex(), |caps| {
            if caps.name("class").is_some() {
                SymbolKind::Class
            } else {
                SymbolKind::Function
            }
        }),
        FileType::JavaScript | FileType::TypeScript => extract_with(content, js_regex(), |caps| {
            if caps.name("class").is_some() {
                SymbolKind::Class
            } else {
                SymbolKind::Function
            }
        }),
        FileType::Go => extract_with(content, go_regex(), |caps| {
            if caps.name("class").is_some() {
                SymbolKind::Class
            } else {
                SymbolKind::Function
            }
        }),
        _ => Vec::new(),
    }
}

fn extract_with(content: &str, re: &Regex, kind_of: impl Fn(&regex::Captures) -> SymbolKind) -> Vec<Symbol> {
    let mut out = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if let Some(caps) = re.captures(line) {
            let name = caps
                .name("name")
                .or_else(|| caps.name("cname"))
                .map(|m| m.as_str().to_string());
            if let Some(name) = name {
                out.push(Symbol { file_id: 0, name, kind: kind_of(&caps), line_number: idx + 1 });
            }
        }
    }
    out
}

fn python_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:async\s+)?def\s+(?P<name>\w+)|^\s*(?P<class>class)\s+(?P<cname>\w+)").unwrap())
}

fn rust_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:pub\s+)?(?:async\s+)?fn\s+(?P<name>\w+)|^\s*(?:pub\s+)?(?P<class>struct|enum|trait)\s+(?P<cname>\w+)").unwrap()
    })
}

fn js_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:export\s+)?(?:async\s+)?function\s+(?P<name>\w+)|^\s*(?:export\s+)?(?P<class>class)\s+(?P<cname>\w+)").unwrap()
    })
}

fn go_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*func\s+(?:\([^)]*\)\s*)?(?P<name>\w+)|^\s*type\s+(?P<cname>\w+)\s+(?P<class>struct|interface)").unwrap())
}
