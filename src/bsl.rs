//! Module source scanner: finds procedure and function declarations in BSL
//! source text.
//!
//! This is a line scanner, not a full parser. A declaration line starts with
//! a `Процедура`/`Функция` keyword (Russian or English spelling), carries a
//! name and a parenthesized parameter list, and may end with the export
//! keyword. Compiler directives (`&НаСервере` and friends) sit on the lines
//! immediately above; the contiguous run of directive lines belongs to the
//! declaration and a blank or non-directive line terminates the lookback.
//!
//! Keyword matching is case-insensitive. Lowercasing is byte-length-stable
//! for the character set involved (ASCII, Cyrillic incl. Ёё), so byte
//! offsets into the lowercased line are valid in the original.

use crate::models::{ExecutionContext, ExtensionCallType, ProcKind, ProcedureDecl};

const PROC_KEYWORDS: [(&str, ProcKind); 4] = [
    ("процедура", ProcKind::Procedure),
    ("procedure", ProcKind::Procedure),
    ("функция", ProcKind::Function),
    ("function", ProcKind::Function),
];

/// Scans a module's source text for top-level declarations, in source order.
pub fn scan_module(text: &str) -> Vec<ProcedureDecl> {
    let lines: Vec<&str> = text.lines().collect();
    let mut decls = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(mut decl) = parse_declaration(lines[i]) else {
            i += 1;
            continue;
        };

        // Lookback: contiguous directive lines above, nearest first. The
        // first directive of each family wins.
        let mut start = i + 1;
        let mut j = i;
        while j > 0 {
            let Some(directive) = parse_directive(lines[j - 1]) else {
                break;
            };
            if decl.execution_context.is_none() {
                decl.execution_context = context_for(&directive);
            }
            if decl.extension_call_type.is_none() {
                decl.extension_call_type = extension_call_for(&directive);
            }
            j -= 1;
            start = j + 1;
        }
        decl.start_line = start as i64;

        // Forward scan for the matching end keyword.
        let mut k = i + 1;
        while k < lines.len() && !is_end_keyword(lines[k], decl.kind) {
            k += 1;
        }
        if k < lines.len() {
            decl.end_line = Some((k + 1) as i64);
            i = k + 1;
        } else {
            decl.end_line = None;
            i = lines.len();
        }

        decls.push(decl);
    }

    decls
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || c == '_'
        || ('А'..='я').contains(&c)
        || c == 'Ё'
        || c == 'ё'
}

/// Parses one line as a declaration. `start_line`/`end_line` are placeholders
/// for the caller to fill in.
fn parse_declaration(line: &str) -> Option<ProcedureDecl> {
    let trimmed = line.trim();
    let lower = trimmed.to_lowercase();

    let (keyword, kind) = PROC_KEYWORDS
        .iter()
        .find(|(kw, _)| lower.starts_with(kw))
        .copied()?;
    let rest = trimmed[keyword.len()..].trim_start();
    if rest.len() == trimmed.len() - keyword.len() {
        // No whitespace after the keyword: an identifier that merely starts
        // with it, e.g. `ПроцедураОбработки = ...`.
        return None;
    }

    let name_end = rest.find(|c| !is_ident_char(c)).unwrap_or(rest.len());
    let name = &rest[..name_end];
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }

    let after_name = rest[name_end..].trim_start();
    if !after_name.starts_with('(') {
        return None;
    }
    let (params, tail) = match after_name.rfind(')') {
        Some(rparen) => (&after_name[1..rparen], &after_name[rparen + 1..]),
        None => (&after_name[1..], ""),
    };

    let tail = tail.split("//").next().unwrap_or("").trim().to_lowercase();
    let is_export = tail.starts_with("экспорт") || tail.starts_with("export");

    Some(ProcedureDecl {
        name: name.to_string(),
        kind,
        params: params.trim().to_string(),
        is_export,
        start_line: 0,
        end_line: None,
        execution_context: None,
        extension_call_type: None,
    })
}

/// Parses a directive line: `&Name` or `&Name("arg")`, nothing else on the
/// line besides an optional trailing comment. Returns the lowercased name.
fn parse_directive(line: &str) -> Option<String> {
    let trimmed = line.trim();
    let rest = trimmed.strip_prefix('&')?;
    let name_end = rest.find(|c| !is_ident_char(c)).unwrap_or(rest.len());
    if name_end == 0 {
        return None;
    }
    let tail = rest[name_end..].trim_start();
    if !(tail.is_empty() || tail.starts_with('(') || tail.starts_with("//")) {
        return None;
    }
    Some(rest[..name_end].to_lowercase())
}

fn context_for(directive: &str) -> Option<ExecutionContext> {
    match directive {
        "наклиенте" | "atclient" => Some(ExecutionContext::Client),
        "насервере" | "atserver" => Some(ExecutionContext::Server),
        "насерверебезконтекста" | "atservernocontext" => Some(ExecutionContext::Server),
        "наклиентенасерверебезконтекста" | "atclientatservernocontext" => {
            Some(ExecutionContext::ClientOrServer)
        }
        _ => None,
    }
}

fn extension_call_for(directive: &str) -> Option<ExtensionCallType> {
    match directive {
        "перед" | "before" => Some(ExtensionCallType::Before),
        "после" | "after" => Some(ExtensionCallType::After),
        "вместо" | "around" | "instead" => Some(ExtensionCallType::Instead),
        "изменениеиконтроль" | "changeandcontrol" => {
            Some(ExtensionCallType::ChangeAndControl)
        }
        _ => None,
    }
}

fn is_end_keyword(line: &str, kind: ProcKind) -> bool {
    let lower = line.trim().to_lowercase();
    let keywords: [&str; 2] = match kind {
        ProcKind::Procedure => ["конецпроцедуры", "endprocedure"],
        ProcKind::Function => ["конецфункции", "endfunction"],
    };
    keywords.iter().any(|kw| {
        lower.starts_with(kw) && lower[kw.len()..].chars().next().map_or(true, |c| !is_ident_char(c))
    })
}
