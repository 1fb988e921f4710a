//! Module analysis
//!
//! Recovers the static import/export statements of an ES module with line-anchored
//! regexes. Recognized statements are cut out of the body (replaced by as many newlines
//! as they spanned) so body lines keep their original line numbers.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::scan::{declarator_names, is_member, tokenize, Kind, Token};
use crate::error::MergeError;

/// `import <clause> from '<specifier>'`
static IMPORT_FROM_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\b\s*([^'";(]*?)\s*from\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

/// `import '<specifier>'`
static IMPORT_BARE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*import\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

/// `export * from '<specifier>'` and `export * as ns from '<specifier>'`
static EXPORT_STAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*export\s*\*\s*(?:as\s+([\w$]+)\s*)?from\s*["']([^"']+)["'][ \t]*;?"#)
        .unwrap()
});

/// `export { a, b as c }` with an optional `from '<specifier>'`
static EXPORT_LIST_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*export\s*\{([^}]*)\}(?:\s*from\s*["']([^"']+)["'])?[ \t]*;?"#)
        .unwrap()
});

/// `export default function f`, `export default class C`
static EXPORT_DEFAULT_DECL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*(export\s+default\s+)(?:async\s+)?(?:function\s*\*?\s*|class\s+)([\w$]+)"#)
        .unwrap()
});

static EXPORT_DEFAULT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^[ \t]*(export\s+default\s+)"#).unwrap());

/// `export const x`, `export function f`, `export class C`, ...
static EXPORT_DECL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?m)^[ \t]*(export\s+)((?:const|let|var)\s+|(?:async\s+)?function\s*\*?\s*|class\s+)([\w$]+)"#,
    )
    .unwrap()
});

/// Anything import/export-like left after rewriting
static LEFTOVER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*(?:export\b|import\b\s*[\w${*"'])"#).unwrap()
});

static NAMESPACE_CLAUSE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\*\s*as\s+([\w$]+)$"#).unwrap());

/// Linker runtime names: the helpers plus `__m<n>`, `__x<n>` and `__e<n>`
static RESERVED_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(?:__ns|__interopDefault|__[mxe][0-9]+)$"#).unwrap());

/// Local binding that `export default <expression>` is assigned to
pub const DEFAULT_BINDING: &str = "__default_export";

/// What an import binding refers to in its source module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Imported {
    Named(String),
    Namespace,
}

/// `import { imported as local } from 'source'`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub local: String,
    pub source: String,
    pub imported: Imported,
}

/// Where an exported name gets its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportSource {
    /// A binding declared in the module itself
    Local(String),
    /// `export { imported as exported } from 'specifier'`
    Reexport { specifier: String, imported: String },
    /// `export * as exported from 'specifier'`
    Namespace { specifier: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBinding {
    pub exported: String,
    pub source: ExportSource,
}

/// Static structure of one ES module
#[derive(Debug, Clone, Default)]
pub struct ModuleAnalysis {
    /// Code with import/export statements removed, line numbers preserved
    pub body: String,
    /// Every specifier the module depends on, in textual order, deduplicated
    pub requests: Vec<String>,
    pub imports: Vec<ImportBinding>,
    pub exports: Vec<ExportBinding>,
    /// Specifiers of `export * from`
    pub star_exports: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum Statement {
    Import,
    BareImport,
    ExportStar,
    ExportList,
    DefaultDeclaration,
    DefaultExpression,
    Declaration,
}

/// Patterns in precedence order: on equal starts the earlier one wins
static STATEMENTS: Lazy<[(&'static Regex, Statement); 7]> = Lazy::new(|| {
    [
        (&*IMPORT_FROM_REGEX, Statement::Import),
        (&*IMPORT_BARE_REGEX, Statement::BareImport),
        (&*EXPORT_STAR_REGEX, Statement::ExportStar),
        (&*EXPORT_LIST_REGEX, Statement::ExportList),
        (&*EXPORT_DEFAULT_DECL_REGEX, Statement::DefaultDeclaration),
        (&*EXPORT_DEFAULT_REGEX, Statement::DefaultExpression),
        (&*EXPORT_DECL_REGEX, Statement::Declaration),
    ]
});

impl ModuleAnalysis {
    /// Analyse `code`; `id` only labels errors
    pub fn parse(id: &str, code: &str) -> Result<Self, MergeError> {
        let syntax = |message: String| MergeError::Syntax {
            id: id.to_string(),
            message,
        };
        let mut statements: Vec<(Range<usize>, Statement, Captures)> = Vec::new();
        for &(regex, kind) in STATEMENTS.iter() {
            for captures in regex.captures_iter(code) {
                let range = captures.get(0).map(|m| m.range()).unwrap_or_default();
                statements.push((range, kind, captures));
            }
        }
        statements.sort_by_key(|(range, _, _)| range.start);

        let mut analysis = ModuleAnalysis::default();
        let mut body = String::with_capacity(code.len());
        let mut cursor = 0;
        let mut tokens: Option<Vec<Token>> = None;

        for (range, statement, captures) in statements {
            if range.start < cursor {
                continue;
            }
            body.push_str(&code[cursor..range.start]);
            let text = &code[range.clone()];
            let blank = "\n".repeat(text.matches('\n').count());

            match statement {
                Statement::Import => {
                    let specifier = captures[2].to_string();
                    let bindings = parse_import_clause(&captures[1]).map_err(syntax)?;
                    for (local, imported) in bindings {
                        analysis.imports.push(ImportBinding {
                            local,
                            source: specifier.clone(),
                            imported,
                        });
                    }
                    analysis.request(specifier);
                    body.push_str(&blank);
                }
                Statement::BareImport => {
                    analysis.request(captures[1].to_string());
                    body.push_str(&blank);
                }
                Statement::ExportStar => {
                    let specifier = captures[2].to_string();
                    match captures.get(1) {
                        Some(name) => analysis.exports.push(ExportBinding {
                            exported: name.as_str().to_string(),
                            source: ExportSource::Namespace {
                                specifier: specifier.clone(),
                            },
                        }),
                        None => analysis.star_exports.push(specifier.clone()),
                    }
                    analysis.request(specifier);
                    body.push_str(&blank);
                }
                Statement::ExportList => {
                    let specifier = captures.get(2).map(|m| m.as_str().to_string());
                    for (name, exported) in parse_specifier_list(&captures[1]) {
                        let source = match &specifier {
                            Some(specifier) => ExportSource::Reexport {
                                specifier: specifier.clone(),
                                imported: name,
                            },
                            None => ExportSource::Local(name),
                        };
                        analysis.exports.push(ExportBinding { exported, source });
                    }
                    if let Some(specifier) = specifier {
                        analysis.request(specifier);
                    }
                    body.push_str(&blank);
                }
                Statement::DefaultDeclaration => {
                    analysis.exports.push(ExportBinding {
                        exported: "default".to_string(),
                        source: ExportSource::Local(captures[2].to_string()),
                    });
                    body.push_str(&blank_keyword(text, &captures, range.start));
                }
                Statement::DefaultExpression => {
                    analysis.exports.push(ExportBinding {
                        exported: "default".to_string(),
                        source: ExportSource::Local(DEFAULT_BINDING.to_string()),
                    });
                    let keyword = captures.get(1).map(|m| m.start()).unwrap_or(range.start);
                    body.push_str(&code[range.start..keyword]);
                    body.push_str(&format!("var {} = ", DEFAULT_BINDING));
                }
                Statement::Declaration => {
                    let names = if matches!(captures[2].trim_end(), "const" | "let" | "var") {
                        if tokens.is_none() {
                            tokens = Some(tokenize(code).map_err(syntax)?);
                        }
                        let tokens = tokens.as_deref().unwrap_or_default();
                        let start = captures.get(3).map(|m| m.start()).unwrap_or(range.end);
                        declarator_names(code, tokens, start).map_err(syntax)?
                    } else {
                        vec![captures[3].to_string()]
                    };
                    for name in names {
                        analysis.exports.push(ExportBinding {
                            exported: name.clone(),
                            source: ExportSource::Local(name),
                        });
                    }
                    body.push_str(&blank_keyword(text, &captures, range.start));
                }
            }
            cursor = range.end;
        }
        body.push_str(&code[cursor..]);

        if let Some(leftover) = LEFTOVER_REGEX.find(&body) {
            let line = body[..leftover.start()].matches('\n').count() + 1;
            return Err(syntax(format!(
                "unsupported import/export statement on line {}: `{}`",
                line,
                body[leftover.start()..].lines().next().unwrap_or_default().trim()
            )));
        }

        let mut locals = analysis.imports.iter().map(|binding| binding.local.as_str());
        if let Some(name) = locals.find(|local| RESERVED_REGEX.is_match(local)) {
            return Err(syntax(format!("`{}` is reserved by the linker runtime", name)));
        }
        let tokens = tokenize(&body).map_err(syntax)?;
        for (index, token) in tokens.iter().enumerate() {
            let name = token.text(&body);
            if token.kind == Kind::Ident
                && RESERVED_REGEX.is_match(name)
                && !is_member(&body, &tokens, index)
            {
                return Err(syntax(format!("`{}` is reserved by the linker runtime", name)));
            }
        }

        analysis.body = body;
        Ok(analysis)
    }

    /// Names this module exports itself, excluding `export *`
    pub fn exported_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.exports.iter().map(|binding| binding.exported.as_str())
    }

    fn request(&mut self, specifier: String) {
        if !self.requests.contains(&specifier) {
            self.requests.push(specifier);
        }
    }
}

/// The statement text with its `export` keyword (group 1) blanked out, keeping columns
fn blank_keyword(text: &str, captures: &Captures, offset: usize) -> String {
    match captures.get(1) {
        Some(keyword) => {
            let start = keyword.start() - offset;
            let end = keyword.end() - offset;
            format!("{}{}{}", &text[..start], " ".repeat(end - start), &text[end..])
        }
        None => text.to_string(),
    }
}

/// Parse `a, b as c` into `(name, alias)` pairs
fn parse_specifier_list(list: &str) -> Vec<(String, String)> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            let mut parts = item.split_whitespace();
            let name = parts.next().unwrap_or_default().to_string();
            match (parts.next(), parts.next()) {
                (Some("as"), Some(alias)) => (name, alias.to_string()),
                _ => (name.clone(), name),
            }
        })
        .collect()
}

/// Parse the clause between `import` and `from`
fn parse_import_clause(clause: &str) -> Result<Vec<(String, Imported)>, String> {
    let clause = clause.trim();
    let mut bindings = Vec::new();

    let rest = if clause.starts_with('{') || clause.starts_with('*') {
        clause
    } else {
        let (default, rest) = clause.split_once(',').unwrap_or((clause, ""));
        let default = default.trim();
        if default.is_empty() || !default.chars().all(crate::utils::is_identifier_char) {
            return Err(format!("unsupported import clause `{}`", clause));
        }
        bindings.push((default.to_string(), Imported::Named("default".to_string())));
        rest.trim()
    };

    if let Some(list) = rest.strip_prefix('{') {
        let list = list
            .strip_suffix('}')
            .ok_or_else(|| format!("unterminated import clause `{}`", clause))?;
        for (imported, local) in parse_specifier_list(list) {
            bindings.push((local, Imported::Named(imported)));
        }
    } else if let Some(captures) = NAMESPACE_CLAUSE_REGEX.captures(rest) {
        bindings.push((captures[1].to_string(), Imported::Namespace));
    } else if !rest.is_empty() {
        return Err(format!("unsupported import clause `{}`", clause));
    }

    Ok(bindings)
}
