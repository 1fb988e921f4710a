//! Facade module synthesis
//!
//! The facade is the single input of a global-mode merge. It pulls every chunk
//! allocated to the entry in as a whole-module namespace and re-exports the entry chunk
//! itself, so one bundle holds them all.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::bundler::ChunkId;

/// Module id of the synthetic facade; the NUL prefix keeps it apart from real paths
pub const FACADE_ID: &str = "\0facade.js";

/// Assign `$0`, `$1`, ... to `chunks`, skipping tokens listed in `reserved`
pub fn assign_namespaces<'a>(
    chunks: impl IntoIterator<Item = &'a ChunkId>,
    reserved: &[String],
) -> IndexMap<ChunkId, String> {
    let reserved: HashSet<&str> = reserved.iter().map(String::as_str).collect();
    let mut tokens = (0..).map(|n| format!("${}", n)).filter(|token| !reserved.contains(token.as_str()));

    chunks
        .into_iter()
        .zip(&mut tokens)
        .map(|(chunk, token)| (chunk.clone(), token))
        .collect()
}

/// Source of the facade module for `entry`
pub fn facade_code(entry: &ChunkId, namespaces: &IndexMap<ChunkId, String>) -> String {
    let mut code = String::new();

    for (chunk, namespace) in namespaces {
        code.push_str(&format!("import * as {} from {};\n", namespace, literal(chunk)));
    }
    code.push_str(&format!("export * from {};\n", literal(entry)));
    if !namespaces.is_empty() {
        let names: Vec<&str> = namespaces.values().map(String::as_str).collect();
        code.push_str(&format!("export {{ {} }};\n", names.join(", ")));
    }

    code
}

/// A chunk id as a JavaScript string literal
fn literal(id: &ChunkId) -> String {
    serde_json::Value::from(id.as_str()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(names: &[&str]) -> Vec<ChunkId> {
        names.iter().map(|name| ChunkId::new(*name)).collect()
    }

    #[test]
    fn test_namespaces_are_sequential() {
        let chunks = ids(&["ab.js", "ac.js"]);
        let namespaces = assign_namespaces(&chunks, &["a".to_string()]);

        let tokens: Vec<&str> = namespaces.values().map(String::as_str).collect();
        assert_eq!(tokens, vec!["$0", "$1"]);
    }

    #[test]
    fn test_namespaces_skip_entry_exports() {
        let chunks = ids(&["chunk-1.js", "chunk-2.js"]);
        let namespaces =
            assign_namespaces(&chunks, &["$0".to_string(), "$2".to_string(), "a".to_string()]);

        assert_eq!(namespaces[&ChunkId::new("chunk-1.js")], "$1");
        assert_eq!(namespaces[&ChunkId::new("chunk-2.js")], "$3");
    }

    #[test]
    fn test_facade_code() {
        let chunks = ids(&["a/chunk-0.js", "chunk-1.js"]);
        let namespaces = assign_namespaces(&chunks, &[]);
        let code = facade_code(&ChunkId::new("entry.js"), &namespaces);

        assert_eq!(
            code,
            "import * as $0 from \"a/chunk-0.js\";\n\
             import * as $1 from \"chunk-1.js\";\n\
             export * from \"entry.js\";\n\
             export { $0, $1 };\n"
        );
    }

    #[test]
    fn test_facade_code_without_chunks() {
        let code = facade_code(&ChunkId::new("entry.js"), &IndexMap::new());
        assert_eq!(code, "export * from \"entry.js\";\n");
    }
}
