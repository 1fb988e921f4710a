//! Output emission and source map composition

use std::collections::HashMap;

use sourcemap::{SourceMap, SourceMapBuilder};

/// Runtime helpers placed at the top of every output file
///
/// `__ns` builds a module namespace object from getters plus the enumerable keys of
/// `export *` sources. `__interopDefault` reads the default export of an external global.
pub(crate) const RUNTIME_HELPERS: &str = r#"function __ns(getters, stars) {
  var ns = Object.defineProperty({ __proto__: null }, '__esModule', { value: true });
  stars.forEach(function (m) {
    Object.keys(m).forEach(function (k) {
      if (k !== 'default' && !(k in getters)) Object.defineProperty(ns, k, { enumerable: true, get: function () { return m[k]; } });
    });
  });
  Object.keys(getters).forEach(function (k) {
    Object.defineProperty(ns, k, { enumerable: true, get: getters[k] });
  });
  return ns;
}
function __interopDefault(m) {
  return m && m.__esModule ? m.default : m;
}"#;

/// Accumulates generated code and the source map that describes it
pub(crate) struct Emitter {
    code: String,

    /// Zero-based line the next push starts on
    line: u32,

    builder: SourceMapBuilder,

    /// Source name -> source id in `builder`
    sources: HashMap<String, u32>,
}

impl Emitter {
    pub(crate) fn new(file: &str) -> Self {
        Self {
            code: String::new(),
            line: 0,
            builder: SourceMapBuilder::new(Some(file)),
            sources: HashMap::new(),
        }
    }

    /// Append unmapped generated text, terminated by a newline
    pub(crate) fn line(&mut self, text: &str) {
        self.code.push_str(text);
        self.code.push('\n');
        self.line += text.matches('\n').count() as u32 + 1;
    }

    /// Append a module body and map each of its lines back to the module
    ///
    /// With an input map, its tokens are re-based onto the output lines. Without one,
    /// each non-blank line maps to column 0 of the same line in `id`, whose contents are
    /// `original`. Ids starting with `\0` are synthetic and stay unmapped.
    pub(crate) fn mapped_body(
        &mut self,
        id: &str,
        body: &str,
        original: &str,
        map: Option<&SourceMap>,
    ) {
        let body = body.strip_suffix('\n').unwrap_or(body);
        let start = self.line;
        let lines: Vec<&str> = body.split('\n').collect();

        match map {
            Some(map) => {
                for token in map.tokens() {
                    let dst_line = token.get_dst_line();
                    if dst_line as usize >= lines.len() {
                        continue;
                    }
                    let Some(source) = token.get_source() else {
                        continue;
                    };
                    let contents = map.get_source_contents(token.get_src_id());
                    let src_id = self.source(source, contents);
                    let name_id = token.get_name().map(|name| self.builder.add_name(name));
                    self.builder.add_raw(
                        start + dst_line,
                        token.get_dst_col(),
                        token.get_src_line(),
                        token.get_src_col(),
                        Some(src_id),
                        name_id,
                        false,
                    );
                }
            }
            None if !id.starts_with('\0') => {
                let src_id = self.source(id, Some(original));
                for (index, text) in lines.iter().enumerate() {
                    if text.trim().is_empty() {
                        continue;
                    }
                    let index = index as u32;
                    self.builder
                        .add_raw(start + index, 0, index, 0, Some(src_id), None, false);
                }
            }
            None => {}
        }

        self.line(body);
    }

    fn source(&mut self, name: &str, contents: Option<&str>) -> u32 {
        if let Some(&id) = self.sources.get(name) {
            return id;
        }
        let id = self.builder.add_source(name);
        self.builder.set_source_contents(id, contents);
        self.sources.insert(name.to_string(), id);
        id
    }

    pub(crate) fn finish(self) -> (String, SourceMap) {
        (self.code, self.builder.into_sourcemap())
    }
}

/// Quote a string as a JavaScript single-quoted literal
pub(crate) fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\'' => quoted.push_str("\\'"),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\0' => quoted.push_str("\\0"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}
