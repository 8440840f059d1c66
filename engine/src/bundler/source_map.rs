use sourcemap::{SourceMap, SourceMapBuilder};
use tessera_shared::{TesseraError, TesseraResult};

/// Source map of a file assembled from several modules, each placed at a
/// line offset in the output.
pub struct CompositeSourceMap {
    builder: SourceMapBuilder,
}

impl CompositeSourceMap {
    pub fn new(output_file: &str) -> Self {
        Self {
            builder: SourceMapBuilder::new(Some(output_file)),
        }
    }

    /// Shifts every token of `map` down by `line_offset` lines.
    pub fn add_map(&mut self, map: &SourceMap, line_offset: u32) {
        let mut sources = Vec::new();
        for (index, source) in map.sources().enumerate() {
            let id = self.builder.add_source(source);
            if let Some(content) = map.get_source_contents(index as u32) {
                self.builder.set_source_contents(id, Some(content));
            }
            sources.push(id);
        }

        let names: Vec<u32> = map.names().map(|name| self.builder.add_name(name)).collect();

        for token in map.tokens() {
            self.builder.add_raw(
                token.get_dst_line() + line_offset,
                token.get_dst_col(),
                token.get_src_line(),
                token.get_src_col(),
                sources.get(token.get_src_id() as usize).copied(),
                names.get(token.get_name_id() as usize).copied(),
                false,
            );
        }
    }

    /// Maps every line of `content` onto itself in `source`.
    pub fn add_identity(&mut self, source: &str, content: &str, line_offset: u32) {
        let id = self.builder.add_source(source);
        self.builder.set_source_contents(id, Some(content));

        for line in 0..content.lines().count() as u32 {
            self.builder
                .add_raw(line_offset + line, 0, line, 0, Some(id), None, false);
        }
    }

    pub fn into_json(self) -> TesseraResult<String> {
        let mut bytes = Vec::new();
        self.builder
            .into_sourcemap()
            .to_writer(&mut bytes)
            .map_err(|e| TesseraError::SourceMap(e.to_string()))?;
        Ok(String::from_utf8(bytes)?)
    }
}

pub fn parse(map: &str) -> TesseraResult<SourceMap> {
    SourceMap::from_slice(map.as_bytes()).map_err(|e| TesseraError::SourceMap(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_modules_into_one_map() {
        let mut composite = CompositeSourceMap::new("bundler.js");
        composite.add_identity("src/a.js", "const a = 1;\nconst b = 2;", 3);
        composite.add_identity("src/b.js", "const c = 3;", 7);

        let map = parse(&composite.into_json().unwrap()).unwrap();
        assert_eq!(map.get_source_count(), 2);

        let token = map.lookup_token(4, 0).unwrap();
        assert_eq!(token.get_source(), Some("src/a.js"));
        assert_eq!(token.get_src_line(), 1);

        let token = map.lookup_token(7, 0).unwrap();
        assert_eq!(token.get_source(), Some("src/b.js"));
    }
}
