// dictionary.rs: word -> feature list tables used for dictionary features
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::config::ParserConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::example::{Example, Feature};
use crate::label::NoLabelParser;
use crate::parser::parse_example;
use crate::tokenizer::strip_line;

/// Maps a feature name to the features it expands to.
#[derive(Debug, Clone, Default)]
pub struct FeatureDict {
    table: HashMap<Vec<u8>, Vec<Feature>>,
}

impl FeatureDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. An existing entry for `word` is kept; returns whether
    /// the new one was stored.
    pub fn insert(&mut self, word: &[u8], features: Vec<Feature>) -> bool {
        if features.is_empty() || self.table.contains_key(word) {
            return false;
        }
        self.table.insert(word.to_vec(), features);
        true
    }

    #[inline]
    pub fn get(&self, word: &[u8]) -> Option<&[Feature]> {
        self.table.get(word).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Read `word <features>` lines. The feature text is compiled into the
    /// default namespace with `cfg`'s hash mode; lines without features are
    /// skipped.
    pub fn from_reader<R: BufRead>(mut reader: R, cfg: &ParserConfig) -> std::io::Result<Self> {
        let plain = ParserConfig::default().with_hash_mode(cfg.hash_mode);
        let mut dict = FeatureDict::new();
        let mut ex: Example<()> = Example::new();
        let mut buf: Vec<u8> = Vec::new();
        let mut line_text: Vec<u8> = Vec::new();
        let mut lineno = 0u64;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            lineno += 1;
            let line = strip_line(&buf);
            let mut start = 0usize;
            while start < line.len() && (line[start] == b' ' || line[start] == b'\t') {
                start += 1;
            }
            let mut end = start;
            while end < line.len() && line[end] != b' ' && line[end] != b'\t' {
                end += 1;
            }
            if end == start || end == line.len() {
                continue;
            }
            let word = &line[start..end];
            if dict.get(word).is_some() {
                continue;
            }

            line_text.clear();
            line_text.push(b'|');
            line_text.extend_from_slice(&line[end..]);
            ex.clear();
            parse_example(&plain, &NoLabelParser, &line_text, &mut ex, lineno);
            dict.insert(word, ex.namespace(b' ').features.clone());
        }
        Ok(dict)
    }

    pub fn from_path(path: &Path, cfg: &ParserConfig) -> ConfigResult<Self> {
        let file = File::open(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let dict = Self::from_reader(BufReader::new(file), cfg).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), entries = dict.len(), "loaded dictionary");
        Ok(dict)
    }
}
