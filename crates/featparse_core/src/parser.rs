// parser.rs: recursive-descent scanner compiling a line's namespaces into hashed features
//
// Grammar of the feature region (everything from the first '|'):
//
//   ListNameSpace  --> ('|' NameSpace)*
//   NameSpace      --> ListFeatures | NameSpaceInfo ListFeatures
//   NameSpaceInfo  --> String [':' Float]
//   ListFeatures   --> ((' ' | '\t') MaybeFeature)*
//   MaybeFeature   --> ø | String [':' Float]
//
// A block ends at '|', end of line or '\r'.
use std::fmt;

use memchr::memchr;
use tracing::warn;

use crate::config::ParserConfig;
use crate::example::{AuditRecord, Example, Feature};
use crate::hash::{
    hash_string, AFFIX_CONSTANT, AFFIX_NAMESPACE, DICTIONARY_NAMESPACE, QUADRATIC_CONSTANT,
    SPELLING_NAMESPACE,
};
use crate::label::LabelParser;
use crate::tokenizer::{parse_float, split_example};

/// A recoverable problem found while parsing one line.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    pub example: u64,
    /// Read position in the line when the problem was noticed.
    pub offset: usize,
    pub message: String,
    pub snippet: String,
    pub line: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\"{}\" in Example #{}: \"{}\"", self.message, self.snippet, self.example, self.line)
    }
}

/// Everything a parse call reports besides the filled example.
#[derive(Debug, Clone, Default)]
pub struct ParseReport {
    pub warnings: Vec<ParseWarning>,
}

impl ParseReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[inline]
fn is_value_end(b: Option<u8>) -> bool {
    matches!(b, None | Some(b' ' | b'\t' | b'|' | b'\r'))
}

/// `(pos) -> (pos', name)`: the run of bytes up to a blank, `:`, `|` or `\r`.
#[inline]
fn read_name(line: &[u8], pos: usize) -> (usize, &[u8]) {
    let mut end = pos;
    while end < line.len() && !matches!(line[end], b' ' | b'\t' | b':' | b'|' | b'\r') {
        end += 1;
    }
    (end, &line[pos..end])
}

/// Map a byte to the representative of its character class.
#[inline]
pub fn spelling_class(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => b'0',
        b'a'..=b'z' => b'a',
        b'A'..=b'Z' => b'A',
        b'.' => b'.',
        _ => b'#',
    }
}

/// Per-line parse state. Built for one call and dropped with its scratch
/// buffers when the line is done.
struct Scanner<'a, L> {
    line: &'a [u8],
    begin: usize,
    pos: usize,
    cfg: &'a ParserConfig,
    ex: &'a mut Example<L>,
    example_number: u64,
    warnings: Vec<ParseWarning>,

    index: u8,
    ns_value: f32,
    ns_seed: u32,
    anon: u32,
    ns_name: Vec<u8>,
    spelling: Vec<u8>,
}

impl<'a, L> Scanner<'a, L> {
    fn new(cfg: &'a ParserConfig, line: &'a [u8], begin: usize, ex: &'a mut Example<L>, example_number: u64) -> Self {
        Self {
            line,
            begin,
            pos: begin,
            cfg,
            ex,
            example_number,
            warnings: Vec::new(),
            index: 0,
            ns_value: 1.0,
            ns_seed: 0,
            anon: 0,
            ns_name: Vec::new(),
            spelling: Vec::new(),
        }
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.line.get(self.pos).copied()
    }

    #[inline]
    fn at_block_end(&self) -> bool {
        matches!(self.peek(), None | Some(b'|') | Some(b'\r'))
    }

    fn warn(&mut self, message: &str, from: usize, to: usize) {
        let w = ParseWarning {
            example: self.example_number,
            offset: self.pos,
            message: message.to_string(),
            snippet: lossy(&self.line[from..to.max(from)]),
            line: lossy(self.line),
        };
        warn!(example = w.example, offset = w.offset, "{}", w);
        self.warnings.push(w);
    }

    fn list_namespaces(&mut self) {
        loop {
            while self.peek() == Some(b'|') {
                self.pos += 1;
                self.namespace();
            }
            if self.pos >= self.line.len() || self.peek() == Some(b'\r') {
                return;
            }
            self.warn("malformed example! '|' or EOL expected after : ", self.begin, self.pos);
            match memchr(b'|', &self.line[self.pos..]) {
                Some(off) => self.pos += off,
                None => return,
            }
        }
    }

    fn namespace(&mut self) {
        self.ns_value = 1.0;
        self.anon = 0;
        match self.peek() {
            None | Some(b' ' | b'\t' | b'|' | b'\r') => {
                self.index = b' ';
                self.ns_seed = 0;
                if self.cfg.audit {
                    self.ns_name.clear();
                    self.ns_name.push(b' ');
                }
            }
            Some(b':') => {
                self.warn("malformed example! '|',String,space, or EOL expected after : ", self.begin, self.pos);
                // drop the whole block
                while !self.at_block_end() {
                    self.pos += 1;
                }
                return;
            }
            Some(_) => self.namespace_info(),
        }

        // registered once the block is done, after any derived namespace it fed
        let new_index = self.ex.namespace(self.index).is_empty();
        self.list_features();
        if new_index && !self.ex.namespace(self.index).is_empty() {
            self.ex.indices.push(self.index);
        }
    }

    fn namespace_info(&mut self) {
        let line = self.line;
        self.index = self.cfg.redefine(line[self.pos]);
        let (end, name) = read_name(line, self.pos);
        if self.cfg.audit {
            self.ns_name.clear();
            self.ns_name.extend_from_slice(name);
        }
        self.ns_seed = self.cfg.hash_mode.namespace_seed(name);
        self.pos = end;
        self.namespace_value();
    }

    fn namespace_value(&mut self) {
        match self.peek() {
            None | Some(b' ' | b'\t' | b'|' | b'\r') => {}
            Some(b':') => {
                self.pos += 1;
                let (v, end) = parse_float(self.line, self.pos);
                if end == self.pos {
                    self.warn("malformed example! Float expected after : ", self.begin, self.pos);
                    self.ns_value = 1.0;
                } else if v.is_nan() {
                    self.warn("warning: invalid namespace value: NaN, replacing with 1 ", self.pos, end);
                    self.ns_value = 1.0;
                } else {
                    self.ns_value = v;
                }
                self.pos = end;
            }
            Some(_) => {
                self.warn("malformed example! '|',':', space, or EOL expected after : ", self.begin, self.pos);
            }
        }
    }

    fn list_features(&mut self) {
        loop {
            while matches!(self.peek(), Some(b' ' | b'\t')) {
                self.pos += 1;
                self.maybe_feature();
            }
            if self.at_block_end() {
                return;
            }
            self.warn("malformed example! '|',space, or EOL expected after : ", self.begin, self.pos);
            while !is_value_end(self.peek()) {
                self.pos += 1;
            }
        }
    }

    fn feature_value(&mut self) -> f32 {
        match self.peek() {
            None | Some(b' ' | b'\t' | b'|' | b'\r') => 1.0,
            Some(b':') => {
                self.pos += 1;
                let (v, end) = parse_float(self.line, self.pos);
                let v = if end == self.pos {
                    self.warn("malformed example! Float expected after : ", self.begin, self.pos);
                    0.0
                } else if v.is_nan() {
                    self.warn("warning: invalid feature value: NaN, replacing with 0 ", self.pos, end);
                    0.0
                } else {
                    v
                };
                self.pos = end;
                v
            }
            Some(_) => {
                self.warn("malformed example! '|', ':', space, or EOL expected after : ", self.begin, self.pos);
                0.0
            }
        }
    }

    /// Append to a reserved namespace, registering it on first use.
    #[inline]
    fn emit_derived(&mut self, ns: u8, feature: Feature, rec: Option<AuditRecord>) {
        if self.ex.namespace(ns).is_empty() {
            self.ex.indices.push(ns);
        }
        self.ex.namespace_mut(ns).push(feature, rec);
    }

    fn maybe_feature(&mut self) {
        if is_value_end(self.peek()) {
            return;
        }
        let line = self.line;
        let cfg = self.cfg;
        let audit = cfg.audit;

        let (end, name) = read_name(line, self.pos);
        self.pos = end;
        let v = self.ns_value * self.feature_value();
        let index = if name.is_empty() {
            let i = self.ns_seed.wrapping_add(self.anon);
            self.anon += 1;
            i
        } else {
            cfg.hash_mode.hash(name, self.ns_seed)
        };
        if v == 0.0 {
            return;
        }

        let ns = self.index;
        let rec = audit.then(|| AuditRecord { space: self.ns_name.clone(), name: name.to_vec(), index, value: v });
        self.ex.namespace_mut(ns).push(Feature { value: v, index }, rec);

        if !name.is_empty() {
            for spec in cfg.affixes(ns) {
                let len = spec.len as usize;
                let affix = if name.len() > len {
                    if spec.prefix { &name[..len] } else { &name[name.len() - len..] }
                } else {
                    name
                };
                let mix = AFFIX_CONSTANT.wrapping_add(spec.code().wrapping_mul(QUADRATIC_CONSTANT));
                let h = cfg.hash_mode.hash(affix, self.ns_seed).wrapping_mul(mix);
                let rec = audit.then(|| {
                    let mut display = Vec::with_capacity(affix.len() + 4);
                    if ns != b' ' {
                        display.push(ns);
                    }
                    display.push(if spec.prefix { b'+' } else { b'-' });
                    display.push(b'0' + spec.len);
                    display.push(b'=');
                    display.extend_from_slice(affix);
                    AuditRecord { space: b"affix".to_vec(), name: display, index: h, value: v }
                });
                self.emit_derived(AFFIX_NAMESPACE, Feature { value: v, index: h }, rec);
            }
        }

        if cfg.spelling(ns) {
            self.spelling.clear();
            self.spelling.extend(name.iter().map(|&c| spelling_class(c)));
            let h = hash_string(&self.spelling, self.ns_seed);
            let rec = audit.then(|| {
                let mut display = Vec::with_capacity(self.spelling.len() + 2);
                if ns != b' ' {
                    display.push(ns);
                    display.push(b'_');
                }
                display.extend_from_slice(&self.spelling);
                AuditRecord { space: b"spelling".to_vec(), name: display, index: h, value: v }
            });
            self.emit_derived(SPELLING_NAMESPACE, Feature { value: v, index: h }, rec);
        }

        for dict in cfg.dictionaries(ns) {
            let Some(features) = dict.get(name) else { continue };
            for f in features {
                let rec = audit.then(|| {
                    let id = f.index.to_string();
                    let mut display = Vec::with_capacity(name.len() + id.len() + 3);
                    display.push(ns);
                    display.push(b'_');
                    display.extend_from_slice(name);
                    display.push(b'=');
                    display.extend_from_slice(id.as_bytes());
                    AuditRecord { space: b"dictionary".to_vec(), name: display, index: f.index, value: f.value }
                });
                self.emit_derived(DICTIONARY_NAMESPACE, *f, rec);
            }
        }
    }
}

/// Parse one stripped line into `ex`.
///
/// The tag and label words are split off first; label words go to `labels`.
/// The feature region is then scanned namespace by namespace. Nothing in the
/// line is fatal: problems come back as warnings and defaults are used.
pub fn parse_example<P: LabelParser>(
    cfg: &ParserConfig,
    labels: &P,
    line: &[u8],
    ex: &mut Example<P::Label>,
    example_number: u64,
) -> ParseReport {
    let split = split_example(line);
    let mut report = ParseReport::default();

    if let Some(tag) = split.tag {
        ex.tag.extend_from_slice(tag);
    }
    ex.label = P::Label::default();
    if !split.label_words.is_empty() {
        if let Err(e) = labels.parse_label(&split.label_words, &mut ex.label) {
            let w = ParseWarning {
                example: example_number,
                offset: 0,
                message: format!("{}: ", e),
                snippet: lossy(&line[..split.features_offset]),
                line: lossy(line),
            };
            warn!(example = example_number, "{}", w);
            report.warnings.push(w);
        }
    }

    if !split.features.is_empty() {
        let mut scanner = Scanner::new(cfg, line, split.features_offset, ex, example_number);
        scanner.list_namespaces();
        report.warnings.append(&mut scanner.warnings);
    }
    report
}

/// Parse an in-memory line, dropping trailing newlines.
pub fn read_line<P: LabelParser>(
    cfg: &ParserConfig,
    labels: &P,
    line: &str,
    ex: &mut Example<P::Label>,
) -> ParseReport {
    parse_example(cfg, labels, line.trim_end_matches('\n').as_bytes(), ex, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::FeatureDict;
    use crate::hash::{hash_string, HashMode};
    use crate::label::{NoLabelParser, SimpleLabel, SimpleLabelParser};
    use std::sync::Arc;

    fn audited() -> ParserConfig {
        ParserConfig::default().with_audit(true)
    }

    fn parse(cfg: &ParserConfig, line: &str) -> (Example<()>, ParseReport) {
        let mut ex = Example::new();
        let report = parse_example(cfg, &NoLabelParser, line.as_bytes(), &mut ex, 1);
        (ex, report)
    }

    fn seed(name: &str) -> u32 {
        HashMode::Strings.namespace_seed(name.as_bytes())
    }

    fn names(ex: &Example<()>, ns: u8) -> Vec<String> {
        ex.namespace(ns).audit.iter().map(|r| r.name_lossy()).collect()
    }

    #[test]
    fn test_zero_valued_feature_is_dropped() {
        let (ex, report) = parse(&audited(), "|a x:0 y:1");
        assert!(report.is_clean());
        let a = ex.namespace(b'a');
        assert_eq!(a.features, vec![Feature { value: 1.0, index: hash_string(b"y", seed("a")) }]);
        assert_eq!(names(&ex, b'a'), vec!["y"]);
        assert_eq!(a.sum_feat_sq, 1.0);
    }

    #[test]
    fn test_namespace_registered_once() {
        let (ex, _) = parse(&audited(), "|a x:1 |a y:1");
        assert_eq!(ex.indices, vec![b'a']);
        assert_eq!(names(&ex, b'a'), vec!["x", "y"]);
    }

    #[test]
    fn test_namespace_with_only_zero_features_not_registered() {
        let (ex, _) = parse(&audited(), "|a x:0 |b y");
        assert_eq!(ex.indices, vec![b'b']);
    }

    #[test]
    fn test_namespace_multiplier_and_feature_value() {
        let (ex, _) = parse(&audited(), "|a:2 x:3 y");
        let values: Vec<f32> = ex.namespace(b'a').features.iter().map(|f| f.value).collect();
        assert_eq!(values, vec![6.0, 2.0]);
        assert_eq!(ex.namespace(b'a').sum_feat_sq, 40.0);
        // the seed comes from the full namespace name, not just its first byte
        let (ex2, _) = parse(&audited(), "|apple x");
        assert_eq!(ex2.indices, vec![b'a']);
        assert_eq!(ex2.namespace(b'a').features[0].index, hash_string(b"x", seed("apple")));
        assert_eq!(ex2.namespace(b'a').audit[0].space, b"apple".to_vec());
    }

    #[test]
    fn test_unnamed_namespace() {
        let (ex, report) = parse(&audited(), "| x y:2");
        assert!(report.is_clean());
        assert_eq!(ex.indices, vec![b' ']);
        let ns = ex.namespace(b' ');
        assert_eq!(ns.features[0].index, hash_string(b"x", 0));
        assert_eq!(ns.features[1].value, 2.0);
        assert_eq!(ns.audit[0].space, b" ".to_vec());
    }

    #[test]
    fn test_anonymous_features_use_counter() {
        let (ex, _) = parse(&audited(), "|a :2 :0 :3");
        let s = seed("a");
        assert_eq!(
            ex.namespace(b'a').features,
            vec![Feature { value: 2.0, index: s }, Feature { value: 3.0, index: s.wrapping_add(2) }]
        );
    }

    #[test]
    fn test_tabs_separate_features() {
        let (ex, report) = parse(&audited(), "|a\tx\ty");
        assert!(report.is_clean());
        assert_eq!(names(&ex, b'a'), vec!["x", "y"]);
    }

    #[test]
    fn test_missing_float_substitutes_zero_and_continues() {
        let (ex, report) = parse(&audited(), "|a x:");
        assert!(ex.indices.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].message.contains("Float expected"));
        assert_eq!(report.warnings[0].example, 1);

        let (ex, report) = parse(&audited(), "|a x: |b y");
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(ex.indices, vec![b'b']);
        assert_eq!(names(&ex, b'b'), vec!["y"]);
    }

    #[test]
    fn test_nan_feature_value_replaced_with_zero() {
        let (ex, report) = parse(&audited(), "|a x:nan y");
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].message.contains("NaN"));
        assert_eq!(names(&ex, b'a'), vec!["y"]);
    }

    #[test]
    fn test_malformed_namespace_value_defaults_to_one() {
        let (ex, report) = parse(&audited(), "|a:zz x");
        assert!(!report.is_clean());
        assert_eq!(ex.namespace(b'a').features[0].value, 1.0);

        let (ex, report) = parse(&audited(), "|a:nan x:2");
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(ex.namespace(b'a').features[0].value, 2.0);
    }

    #[test]
    fn test_garbage_after_value_resyncs() {
        let (ex, report) = parse(&audited(), "|a x:1.5abc y |b z");
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(names(&ex, b'a'), vec!["x", "y"]);
        assert_eq!(ex.namespace(b'a').features[0].value, 1.5);
        assert_eq!(names(&ex, b'b'), vec!["z"]);
    }

    #[test]
    fn test_colon_after_bar_drops_block_only() {
        let (ex, report) = parse(&audited(), "|:3 x |b y");
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(ex.indices, vec![b'b']);
    }

    #[test]
    fn test_carriage_return_ends_line() {
        let (ex, report) = parse(&audited(), "|a x\r|b y");
        assert!(report.is_clean());
        assert_eq!(ex.indices, vec![b'a']);
    }

    #[test]
    fn test_redefined_namespaces_share_bucket() {
        let cfg = audited().with_redefine(&["N:=ab".to_string()]).unwrap();
        let (ex, _) = parse(&cfg, "|apple x |bob y |c z");
        assert_eq!(ex.indices, vec![b'N', b'c']);
        let n = ex.namespace(b'N');
        assert_eq!(n.features[0].index, hash_string(b"x", seed("apple")));
        assert_eq!(n.features[1].index, hash_string(b"y", seed("bob")));
    }

    #[test]
    fn test_prefix_affix() {
        let cfg = audited().with_affixes("+3a").unwrap();
        let (ex, _) = parse(&cfg, "|a hello");
        // derived namespaces register on first push, before their parent block closes
        assert_eq!(ex.indices, vec![AFFIX_NAMESPACE, b'a']);
        assert_eq!(names(&ex, AFFIX_NAMESPACE), vec!["a+3=hel"]);
        let mix = AFFIX_CONSTANT.wrapping_add(7u32.wrapping_mul(QUADRATIC_CONSTANT));
        let expected = hash_string(b"hel", seed("a")).wrapping_mul(mix);
        assert_eq!(ex.namespace(AFFIX_NAMESPACE).features[0], Feature { value: 1.0, index: expected });
        assert_eq!(ex.namespace(AFFIX_NAMESPACE).audit[0].space, b"affix".to_vec());
    }

    #[test]
    fn test_suffix_and_short_names() {
        let cfg = audited().with_affixes("-2a,+5a").unwrap();
        let (ex, _) = parse(&cfg, "|a hello ab");
        assert_eq!(names(&ex, AFFIX_NAMESPACE), vec!["a+5=hello", "a-2=lo", "a+5=ab", "a-2=ab"]);
    }

    #[test]
    fn test_affix_on_unnamed_namespace_and_anonymous_feature() {
        let cfg = audited().with_affixes("+1").unwrap();
        let (ex, _) = parse(&cfg, "| word :2");
        // anonymous features get no affix
        assert_eq!(names(&ex, AFFIX_NAMESPACE), vec!["+1=w"]);
    }

    #[test]
    fn test_spelling_feature() {
        let cfg = audited().with_spelling(&["a".to_string()]).unwrap();
        let (ex, _) = parse(&cfg, "|a Ab3.:2 b-x");
        assert_eq!(names(&ex, SPELLING_NAMESPACE), vec!["a_Aa0.", "a_a#a"]);
        let sp = ex.namespace(SPELLING_NAMESPACE);
        assert_eq!(sp.features[0], Feature { value: 2.0, index: hash_string(b"Aa0.", seed("a")) });
        assert_eq!(sp.sum_feat_sq, 5.0);
    }

    #[test]
    fn test_spelling_on_unnamed_namespace_has_no_prefix() {
        let cfg = audited().with_spelling(&["_".to_string()]).unwrap();
        let (ex, _) = parse(&cfg, "| Ab");
        assert_eq!(names(&ex, SPELLING_NAMESPACE), vec!["Aa"]);
    }

    #[test]
    fn test_dictionary_features_copied_verbatim() {
        let mut dict = FeatureDict::new();
        dict.insert(b"paris", vec![Feature { value: 1.0, index: 5 }, Feature { value: 2.0, index: 123456 }]);
        let cfg = audited().with_dictionary(b'w', Arc::new(dict));
        let (ex, _) = parse(&cfg, "|w paris:3 rome");
        assert_eq!(ex.indices, vec![DICTIONARY_NAMESPACE, b'w']);
        let d = ex.namespace(DICTIONARY_NAMESPACE);
        assert_eq!(d.features, vec![Feature { value: 1.0, index: 5 }, Feature { value: 2.0, index: 123456 }]);
        assert_eq!(d.sum_feat_sq, 5.0);
        assert_eq!(names(&ex, DICTIONARY_NAMESPACE), vec!["w_paris=5", "w_paris=123456"]);
    }

    #[test]
    fn test_audit_disabled_keeps_numeric_features_only() {
        let cfg = ParserConfig::default().with_affixes("+2a").unwrap();
        let (ex, _) = parse(&cfg, "|a hello");
        assert_eq!(ex.namespace(b'a').len(), 1);
        assert!(ex.namespace(b'a').audit.is_empty());
        assert_eq!(ex.namespace(AFFIX_NAMESPACE).len(), 1);
        assert!(ex.namespace(AFFIX_NAMESPACE).audit.is_empty());
    }

    #[test]
    fn test_label_and_tag() {
        let mut ex = Example::new();
        let report = parse_example(&audited(), &SimpleLabelParser, b"1 2 'ex1 |a x", &mut ex, 3);
        assert!(report.is_clean());
        assert_eq!(ex.label.label, Some(1.0));
        assert_eq!(ex.label.weight, 2.0);
        assert_eq!(ex.tag, b"ex1".to_vec());
        assert_eq!(ex.num_features(), 1);
    }

    #[test]
    fn test_bad_label_is_a_warning() {
        let mut ex = Example::new();
        let report = parse_example(&audited(), &SimpleLabelParser, b"abc def |a x", &mut ex, 9);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].example, 9);
        assert_eq!(ex.label.label, None);
        assert_eq!(ex.num_features(), 1);
    }

    #[test]
    fn test_read_line_strips_newline() {
        let mut ex: Example<()> = Example::new();
        let report = read_line(&audited(), &NoLabelParser, "|a x\n\n", &mut ex);
        assert!(report.is_clean());
        assert_eq!(names(&ex, b'a'), vec!["x"]);
    }

    #[test]
    fn test_warning_display_names_line_and_example() {
        let (_, report) = parse(&audited(), "|a x:");
        let text = report.warnings[0].to_string();
        assert!(text.contains("Example #1"));
        assert!(text.contains("|a x:"));
    }

    #[test]
    fn test_recycled_example_matches_fresh_parse() {
        let cfg = audited().with_affixes("+2a,-1b").unwrap().with_spelling(&["b".to_string()]).unwrap();
        let lines = ["1 'one |a hello world:2 |b Foo12", "-1 |b x |a y:0.5", "", "|:1 z |a", "2 0.5 'two |b q:3"];
        let snapshot = |ex: &Example<SimpleLabel>| {
            let spaces: Vec<_> = ex
                .iter_namespaces()
                .map(|(i, ns)| {
                    let names: Vec<_> = ns.audit.iter().map(|r| r.name_lossy()).collect();
                    (i, ns.features.clone(), names, ns.sum_feat_sq)
                })
                .collect();
            (ex.label, ex.tag.clone(), spaces)
        };

        let mut reused: Example<SimpleLabel> = Example::new();
        for line in lines.iter().chain(lines.iter().rev()) {
            let mut fresh: Example<SimpleLabel> = Example::new();
            let want = parse_example(&cfg, &SimpleLabelParser, line.as_bytes(), &mut fresh, 0);
            reused.clear();
            let got = parse_example(&cfg, &SimpleLabelParser, line.as_bytes(), &mut reused, 0);
            assert_eq!(got.warnings, want.warnings, "line {:?}", line);
            assert_eq!(snapshot(&reused), snapshot(&fresh), "line {:?}", line);
        }
    }

    #[test]
    fn test_recycled_example_does_not_accumulate_across_malformed_lines() {
        let cfg = audited().with_affixes("+2a").unwrap().with_spelling(&["a".to_string()]).unwrap();
        let mut ex: Example<()> = Example::new();
        let lines = ["|a x: yy:nan |:1 q |b z", "|a:oops hello", "|a ab:1.5junk |b c", "|a x"];
        for round in 0..250u64 {
            for (i, line) in lines.iter().enumerate() {
                ex.clear();
                let report = parse_example(&cfg, &NoLabelParser, line.as_bytes(), &mut ex, round * 4 + i as u64);
                let a = ex.namespace(b'a');
                assert_eq!(a.audit.len(), a.features.len());
                match i {
                    0 => {
                        assert_eq!(report.warnings.len(), 3);
                        assert_eq!(ex.indices, vec![b'b']);
                    }
                    1 => assert_eq!(a.len(), 1),
                    2 => assert_eq!(ex.num_features(), 4),
                    _ => assert!(report.is_clean()),
                }
            }
        }
    }
}
