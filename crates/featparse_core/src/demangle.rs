// demangle.rs: recover feature names for nonzero weights by replaying parsed examples
//
// Every example is walked once per class replica. Each base or crossed
// feature whose weight slot is nonzero is written as `<name chain>,<value>`
// and the slot is zeroed, so a slot is reported at most once. The run ends on
// its own once every nonzero weight has been found.
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ParserConfig;
use crate::error::DemangleError;
use crate::example::{AuditRecord, Example};
use crate::interactions::{generate_interactions, InteractionVisitor, Interactions};
use crate::label::LabelParser;
use crate::parser::parse_example;
use crate::tokenizer::strip_line;
use crate::weights::WeightVector;

/// Settings for a demangle run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemangleOptions {
    pub output_path: String,
    pub cache_file: Option<String>,
    pub kill_cache: bool,
    pub passes: u32,
    pub oaa: Option<usize>,
    pub ect: Option<usize>,
    pub csoaa: Option<usize>,
    pub gravity: f32,
    pub contraction: f32,
    pub interactions: Vec<String>,
}

impl Default for DemangleOptions {
    fn default() -> Self {
        Self {
            output_path: String::new(),
            cache_file: None,
            kill_cache: false,
            passes: 1,
            oaa: None,
            ect: None,
            csoaa: None,
            gravity: 0.0,
            contraction: 1.0,
            interactions: Vec::new(),
        }
    }
}

impl DemangleOptions {
    /// Number of class replicas per example: the one multiclass option given, else 1.
    pub fn class_count(&self) -> Result<usize, DemangleError> {
        let given: Vec<(&str, usize)> = [("oaa", self.oaa), ("ect", self.ect), ("csoaa", self.csoaa)]
            .into_iter()
            .filter_map(|(name, v)| v.map(|v| (name, v)))
            .collect();
        match given.as_slice() {
            [] => Ok(1),
            [(_, 0)] => Err(DemangleError::ZeroClasses),
            [(_, n)] => Ok(*n),
            many => Err(DemangleError::ConflictingClassOptions(
                many.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(", "),
            )),
        }
    }

    /// Check every precondition of a run; returns the class count.
    pub fn validate(&self, parser_cfg: &ParserConfig, weights: &WeightVector) -> Result<usize, DemangleError> {
        if self.output_path.is_empty() {
            return Err(DemangleError::MissingOutput);
        }
        if self.passes > 1 {
            return Err(DemangleError::MultiplePasses(self.passes));
        }
        if self.cache_file.is_some() && !self.kill_cache {
            return Err(DemangleError::CacheFile);
        }
        if !parser_cfg.audit {
            return Err(DemangleError::AuditDisabled);
        }
        if weights.count_nonzero() == 0 {
            return Err(DemangleError::NoWeights);
        }
        Interactions::parse(&self.interactions)?;
        self.class_count()
    }
}

#[inline]
fn trunc_weight(w: f32, gravity: f32) -> f32 {
    if gravity < w.abs() {
        w - w.signum() * gravity
    } else {
        0.0
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Format like a C stream's default `%g`: six significant digits, trailing
/// zeros dropped, scientific notation outside `1e-4 ..= 1e6`.
pub fn format_g(v: f32) -> String {
    if v.is_nan() {
        return "nan".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let v = v as f64;
    let sci = format!("{:.5e}", v);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if !(-4..6).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exp.abs())
    } else {
        let fixed = format!("{:.*}", (5 - exp) as usize, v);
        trim_fraction(&fixed).to_string()
    }
}

/// Display name of one constituent: `space^name`, the space left out for the
/// default namespace and a non-printable first byte written as `\xHH`.
fn display_name(rec: &AuditRecord) -> String {
    let mut s = String::with_capacity(rec.space.len() + rec.name.len() + 4);
    if let Some((&first, rest)) = rec.space.split_first() {
        if rec.space != b" " {
            if (0x20..0x7f).contains(&first) {
                s.push(first as char);
            } else {
                let _ = write!(s, "\\x{:02x}", first);
            }
            s.push_str(&String::from_utf8_lossy(rest));
            s.push('^');
        }
    }
    s.push_str(&String::from_utf8_lossy(&rec.name));
    s
}

/// Output side of the reporter: weights, name stack, sink.
struct Reporter<W> {
    out: W,
    weights: WeightVector,
    gravity: f32,
    contraction: f32,
    class_prefix: Option<String>,
    stack: Vec<String>,
    line: String,
    found: usize,
}

impl<W: Write> InteractionVisitor for Reporter<W> {
    type Error = io::Error;

    fn enter(&mut self, rec: &AuditRecord) {
        self.stack.push(display_name(rec));
    }

    fn leave(&mut self) {
        self.stack.pop();
    }

    fn feature(&mut self, _value: f32, index: u32) -> io::Result<()> {
        let Some(w) = self.weights.take_nonzero(index) else {
            return Ok(());
        };
        self.found += 1;

        self.line.clear();
        if let Some(p) = &self.class_prefix {
            self.line.push_str(p);
        }
        for (i, name) in self.stack.iter().enumerate() {
            if i > 0 {
                self.line.push('*');
            }
            self.line.push_str(name);
        }
        self.line.push(',');
        self.line.push_str(&format_g(trunc_weight(w, self.gravity) * self.contraction));
        self.line.push('\n');
        self.out.write_all(self.line.as_bytes())
    }
}

/// Counters of a finished (or interrupted) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DemangleSummary {
    pub examples: u64,
    pub found: usize,
    pub weights_loaded: usize,
    pub completed: bool,
}

/// One progress line: examples seen, weights found so far, percent found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub examples: u64,
    pub found: usize,
    pub percent: usize,
}

/// Pass-through learner that reports and zeroes the weights each example touches.
///
/// Zeroing is destructive: the weights handed in are consumed slot by slot
/// and come back from [`Demangler::into_parts`] with every reported slot at 0.
pub struct Demangler<W: Write> {
    reporter: Reporter<W>,
    interactions: Interactions,
    class_cnt: usize,
    weights_loaded: usize,
    examples: u64,
    dump_interval: u64,
    done: bool,
    progress: Vec<Progress>,
}

impl<W: Write> Demangler<W> {
    pub fn new(
        opts: &DemangleOptions,
        parser_cfg: &ParserConfig,
        weights: WeightVector,
        out: W,
    ) -> Result<Self, DemangleError> {
        let class_cnt = opts.validate(parser_cfg, &weights)?;
        let interactions = Interactions::parse(&opts.interactions)?;
        let weights_loaded = weights.count_nonzero();
        debug!(weights_loaded, class_cnt, terms = interactions.terms().len(), "demangle session ready");
        Ok(Self {
            reporter: Reporter {
                out,
                weights,
                gravity: opts.gravity,
                contraction: opts.contraction,
                class_prefix: None,
                stack: Vec::new(),
                line: String::new(),
                found: 0,
            },
            interactions,
            class_cnt,
            weights_loaded,
            examples: 0,
            dump_interval: 1,
            done: false,
            progress: Vec::new(),
        })
    }

    pub fn examples(&self) -> u64 {
        self.examples
    }

    pub fn found(&self) -> usize {
        self.reporter.found
    }

    pub fn weights_loaded(&self) -> usize {
        self.weights_loaded
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Every progress line logged so far, oldest first.
    pub fn progress(&self) -> &[Progress] {
        &self.progress
    }

    pub fn summary(&self) -> DemangleSummary {
        DemangleSummary {
            examples: self.examples,
            found: self.reporter.found,
            weights_loaded: self.weights_loaded,
            completed: self.done,
        }
    }

    /// Report every nonzero slot touched by `ex`, once per class replica.
    /// The example's offset is the same on return as on entry.
    pub fn learn<L>(&mut self, ex: &mut Example<L>) -> Result<(), DemangleError> {
        let base = ex.ft_offset;
        let stride_shift = self.reporter.weights.stride_shift();
        let mut result = Ok(());
        for c in 0..self.class_cnt {
            ex.ft_offset = base.wrapping_add((c as u32) << stride_shift);
            self.reporter.class_prefix = (self.class_cnt > 1).then(|| format!("{}:", c));
            result = self.visit(ex);
            if result.is_err() {
                break;
            }
        }
        self.reporter.class_prefix = None;
        self.reporter.stack.clear();
        ex.ft_offset = base;
        result.map_err(DemangleError::from)
    }

    fn visit<L>(&mut self, ex: &Example<L>) -> io::Result<()> {
        let offset = ex.ft_offset;
        for (_, ns) in ex.iter_namespaces() {
            for rec in &ns.audit {
                self.reporter.enter(rec);
                let r = self.reporter.feature(rec.value, rec.index.wrapping_add(offset));
                self.reporter.leave();
                r?;
            }
        }
        generate_interactions(ex, &self.interactions, &mut self.reporter)
    }

    /// Count the example, log progress on a doubling interval and return
    /// whether every loaded weight has now been found.
    pub fn finish_example(&mut self) -> bool {
        self.examples += 1;
        let found = self.reporter.found;
        let mut printed = false;
        if self.examples >= self.dump_interval {
            self.report(found * 100 / self.weights_loaded);
            self.dump_interval = self.dump_interval.saturating_mul(2);
            printed = true;
        }
        if found == self.weights_loaded && !self.done {
            if !printed {
                self.report(100);
            }
            self.done = true;
        }
        self.done
    }

    fn report(&mut self, percent: usize) {
        let line = Progress { examples: self.examples, found: self.reporter.found, percent };
        info!(
            examples = line.examples,
            found = line.found,
            percent,
            "{:<12} {:>9} {:>12}%",
            line.examples,
            line.found,
            percent
        );
        self.progress.push(line);
    }

    /// `learn` then `finish_example`.
    pub fn process<L>(&mut self, ex: &mut Example<L>) -> Result<bool, DemangleError> {
        self.learn(ex)?;
        Ok(self.finish_example())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.reporter.out.flush()
    }

    /// Hand back the (partly zeroed) weights and the sink.
    pub fn into_parts(self) -> (WeightVector, W) {
        (self.reporter.weights, self.reporter.out)
    }
}

/// Parse lines from `reader` and demangle them until every weight is found
/// or input runs out. The sink is flushed before returning.
pub fn run_demangle<R: BufRead, W: Write, P: LabelParser>(
    demangler: &mut Demangler<W>,
    parser_cfg: &ParserConfig,
    labels: &P,
    mut reader: R,
) -> Result<DemangleSummary, DemangleError> {
    let mut ex: Example<P::Label> = Example::new();
    let mut buf: Vec<u8> = Vec::new();
    while !demangler.is_done() {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        ex.clear();
        parse_example(parser_cfg, labels, strip_line(&buf), &mut ex, demangler.examples() + 1);
        demangler.process(&mut ex)?;
    }
    demangler.flush()?;
    let summary = demangler.summary();
    if !summary.completed {
        info!(found = summary.found, weights_loaded = summary.weights_loaded, "input ended before all weights were found");
    }
    Ok(summary)
}

/// Buffered file sink, gzip-compressed when the path ends in `.gz`.
pub enum OutputSink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl OutputSink {
    /// Flush everything and write the gzip trailer if there is one.
    pub fn finish(self) -> io::Result<()> {
        match self {
            OutputSink::Plain(mut w) => w.flush(),
            OutputSink::Gzip(enc) => enc.finish()?.flush(),
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Plain(w) => w.write(buf),
            OutputSink::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Plain(w) => w.flush(),
            OutputSink::Gzip(w) => w.flush(),
        }
    }
}

pub fn open_output(path: &Path) -> io::Result<OutputSink> {
    let file = BufWriter::new(File::create(path)?);
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(OutputSink::Gzip(GzEncoder::new(file, Compression::default())))
    } else {
        Ok(OutputSink::Plain(file))
    }
}

/// Validate, open `opts.output_path`, run over `reader` and close the sink.
/// Returns the summary and the weights with every reported slot zeroed.
pub fn demangle_file<R: BufRead, P: LabelParser>(
    opts: &DemangleOptions,
    parser_cfg: &ParserConfig,
    labels: &P,
    weights: WeightVector,
    reader: R,
) -> Result<(DemangleSummary, WeightVector), DemangleError> {
    opts.validate(parser_cfg, &weights)?;
    let out = open_output(Path::new(&opts.output_path))?;
    let mut demangler = Demangler::new(opts, parser_cfg, weights, out)?;
    let summary = run_demangle(&mut demangler, parser_cfg, labels, reader)?;
    let (weights, out) = demangler.into_parts();
    out.finish()?;
    Ok((summary, weights))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{hash_string, HashMode};
    use crate::label::NoLabelParser;

    fn opts() -> DemangleOptions {
        DemangleOptions { output_path: "unused".to_string(), ..Default::default() }
    }

    fn audited() -> ParserConfig {
        ParserConfig::default().with_audit(true)
    }

    fn parse(line: &str) -> Example<()> {
        let mut ex = Example::new();
        parse_example(&audited(), &NoLabelParser, line.as_bytes(), &mut ex, 1);
        ex
    }

    fn output(d: Demangler<Vec<u8>>) -> (WeightVector, String) {
        let (w, out) = d.into_parts();
        (w, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_format_g_matches_c_stream() {
        let cases: [(f32, &str); 10] = [
            (0.5, "0.5"),
            (0.1, "0.1"),
            (-2.0, "-2"),
            (1e-5, "1e-05"),
            (123456789.0, "1.23457e+08"),
            (100000.0, "100000"),
            (999999.5, "1e+06"),
            (0.0001, "0.0001"),
            (3.14159265, "3.14159"),
            (0.0, "0"),
        ];
        for (v, want) in cases {
            assert_eq!(format_g(v), want, "value {}", v);
        }
    }

    #[test]
    fn test_trunc_weight() {
        assert_eq!(trunc_weight(0.5, 0.0), 0.5);
        assert_eq!(trunc_weight(0.5, 0.25), 0.25);
        assert_eq!(trunc_weight(-0.5, 0.25), -0.25);
        assert_eq!(trunc_weight(0.1, 0.25), 0.0);
    }

    #[test]
    fn test_class_count() {
        assert_eq!(opts().class_count().unwrap(), 1);
        let o = DemangleOptions { oaa: Some(3), ..opts() };
        assert_eq!(o.class_count().unwrap(), 3);
        let o = DemangleOptions { csoaa: Some(0), ..opts() };
        assert!(matches!(o.class_count(), Err(DemangleError::ZeroClasses)));
        let o = DemangleOptions { oaa: Some(3), ect: Some(2), ..opts() };
        match o.class_count() {
            Err(DemangleError::ConflictingClassOptions(names)) => assert_eq!(names, "oaa, ect"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_preconditions() {
        let cfg = audited();
        let mut w = WeightVector::new(4, 0).unwrap();
        w.set(1, 1.0);

        let o = DemangleOptions { output_path: String::new(), ..opts() };
        assert!(matches!(o.validate(&cfg, &w), Err(DemangleError::MissingOutput)));
        let o = DemangleOptions { passes: 2, ..opts() };
        assert!(matches!(o.validate(&cfg, &w), Err(DemangleError::MultiplePasses(2))));
        let o = DemangleOptions { cache_file: Some("c".into()), ..opts() };
        assert!(matches!(o.validate(&cfg, &w), Err(DemangleError::CacheFile)));
        let o = DemangleOptions { cache_file: Some("c".into()), kill_cache: true, ..opts() };
        assert!(o.validate(&cfg, &w).is_ok());
        assert!(matches!(opts().validate(&ParserConfig::default(), &w), Err(DemangleError::AuditDisabled)));
        assert!(matches!(opts().validate(&cfg, &WeightVector::new(4, 0).unwrap()), Err(DemangleError::NoWeights)));
        let o = DemangleOptions { interactions: vec!["a".into()], ..opts() };
        assert!(matches!(o.validate(&cfg, &w), Err(DemangleError::Config(_))));
        assert!(matches!(Demangler::new(&o, &cfg, w, Vec::new()), Err(DemangleError::Config(_))));
    }

    #[test]
    fn test_reports_and_zeroes_base_feature() {
        let ex_line = "|a x:2 y";
        let mut ex = parse(ex_line);
        let seed = HashMode::Strings.namespace_seed(b"a");
        let mut w = WeightVector::new(18, 0).unwrap();
        w.set(hash_string(b"x", seed), 0.75);
        w.set(12345, 1.0);

        let mut d = Demangler::new(&opts(), &audited(), w, Vec::new()).unwrap();
        assert!(!d.process(&mut ex).unwrap());
        assert_eq!(d.found(), 1);
        assert!(!d.process(&mut ex).unwrap());
        assert_eq!(d.found(), 1);
        let (w, out) = output(d);
        assert_eq!(out, "a^x,0.75\n");
        assert_eq!(w.get(hash_string(b"x", seed)), 0.0);
        assert_eq!(w.count_nonzero(), 1);
    }

    #[test]
    fn test_gravity_and_contraction() {
        let mut ex = parse("| x");
        let mut w = WeightVector::new(18, 0).unwrap();
        w.set(hash_string(b"x", 0), -0.5);
        let o = DemangleOptions { gravity: 0.25, contraction: 2.0, ..opts() };
        let mut d = Demangler::new(&o, &audited(), w, Vec::new()).unwrap();
        assert!(d.process(&mut ex).unwrap());
        let (_, out) = output(d);
        assert_eq!(out, "x,-0.5\n");
    }

    #[test]
    fn test_interaction_names_are_joined() {
        let mut ex = parse("|a x |b y");
        let ia = ex.namespace(b'a').features[0].index;
        let ib = ex.namespace(b'b').features[0].index;
        let crossed = ia.wrapping_mul(crate::hash::FNV_PRIME) ^ ib;
        let mut w = WeightVector::new(18, 0).unwrap();
        w.set(crossed, 0.5);
        let o = DemangleOptions { interactions: vec!["ab".into()], ..opts() };
        let mut d = Demangler::new(&o, &audited(), w, Vec::new()).unwrap();
        assert!(d.process(&mut ex).unwrap());
        let (_, out) = output(d);
        assert_eq!(out, "a^x*b^y,0.5\n");
    }

    #[test]
    fn test_class_replicas_use_strided_offsets() {
        let mut ex = parse("| x");
        let h = hash_string(b"x", 0);
        let mut w = WeightVector::new(18, 2).unwrap();
        w.set(h, 1.0);
        w.set(h.wrapping_add(8), 2.0);
        let o = DemangleOptions { oaa: Some(3), ..opts() };
        let mut d = Demangler::new(&o, &audited(), w, Vec::new()).unwrap();
        assert!(d.process(&mut ex).unwrap());
        assert_eq!(ex.ft_offset, 0);
        let (_, out) = output(d);
        assert_eq!(out, "0:x,1\n2:x,2\n");
    }

    #[test]
    fn test_non_printable_space_is_escaped() {
        let rec = AuditRecord { space: vec![0x84, b'z'], name: b"n".to_vec(), index: 0, value: 1.0 };
        assert_eq!(display_name(&rec), "\\x84z^n");
        let rec = AuditRecord { space: b" ".to_vec(), name: b"n".to_vec(), index: 0, value: 1.0 };
        assert_eq!(display_name(&rec), "n");
    }

    #[test]
    fn test_progress_doubles_and_closes_at_full() {
        let mut ex = parse("| x");
        let mut w = WeightVector::new(18, 0).unwrap();
        w.set(hash_string(b"x", 0), 1.0);
        w.set(hash_string(b"never", 0), 1.0);
        w.set(hash_string(b"absent", 0), 1.0);
        let mut d = Demangler::new(&opts(), &audited(), w, Vec::new()).unwrap();

        d.learn(&mut ex).unwrap();
        assert!(!d.finish_example());
        for _ in 1..8 {
            assert!(!d.finish_example());
        }
        let at = |p: &[Progress]| p.iter().map(|l| l.examples).collect::<Vec<_>>();
        assert_eq!(at(d.progress()), vec![1, 2, 4, 8]);
        assert!(d.progress().iter().all(|l| l.found == 1 && l.percent == 33));

        // last two weights found at example 9, between reports
        let mut rest = parse("| never absent");
        d.learn(&mut rest).unwrap();
        assert!(d.finish_example());
        assert!(d.is_done());
        assert_eq!(d.progress().last(), Some(&Progress { examples: 9, found: 3, percent: 100 }));
        assert_eq!(d.progress().len(), 5);

        // done is sticky and the closing line is not repeated
        assert!(d.finish_example());
        assert_eq!(d.progress().len(), 5);
    }

    #[test]
    fn test_closing_line_not_duplicated_on_report_boundary() {
        let mut ex = parse("| x");
        let mut w = WeightVector::new(18, 0).unwrap();
        w.set(hash_string(b"x", 0), 1.0);
        let mut d = Demangler::new(&opts(), &audited(), w, Vec::new()).unwrap();
        assert!(d.process(&mut ex).unwrap());
        assert_eq!(d.progress(), &[Progress { examples: 1, found: 1, percent: 100 }]);
    }

    #[test]
    fn test_run_demangle_stops_when_all_found() {
        let seed = HashMode::Strings.namespace_seed(b"a");
        let mut w = WeightVector::new(18, 0).unwrap();
        w.set(hash_string(b"x", seed), 1.0);
        w.set(hash_string(b"y", seed), 1.0);
        let input = "|a x\n|a y\n|a z\n|a w\n";
        let mut d = Demangler::new(&opts(), &audited(), w, Vec::new()).unwrap();
        let summary = run_demangle(&mut d, &audited(), &NoLabelParser, io::Cursor::new(input)).unwrap();
        assert_eq!(summary, DemangleSummary { examples: 2, found: 2, weights_loaded: 2, completed: true });
    }
}
