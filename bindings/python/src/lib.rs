// PyO3 bindings for featparse_core
use once_cell::sync::Lazy;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList, PyModule};
use std::io::BufReader;
use std::time::Instant;

use featparse_core as core;

use core::{Example, Feature, LoadedConfig, ParserConfig, SimpleLabel, SimpleLabelParser, CONFIG_CACHE};

// Parallel iterators for batch parsing
use rayon::prelude::*;

// Used when no config has been loaded: default hashing, auditing on.
static DEFAULT_CONFIG: Lazy<ParserConfig> = Lazy::new(|| ParserConfig::default().with_audit(true));

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Owned copy of one parsed line, so the `Example` buffers can be reused.
struct ParsedLine {
    label: SimpleLabel,
    tag: Option<String>,
    namespaces: Vec<ParsedNamespace>,
    warnings: Vec<String>,
    runtime_ns: u128,
}

struct ParsedNamespace {
    index: u8,
    sum_feat_sq: f32,
    features: Vec<Feature>,
    // (space, name) per feature when auditing
    audit: Vec<(String, String)>,
}

fn parse_into(cfg: &ParserConfig, ex: &mut Example<SimpleLabel>, line: &str) -> ParsedLine {
    let t0 = Instant::now();
    ex.clear();
    let report = core::parse_example(cfg, &SimpleLabelParser, core::strip_line(line.as_bytes()), ex, 0);
    let namespaces = ex
        .iter_namespaces()
        .map(|(index, ns)| ParsedNamespace {
            index,
            sum_feat_sq: ns.sum_feat_sq,
            features: ns.features.clone(),
            audit: ns.audit.iter().map(|rec| (lossy(&rec.space), rec.name_lossy())).collect(),
        })
        .collect();
    ParsedLine {
        label: ex.label,
        tag: (!ex.tag.is_empty()).then(|| lossy(&ex.tag)),
        namespaces,
        warnings: report.warnings.iter().map(|w| w.to_string()).collect(),
        runtime_ns: t0.elapsed().as_nanos(),
    }
}

fn parsed_to_dict<'py>(py: Python<'py>, p: ParsedLine) -> PyResult<Bound<'py, PyDict>> {
    let d = PyDict::new(py);
    d.set_item("label", p.label.label)?;
    d.set_item("weight", p.label.weight)?;
    d.set_item("initial", p.label.initial)?;
    d.set_item("tag", p.tag)?;

    let namespaces = PyList::empty(py);
    for ns in p.namespaces {
        let nd = PyDict::new(py);
        nd.set_item("index", ns.index)?;
        nd.set_item("sum_feat_sq", ns.sum_feat_sq)?;
        let features = PyList::empty(py);
        for (i, f) in ns.features.iter().enumerate() {
            let fd = PyDict::new(py);
            fd.set_item("index", f.index)?;
            fd.set_item("value", f.value)?;
            if let Some((space, name)) = ns.audit.get(i) {
                fd.set_item("space", space)?;
                fd.set_item("name", name)?;
            }
            features.append(fd)?;
        }
        nd.set_item("features", features)?;
        namespaces.append(nd)?;
    }
    d.set_item("namespaces", namespaces)?;
    d.set_item("warnings", p.warnings)?;
    d.set_item("runtime_ns", p.runtime_ns)?;
    Ok(d)
}

/// Load a parser config from a JSON file path. Returns True on success.
/// Raises ValueError if the file or a dictionary it names cannot be read or parsed.
#[pyfunction]
#[pyo3(text_signature = "(config_path)")]
fn load_config(config_path: &str) -> PyResult<bool> {
    match core::load_config_internal(config_path) {
        Ok(loaded) => {
            let mut guard = CONFIG_CACHE.write().unwrap();
            *guard = Some(loaded);
            Ok(true)
        }
        Err(e) => Err(PyValueError::new_err(e.to_string())),
    }
}

/// Set the parser config from a JSON string. Dictionary paths are taken as given.
#[pyfunction]
#[pyo3(text_signature = "(config_json)")]
fn set_config_json(config_json: &str) -> PyResult<bool> {
    let config = core::config_from_json(config_json, None).map_err(|e| PyValueError::new_err(e.to_string()))?;
    let mut guard = CONFIG_CACHE.write().unwrap();
    *guard = Some(LoadedConfig { path: String::new(), mtime: None, config });
    Ok(true)
}

/// Return current config loader status and metadata.
#[pyfunction]
#[pyo3(text_signature = "()")]
fn get_config_status(py: Python) -> PyResult<Py<PyDict>> {
    use std::time::SystemTime;
    let guard = CONFIG_CACHE.read().unwrap();
    let d = PyDict::new(py);
    match guard.as_ref() {
        Some(lc) => {
            d.set_item("loaded", true)?;
            if lc.path.is_empty() {
                d.set_item("path", py.None())?;
                d.set_item("source", "json")?;
            } else {
                d.set_item("path", lc.path.clone())?;
                d.set_item("source", "file")?;
            }
            match lc.mtime.and_then(|mt| mt.duration_since(SystemTime::UNIX_EPOCH).ok()) {
                Some(dur) => {
                    let ms: i64 = (dur.as_secs() as i64) * 1000 + (dur.subsec_millis() as i64);
                    d.set_item("mtime_epoch_ms", ms)?;
                }
                None => d.set_item("mtime_epoch_ms", py.None())?,
            }
            d.set_item("audit", lc.config.audit)?;
            d.set_item("hash", format!("{:?}", lc.config.hash_mode).to_lowercase())?;
        }
        None => {
            d.set_item("loaded", false)?;
            d.set_item("path", py.None())?;
            d.set_item("source", py.None())?;
            d.set_item("mtime_epoch_ms", py.None())?;
        }
    }
    Ok(d.unbind())
}

/// Split a raw line into label words, tag and the feature text starting at the first '|'.
#[pyfunction]
#[pyo3(text_signature = "(line)")]
fn split_example(py: Python, line: &str) -> PyResult<Py<PyDict>> {
    let split = core::split_example(core::strip_line(line.as_bytes()));
    let d = PyDict::new(py);
    let labels: Vec<String> = split.label_words.iter().map(|w| lossy(w)).collect();
    d.set_item("labels", labels)?;
    d.set_item("tag", split.tag.map(lossy))?;
    d.set_item("features", lossy(split.features))?;
    Ok(d.unbind())
}

/// Hash a feature name. The seed comes from `namespace` (None for the default namespace).
#[pyfunction]
#[pyo3(signature = (name, namespace=None, mode="strings"))]
fn hash_feature(name: &str, namespace: Option<&str>, mode: &str) -> PyResult<u32> {
    let mode: core::HashMode = mode.parse().map_err(|e: core::ConfigError| PyValueError::new_err(e.to_string()))?;
    let seed = namespace.map_or(0, |ns| mode.namespace_seed(ns.as_bytes()));
    Ok(mode.hash(name.as_bytes(), seed))
}

/// Parse one example line with the loaded config (or the default audited one).
/// Returns label, tag, namespaces with their features, and any warnings.
#[pyfunction]
#[pyo3(text_signature = "(line)")]
fn parse_line(py: Python, line: &str) -> PyResult<Py<PyDict>> {
    let guard = CONFIG_CACHE.read().unwrap();
    let cfg = guard.as_ref().map(|lc| &lc.config).unwrap_or(&*DEFAULT_CONFIG);
    let mut ex = Example::new();
    Ok(parsed_to_dict(py, parse_into(cfg, &mut ex, line))?.unbind())
}

/// Parse a batch of lines in parallel and return one dict per line.
/// Heavy parsing happens in Rayon workers, each reusing one Example;
/// Python dicts are built afterwards.
#[pyfunction]
#[pyo3(text_signature = "(lines)")]
fn parse_batch(py: Python, lines: Vec<String>) -> PyResult<Vec<Py<PyDict>>> {
    let guard = CONFIG_CACHE.read().unwrap();
    let cfg = guard.as_ref().map(|lc| &lc.config).unwrap_or(&*DEFAULT_CONFIG);

    let mids: Vec<ParsedLine> = lines
        .par_iter()
        .map_init(Example::<SimpleLabel>::new, |ex, line| parse_into(cfg, ex, line))
        .collect();

    let mut out: Vec<Py<PyDict>> = Vec::with_capacity(mids.len());
    for p in mids {
        out.push(parsed_to_dict(py, p)?.unbind());
    }
    Ok(out)
}

/// Demangle `weights` against the examples in `input_path`, writing
/// `name,value` lines to `output_path` (gzip when it ends in .gz).
/// `options_json` carries the remaining DemangleOptions fields.
/// Returns the run summary and the weights left over.
#[pyfunction]
#[pyo3(signature = (input_path, output_path, weights, options_json=None, stride_shift=0))]
fn demangle_file(
    py: Python,
    input_path: &str,
    output_path: &str,
    weights: Vec<f32>,
    options_json: Option<&str>,
    stride_shift: u32,
) -> PyResult<Py<PyDict>> {
    let mut opts: core::DemangleOptions = match options_json {
        Some(json) => serde_json::from_str(json).map_err(|e| PyValueError::new_err(e.to_string()))?,
        None => core::DemangleOptions::default(),
    };
    opts.output_path = output_path.to_string();

    let weights = core::WeightVector::from_vec(weights, stride_shift)
        .ok_or_else(|| PyValueError::new_err("weights length must be a power of two holding at least one stride"))?;
    let guard = CONFIG_CACHE.read().unwrap();
    let cfg = guard.as_ref().map(|lc| &lc.config).unwrap_or(&*DEFAULT_CONFIG);

    let infile = std::fs::File::open(input_path).map_err(|e| PyValueError::new_err(e.to_string()))?;
    let (summary, weights) =
        core::demangle_file(&opts, cfg, &SimpleLabelParser, weights, BufReader::new(infile))
            .map_err(|e| PyValueError::new_err(e.to_string()))?;

    let d = PyDict::new(py);
    d.set_item("examples", summary.examples)?;
    d.set_item("found", summary.found)?;
    d.set_item("weights_loaded", summary.weights_loaded)?;
    d.set_item("completed", summary.completed)?;
    d.set_item("weights", weights.into_vec())?;
    Ok(d.unbind())
}

#[pymodule]
#[pyo3(module = "featparse_rs")]
fn featparse_rs(_py: Python, m: &Bound<PyModule>) -> PyResult<()> {
    m.add(
        "__doc__",
        "Fast text-example parsing into hashed sparse features.\n\n\
        Features:\n\
        - Namespaced feature lines with labels and tags\n\
        - Affix, spelling and dictionary features\n\
        - Demangling of trained weights back to feature names\n\n\
        Quick start:\n\
        >>> import featparse_rs as fp\n\
        >>> fp.set_config_json('{\"audit\": true, \"affix\": \"+3a\"}')\n\
        >>> ex = fp.parse_line('1 |a hello world:2')\n\
        >>> print(ex['namespaces'])",
    )?;

    // Config APIs
    m.add_function(wrap_pyfunction!(load_config, m)?)?;
    m.add_function(wrap_pyfunction!(set_config_json, m)?)?;
    m.add_function(wrap_pyfunction!(get_config_status, m)?)?;

    // Parsing APIs
    m.add_function(wrap_pyfunction!(split_example, m)?)?;
    m.add_function(wrap_pyfunction!(hash_feature, m)?)?;
    m.add_function(wrap_pyfunction!(parse_line, m)?)?;
    m.add_function(wrap_pyfunction!(parse_batch, m)?)?;

    // Demangling
    m.add_function(wrap_pyfunction!(demangle_file, m)?)?;

    // Optional: preload a config from env var for a faster startup in hot paths.
    if let Ok(path) = std::env::var("FEATPARSE_PRELOAD_CONFIG") {
        if let Ok(loaded) = core::load_config_internal(&path) {
            let mut guard = CONFIG_CACHE.write().unwrap();
            *guard = Some(loaded);
        }
    }

    Ok(())
}
