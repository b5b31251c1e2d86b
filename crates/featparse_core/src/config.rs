// config.rs: parser configuration (file format, decoded tables) and cache/loader
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::dictionary::FeatureDict;
use crate::error::{ConfigError, ConfigResult};
use crate::hash::HashMode;

// ---------------- File format ----------------

/// JSON configuration as written by users.
///
/// ```json
/// { "hash": "strings", "audit": true, "redefine": ["N:=abc"],
///   "affix": "+2a,-3b", "spelling": ["a", "_"],
///   "dictionaries": { "w": ["words.dict"] } }
/// ```
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ParserConfigFile {
    #[serde(default)]
    pub hash: Option<HashMode>,
    #[serde(default)]
    pub audit: bool,
    #[serde(default)]
    pub redefine: Vec<String>,
    #[serde(default)]
    pub affix: Option<String>,
    #[serde(default)]
    pub spelling: Vec<String>,
    /// namespace -> dictionary files, relative to the config file.
    #[serde(default)]
    pub dictionaries: HashMap<String, Vec<String>>,
}

// ---------------- Decoded tables ----------------

/// One affix feature request: the first or last `len` bytes of a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AffixSpec {
    pub prefix: bool,
    pub len: u8,
}

impl AffixSpec {
    /// The packed 4-bit form, which also selects the index-mixing constant.
    #[inline]
    pub fn code(self) -> u32 {
        ((self.len as u32) << 1) | (self.prefix as u32)
    }

    fn from_code(code: u32) -> Self {
        Self { prefix: code & 0x1 == 1, len: ((code >> 1) & 0x7) as u8 }
    }
}

/// Parse `"+2a,-3b,1"`: optional sign (default prefix), length 1..=7,
/// optional namespace (default ' '). Returns per-namespace lists in the
/// order features are derived.
pub fn parse_affix_spec(spec: &str) -> ConfigResult<Vec<Vec<AffixSpec>>> {
    let bad = |message: &str| ConfigError::Affix { spec: spec.to_string(), message: message.to_string() };
    let mut packed = [0u32; 256];
    let mut counts = [0usize; 256];

    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let bytes = part.as_bytes();
        let (prefix, rest) = match bytes[0] {
            b'+' => (true, &bytes[1..]),
            b'-' => (false, &bytes[1..]),
            _ => (true, bytes),
        };
        let len = match rest.first() {
            Some(&c) if (b'1'..=b'7').contains(&c) => c - b'0',
            _ => return Err(bad("length must be 1..7")),
        };
        let ns = match rest.len() {
            1 => b' ',
            2 => rest[1],
            _ => return Err(bad("expected a single namespace letter")),
        };
        counts[ns as usize] += 1;
        if counts[ns as usize] > 8 {
            return Err(bad("at most 8 affixes per namespace"));
        }
        let code = AffixSpec { prefix, len }.code();
        packed[ns as usize] = (packed[ns as usize] << 4) | code;
    }

    let mut out = vec![Vec::new(); 256];
    for (ns, &bits) in packed.iter().enumerate() {
        let mut bits = bits;
        while bits > 0 {
            out[ns].push(AffixSpec::from_code(bits & 0xF));
            bits >>= 4;
        }
    }
    Ok(out)
}

/// Build a namespace redefinition table from `"N:=S"` specs. `S` lists the
/// namespaces renamed to `N`; `:` in `S` matches every namespace, an empty `S`
/// means the default namespace, an empty `N` means the default namespace.
pub fn parse_redefine(specs: &[String]) -> ConfigResult<Box<[u8; 256]>> {
    let mut table = Box::new([0u8; 256]);
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = i as u8;
    }
    for spec in specs {
        let op = spec.find(":=").ok_or_else(|| ConfigError::Redefine {
            spec: spec.clone(),
            message: "valid format is N:=S, :=S or N:=".to_string(),
        })?;
        let target = spec.as_bytes()[..op].first().copied().unwrap_or(b' ');
        if op > 1 {
            warn!(spec = %spec, "multiple namespaces before :=, only the first is used");
        }
        let sources = &spec.as_bytes()[op + 2..];
        if sources.is_empty() {
            table[b' ' as usize] = target;
            continue;
        }
        for &c in sources {
            if c == b':' {
                table.iter_mut().for_each(|slot| *slot = target);
                break;
            }
            table[c as usize] = target;
        }
    }
    Ok(table)
}

fn namespace_byte(name: &str) -> ConfigResult<u8> {
    match name.as_bytes() {
        [b'_'] => Ok(b' '),
        [c] => Ok(*c),
        _ => Err(ConfigError::NamespaceName(name.to_string())),
    }
}

// ---------------- Runtime configuration ----------------

/// Everything the scanner needs besides the line itself.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub hash_mode: HashMode,
    pub audit: bool,
    redefine: Option<Box<[u8; 256]>>,
    affixes: Vec<Vec<AffixSpec>>,
    spelling: [bool; 256],
    dictionaries: Vec<Vec<Arc<FeatureDict>>>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            hash_mode: HashMode::default(),
            audit: false,
            redefine: None,
            affixes: vec![Vec::new(); 256],
            spelling: [false; 256],
            dictionaries: vec![Vec::new(); 256],
        }
    }
}

impl ParserConfig {
    #[must_use]
    pub fn with_audit(mut self, audit: bool) -> Self {
        self.audit = audit;
        self
    }

    #[must_use]
    pub fn with_hash_mode(mut self, mode: HashMode) -> Self {
        self.hash_mode = mode;
        self
    }

    pub fn with_redefine(mut self, specs: &[String]) -> ConfigResult<Self> {
        self.redefine = if specs.is_empty() { None } else { Some(parse_redefine(specs)?) };
        Ok(self)
    }

    pub fn with_affixes(mut self, spec: &str) -> ConfigResult<Self> {
        self.affixes = parse_affix_spec(spec)?;
        Ok(self)
    }

    /// Enable spelling features; `"_"` names the default namespace.
    pub fn with_spelling(mut self, namespaces: &[String]) -> ConfigResult<Self> {
        for ns in namespaces {
            let first = ns.chars().next().map(|c| c.to_string()).unwrap_or_default();
            self.spelling[namespace_byte(&first)? as usize] = true;
        }
        Ok(self)
    }

    #[must_use]
    pub fn with_dictionary(mut self, namespace: u8, dict: Arc<FeatureDict>) -> Self {
        self.dictionaries[namespace as usize].push(dict);
        self
    }

    #[inline]
    pub fn redefine(&self, index: u8) -> u8 {
        match &self.redefine {
            Some(table) => table[index as usize],
            None => index,
        }
    }

    #[inline]
    pub fn affixes(&self, index: u8) -> &[AffixSpec] {
        &self.affixes[index as usize]
    }

    #[inline]
    pub fn spelling(&self, index: u8) -> bool {
        self.spelling[index as usize]
    }

    #[inline]
    pub fn dictionaries(&self, index: u8) -> &[Arc<FeatureDict>] {
        &self.dictionaries[index as usize]
    }

    /// Compile a file config. Dictionary paths are resolved against `base_dir`;
    /// a file named by several namespaces is loaded once.
    pub fn from_file_config(file: ParserConfigFile, base_dir: Option<&Path>) -> ConfigResult<Self> {
        let mut cfg = ParserConfig::default()
            .with_audit(file.audit)
            .with_hash_mode(file.hash.unwrap_or_default())
            .with_redefine(&file.redefine)?
            .with_spelling(&file.spelling)?;
        if let Some(affix) = file.affix.as_deref() {
            cfg = cfg.with_affixes(affix)?;
        }

        let mut loaded: HashMap<PathBuf, Arc<FeatureDict>> = HashMap::new();
        let mut namespaces: Vec<(&String, &Vec<String>)> = file.dictionaries.iter().collect();
        namespaces.sort();
        for (ns, paths) in namespaces {
            let index = namespace_byte(ns)?;
            for p in paths {
                let path = match base_dir {
                    Some(dir) => dir.join(p),
                    None => PathBuf::from(p),
                };
                let dict = match loaded.get(&path) {
                    Some(d) => d.clone(),
                    None => {
                        let d = Arc::new(FeatureDict::from_path(&path, &cfg)?);
                        loaded.insert(path, d.clone());
                        d
                    }
                };
                cfg = cfg.with_dictionary(index, dict);
            }
        }
        Ok(cfg)
    }
}

pub fn config_from_json(json: &str, base_dir: Option<&Path>) -> ConfigResult<ParserConfig> {
    let file: ParserConfigFile = serde_json::from_str(json)?;
    ParserConfig::from_file_config(file, base_dir)
}

// ---------------- Cache ----------------

pub struct LoadedConfig {
    pub path: String,
    pub mtime: Option<SystemTime>,
    pub config: ParserConfig,
}

pub static CONFIG_CACHE: Lazy<RwLock<Option<LoadedConfig>>> = Lazy::new(|| RwLock::new(None));

fn read_mtime(path: &Path) -> Option<SystemTime> { fs::metadata(path).ok().and_then(|m| m.modified().ok()) }

pub fn load_config_internal(config_path: &str) -> ConfigResult<LoadedConfig> {
    let path = Path::new(config_path);
    let data = fs::read_to_string(path)
        .map_err(|e| ConfigError::Io { path: config_path.to_string(), message: e.to_string() })?;
    let config = config_from_json(&data, path.parent())?;
    let mtime = read_mtime(path);
    debug!(path = config_path, "loaded parser config");
    Ok(LoadedConfig { path: config_path.to_string(), mtime, config })
}

/// Load `config_path` into [`CONFIG_CACHE`] unless the cached copy has the
/// same path and modification time.
pub fn ensure_config_loaded(config_path: &str) -> ConfigResult<()> {
    let mut guard = CONFIG_CACHE.write().unwrap_or_else(|e| e.into_inner());
    let need_reload = match guard.as_ref() {
        None => true,
        Some(lc) => {
            if lc.path != config_path { true } else {
                let current = read_mtime(Path::new(config_path));
                current != lc.mtime
            }
        }
    };
    if need_reload {
        let loaded = load_config_internal(config_path)?;
        *guard = Some(loaded);
    }
    Ok(())
}
