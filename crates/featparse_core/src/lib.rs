// featparse_core: pure Rust library turning text examples into hashed sparse features and demangling trained weights.
pub mod config;
pub mod demangle;
pub mod dictionary;
pub mod error;
pub mod example;
pub mod hash;
pub mod interactions;
pub mod label;
pub mod parser;
pub mod tokenizer;
pub mod weights;

pub use config::{
    config_from_json, ensure_config_loaded, load_config_internal, AffixSpec, LoadedConfig, ParserConfig,
    ParserConfigFile, CONFIG_CACHE,
};
pub use demangle::{
    demangle_file, format_g, open_output, run_demangle, DemangleOptions, DemangleSummary, Demangler, OutputSink,
    Progress,
};
pub use dictionary::FeatureDict;
pub use error::{ConfigError, ConfigResult, DemangleError, LabelError};
pub use example::{AuditRecord, Example, Feature, Namespace};
pub use hash::{hash_all, hash_string, uniform_hash, HashMode};
pub use interactions::{generate_interactions, InteractionVisitor, Interactions};
pub use label::{LabelParser, NoLabelParser, SimpleLabel, SimpleLabelParser};
pub use parser::{parse_example, read_line, ParseReport, ParseWarning};
pub use tokenizer::{split_example, strip_line, SplitExample};
pub use weights::WeightVector;
