// example.rs: parsed example container (namespace buckets, audit records, tag, label)
use std::fmt;

use crate::label::SimpleLabel;

/// One hashed feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    pub value: f32,
    pub index: u32,
}

/// Human-readable description of one emitted feature.
///
/// `space` names where the feature came from: the namespace name for base
/// features, or `affix`, `spelling`, `dictionary` for derived ones.
#[derive(Clone, PartialEq)]
pub struct AuditRecord {
    pub space: Vec<u8>,
    pub name: Vec<u8>,
    pub index: u32,
    pub value: f32,
}

impl AuditRecord {
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

impl fmt::Debug for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}^{}:{}:{}",
            String::from_utf8_lossy(&self.space),
            String::from_utf8_lossy(&self.name),
            self.index,
            self.value
        )
    }
}

/// Features of one namespace. `audit` is either empty or the same length as
/// `features`, entry for entry.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    pub features: Vec<Feature>,
    pub audit: Vec<AuditRecord>,
    pub sum_feat_sq: f32,
}

impl Namespace {
    /// Append a feature together with its audit record.
    #[inline]
    pub fn push(&mut self, feature: Feature, audit: Option<AuditRecord>) {
        self.sum_feat_sq += feature.value * feature.value;
        self.features.push(feature);
        if let Some(rec) = audit {
            self.audit.push(rec);
        }
        debug_assert!(self.audit.is_empty() || self.audit.len() == self.features.len());
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    fn clear(&mut self) {
        self.features.clear();
        self.audit.clear();
        self.sum_feat_sq = 0.0;
    }
}

/// A parsed example. The caller owns it and may recycle it with [`Example::clear`].
#[derive(Debug, Clone)]
pub struct Example<L = SimpleLabel> {
    /// Namespace indices in first-seen order.
    pub indices: Vec<u8>,
    namespaces: Vec<Namespace>,
    pub tag: Vec<u8>,
    pub label: L,
    /// Added to every feature index when weights are looked up.
    pub ft_offset: u32,
}

impl<L: Default> Default for Example<L> {
    fn default() -> Self {
        Self {
            indices: Vec::new(),
            namespaces: vec![Namespace::default(); 256],
            tag: Vec::new(),
            label: L::default(),
            ft_offset: 0,
        }
    }
}

impl<L: Default> Example<L> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for reuse, keeping allocated buffers.
    pub fn clear(&mut self) {
        for ns in &mut self.namespaces {
            ns.clear();
        }
        self.indices.clear();
        self.tag.clear();
        self.label = L::default();
        self.ft_offset = 0;
    }
}

impl<L> Example<L> {
    #[inline]
    pub fn namespace(&self, index: u8) -> &Namespace {
        &self.namespaces[index as usize]
    }

    #[inline]
    pub fn namespace_mut(&mut self, index: u8) -> &mut Namespace {
        &mut self.namespaces[index as usize]
    }

    /// Registered namespaces with their features, in index-list order.
    pub fn iter_namespaces(&self) -> impl Iterator<Item = (u8, &Namespace)> + '_ {
        self.indices.iter().map(move |&i| (i, &self.namespaces[i as usize]))
    }

    pub fn num_features(&self) -> usize {
        self.iter_namespaces().map(|(_, ns)| ns.len()).sum()
    }

    pub fn total_sum_feat_sq(&self) -> f32 {
        self.iter_namespaces().map(|(_, ns)| ns.sum_feat_sq).sum()
    }

    pub fn is_registered(&self, index: u8) -> bool {
        self.indices.contains(&index)
    }
}
