// interactions.rs: crossed features over namespace terms ("ab", "abc", ...)
use crate::error::{ConfigError, ConfigResult};
use crate::example::{AuditRecord, Example};
use crate::hash::FNV_PRIME;

/// Namespace crosses, one byte per namespace index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interactions {
    terms: Vec<Vec<u8>>,
}

impl Interactions {
    /// Every term names at least two namespaces.
    pub fn parse(terms: &[String]) -> ConfigResult<Self> {
        let mut out = Vec::with_capacity(terms.len());
        for term in terms {
            if term.len() < 2 {
                return Err(ConfigError::Interaction {
                    term: term.clone(),
                    message: "needs at least two namespaces".to_string(),
                });
            }
            out.push(term.as_bytes().to_vec());
        }
        Ok(Self { terms: out })
    }

    pub fn terms(&self) -> &[Vec<u8>] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Receives crossed features.
///
/// `enter`/`leave` bracket each constituent that has an audit record, so a
/// visitor can keep a stack of display names. `feature` gets the product
/// value and the final index with the example's offset already added.
pub trait InteractionVisitor {
    type Error;

    fn enter(&mut self, rec: &AuditRecord);
    fn leave(&mut self);
    fn feature(&mut self, value: f32, index: u32) -> Result<(), Self::Error>;
}

/// Walk every cross of every term, in term order then feature order.
///
/// Index: `((i1 * FNV) ^ i2) * FNV ^ i3 ...`, value: product of the
/// constituents. A namespace crossed with itself yields all ordered pairs.
pub fn generate_interactions<L, V: InteractionVisitor>(
    ex: &Example<L>,
    interactions: &Interactions,
    visitor: &mut V,
) -> Result<(), V::Error> {
    for term in interactions.terms() {
        if term.iter().any(|&ns| ex.namespace(ns).is_empty()) {
            continue;
        }
        cross(ex, term, 0, 0, 1.0, visitor)?;
    }
    Ok(())
}

fn cross<L, V: InteractionVisitor>(
    ex: &Example<L>,
    term: &[u8],
    depth: usize,
    halfhash: u32,
    value: f32,
    visitor: &mut V,
) -> Result<(), V::Error> {
    let ns = ex.namespace(term[depth]);
    let last = depth + 1 == term.len();
    for (i, f) in ns.features.iter().enumerate() {
        let rec = ns.audit.get(i);
        if let Some(rec) = rec {
            visitor.enter(rec);
        }
        let v = value * f.value;
        let result = if last {
            visitor.feature(v, (halfhash ^ f.index).wrapping_add(ex.ft_offset))
        } else {
            cross(ex, term, depth + 1, (halfhash ^ f.index).wrapping_mul(FNV_PRIME), v, visitor)
        };
        if rec.is_some() {
            visitor.leave();
        }
        result?;
    }
    Ok(())
}
