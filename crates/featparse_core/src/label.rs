// label.rs: label parsing capability handed the label words of a line
use crate::error::LabelError;
use crate::tokenizer::parse_float;

/// Turns the label words of a line into a label value.
///
/// Label problems never reject an example: the parser reports a returned
/// error as a warning and keeps the default label.
pub trait LabelParser {
    type Label: Default;

    fn parse_label(&self, words: &[&[u8]], label: &mut Self::Label) -> Result<(), LabelError>;
}

/// `label [importance [initial]]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleLabel {
    /// `None` for an unlabeled example.
    pub label: Option<f32>,
    pub weight: f32,
    pub initial: f32,
}

impl Default for SimpleLabel {
    fn default() -> Self {
        Self { label: None, weight: 1.0, initial: 0.0 }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleLabelParser;

fn float_word(word: &[u8]) -> Result<f32, LabelError> {
    let (v, end) = parse_float(word, 0);
    if end != word.len() || end == 0 {
        return Err(LabelError::MalformedFloat(String::from_utf8_lossy(word).into_owned()));
    }
    Ok(v)
}

impl LabelParser for SimpleLabelParser {
    type Label = SimpleLabel;

    fn parse_label(&self, words: &[&[u8]], label: &mut SimpleLabel) -> Result<(), LabelError> {
        match words {
            [] => Ok(()),
            [l] => {
                label.label = Some(float_word(l)?);
                Ok(())
            }
            [l, w] => {
                label.label = Some(float_word(l)?);
                label.weight = float_word(w)?;
                Ok(())
            }
            [l, w, i] => {
                label.label = Some(float_word(l)?);
                label.weight = float_word(w)?;
                label.initial = float_word(i)?;
                Ok(())
            }
            more => Err(LabelError::TooManyTokens(more.len())),
        }
    }
}

/// Ignores label words entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLabelParser;

impl LabelParser for NoLabelParser {
    type Label = ();

    fn parse_label(&self, _words: &[&[u8]], _label: &mut ()) -> Result<(), LabelError> {
        Ok(())
    }
}
