//! # Léxico de Sentimento
//!
//! Mapeia índices de termo para uma polaridade conhecida a priori (ex: dicionário
//! Lexicoder já stemizado). É a única fonte de supervisão do JST: palavras do léxico
//! recebem massa de prior elevada no rótulo correspondente; as demais começam neutras
//! e se associam a qualquer rótulo apenas pela coocorrência no corpus.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{JstError, Result};
use crate::matrix::Vocabulary;
use crate::sentiment::Sentiment;

/// Peso padrão do rótulo correspondente (fração da massa de prior da palavra).
pub const DEFAULT_LEXICON_WEIGHT: f64 = 0.9;

/// Uma entrada do léxico já resolvida para o vocabulário.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LexiconEntry {
    pub sentiment: Sentiment,
    /// $\lambda \in (0, 1)$: fração da massa total do prior da palavra que vai para
    /// o rótulo correspondente.
    pub weight: f64,
}

/// Léxico indexado por termo do vocabulário. Imutável após a construção.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Lexicon {
    entries: HashMap<usize, LexiconEntry>,
    /// Termos do dicionário que não existem no vocabulário.
    skipped: usize,
}

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insere diretamente por índice de termo.
    pub fn insert(&mut self, term: usize, sentiment: Sentiment, weight: f64) -> Result<()> {
        if !(weight > 0.0 && weight < 1.0) {
            return Err(JstError::InvalidConfig(format!(
                "peso do léxico deve estar em (0, 1), recebido {weight}"
            )));
        }
        self.entries.insert(term, LexiconEntry { sentiment, weight });
        Ok(())
    }

    /// Resolve pares `(termo, polaridade)` contra o vocabulário com o peso padrão.
    ///
    /// Termos ausentes do vocabulário são ignorados e contados em [`Lexicon::skipped`].
    pub fn from_terms<'a, I>(vocab: &Vocabulary, terms: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, Sentiment)>,
    {
        Self::from_weighted_terms(
            vocab,
            terms.into_iter().map(|(t, s)| (t, s, DEFAULT_LEXICON_WEIGHT)),
        )
    }

    pub fn from_weighted_terms<'a, I>(vocab: &Vocabulary, terms: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, Sentiment, f64)>,
    {
        let mut lexicon = Self::new();
        for (term, sentiment, weight) in terms {
            match vocab.get(term) {
                Some(idx) => lexicon.insert(idx, sentiment, weight)?,
                None => lexicon.skipped += 1,
            }
        }
        if lexicon.skipped > 0 {
            warn!(
                skipped = lexicon.skipped,
                matched = lexicon.len(),
                "termos do léxico ausentes do vocabulário"
            );
        }
        Ok(lexicon)
    }

    pub fn get(&self, term: usize) -> Option<&LexiconEntry> {
        self.entries.get(&term)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Maior índice de termo referenciado, para validar contra o tamanho do vocabulário.
    pub fn max_term(&self) -> Option<usize> {
        self.entries.keys().copied().max()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &LexiconEntry)> {
        self.entries.iter().map(|(&t, e)| (t, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_terms_are_skipped() {
        let vocab = Vocabulary::from_terms(["bom", "ruim", "mesa"]);
        let lex = Lexicon::from_terms(
            &vocab,
            vec![("bom", Sentiment::Positive), ("ruim", Sentiment::Negative), ("ótimo", Sentiment::Positive)],
        )
        .unwrap();
        assert_eq!(lex.len(), 2);
        assert_eq!(lex.skipped(), 1);
        assert_eq!(lex.get(0).unwrap().sentiment, Sentiment::Positive);
        assert!(lex.get(2).is_none());
    }

    #[test]
    fn test_weight_bounds() {
        let mut lex = Lexicon::new();
        assert!(lex.insert(0, Sentiment::Positive, 1.0).is_err());
        assert!(lex.insert(0, Sentiment::Positive, 0.0).is_err());
        assert!(lex.insert(0, Sentiment::Positive, 0.5).is_ok());
        assert_eq!(lex.max_term(), Some(0));
    }
}
