//! # Adaptador de Matriz Documento-Termo
//!
//! O amostrador não conhece texto: ele recebe uma matriz esparsa de contagens
//! (documento × termo) e um vocabulário que associa cada índice de coluna a um termo.
//! Tokenização, stemming e leitura de corpus ficam fora deste crate.
//!
//! ## Representação
//!
//! Cada linha guarda apenas as entradas não nulas, ordenadas por índice de termo:
//!
//! ```text
//! doc 0: [(3, 2), (7, 1)]   → termo 3 aparece 2x, termo 7 aparece 1x
//! doc 1: []                 → documento vazio
//! ```
//!
//! A matriz é imutável depois de construída e pode ser compartilhada entre threads
//! por referência.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{JstError, Result};

/// Vocabulário: índice de coluna ⇄ termo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    terms: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Vocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_terms<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut vocab = Self::new();
        for t in terms {
            vocab.insert(t.into());
        }
        vocab
    }

    /// Insere o termo (se ainda não existir) e retorna seu índice.
    pub fn insert(&mut self, term: String) -> usize {
        if let Some(&idx) = self.index.get(&term) {
            return idx;
        }
        let idx = self.terms.len();
        self.index.insert(term.clone(), idx);
        self.terms.push(term);
        idx
    }

    pub fn get(&self, term: &str) -> Option<usize> {
        if self.index.len() != self.terms.len() {
            // Vocabulário desserializado: índice ainda não reconstruído
            return self.terms.iter().position(|t| t == term);
        }
        self.index.get(term).copied()
    }

    pub fn term(&self, idx: usize) -> Option<&str> {
        self.terms.get(idx).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Matriz documento-termo esparsa com contagens inteiras.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentTermMatrix {
    /// Identificadores dos documentos, na ordem das linhas.
    doc_ids: Vec<String>,
    /// Linhas esparsas: `(índice do termo, contagem)` com contagem > 0.
    rows: Vec<Vec<(usize, u32)>>,
    n_terms: usize,
}

impl DocumentTermMatrix {
    /// Constrói a matriz a partir de triplas `(documento, termo, contagem)`.
    ///
    /// Triplas repetidas são somadas e contagens zero são descartadas.
    /// Índices fora do intervalo são erro de dados.
    pub fn from_triplets<I>(doc_ids: Vec<String>, n_terms: usize, triplets: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, u32)>,
    {
        let n_docs = doc_ids.len();
        let mut acc: Vec<BTreeMap<usize, u32>> = vec![BTreeMap::new(); n_docs];

        for (d, t, c) in triplets {
            if d >= n_docs {
                return Err(JstError::Data(format!(
                    "documento {d} fora do intervalo (total {n_docs})"
                )));
            }
            if t >= n_terms {
                return Err(JstError::Data(format!(
                    "termo {t} fora do intervalo (vocabulário com {n_terms})"
                )));
            }
            if c > 0 {
                *acc[d].entry(t).or_insert(0) += c;
            }
        }

        let rows = acc.into_iter().map(|m| m.into_iter().collect()).collect();
        Ok(Self { doc_ids, rows, n_terms })
    }

    /// Constrói a matriz a partir de linhas densas. Todas as linhas devem ter o mesmo tamanho.
    pub fn from_dense(doc_ids: Vec<String>, dense: &[Vec<u32>]) -> Result<Self> {
        if doc_ids.len() != dense.len() {
            return Err(JstError::DimensionMismatch {
                what: "identificadores de documento",
                expected: dense.len(),
                found: doc_ids.len(),
            });
        }
        let n_terms = dense.first().map(|r| r.len()).unwrap_or(0);
        let mut triplets = Vec::new();
        for (d, row) in dense.iter().enumerate() {
            if row.len() != n_terms {
                return Err(JstError::DimensionMismatch {
                    what: "colunas da matriz densa",
                    expected: n_terms,
                    found: row.len(),
                });
            }
            triplets.extend(row.iter().enumerate().map(|(t, &c)| (d, t, c)));
        }
        Self::from_triplets(doc_ids, n_terms, triplets)
    }

    /// Monta matriz e vocabulário a partir de documentos já tokenizados.
    ///
    /// Os termos são indexados na ordem de primeira aparição. Nenhuma normalização
    /// é aplicada: o chamador entrega tokens já em caixa baixa/stemizados.
    pub fn from_tokenized<S: AsRef<str>>(
        documents: &[(String, Vec<S>)],
    ) -> Result<(Self, Vocabulary)> {
        let mut vocab = Vocabulary::new();
        let mut triplets = Vec::new();
        for (d, (_, tokens)) in documents.iter().enumerate() {
            for tok in tokens {
                let t = vocab.insert(tok.as_ref().to_string());
                triplets.push((d, t, 1));
            }
        }
        let doc_ids = documents.iter().map(|(id, _)| id.clone()).collect();
        let matrix = Self::from_triplets(doc_ids, vocab.len(), triplets)?;
        Ok((matrix, vocab))
    }

    pub fn n_docs(&self) -> usize {
        self.rows.len()
    }

    pub fn n_terms(&self) -> usize {
        self.n_terms
    }

    pub fn doc_ids(&self) -> &[String] {
        &self.doc_ids
    }

    pub fn row(&self, doc: usize) -> &[(usize, u32)] {
        &self.rows[doc]
    }

    pub fn get(&self, doc: usize, term: usize) -> u32 {
        self.rows
            .get(doc)
            .and_then(|row| row.binary_search_by_key(&term, |&(t, _)| t).ok().map(|i| row[i].1))
            .unwrap_or(0)
    }

    /// Número de tokens (soma das contagens) do documento.
    pub fn doc_len(&self, doc: usize) -> usize {
        self.rows[doc].iter().map(|&(_, c)| c as usize).sum()
    }

    pub fn total_tokens(&self) -> usize {
        (0..self.n_docs()).map(|d| self.doc_len(d)).sum()
    }

    /// Comprimento médio dos documentos, usado nos priors derivados dos dados.
    pub fn avg_doc_len(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.total_tokens() as f64 / self.n_docs() as f64
    }

    /// Expande a linha em uma sequência de ocorrências de tokens (índices de termo).
    ///
    /// É a visão que o amostrador usa: cada ocorrência recebe seu próprio par
    /// (sentimento, tópico).
    pub fn expand_tokens(&self, doc: usize) -> Vec<usize> {
        let mut tokens = Vec::with_capacity(self.doc_len(doc));
        for &(t, c) in &self.rows[doc] {
            tokens.extend(std::iter::repeat(t).take(c as usize));
        }
        tokens
    }
}
