//! # Tabelas de Contagem
//!
//! Quatro tabelas mantidas em conjunto, atualizadas a cada troca de atribuição:
//!
//! | Tabela | JST | rJST |
//! |--------|-----|------|
//! | `doc_first` | $n_{ds}$ | $n_{dk}$ |
//! | `doc_pair` | $n_{dsk}$ | $n_{dks}$ |
//! | `word` | $n_{skw}$ | $n_{skw}$ |
//! | `pair_total` | $n_{sk}$ | $n_{sk}$ |
//!
//! "Primeiro nível" é o rótulo amostrado primeiro pela variante do modelo (sentimento no
//! JST, tópico no rJST). Assim uma única estrutura serve às duas variantes.
//!
//! Invariante: depois de **cada** atualização de token,
//! $\sum_w n_{skw} = n_{sk}$, $\sum_g n_{d,f,g} = n_{d,f}$ e $\sum_f n_{d,f} = n_d$.

use ndarray::{Array1, Array2, Array3, ArrayView1, Axis};

use crate::config::ModelKind;
use crate::error::{JstError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct CountTables {
    kind: ModelKind,
    doc_first: Array2<u32>,
    doc_pair: Array3<u32>,
    word: Array3<u32>,
    pair_total: Array2<u32>,
    doc_len: Array1<u32>,
}

impl CountTables {
    /// Tabelas zeradas para `n_docs` documentos, `s` sentimentos, `k` tópicos e `v` termos.
    pub fn zeros(kind: ModelKind, n_docs: usize, s: usize, k: usize, v: usize) -> Self {
        let (f, g) = match kind {
            ModelKind::Jst => (s, k),
            ModelKind::ReversedJst => (k, s),
        };
        Self {
            kind,
            doc_first: Array2::zeros((n_docs, f)),
            doc_pair: Array3::zeros((n_docs, f, g)),
            word: Array3::zeros((s, k, v)),
            pair_total: Array2::zeros((s, k)),
            doc_len: Array1::zeros(n_docs),
        }
    }

    /// Converte (sentimento, tópico) para (primeiro nível, segundo nível).
    #[inline]
    pub fn levels(&self, sentiment: usize, topic: usize) -> (usize, usize) {
        match self.kind {
            ModelKind::Jst => (sentiment, topic),
            ModelKind::ReversedJst => (topic, sentiment),
        }
    }

    #[inline]
    pub fn increment(&mut self, doc: usize, word: usize, sentiment: usize, topic: usize) {
        let (f, g) = self.levels(sentiment, topic);
        self.doc_first[[doc, f]] += 1;
        self.doc_pair[[doc, f, g]] += 1;
        self.word[[sentiment, topic, word]] += 1;
        self.pair_total[[sentiment, topic]] += 1;
        self.doc_len[doc] += 1;
    }

    #[inline]
    pub fn decrement(&mut self, doc: usize, word: usize, sentiment: usize, topic: usize) {
        let (f, g) = self.levels(sentiment, topic);
        self.doc_first[[doc, f]] -= 1;
        self.doc_pair[[doc, f, g]] -= 1;
        self.word[[sentiment, topic, word]] -= 1;
        self.pair_total[[sentiment, topic]] -= 1;
        self.doc_len[doc] -= 1;
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn n_docs(&self) -> usize {
        self.doc_len.len()
    }

    #[inline]
    pub fn doc_first(&self, doc: usize, first: usize) -> u32 {
        self.doc_first[[doc, first]]
    }

    #[inline]
    pub fn doc_pair(&self, doc: usize, first: usize, second: usize) -> u32 {
        self.doc_pair[[doc, first, second]]
    }

    /// Linha `n_{d,f,·}`, usada na reestimação de $\alpha$.
    pub fn doc_pair_row(&self, doc: usize, first: usize) -> ArrayView1<'_, u32> {
        self.doc_pair.slice(ndarray::s![doc, first, ..])
    }

    #[inline]
    pub fn word(&self, sentiment: usize, topic: usize, word: usize) -> u32 {
        self.word[[sentiment, topic, word]]
    }

    #[inline]
    pub fn pair_total(&self, sentiment: usize, topic: usize) -> u32 {
        self.pair_total[[sentiment, topic]]
    }

    #[inline]
    pub fn doc_len(&self, doc: usize) -> u32 {
        self.doc_len[doc]
    }

    /// Quantas ocorrências do termo estão atribuídas a cada sentimento (somando tópicos).
    pub fn word_by_sentiment(&self, word: usize) -> Array1<u32> {
        self.word
            .slice(ndarray::s![.., .., word])
            .sum_axis(Axis(1))
    }

    /// Verifica as três igualdades do invariante de consistência.
    pub fn check_consistency(&self) -> Result<()> {
        let word_sums = self.word.sum_axis(Axis(2));
        if word_sums != self.pair_total {
            return Err(JstError::Data(
                "soma de n_skw sobre palavras difere de n_sk".into(),
            ));
        }
        let pair_sums = self.doc_pair.sum_axis(Axis(2));
        if pair_sums != self.doc_first {
            return Err(JstError::Data(
                "soma de contagens documento-par difere do primeiro nível".into(),
            ));
        }
        let first_sums = self.doc_first.sum_axis(Axis(1));
        if first_sums != self.doc_len {
            return Err(JstError::Data(
                "soma do primeiro nível difere do comprimento do documento".into(),
            ));
        }
        let total: u32 = self.pair_total.sum();
        if total != self.doc_len.sum() {
            return Err(JstError::Data("total de tokens divergente entre tabelas".into()));
        }
        Ok(())
    }
}
