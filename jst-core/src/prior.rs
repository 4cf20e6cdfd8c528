//! # Inicialização dos Priors de Dirichlet
//!
//! Três priors controlam a suavização do modelo:
//!
//! | Prior | Forma (JST) | Forma (rJST) | Papel |
//! |-------|-------------|--------------|-------|
//! | $\alpha$ | $S \times K$ | $1 \times K$ | tópicos dentro do documento |
//! | $\beta$ | $S \times K \times V$ | idem | palavras dentro de (sentimento, tópico) |
//! | $\gamma$ | escalar | escalar | sentimentos dentro do documento |
//!
//! $\beta$ é **assimétrico**: para uma palavra do léxico, a massa total $S\beta$ da
//! palavra é redistribuída de modo que o rótulo correspondente receba $S\beta\lambda$ e
//! cada um dos demais $S\beta(1-\lambda)/(S-1)$. Palavras fora do léxico ficam com a
//! linha de base $\beta$ em todos os rótulos.

use ndarray::{Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ModelKind, RunConfig};
use crate::error::{JstError, Result};
use crate::lexicon::Lexicon;
use crate::matrix::DocumentTermMatrix;
use crate::sentiment::SentimentClasses;

/// Prior $\beta$ de linha de base quando não informado.
pub const DEFAULT_BETA: f64 = 0.01;

/// Fração do comprimento médio do documento usada nos priors derivados dos dados.
const DATA_PRIOR_FRACTION: f64 = 0.05;

/// Priors resolvidos para uma execução.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Priors {
    pub kind: ModelKind,
    pub classes: SentimentClasses,
    /// Uma linha por sentimento (JST) ou uma única linha (rJST); colunas = tópicos.
    pub alpha: Array2<f64>,
    pub alpha_sum: Array1<f64>,
    /// `beta[[s, k, w]]`.
    pub beta: Array3<f64>,
    /// `beta_sum[[s, k]]` $= \sum_w \beta_{skw}$.
    pub beta_sum: Array2<f64>,
    pub gamma: f64,
}

impl Priors {
    /// Valida a configuração contra os dados e constrói os priors.
    ///
    /// Nenhum estado do amostrador é alocado se esta etapa falhar.
    pub fn build(config: &RunConfig, matrix: &DocumentTermMatrix, lexicon: &Lexicon) -> Result<Self> {
        config.validate()?;

        let n_terms = matrix.n_terms();
        if n_terms == 0 {
            return Err(JstError::Data("vocabulário vazio".into()));
        }
        if matrix.total_tokens() == 0 {
            return Err(JstError::Data("a matriz não contém tokens".into()));
        }
        if let Some(max) = lexicon.max_term() {
            if max >= n_terms {
                return Err(JstError::DimensionMismatch {
                    what: "vocabulário do léxico",
                    expected: n_terms,
                    found: max + 1,
                });
            }
        }

        let s = config.num_sentiments.count();
        let k = config.num_topics;
        let avg_len = matrix.avg_doc_len();
        let (alpha0, gamma0) = data_driven_scalars(config.model, avg_len, s, k);
        let alpha = config.alpha.unwrap_or(alpha0);
        let gamma = config.gamma.unwrap_or(gamma0);
        let beta = config.beta.unwrap_or(DEFAULT_BETA);

        debug!(alpha, beta, gamma, avg_len, "priors escalares resolvidos");

        let alpha_rows = match config.model {
            ModelKind::Jst => s,
            ModelKind::ReversedJst => 1,
        };
        let alpha = Array2::from_elem((alpha_rows, k), alpha);
        let beta = seeded_beta(config.num_sentiments, k, n_terms, beta, lexicon);

        let mut priors = Self {
            kind: config.model,
            classes: config.num_sentiments,
            alpha_sum: Array1::zeros(alpha_rows),
            alpha,
            beta_sum: Array2::zeros((s, k)),
            beta,
            gamma,
        };
        priors.refresh_sums();
        Ok(priors)
    }

    /// Recalcula as somas de $\alpha$ e $\beta$ após alguma alteração nos priors.
    pub fn refresh_sums(&mut self) {
        self.alpha_sum = self.alpha.sum_axis(Axis(1));
        self.beta_sum = self.beta.sum_axis(Axis(2));
    }

    pub fn n_sentiments(&self) -> usize {
        self.classes.count()
    }

    pub fn n_topics(&self) -> usize {
        self.alpha.ncols()
    }

    pub fn n_terms(&self) -> usize {
        self.beta.len_of(Axis(2))
    }
}

/// Defaults de $\alpha$ e $\gamma$ proporcionais ao comprimento médio $\bar{L}$ dos documentos.
///
/// - JST: $\alpha = 0.05\bar{L}/(SK)$, $\gamma = 0.05\bar{L}/S$
/// - rJST: $\alpha = 0.05\bar{L}/K$, $\gamma = 0.05\bar{L}/(KS)$
fn data_driven_scalars(kind: ModelKind, avg_len: f64, s: usize, k: usize) -> (f64, f64) {
    let mass = DATA_PRIOR_FRACTION * avg_len;
    let (s, k) = (s as f64, k as f64);
    match kind {
        ModelKind::Jst => (mass / (s * k), mass / s),
        ModelKind::ReversedJst => (mass / k, mass / (k * s)),
    }
}

fn seeded_beta(
    classes: SentimentClasses,
    n_topics: usize,
    n_terms: usize,
    beta: f64,
    lexicon: &Lexicon,
) -> Array3<f64> {
    let s = classes.count();
    let mut out = Array3::from_elem((s, n_topics, n_terms), beta);
    let word_mass = s as f64 * beta;

    for (term, entry) in lexicon.iter() {
        let Some(label) = classes.index_of(entry.sentiment) else {
            debug!(term, sentiment = entry.sentiment.label(), "rótulo do léxico ignorado neste modo");
            continue;
        };
        let matched = word_mass * entry.weight;
        let other = word_mass * (1.0 - entry.weight) / (s - 1) as f64;
        for si in 0..s {
            let value = if si == label { matched } else { other };
            out.slice_mut(ndarray::s![si, .., term]).fill(value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::Sentiment;
    use approx::assert_relative_eq;

    fn matrix() -> DocumentTermMatrix {
        DocumentTermMatrix::from_dense(
            vec!["a".into(), "b".into()],
            &[vec![2, 0, 1, 2], vec![0, 3, 1, 0]],
        )
        .unwrap()
    }

    #[test]
    fn test_lexicon_word_gets_boosted_mass() {
        let mut lex = Lexicon::new();
        lex.insert(0, Sentiment::Positive, 0.9).unwrap();
        let cfg = RunConfig::new(2).beta(0.01);
        let p = Priors::build(&cfg, &matrix(), &lex).unwrap();

        let pos = SentimentClasses::Three.index_of(Sentiment::Positive).unwrap();
        let neg = SentimentClasses::Three.index_of(Sentiment::Negative).unwrap();
        // Rótulo correspondente acima da linha de base, demais abaixo
        assert!(p.beta[[pos, 0, 0]] > 0.01);
        assert!(p.beta[[neg, 0, 0]] < 0.01);
        assert!(p.beta[[neg, 1, 0]] > 0.0);
        // Massa total da palavra preservada
        let total: f64 = (0..3).map(|s| p.beta[[s, 0, 0]]).sum();
        assert_relative_eq!(total, 0.03, epsilon = 1e-12);
        // Palavra fora do léxico: linha de base uniforme
        assert_relative_eq!(p.beta[[pos, 0, 1]], 0.01);
        assert_relative_eq!(p.beta[[neg, 0, 1]], 0.01);
    }

    #[test]
    fn test_data_driven_defaults() {
        // Comprimento médio = 4.5
        let cfg = RunConfig::new(3);
        let p = Priors::build(&cfg, &matrix(), &Lexicon::new()).unwrap();
        assert_relative_eq!(p.alpha[[0, 0]], 0.05 * 4.5 / 9.0, epsilon = 1e-12);
        assert_relative_eq!(p.gamma, 0.05 * 4.5 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(p.alpha_sum[0], 0.05 * 4.5 / 3.0, epsilon = 1e-12);
        assert_eq!(p.alpha.dim(), (3, 3));

        let rcfg = RunConfig::new(3).model(ModelKind::ReversedJst);
        let rp = Priors::build(&rcfg, &matrix(), &Lexicon::new()).unwrap();
        assert_eq!(rp.alpha.dim(), (1, 3));
    }

    #[test]
    fn test_lexicon_outside_vocabulary_rejected() {
        let mut lex = Lexicon::new();
        lex.insert(10, Sentiment::Negative, 0.9).unwrap();
        let err = Priors::build(&RunConfig::new(2), &matrix(), &lex).unwrap_err();
        assert!(matches!(err, JstError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_neutral_entry_ignored_in_binary_mode() {
        let mut lex = Lexicon::new();
        lex.insert(0, Sentiment::Neutral, 0.9).unwrap();
        let cfg = RunConfig::new(2).num_sentiments(SentimentClasses::Two).beta(0.02);
        let p = Priors::build(&cfg, &matrix(), &lex).unwrap();
        assert_relative_eq!(p.beta[[0, 0, 0]], 0.02);
        assert_relative_eq!(p.beta[[1, 0, 0]], 0.02);
    }

    #[test]
    fn test_empty_matrix_rejected() {
        let m = DocumentTermMatrix::from_dense(vec!["a".into()], &[vec![0, 0]]).unwrap();
        assert!(matches!(
            Priors::build(&RunConfig::new(2), &m, &Lexicon::new()),
            Err(JstError::Data(_))
        ));
    }
}
