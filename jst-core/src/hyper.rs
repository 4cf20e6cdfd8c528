//! # Reestimação de Hiperparâmetros (`updateParaStep`)
//!
//! Quando `updateParaStep > 0`, o amostrador chama um [`PriorUpdater`] a cada
//! `updateParaStep` varreduras. A estratégia é plugável; a padrão é a iteração de
//! ponto fixo de Minka (2000) para um prior de Dirichlet, aplicada a cada linha de $\alpha$:
//!
//! $$ \alpha_k \leftarrow \alpha_k \cdot
//!    \frac{\sum_d \left[\psi(n_{dk} + \alpha_k) - \psi(\alpha_k)\right]}
//!         {\sum_d \left[\psi(n_d + \sum_j \alpha_j) - \psi(\sum_j \alpha_j)\right]} $$
//!
//! onde $\psi$ é a função digama. No JST cada sentimento tem sua linha (dados $n_{dsk}$,
//! totais $n_{ds}$); no rJST há uma única linha (dados $n_{dk}$, totais $n_d$).
//! $\beta$ permanece fixo: é ele que carrega a semeadura do léxico.

use statrs::function::gamma::digamma;

use crate::config::ModelKind;
use crate::counts::CountTables;
use crate::prior::Priors;

/// Estratégia de atualização dos priors durante a amostragem.
pub trait PriorUpdater: Send + Sync {
    fn update(&self, counts: &CountTables, priors: &mut Priors);
}

/// Estratégia que nunca altera os priors.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPriors;

impl PriorUpdater for FixedPriors {
    fn update(&self, _counts: &CountTables, _priors: &mut Priors) {}
}

/// Iteração de ponto fixo de Minka sobre as linhas de $\alpha$.
#[derive(Debug, Clone, Copy)]
pub struct MinkaFixedPoint {
    /// Iterações de ponto fixo por chamada.
    pub iterations: usize,
    /// Menor valor permitido para qualquer $\alpha_k$ (mantém os priors positivos).
    pub floor: f64,
}

impl Default for MinkaFixedPoint {
    fn default() -> Self {
        Self {
            iterations: 20,
            floor: 1e-6,
        }
    }
}

impl PriorUpdater for MinkaFixedPoint {
    fn update(&self, counts: &CountTables, priors: &mut Priors) {
        let n_docs = counts.n_docs();
        let k = priors.n_topics();

        for row in 0..priors.alpha.nrows() {
            // (contagens por tópico, total) de cada documento para esta linha
            let data: Vec<(Vec<f64>, f64)> = (0..n_docs)
                .map(|d| match counts.kind() {
                    ModelKind::Jst => (
                        counts.doc_pair_row(d, row).iter().map(|&c| c as f64).collect(),
                        counts.doc_first(d, row) as f64,
                    ),
                    ModelKind::ReversedJst => (
                        (0..k).map(|t| counts.doc_first(d, t) as f64).collect(),
                        counts.doc_len(d) as f64,
                    ),
                })
                .filter(|(_, total)| *total > 0.0)
                .collect();

            if data.is_empty() {
                continue;
            }

            for _ in 0..self.iterations {
                let a_sum: f64 = priors.alpha.row(row).sum();
                let denom: f64 = data
                    .iter()
                    .map(|(_, total)| digamma(total + a_sum) - digamma(a_sum))
                    .sum();
                if !(denom > 0.0) {
                    break;
                }
                for t in 0..k {
                    let a = priors.alpha[[row, t]];
                    let num: f64 = data
                        .iter()
                        .map(|(c, _)| digamma(c[t] + a) - digamma(a))
                        .sum();
                    let updated = a * num / denom;
                    priors.alpha[[row, t]] = if updated.is_finite() {
                        updated.max(self.floor)
                    } else {
                        a
                    };
                }
            }
        }
        priors.refresh_sums();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::lexicon::Lexicon;
    use crate::matrix::DocumentTermMatrix;

    fn setup(kind: ModelKind) -> (CountTables, Priors) {
        let m = DocumentTermMatrix::from_dense(
            vec!["a".into(), "b".into()],
            &[vec![4, 0, 2], vec![1, 5, 0]],
        )
        .unwrap();
        let cfg = RunConfig::new(2).model(kind).alpha(1.0);
        let priors = Priors::build(&cfg, &m, &Lexicon::new()).unwrap();
        let mut counts = CountTables::zeros(kind, 2, 3, 2, 3);
        // Documento 0 concentrado no tópico 0, documento 1 no tópico 1
        for _ in 0..6 {
            counts.increment(0, 0, 1, 0);
        }
        for _ in 0..6 {
            counts.increment(1, 1, 2, 1);
        }
        (counts, priors)
    }

    #[test]
    fn test_concentrated_documents_shrink_alpha() {
        for kind in [ModelKind::Jst, ModelKind::ReversedJst] {
            let (counts, mut priors) = setup(kind);
            let before = priors.alpha_sum.sum();
            MinkaFixedPoint::default().update(&counts, &mut priors);
            // Documentos concentrados em um tópico favorecem alpha menor
            assert!(priors.alpha_sum.sum() < before, "{kind:?}");
            assert!(priors.alpha.iter().all(|&a| a > 0.0));
        }
    }

    #[test]
    fn test_fixed_priors_is_noop() {
        let (counts, mut priors) = setup(ModelKind::Jst);
        let before = priors.alpha.clone();
        FixedPriors.update(&counts, &mut priors);
        assert_eq!(priors.alpha, before);
    }
}
