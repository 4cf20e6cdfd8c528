//! # Estimação dos Parâmetros
//!
//! Converte as tabelas de contagem em distribuições normalizadas pela estimativa
//! pontual bayesiana "contagem + prior sobre soma das contagens + soma dos priors":
//!
//! **JST**
//! - $\pi_{ds} = (n_{ds} + \gamma) / (n_d + S\gamma)$
//! - $\theta_{dsk} = (n_{dsk} + \alpha_{sk}) / (n_{ds} + \sum_k \alpha_{sk})$
//! - $\varphi_{skw} = (n_{skw} + \beta_{skw}) / (n_{sk} + \sum_w \beta_{skw})$
//!
//! **rJST**
//! - $\theta_{dk} = (n_{dk} + \alpha_k) / (n_d + \sum_k \alpha_k)$
//! - $\pi_{dks} = (n_{dks} + \gamma) / (n_{dk} + S\gamma)$
//! - $\varphi$ como no JST
//!
//! É uma função pura das contagens: pode ser chamada em qualquer fronteira de
//! varredura, não só no final.

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::config::ModelKind;
use crate::counts::CountTables;
use crate::matrix::{DocumentTermMatrix, Vocabulary};
use crate::prior::Priors;

/// Distribuições estimadas de uma execução.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum Estimates {
    Jst {
        /// `pi[[d, s]]`
        pi: Array2<f64>,
        /// `theta[[d, s, k]]`
        theta: Array3<f64>,
        /// `phi[[s, k, w]]`
        phi: Array3<f64>,
    },
    ReversedJst {
        /// `theta[[d, k]]`
        theta: Array2<f64>,
        /// `pi[[d, k, s]]`
        pi: Array3<f64>,
        phi: Array3<f64>,
    },
}

/// Calcula $\pi$, $\theta$ e $\varphi$ a partir das contagens e dos priors usados na amostragem.
pub fn estimate(counts: &CountTables, priors: &Priors) -> Estimates {
    let n_docs = counts.n_docs();
    let s = priors.n_sentiments();
    let k = priors.n_topics();
    let phi = estimate_phi(counts, priors);

    match priors.kind {
        ModelKind::Jst => {
            let mut pi = Array2::zeros((n_docs, s));
            let mut theta = Array3::zeros((n_docs, s, k));
            for d in 0..n_docs {
                let n_d = counts.doc_len(d) as f64;
                for si in 0..s {
                    let n_ds = counts.doc_first(d, si) as f64;
                    pi[[d, si]] = (n_ds + priors.gamma) / (n_d + s as f64 * priors.gamma);
                    for ki in 0..k {
                        theta[[d, si, ki]] = (counts.doc_pair(d, si, ki) as f64 + priors.alpha[[si, ki]])
                            / (n_ds + priors.alpha_sum[si]);
                    }
                }
            }
            Estimates::Jst { pi, theta, phi }
        }
        ModelKind::ReversedJst => {
            let mut theta = Array2::zeros((n_docs, k));
            let mut pi = Array3::zeros((n_docs, k, s));
            for d in 0..n_docs {
                let n_d = counts.doc_len(d) as f64;
                for ki in 0..k {
                    let n_dk = counts.doc_first(d, ki) as f64;
                    theta[[d, ki]] = (n_dk + priors.alpha[[0, ki]]) / (n_d + priors.alpha_sum[0]);
                    for si in 0..s {
                        pi[[d, ki, si]] = (counts.doc_pair(d, ki, si) as f64 + priors.gamma)
                            / (n_dk + s as f64 * priors.gamma);
                    }
                }
            }
            Estimates::ReversedJst { theta, pi, phi }
        }
    }
}

fn estimate_phi(counts: &CountTables, priors: &Priors) -> Array3<f64> {
    let (s, k, v) = priors.beta.dim();
    Array3::from_shape_fn((s, k, v), |(si, ki, w)| {
        (counts.word(si, ki, w) as f64 + priors.beta[[si, ki, w]])
            / (counts.pair_total(si, ki) as f64 + priors.beta_sum[[si, ki]])
    })
}

impl Estimates {
    pub fn kind(&self) -> ModelKind {
        match self {
            Estimates::Jst { .. } => ModelKind::Jst,
            Estimates::ReversedJst { .. } => ModelKind::ReversedJst,
        }
    }

    pub fn phi(&self) -> &Array3<f64> {
        match self {
            Estimates::Jst { phi, .. } | Estimates::ReversedJst { phi, .. } => phi,
        }
    }

    /// Distribuição de sentimento por documento, `[[d, s]]`.
    ///
    /// No rJST é a marginal $\sum_k \theta_{dk}\pi_{dks}$.
    pub fn document_sentiment(&self) -> Array2<f64> {
        match self {
            Estimates::Jst { pi, .. } => pi.clone(),
            Estimates::ReversedJst { theta, pi, .. } => {
                let (d, k, s) = pi.dim();
                Array2::from_shape_fn((d, s), |(di, si)| {
                    (0..k).map(|ki| theta[[di, ki]] * pi[[di, ki, si]]).sum()
                })
            }
        }
    }

    /// Distribuição de tópicos por documento, `[[d, k]]`.
    ///
    /// No JST é a marginal $\sum_s \pi_{ds}\theta_{dsk}$.
    pub fn document_topic(&self) -> Array2<f64> {
        match self {
            Estimates::Jst { pi, theta, .. } => {
                let (d, s, k) = theta.dim();
                Array2::from_shape_fn((d, k), |(di, ki)| {
                    (0..s).map(|si| pi[[di, si]] * theta[[di, si, ki]]).sum()
                })
            }
            Estimates::ReversedJst { theta, .. } => theta.clone(),
        }
    }

    /// As `n` palavras mais prováveis de (sentimento, tópico), em ordem decrescente.
    pub fn top_terms(&self, sentiment: usize, topic: usize, n: usize, vocab: &Vocabulary) -> Vec<(String, f64)> {
        let phi = self.phi();
        let (s, k, _) = phi.dim();
        if sentiment >= s || topic >= k {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f64)> = phi
            .slice(ndarray::s![sentiment, topic, ..])
            .iter()
            .copied()
            .enumerate()
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(n)
            .filter_map(|(w, p)| vocab.term(w).map(|t| (t.to_string(), p)))
            .collect()
    }
}

/// Log-verossimilhança das palavras observadas sob as estimativas atuais:
///
/// $$ \sum_d \sum_w c_{dw} \log \sum_{s,k} p(s, k \mid d)\, \varphi_{skw} $$
///
/// Usada apenas como traço de diagnóstico durante a amostragem.
pub fn word_log_likelihood(estimates: &Estimates, matrix: &DocumentTermMatrix) -> f64 {
    let phi = estimates.phi();
    let (s, k, _) = phi.dim();
    // p(s, k | d) sob a variante do modelo
    let joint = match estimates {
        Estimates::Jst { pi, theta, .. } => {
            Array3::from_shape_fn(theta.dim(), |(di, si, ki)| pi[[di, si]] * theta[[di, si, ki]])
        }
        Estimates::ReversedJst { theta, pi, .. } => {
            let (d, _, _) = pi.dim();
            Array3::from_shape_fn((d, s, k), |(di, si, ki)| theta[[di, ki]] * pi[[di, ki, si]])
        }
    };

    let mut ll = 0.0;
    for d in 0..matrix.n_docs() {
        for &(w, c) in matrix.row(d) {
            let mut p = 0.0;
            for si in 0..s {
                for ki in 0..k {
                    p += joint[[d, si, ki]] * phi[[si, ki, w]];
                }
            }
            ll += c as f64 * p.ln();
        }
    }
    ll
}
