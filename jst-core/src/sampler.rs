//! # Amostrador de Gibbs Colapsado (JST / rJST)
//!
//! Cada ocorrência de palavra em cada documento carrega um par latente
//! (sentimento, tópico). Uma **varredura** visita todas as ocorrências, em ordem:
//!
//! 1. Remove a atribuição atual das quatro tabelas de contagem.
//! 2. Calcula a condicional colapsada de cada par $(s, k)$ com as contagens já decrementadas.
//! 3. Sorteia um novo par da distribuição categórica normalizada.
//! 4. Soma a nova atribuição de volta às tabelas.
//!
//! ## Condicionais
//!
//! **JST** (sentimento primeiro):
//! $$ p(s,k) \propto (n_{ds} + \gamma)\,
//!    \frac{n_{dsk} + \alpha_{sk}}{n_{ds} + \sum_k \alpha_{sk}}\,
//!    \frac{n_{skw} + \beta_{skw}}{n_{sk} + \sum_w \beta_{skw}} $$
//!
//! **rJST** (tópico primeiro):
//! $$ p(k,s) \propto (n_{dk} + \alpha_k)\,
//!    \frac{n_{dks} + \gamma}{n_{dk} + S\gamma}\,
//!    \frac{n_{skw} + \beta_{skw}}{n_{sk} + \sum_w \beta_{skw}} $$
//!
//! A cadeia é inerentemente sequencial: cada atualização depende das contagens recém
//! alteradas pela anterior. Cada execução possui seu próprio gerador aleatório, então
//! execuções distintas podem rodar em paralelo sem interferência.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{ModelKind, RunConfig};
use crate::counts::CountTables;
use crate::error::{JstError, Result};
use crate::estimate::{estimate, word_log_likelihood, Estimates};
use crate::hyper::{MinkaFixedPoint, PriorUpdater};
use crate::lexicon::Lexicon;
use crate::matrix::DocumentTermMatrix;
use crate::prior::Priors;

/// Atribuição latente de uma ocorrência de palavra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub word: usize,
    pub sentiment: usize,
    pub topic: usize,
}

/// Estado da execução.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SamplerState {
    /// Atribuições aleatórias feitas, nenhuma varredura executada.
    Initialized,
    /// `iteration` varreduras concluídas.
    Sampling { iteration: usize },
    /// Todas as `numIters` varreduras concluídas.
    Finished,
    /// Interrompido por cancelamento cooperativo.
    Stopped,
}

/// Eventos emitidos durante a amostragem, para acompanhamento em tempo real.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SamplerEvent {
    /// Atribuições iniciais feitas e contagens tabuladas.
    Initialized {
        documents: usize,
        tokens: usize,
        seed: u64,
    },
    /// Uma varredura completa sobre o corpus.
    SweepCompleted {
        iteration: usize,
        /// Quantos tokens mudaram de par (sentimento, tópico) nesta varredura.
        reassigned: usize,
        log_likelihood: f64,
    },
    /// $\alpha$ foi reestimado.
    HyperparametersUpdated {
        iteration: usize,
        alpha_sum: Vec<f64>,
    },
    /// Execução concluída com as estimativas finais.
    Done {
        iterations: usize,
        seed: u64,
        estimates: Estimates,
    },
    /// Execução interrompida.
    Error {
        message: String,
    },
}

/// Amostrador de Gibbs para uma única execução.
///
/// A matriz é apenas emprestada; atribuições, contagens e gerador aleatório pertencem
/// exclusivamente ao amostrador.
pub struct GibbsSampler<'a> {
    matrix: &'a DocumentTermMatrix,
    config: RunConfig,
    priors: Priors,
    counts: CountTables,
    docs: Vec<Vec<Assignment>>,
    rng: ChaCha8Rng,
    seed: u64,
    iteration: usize,
    state: SamplerState,
    updater: Box<dyn PriorUpdater>,
    /// Buffer reutilizado para as probabilidades acumuladas dos $S \cdot K$ pares.
    cumulative: Vec<f64>,
}

impl<'a> GibbsSampler<'a> {
    /// Valida a configuração, constrói os priors e faz a inicialização aleatória.
    ///
    /// Tokens de palavras do léxico começam no rótulo do léxico quando `lexiconInit`
    /// está ativo; os demais recebem sentimento e tópico uniformes.
    pub fn new(config: &RunConfig, matrix: &'a DocumentTermMatrix, lexicon: &Lexicon) -> Result<Self> {
        let priors = Priors::build(config, matrix, lexicon)?;
        let s = priors.n_sentiments();
        let k = priors.n_topics();
        let v = priors.n_terms();

        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let seeded_labels: Vec<Option<usize>> = (0..v)
            .map(|w| {
                lexicon
                    .get(w)
                    .filter(|_| config.lexicon_init)
                    .and_then(|e| config.num_sentiments.index_of(e.sentiment))
            })
            .collect();

        let mut counts = CountTables::zeros(config.model, matrix.n_docs(), s, k, v);
        let mut docs = Vec::with_capacity(matrix.n_docs());
        for d in 0..matrix.n_docs() {
            let words = matrix.expand_tokens(d);
            let mut assignments = Vec::with_capacity(words.len());
            for word in words {
                if word >= v {
                    return Err(JstError::Data(format!(
                        "documento {d} referencia o termo {word}, vocabulário com {v}"
                    )));
                }
                let sentiment = match seeded_labels[word] {
                    Some(label) => label,
                    None => rng.gen_range(0..s),
                };
                let topic = rng.gen_range(0..k);
                counts.increment(d, word, sentiment, topic);
                assignments.push(Assignment { word, sentiment, topic });
            }
            docs.push(assignments);
        }

        info!(
            model = ?config.model,
            documents = matrix.n_docs(),
            tokens = matrix.total_tokens(),
            topics = k,
            sentiments = s,
            seed,
            "amostrador inicializado"
        );

        Ok(Self {
            matrix,
            config: config.clone(),
            priors,
            counts,
            docs,
            rng,
            seed,
            iteration: 0,
            state: SamplerState::Initialized,
            updater: Box::new(MinkaFixedPoint::default()),
            cumulative: vec![0.0; s * k],
        })
    }

    /// Substitui a estratégia de reestimação usada quando `updateParaStep > 0`.
    pub fn with_updater<U: PriorUpdater + 'static>(mut self, updater: U) -> Self {
        self.updater = Box::new(updater);
        self
    }

    /// Executa todas as varreduras restantes e retorna as estimativas finais.
    pub fn run(&mut self) -> Result<Estimates> {
        self.run_inner(None, None)
    }

    /// Como [`GibbsSampler::run`], verificando `cancel` entre varreduras.
    pub fn run_cancellable(&mut self, cancel: &AtomicBool) -> Result<Estimates> {
        self.run_inner(None, Some(cancel))
    }

    /// Executa enviando [`SamplerEvent`]s pelo canal `tx` a cada passo.
    ///
    /// # Fluxo de Eventos
    /// 1. `Initialized`
    /// 2. `SweepCompleted` (uma por varredura) e `HyperparametersUpdated` quando aplicável
    /// 3. `Done` com as estimativas, ou `Error` se cancelado
    pub fn run_streaming(
        &mut self,
        tx: &mpsc::Sender<SamplerEvent>,
        cancel: Option<&AtomicBool>,
    ) -> Result<Estimates> {
        self.run_inner(Some(tx), cancel)
    }

    fn run_inner(
        &mut self,
        tx: Option<&mpsc::Sender<SamplerEvent>>,
        cancel: Option<&AtomicBool>,
    ) -> Result<Estimates> {
        if let Some(tx) = tx {
            let _ = tx.send(SamplerEvent::Initialized {
                documents: self.matrix.n_docs(),
                tokens: self.matrix.total_tokens(),
                seed: self.seed,
            });
        }

        while self.iteration < self.config.num_iters {
            if cancel.map_or(false, |c| c.load(Ordering::Relaxed)) {
                self.state = SamplerState::Stopped;
                debug!(iteration = self.iteration, seed = self.seed, "execução cancelada");
                if let Some(tx) = tx {
                    let _ = tx.send(SamplerEvent::Error {
                        message: JstError::Cancelled.to_string(),
                    });
                }
                return Err(JstError::Cancelled);
            }

            let reassigned = self.sweep();
            debug!(iteration = self.iteration, reassigned, "varredura concluída");
            let updated = self.maybe_update_priors();

            if let Some(tx) = tx {
                let snapshot = self.snapshot();
                let _ = tx.send(SamplerEvent::SweepCompleted {
                    iteration: self.iteration,
                    reassigned,
                    log_likelihood: word_log_likelihood(&snapshot, self.matrix),
                });
                if updated {
                    let _ = tx.send(SamplerEvent::HyperparametersUpdated {
                        iteration: self.iteration,
                        alpha_sum: self.priors.alpha_sum.to_vec(),
                    });
                }
            }
        }

        self.state = SamplerState::Finished;
        let estimates = self.snapshot();
        info!(iterations = self.iteration, seed = self.seed, "amostragem concluída");
        if let Some(tx) = tx {
            let _ = tx.send(SamplerEvent::Done {
                iterations: self.iteration,
                seed: self.seed,
                estimates: estimates.clone(),
            });
        }
        Ok(estimates)
    }

    /// Uma varredura completa. Retorna quantos tokens mudaram de par.
    pub fn sweep(&mut self) -> usize {
        let mut reassigned = 0;
        for d in 0..self.docs.len() {
            for i in 0..self.docs[d].len() {
                if self.sample_token(d, i) {
                    reassigned += 1;
                }
            }
        }
        self.iteration += 1;
        self.state = SamplerState::Sampling {
            iteration: self.iteration,
        };
        reassigned
    }

    fn maybe_update_priors(&mut self) -> bool {
        let step = self.config.update_para_step;
        if step == 0 || self.iteration % step != 0 {
            return false;
        }
        self.updater.update(&self.counts, &mut self.priors);
        debug!(
            iteration = self.iteration,
            alpha_sum = ?self.priors.alpha_sum.to_vec(),
            "hiperparâmetros reestimados"
        );
        true
    }

    /// Reamostra o token `i` do documento `d`. Retorna `true` se o par mudou.
    fn sample_token(&mut self, d: usize, i: usize) -> bool {
        let old = self.docs[d][i];
        let w = old.word;
        self.counts.decrement(d, w, old.sentiment, old.topic);

        let s_count = self.priors.n_sentiments();
        let k_count = self.priors.n_topics();
        let gamma = self.priors.gamma;
        let mut total = 0.0;

        for s in 0..s_count {
            for k in 0..k_count {
                let word_term = (self.counts.word(s, k, w) as f64 + self.priors.beta[[s, k, w]])
                    / (self.counts.pair_total(s, k) as f64 + self.priors.beta_sum[[s, k]]);
                let doc_term = match self.priors.kind {
                    ModelKind::Jst => {
                        let n_ds = self.counts.doc_first(d, s) as f64;
                        (n_ds + gamma) * (self.counts.doc_pair(d, s, k) as f64 + self.priors.alpha[[s, k]])
                            / (n_ds + self.priors.alpha_sum[s])
                    }
                    ModelKind::ReversedJst => {
                        let n_dk = self.counts.doc_first(d, k) as f64;
                        (n_dk + self.priors.alpha[[0, k]]) * (self.counts.doc_pair(d, k, s) as f64 + gamma)
                            / (n_dk + s_count as f64 * gamma)
                    }
                };
                total += doc_term * word_term;
                self.cumulative[s * k_count + k] = total;
            }
        }

        let threshold = self.rng.gen::<f64>() * total;
        let idx = self
            .cumulative
            .iter()
            .position(|&c| c > threshold)
            .unwrap_or(self.cumulative.len() - 1);
        let (sentiment, topic) = (idx / k_count, idx % k_count);

        self.counts.increment(d, w, sentiment, topic);
        self.docs[d][i] = Assignment { word: w, sentiment, topic };
        sentiment != old.sentiment || topic != old.topic
    }

    /// Estimativas a partir das contagens atuais (qualquer fronteira de varredura).
    pub fn snapshot(&self) -> Estimates {
        estimate(&self.counts, &self.priors)
    }

    pub fn counts(&self) -> &CountTables {
        &self.counts
    }

    pub fn priors(&self) -> &Priors {
        &self.priors
    }

    pub fn assignments(&self, doc: usize) -> &[Assignment] {
        &self.docs[doc]
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }
}
