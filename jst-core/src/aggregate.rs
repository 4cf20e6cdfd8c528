//! # Agregador Multi-Execução
//!
//! A amostragem de Gibbs é multimodal: duas execuções com sementes diferentes podem
//! parar em modos distintos. O agregador repete a execução $N$ vezes e resume, para
//! cada (documento, sentimento), a média de $\pi$ e sua incerteza:
//!
//! - desvio padrão amostral $sd$ (0 quando $N = 1$)
//! - erro padrão $se = sd / \sqrt{N}$
//! - intervalo simétrico $\bar{x} \pm z \cdot se$ no nível de confiança pedido
//!
//! ## Memória
//!
//! Cada worker constrói um amostrador, executa, extrai somente $\pi$ e descarta o
//! restante (atribuições e tabelas de contagem) antes da próxima execução.
//!
//! ## Falhas
//!
//! Se uma execução falha, as demais são canceladas cooperativamente (checagem entre
//! varreduras) e o lote inteiro falha, a menos que `allowPartial` esteja ativo.

use std::sync::atomic::{AtomicBool, Ordering};

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use tracing::{info, warn};

use crate::config::{AggregateConfig, RunConfig};
use crate::error::{JstError, Result};
use crate::lexicon::Lexicon;
use crate::matrix::DocumentTermMatrix;
use crate::prior::Priors;
use crate::sampler::GibbsSampler;
use crate::sentiment::Sentiment;

/// Resumo de $\pi$ para um par (documento, sentimento).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummary {
    pub doc_id: String,
    pub sentiment: Sentiment,
    pub mean: f64,
    pub sd: f64,
    pub se: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Resultado de um lote de execuções.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateReport {
    pub rows: Vec<SentimentSummary>,
    pub runs_completed: usize,
    pub runs_failed: usize,
    /// Sementes das execuções concluídas, na ordem das execuções.
    pub seeds: Vec<u64>,
    pub confidence_level: f64,
}

impl AggregateReport {
    pub fn get(&self, doc_id: &str, sentiment: Sentiment) -> Option<&SentimentSummary> {
        self.rows
            .iter()
            .find(|r| r.doc_id == doc_id && r.sentiment == sentiment)
    }
}

/// Executa $N$ amostradores independentes sobre a mesma matriz e léxico.
///
/// Matriz e léxico são compartilhados apenas para leitura entre os workers.
pub struct MultiRunAggregator<'a> {
    matrix: &'a DocumentTermMatrix,
    lexicon: &'a Lexicon,
    config: RunConfig,
    aggregate: AggregateConfig,
}

impl<'a> MultiRunAggregator<'a> {
    pub fn new(
        matrix: &'a DocumentTermMatrix,
        lexicon: &'a Lexicon,
        config: RunConfig,
        aggregate: AggregateConfig,
    ) -> Self {
        Self {
            matrix,
            lexicon,
            config,
            aggregate,
        }
    }

    /// Executa o lote completo e resume $\pi$ por documento.
    pub fn run(&self) -> Result<AggregateReport> {
        let (matrix, lexicon) = (self.matrix, self.lexicon);
        self.run_batch(|cfg, cancel| {
            let mut sampler = GibbsSampler::new(cfg, matrix, lexicon)?;
            let estimates = sampler.run_cancellable(cancel)?;
            Ok(estimates.document_sentiment())
        })
    }

    /// Núcleo do lote, parametrizado pela função que executa uma repetição.
    fn run_batch<F>(&self, runner: F) -> Result<AggregateReport>
    where
        F: Fn(&RunConfig, &AtomicBool) -> Result<Array2<f64>> + Sync,
    {
        self.aggregate.validate()?;
        // Erros de configuração e de dados aparecem aqui, antes de qualquer worker
        Priors::build(&self.config, self.matrix, self.lexicon)?;

        let n = self.aggregate.repetitions;
        let base_seed = self.config.seed.unwrap_or_else(rand::random);
        let threads = self.config.effective_ncores();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| JstError::ThreadPool(e.to_string()))?;

        info!(runs = n, threads, base_seed, "iniciando lote multi-execução");

        let cancel = AtomicBool::new(false);
        let allow_partial = self.aggregate.allow_partial;

        let results: Vec<(u64, Result<Array2<f64>>)> = pool.install(|| {
            (0..n)
                .into_par_iter()
                .map(|i| {
                    let seed = base_seed.wrapping_add(i as u64);
                    if cancel.load(Ordering::Relaxed) {
                        return (seed, Err(JstError::Cancelled));
                    }
                    let cfg = self.config.clone().seed(seed);
                    let result = runner(&cfg, &cancel);
                    if let Err(e) = &result {
                        if !matches!(e, JstError::Cancelled) {
                            warn!(run = i, seed, error = %e, "execução falhou");
                            if !allow_partial {
                                cancel.store(true, Ordering::Relaxed);
                            }
                        }
                    }
                    (seed, result)
                })
                .collect()
        });

        let mut pis = Vec::with_capacity(n);
        let mut seeds = Vec::with_capacity(n);
        let mut first_failure: Option<(usize, JstError)> = None;
        let mut runs_failed = 0;

        for (i, (seed, result)) in results.into_iter().enumerate() {
            match result {
                Ok(pi) => {
                    pis.push(pi);
                    seeds.push(seed);
                }
                // Cancelada por causa de outra falha: não conta como falha própria
                Err(JstError::Cancelled) => {}
                Err(e) => {
                    runs_failed += 1;
                    if first_failure.is_none() {
                        first_failure = Some((i, e));
                    }
                }
            }
        }

        if let Some((run, source)) = first_failure {
            if !allow_partial || pis.is_empty() {
                return Err(JstError::RunFailed {
                    run,
                    source: Box::new(source),
                });
            }
        }

        let rows = self.summarize(&pis)?;
        info!(
            completed = pis.len(),
            failed = runs_failed,
            "lote multi-execução concluído"
        );

        Ok(AggregateReport {
            rows,
            runs_completed: pis.len(),
            runs_failed,
            seeds,
            confidence_level: self.aggregate.confidence_level,
        })
    }

    /// Média e variância por Welford, na ordem das execuções.
    fn summarize(&self, pis: &[Array2<f64>]) -> Result<Vec<SentimentSummary>> {
        let n_docs = self.matrix.n_docs();
        let classes = self.config.num_sentiments;
        let s = classes.count();

        let mut mean = Array2::<f64>::zeros((n_docs, s));
        let mut m2 = Array2::<f64>::zeros((n_docs, s));
        for (i, pi) in pis.iter().enumerate() {
            if pi.dim() != (n_docs, s) {
                return Err(JstError::DimensionMismatch {
                    what: "pi de uma execução",
                    expected: n_docs * s,
                    found: pi.len(),
                });
            }
            let count = (i + 1) as f64;
            for ((idx, &x), m) in pi.indexed_iter().zip(mean.iter_mut()) {
                let delta = x - *m;
                *m += delta / count;
                m2[idx] += delta * (x - *m);
            }
        }

        let n = pis.len() as f64;
        let z = Normal::new(0.0, 1.0)
            .map_err(|e| JstError::InvalidConfig(e.to_string()))?
            .inverse_cdf(1.0 - (1.0 - self.aggregate.confidence_level) / 2.0);

        let mut rows = Vec::with_capacity(n_docs * s);
        for (d, doc_id) in self.matrix.doc_ids().iter().enumerate() {
            for (si, &sentiment) in classes.labels().iter().enumerate() {
                let sd = if pis.len() > 1 {
                    (m2[[d, si]] / (n - 1.0)).max(0.0).sqrt()
                } else {
                    0.0
                };
                let se = sd / n.sqrt();
                let mu = mean[[d, si]];
                rows.push(SentimentSummary {
                    doc_id: doc_id.clone(),
                    sentiment,
                    mean: mu,
                    sd,
                    se,
                    ci_lower: mu - z * se,
                    ci_upper: mu + z * se,
                });
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::SentimentClasses;
    use approx::assert_relative_eq;

    fn corpus() -> (DocumentTermMatrix, Lexicon) {
        let m = DocumentTermMatrix::from_dense(
            vec!["d0".into(), "d1".into()],
            &[vec![3, 1, 0, 1], vec![0, 1, 3, 2]],
        )
        .unwrap();
        let mut lex = Lexicon::new();
        lex.insert(0, Sentiment::Positive, 0.9).unwrap();
        lex.insert(2, Sentiment::Negative, 0.9).unwrap();
        (m, lex)
    }

    #[test]
    fn test_single_run_matches_sampler() {
        let (m, lex) = corpus();
        let cfg = RunConfig::new(2).num_iters(20).seed(77).ncores(1);
        let report = MultiRunAggregator::new(&m, &lex, cfg.clone(), AggregateConfig::new(1))
            .run()
            .unwrap();

        let mut sampler = GibbsSampler::new(&cfg, &m, &lex).unwrap();
        let pi = sampler.run().unwrap().document_sentiment();

        assert_eq!(report.runs_completed, 1);
        assert_eq!(report.seeds, vec![77]);
        for (d, doc) in ["d0", "d1"].iter().enumerate() {
            for (si, &sent) in SentimentClasses::Three.labels().iter().enumerate() {
                let row = report.get(doc, sent).unwrap();
                assert_eq!(row.mean, pi[[d, si]]);
                assert_eq!(row.sd, 0.0);
                assert_eq!(row.ci_lower, row.ci_upper);
            }
        }
    }

    #[test]
    fn test_batch_is_reproducible_across_thread_counts() {
        let (m, lex) = corpus();
        let cfg = RunConfig::new(2).num_iters(15).seed(5);
        let a = MultiRunAggregator::new(&m, &lex, cfg.clone().ncores(1), AggregateConfig::new(6))
            .run()
            .unwrap();
        let b = MultiRunAggregator::new(&m, &lex, cfg.ncores(3), AggregateConfig::new(6))
            .run()
            .unwrap();
        assert_eq!(a.rows, b.rows);
        assert_eq!(a.seeds, (5..11).collect::<Vec<u64>>());
    }

    #[test]
    fn test_interval_contains_mean_and_means_sum_to_one() {
        let (m, lex) = corpus();
        let cfg = RunConfig::new(2).num_iters(10).seed(1).ncores(2);
        let report = MultiRunAggregator::new(&m, &lex, cfg, AggregateConfig::new(8).confidence_level(0.9))
            .run()
            .unwrap();
        for r in &report.rows {
            assert!(r.ci_lower <= r.mean && r.mean <= r.ci_upper);
            assert_relative_eq!(r.se, r.sd / 8f64.sqrt(), epsilon = 1e-12);
        }
        for doc in ["d0", "d1"] {
            let total: f64 = report.rows.iter().filter(|r| r.doc_id == doc).map(|r| r.mean).sum();
            assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_known_statistics() {
        let (m, lex) = corpus();
        let agg = MultiRunAggregator::new(
            &m,
            &lex,
            RunConfig::new(2).num_sentiments(SentimentClasses::Two).seed(0).ncores(1),
            AggregateConfig::new(2),
        );
        let pis = vec![
            Array2::from_shape_vec((2, 2), vec![0.2, 0.8, 0.5, 0.5]).unwrap(),
            Array2::from_shape_vec((2, 2), vec![0.4, 0.6, 0.5, 0.5]).unwrap(),
        ];
        let rows = agg.summarize(&pis).unwrap();
        let first = &rows[0];
        assert_relative_eq!(first.mean, 0.3, epsilon = 1e-12);
        assert_relative_eq!(first.sd, 0.02f64.sqrt(), epsilon = 1e-12);
        let z = 1.959963984540054;
        assert_relative_eq!(first.ci_upper, 0.3 + z * 0.1, epsilon = 1e-9);
        // Sem variação entre execuções
        assert_eq!(rows[2].sd, 0.0);
    }

    #[test]
    fn test_failed_run_fails_whole_batch() {
        let (m, lex) = corpus();
        let agg = MultiRunAggregator::new(
            &m,
            &lex,
            RunConfig::new(2).num_iters(5).seed(100).ncores(2),
            AggregateConfig::new(4),
        );
        let err = agg
            .run_batch(|cfg, _| {
                if cfg.seed == Some(102) {
                    Err(JstError::Data("token inválido".into()))
                } else {
                    Ok(Array2::from_elem((2, 3), 1.0 / 3.0))
                }
            })
            .unwrap_err();
        assert!(matches!(err, JstError::RunFailed { run: 2, .. }), "{err}");
    }

    #[test]
    fn test_failure_cancels_running_siblings() {
        use std::sync::atomic::AtomicUsize;
        use std::time::{Duration, Instant};

        let (m, lex) = corpus();
        let agg = MultiRunAggregator::new(
            &m,
            &lex,
            RunConfig::new(2).num_iters(5).seed(100).ncores(2),
            AggregateConfig::new(8),
        );
        let running = AtomicUsize::new(0);
        let observed = AtomicUsize::new(0);
        let deadline = Instant::now() + Duration::from_secs(10);

        let started = Instant::now();
        let err = agg
            .run_batch(|cfg, cancel| {
                if cfg.seed == Some(100) {
                    // Falha só depois que alguma execução irmã estiver em andamento
                    while running.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
                        std::thread::yield_now();
                    }
                    return Err(JstError::Data("token inválido".into()));
                }
                running.fetch_add(1, Ordering::SeqCst);
                while !cancel.load(Ordering::Relaxed) {
                    if Instant::now() >= deadline {
                        return Ok(Array2::from_elem((2, 3), 1.0 / 3.0));
                    }
                    std::thread::yield_now();
                }
                observed.fetch_add(1, Ordering::SeqCst);
                Err(JstError::Cancelled)
            })
            .unwrap_err();

        match err {
            JstError::RunFailed { run, source } => {
                assert_eq!(run, 0);
                assert!(matches!(*source, JstError::Data(_)));
            }
            other => panic!("esperado RunFailed, obtido {other}"),
        }
        assert!(observed.load(Ordering::SeqCst) >= 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_cancelled_runs_not_counted_as_failures() {
        let (m, lex) = corpus();
        let agg = MultiRunAggregator::new(
            &m,
            &lex,
            RunConfig::new(2).num_iters(5).seed(200).ncores(1),
            AggregateConfig::new(4).allow_partial(true),
        );
        let report = agg
            .run_batch(|cfg, _| match cfg.seed {
                Some(201) => Err(JstError::Cancelled),
                Some(202) => Err(JstError::Data("token inválido".into())),
                _ => Ok(Array2::from_elem((2, 3), 1.0 / 3.0)),
            })
            .unwrap();
        assert_eq!(report.runs_completed, 2);
        assert_eq!(report.runs_failed, 1);
        assert_eq!(report.seeds, vec![200, 203]);
    }

    #[test]
    fn test_partial_results_on_opt_in() {
        let (m, lex) = corpus();
        let agg = MultiRunAggregator::new(
            &m,
            &lex,
            RunConfig::new(2).num_iters(5).seed(100).ncores(2),
            AggregateConfig::new(4).allow_partial(true),
        );
        let report = agg
            .run_batch(|cfg, _| {
                if cfg.seed == Some(101) {
                    Err(JstError::Data("token inválido".into()))
                } else {
                    Ok(Array2::from_elem((2, 3), 1.0 / 3.0))
                }
            })
            .unwrap();
        assert_eq!(report.runs_completed, 3);
        assert_eq!(report.runs_failed, 1);
        assert_eq!(report.seeds, vec![100, 102, 103]);
    }

    #[test]
    fn test_invalid_config_rejected_before_workers() {
        let (m, lex) = corpus();
        let agg = MultiRunAggregator::new(&m, &lex, RunConfig::new(0), AggregateConfig::new(3));
        assert!(matches!(agg.run(), Err(JstError::InvalidConfig(_))));
    }
}
