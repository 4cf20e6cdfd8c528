//! # Configuração de Execução
//!
//! As opções reconhecidas seguem os nomes usados pelos chamadores do modelo
//! (`numTopics`, `numIters`, `numSentiments`, `alpha`, `beta`, `gamma`,
//! `updateParaStep`, `seed`, `ncores`), por isso a serialização usa camelCase.
//!
//! ```rust
//! use jst_core::{RunConfig, SentimentClasses};
//!
//! let config = RunConfig::new(5)
//!     .num_iters(200)
//!     .num_sentiments(SentimentClasses::Two)
//!     .seed(42);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{JstError, Result};
use crate::sentiment::SentimentClasses;

/// Variante do modelo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    /// **JST**: sentimento amostrado primeiro, tópico condicionado ao sentimento.
    #[serde(rename = "jst")]
    Jst,
    /// **rJST** (reversed JST): tópico primeiro, sentimento condicionado ao tópico.
    #[serde(rename = "rjst")]
    ReversedJst,
}

impl Default for ModelKind {
    fn default() -> Self {
        ModelKind::Jst
    }
}

/// Configuração de uma execução do amostrador.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunConfig {
    pub model: ModelKind,
    /// Número de tópicos $K$.
    pub num_topics: usize,
    /// Número de varreduras de Gibbs (sem detecção de convergência).
    pub num_iters: usize,
    pub num_sentiments: SentimentClasses,
    /// Prior documento-sentimento-tópico. `None` = derivado dos dados.
    pub alpha: Option<f64>,
    /// Prior sentimento-tópico-palavra (linha de base). `None` = 0.01.
    pub beta: Option<f64>,
    /// Prior documento-sentimento. `None` = derivado dos dados.
    pub gamma: Option<f64>,
    /// Intervalo de reestimação dos hiperparâmetros; 0 desativa.
    pub update_para_step: usize,
    pub seed: Option<u64>,
    /// Paralelismo do modo multi-execução. `None` = núcleos disponíveis menos um.
    pub ncores: Option<usize>,
    /// Inicia tokens de palavras do léxico no rótulo do léxico em vez de um rótulo aleatório.
    pub lexicon_init: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::Jst,
            num_topics: 10,
            num_iters: 1000,
            num_sentiments: SentimentClasses::Three,
            alpha: None,
            beta: None,
            gamma: None,
            update_para_step: 0,
            seed: None,
            ncores: None,
            lexicon_init: true,
        }
    }
}

impl RunConfig {
    pub fn new(num_topics: usize) -> Self {
        Self {
            num_topics,
            ..Default::default()
        }
    }

    pub fn model(mut self, model: ModelKind) -> Self {
        self.model = model;
        self
    }

    pub fn num_iters(mut self, n: usize) -> Self {
        self.num_iters = n;
        self
    }

    pub fn num_sentiments(mut self, classes: SentimentClasses) -> Self {
        self.num_sentiments = classes;
        self
    }

    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    pub fn beta(mut self, beta: f64) -> Self {
        self.beta = Some(beta);
        self
    }

    pub fn gamma(mut self, gamma: f64) -> Self {
        self.gamma = Some(gamma);
        self
    }

    pub fn update_para_step(mut self, step: usize) -> Self {
        self.update_para_step = step;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn ncores(mut self, n: usize) -> Self {
        self.ncores = Some(n);
        self
    }

    pub fn lexicon_init(mut self, enabled: bool) -> Self {
        self.lexicon_init = enabled;
        self
    }

    /// Rejeita configurações inválidas antes de qualquer alocação.
    ///
    /// Priors não positivos são erro de configuração: com eles uma linha inteira de
    /// probabilidades pode zerar e a amostragem categórica fica indefinida.
    pub fn validate(&self) -> Result<()> {
        if self.num_topics == 0 {
            return Err(JstError::InvalidConfig("numTopics deve ser positivo".into()));
        }
        if self.num_iters == 0 {
            return Err(JstError::InvalidConfig("numIters deve ser positivo".into()));
        }
        for (name, value) in [("alpha", self.alpha), ("beta", self.beta), ("gamma", self.gamma)] {
            if let Some(v) = value {
                if !(v.is_finite() && v > 0.0) {
                    return Err(JstError::InvalidConfig(format!(
                        "{name} deve ser finito e positivo, recebido {v}"
                    )));
                }
            }
        }
        if self.ncores == Some(0) {
            return Err(JstError::InvalidConfig("ncores deve ser positivo".into()));
        }
        Ok(())
    }

    /// Threads usadas pelo agregador: `ncores` ou os núcleos disponíveis menos um.
    pub fn effective_ncores(&self) -> usize {
        self.ncores.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1)
        })
    }
}

/// Configuração do agregador multi-execução.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateConfig {
    /// Número $N$ de execuções independentes.
    pub repetitions: usize,
    /// Nível de confiança do intervalo simétrico (ex: 0.95).
    pub confidence_level: f64,
    /// Se verdadeiro, execuções com falha são descartadas em vez de abortar o lote.
    pub allow_partial: bool,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            repetitions: 10,
            confidence_level: 0.95,
            allow_partial: false,
        }
    }
}

impl AggregateConfig {
    pub fn new(repetitions: usize) -> Self {
        Self {
            repetitions,
            ..Default::default()
        }
    }

    pub fn confidence_level(mut self, level: f64) -> Self {
        self.confidence_level = level;
        self
    }

    pub fn allow_partial(mut self, allow: bool) -> Self {
        self.allow_partial = allow;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.repetitions == 0 {
            return Err(JstError::InvalidConfig("repetitions deve ser positivo".into()));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(JstError::InvalidConfig(format!(
                "confidenceLevel deve estar em (0, 1), recebido {}",
                self.confidence_level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_topics() {
        let err = RunConfig::new(0).validate().unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_rejects_non_positive_priors() {
        assert!(RunConfig::new(3).alpha(0.0).validate().is_err());
        assert!(RunConfig::new(3).beta(-0.1).validate().is_err());
        assert!(RunConfig::new(3).gamma(f64::NAN).validate().is_err());
        assert!(RunConfig::new(3).alpha(0.1).beta(0.01).gamma(1.0).validate().is_ok());
    }

    #[test]
    fn test_camel_case_options() {
        let json = r#"{"numTopics": 4, "numIters": 50, "numSentiments": 2, "updateParaStep": 10, "model": "rjst", "seed": 7}"#;
        let cfg: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.num_topics, 4);
        assert_eq!(cfg.num_sentiments, SentimentClasses::Two);
        assert_eq!(cfg.model, ModelKind::ReversedJst);
        assert_eq!(cfg.update_para_step, 10);
        // Campos ausentes usam o padrão
        assert_eq!(cfg.alpha, None);
        assert!(cfg.lexicon_init);
    }

    #[test]
    fn test_invalid_sentiment_count_in_json() {
        let json = r#"{"numSentiments": 5}"#;
        assert!(serde_json::from_str::<RunConfig>(json).is_err());
    }

    #[test]
    fn test_aggregate_config_bounds() {
        assert!(AggregateConfig::new(0).validate().is_err());
        assert!(AggregateConfig::new(5).confidence_level(1.0).validate().is_err());
        assert!(AggregateConfig::new(5).validate().is_ok());
        assert!(RunConfig::new(2).effective_ncores() >= 1);
    }
}
