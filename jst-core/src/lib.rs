//! # jst-core — Modelo Conjunto Sentimento-Tópico (JST / rJST)
//!
//! Este crate implementa a inferência por amostragem de Gibbs colapsada do modelo
//! **Joint Sentiment-Topic**, usado para analisar corpora como discursos políticos:
//! cada ocorrência de palavra recebe um par latente (sentimento, tópico), e um
//! dicionário de sentimento semeia os priors para que palavras positivas tendam ao
//! rótulo positivo (e negativas ao negativo).
//!
//! ## Arquitetura do Sistema
//!
//! Os componentes, das folhas para o topo:
//!
//! 1.  **Adaptador de Matriz** ([`matrix`], [`lexicon`]): matriz documento-termo esparsa,
//!     vocabulário e léxico de polaridades. Imutáveis durante a execução.
//! 2.  **Priors** ([`prior`]): Dirichlet $\alpha$, $\beta$ (assimétrico, semeado pelo léxico) e $\gamma$.
//! 3.  **Amostrador** ([`sampler`]): atribuições latentes + [`counts`], varreduras de Gibbs,
//!     reestimação opcional de hiperparâmetros ([`hyper`]).
//! 4.  **Estimador** ([`estimate`]): $\pi$, $\theta$ e $\varphi$ a partir das contagens.
//! 5.  **Agregador** ([`aggregate`]): $N$ execuções independentes em paralelo, resumidas por
//!     média, desvio padrão, erro padrão e intervalo de confiança.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use jst_core::{DocumentTermMatrix, GibbsSampler, Lexicon, RunConfig, Sentiment};
//!
//! // 1. Documentos já tokenizados/stemizados
//! let docs = vec![
//!     ("d1".to_string(), vec!["bom", "ótimo", "economia"]),
//!     ("d2".to_string(), vec!["crise", "ruim", "economia"]),
//! ];
//! let (matrix, vocab) = DocumentTermMatrix::from_tokenized(&docs).unwrap();
//!
//! // 2. Léxico resolvido contra o vocabulário
//! let lexicon = Lexicon::from_terms(&vocab, vec![
//!     ("bom", Sentiment::Positive),
//!     ("ruim", Sentiment::Negative),
//! ]).unwrap();
//!
//! // 3. Amostragem com semente fixa
//! let config = RunConfig::new(2).num_iters(50).seed(42);
//! let mut sampler = GibbsSampler::new(&config, &matrix, &lexicon).unwrap();
//! let estimates = sampler.run().unwrap();
//!
//! // 4. Distribuição de sentimento por documento
//! let pi = estimates.document_sentiment();
//! assert_eq!(pi.nrows(), 2);
//! ```

pub mod aggregate;
pub mod config;
pub mod counts;
pub mod error;
pub mod estimate;
pub mod hyper;
pub mod lexicon;
pub mod matrix;
pub mod prior;
pub mod sampler;
pub mod sentiment;

pub use aggregate::{AggregateReport, MultiRunAggregator, SentimentSummary};
pub use config::{AggregateConfig, ModelKind, RunConfig};
pub use error::{JstError, Result};
pub use estimate::Estimates;
pub use lexicon::Lexicon;
pub use matrix::{DocumentTermMatrix, Vocabulary};
pub use sampler::{GibbsSampler, SamplerEvent, SamplerState};
pub use sentiment::{Sentiment, SentimentClasses};
