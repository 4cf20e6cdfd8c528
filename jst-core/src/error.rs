//! Erros do motor de inferência.

use thiserror::Error;

/// Erros que podem ocorrer ao configurar ou executar o amostrador.
///
/// A taxonomia segue três famílias:
/// - **Configuração** (`InvalidConfig`, `DimensionMismatch`): rejeitada antes de alocar estado.
/// - **Dados** (`Data`): matriz malformada ou índices fora do intervalo; aborta a execução.
/// - **Execução** (`Cancelled`, `RunFailed`, `ThreadPool`): falhas do agregador multi-execução.
#[derive(Error, Debug)]
pub enum JstError {
    #[error("Configuração inválida: {0}")]
    InvalidConfig(String),

    #[error("Dimensões incompatíveis em {what}: esperado {expected}, encontrado {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Dados inválidos: {0}")]
    Data(String),

    #[error("Execução cancelada")]
    Cancelled,

    #[error("Execução {run} falhou: {source}")]
    RunFailed {
        run: usize,
        #[source]
        source: Box<JstError>,
    },

    #[error("Falha ao criar o pool de threads: {0}")]
    ThreadPool(String),
}

impl JstError {
    /// Verdadeiro para erros que o chamador deve corrigir na configuração,
    /// e não nos dados.
    pub fn is_config(&self) -> bool {
        matches!(self, JstError::InvalidConfig(_) | JstError::DimensionMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, JstError>;
