//! # Rótulos de Sentimento
//!
//! O JST trabalha com um conjunto fixo de rótulos de sentimento, escolhido na
//! construção do modelo:
//! - **2 classes**: positivo e negativo.
//! - **3 classes**: neutro, positivo e negativo.
//!
//! Todas as tabelas de contagem são dimensionadas a partir desta escolha, então ela
//! é modelada como um `enum` e não como um inteiro solto.

use serde::{Deserialize, Serialize};

use crate::error::JstError;

/// Polaridade de um termo ou rótulo latente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Neutral,
    Positive,
    Negative,
}

impl Sentiment {
    /// Nome curto usado em tabelas de saída.
    pub fn label(&self) -> &'static str {
        match self {
            Sentiment::Neutral => "neutral",
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "neutral" | "neu" | "neutro" => Some(Sentiment::Neutral),
            "positive" | "pos" | "positivo" => Some(Sentiment::Positive),
            "negative" | "neg" | "negativo" => Some(Sentiment::Negative),
            _ => None,
        }
    }
}

/// Quantidade de rótulos de sentimento do modelo (`numSentiments`).
///
/// Serializa como o inteiro `2` ou `3`, que é como a opção aparece na configuração.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SentimentClasses {
    Two,
    Three,
}

impl SentimentClasses {
    /// Rótulos na ordem dos índices das tabelas.
    ///
    /// Em 3 classes o neutro ocupa o índice 0, como no JST original.
    pub fn labels(&self) -> &'static [Sentiment] {
        match self {
            SentimentClasses::Two => &[Sentiment::Positive, Sentiment::Negative],
            SentimentClasses::Three => &[Sentiment::Neutral, Sentiment::Positive, Sentiment::Negative],
        }
    }

    pub fn count(&self) -> usize {
        self.labels().len()
    }

    /// Índice do rótulo nas tabelas, ou `None` se o rótulo não existe neste modo
    /// (neutro em 2 classes).
    pub fn index_of(&self, sentiment: Sentiment) -> Option<usize> {
        self.labels().iter().position(|s| *s == sentiment)
    }

    pub fn sentiment_at(&self, index: usize) -> Option<Sentiment> {
        self.labels().get(index).copied()
    }
}

impl Default for SentimentClasses {
    fn default() -> Self {
        SentimentClasses::Three
    }
}

impl TryFrom<u8> for SentimentClasses {
    type Error = JstError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            2 => Ok(SentimentClasses::Two),
            3 => Ok(SentimentClasses::Three),
            other => Err(JstError::InvalidConfig(format!(
                "numSentiments deve ser 2 ou 3, recebido {other}"
            ))),
        }
    }
}

impl From<SentimentClasses> for u8 {
    fn from(value: SentimentClasses) -> Self {
        value.count() as u8
    }
}
