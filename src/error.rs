// src/error.rs
//! Типы ошибок генератора регионов.
//!
//! Ошибки делятся на три уровня:
//! - [`SampleError`] — отказ одной выборки (таймаут или ошибка адаптера);
//! - [`ConfigError`] — некорректная конфигурация, обнаруживается до начала работы;
//! - [`GenerationError`] — фатальная ошибка всего прогона, результата не будет.

use std::path::PathBuf;

use thiserror::Error;

/// Ошибка одной выборки высоты/категории.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SampleError {
    /// Выборка не уложилась в отведённое время.
    #[error("sample timed out")]
    Timeout,
    /// Адаптер вернул ошибку для конкретной точки.
    #[error("sample failed: {0}")]
    Failed(String),
    /// Адаптер недоступен насовсем — продолжать прогон бессмысленно.
    #[error("sampler unavailable: {0}")]
    Unavailable(String),
}

impl SampleError {
    /// Можно ли пережить эту ошибку, оставив ячейку со значением по умолчанию.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SampleError::Unavailable(_))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("unresolvable category `{0}`")]
    UnresolvableCategory(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Фатальная ошибка прогона генерации.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("sampling stopped: {0}")]
    SamplerUnavailable(String),
    #[error("region pipeline failed: {0}")]
    Pipeline(String),
}

impl From<tokio::task::JoinError> for GenerationError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            GenerationError::Pipeline("pipeline worker panicked".to_string())
        } else {
            GenerationError::Pipeline("pipeline worker was cancelled".to_string())
        }
    }
}
