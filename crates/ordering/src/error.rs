use domain::DomainError;
use saga::SagaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderingError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Saga(#[from] SagaError),

    /// The repository returned an order without an id.
    #[error("saved order has no id")]
    MissingOrderId,
}

pub type Result<T> = std::result::Result<T, OrderingError>;
