use std::future::Future;
use std::pin::Pin;

// Type aliases for common types
pub type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type SatchelResult<T> = Result<T, anyhow::Error>;

/// Milliseconds since the Unix epoch, the unit every stored timestamp uses.
pub type EpochMillis = u64;
