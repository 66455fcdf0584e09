pub mod body;
pub mod download;
pub mod get_object;
pub mod pool;
pub mod put_object;
pub mod range;
pub mod reader;
pub mod upload;

use crate::error::TransferError;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run `future` unless `cancel` fires first
pub(crate) async fn cancellable<F, T>(cancel: &CancellationToken, future: F) -> Result<T, TransferError>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(TransferError::Cancelled),
        output = future => Ok(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancellable() {
        let cancel = CancellationToken::new();
        assert!(matches!(cancellable(&cancel, async { 1 }).await, Ok(1)));

        cancel.cancel();
        assert!(matches!(
            cancellable(&cancel, std::future::pending::<()>()).await,
            Err(TransferError::Cancelled)
        ));
    }
}
