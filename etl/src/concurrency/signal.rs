use tokio::sync::watch;

/// Sending side of a payload-free notification.
pub type SignalTx = watch::Sender<()>;

/// Receiving side of a payload-free notification.
pub type SignalRx = watch::Receiver<()>;

/// Creates a notification channel.
///
/// The initial value counts as seen, so [`wait_for_signal`] only resolves on a later send.
pub fn create_signal() -> (SignalTx, SignalRx) {
    watch::channel(())
}

/// Waits until the sender signals or is dropped.
pub async fn wait_for_signal(rx: &mut SignalRx) {
    // A dropped sender can never signal again, so it counts as a signal.
    let _ = rx.changed().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn resolves_on_send_and_on_drop() {
        let (tx, mut rx) = create_signal();
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), wait_for_signal(&mut rx))
            .await
            .unwrap();

        let (tx, mut rx) = create_signal();
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), wait_for_signal(&mut rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn initial_value_does_not_resolve() {
        let (_tx, mut rx) = create_signal();

        let result =
            tokio::time::timeout(Duration::from_millis(20), wait_for_signal(&mut rx)).await;
        assert!(result.is_err());
    }
}
