//! In-process confirmation source, for embedding and tests.

use crate::{ConfirmationSourceInterface, DiscoveryError};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use topup_types::OrderConfirmRequest;

pub struct ChannelSource {
	receiver: Mutex<Option<mpsc::UnboundedReceiver<OrderConfirmRequest>>>,
	stop_signal: Mutex<Option<oneshot::Sender<()>>>,
}

impl ChannelSource {
	/// Creates the source together with the handle used to feed it.
	pub fn new() -> (Self, mpsc::UnboundedSender<OrderConfirmRequest>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let source = Self {
			receiver: Mutex::new(Some(rx)),
			stop_signal: Mutex::new(None),
		};
		(source, tx)
	}
}

#[async_trait]
impl ConfirmationSourceInterface for ChannelSource {
	async fn start(
		&self,
		sender: mpsc::UnboundedSender<OrderConfirmRequest>,
	) -> Result<(), DiscoveryError> {
		let mut receiver = self
			.receiver
			.lock()
			.await
			.take()
			.ok_or(DiscoveryError::AlreadyMonitoring)?;
		let (stop_tx, mut stop_rx) = oneshot::channel();
		*self.stop_signal.lock().await = Some(stop_tx);

		tokio::spawn(async move {
			loop {
				tokio::select! {
					message = receiver.recv() => match message {
						Some(request) => {
							if sender.send(request).is_err() {
								break;
							}
						}
						None => break,
					},
					_ = &mut stop_rx => break,
				}
			}
		});
		Ok(())
	}

	async fn stop(&self) -> Result<(), DiscoveryError> {
		if let Some(stop_tx) = self.stop_signal.lock().await.take() {
			let _ = stop_tx.send(());
		}
		Ok(())
	}
}
