//! Subscribe to a WebPush server and monitor for push messages.
//!
//! Expects a WebPush server on localhost:8443 (self-signed certificates
//! are accepted). Run with: cargo run --example demo

use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{error, info};

use webpush_core::prelude::*;
use webpush_h2::prelude::*;

#[tokio::main]
async fn main() -> Result<(), WebPushError> {
    tracing_subscriber::fmt::init();

    let config = H2Config {
        trust_all: true,
        ..H2Config::default()
    };
    let transport = Arc::new(H2Transport::new(config).await?);
    let engine = SessionEngine::new(transport, SessionConfig::default());

    let subscribe_engine = engine.clone();
    let callback: SubscriptionCallback = Arc::new(move |result| {
        let engine = subscribe_engine.clone();
        Box::pin(async move {
            let subscription = result?;
            info!(%subscription, push_resource = subscription.push_resource(), "subscribed");

            // Check for pending messages; the no-content outcome hands
            // over to a blocking monitor for everything that arrives
            // afterwards.
            let poll_engine = engine.clone();
            let poll_subscription = subscription.clone();
            let once: MessageCallback = Arc::new(move |result| {
                let engine = poll_engine.clone();
                let subscription = poll_subscription.clone();
                Box::pin(async move {
                    match result? {
                        Some(message) => {
                            info!(%message, data = message.data(), "pending message")
                        }
                        None => {
                            info!("no pending messages, long-polling");
                            let on_message: MessageCallback = Arc::new(|result| {
                                Box::pin(async move {
                                    match result {
                                        Ok(Some(message)) => {
                                            info!(%message, data = message.data(), "push message")
                                        }
                                        Ok(None) => {}
                                        Err(e) => error!(error = %e, "monitoring failed"),
                                    }
                                    Ok(())
                                })
                            });
                            engine
                                .monitor(subscription, MonitorMode::Blocking, on_message)
                                .await;
                        }
                    }
                    Ok(())
                })
            });
            engine
                .monitor(subscription, MonitorMode::NonBlocking, once)
                .await;
            Ok(())
        })
    });
    engine.subscribe(callback);

    sleep(Duration::from_secs(30)).await;
    engine.disconnect().await
}
