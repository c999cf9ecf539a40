//! A trip-booking saga driven end-to-end over the in-memory command log.
//!
//! Four forward steps book and pay for a hotel and an airport transfer. The
//! last step declines the payment with the abort sentinel, so the coordinator
//! rolls the three earlier bookings back in reverse order.
//!
//! Run with: `cargo run -p saga --example trip_booking`

use std::sync::Arc;
use std::time::Duration;

use command_log::{Command, CommandKind, CommandLog, InMemoryCommandLog};
use saga::{AbortSaga, SagaBuilder, SagaCoordinator, StepResult, TracingErrorSink};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// A step body that logs a message and succeeds.
fn announce(
    message: &'static str,
) -> impl Fn(CancellationToken, serde_json::Value) -> std::future::Ready<StepResult> + Send + Sync
{
    move |_ctx, params| {
        tracing::info!(%params, "{message}");
        std::future::ready(Ok(()))
    }
}

/// The payment provider's rejection, wrapping the abort sentinel. The
/// coordinator detects the sentinel through the source chain.
#[derive(Debug, thiserror::Error)]
#[error("transfer payment declined: {source}")]
struct TransferPaymentDeclined {
    #[source]
    source: AbortSaga,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let trip_booking = SagaBuilder::new("TripBooking")
        .begin("BookHotel", announce("hotel booked"))
        .with_compensation("CancelHotelBooking", announce("hotel booking cancelled"))
        .then("PayHotelBooking", announce("hotel paid"))
        .with_compensation("RefundHotelBooking", announce("hotel payment refunded"))
        .then("BookTransfer", announce("transfer booked"))
        .with_compensation("CancelTransferBooking", announce("transfer booking cancelled"))
        .then("PayTransferBooking", |_ctx, _params| {
            std::future::ready(Err(
                TransferPaymentDeclined { source: AbortSaga }.into()
            ))
        })
        .with_compensation("RefundTransferBooking", announce("transfer payment refunded"))
        .end()
        .expect("valid saga definition");

    let log = InMemoryCommandLog::new();
    let mut coordinator = SagaCoordinator::new(log.clone(), Arc::new(TracingErrorSink));
    coordinator.register_saga(trip_booking);

    log.write(Command::begin_saga("TripBooking", json!({"guest": "Alex"})))
        .await
        .expect("write BeginSaga");

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { coordinator.start(shutdown).await }
    });

    // Wait until the terminal command has been written and consumed.
    loop {
        let done = log
            .history()
            .await
            .iter()
            .any(|c| c.kind == CommandKind::EndSaga)
            && log.pending_count().await == 0
            && log.in_flight_count().await == 0;
        if done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    shutdown.cancel();
    worker.await.expect("coordinator task");

    for command in log.history().await {
        tracing::info!(kind = %command.kind, step = %command.transaction_id, "log entry");
    }
}
