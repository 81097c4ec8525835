//! End-to-end order lifecycle test.
//!
//! Runs the full verification against a stub order command service served
//! over real HTTP, with the in-memory event log standing in for Kafka:
//!
//! 1. POST the order to the stub service
//! 2. The service emits `OrderCreated`, then `OrderAssigned` a little later
//! 3. The scenario waits for both, publishes `OrderContainerAllocated`
//! 4. The history replay returns all three events in order
//!
//! ## Running
//!
//! ```bash
//! cargo test -p esv-e2e --test happy_path
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use esv_events::{encode, EventEnvelope};
use esv_log::MemoryLog;
use esv_verify::{
    CommandError, HistoryOptions, HttpOrderCommands, OrderLifecycleScenario, ScenarioConfig,
    ScenarioError, WaitOptions,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{info, warn};

const TOPIC: &str = "orders";

#[derive(Clone)]
struct StubOrderService {
    log: MemoryLog,
    next_id: Arc<AtomicU64>,
    /// Whether the voyage service assigns new orders.
    assigns: bool,
}

fn event(event_type: &str, payload: Value) -> EventEnvelope {
    let payload = payload.as_object().cloned().unwrap_or_default();
    EventEnvelope::new(event_type, payload)
}

fn emit(log: &MemoryLog, order_id: &str, envelope: &EventEnvelope) {
    let bytes = encode(envelope).expect("encode event");
    log.append(TOPIC, Some(order_id), bytes);
}

async fn create_order(
    State(service): State<StubOrderService>,
    Json(order): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if order.get("productID").is_none() {
        warn!("Rejecting order without productID");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "productID is required"})),
        );
    }

    let order_id = format!("ord-{}", service.next_id.fetch_add(1, Ordering::SeqCst));
    let mut created = order.clone();
    created["orderID"] = json!(order_id);
    created["status"] = json!("pending");
    emit(&service.log, &order_id, &event("OrderCreated", created));
    info!(order_id = %order_id, assigns = service.assigns, "Order created");

    if service.assigns {
        let log = service.log.clone();
        let order_id = order_id.clone();
        tokio::spawn(async move {
            // Unrelated traffic on the same topic.
            emit(
                &log,
                "other",
                &event("OrderCreated", json!({"orderID": "other"})),
            );
            tokio::time::sleep(Duration::from_millis(200)).await;
            emit(
                &log,
                &order_id,
                &event(
                    "OrderAssigned",
                    json!({"orderID": order_id, "voyageID": "V9"}),
                ),
            );
        });
    }

    (
        StatusCode::OK,
        Json(json!({"orderID": order_id, "status": "pending"})),
    )
}

async fn start_order_service(log: &MemoryLog, assigns: bool) -> String {
    let service = StubOrderService {
        log: log.clone(),
        next_id: Arc::new(AtomicU64::new(1)),
        assigns,
    };
    let app = Router::new()
        .route("/orders", post(create_order))
        .with_state(service);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Bare host:port, as ORDER_CMD_MS is usually given.
    addr.to_string()
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,esv_verify=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn scenario_config(deadline: Duration) -> ScenarioConfig {
    ScenarioConfig {
        topic: TOPIC.to_string(),
        wait: WaitOptions {
            poll_timeout: Duration::from_millis(100),
            deadline,
        },
        history: HistoryOptions {
            topic: TOPIC.to_string(),
            idle_timeout: Duration::from_millis(500),
            ..HistoryOptions::default()
        },
        flush_timeout: Duration::from_secs(2),
        ..ScenarioConfig::default()
    }
}

fn fresh_product_order() -> Value {
    json!({
        "productID": "FreshFoodItg",
        "customerID": "TestManuel",
        "quantity": 180,
        "pickupAddress": {
            "street": "astreet",
            "city": "Oakland",
            "country": "USA",
            "state": "CA",
            "zipcode": "95000"
        },
        "destinationAddress": {
            "street": "bstreet",
            "city": "Beijing",
            "country": "China",
            "state": "NE",
            "zipcode": "09000"
        },
        "pickupDate": "2019-01-14T17:48Z",
        "expectedDeliveryDate": "2019-01-15T17:48Z"
    })
}

#[tokio::test]
async fn order_lifecycle_happy_path() {
    init_tracing();

    let log = MemoryLog::with_partitions(3);
    let base = start_order_service(&log, true).await;

    let scenario = OrderLifecycleScenario::new(
        log.clone(),
        HttpOrderCommands::new(&base).unwrap(),
        scenario_config(Duration::from_secs(10)),
    );

    let report = scenario.run(&fresh_product_order()).await.unwrap();

    assert!(report.passed(), "scenario failed: {report:?}");
    assert_eq!(report.order_id, "ord-1");
    assert_eq!(report.voyage_id.as_deref(), Some("V9"));

    let lifecycle: Vec<_> = report
        .lifecycle
        .observed()
        .iter()
        .map(|e| e.event_type.as_str())
        .collect();
    assert_eq!(lifecycle, ["OrderCreated", "OrderAssigned"]);
    assert_eq!(
        report.lifecycle.observed()[0].payload_str("productID"),
        Some("FreshFoodItg")
    );

    let history: Vec<_> = report
        .history
        .iter()
        .map(|e| e.event_type.as_str())
        .collect();
    assert_eq!(
        history,
        ["OrderCreated", "OrderAssigned", "OrderContainerAllocated"]
    );
    assert_eq!(report.history[2].payload_str("containerID"), Some("c10"));

    // The live group's position was committed; the history replay's was not.
    assert!(log.committed("esv-orders-consumer", TOPIC).is_some());
}

#[tokio::test]
async fn unassigned_order_times_out() {
    init_tracing();

    let log = MemoryLog::new();
    let base = start_order_service(&log, false).await;

    let scenario = OrderLifecycleScenario::new(
        log.clone(),
        HttpOrderCommands::new(&base).unwrap(),
        scenario_config(Duration::from_secs(1)),
    );

    let report = scenario.run(&fresh_product_order()).await.unwrap();

    assert!(!report.passed());
    assert_eq!(report.lifecycle.observed().len(), 1);
    assert_eq!(report.lifecycle.remaining(), ["OrderAssigned".to_string()]);
    assert!(report.allocation.is_none());
    assert!(report.history.is_empty());
}

#[tokio::test]
async fn rejected_order_is_a_command_error() {
    init_tracing();

    let log = MemoryLog::new();
    let base = start_order_service(&log, true).await;

    let scenario = OrderLifecycleScenario::new(
        log.clone(),
        HttpOrderCommands::new(&base).unwrap(),
        scenario_config(Duration::from_secs(1)),
    );

    let err = scenario.run(&json!({"quantity": 1})).await.unwrap_err();
    match err {
        ScenarioError::Command(CommandError::Rejected { status, .. }) => assert_eq!(status, 400),
        other => panic!("unexpected error: {other}"),
    }
    assert!(log.is_empty(TOPIC));
}
