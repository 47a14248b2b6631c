//! Bundled services driven through the dispatcher over in-memory channels.

use std::sync::Arc;
use std::time::Duration;

use quadrpc_common::messages::*;
use quadrpc_common::{Call, CallHeader, CallShape, Code, Codec, Deadline, MessageChannel};
use quadrpc_metrics::ServerMetricsCollector;
use quadrpc_server::{default_registry, Dispatcher, EmitPolicy, ServerConfig};

fn dispatcher(config: &ServerConfig) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(
        default_registry(config),
        Arc::new(ServerMetricsCollector::new()),
        config.max_call_timeout,
    ))
}

async fn open(
    dispatcher: &Arc<Dispatcher>,
    method: &str,
    shape: CallShape,
    deadline: Option<Deadline>,
) -> Call {
    let (caller_end, callee_end) = MessageChannel::pair(Codec::Postcard, 64 * 1024);
    let dispatcher = dispatcher.clone();
    tokio::spawn(async move { dispatcher.serve_channel(callee_end).await });
    Call::open(caller_end, CallHeader::new(method, shape), deadline)
        .await
        .unwrap()
}

async fn drain<T: serde::de::DeserializeOwned>(call: &Call) -> Vec<T> {
    let mut out = Vec::new();
    while let Some(item) = call.recv::<T>().await.unwrap() {
        out.push(item);
    }
    out
}

#[tokio::test]
async fn test_add() {
    let dispatcher = dispatcher(&ServerConfig::default());
    let call = open(&dispatcher, ADD, CallShape::Unary, None).await;
    call.send(&AddRequest { first: 3, second: 10 }).await.unwrap();
    let response: AddResponse = call.recv().await.unwrap().unwrap();
    assert_eq!(response.result, 13);
    assert_eq!(call.terminated().await.code(), Code::Ok);
}

#[tokio::test]
async fn test_decompose_number() {
    let dispatcher = dispatcher(&ServerConfig::default());
    let call = open(&dispatcher, DECOMPOSE_NUMBER, CallShape::ServerStream, None).await;
    call.send(&DecomposeRequest { number: 12 }).await.unwrap();
    let factors: Vec<i64> = drain::<DecomposeResponse>(&call)
        .await
        .into_iter()
        .map(|r| r.factor)
        .collect();
    assert_eq!(factors, vec![2, 2, 3]);
    assert_eq!(call.status(), Some(quadrpc_common::Status::ok()));
}

#[tokio::test]
async fn test_decompose_large_input_leaves_runtime_responsive() {
    // Trial division has to run up to the square root, about 10^8 divisors.
    const LARGE: i64 = 99_999_989 * 99_999_989;

    let dispatcher = dispatcher(&ServerConfig::default());
    let call = open(&dispatcher, DECOMPOSE_NUMBER, CallShape::ServerStream, None).await;
    call.send(&DecomposeRequest { number: LARGE }).await.unwrap();

    let started = std::time::Instant::now();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(started.elapsed() < Duration::from_millis(500));

    let factors: Vec<i64> = drain::<DecomposeResponse>(&call)
        .await
        .into_iter()
        .map(|r| r.factor)
        .collect();
    assert_eq!(factors.iter().product::<i64>(), LARGE);
    assert!(factors.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_decompose_rejects_zero() {
    let dispatcher = dispatcher(&ServerConfig::default());
    let call = open(&dispatcher, DECOMPOSE_NUMBER, CallShape::ServerStream, None).await;
    call.send(&DecomposeRequest { number: 0 }).await.unwrap();
    let err = call.recv::<DecomposeResponse>().await.unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_compute_average() {
    let dispatcher = dispatcher(&ServerConfig::default());
    let call = open(&dispatcher, COMPUTE_AVERAGE, CallShape::ClientStream, None).await;
    for number in [2, 4, 6] {
        call.send(&AverageRequest { number }).await.unwrap();
    }
    let response: AverageResponse = call.close_and_recv().await.unwrap();
    assert_eq!(response.average, 4.0);
}

#[tokio::test]
async fn test_compute_average_of_nothing() {
    let dispatcher = dispatcher(&ServerConfig::default());
    let call = open(&dispatcher, COMPUTE_AVERAGE, CallShape::ClientStream, None).await;
    let err = call.close_and_recv::<AverageResponse>().await.unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_find_maximum_interleaved() {
    let dispatcher = dispatcher(&ServerConfig::default());
    let call = open(&dispatcher, FIND_MAXIMUM, CallShape::BidiStream, None).await;

    call.send(&MaximumRequest { number: 1 }).await.unwrap();
    call.send(&MaximumRequest { number: 5 }).await.unwrap();
    // The response to 5 arrives before the stream is closed.
    let first: MaximumResponse = call.recv().await.unwrap().unwrap();
    assert_eq!(first.maximum, 5);

    for number in [3, 7, 2] {
        call.send(&MaximumRequest { number }).await.unwrap();
    }
    call.half_close().await.unwrap();

    let rest: Vec<i64> = drain::<MaximumResponse>(&call)
        .await
        .into_iter()
        .map(|r| r.maximum)
        .collect();
    assert_eq!(rest, vec![7]);
}

#[tokio::test]
async fn test_find_maximum_every_element() {
    let config = ServerConfig::default().with_emit_policy(EmitPolicy::EveryElement);
    let dispatcher = dispatcher(&config);
    let call = open(&dispatcher, FIND_MAXIMUM, CallShape::BidiStream, None).await;

    for number in [1, 5, 3] {
        call.send(&MaximumRequest { number }).await.unwrap();
    }
    call.half_close().await.unwrap();

    let maxima: Vec<i64> = drain::<MaximumResponse>(&call)
        .await
        .into_iter()
        .map(|r| r.maximum)
        .collect();
    assert_eq!(maxima, vec![1, 5, 5]);
}

#[tokio::test]
async fn test_square_root_error_has_no_payload() {
    let dispatcher = dispatcher(&ServerConfig::default());
    let call = open(&dispatcher, SQUARE_ROOT, CallShape::Unary, None).await;
    call.send(&SquareRootRequest { number: -2 }).await.unwrap();
    let err = call.recv::<SquareRootResponse>().await.unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(err.message(), "Received a negative number: -2");
}

#[tokio::test]
async fn test_greet_many_times() {
    let dispatcher = dispatcher(&ServerConfig::default());
    let call = open(&dispatcher, GREET_MANY_TIMES, CallShape::ServerStream, None).await;
    call.send(&GreetRequest::from(Greeting::new("Jane", "Doe")))
        .await
        .unwrap();
    let greetings = drain::<GreetResponse>(&call).await;
    assert_eq!(greetings.len(), 10);
    assert_eq!(greetings[0].result, "Hello Jane number 0");
    assert_eq!(greetings[9].result, "Hello Jane number 9");
}

#[tokio::test]
async fn test_long_greet_and_greet_everyone() {
    let dispatcher = dispatcher(&ServerConfig::default());

    let call = open(&dispatcher, LONG_GREET, CallShape::ClientStream, None).await;
    for name in ["Ann", "Bob"] {
        call.send(&GreetRequest::from(Greeting::new(name, "")))
            .await
            .unwrap();
    }
    let response: GreetResponse = call.close_and_recv().await.unwrap();
    assert_eq!(response.result, "Hello Ann! Hello Bob! ");

    let call = open(&dispatcher, GREET_EVERYONE, CallShape::BidiStream, None).await;
    call.send(&GreetRequest::from(Greeting::new("Ann", "")))
        .await
        .unwrap();
    let echo: GreetResponse = call.recv().await.unwrap().unwrap();
    assert_eq!(echo.result, "Hello Ann! ");
    call.half_close().await.unwrap();
    assert!(call.recv::<GreetResponse>().await.unwrap().is_none());
}

#[tokio::test]
async fn test_greet_with_deadline_expires_on_both_sides() {
    let config = ServerConfig::default().with_greet_step(Duration::from_millis(200));
    let dispatcher = dispatcher(&config);
    let deadline = Deadline::after(Duration::from_millis(300));
    let call = open(&dispatcher, GREET_WITH_DEADLINE, CallShape::Unary, Some(deadline)).await;
    call.send(&GreetRequest::from(Greeting::new("Jane", "")))
        .await
        .unwrap();

    let err = call.recv::<GreetResponse>().await.unwrap_err();
    assert_eq!(err.code(), Code::DeadlineExceeded);
}

#[tokio::test]
async fn test_greet_with_deadline_in_time() {
    let config = ServerConfig::default().with_greet_step(Duration::from_millis(10));
    let dispatcher = dispatcher(&config);
    let deadline = Deadline::after(Duration::from_secs(5));
    let call = open(&dispatcher, GREET_WITH_DEADLINE, CallShape::Unary, Some(deadline)).await;
    call.send(&GreetRequest::from(Greeting::new("Jane", "")))
        .await
        .unwrap();

    let response: GreetResponse = call.recv().await.unwrap().unwrap();
    assert_eq!(response.result, "Hello Jane");
}
