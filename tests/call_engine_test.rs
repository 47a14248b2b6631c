//! Call engine behaviour with custom handlers, through the public API.

use std::sync::Arc;
use std::time::Duration;

use quadrpc::metrics::ServerMetricsCollector;
use quadrpc::server::{RequestStream, ResponseSink};
use quadrpc::{in_process, CallShape, Code, Dispatcher, HandlerRegistry, RpcClient, Status};
use tokio::sync::oneshot;

fn client_for(registry: HandlerRegistry) -> RpcClient<impl quadrpc::Connector + Clone> {
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        Arc::new(ServerMetricsCollector::new()),
        Duration::from_secs(30),
    ));
    RpcClient::new(in_process(dispatcher))
}

#[tokio::test]
async fn test_bidi_directions_progress_independently() {
    let mut registry = HandlerRegistry::new();
    registry.bidi_stream(
        "echo.Echo",
        |mut requests: RequestStream<u32>, responses: ResponseSink<u32>| async move {
            while let Some(n) = requests.next().await? {
                responses.send(&n).await?;
            }
            Ok(())
        },
    );
    let client = client_for(registry);
    let call = client.bidi_stream("echo.Echo", None).await.unwrap();

    const COUNT: u32 = 2_000;
    let sender = call.clone();
    let send_loop = tokio::spawn(async move {
        for n in 0..COUNT {
            sender.send(&n).await?;
        }
        sender.half_close().await
    });

    let mut expected = 0;
    while let Some(n) = call.recv::<u32>().await.unwrap() {
        assert_eq!(n, expected, "messages must arrive in send order");
        expected += 1;
    }
    assert_eq!(expected, COUNT);
    send_loop.await.unwrap().unwrap();
    assert_eq!(call.status(), Some(Status::ok()));
}

#[tokio::test]
async fn test_handler_observes_caller_abort() {
    let (seen_tx, seen_rx) = oneshot::channel();
    let seen_tx = Arc::new(std::sync::Mutex::new(Some(seen_tx)));

    let mut registry = HandlerRegistry::new();
    registry.unary("slow.Wait", move |_: (), ctx: quadrpc::CallContext| {
        let seen_tx = seen_tx.clone();
        async move {
            let status = ctx.cancelled().await;
            if let Some(tx) = seen_tx.lock().unwrap().take() {
                let _ = tx.send(status.clone());
            }
            Err::<(), _>(status)
        }
    });
    let client = client_for(registry);

    let call = client.invoke("slow.Wait", CallShape::Unary, None).await.unwrap();
    call.send(&()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    call.abort(Status::internal("caller gave up")).await;

    let seen = tokio::time::timeout(Duration::from_secs(5), seen_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seen.code(), Code::Internal);
    assert_eq!(seen.message(), "caller gave up");
}

#[tokio::test]
async fn test_caller_deadline_fails_later_operations() {
    let mut registry = HandlerRegistry::new();
    registry.client_stream("sink.Count", |mut requests: RequestStream<u8>| async move {
        let mut count = 0u64;
        while requests.next().await?.is_some() {
            count += 1;
        }
        Ok(count)
    });
    let client = client_for(registry);

    let call = client
        .client_stream("sink.Count", Some(Duration::from_millis(50)))
        .await
        .unwrap();
    call.send(&1u8).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = call.send(&2u8).await.unwrap_err();
    assert_eq!(err.code(), Code::DeadlineExceeded);
    let err = call.close_and_recv::<u64>().await.unwrap_err();
    assert_eq!(err.code(), Code::DeadlineExceeded);
}

#[tokio::test]
async fn test_server_stream_delivers_data_before_failure() {
    let mut registry = HandlerRegistry::new();
    registry.server_stream("count.Up", |limit: u32, responses: ResponseSink<u32>| async move {
        for n in 0..limit {
            responses.send(&n).await?;
        }
        Err(Status::invalid_argument("limit reached"))
    });
    let client = client_for(registry);

    let call = client.server_stream("count.Up", &3u32, None).await.unwrap();
    let mut received = Vec::new();
    let err = loop {
        match call.recv::<u32>().await {
            Ok(Some(n)) => received.push(n),
            Ok(None) => panic!("stream should end with an error"),
            Err(status) => break status,
        }
    };
    assert_eq!(received, vec![0, 1, 2]);
    assert_eq!(err.code(), Code::InvalidArgument);
    assert_eq!(call.status(), Some(err));
}

#[tokio::test]
async fn test_handler_panic_is_internal() {
    let mut registry = HandlerRegistry::new();
    registry.unary("bad.Panic", |n: u8, _ctx| async move {
        if n > 0 {
            panic!("boom");
        }
        Ok(n)
    });
    let client = client_for(registry);

    let err = client.unary::<_, u8>("bad.Panic", &1u8, None).await.unwrap_err();
    assert_eq!(err.code(), Code::Internal);

    assert_eq!(client.unary::<_, u8>("bad.Panic", &0u8, None).await.unwrap(), 0);
}
