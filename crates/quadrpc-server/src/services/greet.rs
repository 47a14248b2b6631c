//! Greet service.

use std::time::Duration;

use quadrpc_common::messages::{
    GreetRequest, GreetResponse, GREET, GREET_EVERYONE, GREET_MANY_TIMES, GREET_WITH_DEADLINE,
    LONG_GREET,
};
use quadrpc_common::{CallContext, Status};

use crate::dispatch::{HandlerRegistry, RequestStream, ResponseSink};

/// Number of responses sent by `GreetManyTimes`.
pub const GREET_MANY_COUNT: usize = 10;

/// Number of work steps in `GreetWithDeadline`.
const DEADLINE_STEPS: usize = 3;

/// `greet.*` operations.
#[derive(Debug, Clone, Copy)]
pub struct GreetService {
    step: Duration,
}

impl Default for GreetService {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl GreetService {
    /// `step` is the length of each work step of `GreetWithDeadline`.
    pub fn new(step: Duration) -> Self {
        Self { step }
    }

    pub fn register(self, registry: &mut HandlerRegistry) {
        let step = self.step;
        registry
            .unary(GREET, greet)
            .server_stream(GREET_MANY_TIMES, greet_many_times)
            .client_stream(LONG_GREET, long_greet)
            .bidi_stream(GREET_EVERYONE, greet_everyone)
            .unary(GREET_WITH_DEADLINE, move |request: GreetRequest, ctx: CallContext| {
                greet_with_deadline(request, ctx, step)
            });
    }
}

async fn greet(request: GreetRequest, _ctx: CallContext) -> Result<GreetResponse, Status> {
    Ok(GreetResponse {
        result: format!("Hello {}", request.greeting.first_name),
    })
}

async fn greet_many_times(
    request: GreetRequest,
    responses: ResponseSink<GreetResponse>,
) -> Result<(), Status> {
    for i in 0..GREET_MANY_COUNT {
        let result = format!("Hello {} number {}", request.greeting.first_name, i);
        responses.send(&GreetResponse { result }).await?;
    }
    Ok(())
}

async fn long_greet(mut requests: RequestStream<GreetRequest>) -> Result<GreetResponse, Status> {
    let mut result = String::new();
    while let Some(request) = requests.next().await? {
        result.push_str(&format!("Hello {}! ", request.greeting.first_name));
    }
    Ok(GreetResponse { result })
}

async fn greet_everyone(
    mut requests: RequestStream<GreetRequest>,
    responses: ResponseSink<GreetResponse>,
) -> Result<(), Status> {
    while let Some(request) = requests.next().await? {
        let result = format!("Hello {}! ", request.greeting.first_name);
        responses.send(&GreetResponse { result }).await?;
    }
    Ok(())
}

async fn greet_with_deadline(
    request: GreetRequest,
    ctx: CallContext,
    step: Duration,
) -> Result<GreetResponse, Status> {
    for i in 0..DEADLINE_STEPS {
        if ctx.is_cancelled() {
            tracing::debug!(call_id = ctx.call_id(), step = i, "cancelled between steps");
            return Err(ctx.cancelled().await);
        }
        tokio::select! {
            status = ctx.cancelled() => return Err(status),
            _ = tokio::time::sleep(step) => {}
        }
    }

    Ok(GreetResponse {
        result: format!("Hello {}", request.greeting.first_name),
    })
}
