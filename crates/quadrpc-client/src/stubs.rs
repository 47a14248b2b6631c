//! Typed stubs for the bundled calculator and greet services.

use std::time::Duration;

use quadrpc_common::messages::*;
use quadrpc_common::{Call, Status};
use serde::de::DeserializeOwned;

use crate::client::RpcClient;
use crate::connector::Connector;

/// Reads responses until the stream ends.
async fn collect<T: DeserializeOwned>(call: &Call) -> Result<Vec<T>, Status> {
    let mut items = Vec::new();
    while let Some(item) = call.recv().await? {
        items.push(item);
    }
    Ok(items)
}

/// Drives a bidi call: a spawned task sends `requests` and half-closes
/// while this task collects every response.
async fn exchange<Req, Resp>(call: Call, requests: Vec<Req>) -> Result<Vec<Resp>, Status>
where
    Req: serde::Serialize + Send + Sync + 'static,
    Resp: DeserializeOwned,
{
    let sender = call.clone();
    let send_loop = tokio::spawn(async move {
        for request in &requests {
            sender.send(request).await?;
        }
        sender.half_close().await
    });

    let received = collect(&call).await;
    let sent = send_loop
        .await
        .map_err(|e| Status::from_join_error(&e))?;

    // A failed call fails both loops; the receive side carries the trailer.
    let responses = received?;
    sent?;
    Ok(responses)
}

/// Client for `calculator.*`.
#[derive(Debug, Clone)]
pub struct CalculatorClient<C> {
    client: RpcClient<C>,
}

impl<C: Connector> CalculatorClient<C> {
    pub fn new(client: RpcClient<C>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RpcClient<C> {
        &self.client
    }

    pub async fn add(&self, first: i32, second: i32) -> Result<i64, Status> {
        let response: AddResponse = self
            .client
            .unary(ADD, &AddRequest { first, second }, None)
            .await?;
        Ok(response.result)
    }

    /// Prime factors of `number`, smallest first.
    pub async fn decompose_number(&self, number: i64) -> Result<Vec<i64>, Status> {
        let call = self
            .client
            .server_stream(DECOMPOSE_NUMBER, &DecomposeRequest { number }, None)
            .await?;
        let factors = collect::<DecomposeResponse>(&call).await?;
        Ok(factors.into_iter().map(|r| r.factor).collect())
    }

    pub async fn compute_average(
        &self,
        numbers: impl IntoIterator<Item = i64>,
    ) -> Result<f64, Status> {
        let call = self.client.client_stream(COMPUTE_AVERAGE, None).await?;
        for number in numbers {
            call.send(&AverageRequest { number }).await?;
        }
        let response: AverageResponse = call.close_and_recv().await?;
        Ok(response.average)
    }

    /// Every maximum the server reported, in order.
    pub async fn find_maximum(
        &self,
        numbers: impl IntoIterator<Item = i64>,
    ) -> Result<Vec<i64>, Status> {
        let call = self.client.bidi_stream(FIND_MAXIMUM, None).await?;
        let requests: Vec<MaximumRequest> = numbers
            .into_iter()
            .map(|number| MaximumRequest { number })
            .collect();
        let responses: Vec<MaximumResponse> = exchange(call, requests).await?;
        Ok(responses.into_iter().map(|r| r.maximum).collect())
    }

    pub async fn square_root(&self, number: i32) -> Result<f64, Status> {
        let response: SquareRootResponse = self
            .client
            .unary(SQUARE_ROOT, &SquareRootRequest { number }, None)
            .await?;
        Ok(response.root)
    }
}

/// Client for `greet.*`.
#[derive(Debug, Clone)]
pub struct GreetClient<C> {
    client: RpcClient<C>,
}

impl<C: Connector> GreetClient<C> {
    pub fn new(client: RpcClient<C>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &RpcClient<C> {
        &self.client
    }

    pub async fn greet(&self, greeting: Greeting) -> Result<String, Status> {
        let response: GreetResponse = self
            .client
            .unary(GREET, &GreetRequest::from(greeting), None)
            .await?;
        Ok(response.result)
    }

    pub async fn greet_many_times(&self, greeting: Greeting) -> Result<Vec<String>, Status> {
        let call = self
            .client
            .server_stream(GREET_MANY_TIMES, &GreetRequest::from(greeting), None)
            .await?;
        let responses = collect::<GreetResponse>(&call).await?;
        Ok(responses.into_iter().map(|r| r.result).collect())
    }

    pub async fn long_greet(
        &self,
        greetings: impl IntoIterator<Item = Greeting>,
    ) -> Result<String, Status> {
        let call = self.client.client_stream(LONG_GREET, None).await?;
        for greeting in greetings {
            call.send(&GreetRequest::from(greeting)).await?;
        }
        let response: GreetResponse = call.close_and_recv().await?;
        Ok(response.result)
    }

    pub async fn greet_everyone(
        &self,
        greetings: impl IntoIterator<Item = Greeting>,
    ) -> Result<Vec<String>, Status> {
        let call = self.client.bidi_stream(GREET_EVERYONE, None).await?;
        let requests: Vec<GreetRequest> = greetings.into_iter().map(GreetRequest::from).collect();
        let responses: Vec<GreetResponse> = exchange(call, requests).await?;
        Ok(responses.into_iter().map(|r| r.result).collect())
    }

    /// Greets within `timeout`; fails with `DeadlineExceeded` if the server
    /// needs longer.
    pub async fn greet_with_deadline(
        &self,
        greeting: Greeting,
        timeout: Duration,
    ) -> Result<String, Status> {
        let response: GreetResponse = self
            .client
            .unary(GREET_WITH_DEADLINE, &GreetRequest::from(greeting), Some(timeout))
            .await?;
        Ok(response.result)
    }
}
