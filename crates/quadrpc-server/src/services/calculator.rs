//! Calculator service.
//!
//! The arithmetic lives in small pure types ([`PrimeFactors`],
//! [`RunningAverage`], [`RunningMaximum`]); the handlers only move messages
//! in and out of a call.

use quadrpc_common::messages::{
    AddRequest, AddResponse, AverageRequest, AverageResponse, DecomposeRequest, DecomposeResponse,
    MaximumRequest, MaximumResponse, SquareRootRequest, SquareRootResponse, ADD, COMPUTE_AVERAGE,
    DECOMPOSE_NUMBER, FIND_MAXIMUM, SQUARE_ROOT,
};
use quadrpc_common::{CallContext, Status};
use tokio::sync::mpsc;

use crate::dispatch::{HandlerRegistry, RequestStream, ResponseSink};

/// Buffered maxima between the receive and send loops of `FindMaximum`.
const MAXIMUM_BUFFER: usize = 32;

/// When the running maximum emits a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitPolicy {
    /// The first element seeds the maximum silently; later elements emit
    /// only when strictly greater than the current maximum.
    #[default]
    OnIncrease,
    /// Every element emits the current maximum.
    EveryElement,
}

impl EmitPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('_', "-").as_str() {
            "on-increase" | "increase" => Some(EmitPolicy::OnIncrease),
            "every-element" | "every" => Some(EmitPolicy::EveryElement),
            _ => None,
        }
    }
}

/// Prime factors of a positive integer in non-decreasing order.
///
/// Trial division: the smallest divisor of the remaining value is always
/// prime, so each step yields the next factor.
#[derive(Debug, Clone)]
pub struct PrimeFactors {
    remaining: i64,
    divisor: i64,
}

impl PrimeFactors {
    /// Returns `None` for inputs below 1.
    pub fn new(number: i64) -> Option<Self> {
        (number >= 1).then_some(Self {
            remaining: number,
            divisor: 2,
        })
    }
}

impl Iterator for PrimeFactors {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        while self.remaining > 1 {
            if self.divisor > self.remaining / self.divisor {
                // No divisor up to the square root: what remains is prime.
                let prime = self.remaining;
                self.remaining = 1;
                return Some(prime);
            }
            if self.remaining % self.divisor == 0 {
                self.remaining /= self.divisor;
                return Some(self.divisor);
            }
            self.divisor += 1;
        }
        None
    }
}

/// Sum and count of a stream of integers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunningAverage {
    sum: i128,
    count: u64,
}

impl RunningAverage {
    pub fn push(&mut self, number: i64) {
        self.sum += i128::from(number);
        self.count += 1;
    }

    /// Mean of the values pushed so far; `None` if there were none.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum as f64 / self.count as f64)
    }
}

/// Running maximum of a stream under an [`EmitPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct RunningMaximum {
    policy: EmitPolicy,
    current: Option<i64>,
}

impl RunningMaximum {
    pub fn new(policy: EmitPolicy) -> Self {
        Self {
            policy,
            current: None,
        }
    }

    pub fn current(&self) -> Option<i64> {
        self.current
    }

    /// Folds `number` in and returns the value to emit, if any.
    pub fn observe(&mut self, number: i64) -> Option<i64> {
        let previous = self.current;
        let maximum = previous.map_or(number, |m| m.max(number));
        self.current = Some(maximum);

        match self.policy {
            EmitPolicy::EveryElement => Some(maximum),
            EmitPolicy::OnIncrease => match previous {
                Some(previous) if number > previous => Some(number),
                _ => None,
            },
        }
    }
}

/// `calculator.*` operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatorService {
    emit_policy: EmitPolicy,
}

impl CalculatorService {
    pub fn new(emit_policy: EmitPolicy) -> Self {
        Self { emit_policy }
    }

    pub fn register(self, registry: &mut HandlerRegistry) {
        let emit_policy = self.emit_policy;
        registry
            .unary(ADD, add)
            .server_stream(DECOMPOSE_NUMBER, decompose_number)
            .client_stream(COMPUTE_AVERAGE, compute_average)
            .bidi_stream(
                FIND_MAXIMUM,
                move |requests: RequestStream<MaximumRequest>,
                      responses: ResponseSink<MaximumResponse>| {
                    find_maximum(requests, responses, emit_policy)
                },
            )
            .unary(SQUARE_ROOT, square_root);
    }
}

async fn add(request: AddRequest, _ctx: CallContext) -> Result<AddResponse, Status> {
    Ok(AddResponse {
        result: i64::from(request.first) + i64::from(request.second),
    })
}

async fn decompose_number(
    request: DecomposeRequest,
    responses: ResponseSink<DecomposeResponse>,
) -> Result<(), Status> {
    let factors = PrimeFactors::new(request.number).ok_or_else(|| {
        Status::invalid_argument(format!(
            "number must be at least 1, got {}",
            request.number
        ))
    })?;
    // Trial division of a large prime runs for seconds.
    let factors: Vec<i64> = tokio::task::spawn_blocking(move || factors.collect())
        .await
        .map_err(|e| Status::from_join_error(&e))?;

    for factor in factors {
        responses.send(&DecomposeResponse { factor }).await?;
    }
    Ok(())
}

async fn compute_average(
    mut requests: RequestStream<AverageRequest>,
) -> Result<AverageResponse, Status> {
    let mut running = RunningAverage::default();
    while let Some(request) = requests.next().await? {
        running.push(request.number);
    }

    let average = running
        .mean()
        .ok_or_else(|| Status::invalid_argument("cannot compute the average of an empty stream"))?;
    Ok(AverageResponse { average })
}

/// Receive and send run as separate tasks. The receive loop owns the
/// running maximum and hands each value to emit to the send loop in order.
async fn find_maximum(
    mut requests: RequestStream<MaximumRequest>,
    responses: ResponseSink<MaximumResponse>,
    policy: EmitPolicy,
) -> Result<(), Status> {
    let (tx, mut rx) = mpsc::channel::<i64>(MAXIMUM_BUFFER);

    let receiver = tokio::spawn(async move {
        let mut running = RunningMaximum::new(policy);
        while let Some(request) = requests.next().await? {
            if let Some(maximum) = running.observe(request.number) {
                if tx.send(maximum).await.is_err() {
                    // Send loop stopped; its error is reported instead.
                    break;
                }
            }
        }
        Ok::<_, Status>(())
    });

    let mut sent = Ok(());
    while let Some(maximum) = rx.recv().await {
        if let Err(status) = responses.send(&MaximumResponse { maximum }).await {
            sent = Err(status);
            break;
        }
    }
    drop(rx);

    let received = receiver
        .await
        .map_err(|e| Status::from_join_error(&e))?;
    sent.and(received)
}

async fn square_root(
    request: SquareRootRequest,
    _ctx: CallContext,
) -> Result<SquareRootResponse, Status> {
    if request.number < 0 {
        return Err(Status::invalid_argument(format!(
            "Received a negative number: {}",
            request.number
        )));
    }
    Ok(SquareRootResponse {
        root: f64::from(request.number).sqrt(),
    })
}
