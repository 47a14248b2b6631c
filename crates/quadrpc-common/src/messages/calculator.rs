use serde::{Deserialize, Serialize};

pub const ADD: &str = "calculator.Add";
pub const DECOMPOSE_NUMBER: &str = "calculator.DecomposeNumber";
pub const COMPUTE_AVERAGE: &str = "calculator.ComputeAverage";
pub const FIND_MAXIMUM: &str = "calculator.FindMaximum";
pub const SQUARE_ROOT: &str = "calculator.SquareRoot";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRequest {
    pub first: i32,
    pub second: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddResponse {
    pub result: i64,
}

/// Input to prime factorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecomposeRequest {
    pub number: i64,
}

/// One prime factor; factors stream in non-decreasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecomposeResponse {
    pub factor: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AverageRequest {
    pub number: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AverageResponse {
    pub average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaximumRequest {
    pub number: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaximumResponse {
    pub maximum: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquareRootRequest {
    pub number: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SquareRootResponse {
    pub root: f64,
}
