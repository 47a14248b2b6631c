use serde::{Deserialize, Serialize};

pub const GREET: &str = "greet.Greet";
pub const GREET_MANY_TIMES: &str = "greet.GreetManyTimes";
pub const LONG_GREET: &str = "greet.LongGreet";
pub const GREET_EVERYONE: &str = "greet.GreetEveryone";
pub const GREET_WITH_DEADLINE: &str = "greet.GreetWithDeadline";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    pub first_name: String,
    pub last_name: String,
}

impl Greeting {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Greeting {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

/// Request body shared by every greet operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetRequest {
    pub greeting: Greeting,
}

impl From<Greeting> for GreetRequest {
    fn from(greeting: Greeting) -> Self {
        GreetRequest { greeting }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetResponse {
    pub result: String,
}
