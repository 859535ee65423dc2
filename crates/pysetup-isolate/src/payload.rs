use serde::{Deserialize, Serialize};

/// The request read by the bootstrap from stdin.
#[derive(Debug, Serialize)]
pub(crate) struct Request<'a, A> {
    pub(crate) function: &'a str,
    pub(crate) filename: &'a str,
    pub(crate) source: &'a str,
    pub(crate) kwargs: &'a A,
}

/// The single line the bootstrap writes to the channel.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "result", rename_all = "lowercase")]
pub(crate) enum Payload {
    Success {
        #[serde(default)]
        value: serde_json::Value,
    },
    Failure {
        description: String,
    },
}
