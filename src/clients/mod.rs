pub mod openai;

pub use openai::{build_client, call_with_timeout};
