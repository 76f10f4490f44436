pub mod artifacts;
pub mod branches;
pub mod config;
pub mod errors;
pub mod flow;
pub mod manifest;
pub mod redaction;
pub mod retry;
pub mod scanner;
pub mod schema;
pub mod util;
