//! Command/response vocabulary shared by the parser and the dialogue.

mod extension;
mod reply;

pub use extension::{AuthMechanism, Extension};
pub use reply::{Reply, ReplyCode, Response};
