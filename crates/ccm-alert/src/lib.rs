//! CCM Alert - Alert Dispatch
//!
//! Delivers alerts to the channels selected by severity:
//! - CRITICAL: chat, pager, webhook
//! - WARN: chat, webhook
//! - INFO: chat
//!
//! Each channel request goes through [`fetch_with_retry`], which bounds the
//! number of attempts and backs off exponentially between them.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod channels;
pub mod dispatcher;
pub mod http;
pub mod retry;

pub use channels::{build_request, channels_for, ChannelError};
pub use dispatcher::AlertDispatcher;
pub use http::ReqwestTransport;
pub use retry::{fetch_with_retry, FetchOutcome};
