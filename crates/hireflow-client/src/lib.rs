//! Hireflow Client SDK.
//!
//! Typed access to the recruiter-facing credit and unlock endpoints.
//!
//! # Example
//!
//! ```no_run
//! use hireflow_client::HireflowClient;
//! use hireflow_core::CvId;
//!
//! # async fn example(cv: CvId) -> Result<(), hireflow_client::ClientError> {
//! let client = HireflowClient::new("http://hireflow:8080", "user-session-jwt")?;
//!
//! let quote = client.can_unlock(&[cv]).await?;
//! if quote.has_enough_credits {
//!     let unlocked = client.unlock_cvs(&[cv]).await?;
//!     println!("{} credits left", unlocked.remaining_credits);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, HireflowClient};
pub use error::ClientError;
pub use types::*;
