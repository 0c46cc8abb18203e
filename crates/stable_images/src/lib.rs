//! # stable_images
//!
//! `stable_images` talks to two hosted image generation APIs: the ControlNet
//! canny-edge image-to-image API and the Stability text-to-image API. Requests are
//! built with typed parameters, asynchronous generations are polled until the image
//! is available, and the finished PNG is written to disk under a name derived from
//! the generation seed.
//!
//! ## Example
//!
//! Basic usage:
//!
//! ```no_run
//! # use stable_images::prelude::*;
//! # async fn run(key: String) -> Result<()> {
//! let client = ControlNetClient::new(key)?;
//!
//! let request = ControlNetRequest::new(
//!     "white statue of a roman woman holding pot".into(),
//!     "https://example.com/outline.jpg".into(),
//! )
//! .update_guidance_scale(8.0);
//!
//! // submits, waits for processing if needed and writes images/img2img_{seed}.png
//! if let Some(image) = client.generate(&request).await {
//!     println!("{}", image.path.display());
//! }
//! # Ok(())
//! # }
//! ```

use reqwest::{header, StatusCode};
use thiserror::Error;

pub mod controlnet;
pub mod response;
pub mod stability;
pub mod store;

pub mod prelude {
    pub use super::{
        controlnet::{ControlNetClient, ControlNetRequest, PollPolicy, Scheduler},
        response::{GenerationResponse, Seed},
        stability::{StabilityClient, StabilityEngine, TextToImageRequest},
        store::{ImageKind, ImageStore, SavedImage},
        DiffusionError, Result,
    };
}

/// Potential errors returned from the library
#[derive(Error, Debug)]
pub enum DiffusionError {
    /// The generation request could not be delivered or was rejected
    #[error("generation request failed")]
    Network(#[from] reqwest::Error),
    /// The finished image could not be downloaded
    #[error("failed to fetch generated image")]
    Fetch(#[source] reqwest::Error),
    /// An invalid header
    #[error(transparent)]
    InvalidHeader(#[from] header::InvalidHeaderValue),
    /// Image has not been fully created yet
    #[error("the image is not complete")]
    ImageStatusNotReady,
    /// Unknown HTTP error returned from the API
    #[error("unknown http error {status}: {body}")]
    UnknownHttpError { status: StatusCode, body: String },
    /// The follow-up url never produced the image
    #[error("image still unavailable after {attempts} attempts")]
    PollExhausted { attempts: u32 },
    /// The API answered with a body that does not match the expected shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// The API answered with something that is not JSON
    #[error("invalid json in response")]
    InvalidJson(#[from] serde_json::Error),
    /// The API reported a failed generation
    #[error("provider returned an error: {0}")]
    ProviderError(String),
    /// The API returned a status this client does not know how to handle
    #[error("unhandled response status {0:?}")]
    UnhandledStatus(String),
    /// Image bytes could not be decoded from the response
    #[error("invalid base64 image data")]
    Decode(#[from] base64::DecodeError),
    /// The image could not be written to disk
    #[error("failed to save image")]
    Persist(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DiffusionError>;
