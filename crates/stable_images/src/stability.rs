use std::fmt::Display;

use base64::prelude::*;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_repr::Serialize_repr;
use tracing::{debug, error, info};

use crate::{
    response::Seed,
    store::{ImageKind, ImageStore, SavedImage},
    DiffusionError, Result,
};

const API_URL: &str = "https://api.stability.ai/v1/generation";

/// The text-to-image engines offered by the Stability API
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StabilityEngine {
    /// stable-diffusion-xl-1024-v1-0
    Xl1024,
    /// stable-diffusion-v1-5
    V1_5,
    /// stable-diffusion-512-v2-1
    #[default]
    V2_1,
}

impl Display for StabilityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Xl1024 => write!(f, "stable-diffusion-xl-1024-v1-0"),
            Self::V1_5 => write!(f, "stable-diffusion-v1-5"),
            Self::V2_1 => write!(f, "stable-diffusion-512-v2-1"),
        }
    }
}

/// Whether a prompt pulls the image towards or away from its text
#[derive(Debug, Serialize_repr, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum PromptWeight {
    Positive = 1,
    Negative = -1,
}

#[derive(Debug, Serialize, Clone)]
struct TextPrompt {
    text: String,
    weight: PromptWeight,
}

/// A text-to-image request
#[derive(Debug, Serialize, Clone)]
pub struct TextToImageRequest {
    #[serde(skip)]
    engine: StabilityEngine,
    steps: u32,
    width: u32,
    height: u32,
    seed: u64,
    cfg_scale: f32,
    samples: u32,
    text_prompts: Vec<TextPrompt>,
}

impl TextToImageRequest {
    pub fn new(prompt: String) -> Self {
        Self {
            engine: StabilityEngine::default(),
            steps: 10,
            width: 512,
            height: 512,
            seed: 0,
            cfg_scale: 5.0,
            samples: 1,
            text_prompts: vec![
                TextPrompt {
                    text: prompt,
                    weight: PromptWeight::Positive,
                },
                TextPrompt {
                    text: "blurry, bad".into(),
                    weight: PromptWeight::Negative,
                },
            ],
        }
    }

    /// Replace the negative prompt
    pub fn update_negative_prompt(mut self, prompt: String) -> Self {
        self.text_prompts.retain(|p| p.weight != PromptWeight::Negative);
        self.text_prompts.push(TextPrompt {
            text: prompt,
            weight: PromptWeight::Negative,
        });
        self
    }

    pub fn update_engine(mut self, engine: StabilityEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn update_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn update_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn update_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn update_cfg_scale(mut self, scale: f32) -> Self {
        self.cfg_scale = scale;
        self
    }
}

#[derive(Deserialize)]
struct ArtifactsResponse {
    artifacts: Vec<Artifact>,
}

#[derive(Deserialize)]
struct Artifact {
    base64: String,
    seed: Seed,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

/// The client used to interact with the Stability text-to-image API
pub struct StabilityClient {
    api: Client,
    base_url: String,
    store: ImageStore,
}

impl StabilityClient {
    pub fn new(key: String) -> Result<Self> {
        let mut headers = header::HeaderMap::new();

        let bearer = format!("Bearer {}", key);
        let mut key = header::HeaderValue::from_str(&bearer)?;
        key.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, key);

        headers.insert(header::ACCEPT, "application/json".try_into()?);

        let api = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            api,
            base_url: API_URL.to_owned(),
            store: ImageStore::default(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_store(mut self, store: ImageStore) -> Self {
        self.store = store;
        self
    }

    /// Generate an image from text and save the first returned artifact
    pub async fn text_to_image(&self, request: &TextToImageRequest) -> Result<SavedImage> {
        let url = format!("{}/{}/text-to-image", self.base_url, request.engine);
        debug!(%url, "requesting text-to-image generation");

        let res = self.api.post(&url).json(request).send().await?;

        let status = res.status();
        if !status.is_success() {
            return Err(DiffusionError::UnknownHttpError {
                status,
                body: res.text().await.unwrap_or_default(),
            });
        }

        let body = res.bytes().await?;
        let artifact = serde_json::from_slice::<ArtifactsResponse>(&body)?
            .artifacts
            .into_iter()
            .next()
            .ok_or_else(|| DiffusionError::MalformedResponse("no artifacts returned".into()))?;

        if let Some(reason) = artifact.finish_reason.as_deref().filter(|r| *r != "SUCCESS") {
            info!(%reason, seed = %artifact.seed, "artifact finished with non-success reason");
        }

        let binary = BASE64_STANDARD.decode(artifact.base64)?;
        self.store.save(ImageKind::Txt2Img, artifact.seed, binary).await
    }

    /// Like [`text_to_image()`](StabilityClient::text_to_image), but failures are
    /// logged and yield `None`
    pub async fn generate(&self, request: &TextToImageRequest) -> Option<SavedImage> {
        match self.text_to_image(request).await {
            Ok(image) => {
                info!(path = %image.path.display(), seed = %image.seed, "image saved");
                Some(image)
            }
            Err(e) => {
                error!(
                    error = %e,
                    source = ?std::error::Error::source(&e),
                    "text-to-image generation failed"
                );
                None
            }
        }
    }
}
