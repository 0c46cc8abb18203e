use std::time::Duration;

use futures_timer::Delay;
use reqwest::{Client, StatusCode};
use serde::{Serialize, Serializer};
use tracing::{debug, error, info, warn};

use crate::{
    response::{Completed, GenerationResponse, Pending},
    store::{ImageKind, ImageStore, SavedImage},
    DiffusionError, Result,
};

const API_URL: &str = "https://stablediffusionapi.com/api/v5/controlnet";

/// How the client waits on generations that are still processing
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Attempts made against the follow-up url before giving up
    pub max_retries: u32,
    /// Pause between two failed attempts
    pub retry_interval: Duration,
    /// Lower bound on the wait before the first attempt, whatever the eta says
    pub min_eta: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_interval: Duration::from_secs(5),
            min_eta: Duration::from_secs(5),
        }
    }
}

impl PollPolicy {
    /// The wait before polling a processing generation: the suggested eta, but
    /// never less than `min_eta`
    pub fn processing_wait(&self, eta: Option<f64>) -> Duration {
        eta.and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .map_or(self.min_eta, |eta| self.min_eta.max(eta))
    }
}

/// The client used to interact with the ControlNet image-to-image API
pub struct ControlNetClient {
    api: Client,
    key: String,
    endpoint: String,
    store: ImageStore,
    policy: PollPolicy,
}

impl ControlNetClient {
    pub fn new(key: String) -> Result<Self> {
        let api = Client::builder().build()?;

        Ok(Self {
            api,
            key,
            endpoint: API_URL.to_owned(),
            store: ImageStore::default(),
            policy: PollPolicy::default(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_store(mut self, store: ImageStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Submit a generation and return the validated response. The response may
    /// already carry the finished image or only a follow-up url to poll.
    pub async fn submit(&self, request: &ControlNetRequest) -> Result<GenerationResponse> {
        let payload = Payload {
            key: &self.key,
            request,
        };

        let body = self
            .api
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;

        GenerationResponse::from_slice(&body)
    }

    /// Turn a generation response into a saved image, waiting on and polling the
    /// provider when the generation is still processing. Failures are logged and
    /// yield `None`.
    pub async fn resolve(&self, response: GenerationResponse) -> Option<SavedImage> {
        match self.try_resolve(response).await {
            Ok(image) => {
                info!(path = %image.path.display(), seed = %image.seed, "image saved");
                Some(image)
            }
            Err(DiffusionError::UnhandledStatus(status)) => {
                warn!(%status, "unhandled generation status");
                None
            }
            Err(e) => {
                error!(
                    error = %e,
                    source = ?std::error::Error::source(&e),
                    "failed to resolve image"
                );
                None
            }
        }
    }

    /// Submit the request and resolve its response
    pub async fn generate(&self, request: &ControlNetRequest) -> Option<SavedImage> {
        match self.submit(request).await {
            Ok(response) => self.resolve(response).await,
            Err(e) => {
                error!(
                    error = %e,
                    source = ?std::error::Error::source(&e),
                    "failed to submit generation"
                );
                None
            }
        }
    }

    async fn try_resolve(&self, response: GenerationResponse) -> Result<SavedImage> {
        match response {
            GenerationResponse::Success(done) => self.download(done).await,
            GenerationResponse::Processing(pending) => self.await_processing(pending).await,
            GenerationResponse::Error(failed) => {
                Err(DiffusionError::ProviderError(failed.describe()))
            }
            GenerationResponse::Unrecognized(status) => {
                Err(DiffusionError::UnhandledStatus(status))
            }
        }
    }

    async fn download(&self, done: Completed) -> Result<SavedImage> {
        let url = done
            .output
            .first()
            .ok_or_else(|| DiffusionError::MalformedResponse("no output images".into()))?;

        debug!(%url, "downloading generated image");
        let bytes = self
            .api
            .get(url)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(DiffusionError::Fetch)?
            .bytes()
            .await
            .map_err(DiffusionError::Fetch)?;

        self.store
            .save(ImageKind::Img2Img, done.meta.seed, bytes.to_vec())
            .await
    }

    async fn await_processing(&self, pending: Pending) -> Result<SavedImage> {
        let fetch_url = pending.fetch_result.ok_or_else(|| {
            DiffusionError::MalformedResponse("processing response has no fetch url".into())
        })?;
        let seed = pending
            .meta
            .ok_or_else(|| {
                DiffusionError::MalformedResponse("processing response has no seed".into())
            })?
            .seed;

        let wait = self.policy.processing_wait(pending.eta);
        info!(wait_secs = wait.as_secs_f64(), "image is still processing");
        Delay::new(wait).await;

        let bytes = self
            .poll_follow_up(&fetch_url)
            .await
            .ok_or(DiffusionError::PollExhausted {
                attempts: self.policy.max_retries,
            })?;

        self.store.save(ImageKind::Img2Img, seed, bytes).await
    }

    /// Poll a follow-up url until it hands back the image, for at most
    /// `max_retries` attempts spaced by `retry_interval`. Returns `None` once the
    /// attempts are used up.
    pub async fn poll_follow_up(&self, url: &str) -> Option<Vec<u8>> {
        let max_retries = self.policy.max_retries;

        for attempt in 1..=max_retries {
            match self.fetch_once(url).await {
                Ok(bytes) => return Some(bytes),
                Err(e) => warn!(%url, attempt, error = %e, "follow-up fetch failed"),
            }

            if attempt < max_retries {
                debug!(
                    secs = self.policy.retry_interval.as_secs_f64(),
                    "retrying follow-up fetch"
                );
                Delay::new(self.policy.retry_interval).await;
            }
        }

        warn!(%url, attempts = max_retries, "max retries exceeded fetching processed image");
        None
    }

    /// One attempt at the follow-up url: GET, falling back to POST when the
    /// endpoint answers 405
    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>> {
        let mut res = self.api.get(url).send().await.map_err(DiffusionError::Fetch)?;

        if res.status() == StatusCode::METHOD_NOT_ALLOWED {
            debug!(%url, "GET not allowed, trying POST");
            res = self.api.post(url).send().await.map_err(DiffusionError::Fetch)?;
        }

        match res.status() {
            StatusCode::OK => Ok(res.bytes().await.map_err(DiffusionError::Fetch)?.to_vec()),
            code if code.is_success() => Err(DiffusionError::ImageStatusNotReady),
            status => Err(DiffusionError::UnknownHttpError {
                status,
                body: res.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[derive(Serialize)]
struct Payload<'a> {
    key: &'a str,
    #[serde(flatten)]
    request: &'a ControlNetRequest,
}

/// Toggle flags are sent as "yes"/"no" strings
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    Yes,
    No,
}

impl From<bool> for Toggle {
    fn from(value: bool) -> Self {
        if value {
            Self::Yes
        } else {
            Self::No
        }
    }
}

/// The diffusion schedulers accepted by the API
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Scheduler {
    #[serde(rename = "DDPMScheduler")]
    Ddpm,
    #[serde(rename = "DDIMScheduler")]
    Ddim,
    #[serde(rename = "PNDMScheduler")]
    Pndm,
    #[serde(rename = "LMSDiscreteScheduler")]
    LmsDiscrete,
    #[serde(rename = "EulerDiscreteScheduler")]
    EulerDiscrete,
    #[serde(rename = "EulerAncestralDiscreteScheduler")]
    EulerAncestralDiscrete,
    #[serde(rename = "DPMSolverMultistepScheduler")]
    DpmSolverMultistep,
    #[serde(rename = "HeunDiscreteScheduler")]
    HeunDiscrete,
    #[serde(rename = "UniPCMultistepScheduler")]
    UniPcMultistep,
}

fn as_string<S: Serializer>(value: &u32, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// A canny-edge guided image-to-image request. Defaults match the parameters the
/// API is normally driven with; `update_*` methods override them.
#[derive(Debug, Serialize, Clone)]
pub struct ControlNetRequest {
    controlnet_model: String,
    controlnet_type: String,
    model_id: String,
    auto_hint: Toggle,
    guess_mode: Toggle,
    prompt: String,
    negative_prompt: Option<String>,
    init_image: String,
    mask_image: Option<String>,
    #[serde(serialize_with = "as_string")]
    width: u32,
    #[serde(serialize_with = "as_string")]
    height: u32,
    #[serde(serialize_with = "as_string")]
    samples: u32,
    scheduler: Scheduler,
    #[serde(serialize_with = "as_string")]
    num_inference_steps: u32,
    safety_checker: Toggle,
    enhance_prompt: Toggle,
    guidance_scale: f32,
    strength: f32,
    lora_model: Option<String>,
    tomesd: Toggle,
    use_karras_sigmas: Toggle,
    vae: Option<String>,
    lora_strength: Option<f32>,
    embeddings_model: Option<String>,
    seed: Option<u64>,
    webhook: Option<String>,
    track_id: Option<String>,
}

impl ControlNetRequest {
    pub fn new(prompt: String, init_image: String) -> Self {
        Self {
            controlnet_model: "canny".into(),
            controlnet_type: "canny".into(),
            model_id: "midjourney".into(),
            auto_hint: Toggle::Yes,
            guess_mode: Toggle::No,
            prompt,
            negative_prompt: None,
            init_image,
            mask_image: None,
            width: 512,
            height: 512,
            samples: 1,
            scheduler: Scheduler::UniPcMultistep,
            num_inference_steps: 30,
            safety_checker: Toggle::No,
            enhance_prompt: Toggle::Yes,
            guidance_scale: 7.5,
            strength: 0.55,
            lora_model: None,
            tomesd: Toggle::Yes,
            use_karras_sigmas: Toggle::Yes,
            vae: None,
            lora_strength: None,
            embeddings_model: None,
            seed: None,
            webhook: None,
            track_id: None,
        }
    }

    pub fn update_negative_prompt(mut self, prompt: String) -> Self {
        self.negative_prompt = Some(prompt);
        self
    }

    pub fn update_model_id(mut self, model_id: String) -> Self {
        self.model_id = model_id;
        self
    }

    pub fn update_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn update_steps(mut self, steps: u32) -> Self {
        self.num_inference_steps = steps;
        self
    }

    pub fn update_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn update_guidance_scale(mut self, scale: f32) -> Self {
        self.guidance_scale = scale;
        self
    }

    pub fn update_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }

    pub fn update_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn update_enhance_prompt(mut self, enhance: bool) -> Self {
        self.enhance_prompt = enhance.into();
        self
    }

    pub fn update_webhook(mut self, webhook: String) -> Self {
        self.webhook = Some(webhook);
        self
    }

    pub fn update_track_id(mut self, track_id: String) -> Self {
        self.track_id = Some(track_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::response::Seed;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            max_retries: 3,
            retry_interval: Duration::from_millis(50),
            min_eta: Duration::from_millis(10),
        }
    }

    fn test_client(server: &MockServer, store: ImageStore) -> ControlNetClient {
        ControlNetClient::new("test-key".into())
            .unwrap()
            .with_endpoint(format!("{}/api/v5/controlnet", server.uri()))
            .with_store(store)
            .with_policy(fast_policy())
    }

    async fn count(server: &MockServer, verb: &str) -> usize {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == verb)
            .count()
    }

    #[test]
    fn processing_wait_is_at_least_five_seconds() {
        let policy = PollPolicy::default();

        assert_eq!(policy.processing_wait(Some(2.0)), Duration::from_secs(5));
        assert_eq!(policy.processing_wait(Some(12.0)), Duration::from_secs(12));
        assert_eq!(policy.processing_wait(None), Duration::from_secs(5));
        assert_eq!(policy.processing_wait(Some(-3.0)), Duration::from_secs(5));
    }

    #[test]
    fn request_serializes_provider_defaults() {
        let request = ControlNetRequest::new("a cat".into(), "https://img.example/cat.jpg".into());
        let payload = serde_json::to_value(Payload {
            key: "secret",
            request: &request,
        })
        .unwrap();

        assert_eq!(payload["key"], "secret");
        assert_eq!(payload["controlnet_model"], "canny");
        assert_eq!(payload["model_id"], "midjourney");
        assert_eq!(payload["auto_hint"], "yes");
        assert_eq!(payload["guess_mode"], "no");
        assert_eq!(payload["width"], "512");
        assert_eq!(payload["num_inference_steps"], "30");
        assert_eq!(payload["scheduler"], "UniPCMultistepScheduler");
        assert_eq!(payload["guidance_scale"], 7.5);
        assert_eq!(payload["init_image"], "https://img.example/cat.jpg");
        assert!(payload["seed"].is_null());
        assert!(payload["webhook"].is_null());
    }

    #[tokio::test]
    async fn submit_sends_key_in_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v5/controlnet"))
            .and(body_partial_json(json!({ "key": "test-key", "prompt": "a cat" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "processing",
                "eta": 8,
                "fetch_result": "https://api.example/fetch/7",
                "meta": { "seed": 7 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path()));
        let request = ControlNetRequest::new("a cat".into(), "https://img.example/cat.jpg".into());

        let response = client.submit(&request).await.unwrap();
        assert!(matches!(response, GenerationResponse::Processing(p) if p.eta == Some(8.0)));
    }

    #[tokio::test]
    async fn submit_http_error_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path()));
        let request = ControlNetRequest::new("a cat".into(), "x".into());

        let err = client.submit(&request).await.unwrap_err();
        assert!(matches!(err, DiffusionError::Network(_)));
        assert!(client.generate(&request).await.is_none());
    }

    #[tokio::test]
    async fn success_saves_one_image_named_by_seed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/out/0.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path()));
        let response = GenerationResponse::from_value(json!({
            "status": "success",
            "output": [
                format!("{}/out/0.png", server.uri()),
                format!("{}/out/1.png", server.uri())
            ],
            "meta": { "seed": 42 }
        }))
        .unwrap();

        let saved = client.resolve(response).await.unwrap();

        assert_eq!(saved.seed, Seed::from(42u64));
        assert_eq!(saved.path, dir.path().join("img2img_42.png"));
        assert_eq!(std::fs::read(&saved.path).unwrap(), PNG);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn success_with_failed_download_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path().join("images")));
        let response = GenerationResponse::from_value(json!({
            "status": "success",
            "output": [format!("{}/missing.png", server.uri())],
            "meta": { "seed": 1 }
        }))
        .unwrap();

        assert!(client.resolve(response).await.is_none());
        assert!(!dir.path().join("images").exists());
    }

    #[tokio::test]
    async fn success_with_empty_output_yields_none() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path()));
        let response = GenerationResponse::from_value(json!({
            "status": "success",
            "output": [],
            "meta": { "seed": 1 }
        }))
        .unwrap();

        assert!(client.resolve(response).await.is_none());
    }

    #[tokio::test]
    async fn processing_polls_then_saves() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/fetch/9"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path()));
        let response = GenerationResponse::from_value(json!({
            "status": "processing",
            "fetch_result": format!("{}/fetch/9", server.uri()),
            "meta": { "seed": "9" }
        }))
        .unwrap();

        let saved = client.resolve(response).await.unwrap();
        assert_eq!(saved.path, dir.path().join("img2img_9.png"));
        assert_eq!(saved.bytes, PNG);
    }

    #[tokio::test]
    async fn processing_without_fetch_url_yields_none() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path()));
        let response = GenerationResponse::from_value(json!({
            "status": "processing",
            "eta": 1,
            "meta": { "seed": 3 }
        }))
        .unwrap();

        assert!(client.resolve(response).await.is_none());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unrecognized_and_error_statuses_yield_none() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path()));

        let queued = GenerationResponse::from_value(json!({ "status": "queued" })).unwrap();
        assert!(client.resolve(queued).await.is_none());

        let failed = GenerationResponse::from_value(json!({
            "status": "error",
            "message": "bad key"
        }))
        .unwrap();
        assert!(client.resolve(failed).await.is_none());
    }

    #[tokio::test]
    async fn ok_on_first_attempt_skips_sleeping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path()))
            .with_policy(PollPolicy {
                retry_interval: Duration::from_secs(30),
                ..fast_policy()
            });

        let started = Instant::now();
        let bytes = client.poll_follow_up(&format!("{}/fetch", server.uri())).await;

        assert_eq!(bytes.as_deref(), Some(PNG));
        assert!(started.elapsed() < Duration::from_secs(30));
        assert_eq!(count(&server, "GET").await, 1);
    }

    #[tokio::test]
    async fn method_not_allowed_falls_back_to_post() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path()));

        let bytes = client.poll_follow_up(&format!("{}/fetch", server.uri())).await;

        assert_eq!(bytes.as_deref(), Some(PNG));
        assert_eq!(count(&server, "GET").await, 1);
        assert_eq!(count(&server, "POST").await, 1);
    }

    #[tokio::test]
    async fn later_success_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path()));

        let started = Instant::now();
        let bytes = client.poll_follow_up(&format!("{}/fetch", server.uri())).await;

        assert_eq!(bytes.as_deref(), Some(PNG));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(count(&server, "GET").await, 2);
    }

    #[tokio::test]
    async fn exhausts_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(405))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path()));

        let started = Instant::now();
        let bytes = client.poll_follow_up(&format!("{}/fetch", server.uri())).await;

        assert!(bytes.is_none());
        // two sleeps between three attempts
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert_eq!(count(&server, "GET").await, 3);
        assert_eq!(count(&server, "POST").await, 1);
    }

    #[tokio::test]
    async fn transport_errors_count_as_failed_attempts() {
        let unreachable = {
            let server = MockServer::builder().start().await;
            format!("{}/fetch", server.uri())
        };

        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path()));

        assert!(client.poll_follow_up(&unreachable).await.is_none());
    }

    #[tokio::test]
    async fn accepted_without_body_is_not_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path()));

        let err = client
            .fetch_once(&format!("{}/fetch", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, DiffusionError::ImageStatusNotReady));
        assert!(client.poll_follow_up(&format!("{}/fetch", server.uri())).await.is_none());
    }

    #[tokio::test]
    async fn generate_runs_the_whole_chain() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v5/controlnet"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "processing",
                "eta": 0,
                "fetch_result": format!("{}/fetch/5", server.uri()),
                "meta": { "seed": 5 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fetch/5"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/fetch/5"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = test_client(&server, ImageStore::new(dir.path()));
        let request = ControlNetRequest::new("a cat".into(), "x".into()).update_seed(5);

        let saved = client.generate(&request).await.unwrap();
        assert_eq!(saved.path, dir.path().join("img2img_5.png"));
        assert_eq!(std::fs::read(saved.path).unwrap(), PNG);
    }
}
