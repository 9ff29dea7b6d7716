/// Default regional endpoint of the generative-media backend.
pub const DEFAULT_BASE_URL: &str = "https://us-central1-aiplatform.googleapis.com";
pub const DEFAULT_LOCATION: &str = "us-central1";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-2.0-generate-001";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-3.0-generate-002";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Connection settings for the generative-media backend.
#[derive(Debug, Clone)]
pub struct GenMediaConfig {
    /// Scheme and host, without a trailing slash.
    pub base_url: String,
    pub project_id: String,
    pub location: String,
    pub video_model: String,
    pub image_model: String,
    /// Bearer token obtained from the identity provider.
    pub access_token: String,
    /// Default `gs://` prefix for generated videos.
    pub output_bucket: Option<String>,
    /// Per-request transport timeout in seconds.
    pub request_timeout_secs: u64,
}

impl GenMediaConfig {
    /// Config with defaults for everything except project and token.
    pub fn new(project_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            project_id: project_id.into(),
            location: DEFAULT_LOCATION.to_string(),
            video_model: DEFAULT_VIDEO_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            access_token: access_token.into(),
            output_bucket: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                         | Default                                         |
    /// |---------------------------------|-------------------------------------------------|
    /// | `GENMEDIA_BASE_URL`             | `https://us-central1-aiplatform.googleapis.com` |
    /// | `GENMEDIA_PROJECT_ID`           | required                                        |
    /// | `GENMEDIA_LOCATION`             | `us-central1`                                   |
    /// | `GENMEDIA_VIDEO_MODEL`          | `veo-2.0-generate-001`                          |
    /// | `GENMEDIA_IMAGE_MODEL`          | `imagen-3.0-generate-002`                       |
    /// | `GENMEDIA_ACCESS_TOKEN`         | required                                        |
    /// | `GENMEDIA_OUTPUT_BUCKET`        | unset                                           |
    /// | `GENMEDIA_REQUEST_TIMEOUT_SECS` | `60`                                            |
    pub fn from_env() -> Self {
        let project_id =
            std::env::var("GENMEDIA_PROJECT_ID").expect("GENMEDIA_PROJECT_ID must be set");
        let access_token =
            std::env::var("GENMEDIA_ACCESS_TOKEN").expect("GENMEDIA_ACCESS_TOKEN must be set");

        let base_url = std::env::var("GENMEDIA_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.into())
            .trim_end_matches('/')
            .to_string();

        let request_timeout_secs: u64 = std::env::var("GENMEDIA_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_REQUEST_TIMEOUT_SECS.to_string())
            .parse()
            .expect("GENMEDIA_REQUEST_TIMEOUT_SECS must be a valid u64");

        let output_bucket = std::env::var("GENMEDIA_OUTPUT_BUCKET")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Self {
            base_url,
            project_id,
            location: std::env::var("GENMEDIA_LOCATION").unwrap_or_else(|_| DEFAULT_LOCATION.into()),
            video_model: std::env::var("GENMEDIA_VIDEO_MODEL")
                .unwrap_or_else(|_| DEFAULT_VIDEO_MODEL.into()),
            image_model: std::env::var("GENMEDIA_IMAGE_MODEL")
                .unwrap_or_else(|_| DEFAULT_IMAGE_MODEL.into()),
            access_token,
            output_bucket,
            request_timeout_secs,
        }
    }

    /// Resource path of a publisher model, e.g.
    /// `projects/p/locations/l/publishers/google/models/m`.
    pub fn model_path(&self, model: &str) -> String {
        format!(
            "projects/{}/locations/{}/publishers/google/models/{}",
            self.project_id, self.location, model
        )
    }
}
