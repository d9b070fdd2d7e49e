use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    config::Config,
    encoder::{self, EncoderTuning, EncodingRequest, EncodingResult, SessionFactory, VideoEncoder},
    error::{EncodeError, Result},
    video::{CodecKind, ContainerKind, FitPolicy, ImageSequence},
};

/// Per-movie choices; anything left `None` falls back to the configuration
///
/// Width and height default to the first image's native size. Signed values
/// are kept as entered so that zero or negative input surfaces as a
/// validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovieSettings {
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub fps: Option<i64>,
    pub codec: Option<CodecKind>,
    pub container: Option<ContainerKind>,
    pub fit: Option<FitPolicy>,
}

/// Front door for producing movies
///
/// Encoding is blocking work, so every run happens on tokio's blocking pool
/// and the result is delivered once, either as the awaited value, through a
/// oneshot channel, or to a callback.
pub struct MovieGenerator {
    config: Config,
    factory: Arc<dyn SessionFactory>,
}

impl MovieGenerator {
    /// Create a generator using the backend named in the configuration
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let factory = encoder::backend_from_config(&config)?;
        Ok(Self { config, factory })
    }

    /// Create a generator with an explicit backend
    pub fn with_factory(config: Config, factory: Arc<dyn SessionFactory>) -> Self {
        Self { config, factory }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.factory.name()
    }

    /// Turn a sequence and destination into a request, filling gaps from
    /// the configuration
    ///
    /// Without an explicit container, the destination's extension decides;
    /// failing that the configured default is used and its extension is
    /// appended to the destination.
    pub fn request<P: AsRef<Path>>(
        &self,
        sequence: ImageSequence,
        destination: P,
        settings: &MovieSettings,
    ) -> Result<EncodingRequest> {
        let destination = destination.as_ref();
        let output = &self.config.output;

        let container = settings
            .container
            .or_else(|| ContainerKind::from_path(destination))
            .unwrap_or(output.container);
        let destination = container.ensure_extension(destination);

        let (width, height) = match (settings.width, settings.height) {
            (Some(w), Some(h)) => (w, h),
            (w, h) => {
                let (native_w, native_h) = sequence.native_size()?;
                (w.unwrap_or(native_w.into()), h.unwrap_or(native_h.into()))
            }
        };

        let mut fit = self.config.fit_options();
        if let Some(policy) = settings.fit {
            fit.policy = policy;
        }

        let request = EncodingRequest::builder()
            .frames(sequence)
            .size(width, height)
            .fps(settings.fps.unwrap_or(output.fps.into()))
            .codec(settings.codec.unwrap_or(output.codec))
            .container(container)
            .destination(destination)
            .fit(fit)
            .build()?;
        Ok(request)
    }

    /// Encode on the blocking pool and wait for the outcome
    pub async fn generate(&self, request: EncodingRequest) -> EncodingResult {
        info!("🎬 Starting movie generation");
        info!("   Images: {}", request.frame_count());
        info!("   Output: {:?}", request.destination());
        info!("   Format: {} {} at {} fps", request.frame_spec(), request.codec(), request.fps());

        let factory = self.factory.clone();
        let tuning = self.config.tuning();
        let result = match tokio::task::spawn_blocking(move || run_encoder(factory, tuning, request)).await {
            Ok(result) => result,
            Err(e) => EncodingResult::Failure(
                EncodeError::WorkerPanicked {
                    reason: e.to_string(),
                }
                .into(),
            ),
        };

        match &result {
            EncodingResult::Success(movie) => {
                info!("🎉 Movie complete! Output saved to: {:?}", movie.destination)
            }
            EncodingResult::Failure(e) => warn!("Movie generation failed: {}", e),
        }
        result
    }

    /// Start an encoding and receive its outcome on a oneshot channel
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self, request: EncodingRequest) -> oneshot::Receiver<EncodingResult> {
        let (sender, receiver) = oneshot::channel();
        self.spawn_with(request, move |result| {
            // A dropped receiver means nobody is waiting any more
            let _ = sender.send(result);
        });
        receiver
    }

    /// Start an encoding and invoke `callback` with its outcome, exactly once,
    /// on the worker thread
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_with<F>(&self, request: EncodingRequest, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(EncodingResult) + Send + 'static,
    {
        let factory = self.factory.clone();
        let tuning = self.config.tuning();
        tokio::task::spawn_blocking(move || callback(run_encoder(factory, tuning, request)))
    }
}

/// Run one encoder to completion; a panic anywhere inside becomes a failure
fn run_encoder(
    factory: Arc<dyn SessionFactory>,
    tuning: EncoderTuning,
    request: EncodingRequest,
) -> EncodingResult {
    let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
        VideoEncoder::new(factory).with_tuning(tuning).encode(request)
    }));

    outcome.unwrap_or_else(|payload| {
        EncodingResult::Failure(
            EncodeError::WorkerPanicked {
                reason: panic_message(payload.as_ref()),
            }
            .into(),
        )
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
