//! Error taxonomy for the scaling advisor.
//!
//! Every subsystem wraps its internal failures in one of these kinds rather than
//! returning opaque strings; callers switch on the kind, never on message text.

use thiserror::Error;

/// Errors raised by a [`crate::core::store::ResourceStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object {namespace}/{name} already exists")]
    AlreadyExists { namespace: String, name: String },

    #[error("object {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("invalid object: {0}")]
    Invalid(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal store error: {0}")]
    Internal(String),

    #[error("watch subscription expired: {0}")]
    WatchExpired(String),

    #[error("no store registered for kind {0}")]
    StoreMissing(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Errors raised while reading/writing through a [`crate::view::base::BaseView`] or
/// [`crate::view::sandbox::SandboxView`].
#[derive(Debug, Error)]
pub enum ViewError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("operation not permitted on delegate view: {0}")]
    DelegateMutationForbidden(String),
}

/// Errors surfaced by the HTTP API surface, mapped to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    View(#[from] ViewError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("unsupported patch content type: {0}")]
    PatchUnsupportedContentType(String),

    #[error("failed to parse patch body: {0}")]
    PatchParse(String),

    #[error("failed to apply patch: {0}")]
    PatchApply(String),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
}

impl ApiError {
    /// Maps this error to the HTTP status code the wire protocol (spec §6) requires.
    pub fn http_status(&self) -> u16 {
        match self {
            ApiError::Store(StoreError::NotFound { .. }) => 404,
            ApiError::Store(StoreError::AlreadyExists { .. }) => 409,
            ApiError::Store(StoreError::Invalid(_)) => 422,
            ApiError::Store(StoreError::BadRequest(_)) => 400,
            ApiError::Store(StoreError::StoreMissing(_)) => 404,
            ApiError::Store(StoreError::WatchExpired(_)) => 410,
            ApiError::Store(StoreError::Internal(_)) => 500,
            ApiError::View(ViewError::Store(inner)) => {
                ApiError::Store(clone_store_error(inner)).http_status()
            }
            ApiError::View(ViewError::DelegateMutationForbidden(_)) => 500,
            ApiError::PatchUnsupportedContentType(_) => 415,
            ApiError::PatchParse(_) => 400,
            ApiError::PatchApply(_) => 422,
            ApiError::MethodNotAllowed(_) => 405,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ApiError::Store(StoreError::NotFound { .. }) | ApiError::View(ViewError::Store(StoreError::NotFound { .. })) => "NotFound",
            ApiError::Store(StoreError::AlreadyExists { .. }) | ApiError::View(ViewError::Store(StoreError::AlreadyExists { .. })) => "AlreadyExists",
            ApiError::Store(StoreError::Invalid(_)) | ApiError::View(ViewError::Store(StoreError::Invalid(_))) => "Invalid",
            ApiError::Store(StoreError::BadRequest(_)) | ApiError::View(ViewError::Store(StoreError::BadRequest(_))) => "BadRequest",
            ApiError::Store(StoreError::StoreMissing(_)) | ApiError::View(ViewError::Store(StoreError::StoreMissing(_))) => "NotFound",
            ApiError::Store(StoreError::WatchExpired(_)) | ApiError::View(ViewError::Store(StoreError::WatchExpired(_))) => "Expired",
            ApiError::Store(StoreError::Internal(_)) | ApiError::View(ViewError::Store(StoreError::Internal(_))) => "InternalError",
            ApiError::View(ViewError::DelegateMutationForbidden(_)) => "InternalError",
            ApiError::PatchUnsupportedContentType(_) => "UnsupportedMediaType",
            ApiError::PatchParse(_) => "BadRequest",
            ApiError::PatchApply(_) => "Invalid",
            ApiError::MethodNotAllowed(_) => "MethodNotAllowed",
        }
    }
}

// StoreError doesn't implement Clone (thiserror + String fields can, but kept explicit
// to avoid deriving Clone on an error type that may grow non-Clone sources later).
fn clone_store_error(e: &StoreError) -> StoreError {
    match e {
        StoreError::AlreadyExists { namespace, name } => StoreError::AlreadyExists {
            namespace: namespace.clone(),
            name: name.clone(),
        },
        StoreError::NotFound { namespace, name } => StoreError::NotFound {
            namespace: namespace.clone(),
            name: name.clone(),
        },
        StoreError::Invalid(s) => StoreError::Invalid(s.clone()),
        StoreError::BadRequest(s) => StoreError::BadRequest(s.clone()),
        StoreError::Internal(s) => StoreError::Internal(s.clone()),
        StoreError::WatchExpired(s) => StoreError::WatchExpired(s.clone()),
        StoreError::StoreMissing(s) => StoreError::StoreMissing(s.clone()),
    }
}

/// Errors raised by the scheduler launcher (C6).
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("failed to load scheduler configuration: {0}")]
    ConfigLoad(String),

    #[error("failed to launch scheduler: {0}")]
    Launch(String),
}

/// Errors raised by a single simulation run (C7).
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("failed to create simulation sandbox: {0}")]
    Create(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error("simulation run failed: {0}")]
    Run(String),

    #[error("simulation cancelled by a sibling's failure")]
    Cancelled,
}

/// Errors raised by a simulation group (C8).
#[derive(Debug, Error)]
pub enum SimulationGroupError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error("simulation group run failed: {0}")]
    Run(String),
}

/// Errors raised by the scoring pipeline (C10).
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("score-compute failed: missing weight for resource {0:?}")]
    MissingWeight(String),

    #[error("score-select failed: no price for (region={region}, instance_type={instance_type})")]
    MissingPrice { region: String, instance_type: String },

    #[error("no winning score among {0} candidate(s)")]
    NoWinningScore(usize),
}

/// Errors the advice generator can encounter that are not scaling-advice-worthy
/// outcomes (those are plain `Ok` results, see spec.md §4.7 / §4.9).
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator invoked with no unscheduled pods")]
    NoUnscheduledPods,

    #[error("generator converged without producing any scaling recommendation")]
    NoScalingAdvice,

    #[error(transparent)]
    SimulationGroup(#[from] SimulationGroupError),

    #[error("failed to populate base view from snapshot: {0}")]
    Populate(String),

    #[error(transparent)]
    View(#[from] ViewError),
}

/// Umbrella error surfaced at the generator's public boundary (spec.md §7
/// `gen-scaling-advice`), annotated with the caller-supplied identifiers.
#[derive(Debug, Error)]
#[error("gen-scaling-advice failed for request {request_id} (correlation {correlation_id}): {source}")]
pub struct GenScalingAdviceError {
    pub request_id: String,
    pub correlation_id: String,
    #[source]
    pub source: GeneratorError,
}

impl GenScalingAdviceError {
    pub fn new(request_id: impl Into<String>, correlation_id: impl Into<String>, source: GeneratorError) -> Self {
        Self {
            request_id: request_id.into(),
            correlation_id: correlation_id.into(),
            source,
        }
    }
}

/// Errors that prevent the system from starting at all (spec.md §7 `init-failed`).
#[derive(Debug, Error)]
pub enum InitError {
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load configuration: {0}")]
    ConfigLoad(String),
}
