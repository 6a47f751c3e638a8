pub type TrainmapResult<T> = Result<T, TrainmapError>;

#[derive(thiserror::Error, Debug)]
pub enum TrainmapError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported projection: {0}")]
    UnsupportedProjection(String),

    #[error("render failure: {0}")]
    Render(String),

    #[error("export failure: {0}")]
    Export(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrainmapError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn unsupported_projection(msg: impl Into<String>) -> Self {
        Self::UnsupportedProjection(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
