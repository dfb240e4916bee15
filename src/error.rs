use thiserror::Error;

pub type Result<T> = std::result::Result<T, PanelError>;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("feature '{feature}' not found in source table")]
    MissingFeature { feature: String },

    #[error("no local maximum in the cross-validation score curve (scanned {scanned} scores with order {order})")]
    NoLocalMaximum { scanned: usize, order: usize },

    #[error("degenerate regression input: {message}")]
    DegenerateModel { message: String },

    #[error("sample alignment broken: {message}")]
    Alignment { message: String },

    #[error("malformed table: {message}")]
    InvalidTable { message: String },

    #[error("table i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

impl PanelError {
    pub fn missing_feature(feature: impl Into<String>) -> Self {
        Self::MissingFeature { feature: feature.into() }
    }

    pub fn degenerate_model(message: impl Into<String>) -> Self {
        Self::DegenerateModel { message: message.into() }
    }

    pub fn alignment(message: impl Into<String>) -> Self {
        Self::Alignment { message: message.into() }
    }

    pub fn invalid_table(message: impl Into<String>) -> Self {
        Self::InvalidTable { message: message.into() }
    }
}
