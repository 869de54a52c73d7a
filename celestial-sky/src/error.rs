use thiserror::Error;

pub type SkyResult<T> = Result<T, SkyError>;

#[derive(Debug, Error)]
pub enum SkyError {
    #[error("Invalid HEALPix depth {depth}: must be at most {max}")]
    InvalidDepth { depth: u8, max: u8 },

    #[error("Invalid coordinate: {message}")]
    InvalidCoordinate { message: String },

    #[error("Point ({ra_deg:.6}, {dec_deg:.6}) lies behind the tangent plane")]
    BehindTangentPlane { ra_deg: f64, dec_deg: f64 },

    #[error("Non-invertible CD matrix (determinant = {determinant})")]
    NonInvertibleMatrix { determinant: f64 },

    #[error("Invalid region: {message}")]
    InvalidRegion { message: String },
}

impl SkyError {
    pub fn invalid_coordinate(message: impl Into<String>) -> Self {
        Self::InvalidCoordinate {
            message: message.into(),
        }
    }

    pub fn invalid_region(message: impl Into<String>) -> Self {
        Self::InvalidRegion {
            message: message.into(),
        }
    }

    pub fn behind_tangent_plane(ra_deg: f64, dec_deg: f64) -> Self {
        Self::BehindTangentPlane { ra_deg, dec_deg }
    }
}
