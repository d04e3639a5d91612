use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum FrameshotError {
    EmptyContent,
    InvalidGeometry(String),
    FontLoad { path: PathBuf, message: String },
    Encoding { page_index: usize, message: String },
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl FrameshotError {
    pub(crate) fn font_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        FrameshotError::FontLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn encoding(page_index: usize, message: impl Into<String>) -> Self {
        FrameshotError::Encoding {
            page_index,
            message: message.into(),
        }
    }
}

impl fmt::Display for FrameshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameshotError::EmptyContent => {
                write!(f, "captured frame has no non-blank lines")
            }
            FrameshotError::InvalidGeometry(message) => {
                write!(f, "invalid geometry: {}", message)
            }
            FrameshotError::FontLoad { path, message } => {
                write!(f, "failed to load font {}: {}", path.display(), message)
            }
            FrameshotError::Encoding {
                page_index,
                message,
            } => write!(f, "failed to encode page {}: {}", page_index, message),
            FrameshotError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            FrameshotError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for FrameshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrameshotError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FrameshotError {
    fn from(value: std::io::Error) -> Self {
        FrameshotError::Io(value)
    }
}

pub type Result<T> = std::result::Result<T, FrameshotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_error_names_the_page() {
        let err = FrameshotError::encoding(3, "webp rejected");
        assert_eq!(err.to_string(), "failed to encode page 3: webp rejected");
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err: FrameshotError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed").into();
        assert!(std::error::Error::source(&err).is_some());
    }
}
