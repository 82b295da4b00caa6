use std::path::PathBuf;

pub type StampResult<T> = Result<T, StampError>;

#[derive(thiserror::Error, Debug)]
pub enum StampError {
    #[error("enumeration error: cannot list '{}': {source}", .path.display())]
    Enumeration {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("asset error: {0}")]
    Asset(String),

    #[error("encode/write error: {0}")]
    EncodeOrWrite(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StampError {
    pub fn enumeration(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Enumeration {
            path: path.into(),
            source,
        }
    }

    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    pub fn encode_or_write(msg: impl Into<String>) -> Self {
        Self::EncodeOrWrite(msg.into())
    }

    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            StampError::asset("x")
                .to_string()
                .contains("asset error:")
        );
        assert!(
            StampError::encode_or_write("x")
                .to_string()
                .contains("encode/write error:")
        );
        assert!(
            StampError::archive("x")
                .to_string()
                .contains("archive error:")
        );
        assert!(
            StampError::config("x")
                .to_string()
                .contains("config error:")
        );
    }

    #[test]
    fn enumeration_names_the_path() {
        let err = StampError::enumeration(
            "/nope/footers",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        let msg = err.to_string();
        assert!(msg.contains("enumeration error:"));
        assert!(msg.contains("/nope/footers"));
        assert!(msg.contains("missing"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = StampError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
