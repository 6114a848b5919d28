#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error("Archive member `{0}` would be extracted outside of the target directory")]
    UnsafePath(String),
    #[error("Archive contains an entry with an empty filename")]
    EmptyFilename,
    #[error("Archive contains unacceptable filename: {filename}")]
    UnacceptableFilename { filename: String },
}
