pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Missing tenant id.")]
	MissingTenant,
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Invalid capability registry: {message}")]
	Registry { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}

impl From<keel_storage::Error> for Error {
	fn from(err: keel_storage::Error) -> Self {
		match err {
			keel_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			keel_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			keel_storage::Error::NotFound(message) => Self::Storage { message },
		}
	}
}
