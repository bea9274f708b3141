pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Storage(#[from] keel_storage::Error),
	#[error(transparent)]
	Provider(#[from] keel_providers::Error),
	#[error("{0}")]
	Message(String),
}
