pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("The {collaborator} collaborator timed out.")]
	CollaboratorTimeout { collaborator: &'static str },
	#[error("The {collaborator} collaborator call failed: {message}")]
	CollaboratorFailure { collaborator: &'static str, message: String },
	#[error("Malformed collaborator response: {message}")]
	MalformedResponse { message: String },
	#[error("Stage {stage} cannot move from {from} to {to}.")]
	StageTransition {
		stage: crate::event::StageId,
		from: crate::event::StageStatus,
		to: crate::event::StageStatus,
	},
	#[error("Client disconnected.")]
	ClientDisconnected,
}

impl Error {
	pub(crate) fn from_provider(collaborator: &'static str, err: quill_providers::Error) -> Self {
		use quill_providers::Error as ProviderError;

		if err.is_timeout() {
			return Self::CollaboratorTimeout { collaborator };
		}

		match err {
			ProviderError::InvalidResponse { message } => Self::MalformedResponse { message },
			ProviderError::SerdeJson(err) =>
				Self::MalformedResponse { message: err.to_string() },
			err => Self::CollaboratorFailure { collaborator, message: err.to_string() },
		}
	}
}
