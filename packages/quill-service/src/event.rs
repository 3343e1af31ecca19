use tokio::sync::mpsc;

use quill_domain::Reference;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageId {
	Planning,
	Retrieval,
	Summary,
}

impl StageId {
	pub const ALL: [Self; 3] = [Self::Planning, Self::Retrieval, Self::Summary];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Planning => "planning",
			Self::Retrieval => "retrieval",
			Self::Summary => "summary",
		}
	}

	pub fn display_name(self) -> &'static str {
		match self {
			Self::Planning => "Question analysis",
			Self::Retrieval => "Knowledge retrieval",
			Self::Summary => "Summary report",
		}
	}

	fn index(self) -> usize {
		match self {
			Self::Planning => 0,
			Self::Retrieval => 1,
			Self::Summary => 2,
		}
	}
}

impl std::fmt::Display for StageId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
	Pending,
	Running,
	Completed,
	Failed,
}

impl StageStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "PENDING",
			Self::Running => "RUNNING",
			Self::Completed => "COMPLETED",
			Self::Failed => "FAILED",
		}
	}
}

impl std::fmt::Display for StageStatus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone)]
pub struct Stage {
	pub id: StageId,
	pub status: StageStatus,
}

/// The three pipeline stages of one request.
///
/// Transitions are monotonic: PENDING → RUNNING → COMPLETED or FAILED.
/// Anything else is rejected, so a stage can never regress and a terminal
/// stage can never move again.
#[derive(Debug)]
pub struct StagePlan {
	stages: [Stage; 3],
}

impl StagePlan {
	pub fn new() -> Self {
		Self {
			stages: StageId::ALL.map(|id| Stage { id, status: StageStatus::Pending }),
		}
	}

	pub fn stages(&self) -> &[Stage] {
		&self.stages
	}

	pub fn status(&self, id: StageId) -> StageStatus {
		self.stages[id.index()].status
	}

	pub fn advance(&mut self, id: StageId, to: StageStatus) -> Result<()> {
		let stage = &mut self.stages[id.index()];
		let from = stage.status;
		let legal = matches!(
			(from, to),
			(StageStatus::Pending, StageStatus::Running)
				| (StageStatus::Running, StageStatus::Completed)
				| (StageStatus::Running, StageStatus::Failed)
		);

		if !legal {
			return Err(Error::StageTransition { stage: id, from, to });
		}

		stage.status = to;

		Ok(())
	}
}

impl Default for StagePlan {
	fn default() -> Self {
		Self::new()
	}
}

/// Internal pipeline event, one variant per wire message kind.
///
/// Events are immutable once emitted; the encoder never revises one.
#[derive(Debug, Clone)]
pub enum Event {
	StagesDeclared { stages: Vec<Stage> },
	StageChanged { stage: StageId, status: StageStatus },
	ToolCallStarted { stage: StageId, invocation_id: String, query: String, result_bound: u32 },
	ToolCallEnded { stage: StageId, invocation_id: String, success: bool, result_count: usize },
	Content { content: String },
	References { references: Vec<Reference> },
	Completed,
	Failed { message: String },
}

/// Sending half of the per-request event channel.
///
/// A closed channel means the client went away; emission reports that as
/// [`Error::ClientDisconnected`] so callers stop producing without treating
/// it as a pipeline failure.
#[derive(Clone)]
pub struct EventSink {
	tx: mpsc::Sender<Event>,
}

impl EventSink {
	pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
		let (tx, rx) = mpsc::channel(capacity);

		(Self { tx }, rx)
	}

	pub async fn emit(&self, event: Event) -> Result<()> {
		self.tx.send(event).await.map_err(|_| Error::ClientDisconnected)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn stages_follow_the_legal_chain() {
		let mut plan = StagePlan::new();

		plan.advance(StageId::Retrieval, StageStatus::Running).expect("advance failed");
		plan.advance(StageId::Retrieval, StageStatus::Completed).expect("advance failed");

		assert_eq!(plan.status(StageId::Retrieval), StageStatus::Completed);
		assert_eq!(plan.status(StageId::Summary), StageStatus::Pending);
	}

	#[test]
	fn stages_never_regress() {
		let mut plan = StagePlan::new();

		plan.advance(StageId::Summary, StageStatus::Running).expect("advance failed");
		plan.advance(StageId::Summary, StageStatus::Failed).expect("advance failed");

		assert!(plan.advance(StageId::Summary, StageStatus::Running).is_err());
		assert!(plan.advance(StageId::Summary, StageStatus::Pending).is_err());
		assert!(plan.advance(StageId::Summary, StageStatus::Completed).is_err());
	}

	#[test]
	fn pending_stages_cannot_jump_to_terminal_states() {
		let mut plan = StagePlan::new();

		assert!(plan.advance(StageId::Planning, StageStatus::Completed).is_err());
		assert!(plan.advance(StageId::Planning, StageStatus::Failed).is_err());
	}

	#[tokio::test]
	async fn emitting_on_a_closed_channel_reports_disconnect() {
		let (sink, rx) = EventSink::channel(4);

		drop(rx);

		let err = sink.emit(Event::Completed).await.expect_err("Expected disconnect.");

		assert!(matches!(err, Error::ClientDisconnected));
	}
}
