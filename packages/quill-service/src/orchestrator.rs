use std::sync::Arc;

use quill_config::Config;

use crate::{
	Providers,
	error::{Error, Result},
	event::{Event, EventSink, StageId, StagePlan, StageStatus},
	retrieval::RetrievalController,
	summary::SummarizationController,
};

/// Drives one request through declaration, retrieval, finalize, and
/// summarization, emitting every transition on the event sink.
pub struct Orchestrator {
	cfg: Arc<Config>,
	providers: Providers,
}

impl Orchestrator {
	pub fn new(cfg: Arc<Config>, providers: Providers) -> Self {
		Self { cfg, providers }
	}

	/// Runs the pipeline to its terminal event.
	///
	/// Never surfaces an error to the caller: a fatal stage failure becomes
	/// the error terminal on the stream, and a vanished client just stops
	/// the stream.
	pub async fn run(&self, query: &str, sink: EventSink) {
		match self.drive(query, &sink).await {
			Ok(()) => {},
			Err(Error::ClientDisconnected) => {
				tracing::debug!("Client disconnected; dropping remaining events.");
			},
			Err(err) => {
				tracing::error!(error = %err, "Pipeline failed.");

				if sink.emit(Event::Failed { message: err.to_string() }).await.is_err() {
					tracing::debug!("Client disconnected before the error terminal.");
				}
			},
		}
	}

	async fn drive(&self, query: &str, sink: &EventSink) -> Result<()> {
		let mut plan = StagePlan::new();

		sink.emit(Event::StagesDeclared { stages: plan.stages().to_vec() }).await?;

		// The planning stage only wraps declaration; it has no work of its
		// own.
		self.advance(&mut plan, StageId::Planning, StageStatus::Running, sink).await?;
		self.advance(&mut plan, StageId::Planning, StageStatus::Completed, sink).await?;

		self.advance(&mut plan, StageId::Retrieval, StageStatus::Running, sink).await?;

		let retrieval = RetrievalController::new(&self.cfg, &self.providers, sink);
		let mut store = match retrieval.run(query).await {
			Ok(store) => store,
			Err(err @ Error::ClientDisconnected) => return Err(err),
			Err(err) => {
				self.advance(&mut plan, StageId::Retrieval, StageStatus::Failed, sink).await?;

				return Err(err);
			},
		};

		self.advance(&mut plan, StageId::Retrieval, StageStatus::Completed, sink).await?;

		store.finalize();

		let max_docs = self.cfg.pipeline.max_context_docs.map(|n| n as usize);

		sink.emit(Event::References { references: store.references(max_docs) }).await?;

		self.advance(&mut plan, StageId::Summary, StageStatus::Running, sink).await?;

		let summary = SummarizationController::new(&self.cfg, &self.providers, sink);

		match summary.run(query, &store).await {
			Ok(()) => {},
			Err(err @ Error::ClientDisconnected) => return Err(err),
			Err(err) => {
				self.advance(&mut plan, StageId::Summary, StageStatus::Failed, sink).await?;

				return Err(err);
			},
		}

		self.advance(&mut plan, StageId::Summary, StageStatus::Completed, sink).await?;

		sink.emit(Event::Completed).await
	}

	async fn advance(
		&self,
		plan: &mut StagePlan,
		stage: StageId,
		status: StageStatus,
		sink: &EventSink,
	) -> Result<()> {
		plan.advance(stage, status)?;

		sink.emit(Event::StageChanged { stage, status }).await
	}
}
