use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = quill_api::Args::parse();
	quill_api::run(args).await
}
