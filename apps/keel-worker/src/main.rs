use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = keel_worker::Args::parse();

	keel_worker::run(args).await
}
