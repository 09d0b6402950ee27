mod cli;
mod commands;
mod job;
mod server;

use cli::{CliArgs, EnumCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = CliArgs::parse_args();
    match args.command {
        EnumCommand::Serve {
            bind,
            file_template,
            route,
        } => commands::run_serve(bind, file_template, &route).await,
        EnumCommand::Template { out, template_json } => {
            commands::run_template(&out, template_json.as_deref()).await
        }
        EnumCommand::Export {
            job,
            records,
            out_dir,
            date,
        } => commands::run_export(&job, &records, &out_dir, date)
            .await
            .map(|_| ()),
    }
}
