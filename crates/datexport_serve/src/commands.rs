use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use datexport_xlsx::spec::SpecExportTemplate;
use datexport_xlsx::{
    BuiltinTemplateSource, DataExporter, DataSource, JsonFileSource, JsonTemplateSource,
    PolarsIpcSource, TemplateSource, XlsxTemplateSource, render_template_workbook,
};
use log::{info, warn};

use crate::cli::parse_route;
use crate::job::SpecExportJob;
use crate::server::build_router;

pub async fn run_serve(bind: SocketAddr, file_template: PathBuf, route: &str) -> Result<()> {
    parse_route(route).map_err(|err| anyhow!(err))?;
    if !file_template.exists() {
        warn!(
            "template {} does not exist yet; downloads answer 404",
            file_template.display()
        );
    }
    let app = build_router(route, file_template);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("serving {route} on http://{bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")
}

pub async fn run_template(out: &Path, template_json: Option<&Path>) -> Result<()> {
    let template = load_template(template_json).await?;
    let v_bytes = render_template_workbook(&template)?;
    tokio::fs::write(out, v_bytes)
        .await
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("{}", out.display());
    Ok(())
}

pub async fn run_export(
    file_job: &Path,
    file_records: &Path,
    dir_out: &Path,
    date_export: Option<NaiveDate>,
) -> Result<PathBuf> {
    let c_job = tokio::fs::read_to_string(file_job)
        .await
        .with_context(|| format!("failed to read job {}", file_job.display()))?;
    let job: SpecExportJob = serde_json::from_str(&c_job)
        .with_context(|| format!("invalid job {}", file_job.display()))?;
    let template_source =
        BuiltinTemplateSource::with_template(load_template(job.file_template.as_deref()).await?);

    let if_json = file_records
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let path = if if_json {
        export_with(
            JsonFileSource::new(file_records),
            template_source,
            &job,
            dir_out,
            date_export,
        )
        .await?
    } else {
        let v_ipc = tokio::fs::read(file_records)
            .await
            .with_context(|| format!("failed to read records {}", file_records.display()))?;
        export_with(
            PolarsIpcSource::new(v_ipc),
            template_source,
            &job,
            dir_out,
            date_export,
        )
        .await?
    };
    println!("{}", path.display());
    Ok(path)
}

async fn export_with<S: DataSource, T: TemplateSource>(
    source: S,
    template_source: T,
    job: &SpecExportJob,
    dir_out: &Path,
    date_export: Option<NaiveDate>,
) -> Result<PathBuf> {
    let mut exporter = DataExporter::new(
        source,
        template_source,
        job.derive_grid_binding(),
        job.derive_export_settings(),
    );
    if let Some(date) = date_export {
        exporter = exporter.with_export_date(date);
    }

    let artifact = exporter
        .export_to_xlsx()
        .await
        .with_context(|| format!("export of {:?} failed", job.sheet_name))?;
    for (kind, c_range) in &artifact.report.ranges {
        info!("{kind:?}: {c_range}");
    }
    Ok(artifact.save_to_dir(dir_out).await?)
}

/// Template from a template workbook (`.xlsx`) or a styling JSON file.
async fn load_template(file_template: Option<&Path>) -> Result<SpecExportTemplate> {
    let Some(path) = file_template else {
        return Ok(SpecExportTemplate::default());
    };
    let if_xlsx = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));
    let template = if if_xlsx {
        XlsxTemplateSource::new(path).fetch_template().await
    } else {
        JsonTemplateSource::new(path).fetch_template().await
    };
    template.with_context(|| format!("failed to load template {}", path.display()))
}
